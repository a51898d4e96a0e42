// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Relationship-based access service configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthzServiceConfigLayer {
	pub enabled: Option<bool>,
	pub base_url: Option<String>,
	pub store_id: Option<String>,
	pub model_id: Option<String>,
	pub request_timeout_ms: Option<u64>,
	pub send_org_context: Option<bool>,
}

impl AuthzServiceConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.store_id.is_some() {
			self.store_id = other.store_id;
		}
		if other.model_id.is_some() {
			self.model_id = other.model_id;
		}
		if other.request_timeout_ms.is_some() {
			self.request_timeout_ms = other.request_timeout_ms;
		}
		if other.send_org_context.is_some() {
			self.send_org_context = other.send_org_context;
		}
	}

	pub fn finalize(self) -> AuthzServiceConfig {
		AuthzServiceConfig {
			enabled: self.enabled.unwrap_or(false),
			base_url: self
				.base_url
				.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
			store_id: self.store_id,
			model_id: self.model_id,
			request_timeout_ms: self
				.request_timeout_ms
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
			send_org_context: self.send_org_context.unwrap_or(true),
		}
	}
}

/// Connection settings for the relationship (tuple store) service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthzServiceConfig {
	pub enabled: bool,
	pub base_url: String,
	pub store_id: Option<String>,
	pub model_id: Option<String>,
	pub request_timeout_ms: u64,
	/// Attach the caller's email domain as a contextual tuple on every check.
	pub send_org_context: bool,
}

impl AuthzServiceConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	pub fn is_configured(&self) -> bool {
		self.enabled && !self.base_url.is_empty() && self.store_id.is_some()
	}
}

impl Default for AuthzServiceConfig {
	fn default() -> Self {
		AuthzServiceConfigLayer::default().finalize()
	}
}
