// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Object storage enrichment configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_PRESIGN_TTL_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectsConfigLayer {
	pub presign_ttl_secs: Option<u64>,
}

impl ObjectsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.presign_ttl_secs.is_some() {
			self.presign_ttl_secs = other.presign_ttl_secs;
		}
	}

	pub fn finalize(self) -> ObjectsConfig {
		ObjectsConfig {
			presign_ttl_secs: self.presign_ttl_secs.unwrap_or(DEFAULT_PRESIGN_TTL_SECS),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectsConfig {
	pub presign_ttl_secs: u64,
}

impl ObjectsConfig {
	pub fn presign_ttl(&self) -> Duration {
		Duration::from_secs(self.presign_ttl_secs)
	}
}

impl Default for ObjectsConfig {
	fn default() -> Self {
		ObjectsConfigLayer::default().finalize()
	}
}
