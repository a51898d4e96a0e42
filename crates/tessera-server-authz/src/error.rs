// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the authorization engine.

use thiserror::Error;

use crate::access::AccessError;
use crate::types::OrgModule;

/// Errors surfaced by rules, traversal filters, result transformers and the engine.
#[derive(Debug, Error)]
pub enum AuthzError {
	/// A policy chain reached a terminal deny for a write.
	#[error("permission denied on {entity_type}: {reason}")]
	PermissionDenied { entity_type: String, reason: String },

	/// A policy chain reached a terminal deny for a read.
	#[error("{entity_type} not found")]
	NotFound { entity_type: String },

	/// The access service could not be reached or answered with an error.
	#[error("access service unavailable: {0}")]
	UpstreamUnavailable(#[source] AccessError),

	#[error("operation cancelled")]
	Cancelled,

	#[error("deadline exceeded")]
	DeadlineExceeded,

	/// A binding required by a rule is missing from the request context.
	#[error("misconfigured request context: {0}")]
	MisconfiguredContext(String),

	/// The organization is not entitled to the module an entity type requires.
	#[error("features are not enabled: {module}")]
	FeatureNotEnabled { module: OrgModule, path: Vec<String> },

	/// Redaction or decryption failed; partial results are never returned.
	#[error("{transformer} failed: {message}")]
	Transform {
		transformer: &'static str,
		message: String,
	},

	/// The storage boundary reported a failure.
	#[error("storage error: {0}")]
	Storage(String),
}

impl AuthzError {
	/// Stable machine-readable code used by the response error envelope.
	pub fn code(&self) -> &'static str {
		match self {
			AuthzError::PermissionDenied { .. } => "PERMISSION_DENIED",
			AuthzError::NotFound { .. } => "NOT_FOUND",
			AuthzError::MisconfiguredContext(_) => "UNAUTHENTICATED",
			AuthzError::FeatureNotEnabled { .. } => "MODULE_NO_ACCESS",
			AuthzError::Cancelled => "CANCELLED",
			AuthzError::DeadlineExceeded => "DEADLINE_EXCEEDED",
			AuthzError::UpstreamUnavailable(_) | AuthzError::Transform { .. } | AuthzError::Storage(_) => {
				"INTERNAL_SERVER_ERROR"
			}
		}
	}

	pub fn permission_denied(entity_type: impl Into<String>, reason: impl Into<String>) -> Self {
		AuthzError::PermissionDenied {
			entity_type: entity_type.into(),
			reason: reason.into(),
		}
	}

	pub fn not_found(entity_type: impl Into<String>) -> Self {
		AuthzError::NotFound {
			entity_type: entity_type.into(),
		}
	}
}

impl From<AccessError> for AuthzError {
	fn from(err: AccessError) -> Self {
		match err {
			AccessError::Cancelled => AuthzError::Cancelled,
			AccessError::DeadlineExceeded => AuthzError::DeadlineExceeded,
			other => AuthzError::UpstreamUnavailable(other),
		}
	}
}

pub type Result<T> = std::result::Result<T, AuthzError>;
