// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Result transformers: post-execution passes over a [`ResultSet`].
//!
//! Redaction and decryption errors are fatal to the request. Enrichment
//! degrades to an empty field and logs a warning.

mod decrypt;
mod dedup;
mod enrich;
mod object_access;
mod redact;

pub use decrypt::FieldDecryptor;
pub use dedup::MembershipDedup;
pub use enrich::Enricher;
pub use object_access::ObjectAccessFilter;
pub use redact::{SecretRedactor, REDACTED_PLACEHOLDER};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::ResultSet;

/// Which path produced the rows being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOrigin {
	Query,
	Create,
	Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformTarget {
	pub entity_type: String,
	pub origin: ResultOrigin,
}

impl TransformTarget {
	pub fn new(entity_type: impl Into<String>, origin: ResultOrigin) -> Self {
		Self {
			entity_type: entity_type.into(),
			origin,
		}
	}

	pub fn query(entity_type: impl Into<String>) -> Self {
		Self::new(entity_type, ResultOrigin::Query)
	}
}

#[async_trait]
pub trait ResultTransformer: Send + Sync {
	/// Stable name used in logs and transform errors.
	fn name(&self) -> &'static str;

	async fn transform(
		&self,
		ctx: &RequestContext,
		target: &TransformTarget,
		result: &mut ResultSet,
	) -> Result<(), AuthzError>;
}

/// Failure reported by an injected external capability.
#[derive(Debug, Error)]
pub enum ExternalError {
	#[error("external service unavailable: {0}")]
	Unavailable(String),

	#[error("invalid input: {0}")]
	Invalid(String),
}

/// Decrypts fields stored encrypted at rest.
pub trait Decrypter: Send + Sync {
	fn decrypt(&self, ciphertext: &str) -> Result<String, ExternalError>;
}

/// Issues short-lived signed download links.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
	async fn presigned_url(&self, ctx: &RequestContext, file_ref: &str, ttl: Duration)
		-> Result<String, ExternalError>;
}

/// Issues billing-portal links for customers.
#[async_trait]
pub trait BillingPortal: Send + Sync {
	async fn portal_url(&self, ctx: &RequestContext, customer_ref: &str) -> Result<String, ExternalError>;
}
