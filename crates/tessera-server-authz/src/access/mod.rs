// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client boundary to the relationship-based access service.
//!
//! [`AccessChecker`] is the only seam through which authorization decisions
//! cross the network. Implementations must honour the request's cancellation
//! and deadline (see [`RequestContext::guard`]) and must surface transport
//! failures as [`AccessError`] rather than answering `false`.

mod http;
#[cfg(test)]
pub(crate) mod recording;
mod tuples;

pub use http::HttpAccessClient;
pub use tuples::TupleStore;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{Interrupted, RequestContext};
use crate::identity::Identity;
use crate::types::{Relation, SubjectId};

/// Errors from talking to the access service.
#[derive(Debug, Error)]
pub enum AccessError {
	#[error("access check cancelled")]
	Cancelled,

	#[error("access check deadline exceeded")]
	DeadlineExceeded,

	#[error("transport error: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("access service returned {status}: {message}")]
	Status { status: u16, message: String },

	#[error("invalid response from access service: {0}")]
	InvalidResponse(String),

	#[error("access client misconfigured: {0}")]
	Misconfigured(String),
}

impl From<Interrupted> for AccessError {
	fn from(value: Interrupted) -> Self {
		match value {
			Interrupted::Cancelled => AccessError::Cancelled,
			Interrupted::DeadlineExceeded => AccessError::DeadlineExceeded,
		}
	}
}

/// An object in the relationship graph, written `type:id` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
	pub object_type: String,
	pub object_id: String,
}

impl ObjectRef {
	pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
		Self {
			object_type: object_type.into(),
			object_id: object_id.into(),
		}
	}

	pub fn organization(org_id: crate::types::OrgId) -> Self {
		Self::new("organization", org_id.to_string())
	}

	/// Parses `type:id`.
	pub fn parse(raw: &str) -> Option<Self> {
		let (object_type, object_id) = raw.split_once(':')?;
		if object_type.is_empty() || object_id.is_empty() {
			return None;
		}
		Some(Self::new(object_type, object_id))
	}
}

impl fmt::Display for ObjectRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.object_type, self.object_id)
	}
}

/// Condition context sent alongside a check, such as the caller's email domain
/// for organizations that restrict membership by domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContextualTuple(BTreeMap<String, serde_json::Value>);

impl ContextualTuple {
	pub fn email_domain(domain: impl Into<String>) -> Self {
		let mut values = BTreeMap::new();
		values.insert(
			"email_domain".to_string(),
			serde_json::Value::String(domain.into()),
		);
		Self(values)
	}

	/// The org-domain tuple for `identity`, when its email carries a domain.
	pub fn for_identity(identity: &Identity) -> Option<Self> {
		identity.email_domain().map(Self::email_domain)
	}

	pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
		self.0.insert(key.into(), value);
	}

	pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
		self.0.get(key)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// A single relationship question: does `subject` have `relation` on `object`?
#[derive(Debug, Clone, PartialEq)]
pub struct AccessCheck {
	pub subject_id: SubjectId,
	/// Tuple type of the subject, `user` or `service`.
	pub subject_type: &'static str,
	pub relation: Relation,
	pub object: ObjectRef,
	pub context: Option<ContextualTuple>,
}

impl AccessCheck {
	pub fn for_identity(identity: &Identity, relation: Relation, object: ObjectRef) -> Self {
		Self {
			subject_id: identity.subject_id,
			subject_type: identity.subject_type.as_tuple_type(),
			relation,
			object,
			context: None,
		}
	}

	pub fn with_context(mut self, context: ContextualTuple) -> Self {
		self.context = Some(context);
		self
	}

	pub(crate) fn subject(&self) -> String {
		format!("{}:{}", self.subject_type, self.subject_id)
	}
}

/// Enumerate every object of a type the subject holds a relation on.
#[derive(Debug, Clone, PartialEq)]
pub struct ListObjectsRequest {
	pub subject_id: SubjectId,
	pub subject_type: &'static str,
	pub relation: Relation,
	pub object_type: String,
	pub context: Option<ContextualTuple>,
}

impl ListObjectsRequest {
	pub fn for_identity(identity: &Identity, relation: Relation, object_type: impl Into<String>) -> Self {
		Self {
			subject_id: identity.subject_id,
			subject_type: identity.subject_type.as_tuple_type(),
			relation,
			object_type: object_type.into(),
			context: None,
		}
	}

	pub fn with_context(mut self, context: ContextualTuple) -> Self {
		self.context = Some(context);
		self
	}

	pub(crate) fn subject(&self) -> String {
		format!("{}:{}", self.subject_type, self.subject_id)
	}
}

/// Remote relationship checks.
#[async_trait]
pub trait AccessChecker: Send + Sync {
	/// Answers a single check. Errors are never collapsed into `false`.
	async fn check_access(&self, ctx: &RequestContext, check: &AccessCheck) -> Result<bool, AccessError>;

	/// Lists subjects holding `relation` on `object`.
	async fn list_subjects(
		&self,
		ctx: &RequestContext,
		object: &ObjectRef,
		relation: Relation,
	) -> Result<Vec<SubjectId>, AccessError>;

	/// Lists ids of objects of `request.object_type` the subject holds `request.relation` on.
	async fn list_objects(&self, ctx: &RequestContext, request: &ListObjectsRequest) -> Result<Vec<String>, AccessError>;

	/// Answers several checks, returning one verdict per check in order.
	async fn batch_check(&self, ctx: &RequestContext, checks: &[AccessCheck]) -> Result<Vec<bool>, AccessError> {
		let mut results = Vec::with_capacity(checks.len());
		for check in checks {
			results.push(self.check_access(ctx, check).await?);
		}
		Ok(results)
	}
}
