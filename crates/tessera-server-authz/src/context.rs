// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request-scoped context carried through rules, filters and transformers.
//!
//! A [`RequestContext`] is immutable: every `with_*` method returns a new
//! context and leaves the receiver untouched, so a context may be cloned into
//! concurrent sub-requests freely. Two pieces of state are shared by every
//! context derived from the same root and live exactly as long as the request:
//!
//! - [`RequestCache`]: entitlement and relation-check results.
//! - [`ErrorEnvelope`]: structured, path-aware errors destined for the response.
//!
//! Ad-hoc values can be attached with [`RequestContext::with_value`]; lookups
//! are keyed by the value's type, so a lookup either finds a value of the
//! requested type or finds nothing.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::identity::Identity;
use crate::types::{OrgId, OrgModule, Relation, SubjectId};

// =============================================================================
// Bypass tokens
// =============================================================================

/// The closed set of upstream flows that may pre-authorize an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BypassTokenKind {
	Verify,
	OrgInvite,
	Signup,
	OauthLinking,
	Reset,
	JobRunnerRegistration,
	InternalRequest,
}

impl fmt::Display for BypassTokenKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			BypassTokenKind::Verify => "verify_token",
			BypassTokenKind::OrgInvite => "org_invite_token",
			BypassTokenKind::Signup => "signup_token",
			BypassTokenKind::OauthLinking => "oauth_linking_token",
			BypassTokenKind::Reset => "reset_token",
			BypassTokenKind::JobRunnerRegistration => "job_runner_registration_token",
			BypassTokenKind::InternalRequest => "internal_request",
		};
		f.write_str(name)
	}
}

/// A typed marker placed on the context by an upstream flow.
///
/// The payload is whatever the flow verified, usually an email address or a
/// token value, and is compared against mutation fields by rules that need it.
#[derive(Clone, PartialEq, Eq)]
pub struct BypassToken {
	kind: BypassTokenKind,
	payload: Option<String>,
}

impl BypassToken {
	pub fn new(kind: BypassTokenKind, payload: impl Into<String>) -> Self {
		Self {
			kind,
			payload: Some(payload.into()),
		}
	}

	pub fn internal_request() -> Self {
		Self {
			kind: BypassTokenKind::InternalRequest,
			payload: None,
		}
	}

	pub fn kind(&self) -> BypassTokenKind {
		self.kind
	}

	pub fn payload(&self) -> Option<&str> {
		self.payload.as_deref()
	}
}

impl fmt::Debug for BypassToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BypassToken")
			.field("kind", &self.kind)
			.field("payload", &self.payload.as_ref().map(|_| "[REDACTED]"))
			.finish()
	}
}

// =============================================================================
// Shared per-request state
// =============================================================================

/// Results remembered for the lifetime of one request.
#[derive(Debug, Default)]
pub struct RequestCache {
	features: Mutex<HashMap<OrgId, BTreeSet<OrgModule>>>,
	relations: Mutex<HashSet<(SubjectId, OrgId, Relation)>>,
}

impl RequestCache {
	pub fn features(&self, org_id: OrgId) -> Option<BTreeSet<OrgModule>> {
		self.features.lock().get(&org_id).cloned()
	}

	pub fn store_features(&self, org_id: OrgId, modules: BTreeSet<OrgModule>) {
		self.features.lock().insert(org_id, modules);
	}

	/// Whether a relation check already succeeded during this request.
	pub fn has_relation(&self, subject: SubjectId, org_id: OrgId, relation: Relation) -> bool {
		self.relations.lock().contains(&(subject, org_id, relation))
	}

	/// Records a successful relation check. Failed checks are never cached.
	pub fn store_relation(&self, subject: SubjectId, org_id: OrgId, relation: Relation) {
		self.relations.lock().insert((subject, org_id, relation));
	}
}

/// A structured error attached to the response alongside (possibly empty) data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphError {
	pub code: String,
	pub message: String,
	pub path: Vec<String>,
}

/// Collects [`GraphError`]s produced while resolving one request.
#[derive(Debug, Default)]
pub struct ErrorEnvelope {
	errors: Mutex<Vec<GraphError>>,
}

impl ErrorEnvelope {
	/// Adds an error unless an identical one is already present.
	pub fn push(&self, error: GraphError) {
		let mut errors = self.errors.lock();
		if !errors.contains(&error) {
			errors.push(error);
		}
	}

	pub fn snapshot(&self) -> Vec<GraphError> {
		self.errors.lock().clone()
	}

	pub fn is_empty(&self) -> bool {
		self.errors.lock().is_empty()
	}
}

// =============================================================================
// Cancellation
// =============================================================================

/// Why a guarded future did not run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
	#[error("cancelled")]
	Cancelled,
	#[error("deadline exceeded")]
	DeadlineExceeded,
}

// =============================================================================
// RequestContext
// =============================================================================

#[derive(Clone, Default)]
struct ContextInner {
	identity: Option<Arc<Identity>>,
	allowed: bool,
	bypass_tokens: Vec<BypassToken>,
	path: Vec<String>,
	field_selection: Option<Arc<BTreeSet<String>>>,
	query_root: Option<String>,
	is_search: bool,
	entitlement_check: bool,
	cache: Arc<RequestCache>,
	errors: Arc<ErrorEnvelope>,
	cancellation: CancellationToken,
	deadline: Option<Instant>,
	extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

/// Immutable, cheaply clonable request scope.
#[derive(Clone, Default)]
pub struct RequestContext {
	inner: Arc<ContextInner>,
}

impl RequestContext {
	/// A fresh root context with no identity and new per-request caches.
	pub fn new() -> Self {
		Self::default()
	}

	/// A fresh root context for an authenticated identity.
	pub fn for_identity(identity: Identity) -> Self {
		Self::new().with_identity(identity)
	}

	fn derive(&self, f: impl FnOnce(&mut ContextInner)) -> Self {
		let mut inner = (*self.inner).clone();
		f(&mut inner);
		Self {
			inner: Arc::new(inner),
		}
	}

	pub fn with_identity(&self, identity: Identity) -> Self {
		self.derive(|c| c.identity = Some(Arc::new(identity)))
	}

	/// Marks the operation as already authorized by the caller.
	pub fn with_allow(&self) -> Self {
		self.derive(|c| c.allowed = true)
	}

	pub fn with_bypass_token(&self, token: BypassToken) -> Self {
		self.derive(|c| c.bypass_tokens.push(token))
	}

	/// Marks the request as issued by the system itself.
	pub fn as_internal_request(&self) -> Self {
		self.with_bypass_token(BypassToken::internal_request())
	}

	/// Appends a segment to the response path of the field being resolved.
	pub fn with_path_segment(&self, segment: impl Into<String>) -> Self {
		let segment = segment.into();
		self.derive(|c| c.path.push(segment))
	}

	pub fn with_field_selection<I, S>(&self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
		self.derive(|c| c.field_selection = Some(Arc::new(fields)))
	}

	/// Records the entity type the top-level operation targets.
	pub fn with_query_root(&self, entity_type: impl Into<String>) -> Self {
		let entity_type = entity_type.into();
		self.derive(|c| c.query_root = Some(entity_type))
	}

	/// Marks the request as a global search fanning out across entity types.
	pub fn as_search(&self) -> Self {
		self.derive(|c| c.is_search = true)
	}

	/// Marks the context as belonging to an in-progress entitlement lookup.
	pub fn entering_entitlement_check(&self) -> Self {
		self.derive(|c| c.entitlement_check = true)
	}

	pub fn with_cancellation(&self, token: CancellationToken) -> Self {
		self.derive(|c| c.cancellation = token)
	}

	/// Sets a deadline; an earlier existing deadline is kept.
	pub fn with_deadline(&self, deadline: Instant) -> Self {
		self.derive(|c| {
			c.deadline = Some(match c.deadline {
				Some(existing) if existing < deadline => existing,
				_ => deadline,
			})
		})
	}

	pub fn with_timeout(&self, timeout: Duration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Attaches an arbitrary typed value, replacing any previous value of the same type.
	pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
		self.derive(|c| {
			c.extensions.insert(TypeId::of::<T>(), Arc::new(value));
		})
	}

	/// Looks up a value attached with [`with_value`](Self::with_value).
	pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
		self.inner
			.extensions
			.get(&TypeId::of::<T>())
			.and_then(|v| v.downcast_ref::<T>())
	}

	pub fn identity(&self) -> Option<&Identity> {
		self.inner.identity.as_deref()
	}

	pub fn is_allowed(&self) -> bool {
		self.inner.allowed
	}

	pub fn bypass_tokens(&self) -> &[BypassToken] {
		&self.inner.bypass_tokens
	}

	pub fn bypass_token(&self, kind: BypassTokenKind) -> Option<&BypassToken> {
		self.inner.bypass_tokens.iter().find(|t| t.kind == kind)
	}

	pub fn has_bypass_token(&self, kind: BypassTokenKind) -> bool {
		self.bypass_token(kind).is_some()
	}

	pub fn is_internal_request(&self) -> bool {
		self.has_bypass_token(BypassTokenKind::InternalRequest)
	}

	pub fn path(&self) -> &[String] {
		&self.inner.path
	}

	/// Whether the caller selected `field`. Without a selection nothing is selected.
	pub fn field_requested(&self, field: &str) -> bool {
		self.inner
			.field_selection
			.as_ref()
			.is_some_and(|f| f.contains(field))
	}

	pub fn query_root(&self) -> Option<&str> {
		self.inner.query_root.as_deref()
	}

	pub fn is_search(&self) -> bool {
		self.inner.is_search
	}

	pub fn in_entitlement_check(&self) -> bool {
		self.inner.entitlement_check
	}

	pub fn cache(&self) -> &RequestCache {
		&self.inner.cache
	}

	pub fn errors(&self) -> &ErrorEnvelope {
		&self.inner.errors
	}

	pub fn cancellation(&self) -> &CancellationToken {
		&self.inner.cancellation
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.inner.deadline
	}

	/// Drives `fut` unless the request is cancelled or its deadline passes first.
	pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
		if self.inner.cancellation.is_cancelled() {
			return Err(Interrupted::Cancelled);
		}
		match self.inner.deadline {
			Some(deadline) => tokio::select! {
				biased;
				_ = self.inner.cancellation.cancelled() => Err(Interrupted::Cancelled),
				out = tokio::time::timeout_at(deadline, fut) => out.map_err(|_| Interrupted::DeadlineExceeded),
			},
			None => tokio::select! {
				biased;
				_ = self.inner.cancellation.cancelled() => Err(Interrupted::Cancelled),
				out = fut => Ok(out),
			},
		}
	}
}

impl fmt::Debug for RequestContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RequestContext")
			.field("identity", &self.inner.identity)
			.field("allowed", &self.inner.allowed)
			.field("bypass_tokens", &self.inner.bypass_tokens)
			.field("path", &self.inner.path)
			.field("query_root", &self.inner.query_root)
			.field("is_search", &self.inner.is_search)
			.field("entitlement_check", &self.inner.entitlement_check)
			.field("deadline", &self.inner.deadline)
			.finish_non_exhaustive()
	}
}
