// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Built-in policy rules.
//!
//! Pre-policy rules ([`AllowIfInternalRequest`], [`AllowIfContextAllowed`]) run
//! ahead of every entity chain. The rest are composed per entity type.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_server_config::AuthzServiceConfig;
use tracing::{debug, error, instrument};

use super::{MutationOp, OpKind, Operation, Rule};
use crate::access::{AccessCheck, AccessChecker, ContextualTuple, ObjectRef};
use crate::context::{BypassTokenKind, RequestContext};
use crate::decision::Decision;
use crate::error::AuthzError;
use crate::feature::Entitlements;
use crate::identity::Identity;
use crate::registry::ModuleRequirement;
use crate::types::{OrgId, Relation};

/// The global pre-policy run before every entity chain.
pub fn pre_policy() -> Vec<Arc<dyn Rule>> {
	vec![Arc::new(AllowIfInternalRequest), Arc::new(AllowIfContextAllowed)]
}

fn require_identity<'a>(ctx: &'a RequestContext, rule: &str) -> Result<&'a Identity, AuthzError> {
	ctx.identity()
		.ok_or_else(|| AuthzError::MisconfiguredContext(format!("{rule}: no authenticated subject")))
}

// =============================================================================
// Bypass rules
// =============================================================================

/// Allows requests marked as internal service-to-service calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowIfInternalRequest;

#[async_trait]
impl Rule for AllowIfInternalRequest {
	fn name(&self) -> &'static str {
		"allow_if_internal_request"
	}

	async fn evaluate(&self, ctx: &RequestContext, _op: &Operation) -> Result<Decision, AuthzError> {
		Ok(if ctx.is_internal_request() {
			Decision::Allow
		} else {
			Decision::Skip
		})
	}
}

/// Allows requests whose context was already authorized upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowIfContextAllowed;

#[async_trait]
impl Rule for AllowIfContextAllowed {
	fn name(&self) -> &'static str {
		"allow_if_context_allowed"
	}

	async fn evaluate(&self, ctx: &RequestContext, _op: &Operation) -> Result<Decision, AuthzError> {
		Ok(if ctx.is_allowed() { Decision::Allow } else { Decision::Skip })
	}
}

/// Allows an operation pre-authorized by a bypass token of exactly `kind`.
///
/// With a matching field set, the token payload must also equal that field of
/// the mutation, so a signup token for one address cannot create another.
#[derive(Debug, Clone)]
pub struct AllowIfBypassToken {
	kind: BypassTokenKind,
	matching_field: Option<String>,
}

impl AllowIfBypassToken {
	pub fn new(kind: BypassTokenKind) -> Self {
		Self {
			kind,
			matching_field: None,
		}
	}

	pub fn matching_field(mut self, field: impl Into<String>) -> Self {
		self.matching_field = Some(field.into());
		self
	}
}

#[async_trait]
impl Rule for AllowIfBypassToken {
	fn name(&self) -> &'static str {
		"allow_if_bypass_token"
	}

	async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError> {
		let Some(token) = ctx.bypass_token(self.kind) else {
			return Ok(Decision::Skip);
		};
		let Some(field) = &self.matching_field else {
			return Ok(Decision::Allow);
		};
		match (token.payload(), op.field_str(field)) {
			(Some(payload), Some(value)) if payload == value => Ok(Decision::Allow),
			_ => {
				debug!(kind = %self.kind, field = %field, "Bypass token does not match mutation");
				Ok(Decision::Skip)
			}
		}
	}
}

/// Allows system administrators.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowIfSystemAdmin;

#[async_trait]
impl Rule for AllowIfSystemAdmin {
	fn name(&self) -> &'static str {
		"allow_if_system_admin"
	}

	async fn evaluate(&self, ctx: &RequestContext, _op: &Operation) -> Result<Decision, AuthzError> {
		Ok(match ctx.identity() {
			Some(identity) if identity.is_system_admin => Decision::Allow,
			_ => Decision::Skip,
		})
	}
}

/// Allows creates. Usually wrapped in [`OnOperations`] or placed after the
/// checks that must hold for every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowCreate;

#[async_trait]
impl Rule for AllowCreate {
	fn name(&self) -> &'static str {
		"allow_create"
	}

	async fn evaluate(&self, _ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError> {
		Ok(if op.mutation_op() == Some(MutationOp::Create) {
			Decision::Allow
		} else {
			Decision::Skip
		})
	}
}

// =============================================================================
// Identity rules
// =============================================================================

/// Fails the request when no authenticated subject is bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyIfNotAuthenticated;

#[async_trait]
impl Rule for DenyIfNotAuthenticated {
	fn name(&self) -> &'static str {
		"deny_if_not_authenticated"
	}

	async fn evaluate(&self, ctx: &RequestContext, _op: &Operation) -> Result<Decision, AuthzError> {
		require_identity(ctx, self.name())?;
		Ok(Decision::Skip)
	}
}

/// Denies anonymous trust-center visitors.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyIfAnonymous;

#[async_trait]
impl Rule for DenyIfAnonymous {
	fn name(&self) -> &'static str {
		"deny_if_anonymous"
	}

	async fn evaluate(&self, ctx: &RequestContext, _op: &Operation) -> Result<Decision, AuthzError> {
		Ok(match ctx.identity() {
			Some(identity) if identity.is_anonymous() => Decision::deny("anonymous users cannot perform this operation"),
			_ => Decision::Skip,
		})
	}
}

// =============================================================================
// Relationship rules
// =============================================================================

/// Checks `relation` between the caller and the organization that owns the
/// operation, falling back to the caller's current organization.
#[derive(Clone)]
pub struct CheckOrgAccess {
	relation: Relation,
	access: Arc<dyn AccessChecker>,
	send_org_context: bool,
}

impl CheckOrgAccess {
	pub fn new(relation: Relation, access: Arc<dyn AccessChecker>) -> Self {
		Self {
			relation,
			access,
			send_org_context: false,
		}
	}

	/// Honours `authz.send_org_context` from configuration.
	pub fn from_config(relation: Relation, access: Arc<dyn AccessChecker>, config: &AuthzServiceConfig) -> Self {
		Self::new(relation, access).with_org_context(config.send_org_context)
	}

	/// Builder: send the caller's email domain as a contextual tuple.
	pub fn with_org_context(mut self, send: bool) -> Self {
		self.send_org_context = send;
		self
	}

	fn target_org(identity: &Identity, op: &Operation) -> Option<OrgId> {
		op.owner_id.or_else(|| identity.current_org())
	}
}

#[async_trait]
impl Rule for CheckOrgAccess {
	fn name(&self) -> &'static str {
		"check_org_access"
	}

	#[instrument(level = "debug", skip(self, ctx, op), fields(relation = %self.relation, entity_type = %op.entity_type))]
	async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError> {
		let identity = require_identity(ctx, self.name())?;
		let Some(org_id) = Self::target_org(identity, op) else {
			return Ok(Decision::Skip);
		};

		if self.relation == Relation::CanView && identity.is_org_member(org_id) {
			return Ok(Decision::Allow);
		}
		if ctx.cache().has_relation(identity.subject_id, org_id, self.relation) {
			debug!(org_id = %org_id, "Organization access served from request cache");
			return Ok(Decision::Allow);
		}

		let mut check = AccessCheck::for_identity(identity, self.relation, ObjectRef::organization(org_id));
		if self.send_org_context {
			if let Some(context) = ContextualTuple::for_identity(identity) {
				check = check.with_context(context);
			}
		}

		let allowed = self.access.check_access(ctx, &check).await.map_err(|e| {
			error!(error = %e, org_id = %org_id, "Organization access check failed");
			AuthzError::from(e)
		})?;
		if allowed {
			ctx.cache().store_relation(identity.subject_id, org_id, self.relation);
			Ok(Decision::Allow)
		} else {
			Ok(Decision::deny(format!("{} denied on organization {}", self.relation, org_id)))
		}
	}
}

/// Checks `relation` between the caller and the object the mutation targets.
#[derive(Clone)]
pub struct CheckObjectAccess {
	object_type: String,
	relation: Relation,
	access: Arc<dyn AccessChecker>,
}

impl CheckObjectAccess {
	pub fn new(object_type: impl Into<String>, relation: Relation, access: Arc<dyn AccessChecker>) -> Self {
		Self {
			object_type: object_type.into(),
			relation,
			access,
		}
	}
}

#[async_trait]
impl Rule for CheckObjectAccess {
	fn name(&self) -> &'static str {
		"check_object_access"
	}

	#[instrument(level = "debug", skip(self, ctx, op), fields(relation = %self.relation, object_type = %self.object_type))]
	async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError> {
		if op.mutation_op() == Some(MutationOp::Create) {
			return Ok(Decision::Skip);
		}
		let Some(target) = &op.target_id else {
			return Ok(Decision::Skip);
		};
		let identity = require_identity(ctx, self.name())?;

		let object = ObjectRef::new(self.object_type.as_str(), target.as_str());
		let check = AccessCheck::for_identity(identity, self.relation, object);
		let allowed = self.access.check_access(ctx, &check).await.map_err(|e| {
			error!(error = %e, object = %check.object, "Object access check failed");
			AuthzError::from(e)
		})?;
		Ok(if allowed {
			Decision::Allow
		} else {
			Decision::deny(format!("{} denied on {}", self.relation, check.object))
		})
	}
}

// =============================================================================
// Feature rules
// =============================================================================

/// Denies writes for organizations missing the modules an entity type needs.
#[derive(Debug, Clone)]
pub struct DenyIfMissingFeatures {
	requirement: ModuleRequirement,
	entitlements: Entitlements,
}

impl DenyIfMissingFeatures {
	/// Every module in `requirement` must be enabled.
	pub fn all(requirement: impl IntoIterator<Item = crate::types::OrgModule>, entitlements: Entitlements) -> Self {
		Self {
			requirement: ModuleRequirement::all_of(requirement),
			entitlements,
		}
	}

	/// At least one module in `requirement` must be enabled.
	pub fn any(requirement: impl IntoIterator<Item = crate::types::OrgModule>, entitlements: Entitlements) -> Self {
		Self {
			requirement: ModuleRequirement::any_of(requirement),
			entitlements,
		}
	}

	fn bypassed(ctx: &RequestContext) -> bool {
		const EXEMPT: [BypassTokenKind; 5] = [
			BypassTokenKind::Signup,
			BypassTokenKind::Reset,
			BypassTokenKind::Verify,
			BypassTokenKind::JobRunnerRegistration,
			BypassTokenKind::InternalRequest,
		];
		ctx.is_allowed() || ctx.is_internal_request() || EXEMPT.iter().any(|k| ctx.has_bypass_token(*k))
	}
}

#[async_trait]
impl Rule for DenyIfMissingFeatures {
	fn name(&self) -> &'static str {
		match self.requirement {
			ModuleRequirement::AllOf(_) => "deny_if_missing_all_features",
			ModuleRequirement::AnyOf(_) => "deny_if_missing_any_feature",
		}
	}

	#[instrument(level = "debug", skip(self, ctx, op), fields(entity_type = %op.entity_type))]
	async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError> {
		if Self::bypassed(ctx) || self.requirement.modules().is_empty() {
			return Ok(Decision::Skip);
		}
		let Some(identity) = ctx.identity() else {
			return Ok(Decision::Skip);
		};
		let Some(org_id) = op.owner_id.or_else(|| identity.current_org()) else {
			return Ok(Decision::Skip);
		};

		let enabled = self.entitlements.modules_for(ctx, org_id).await?;
		match self.requirement.first_missing(&enabled) {
			None => Ok(Decision::Skip),
			Some(module) => {
				let err = AuthzError::FeatureNotEnabled {
					module,
					path: vec![op.entity_type.clone()],
				};
				Ok(Decision::deny(err.to_string()))
			}
		}
	}
}

// =============================================================================
// Combinators
// =============================================================================

/// Runs `inner` only for the listed operation kinds and skips otherwise.
#[derive(Clone)]
pub struct OnOperations {
	kinds: HashSet<OpKind>,
	inner: Arc<dyn Rule>,
}

impl OnOperations {
	pub fn new(kinds: impl IntoIterator<Item = OpKind>, inner: impl Rule + 'static) -> Self {
		Self {
			kinds: kinds.into_iter().collect(),
			inner: Arc::new(inner),
		}
	}

	/// Restricts `inner` to the given mutations.
	pub fn mutations(ops: impl IntoIterator<Item = MutationOp>, inner: impl Rule + 'static) -> Self {
		Self::new(ops.into_iter().map(OpKind::Mutation), inner)
	}
}

#[async_trait]
impl Rule for OnOperations {
	fn name(&self) -> &'static str {
		self.inner.name()
	}

	async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError> {
		if !self.kinds.contains(&op.kind) {
			return Ok(Decision::Skip);
		}
		self.inner.evaluate(ctx, op).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::access::recording::Recording;
	use crate::access::TupleStore;
	use crate::context::BypassToken;
	use crate::feature::StaticEntitlements;
	use crate::policy::PolicyChain;
	use crate::query::QueryOp;
	use crate::types::{OrgModule, SubjectId};

	fn create(entity: &str) -> Operation {
		Operation::mutation(entity, MutationOp::Create)
	}

	mod bypass {
		use super::*;

		#[tokio::test]
		async fn token_unlocks_only_its_own_kind() {
			let invite_rule = AllowIfBypassToken::new(BypassTokenKind::OrgInvite);
			let signup_rule = AllowIfBypassToken::new(BypassTokenKind::Signup);
			let ctx = RequestContext::new().with_bypass_token(BypassToken::new(BypassTokenKind::Signup, "a@example.com"));

			assert_eq!(invite_rule.evaluate(&ctx, &create("Invite")).await.unwrap(), Decision::Skip);
			assert_eq!(signup_rule.evaluate(&ctx, &create("User")).await.unwrap(), Decision::Allow);
		}

		#[tokio::test]
		async fn payload_must_match_field() {
			let rule = AllowIfBypassToken::new(BypassTokenKind::Signup).matching_field("email");
			let ctx = RequestContext::new().with_bypass_token(BypassToken::new(BypassTokenKind::Signup, "a@example.com"));

			let same = create("User").with_field("email", "a@example.com");
			let other = create("User").with_field("email", "b@example.com");
			let missing = create("User");
			assert_eq!(rule.evaluate(&ctx, &same).await.unwrap(), Decision::Allow);
			assert_eq!(rule.evaluate(&ctx, &other).await.unwrap(), Decision::Skip);
			assert_eq!(rule.evaluate(&ctx, &missing).await.unwrap(), Decision::Skip);
		}

		#[tokio::test]
		async fn pre_policy_allows_trusted_contexts() {
			let chain = PolicyChain::write().with_pre_rules(pre_policy());
			let op = Operation::mutation("Task", MutationOp::Delete);

			let internal = chain.evaluate(&RequestContext::new().as_internal_request(), &op).await.unwrap();
			assert_eq!(internal.rule, Some("allow_if_internal_request"));
			let allowed = chain.evaluate(&RequestContext::new().with_allow(), &op).await.unwrap();
			assert_eq!(allowed.rule, Some("allow_if_context_allowed"));
			let plain = chain.evaluate(&RequestContext::new(), &op).await.unwrap();
			assert!(!plain.is_allowed());
		}
	}

	mod identity_rules {
		use super::*;

		#[tokio::test]
		async fn unauthenticated_is_an_error() {
			let err = DenyIfNotAuthenticated
				.evaluate(&RequestContext::new(), &create("Task"))
				.await
				.unwrap_err();
			assert_eq!(err.code(), "UNAUTHENTICATED");
		}

		#[tokio::test]
		async fn anonymous_visitors_are_denied() {
			let org = OrgId::generate();
			let visitor = RequestContext::for_identity(Identity::anonymous_trust_center(SubjectId::generate(), org));
			let user = RequestContext::for_identity(Identity::user(SubjectId::generate()));
			assert!(matches!(
				DenyIfAnonymous.evaluate(&visitor, &create("Task")).await.unwrap(),
				Decision::Deny(_)
			));
			assert_eq!(DenyIfAnonymous.evaluate(&user, &create("Task")).await.unwrap(), Decision::Skip);
		}

		#[tokio::test]
		async fn admins_and_creates() {
			let admin = RequestContext::for_identity(Identity::user(SubjectId::generate()).with_system_admin(true));
			assert_eq!(AllowIfSystemAdmin.evaluate(&admin, &create("Task")).await.unwrap(), Decision::Allow);

			let update = Operation::mutation("Task", MutationOp::Update);
			assert_eq!(AllowCreate.evaluate(&RequestContext::new(), &create("Task")).await.unwrap(), Decision::Allow);
			assert_eq!(AllowCreate.evaluate(&RequestContext::new(), &update).await.unwrap(), Decision::Skip);
		}
	}

	mod org_access {
		use super::*;

		#[tokio::test]
		async fn members_can_view_without_rpc() {
			let tuples = Arc::new(TupleStore::new());
			let org = OrgId::generate();
			let ctx = RequestContext::for_identity(Identity::user(SubjectId::generate()).with_org(org));
			let rule = CheckOrgAccess::new(Relation::CanView, tuples.clone());

			let op = Operation::query("Task", QueryOp::All).with_owner(org);
			assert_eq!(rule.evaluate(&ctx, &op).await.unwrap(), Decision::Allow);
			assert_eq!(tuples.calls(), 0);
		}

		#[tokio::test]
		async fn granted_relation_is_cached_for_the_request() {
			let tuples = Arc::new(TupleStore::new());
			let org = OrgId::generate();
			let user = Identity::user(SubjectId::generate()).with_org(org);
			tuples.grant(user.subject_id, Relation::CanEdit, ObjectRef::organization(org));
			let rule = CheckOrgAccess::new(Relation::CanEdit, tuples.clone());
			let ctx = RequestContext::for_identity(user);

			let op = Operation::mutation("Task", MutationOp::UpdateOne).with_owner(org);
			assert_eq!(rule.evaluate(&ctx, &op).await.unwrap(), Decision::Allow);
			assert_eq!(rule.evaluate(&ctx, &op).await.unwrap(), Decision::Allow);
			assert_eq!(tuples.calls(), 1);
		}

		#[tokio::test]
		async fn missing_relation_denies() {
			let tuples = Arc::new(TupleStore::new());
			let org = OrgId::generate();
			let ctx = RequestContext::for_identity(Identity::user(SubjectId::generate()).with_org(org));
			let rule = CheckOrgAccess::new(Relation::CanDelete, tuples);
			let op = Operation::mutation("Task", MutationOp::DeleteOne).with_owner(org);
			assert!(matches!(rule.evaluate(&ctx, &op).await.unwrap(), Decision::Deny(_)));
		}

		#[tokio::test]
		async fn upstream_failure_is_never_a_decision() {
			let tuples = Arc::new(TupleStore::new());
			tuples.set_unavailable(true);
			let org = OrgId::generate();
			let ctx = RequestContext::for_identity(Identity::user(SubjectId::generate()).with_org(org));
			let rule = CheckOrgAccess::new(Relation::CanEdit, tuples);
			let err = rule
				.evaluate(&ctx, &create("Task").with_owner(org))
				.await
				.unwrap_err();
			assert!(matches!(err, AuthzError::UpstreamUnavailable(_)));
		}

		#[tokio::test]
		async fn no_org_skips() {
			let rule = CheckOrgAccess::new(Relation::CanEdit, Arc::new(TupleStore::new()));
			let ctx = RequestContext::for_identity(Identity::user(SubjectId::generate()));
			assert_eq!(rule.evaluate(&ctx, &create("Task")).await.unwrap(), Decision::Skip);
		}

		#[tokio::test]
		async fn email_domain_sent_as_context() {
			let recorder = Arc::new(Recording {
				answer: true,
				..Default::default()
			});
			let org = OrgId::generate();
			let ctx = RequestContext::for_identity(
				Identity::user(SubjectId::generate())
					.with_org(org)
					.with_email("dev@example.com"),
			);
			let config = AuthzServiceConfig {
				send_org_context: true,
				..AuthzServiceConfig::default()
			};
			let rule = CheckOrgAccess::from_config(Relation::CanEdit, recorder.clone(), &config);
			rule.evaluate(&ctx, &create("Task").with_owner(org)).await.unwrap();

			let checks = recorder.checks.lock();
			assert_eq!(checks.len(), 1);
			assert_eq!(checks[0].context, Some(ContextualTuple::email_domain("example.com")));
		}

		#[tokio::test]
		async fn object_checks_skip_creates_and_untargeted_ops() {
			let tuples = Arc::new(TupleStore::new());
			let user = Identity::user(SubjectId::generate());
			tuples.grant(user.subject_id, Relation::CanEdit, ObjectRef::new("program", "p1"));
			let rule = CheckObjectAccess::new("program", Relation::CanEdit, tuples.clone());
			let ctx = RequestContext::for_identity(user);

			assert_eq!(rule.evaluate(&ctx, &create("Program")).await.unwrap(), Decision::Skip);
			let untargeted = Operation::mutation("Program", MutationOp::Update);
			assert_eq!(rule.evaluate(&ctx, &untargeted).await.unwrap(), Decision::Skip);

			let own = Operation::mutation("Program", MutationOp::UpdateOne).with_target("p1");
			let other = Operation::mutation("Program", MutationOp::UpdateOne).with_target("p2");
			assert_eq!(rule.evaluate(&ctx, &own).await.unwrap(), Decision::Allow);
			assert!(matches!(rule.evaluate(&ctx, &other).await.unwrap(), Decision::Deny(_)));
		}
	}

	mod features {
		use super::*;

		fn entitlements(org: OrgId, modules: impl IntoIterator<Item = OrgModule>) -> Entitlements {
			Entitlements::new(Arc::new(StaticEntitlements::new().with_org(org, modules)))
		}

		#[tokio::test]
		async fn missing_module_denies_with_reason() {
			let org = OrgId::generate();
			let rule = DenyIfMissingFeatures::all([OrgModule::Compliance], entitlements(org, [OrgModule::Base]));
			let ctx = RequestContext::for_identity(Identity::user(SubjectId::generate()).with_org(org));

			let decision = rule.evaluate(&ctx, &create("Control")).await.unwrap();
			assert_eq!(decision, Decision::deny("features are not enabled: compliance_module"));
			assert_eq!(rule.name(), "deny_if_missing_all_features");
		}

		#[tokio::test]
		async fn any_of_is_satisfied_by_one() {
			let org = OrgId::generate();
			let rule = DenyIfMissingFeatures::any(
				[OrgModule::Compliance, OrgModule::TrustCenter],
				entitlements(org, [OrgModule::TrustCenter]),
			);
			let ctx = RequestContext::for_identity(Identity::user(SubjectId::generate()).with_org(org));
			assert_eq!(rule.evaluate(&ctx, &create("Control")).await.unwrap(), Decision::Skip);
			assert_eq!(rule.name(), "deny_if_missing_any_feature");
		}

		#[tokio::test]
		async fn exempt_contexts_skip() {
			let org = OrgId::generate();
			let rule = DenyIfMissingFeatures::all([OrgModule::Compliance], entitlements(org, Vec::<OrgModule>::new()));
			let user = Identity::user(SubjectId::generate()).with_org(org);
			let op = create("Control");

			for ctx in [
				RequestContext::for_identity(user.clone()).with_allow(),
				RequestContext::for_identity(user.clone())
					.with_bypass_token(BypassToken::new(BypassTokenKind::Signup, "a@example.com")),
				RequestContext::for_identity(user.clone()).as_internal_request(),
				RequestContext::new(),
				RequestContext::for_identity(Identity::user(SubjectId::generate())),
			] {
				assert_eq!(rule.evaluate(&ctx, &op).await.unwrap(), Decision::Skip);
			}

			let invite = RequestContext::for_identity(user)
				.with_bypass_token(BypassToken::new(BypassTokenKind::OrgInvite, "a@example.com"));
			assert!(matches!(rule.evaluate(&invite, &op).await.unwrap(), Decision::Deny(_)));
		}

		#[tokio::test]
		async fn empty_requirement_skips() {
			let org = OrgId::generate();
			let rule = DenyIfMissingFeatures::all(Vec::<OrgModule>::new(), entitlements(org, Vec::<OrgModule>::new()));
			let ctx = RequestContext::for_identity(Identity::user(SubjectId::generate()).with_org(org));
			assert_eq!(rule.evaluate(&ctx, &create("Control")).await.unwrap(), Decision::Skip);
		}
	}

	#[tokio::test]
	async fn on_operations_restricts_inner_rule() {
		let rule = OnOperations::mutations([MutationOp::Delete, MutationOp::DeleteOne], DenyIfAnonymous);
		let org = OrgId::generate();
		let ctx = RequestContext::for_identity(Identity::anonymous_trust_center(SubjectId::generate(), org));

		assert_eq!(rule.evaluate(&ctx, &create("Task")).await.unwrap(), Decision::Skip);
		let delete = Operation::mutation("Task", MutationOp::DeleteOne);
		assert!(matches!(rule.evaluate(&ctx, &delete).await.unwrap(), Decision::Deny(_)));
		assert_eq!(rule.name(), "deny_if_anonymous");
	}
}
