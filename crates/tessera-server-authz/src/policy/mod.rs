// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule composition and policy chain evaluation.
//!
//! A [`PolicyChain`] is an ordered list of [`Rule`]s for one entity type and
//! one direction (read or write). Evaluation is first-decisive-result:
//!
//! 1. Global pre-policy rules run first.
//! 2. Entity rules run in declared order.
//! 3. The first `Allow` or `Deny` ends evaluation; later rules never run.
//! 4. If every rule skips, reads default to `Allow` (they are narrowed later
//!    by traversal filters) and writes default to `Deny`.
//! 5. A rule error aborts the chain and is returned unchanged.
//!
//! Rules may consult external services but never mutate decision state, so
//! the outcome depends only on the context, the operation and rule order.

pub mod rules;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::context::RequestContext;
use crate::decision::Decision;
use crate::error::AuthzError;
use crate::query::QueryOp;
use crate::types::OrgId;

// =============================================================================
// Operations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOp {
	Create,
	Update,
	UpdateOne,
	Delete,
	DeleteOne,
}

impl fmt::Display for MutationOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			MutationOp::Create => "Create",
			MutationOp::Update => "Update",
			MutationOp::UpdateOne => "UpdateOne",
			MutationOp::Delete => "Delete",
			MutationOp::DeleteOne => "DeleteOne",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
	Query(QueryOp),
	Mutation(MutationOp),
}

impl fmt::Display for OpKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OpKind::Query(op) => write!(f, "query:{op}"),
			OpKind::Mutation(op) => write!(f, "mutation:{op}"),
		}
	}
}

/// Evaluation direction, which selects the chain and its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Read,
	Write,
}

/// Descriptor of the operation a rule is asked about.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
	pub entity_type: String,
	pub kind: OpKind,
	/// Field values being written, for mutations.
	pub fields: Map<String, Value>,
	/// Id of the targeted row for single-row mutations.
	pub target_id: Option<String>,
	/// Owning organization of the targeted or created row, when known.
	pub owner_id: Option<OrgId>,
}

impl Operation {
	pub fn query(entity_type: impl Into<String>, op: QueryOp) -> Self {
		Self {
			entity_type: entity_type.into(),
			kind: OpKind::Query(op),
			fields: Map::new(),
			target_id: None,
			owner_id: None,
		}
	}

	pub fn mutation(entity_type: impl Into<String>, op: MutationOp) -> Self {
		Self {
			entity_type: entity_type.into(),
			kind: OpKind::Mutation(op),
			fields: Map::new(),
			target_id: None,
			owner_id: None,
		}
	}

	/// Builder: set a mutation field value.
	pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
		self.fields.insert(field.into(), value.into());
		self
	}

	pub fn with_target(mut self, id: impl Into<String>) -> Self {
		self.target_id = Some(id.into());
		self
	}

	pub fn with_owner(mut self, org_id: OrgId) -> Self {
		self.owner_id = Some(org_id);
		self
	}

	pub fn direction(&self) -> Direction {
		match self.kind {
			OpKind::Query(_) => Direction::Read,
			OpKind::Mutation(_) => Direction::Write,
		}
	}

	pub fn mutation_op(&self) -> Option<MutationOp> {
		match self.kind {
			OpKind::Mutation(op) => Some(op),
			OpKind::Query(_) => None,
		}
	}

	pub fn field_str(&self, field: &str) -> Option<&str> {
		self.fields.get(field).and_then(Value::as_str)
	}
}

// =============================================================================
// Rules
// =============================================================================

/// A single decision function over (context, operation).
#[async_trait]
pub trait Rule: Send + Sync {
	/// Stable name used in logs.
	fn name(&self) -> &'static str;

	async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError>;
}

type RuleFn = dyn Fn(&RequestContext, &Operation) -> Result<Decision, AuthzError> + Send + Sync;

/// Adapts a synchronous closure into a [`Rule`].
pub struct FnRule {
	name: &'static str,
	f: Box<RuleFn>,
}

impl FnRule {
	pub fn new<F>(name: &'static str, f: F) -> Self
	where
		F: Fn(&RequestContext, &Operation) -> Result<Decision, AuthzError> + Send + Sync + 'static,
	{
		Self { name, f: Box::new(f) }
	}
}

impl fmt::Debug for FnRule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnRule").field("name", &self.name).finish()
	}
}

#[async_trait]
impl Rule for FnRule {
	fn name(&self) -> &'static str {
		self.name
	}

	async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Decision, AuthzError> {
		(self.f)(ctx, op)
	}
}

// =============================================================================
// Chains
// =============================================================================

/// The terminal result of evaluating a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
	/// Always `Allow` or `Deny`.
	pub decision: Decision,
	/// Rule that decided, or `None` when the chain default applied.
	pub rule: Option<&'static str>,
}

impl Verdict {
	pub fn is_allowed(&self) -> bool {
		self.decision.is_allow()
	}
}

/// Ordered rules for one entity type and direction.
#[derive(Clone)]
pub struct PolicyChain {
	direction: Direction,
	pre: Vec<Arc<dyn Rule>>,
	rules: Vec<Arc<dyn Rule>>,
}

impl PolicyChain {
	pub fn new(direction: Direction) -> Self {
		Self {
			direction,
			pre: Vec::new(),
			rules: Vec::new(),
		}
	}

	pub fn read() -> Self {
		Self::new(Direction::Read)
	}

	pub fn write() -> Self {
		Self::new(Direction::Write)
	}

	/// Builder: set the global pre-policy rules run before entity rules.
	pub fn with_pre_rules(mut self, pre: Vec<Arc<dyn Rule>>) -> Self {
		self.pre = pre;
		self
	}

	/// Builder: append an entity rule.
	pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
		self.rules.push(Arc::new(rule));
		self
	}

	pub fn push(&mut self, rule: Arc<dyn Rule>) {
		self.rules.push(rule);
	}

	pub fn direction(&self) -> Direction {
		self.direction
	}

	pub fn len(&self) -> usize {
		self.pre.len() + self.rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn default_decision(&self) -> Decision {
		match self.direction {
			Direction::Read => Decision::Allow,
			Direction::Write => Decision::deny("no rule allowed the operation"),
		}
	}

	/// Runs the chain and returns its terminal verdict.
	#[instrument(
		level = "debug",
		skip(self, ctx, op),
		fields(entity_type = %op.entity_type, op = %op.kind, rules = self.len())
	)]
	pub async fn evaluate(&self, ctx: &RequestContext, op: &Operation) -> Result<Verdict, AuthzError> {
		for rule in self.pre.iter().chain(self.rules.iter()) {
			let decision = rule.evaluate(ctx, op).await?;
			match &decision {
				Decision::Skip => continue,
				Decision::Allow => {
					debug!(rule = rule.name(), decision = "allow", "Policy chain decided");
				}
				Decision::Deny(reason) => {
					info!(rule = rule.name(), decision = "deny", reason = %reason, "Policy chain denied operation");
				}
			}
			return Ok(Verdict {
				decision,
				rule: Some(rule.name()),
			});
		}

		let decision = self.default_decision();
		debug!(decision = %decision, "Policy chain fell through to default");
		Ok(Verdict { decision, rule: None })
	}
}

impl fmt::Debug for PolicyChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PolicyChain")
			.field("direction", &self.direction)
			.field("pre", &self.pre.iter().map(|r| r.name()).collect::<Vec<_>>())
			.field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn fixed(name: &'static str, decision: Decision) -> FnRule {
		FnRule::new(name, move |_, _| Ok(decision.clone()))
	}

	struct Counting {
		calls: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl Rule for Counting {
		fn name(&self) -> &'static str {
			"counting"
		}

		async fn evaluate(&self, _ctx: &RequestContext, _op: &Operation) -> Result<Decision, AuthzError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(Decision::Skip)
		}
	}

	fn read_op() -> Operation {
		Operation::query("Task", QueryOp::All)
	}

	fn write_op() -> Operation {
		Operation::mutation("Task", MutationOp::Create)
	}

	mod defaults {
		use super::*;

		#[tokio::test]
		async fn empty_read_chain_allows() {
			let verdict = PolicyChain::read()
				.evaluate(&RequestContext::new(), &read_op())
				.await
				.unwrap();
			assert_eq!(verdict.decision, Decision::Allow);
			assert_eq!(verdict.rule, None);
		}

		#[tokio::test]
		async fn empty_write_chain_denies() {
			let verdict = PolicyChain::write()
				.evaluate(&RequestContext::new(), &write_op())
				.await
				.unwrap();
			assert!(matches!(verdict.decision, Decision::Deny(_)));
			assert_eq!(verdict.rule, None);
		}
	}

	mod short_circuit {
		use super::*;

		#[tokio::test]
		async fn first_terminal_wins() {
			let calls = Arc::new(AtomicUsize::new(0));
			let chain = PolicyChain::write()
				.rule(fixed("skip", Decision::Skip))
				.rule(fixed("allow", Decision::Allow))
				.rule(fixed("deny", Decision::deny("late")))
				.rule(Counting { calls: calls.clone() });

			let verdict = chain.evaluate(&RequestContext::new(), &write_op()).await.unwrap();
			assert_eq!(verdict.decision, Decision::Allow);
			assert_eq!(verdict.rule, Some("allow"));
			assert_eq!(calls.load(Ordering::SeqCst), 0);
		}

		#[tokio::test]
		async fn pre_rules_run_before_entity_rules() {
			let chain = PolicyChain::read()
				.with_pre_rules(vec![Arc::new(fixed("pre_deny", Decision::deny("pre")))])
				.rule(fixed("allow", Decision::Allow));
			let verdict = chain.evaluate(&RequestContext::new(), &read_op()).await.unwrap();
			assert_eq!(verdict.rule, Some("pre_deny"));
		}

		#[tokio::test]
		async fn error_aborts_chain() {
			let calls = Arc::new(AtomicUsize::new(0));
			let chain = PolicyChain::read()
				.rule(FnRule::new("boom", |_, _| {
					Err(AuthzError::MisconfiguredContext("no identity".into()))
				}))
				.rule(Counting { calls: calls.clone() });

			let err = chain.evaluate(&RequestContext::new(), &read_op()).await.unwrap_err();
			assert!(matches!(err, AuthzError::MisconfiguredContext(_)));
			assert_eq!(calls.load(Ordering::SeqCst), 0);
		}
	}

	#[test]
	fn operation_direction() {
		assert_eq!(read_op().direction(), Direction::Read);
		assert_eq!(write_op().direction(), Direction::Write);
		assert_eq!(write_op().mutation_op(), Some(MutationOp::Create));
		let op = write_op().with_field("email", "ana@example.com");
		assert_eq!(op.field_str("email"), Some("ana@example.com"));
	}

	fn arb_decision() -> impl Strategy<Value = Decision> {
		prop_oneof![
			Just(Decision::Skip),
			Just(Decision::Allow),
			Just(Decision::deny("denied")),
		]
	}

	proptest! {
		#[test]
		fn verdict_is_first_terminal_or_default(
			decisions in prop::collection::vec(arb_decision(), 0..8),
			write in any::<bool>(),
		) {
			let mut chain = if write { PolicyChain::write() } else { PolicyChain::read() };
			for (i, d) in decisions.iter().enumerate() {
				let name: &'static str = ["r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7"][i];
				chain.push(Arc::new(fixed(name, d.clone())));
			}
			let op = if write { write_op() } else { read_op() };
			let verdict = tokio_test::block_on(chain.evaluate(&RequestContext::new(), &op)).unwrap();

			match decisions.iter().position(Decision::is_terminal) {
				Some(i) => {
					prop_assert_eq!(&verdict.decision, &decisions[i]);
					prop_assert_eq!(verdict.rule, Some(["r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7"][i]));
				}
				None => {
					prop_assert_eq!(verdict.rule, None);
					prop_assert_eq!(verdict.is_allowed(), !write);
				}
			}
		}
	}
}
