// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Orchestration of policy chains, traversal filters and result transformers.
//!
//! A read runs the entity's read chain, then every traversal filter, then the
//! storage query, then every result transformer. A denied read never reaches
//! the filters or storage and surfaces as [`AuthzError::NotFound`].

use std::collections::HashMap;
use std::sync::Arc;

use tessera_server_config::ServerConfig;
use tracing::{debug, info, instrument, warn};

use crate::access::AccessChecker;
use crate::context::RequestContext;
use crate::decision::Decision;
use crate::error::AuthzError;
use crate::feature::{EntitlementSource, Entitlements, FeatureGate};
use crate::policy::rules::pre_policy;
use crate::policy::{Operation, PolicyChain, Rule};
use crate::query::{QueryExecutor, Queryable, ResultSet, Row};
use crate::registry::EntityRegistry;
use crate::transform::{
	MembershipDedup, ObjectAccessFilter, ResultOrigin, ResultTransformer, SecretRedactor, TransformTarget,
};
use crate::traversal::{ListObjectsFilter, OrgHierarchy, OrgScopeFilter, TraversalFilter};

pub struct AuthzEngine {
	registry: Arc<EntityRegistry>,
	default_read: PolicyChain,
	default_write: PolicyChain,
	read_chains: HashMap<String, PolicyChain>,
	write_chains: HashMap<String, PolicyChain>,
	filters: Vec<Arc<dyn TraversalFilter>>,
	transformers: Vec<Arc<dyn ResultTransformer>>,
}

impl AuthzEngine {
	pub fn builder(registry: EntityRegistry) -> AuthzEngineBuilder {
		AuthzEngineBuilder::new(registry)
	}

	pub fn registry(&self) -> &Arc<EntityRegistry> {
		&self.registry
	}

	fn read_chain(&self, entity_type: &str) -> &PolicyChain {
		self.read_chains.get(entity_type).unwrap_or(&self.default_read)
	}

	fn write_chain(&self, entity_type: &str) -> &PolicyChain {
		self.write_chains.get(entity_type).unwrap_or(&self.default_write)
	}

	/// Authorizes, narrows, executes and shapes a read.
	#[instrument(
		level = "debug",
		skip(self, ctx, executor, query),
		fields(entity_type = %query.entity_type(), op = %query.op())
	)]
	pub async fn query<E: QueryExecutor>(
		&self,
		ctx: &RequestContext,
		executor: &E,
		mut query: E::Query,
	) -> Result<ResultSet, AuthzError> {
		let entity_type = query.entity_type().to_string();
		if !self.registry.contains(&entity_type) {
			warn!(entity_type = %entity_type, "Query on unregistered entity type");
			return Err(AuthzError::not_found(entity_type));
		}

		let op = Operation::query(entity_type.as_str(), query.op());
		let verdict = self.read_chain(&entity_type).evaluate(ctx, &op).await?;
		if !verdict.is_allowed() {
			return Err(AuthzError::not_found(entity_type));
		}

		for filter in &self.filters {
			filter.apply(ctx, &mut query).await?;
			debug!(filter = filter.name(), "Applied traversal filter");
		}

		let mut result = executor.execute(ctx, query).await?;
		self.run_transformers(ctx, &TransformTarget::query(entity_type), &mut result)
			.await?;
		Ok(result)
	}

	/// Runs the write chain for a mutation. A deny becomes [`AuthzError::PermissionDenied`].
	#[instrument(level = "debug", skip(self, ctx, op), fields(entity_type = %op.entity_type, op = %op.kind))]
	pub async fn authorize_mutation(&self, ctx: &RequestContext, op: &Operation) -> Result<(), AuthzError> {
		if !self.registry.contains(&op.entity_type) {
			warn!(entity_type = %op.entity_type, "Mutation on unregistered entity type");
			return Err(AuthzError::permission_denied(
				op.entity_type.as_str(),
				"entity type is not registered",
			));
		}
		let verdict = self.write_chain(&op.entity_type).evaluate(ctx, op).await?;
		match verdict.decision {
			Decision::Deny(reason) => {
				info!(entity_type = %op.entity_type, rule = ?verdict.rule, "Mutation denied");
				Err(AuthzError::permission_denied(op.entity_type.as_str(), reason))
			}
			_ => Ok(()),
		}
	}

	/// Shapes the row returned by a create or update before it leaves the engine.
	pub async fn transform_mutation_result(
		&self,
		ctx: &RequestContext,
		entity_type: &str,
		origin: ResultOrigin,
		row: Row,
	) -> Result<Row, AuthzError> {
		let mut result = ResultSet::Single(Some(row));
		self.run_transformers(ctx, &TransformTarget::new(entity_type, origin), &mut result)
			.await?;
		match result {
			ResultSet::Single(Some(row)) => Ok(row),
			_ => Err(AuthzError::not_found(entity_type)),
		}
	}

	async fn run_transformers(
		&self,
		ctx: &RequestContext,
		target: &TransformTarget,
		result: &mut ResultSet,
	) -> Result<(), AuthzError> {
		for transformer in &self.transformers {
			transformer.transform(ctx, target, result).await?;
		}
		Ok(())
	}
}

impl std::fmt::Debug for AuthzEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AuthzEngine")
			.field("entities", &self.registry.len())
			.field("read_chains", &self.read_chains.len())
			.field("write_chains", &self.write_chains.len())
			.field("filters", &self.filters.iter().map(|f| f.name()).collect::<Vec<_>>())
			.field("transformers", &self.transformers.iter().map(|t| t.name()).collect::<Vec<_>>())
			.finish()
	}
}

/// Builder for [`AuthzEngine`]. Pre-policy rules are prepended to every chain.
pub struct AuthzEngineBuilder {
	registry: Arc<EntityRegistry>,
	pre_rules: Vec<Arc<dyn Rule>>,
	read_chains: HashMap<String, PolicyChain>,
	write_chains: HashMap<String, PolicyChain>,
	filters: Vec<Arc<dyn TraversalFilter>>,
	transformers: Vec<Arc<dyn ResultTransformer>>,
}

impl AuthzEngineBuilder {
	pub fn new(registry: EntityRegistry) -> Self {
		Self {
			registry: Arc::new(registry),
			pre_rules: pre_policy(),
			read_chains: HashMap::new(),
			write_chains: HashMap::new(),
			filters: Vec::new(),
			transformers: Vec::new(),
		}
	}

	/// Shared registry for constructing filters and transformers.
	pub fn registry(&self) -> Arc<EntityRegistry> {
		self.registry.clone()
	}

	/// Replaces the global pre-policy.
	pub fn pre_rules(mut self, rules: Vec<Arc<dyn Rule>>) -> Self {
		self.pre_rules = rules;
		self
	}

	pub fn read_policy(mut self, entity_type: impl Into<String>, chain: PolicyChain) -> Self {
		self.read_chains.insert(entity_type.into(), chain);
		self
	}

	pub fn write_policy(mut self, entity_type: impl Into<String>, chain: PolicyChain) -> Self {
		self.write_chains.insert(entity_type.into(), chain);
		self
	}

	pub fn filter(mut self, filter: impl TraversalFilter + 'static) -> Self {
		self.filters.push(Arc::new(filter));
		self
	}

	pub fn transformer(mut self, transformer: impl ResultTransformer + 'static) -> Self {
		self.transformers.push(Arc::new(transformer));
		self
	}

	/// Tenant scoping, list-objects scoping, feature gating, post-query object
	/// checks, redaction and deduplication wired from configuration.
	///
	/// Decryption and enrichment need injected capabilities and are added with
	/// [`AuthzEngineBuilder::transformer`].
	pub fn standard_pipeline(
		self,
		config: &ServerConfig,
		access: Arc<dyn AccessChecker>,
		hierarchy: Arc<dyn OrgHierarchy>,
		entitlements: Arc<dyn EntitlementSource>,
	) -> Self {
		let registry = self.registry();
		let entitlements = Entitlements::from_config(&config.modules, entitlements);
		self.filter(OrgScopeFilter::new(registry.clone(), hierarchy))
			.filter(ListObjectsFilter::from_config(registry.clone(), access.clone(), &config.authz))
			.filter(FeatureGate::new(registry.clone(), entitlements))
			.transformer(ObjectAccessFilter::from_config(registry.clone(), access, &config.authz))
			.transformer(SecretRedactor::new(registry.clone()))
			.transformer(MembershipDedup::new(registry))
	}

	pub fn build(self) -> AuthzEngine {
		let pre = self.pre_rules;
		let attach = |chains: HashMap<String, PolicyChain>| -> HashMap<String, PolicyChain> {
			chains
				.into_iter()
				.map(|(entity, chain)| (entity, chain.with_pre_rules(pre.clone())))
				.collect()
		};
		let read_chains = attach(self.read_chains);
		let write_chains = attach(self.write_chains);
		AuthzEngine {
			default_read: PolicyChain::read().with_pre_rules(pre.clone()),
			default_write: PolicyChain::write().with_pre_rules(pre.clone()),
			registry: self.registry,
			read_chains,
			write_chains,
			filters: self.filters,
			transformers: self.transformers,
		}
	}
}
