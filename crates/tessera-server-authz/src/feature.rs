// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Organization feature-module entitlements and the query-side feature gate.
//!
//! Entitlements are resolved lazily through an [`EntitlementSource`] and
//! remembered in the request cache. A source may itself query storage through
//! the engine; the lookup runs on a context marked with
//! [`RequestContext::entering_entitlement_check`] and [`FeatureGate`] steps
//! aside for such contexts, so the lookup is never gated by the check it is
//! resolving.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tessera_server_config::ModulesConfig;
use tracing::{debug, info, instrument};

use crate::context::{GraphError, RequestContext};
use crate::error::AuthzError;
use crate::query::{Predicate, Queryable};
use crate::registry::{EntityRegistry, Scoping};
use crate::traversal::TraversalFilter;
use crate::types::{OrgId, OrgModule};

/// Where enabled modules for an organization come from.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
	async fn enabled_modules(&self, ctx: &RequestContext, org_id: OrgId) -> Result<BTreeSet<OrgModule>, AuthzError>;
}

/// A fixed map of organization entitlements.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlements {
	modules: HashMap<OrgId, BTreeSet<OrgModule>>,
}

impl StaticEntitlements {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder: entitle `org_id` to `modules`.
	pub fn with_org(mut self, org_id: OrgId, modules: impl IntoIterator<Item = OrgModule>) -> Self {
		self.modules.entry(org_id).or_default().extend(modules);
		self
	}
}

#[async_trait]
impl EntitlementSource for StaticEntitlements {
	async fn enabled_modules(&self, _ctx: &RequestContext, org_id: OrgId) -> Result<BTreeSet<OrgModule>, AuthzError> {
		Ok(self.modules.get(&org_id).cloned().unwrap_or_default())
	}
}

/// Resolves and caches entitlements for the current request.
#[derive(Clone)]
pub struct Entitlements {
	source: Option<Arc<dyn EntitlementSource>>,
}

impl Entitlements {
	pub fn new(source: Arc<dyn EntitlementSource>) -> Self {
		Self { source: Some(source) }
	}

	/// Gating switched off: every organization holds every module.
	pub fn disabled() -> Self {
		Self { source: None }
	}

	pub fn from_config(config: &ModulesConfig, source: Arc<dyn EntitlementSource>) -> Self {
		if config.enabled {
			Self::new(source)
		} else {
			Self::disabled()
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.source.is_some()
	}

	/// Modules enabled for `org_id`, consulting the source at most once per request.
	#[instrument(level = "debug", skip(self, ctx), fields(org_id = %org_id))]
	pub async fn modules_for(&self, ctx: &RequestContext, org_id: OrgId) -> Result<BTreeSet<OrgModule>, AuthzError> {
		let Some(source) = &self.source else {
			return Ok(OrgModule::all().iter().copied().collect());
		};
		if let Some(cached) = ctx.cache().features(org_id) {
			return Ok(cached);
		}

		let lookup_ctx = ctx.entering_entitlement_check();
		let modules = source.enabled_modules(&lookup_ctx, org_id).await?;
		debug!(count = modules.len(), "Resolved organization modules");
		ctx.cache().store_features(org_id, modules.clone());
		Ok(modules)
	}
}

impl std::fmt::Debug for Entitlements {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Entitlements")
			.field("enabled", &self.is_enabled())
			.finish()
	}
}

/// Traversal filter that empties queries on entity types the caller's
/// organizations are not entitled to, recording a structured error.
#[derive(Debug, Clone)]
pub struct FeatureGate {
	registry: Arc<EntityRegistry>,
	entitlements: Entitlements,
}

impl FeatureGate {
	pub fn new(registry: Arc<EntityRegistry>, entitlements: Entitlements) -> Self {
		Self {
			registry,
			entitlements,
		}
	}

	fn record(ctx: &RequestContext, entity_type: &str, module: OrgModule) {
		if ctx.is_search() {
			return;
		}
		let path = if ctx.path().is_empty() {
			vec![entity_type.to_string()]
		} else {
			ctx.path().to_vec()
		};
		let err = AuthzError::FeatureNotEnabled {
			module,
			path: path.clone(),
		};
		ctx.errors().push(GraphError {
			code: err.code().to_string(),
			message: err.to_string(),
			path,
		});
	}
}

#[async_trait]
impl TraversalFilter for FeatureGate {
	fn name(&self) -> &'static str {
		"feature_gate"
	}

	#[instrument(level = "debug", skip(self, ctx, query), fields(entity_type = %query.entity_type()))]
	async fn apply(&self, ctx: &RequestContext, query: &mut dyn Queryable) -> Result<(), AuthzError> {
		if ctx.in_entitlement_check() || !self.entitlements.is_enabled() {
			return Ok(());
		}
		if ctx.is_allowed() || ctx.is_internal_request() {
			return Ok(());
		}
		let Some(descriptor) = self.registry.get(query.entity_type()) else {
			return Ok(());
		};
		let Some(requirement) = &descriptor.modules else {
			return Ok(());
		};
		let Some(identity) = ctx.identity() else {
			return Ok(());
		};
		if identity.is_system_admin {
			return Ok(());
		}

		let orgs: Vec<OrgId> = match identity.current_org() {
			Some(org) => vec![org],
			None => identity.organization_ids.iter().copied().collect(),
		};
		if orgs.is_empty() {
			return Ok(());
		}

		let mut entitled = 0usize;
		let mut unentitled = Vec::new();
		let mut first_missing = None;
		for org in &orgs {
			let enabled = self.entitlements.modules_for(ctx, *org).await?;
			match requirement.first_missing(&enabled) {
				None => entitled += 1,
				Some(module) => {
					unentitled.push(*org);
					first_missing.get_or_insert(module);
				}
			}
		}

		let Some(module) = first_missing else {
			return Ok(());
		};

		if entitled == 0 {
			info!(module = %module, "Organization lacks module, emptying query");
			query.where_p(Predicate::False);
			Self::record(ctx, &descriptor.entity_type, module);
			return Ok(());
		}

		// Excluding the unentitled orgs keeps whatever scope other filters
		// built for the entitled ones, including hierarchy and null owners.
		let Scoping::OrgOwner {
			field,
			allow_null_owner,
			..
		} = &descriptor.scoping
		else {
			debug!(entitled, "Some organization is entitled, leaving query unscoped by module");
			return Ok(());
		};
		debug!(entitled, excluded = unentitled.len(), "Excluding unentitled organizations");
		let excluded = Predicate::negate(Predicate::field_in(
			field.as_str(),
			unentitled.iter().map(ToString::to_string),
		));
		let predicate = if *allow_null_owner {
			Predicate::or(vec![Predicate::is_null(field.as_str()), excluded])
		} else {
			excluded
		};
		query.where_p(predicate);
		Ok(())
	}
}
