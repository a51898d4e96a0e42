// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_server_config::AuthzServiceConfig;
use tracing::{debug, error, instrument};

use super::{ResultOrigin, ResultTransformer, TransformTarget};
use crate::access::{AccessCheck, AccessChecker, ContextualTuple, ObjectRef};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::ResultSet;
use crate::registry::EntityRegistry;
use crate::traversal::bypasses_scoping;

/// Drops returned rows the caller holds no relation on, using one batch check
/// per result.
#[derive(Clone)]
pub struct ObjectAccessFilter {
	registry: Arc<EntityRegistry>,
	access: Arc<dyn AccessChecker>,
	send_org_context: bool,
}

impl ObjectAccessFilter {
	pub fn new(registry: Arc<EntityRegistry>, access: Arc<dyn AccessChecker>) -> Self {
		Self {
			registry,
			access,
			send_org_context: false,
		}
	}

	pub fn from_config(
		registry: Arc<EntityRegistry>,
		access: Arc<dyn AccessChecker>,
		config: &AuthzServiceConfig,
	) -> Self {
		Self::new(registry, access).with_org_context(config.send_org_context)
	}

	/// Builder: attach the caller's email domain to every batched check.
	pub fn with_org_context(mut self, send: bool) -> Self {
		self.send_org_context = send;
		self
	}
}

#[async_trait]
impl ResultTransformer for ObjectAccessFilter {
	fn name(&self) -> &'static str {
		"object_access_filter"
	}

	#[instrument(level = "debug", skip(self, ctx, result), fields(entity_type = %target.entity_type))]
	async fn transform(
		&self,
		ctx: &RequestContext,
		target: &TransformTarget,
		result: &mut ResultSet,
	) -> Result<(), AuthzError> {
		if target.origin != ResultOrigin::Query || result.is_aggregate() {
			return Ok(());
		}
		let Some(object_check) = self.registry.get(&target.entity_type).and_then(|d| d.object_check.as_ref()) else {
			return Ok(());
		};
		if bypasses_scoping(ctx) || result.is_empty() {
			return Ok(());
		}
		let Some(identity) = ctx.identity() else {
			result.retain(|_| false);
			return Ok(());
		};

		let ids: Vec<String> = result.rows().iter().filter_map(|r| r.id().map(String::from)).collect();
		let context = if self.send_org_context {
			ContextualTuple::for_identity(identity)
		} else {
			None
		};
		let checks: Vec<AccessCheck> = ids
			.iter()
			.map(|id| {
				let check = AccessCheck::for_identity(
					identity,
					object_check.relation,
					ObjectRef::new(object_check.object_type.as_str(), id.as_str()),
				);
				match &context {
					Some(context) => check.with_context(context.clone()),
					None => check,
				}
			})
			.collect();

		let verdicts = self.access.batch_check(ctx, &checks).await.map_err(|e| {
			error!(error = %e, relation = %object_check.relation, "Batch object check failed");
			AuthzError::from(e)
		})?;
		let allowed: HashSet<&str> = ids
			.iter()
			.zip(verdicts)
			.filter_map(|(id, ok)| ok.then_some(id.as_str()))
			.collect();

		let before = result.len();
		result.retain(|row| row.id().is_some_and(|id| allowed.contains(id)));
		debug!(before, after = result.len(), "Filtered rows by object access");
		Ok(())
	}
}
