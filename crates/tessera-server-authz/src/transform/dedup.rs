// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{ResultTransformer, TransformTarget};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::ResultSet;
use crate::registry::EntityRegistry;

/// Collapses hierarchically visible join rows to one per dedup key, unless the
/// query is enumerating the organization tree from the registry's root tenant.
#[derive(Debug, Clone)]
pub struct MembershipDedup {
	registry: Arc<EntityRegistry>,
}

impl MembershipDedup {
	pub fn new(registry: Arc<EntityRegistry>) -> Self {
		Self { registry }
	}
}

#[async_trait]
impl ResultTransformer for MembershipDedup {
	fn name(&self) -> &'static str {
		"membership_dedup"
	}

	#[instrument(level = "debug", skip(self, ctx, result), fields(entity_type = %target.entity_type))]
	async fn transform(
		&self,
		ctx: &RequestContext,
		target: &TransformTarget,
		result: &mut ResultSet,
	) -> Result<(), AuthzError> {
		let Some(key) = self.registry.get(&target.entity_type).and_then(|d| d.dedup_key.as_deref()) else {
			return Ok(());
		};
		if ctx.query_root().is_some_and(|root| self.registry.root_tenant() == Some(root)) {
			return Ok(());
		}

		let before = result.len();
		let mut seen = HashSet::new();
		result.retain(|row| match row.scalar(key) {
			Some(value) => seen.insert(value),
			None => true,
		});
		debug!(before, after = result.len(), "Deduplicated rows");
		Ok(())
	}
}
