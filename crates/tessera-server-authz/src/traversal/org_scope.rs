// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{bypasses_scoping, org_closure, OrgHierarchy, StaticOrgHierarchy, TraversalFilter};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::{Predicate, Queryable};
use crate::registry::{EntityRegistry, Scoping, Visibility};

/// Narrows org-owned entity types to rows owned by the caller's organizations,
/// expanded across the organization hierarchy where the type is visible there.
#[derive(Clone)]
pub struct OrgScopeFilter {
	registry: Arc<EntityRegistry>,
	hierarchy: Arc<dyn OrgHierarchy>,
}

impl OrgScopeFilter {
	pub fn new(registry: Arc<EntityRegistry>, hierarchy: Arc<dyn OrgHierarchy>) -> Self {
		Self { registry, hierarchy }
	}

	/// A filter for deployments without nested organizations.
	pub fn flat(registry: Arc<EntityRegistry>) -> Self {
		Self::new(registry, Arc::new(StaticOrgHierarchy::new()))
	}
}

#[async_trait]
impl TraversalFilter for OrgScopeFilter {
	fn name(&self) -> &'static str {
		"org_scope"
	}

	#[instrument(level = "debug", skip(self, ctx, query), fields(entity_type = %query.entity_type()))]
	async fn apply(&self, ctx: &RequestContext, query: &mut dyn Queryable) -> Result<(), AuthzError> {
		let Some(descriptor) = self.registry.get(query.entity_type()) else {
			return Ok(());
		};
		if descriptor.root_tenant {
			return Ok(());
		}
		let Scoping::OrgOwner {
			field,
			visibility,
			allow_null_owner,
		} = &descriptor.scoping
		else {
			return Ok(());
		};
		if bypasses_scoping(ctx) {
			debug!("Request bypasses tenant scoping");
			return Ok(());
		}
		let Some(identity) = ctx.identity() else {
			debug!("No identity, narrowing to nothing");
			query.where_p(Predicate::False);
			return Ok(());
		};

		let scope: BTreeSet<_> = if identity.is_anonymous() {
			identity.current_org().into_iter().collect()
		} else if *visibility == Visibility::OwnOrg {
			identity.organization_ids.clone()
		} else {
			org_closure(self.hierarchy.as_ref(), ctx, &identity.organization_ids, *visibility).await?
		};
		debug!(orgs = scope.len(), "Scoping to organizations");

		let owned = Predicate::field_in(field.as_str(), scope.iter().map(ToString::to_string));
		let predicate = if *allow_null_owner {
			Predicate::or(vec![Predicate::is_null(field.as_str()), owned])
		} else {
			owned
		};
		query.where_p(predicate);
		Ok(())
	}
}
