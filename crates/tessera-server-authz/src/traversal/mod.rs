// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Traversal filters: non-terminal rules that narrow an outgoing query.
//!
//! Filters run after the policy chain has allowed a read. They only ever add
//! predicates, so they commute with each other and applying one twice narrows
//! no further than applying it once.

mod hierarchy;
mod list_objects;
mod org_scope;

pub use hierarchy::{org_closure, OrgHierarchy, StaticOrgHierarchy};
pub use list_objects::ListObjectsFilter;
pub use org_scope::OrgScopeFilter;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::Queryable;

#[async_trait]
pub trait TraversalFilter: Send + Sync {
	/// Stable name used in logs.
	fn name(&self) -> &'static str;

	/// Adds predicates to `query`. Never allows or denies.
	async fn apply(&self, ctx: &RequestContext, query: &mut dyn Queryable) -> Result<(), AuthzError>;
}

/// Whether a filter should leave the query alone because the request is
/// already trusted.
pub(crate) fn bypasses_scoping(ctx: &RequestContext) -> bool {
	ctx.is_allowed()
		|| ctx.is_internal_request()
		|| ctx.identity().is_some_and(|i| i.is_system_admin)
}
