// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use tessera_server_config::AuthzServiceConfig;
use tracing::{debug, error, instrument};

use super::{bypasses_scoping, TraversalFilter};
use crate::access::{AccessChecker, ContextualTuple, ListObjectsRequest};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::{Predicate, Queryable};
use crate::registry::{EntityRegistry, Scoping};

/// Narrows entity types scoped through the access service to the object ids
/// it lists for the caller.
#[derive(Clone)]
pub struct ListObjectsFilter {
	registry: Arc<EntityRegistry>,
	access: Arc<dyn AccessChecker>,
	send_org_context: bool,
}

impl ListObjectsFilter {
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

	/// Builder: send the caller's email domain with every listing.
	pub fn with_org_context(mut self, send: bool) -> Self {
		self.send_org_context = send;
		self
	}
}

#[async_trait]
impl TraversalFilter for ListObjectsFilter {
	fn name(&self) -> &'static str {
		"list_objects"
	}

	#[instrument(level = "debug", skip(self, ctx, query), fields(entity_type = %query.entity_type()))]
	async fn apply(&self, ctx: &RequestContext, query: &mut dyn Queryable) -> Result<(), AuthzError> {
		let Some(descriptor) = self.registry.get(query.entity_type()) else {
			return Ok(());
		};
		let Scoping::ListObjects {
			object_type,
			field,
			relation,
		} = &descriptor.scoping
		else {
			return Ok(());
		};
		if bypasses_scoping(ctx) {
			return Ok(());
		}
		let Some(identity) = ctx.identity() else {
			query.where_p(Predicate::False);
			return Ok(());
		};

		let mut request = ListObjectsRequest::for_identity(identity, *relation, object_type.as_str());
		if self.send_org_context {
			if let Some(context) = ContextualTuple::for_identity(identity) {
				request = request.with_context(context);
			}
		}
		let ids = self.access.list_objects(ctx, &request).await.map_err(|e| {
			error!(error = %e, object_type = %object_type, "Failed to list objects");
			AuthzError::from(e)
		})?;
		debug!(count = ids.len(), relation = %relation, "Scoping to listed objects");

		query.where_p(Predicate::field_in(field.as_str(), ids));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::access::recording::Recording;
	use crate::access::{ObjectRef, TupleStore};
	use crate::identity::Identity;
	use crate::memory::MemoryQuery;
	use crate::registry::EntityDescriptor;
	use crate::types::{Relation, SubjectId};

	fn registry() -> Arc<EntityRegistry> {
		Arc::new(
			EntityRegistry::new()
				.with(EntityDescriptor::membership("ProgramMembership", "program"))
				.with(EntityDescriptor::history("ControlHistory", "control")),
		)
	}

	#[tokio::test]
	async fn membership_scoped_by_object_id_field() {
		let tuples = Arc::new(TupleStore::new());
		let user = Identity::user(SubjectId::generate());
		tuples.grant(user.subject_id, Relation::CanView, ObjectRef::new("program", "p1"));
		let filter = ListObjectsFilter::new(registry(), tuples);

		let mut query = MemoryQuery::all("ProgramMembership");
		filter.apply(&RequestContext::for_identity(user), &mut query).await.unwrap();
		let expected = Predicate::field_in("program_id", ["p1"]);
		assert_eq!(query.predicates().iter().collect::<Vec<_>>(), vec![&expected]);
	}

	#[tokio::test]
	async fn history_uses_audit_relation() {
		let tuples = Arc::new(TupleStore::new());
		let user = Identity::user(SubjectId::generate());
		tuples.grant(user.subject_id, Relation::CanView, ObjectRef::new("control", "c1"));
		tuples.grant(user.subject_id, Relation::CanViewAuditLog, ObjectRef::new("control", "c2"));
		let filter = ListObjectsFilter::new(registry(), tuples);

		let mut query = MemoryQuery::all("ControlHistory");
		filter.apply(&RequestContext::for_identity(user), &mut query).await.unwrap();
		let expected = Predicate::field_in("ref", ["c2"]);
		assert_eq!(query.predicates().iter().collect::<Vec<_>>(), vec![&expected]);
	}

	#[tokio::test]
	async fn nothing_listed_matches_nothing() {
		let filter = ListObjectsFilter::new(registry(), Arc::new(TupleStore::new()));
		let mut query = MemoryQuery::all("ProgramMembership");
		filter
			.apply(&RequestContext::for_identity(Identity::user(SubjectId::generate())), &mut query)
			.await
			.unwrap();
		assert!(query.predicates().is_unsatisfiable());
	}

	#[tokio::test]
	async fn upstream_failure_is_an_error() {
		let tuples = Arc::new(TupleStore::new());
		tuples.set_unavailable(true);
		let filter = ListObjectsFilter::new(registry(), tuples);
		let mut query = MemoryQuery::all("ProgramMembership");
		let err = filter
			.apply(&RequestContext::for_identity(Identity::user(SubjectId::generate())), &mut query)
			.await
			.unwrap_err();
		assert!(matches!(err, AuthzError::UpstreamUnavailable(_)));
		assert!(query.predicates().is_empty());
	}

	#[tokio::test]
	async fn org_context_follows_config() {
		let user = Identity::user(SubjectId::generate()).with_email("dev@example.com");
		let config = AuthzServiceConfig::default();
		assert!(config.send_org_context);

		let recorder = Arc::new(Recording {
			listed: vec!["p1".to_string()],
			..Default::default()
		});
		let filter = ListObjectsFilter::from_config(registry(), recorder.clone(), &config);
		let mut query = MemoryQuery::all("ProgramMembership");
		filter.apply(&RequestContext::for_identity(user.clone()), &mut query).await.unwrap();

		let silent = ListObjectsFilter::new(registry(), recorder.clone());
		let mut query = MemoryQuery::all("ProgramMembership");
		silent.apply(&RequestContext::for_identity(user), &mut query).await.unwrap();

		let lists = recorder.lists.lock();
		assert_eq!(lists.len(), 2);
		assert_eq!(lists[0].context, Some(ContextualTuple::email_domain("example.com")));
		assert_eq!(lists[1].context, None);
	}
}
