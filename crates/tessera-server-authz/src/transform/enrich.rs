// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tessera_server_config::ObjectsConfig;
use tracing::{debug, instrument, warn};

use super::{BillingPortal, ObjectStorage, ResultTransformer, TransformTarget};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::ResultSet;
use crate::registry::{EntityRegistry, Enrichment};

/// Populates externally sourced fields, but only those the caller selected.
///
/// Lookups for every row run concurrently. A failed lookup leaves the field
/// null and never fails the request.
#[derive(Clone)]
pub struct Enricher {
	registry: Arc<EntityRegistry>,
	storage: Option<Arc<dyn ObjectStorage>>,
	billing: Option<Arc<dyn BillingPortal>>,
	presign_ttl: Duration,
}

impl Enricher {
	pub fn new(registry: Arc<EntityRegistry>, config: &ObjectsConfig) -> Self {
		Self {
			registry,
			storage: None,
			billing: None,
			presign_ttl: config.presign_ttl(),
		}
	}

	pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_billing(mut self, billing: Arc<dyn BillingPortal>) -> Self {
		self.billing = Some(billing);
		self
	}

	async fn resolve(&self, ctx: &RequestContext, enrichment: &Enrichment, source: &str) -> Option<String> {
		let outcome = match enrichment {
			Enrichment::PresignedUrl { .. } => match &self.storage {
				Some(storage) => storage.presigned_url(ctx, source, self.presign_ttl).await,
				None => {
					warn!(field = enrichment.field(), "No object storage configured for enrichment");
					return None;
				}
			},
			Enrichment::BillingPortalUrl { .. } => match &self.billing {
				Some(billing) => billing.portal_url(ctx, source).await,
				None => {
					warn!(field = enrichment.field(), "No billing portal configured for enrichment");
					return None;
				}
			},
		};
		match outcome {
			Ok(url) => Some(url),
			Err(e) => {
				warn!(error = %e, field = enrichment.field(), "Enrichment failed, leaving field empty");
				None
			}
		}
	}
}

#[async_trait]
impl ResultTransformer for Enricher {
	fn name(&self) -> &'static str {
		"enricher"
	}

	#[instrument(level = "debug", skip(self, ctx, result), fields(entity_type = %target.entity_type))]
	async fn transform(
		&self,
		ctx: &RequestContext,
		target: &TransformTarget,
		result: &mut ResultSet,
	) -> Result<(), AuthzError> {
		if result.is_aggregate() {
			return Ok(());
		}
		let Some(descriptor) = self.registry.get(&target.entity_type) else {
			return Ok(());
		};
		let requested: Vec<&Enrichment> = descriptor
			.enrichments
			.iter()
			.filter(|e| ctx.field_requested(e.field()))
			.collect();
		if requested.is_empty() {
			return Ok(());
		}

		let jobs: Vec<(usize, &Enrichment, Option<String>)> = result
			.rows()
			.iter()
			.enumerate()
			.flat_map(|(idx, row)| requested.iter().map(move |e| (idx, *e, row.scalar(e.source_field()))))
			.collect();

		let resolved = join_all(jobs.into_iter().map(|(idx, enrichment, source)| async move {
			let value = match source {
				Some(source) => self.resolve(ctx, enrichment, &source).await,
				None => None,
			};
			(idx, enrichment.field(), value)
		}))
		.await;
		debug!(lookups = resolved.len(), "Resolved enrichments");

		let rows = result.rows_mut();
		for (idx, field, value) in resolved {
			if let Some(row) = rows.get_mut(idx) {
				row.set(field, value.map_or(Value::Null, Value::String));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::query::Row;
	use crate::registry::EntityDescriptor;
	use crate::transform::ExternalError;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[derive(Default)]
	struct FakeStorage {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl ObjectStorage for FakeStorage {
		async fn presigned_url(
			&self,
			_ctx: &RequestContext,
			file_ref: &str,
			ttl: Duration,
		) -> Result<String, ExternalError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if file_ref == "missing" {
				return Err(ExternalError::Unavailable("no such object".into()));
			}
			Ok(format!("https://files.example.com/{file_ref}?expires={}", ttl.as_secs()))
		}
	}

	struct FakeBilling;

	#[async_trait]
	impl BillingPortal for FakeBilling {
		async fn portal_url(&self, _ctx: &RequestContext, customer_ref: &str) -> Result<String, ExternalError> {
			Ok(format!("https://billing.example.com/{customer_ref}"))
		}
	}

	fn registry() -> Arc<EntityRegistry> {
		Arc::new(
			EntityRegistry::new()
				.with(EntityDescriptor::org_owned("File", "owner_id").with_enrichment(Enrichment::PresignedUrl {
					field: "presigned_url".into(),
					source_field: "storage_path".into(),
				}))
				.with(
					EntityDescriptor::unscoped("OrgSubscription").with_enrichment(Enrichment::BillingPortalUrl {
						field: "manage_url".into(),
						source_field: "customer_id".into(),
					}),
				),
		)
	}

	fn files() -> ResultSet {
		ResultSet::List(vec![
			Row::new().with("id", "f1").with("storage_path", "a/b.pdf"),
			Row::new().with("id", "f2").with("storage_path", "missing"),
			Row::new().with("id", "f3"),
		])
	}

	#[tokio::test]
	async fn unrequested_fields_make_no_calls() {
		let storage = Arc::new(FakeStorage::default());
		let enricher = Enricher::new(registry(), &ObjectsConfig::default()).with_storage(storage.clone());
		let ctx = RequestContext::new().with_field_selection(["id"]);
		let mut result = files();
		enricher
			.transform(&ctx, &TransformTarget::query("File"), &mut result)
			.await
			.unwrap();
		assert_eq!(storage.calls.load(Ordering::SeqCst), 0);
		assert!(result.rows()[0].get("presigned_url").is_none());
	}

	#[tokio::test]
	async fn requested_fields_resolve_and_failures_degrade() {
		let storage = Arc::new(FakeStorage::default());
		let enricher = Enricher::new(registry(), &ObjectsConfig::default()).with_storage(storage.clone());
		let ctx = RequestContext::new().with_field_selection(["id", "presigned_url"]);
		let mut result = files();
		enricher
			.transform(&ctx, &TransformTarget::query("File"), &mut result)
			.await
			.unwrap();

		let rows = result.rows();
		assert_eq!(
			rows[0].get_str("presigned_url"),
			Some("https://files.example.com/a/b.pdf?expires=900")
		);
		assert_eq!(rows[1].get("presigned_url"), Some(&Value::Null));
		assert_eq!(rows[2].get("presigned_url"), Some(&Value::Null));
		assert_eq!(storage.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn billing_link_on_single_row() {
		let enricher = Enricher::new(registry(), &ObjectsConfig::default()).with_billing(Arc::new(FakeBilling));
		let ctx = RequestContext::new().with_field_selection(["manage_url"]);
		let mut result = ResultSet::Single(Some(Row::new().with("id", "s1").with("customer_id", "cus_1")));
		enricher
			.transform(&ctx, &TransformTarget::query("OrgSubscription"), &mut result)
			.await
			.unwrap();
		assert_eq!(
			result.rows()[0].get_str("manage_url"),
			Some("https://billing.example.com/cus_1")
		);
	}

	#[tokio::test]
	async fn missing_backend_leaves_field_empty() {
		let enricher = Enricher::new(registry(), &ObjectsConfig::default());
		let ctx = RequestContext::new().with_field_selection(["presigned_url"]);
		let mut result = files();
		enricher
			.transform(&ctx, &TransformTarget::query("File"), &mut result)
			.await
			.unwrap();
		assert!(result.rows().iter().all(|r| r.get("presigned_url") == Some(&Value::Null)));
	}
}
