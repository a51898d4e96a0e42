// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, instrument};

use super::{Decrypter, ResultTransformer, TransformTarget};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::ResultSet;
use crate::registry::EntityRegistry;

/// Decrypts fields registered as encrypted at rest. Aggregate results pass through.
#[derive(Clone)]
pub struct FieldDecryptor {
	registry: Arc<EntityRegistry>,
	decrypter: Arc<dyn Decrypter>,
}

impl FieldDecryptor {
	pub fn new(registry: Arc<EntityRegistry>, decrypter: Arc<dyn Decrypter>) -> Self {
		Self { registry, decrypter }
	}

	fn fail(&self, field: &str, message: impl Into<String>) -> AuthzError {
		AuthzError::Transform {
			transformer: self.name(),
			message: format!("{field}: {}", message.into()),
		}
	}
}

#[async_trait]
impl ResultTransformer for FieldDecryptor {
	fn name(&self) -> &'static str {
		"field_decryptor"
	}

	#[instrument(level = "debug", skip(self, _ctx, result), fields(entity_type = %target.entity_type))]
	async fn transform(
		&self,
		_ctx: &RequestContext,
		target: &TransformTarget,
		result: &mut ResultSet,
	) -> Result<(), AuthzError> {
		if result.is_aggregate() {
			return Ok(());
		}
		let Some(descriptor) = self.registry.get(&target.entity_type) else {
			return Ok(());
		};

		for row in result.rows_mut() {
			for field in &descriptor.encrypted_fields {
				let ciphertext = match row.get(field) {
					None | Some(Value::Null) => continue,
					Some(Value::String(s)) => s.clone(),
					Some(_) => return Err(self.fail(field, "ciphertext is not a string")),
				};
				let plaintext = self.decrypter.decrypt(&ciphertext).map_err(|e| {
					error!(error = %e, field = %field, "Failed to decrypt field");
					self.fail(field, e.to_string())
				})?;
				row.set(field.as_str(), plaintext);
			}
		}
		Ok(())
	}
}
