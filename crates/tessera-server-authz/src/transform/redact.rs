// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{ResultOrigin, ResultTransformer, TransformTarget};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::ResultSet;
use crate::registry::EntityRegistry;

/// Fixed-length stand-in for a redacted secret. The length never depends on
/// the secret it replaces.
pub const REDACTED_PLACEHOLDER: &str = "*****************************";

/// Replaces secret fields with [`REDACTED_PLACEHOLDER`] on every path except
/// the result of a create.
#[derive(Debug, Clone)]
pub struct SecretRedactor {
	registry: Arc<EntityRegistry>,
}

impl SecretRedactor {
	pub fn new(registry: Arc<EntityRegistry>) -> Self {
		Self { registry }
	}
}

#[async_trait]
impl ResultTransformer for SecretRedactor {
	fn name(&self) -> &'static str {
		"secret_redactor"
	}

	#[instrument(level = "debug", skip(self, _ctx, result), fields(entity_type = %target.entity_type))]
	async fn transform(
		&self,
		_ctx: &RequestContext,
		target: &TransformTarget,
		result: &mut ResultSet,
	) -> Result<(), AuthzError> {
		if target.origin == ResultOrigin::Create {
			return Ok(());
		}
		let Some(descriptor) = self.registry.get(&target.entity_type) else {
			return Ok(());
		};
		if descriptor.secret_fields.is_empty() {
			return Ok(());
		}

		let mut redacted = 0usize;
		for row in result.rows_mut() {
			for field in &descriptor.secret_fields {
				let present = match row.get(field) {
					None | Some(Value::Null) => false,
					Some(Value::String(_)) => true,
					Some(_) => {
						return Err(AuthzError::Transform {
							transformer: self.name(),
							message: format!("secret field {field} is not a string"),
						});
					}
				};
				if present {
					row.set(field.as_str(), REDACTED_PLACEHOLDER);
					redacted += 1;
				}
			}
		}
		debug!(redacted, "Redacted secret fields");
		Ok(())
	}
}
