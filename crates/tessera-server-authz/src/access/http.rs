// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP client for an OpenFGA-compatible relationship service.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tessera_server_config::AuthzServiceConfig;
use tracing::{debug, error, instrument, trace};

use super::{AccessCheck, AccessChecker, AccessError, ContextualTuple, ListObjectsRequest, ObjectRef};
use crate::context::RequestContext;
use crate::types::{Relation, SubjectId};

/// Client for the relationship service's JSON API.
///
/// No retries are performed; a failed call is returned to the caller as-is.
#[derive(Debug, Clone)]
pub struct HttpAccessClient {
	http_client: Client,
	base_url: String,
	store_id: String,
	model_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TupleKey<'a> {
	user: String,
	relation: &'a str,
	object: String,
}

#[derive(Debug, Serialize)]
struct CheckBody<'a> {
	tuple_key: TupleKey<'a>,
	#[serde(skip_serializing_if = "Option::is_none")]
	authorization_model_id: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	context: Option<&'a ContextualTuple>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
	allowed: bool,
}

#[derive(Debug, Serialize)]
struct BatchCheckItem<'a> {
	tuple_key: TupleKey<'a>,
	correlation_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	context: Option<&'a ContextualTuple>,
}

#[derive(Debug, Serialize)]
struct BatchCheckBody<'a> {
	checks: Vec<BatchCheckItem<'a>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BatchCheckResponse {
	result: HashMap<String, BatchCheckResult>,
}

#[derive(Debug, Deserialize)]
struct BatchCheckResult {
	#[serde(default)]
	allowed: bool,
	#[serde(default)]
	error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ListObjectsBody<'a> {
	#[serde(rename = "type")]
	object_type: &'a str,
	relation: &'a str,
	user: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	authorization_model_id: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	context: Option<&'a ContextualTuple>,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
	objects: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WireObject<'a> {
	#[serde(rename = "type")]
	object_type: &'a str,
	id: &'a str,
}

#[derive(Debug, Serialize)]
struct UserFilter {
	#[serde(rename = "type")]
	user_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ListUsersBody<'a> {
	object: WireObject<'a>,
	relation: &'a str,
	user_filters: Vec<UserFilter>,
	#[serde(skip_serializing_if = "Option::is_none")]
	authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ListUsersResponse {
	users: Vec<ListedUser>,
}

#[derive(Debug, Deserialize)]
struct ListedUser {
	object: Option<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
	id: String,
}

impl HttpAccessClient {
	/// Creates a client for `store_id` at `base_url` with reqwest's default settings.
	pub fn new(base_url: impl Into<String>, store_id: impl Into<String>) -> Self {
		Self {
			http_client: Client::new(),
			base_url: base_url.into().trim_end_matches('/').to_string(),
			store_id: store_id.into(),
			model_id: None,
		}
	}

	/// Creates a client from the `authz` configuration section.
	pub fn from_config(config: &AuthzServiceConfig) -> Result<Self, AccessError> {
		let store_id = config
			.store_id
			.clone()
			.ok_or_else(|| AccessError::Misconfigured("authz.store_id is not set".to_string()))?;
		let http_client = Client::builder().timeout(config.request_timeout()).build()?;

		Ok(Self {
			http_client,
			base_url: config.base_url.trim_end_matches('/').to_string(),
			store_id,
			model_id: config.model_id.clone(),
		})
	}

	/// Pins requests to an authorization model.
	pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
		self.model_id = Some(model_id.into());
		self
	}

	fn url(&self, endpoint: &str) -> String {
		format!("{}/stores/{}/{}", self.base_url, self.store_id, endpoint)
	}

	fn tuple_key<'a>(check: &'a AccessCheck) -> TupleKey<'a> {
		TupleKey {
			user: check.subject(),
			relation: check.relation.as_str(),
			object: check.object.to_string(),
		}
	}

	async fn post<B, R>(&self, ctx: &RequestContext, endpoint: &str, body: &B) -> Result<R, AccessError>
	where
		B: Serialize + Sync,
		R: DeserializeOwned + Send,
	{
		let url = self.url(endpoint);
		debug!(url = %url, "Sending request to access service");

		let send = async {
			let response = self.http_client.post(&url).json(body).send().await.map_err(|e| {
				error!(error = %e, endpoint, "Network error during access service request");
				AccessError::Transport(e)
			})?;

			let status = response.status();
			if !status.is_success() {
				let message = response.text().await.unwrap_or_default();
				error!(status = status.as_u16(), endpoint, "Access service returned an error");
				return Err(AccessError::Status {
					status: status.as_u16(),
					message,
				});
			}

			let text = response.text().await.map_err(|e| {
				error!(error = %e, "Failed to read access service response body");
				AccessError::Transport(e)
			})?;
			trace!(body = %text, "Access service response body");

			serde_json::from_str::<R>(&text).map_err(|e| {
				error!(error = %e, endpoint, "Failed to parse access service response");
				AccessError::InvalidResponse(format!("JSON parse error: {e}"))
			})
		};

		ctx.guard(send).await?
	}
}

#[async_trait]
impl AccessChecker for HttpAccessClient {
	#[instrument(level = "debug", skip(self, ctx, check), fields(relation = %check.relation, object = %check.object))]
	async fn check_access(&self, ctx: &RequestContext, check: &AccessCheck) -> Result<bool, AccessError> {
		let body = CheckBody {
			tuple_key: Self::tuple_key(check),
			authorization_model_id: self.model_id.as_deref(),
			context: check.context.as_ref(),
		};
		let response: CheckResponse = self.post(ctx, "check", &body).await?;
		debug!(allowed = response.allowed, "Access check completed");
		Ok(response.allowed)
	}

	#[instrument(level = "debug", skip(self, ctx), fields(object = %object))]
	async fn list_subjects(
		&self,
		ctx: &RequestContext,
		object: &ObjectRef,
		relation: Relation,
	) -> Result<Vec<SubjectId>, AccessError> {
		let body = ListUsersBody {
			object: WireObject {
				object_type: &object.object_type,
				id: &object.object_id,
			},
			relation: relation.as_str(),
			user_filters: vec![UserFilter { user_type: "user" }],
			authorization_model_id: self.model_id.as_deref(),
		};
		let response: ListUsersResponse = self.post(ctx, "list-users", &body).await?;

		response
			.users
			.into_iter()
			.filter_map(|u| u.object)
			.map(|o| {
				o.id
					.parse::<SubjectId>()
					.map_err(|e| AccessError::InvalidResponse(format!("invalid subject id {}: {e}", o.id)))
			})
			.collect()
	}

	#[instrument(level = "debug", skip(self, ctx, request), fields(relation = %request.relation, object_type = %request.object_type))]
	async fn list_objects(&self, ctx: &RequestContext, request: &ListObjectsRequest) -> Result<Vec<String>, AccessError> {
		let body = ListObjectsBody {
			object_type: &request.object_type,
			relation: request.relation.as_str(),
			user: request.subject(),
			authorization_model_id: self.model_id.as_deref(),
			context: request.context.as_ref(),
		};
		let response: ListObjectsResponse = self.post(ctx, "list-objects", &body).await?;

		let ids = response
			.objects
			.iter()
			.filter_map(|raw| ObjectRef::parse(raw))
			.filter(|o| o.object_type == request.object_type)
			.map(|o| o.object_id)
			.collect::<Vec<_>>();
		debug!(count = ids.len(), "Listed objects");
		Ok(ids)
	}

	#[instrument(level = "debug", skip(self, ctx, checks), fields(count = checks.len()))]
	async fn batch_check(&self, ctx: &RequestContext, checks: &[AccessCheck]) -> Result<Vec<bool>, AccessError> {
		if checks.is_empty() {
			return Ok(Vec::new());
		}
		let body = BatchCheckBody {
			checks: checks
				.iter()
				.enumerate()
				.map(|(i, check)| BatchCheckItem {
					tuple_key: Self::tuple_key(check),
					correlation_id: i.to_string(),
					context: check.context.as_ref(),
				})
				.collect(),
			authorization_model_id: self.model_id.as_deref(),
		};
		let response: BatchCheckResponse = self.post(ctx, "batch-check", &body).await?;

		(0..checks.len())
			.map(|i| match response.result.get(&i.to_string()) {
				Some(BatchCheckResult { error: Some(err), .. }) => Err(AccessError::InvalidResponse(format!(
					"batch check item {i} failed: {err}"
				))),
				Some(result) => Ok(result.allowed),
				None => Err(AccessError::InvalidResponse(format!("batch check item {i} missing"))),
			})
			.collect()
	}
}
