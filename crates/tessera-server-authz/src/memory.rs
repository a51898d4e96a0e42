// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory storage backend implementing the query boundary.
//!
//! Rows are JSON objects grouped by entity type. Queries are evaluated by
//! applying every attached predicate to every row, which is enough for tests
//! and for embedding the engine in tools that hold their data in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::query::{Predicate, PredicateSet, QueryExecutor, QueryOp, Queryable, ResultSet, Row};

#[derive(Debug, Default)]
pub struct MemoryStore {
	tables: RwLock<HashMap<String, Vec<Row>>>,
	executions: AtomicUsize,
}

/// A query against a [`MemoryStore`] table.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
	entity_type: String,
	op: QueryOp,
	predicates: PredicateSet,
}

impl MemoryQuery {
	pub fn new(entity_type: impl Into<String>, op: QueryOp) -> Self {
		Self {
			entity_type: entity_type.into(),
			op,
			predicates: PredicateSet::new(),
		}
	}

	pub fn all(entity_type: impl Into<String>) -> Self {
		Self::new(entity_type, QueryOp::All)
	}

	/// Restricts to a single id and expects at most one row.
	pub fn only(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
		let mut query = Self::new(entity_type, QueryOp::Only);
		query.where_p(Predicate::field_in("id", [id.into()]));
		query
	}

	pub fn count(entity_type: impl Into<String>) -> Self {
		Self::new(entity_type, QueryOp::Count)
	}

	pub fn predicates(&self) -> &PredicateSet {
		&self.predicates
	}
}

impl Queryable for MemoryQuery {
	fn entity_type(&self) -> &str {
		&self.entity_type
	}

	fn op(&self) -> QueryOp {
		self.op
	}

	fn where_p(&mut self, predicate: Predicate) {
		self.predicates.insert(predicate);
	}
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, entity_type: impl Into<String>, row: Row) {
		self.tables.write().entry(entity_type.into()).or_default().push(row);
	}

	/// Number of queries executed so far.
	pub fn executions(&self) -> usize {
		self.executions.load(Ordering::SeqCst)
	}

	fn select(&self, query: &MemoryQuery) -> Vec<Row> {
		if query.predicates.is_unsatisfiable() {
			return Vec::new();
		}
		self.tables
			.read()
			.get(&query.entity_type)
			.map(|rows| rows.iter().filter(|r| query.predicates.matches(r)).cloned().collect())
			.unwrap_or_default()
	}
}

#[async_trait]
impl QueryExecutor for MemoryStore {
	type Query = MemoryQuery;

	#[instrument(level = "debug", skip(self, ctx, query), fields(entity_type = %query.entity_type, op = %query.op))]
	async fn execute(&self, ctx: &RequestContext, query: MemoryQuery) -> Result<ResultSet, AuthzError> {
		if ctx.cancellation().is_cancelled() {
			return Err(AuthzError::Cancelled);
		}
		self.executions.fetch_add(1, Ordering::SeqCst);

		let rows = self.select(&query);
		debug!(rows = rows.len(), predicates = query.predicates.len(), "Executed in-memory query");

		Ok(match query.op {
			QueryOp::All => ResultSet::List(rows),
			QueryOp::Only => {
				if rows.len() > 1 {
					return Err(AuthzError::Storage(format!(
						"{} rows matched a single-row query on {}",
						rows.len(),
						query.entity_type
					)));
				}
				ResultSet::Single(rows.into_iter().next())
			}
			QueryOp::Ids => ResultSet::List(
				rows
					.into_iter()
					.filter_map(|r| r.get("id").cloned())
					.map(|id| Row::new().with("id", id))
					.collect(),
			),
			QueryOp::Count => ResultSet::Aggregate(Value::from(rows.len())),
			QueryOp::Exist => ResultSet::Aggregate(Value::Bool(!rows.is_empty())),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn seeded() -> MemoryStore {
		let store = MemoryStore::new();
		store.insert("Task", Row::new().with("id", "t1").with("owner_id", "a"));
		store.insert("Task", Row::new().with("id", "t2").with("owner_id", "b"));
		store.insert("Task", Row::new().with("id", "t3").with("owner_id", "a"));
		store
	}

	#[tokio::test]
	async fn all_applies_predicates() {
		let store = seeded();
		let mut query = MemoryQuery::all("Task");
		query.where_p(Predicate::field_in("owner_id", ["a"]));
		let result = store.execute(&RequestContext::new(), query).await.unwrap();
		let ids: Vec<_> = result.rows().iter().filter_map(Row::id).collect();
		assert_eq!(ids, vec!["t1", "t3"]);
	}

	#[tokio::test]
	async fn aggregates() {
		let store = seeded();
		let ctx = RequestContext::new();
		let count = store.execute(&ctx, MemoryQuery::count("Task")).await.unwrap();
		assert_eq!(count, ResultSet::Aggregate(json!(3)));

		let mut exist = MemoryQuery::new("Task", QueryOp::Exist);
		exist.where_p(Predicate::False);
		let exist = store.execute(&ctx, exist).await.unwrap();
		assert_eq!(exist, ResultSet::Aggregate(json!(false)));
	}

	#[tokio::test]
	async fn ids_project_id_only() {
		let store = seeded();
		let result = store
			.execute(&RequestContext::new(), MemoryQuery::new("Task", QueryOp::Ids))
			.await
			.unwrap();
		assert_eq!(result.len(), 3);
		assert!(result.rows().iter().all(|r| r.get("owner_id").is_none()));
	}

	#[tokio::test]
	async fn only_returns_single_row() {
		let store = seeded();
		let result = store
			.execute(&RequestContext::new(), MemoryQuery::only("Task", "t2"))
			.await
			.unwrap();
		assert_eq!(
			result,
			ResultSet::Single(Some(Row::new().with("id", "t2").with("owner_id", "b")))
		);
		assert_eq!(store.executions(), 1);
	}

	#[tokio::test]
	async fn unknown_table_is_empty() {
		let store = MemoryStore::new();
		let result = store
			.execute(&RequestContext::new(), MemoryQuery::all("Nothing"))
			.await
			.unwrap();
		assert!(result.is_empty());
	}
}
