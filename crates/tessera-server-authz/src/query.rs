// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage query boundary.
//!
//! The engine never issues statements itself. It sees an in-flight query only
//! through [`Queryable`], adds [`Predicate`]s to it, hands it to a
//! [`QueryExecutor`] and receives a [`ResultSet`] back.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::error::AuthzError;

// =============================================================================
// Query operations
// =============================================================================

/// The shape of result an in-flight query will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOp {
	Exist,
	Only,
	Ids,
	Count,
	All,
}

impl QueryOp {
	/// Whether the operation yields rows rather than a single aggregate value.
	pub fn returns_rows(&self) -> bool {
		matches!(self, QueryOp::Only | QueryOp::Ids | QueryOp::All)
	}
}

impl fmt::Display for QueryOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			QueryOp::Exist => "Exist",
			QueryOp::Only => "Only",
			QueryOp::Ids => "IDs",
			QueryOp::Count => "Count",
			QueryOp::All => "All",
		};
		f.write_str(name)
	}
}

// =============================================================================
// Rows
// =============================================================================

/// One result row, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder: set a field.
	pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(field.into(), value.into());
		self
	}

	pub fn get(&self, field: &str) -> Option<&Value> {
		self.0.get(field)
	}

	pub fn get_str(&self, field: &str) -> Option<&str> {
		self.0.get(field).and_then(Value::as_str)
	}

	pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
		self.0.insert(field.into(), value.into());
	}

	pub fn id(&self) -> Option<&str> {
		self.get_str("id")
	}

	/// Scalar field value rendered as a string for set membership tests.
	pub fn scalar(&self, field: &str) -> Option<String> {
		match self.0.get(field)? {
			Value::String(s) => Some(s.clone()),
			Value::Number(n) => Some(n.to_string()),
			Value::Bool(b) => Some(b.to_string()),
			_ => None,
		}
	}

	pub fn into_inner(self) -> Map<String, Value> {
		self.0
	}
}

impl From<Map<String, Value>> for Row {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

// =============================================================================
// Predicates
// =============================================================================

/// A filter condition attached to a query before execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
	True,
	False,
	FieldIn { field: String, values: BTreeSet<String> },
	FieldIsNull { field: String },
	And(Vec<Predicate>),
	Or(Vec<Predicate>),
	Not(Box<Predicate>),
}

impl Predicate {
	pub fn field_in<I, S>(field: impl Into<String>, values: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Predicate::FieldIn {
			field: field.into(),
			values: values.into_iter().map(Into::into).collect(),
		}
	}

	pub fn is_null(field: impl Into<String>) -> Self {
		Predicate::FieldIsNull {
			field: field.into(),
		}
	}

	pub fn or(predicates: Vec<Predicate>) -> Self {
		Predicate::Or(predicates)
	}

	pub fn and(predicates: Vec<Predicate>) -> Self {
		Predicate::And(predicates)
	}

	pub fn negate(predicate: Predicate) -> Self {
		Predicate::Not(Box::new(predicate))
	}

	/// Evaluates the predicate against a row. Missing fields never match `FieldIn`.
	pub fn matches(&self, row: &Row) -> bool {
		match self {
			Predicate::True => true,
			Predicate::False => false,
			Predicate::FieldIn { field, values } => row.scalar(field).is_some_and(|v| values.contains(&v)),
			Predicate::FieldIsNull { field } => matches!(row.get(field), None | Some(Value::Null)),
			Predicate::And(ps) => ps.iter().all(|p| p.matches(row)),
			Predicate::Or(ps) => ps.iter().any(|p| p.matches(row)),
			Predicate::Not(p) => !p.matches(row),
		}
	}

	/// Whether the predicate matches nothing regardless of data.
	pub fn is_unsatisfiable(&self) -> bool {
		match self {
			Predicate::False => true,
			Predicate::FieldIn { values, .. } => values.is_empty(),
			Predicate::And(ps) => ps.iter().any(Predicate::is_unsatisfiable),
			Predicate::Or(ps) => ps.iter().all(Predicate::is_unsatisfiable),
			_ => false,
		}
	}
}

/// The conjunction of predicates attached to one query.
///
/// Adding a predicate that is already present is a no-op, so scoping logic
/// applied by overlapping filters narrows exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateSet {
	predicates: Vec<Predicate>,
}

impl PredicateSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a predicate. Returns `false` if an identical one was already present.
	pub fn insert(&mut self, predicate: Predicate) -> bool {
		if matches!(predicate, Predicate::True) || self.predicates.contains(&predicate) {
			return false;
		}
		self.predicates.push(predicate);
		true
	}

	pub fn matches(&self, row: &Row) -> bool {
		self.predicates.iter().all(|p| p.matches(row))
	}

	pub fn is_unsatisfiable(&self) -> bool {
		self.predicates.iter().any(Predicate::is_unsatisfiable)
	}

	pub fn len(&self) -> usize {
		self.predicates.len()
	}

	pub fn is_empty(&self) -> bool {
		self.predicates.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
		self.predicates.iter()
	}
}

// =============================================================================
// Storage boundary
// =============================================================================

/// An in-flight query as seen by traversal filters.
pub trait Queryable: Send {
	/// Entity type the query targets.
	fn entity_type(&self) -> &str;

	fn op(&self) -> QueryOp;

	/// Narrows the query with an additional predicate.
	fn where_p(&mut self, predicate: Predicate);
}

/// Result of an executed query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultSet {
	/// `Only`: at most one row.
	Single(Option<Row>),
	/// `All` and `IDs`.
	List(Vec<Row>),
	/// `Count` and `Exist`.
	Aggregate(Value),
}

impl ResultSet {
	pub fn is_aggregate(&self) -> bool {
		matches!(self, ResultSet::Aggregate(_))
	}

	pub fn rows(&self) -> &[Row] {
		match self {
			ResultSet::Single(row) => row.as_slice(),
			ResultSet::List(rows) => rows,
			ResultSet::Aggregate(_) => &[],
		}
	}

	pub fn rows_mut(&mut self) -> &mut [Row] {
		match self {
			ResultSet::Single(row) => row.as_mut_slice(),
			ResultSet::List(rows) => rows,
			ResultSet::Aggregate(_) => &mut [],
		}
	}

	/// Keeps only rows for which `keep` returns true. Aggregates are untouched.
	pub fn retain(&mut self, mut keep: impl FnMut(&Row) -> bool) {
		match self {
			ResultSet::Single(row) => {
				if row.as_ref().is_some_and(|r| !keep(r)) {
					*row = None;
				}
			}
			ResultSet::List(rows) => rows.retain(|r| keep(r)),
			ResultSet::Aggregate(_) => {}
		}
	}

	pub fn len(&self) -> usize {
		self.rows().len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows().is_empty()
	}
}

/// Executes narrowed queries against storage.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
	type Query: Queryable + 'static;

	async fn execute(&self, ctx: &RequestContext, query: Self::Query) -> Result<ResultSet, AuthzError>;
}
