// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process relationship tuples.
//!
//! Answers checks from an explicit set of `(subject, relation, object)` tuples
//! with no rewrites or inheritance. Used for embedding and tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{AccessCheck, AccessChecker, AccessError, ListObjectsRequest, ObjectRef};
use crate::context::RequestContext;
use crate::types::{Relation, SubjectId};

#[derive(Debug, Default)]
pub struct TupleStore {
	tuples: RwLock<HashSet<(SubjectId, Relation, ObjectRef)>>,
	calls: AtomicUsize,
	unavailable: AtomicBool,
}

impl TupleStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn grant(&self, subject: SubjectId, relation: Relation, object: ObjectRef) {
		self.tuples.write().insert((subject, relation, object));
	}

	pub fn revoke(&self, subject: SubjectId, relation: Relation, object: &ObjectRef) {
		self.tuples.write().remove(&(subject, relation, object.clone()));
	}

	/// Makes every subsequent call fail as if the service were down.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Number of calls answered so far, batch checks counting once.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn begin(&self) -> Result<(), AccessError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(AccessError::Status {
				status: 503,
				message: "service unavailable".to_string(),
			});
		}
		Ok(())
	}

	fn holds(&self, check: &AccessCheck) -> bool {
		self.tuples
			.read()
			.contains(&(check.subject_id, check.relation, check.object.clone()))
	}
}

#[async_trait]
impl AccessChecker for TupleStore {
	async fn check_access(&self, ctx: &RequestContext, check: &AccessCheck) -> Result<bool, AccessError> {
		ctx.guard(async {
			self.begin()?;
			Ok::<_, AccessError>(self.holds(check))
		})
		.await?
	}

	async fn list_subjects(
		&self,
		ctx: &RequestContext,
		object: &ObjectRef,
		relation: Relation,
	) -> Result<Vec<SubjectId>, AccessError> {
		ctx.guard(async {
			self.begin()?;
			let mut subjects: Vec<SubjectId> = self
				.tuples
				.read()
				.iter()
				.filter(|(_, r, o)| *r == relation && o == object)
				.map(|(s, _, _)| *s)
				.collect();
			subjects.sort();
			Ok::<_, AccessError>(subjects)
		})
		.await?
	}

	async fn list_objects(&self, ctx: &RequestContext, request: &ListObjectsRequest) -> Result<Vec<String>, AccessError> {
		ctx.guard(async {
			self.begin()?;
			let mut ids: Vec<String> = self
				.tuples
				.read()
				.iter()
				.filter(|(s, r, o)| {
					*s == request.subject_id && *r == request.relation && o.object_type == request.object_type
				})
				.map(|(_, _, o)| o.object_id.clone())
				.collect();
			ids.sort();
			Ok::<_, AccessError>(ids)
		})
		.await?
	}

	async fn batch_check(&self, ctx: &RequestContext, checks: &[AccessCheck]) -> Result<Vec<bool>, AccessError> {
		ctx.guard(async {
			self.begin()?;
			Ok::<_, AccessError>(checks.iter().map(|c| self.holds(c)).collect())
		})
		.await?
	}
}
