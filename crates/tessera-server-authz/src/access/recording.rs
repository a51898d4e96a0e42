// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access checker that records what it was asked.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AccessCheck, AccessChecker, AccessError, ListObjectsRequest, ObjectRef};
use crate::context::RequestContext;
use crate::types::{Relation, SubjectId};

/// Records every check and listing. Checks answer `answer`; listings return
/// `listed`.
#[derive(Default)]
pub(crate) struct Recording {
	pub checks: Mutex<Vec<AccessCheck>>,
	pub lists: Mutex<Vec<ListObjectsRequest>>,
	pub answer: bool,
	pub listed: Vec<String>,
}

#[async_trait]
impl AccessChecker for Recording {
	async fn check_access(&self, _ctx: &RequestContext, check: &AccessCheck) -> Result<bool, AccessError> {
		self.checks.lock().push(check.clone());
		Ok(self.answer)
	}

	async fn list_subjects(
		&self,
		_ctx: &RequestContext,
		_object: &ObjectRef,
		_relation: Relation,
	) -> Result<Vec<SubjectId>, AccessError> {
		Ok(Vec::new())
	}

	async fn list_objects(&self, _ctx: &RequestContext, request: &ListObjectsRequest) -> Result<Vec<String>, AccessError> {
		self.lists.lock().push(request.clone());
		Ok(self.listed.clone())
	}
}
