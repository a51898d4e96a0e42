// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authenticated caller as seen by the engine.
//!
//! An [`Identity`] is created by the transport layer at authentication time and
//! never changes for the lifetime of a request. It is never persisted here.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{AuthMethod, OrgId, SubjectId, SubjectType};

/// Attributes describing the subject making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub subject_id: SubjectId,
	pub subject_type: SubjectType,
	pub email: Option<String>,
	/// Organizations the subject is authorized against.
	pub organization_ids: BTreeSet<OrgId>,
	/// Organization selected for this request, if the caller picked one.
	pub active_org: Option<OrgId>,
	pub is_system_admin: bool,
	pub auth_method: AuthMethod,
}

impl Identity {
	/// Creates a user identity authenticated by session with no organizations.
	pub fn user(subject_id: SubjectId) -> Self {
		Self {
			subject_id,
			subject_type: SubjectType::User,
			email: None,
			organization_ids: BTreeSet::new(),
			active_org: None,
			is_system_admin: false,
			auth_method: AuthMethod::Session,
		}
	}

	/// Creates a service identity bound to a single organization by an API token.
	pub fn service(subject_id: SubjectId, org_id: OrgId) -> Self {
		Self {
			subject_id,
			subject_type: SubjectType::Service,
			email: None,
			organization_ids: BTreeSet::from([org_id]),
			active_org: Some(org_id),
			is_system_admin: false,
			auth_method: AuthMethod::ApiToken,
		}
	}

	/// Creates an anonymous trust-center visitor scoped to exactly one organization.
	pub fn anonymous_trust_center(subject_id: SubjectId, org_id: OrgId) -> Self {
		Self {
			subject_id,
			subject_type: SubjectType::AnonymousTrustCenter,
			email: None,
			organization_ids: BTreeSet::from([org_id]),
			active_org: Some(org_id),
			is_system_admin: false,
			auth_method: AuthMethod::AnonymousTrustCenterJwt,
		}
	}

	/// Builder: set email.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());
		self
	}

	/// Builder: add an authorized organization.
	pub fn with_org(mut self, org_id: OrgId) -> Self {
		self.organization_ids.insert(org_id);
		self
	}

	/// Builder: add an authorized organization and make it the active one.
	pub fn with_active_org(mut self, org_id: OrgId) -> Self {
		self.organization_ids.insert(org_id);
		self.active_org = Some(org_id);
		self
	}

	/// Builder: set the system admin flag.
	pub fn with_system_admin(mut self, is_admin: bool) -> Self {
		self.is_system_admin = is_admin;
		self
	}

	/// Builder: set the authentication method.
	pub fn with_auth_method(mut self, method: AuthMethod) -> Self {
		self.auth_method = method;
		self
	}

	pub fn is_anonymous(&self) -> bool {
		self.subject_type == SubjectType::AnonymousTrustCenter
	}

	pub fn is_org_member(&self, org_id: OrgId) -> bool {
		self.organization_ids.contains(&org_id)
	}

	/// The organization a request acts on: the active one, or the only one.
	pub fn current_org(&self) -> Option<OrgId> {
		if self.active_org.is_some() {
			return self.active_org;
		}
		if self.organization_ids.len() == 1 {
			return self.organization_ids.iter().next().copied();
		}
		None
	}

	/// Domain part of the subject's email, used for org-scoped contextual tuples.
	pub fn email_domain(&self) -> Option<&str> {
		self
			.email
			.as_deref()
			.and_then(|e| e.rsplit_once('@'))
			.map(|(_, domain)| domain)
			.filter(|d| !d.is_empty())
	}
}
