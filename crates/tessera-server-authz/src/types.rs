// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions shared by every part of the engine.
//!
//! - **ID newtypes**: Type-safe wrappers around UUIDs ([`SubjectId`], [`OrgId`])
//! - **Subject classification**: [`SubjectType`] and [`AuthMethod`]
//! - **Relations**: the closed set of relationship names checked against the
//!   access service ([`Relation`])
//! - **Feature modules**: organization entitlements ([`OrgModule`])

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			/// Get the inner UUID value.
			pub fn into_inner(self) -> Uuid {
				self.0
			}

			/// Get a reference to the inner UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Uuid::parse_str(s).map(Self)
			}
		}
	};
}

define_id_type!(SubjectId, "Unique identifier for an authenticated subject.");
define_id_type!(OrgId, "Unique identifier for an organization.");

// =============================================================================
// Subjects
// =============================================================================

/// The kind of principal making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
	/// A human user.
	User,
	/// A service account acting through an API token.
	Service,
	/// An unauthenticated trust-center visitor holding a signed anonymous JWT.
	AnonymousTrustCenter,
}

impl SubjectType {
	/// Object type name used for this subject in relationship tuples.
	pub fn as_tuple_type(&self) -> &'static str {
		match self {
			SubjectType::User | SubjectType::AnonymousTrustCenter => "user",
			SubjectType::Service => "service",
		}
	}
}

impl fmt::Display for SubjectType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SubjectType::User => write!(f, "user"),
			SubjectType::Service => write!(f, "service"),
			SubjectType::AnonymousTrustCenter => write!(f, "anonymous_trust_center"),
		}
	}
}

/// How the subject authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
	Session,
	PersonalAccessToken,
	ApiToken,
	AnonymousTrustCenterJwt,
}

impl fmt::Display for AuthMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AuthMethod::Session => write!(f, "session"),
			AuthMethod::PersonalAccessToken => write!(f, "personal_access_token"),
			AuthMethod::ApiToken => write!(f, "api_token"),
			AuthMethod::AnonymousTrustCenterJwt => write!(f, "anonymous_trust_center_jwt"),
		}
	}
}

// =============================================================================
// Relations
// =============================================================================

/// Relationship names understood by the access service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
	CanView,
	CanEdit,
	CanDelete,
	CanInviteMembers,
	CanInviteAdmins,
	CanViewAuditLog,
	Member,
	Admin,
	Owner,
	Parent,
}

impl Relation {
	pub fn as_str(&self) -> &'static str {
		match self {
			Relation::CanView => "can_view",
			Relation::CanEdit => "can_edit",
			Relation::CanDelete => "can_delete",
			Relation::CanInviteMembers => "can_invite_members",
			Relation::CanInviteAdmins => "can_invite_admins",
			Relation::CanViewAuditLog => "can_view_audit_log",
			Relation::Member => "member",
			Relation::Admin => "admin",
			Relation::Owner => "owner",
			Relation::Parent => "parent",
		}
	}
}

impl fmt::Display for Relation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

// =============================================================================
// Feature Modules
// =============================================================================

/// Purchasable feature modules an organization may be entitled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrgModule {
	#[serde(rename = "base_module")]
	Base,
	#[serde(rename = "compliance_module")]
	Compliance,
	#[serde(rename = "trust_center_module")]
	TrustCenter,
	#[serde(rename = "entity_management_module")]
	EntityManagement,
	#[serde(rename = "vulnerability_management_module")]
	VulnerabilityManagement,
	#[serde(rename = "policy_management_module")]
	PolicyManagement,
	#[serde(rename = "risk_management_module")]
	RiskManagement,
}

impl OrgModule {
	pub fn all() -> &'static [OrgModule] {
		&[
			OrgModule::Base,
			OrgModule::Compliance,
			OrgModule::TrustCenter,
			OrgModule::EntityManagement,
			OrgModule::VulnerabilityManagement,
			OrgModule::PolicyManagement,
			OrgModule::RiskManagement,
		]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			OrgModule::Base => "base_module",
			OrgModule::Compliance => "compliance_module",
			OrgModule::TrustCenter => "trust_center_module",
			OrgModule::EntityManagement => "entity_management_module",
			OrgModule::VulnerabilityManagement => "vulnerability_management_module",
			OrgModule::PolicyManagement => "policy_management_module",
			OrgModule::RiskManagement => "risk_management_module",
		}
	}
}

impl fmt::Display for OrgModule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown module name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModule(pub String);

impl FromStr for OrgModule {
	type Err = UnknownModule;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrgModule::all()
			.iter()
			.copied()
			.find(|m| m.as_str() == s)
			.ok_or_else(|| UnknownModule(s.to_string()))
	}
}
