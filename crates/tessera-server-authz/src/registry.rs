// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-entity-type authorization metadata.
//!
//! Every entity type the engine serves is registered once with an
//! [`EntityDescriptor`] describing how it is scoped to tenants, which modules
//! gate it and which of its fields need redaction, decryption or enrichment.
//! Filters and transformers consult the registry instead of inspecting rows.

use std::collections::{BTreeSet, HashMap};

use crate::types::{OrgModule, Relation};

/// Which organizations' rows an org-owned entity type exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
	/// Rows owned by the caller's own organizations.
	OwnOrg,
	/// Also rows owned by any ancestor organization.
	WithAncestors,
	/// Also rows owned by any descendant organization.
	WithDescendants,
	/// Rows owned anywhere in the caller's organization trees.
	Hierarchy,
}

impl Visibility {
	pub fn includes_ancestors(&self) -> bool {
		matches!(self, Visibility::WithAncestors | Visibility::Hierarchy)
	}

	pub fn includes_descendants(&self) -> bool {
		matches!(self, Visibility::WithDescendants | Visibility::Hierarchy)
	}
}

/// How a query on an entity type is narrowed to what the caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scoping {
	/// Not tenant owned; no narrowing.
	Unscoped,
	/// Rows carry an owning organization id in `field`.
	OrgOwner {
		field: String,
		visibility: Visibility,
		allow_null_owner: bool,
	},
	/// Rows are narrowed to the object ids the access service lists for the caller.
	ListObjects {
		object_type: String,
		field: String,
		relation: Relation,
	},
}

/// Modules an entity type needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRequirement {
	AllOf(BTreeSet<OrgModule>),
	AnyOf(BTreeSet<OrgModule>),
}

impl ModuleRequirement {
	pub fn all_of(modules: impl IntoIterator<Item = OrgModule>) -> Self {
		ModuleRequirement::AllOf(modules.into_iter().collect())
	}

	pub fn any_of(modules: impl IntoIterator<Item = OrgModule>) -> Self {
		ModuleRequirement::AnyOf(modules.into_iter().collect())
	}

	pub fn modules(&self) -> &BTreeSet<OrgModule> {
		match self {
			ModuleRequirement::AllOf(m) | ModuleRequirement::AnyOf(m) => m,
		}
	}

	/// The first module that keeps the requirement from being met, if any.
	pub fn first_missing(&self, enabled: &BTreeSet<OrgModule>) -> Option<OrgModule> {
		match self {
			ModuleRequirement::AllOf(required) => required.iter().find(|m| !enabled.contains(m)).copied(),
			ModuleRequirement::AnyOf(required) => {
				if required.is_empty() || required.iter().any(|m| enabled.contains(m)) {
					None
				} else {
					required.iter().next().copied()
				}
			}
		}
	}

	pub fn is_satisfied_by(&self, enabled: &BTreeSet<OrgModule>) -> bool {
		self.first_missing(enabled).is_none()
	}
}

/// A field populated from an external system after the query ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
	/// A short-lived signed download link for the file referenced by `source_field`.
	PresignedUrl { field: String, source_field: String },
	/// A billing-portal link for the customer referenced by `source_field`.
	BillingPortalUrl { field: String, source_field: String },
}

impl Enrichment {
	pub fn field(&self) -> &str {
		match self {
			Enrichment::PresignedUrl { field, .. } | Enrichment::BillingPortalUrl { field, .. } => field,
		}
	}

	pub fn source_field(&self) -> &str {
		match self {
			Enrichment::PresignedUrl { source_field, .. } | Enrichment::BillingPortalUrl { source_field, .. } => {
				source_field
			}
		}
	}
}

/// A relation checked per returned row after the query ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCheck {
	pub object_type: String,
	pub relation: Relation,
}

/// Authorization metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
	pub entity_type: String,
	pub scoping: Scoping,
	/// The entity type is the tenant boundary itself.
	pub root_tenant: bool,
	pub modules: Option<ModuleRequirement>,
	pub secret_fields: Vec<String>,
	pub encrypted_fields: Vec<String>,
	/// Collapse rows sharing this field unless the tree itself is enumerated.
	pub dedup_key: Option<String>,
	pub object_check: Option<ObjectCheck>,
	pub enrichments: Vec<Enrichment>,
}

impl EntityDescriptor {
	/// An entity type with no tenant scoping.
	pub fn unscoped(entity_type: impl Into<String>) -> Self {
		Self {
			entity_type: entity_type.into(),
			scoping: Scoping::Unscoped,
			root_tenant: false,
			modules: None,
			secret_fields: Vec::new(),
			encrypted_fields: Vec::new(),
			dedup_key: None,
			object_check: None,
			enrichments: Vec::new(),
		}
	}

	/// An entity type owned by an organization through `owner_field`.
	pub fn org_owned(entity_type: impl Into<String>, owner_field: impl Into<String>) -> Self {
		Self {
			scoping: Scoping::OrgOwner {
				field: owner_field.into(),
				visibility: Visibility::OwnOrg,
				allow_null_owner: false,
			},
			..Self::unscoped(entity_type)
		}
	}

	/// The root tenant entity. Queries on it are not narrowed by owner.
	pub fn root_tenant(entity_type: impl Into<String>) -> Self {
		Self {
			root_tenant: true,
			..Self::unscoped(entity_type)
		}
	}

	/// A membership join row for `object_type`, narrowed through `<object_type>_id`.
	pub fn membership(entity_type: impl Into<String>, object_type: impl Into<String>) -> Self {
		let object_type = object_type.into();
		Self {
			scoping: Scoping::ListObjects {
				field: format!("{object_type}_id"),
				object_type,
				relation: Relation::CanView,
			},
			..Self::unscoped(entity_type)
		}
	}

	/// An audit history row for `object_type`, narrowed through `ref`.
	pub fn history(entity_type: impl Into<String>, object_type: impl Into<String>) -> Self {
		Self {
			scoping: Scoping::ListObjects {
				object_type: object_type.into(),
				field: "ref".to_string(),
				relation: Relation::CanViewAuditLog,
			},
			..Self::unscoped(entity_type)
		}
	}

	/// Builder: set hierarchy visibility. Only meaningful for org-owned types.
	pub fn with_visibility(mut self, visibility: Visibility) -> Self {
		if let Scoping::OrgOwner { visibility: v, .. } = &mut self.scoping {
			*v = visibility;
		}
		self
	}

	/// Builder: also expose rows with no owning organization.
	pub fn with_null_owner(mut self) -> Self {
		if let Scoping::OrgOwner { allow_null_owner, .. } = &mut self.scoping {
			*allow_null_owner = true;
		}
		self
	}

	pub fn with_modules(mut self, requirement: ModuleRequirement) -> Self {
		self.modules = Some(requirement);
		self
	}

	pub fn with_secret_field(mut self, field: impl Into<String>) -> Self {
		self.secret_fields.push(field.into());
		self
	}

	pub fn with_encrypted_field(mut self, field: impl Into<String>) -> Self {
		self.encrypted_fields.push(field.into());
		self
	}

	pub fn with_dedup_key(mut self, field: impl Into<String>) -> Self {
		self.dedup_key = Some(field.into());
		self
	}

	pub fn with_object_check(mut self, object_type: impl Into<String>, relation: Relation) -> Self {
		self.object_check = Some(ObjectCheck {
			object_type: object_type.into(),
			relation,
		});
		self
	}

	pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
		self.enrichments.push(enrichment);
		self
	}

	/// Field carrying the owning organization, for org-owned types.
	pub fn owner_field(&self) -> Option<&str> {
		match &self.scoping {
			Scoping::OrgOwner { field, .. } => Some(field),
			_ => None,
		}
	}
}

/// Lookup table from entity type to its descriptor.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
	entities: HashMap<String, EntityDescriptor>,
	root_tenant: Option<String>,
}

impl EntityRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder: register a descriptor, replacing any previous one for the type.
	pub fn with(mut self, descriptor: EntityDescriptor) -> Self {
		self.register(descriptor);
		self
	}

	/// Registering a root tenant replaces any previously registered one.
	pub fn register(&mut self, descriptor: EntityDescriptor) {
		if descriptor.root_tenant {
			self.root_tenant = Some(descriptor.entity_type.clone());
		} else if self.root_tenant.as_deref() == Some(descriptor.entity_type.as_str()) {
			self.root_tenant = None;
		}
		self.entities.insert(descriptor.entity_type.clone(), descriptor);
	}

	/// The entity type forming the tenant boundary, if one is registered.
	pub fn root_tenant(&self) -> Option<&str> {
		self.root_tenant.as_deref()
	}

	pub fn get(&self, entity_type: &str) -> Option<&EntityDescriptor> {
		self.entities.get(entity_type)
	}

	pub fn contains(&self, entity_type: &str) -> bool {
		self.entities.contains_key(entity_type)
	}

	pub fn len(&self) -> usize {
		self.entities.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entities.is_empty()
	}
}
