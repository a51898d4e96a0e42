// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by a single source.

use serde::{Deserialize, Serialize};

use crate::sections::{
	AuthzServiceConfigLayer, LoggingConfigLayer, ModulesConfigLayer, ObjectsConfigLayer,
};

/// One source's view of the configuration. Every section is optional so that
/// layers can be merged with later sources overriding earlier ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub authz: Option<AuthzServiceConfigLayer>,
	#[serde(default)]
	pub modules: Option<ModulesConfigLayer>,
	#[serde(default)]
	pub objects: Option<ObjectsConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if let Some(other_authz) = other.authz {
			self
				.authz
				.get_or_insert_with(Default::default)
				.merge(other_authz);
		}
		if let Some(other_modules) = other.modules {
			self
				.modules
				.get_or_insert_with(Default::default)
				.merge(other_modules);
		}
		if let Some(other_objects) = other.objects {
			self
				.objects
				.get_or_insert_with(Default::default)
				.merge(other_objects);
		}
		if let Some(other_logging) = other.logging {
			self
				.logging
				.get_or_insert_with(Default::default)
				.merge(other_logging);
		}
	}
}
