// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feature-module gating configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModulesConfigLayer {
	pub enabled: Option<bool>,
}

impl ModulesConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
	}

	pub fn finalize(self) -> ModulesConfig {
		ModulesConfig {
			enabled: self.enabled.unwrap_or(true),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModulesConfig {
	/// When false every organization is treated as entitled to every module.
	pub enabled: bool,
}

impl Default for ModulesConfig {
	fn default() -> Self {
		ModulesConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		assert!(ModulesConfig::default().enabled);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = ModulesConfigLayer { enabled: Some(true) };
		base.merge(ModulesConfigLayer { enabled: Some(false) });
		assert_eq!(base.enabled, Some(false));
		base.merge(ModulesConfigLayer::default());
		assert_eq!(base.finalize(), ModulesConfig { enabled: false });
	}
}
