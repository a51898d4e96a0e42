// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuthzServiceConfigLayer, LoggingConfigLayer, ModulesConfigLayer, ObjectsConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tessera/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TESSERA_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			authz: Some(load_authz_from_env()?),
			modules: Some(load_modules_from_env()),
			objects: Some(load_objects_from_env()?),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_authz_from_env() -> Result<AuthzServiceConfigLayer, ConfigError> {
	Ok(AuthzServiceConfigLayer {
		enabled: env_bool("TESSERA_SERVER_AUTHZ_ENABLED"),
		base_url: env_var("TESSERA_SERVER_AUTHZ_URL"),
		store_id: env_var("TESSERA_SERVER_AUTHZ_STORE_ID"),
		model_id: env_var("TESSERA_SERVER_AUTHZ_MODEL_ID"),
		request_timeout_ms: env_u64("TESSERA_SERVER_AUTHZ_TIMEOUT_MS")?,
		send_org_context: env_bool("TESSERA_SERVER_AUTHZ_SEND_ORG_CONTEXT"),
	})
}

fn load_modules_from_env() -> ModulesConfigLayer {
	ModulesConfigLayer {
		enabled: env_bool("TESSERA_SERVER_MODULES_ENABLED"),
	}
}

fn load_objects_from_env() -> Result<ObjectsConfigLayer, ConfigError> {
	Ok(ObjectsConfigLayer {
		presign_ttl_secs: env_u64("TESSERA_SERVER_PRESIGN_TTL_SECS")?,
	})
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("TESSERA_SERVER_LOG_LEVEL"),
		json: env_bool("TESSERA_SERVER_LOG_JSON"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn precedence_orders_env_last() {
		let mut sources: Vec<Box<dyn ConfigSource>> = vec![
			Box::new(EnvSource),
			Box::new(TomlSource::new("/nonexistent")),
			Box::new(DefaultsSource),
		];
		sources.sort_by_key(|s| s.precedence());
		let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
		assert_eq!(names, vec!["defaults", "toml-config", "environment"]);
	}

	#[test]
	fn missing_toml_file_yields_empty_layer() {
		let layer = TomlSource::new("/definitely/not/here.toml")
			.load()
			.unwrap();
		assert!(layer.authz.is_none());
		assert!(layer.logging.is_none());
	}

	#[test]
	fn toml_file_is_parsed_into_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[authz]
enabled = true
store_id = "01HSTORE"

[modules]
enabled = false

[logging]
level = "debug"
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.authz.unwrap().store_id.as_deref(), Some("01HSTORE"));
		assert_eq!(layer.modules.unwrap().enabled, Some(false));
		assert_eq!(layer.logging.unwrap().level.as_deref(), Some("debug"));
	}

	#[test]
	fn malformed_toml_is_reported_with_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[authz\nenabled = ").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}
}
