// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration for the Tessera authorization engine.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`TESSERA_SERVER_*`)
//! - Tracing subscriber bootstrap ([`init_logging`])
//!
//! # Usage
//!
//! ```ignore
//! use tessera_server_config::{init_logging, load_config};
//!
//! let config = load_config()?;
//! init_logging(&config.logging)?;
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;
pub mod telemetry;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};
pub use telemetry::init_logging;

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub authz: AuthzServiceConfig,
	pub modules: ModulesConfig,
	pub objects: ObjectsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TESSERA_SERVER_*`)
/// 2. Config file (`/etc/tessera/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from an explicit list of sources.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let authz = layer.authz.unwrap_or_default().finalize();
	let modules = layer.modules.unwrap_or_default().finalize();
	let objects = layer.objects.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&authz)?;

	info!(
		authz_enabled = authz.enabled,
		authz_url = %authz.base_url,
		modules_enabled = modules.enabled,
		presign_ttl_secs = objects.presign_ttl_secs,
		"Authorization configuration loaded"
	);

	Ok(ServerConfig {
		authz,
		modules,
		objects,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(authz: &AuthzServiceConfig) -> Result<(), ConfigError> {
	if authz.enabled && authz.base_url.trim().is_empty() {
		return Err(ConfigError::Validation(
			"TESSERA_SERVER_AUTHZ_ENABLED is set but no access service URL is configured"
				.to_string(),
		));
	}

	if authz.enabled && authz.store_id.is_none() {
		return Err(ConfigError::Validation(
			"TESSERA_SERVER_AUTHZ_ENABLED is set but TESSERA_SERVER_AUTHZ_STORE_ID is missing"
				.to_string(),
		));
	}

	if authz.request_timeout_ms == 0 {
		return Err(ConfigError::Validation(
			"access service request timeout must be greater than zero".to_string(),
		));
	}

	Ok(())
}
