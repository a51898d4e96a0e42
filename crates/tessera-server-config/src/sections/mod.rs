// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod authz;
mod logging;
mod modules;
mod objects;

pub use authz::{AuthzServiceConfig, AuthzServiceConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use modules::{ModulesConfig, ModulesConfigLayer};
pub use objects::{ObjectsConfig, ObjectsConfigLayer};
