// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization engine for multi-tenant Tessera data access.
//!
//! Every storage read and write passes through this crate. Policy chains
//! decide, traversal filters narrow and result transformers shape what leaves.
//!
//! # Architecture
//!
//! - `context` - Per-request scope: identity, bypass tokens, caches, cancellation
//! - `access` - Relationship service client ([`HttpAccessClient`], [`TupleStore`])
//! - `policy` - Rules and first-decisive-result policy chains
//! - `traversal` - Tenant, hierarchy and list-objects scoping of queries
//! - `feature` - Organization module entitlements and the feature gate
//! - `transform` - Redaction, decryption, deduplication, enrichment
//! - `engine` - [`AuthzEngine`] tying the above together
//!
//! # Example
//!
//! ```ignore
//! use tessera_server_authz::{AuthzEngine, EntityDescriptor, EntityRegistry, MemoryQuery, RequestContext};
//!
//! let registry = EntityRegistry::new().with(EntityDescriptor::org_owned("Task", "owner_id"));
//! let engine = AuthzEngine::builder(registry)
//!     .standard_pipeline(&config, access, hierarchy, entitlements)
//!     .build();
//!
//! let rows = engine.query(&ctx, &store, MemoryQuery::all("Task")).await?;
//! ```

pub mod access;
pub mod context;
pub mod decision;
pub mod engine;
pub mod error;
pub mod feature;
pub mod identity;
pub mod memory;
pub mod policy;
pub mod query;
pub mod registry;
pub mod transform;
pub mod traversal;
pub mod types;

pub use access::{AccessCheck, AccessChecker, AccessError, ContextualTuple, HttpAccessClient, ObjectRef, TupleStore};
pub use context::{BypassToken, BypassTokenKind, GraphError, RequestContext};
pub use decision::Decision;
pub use engine::{AuthzEngine, AuthzEngineBuilder};
pub use error::{AuthzError, Result};
pub use feature::{EntitlementSource, Entitlements, FeatureGate, StaticEntitlements};
pub use identity::Identity;
pub use memory::{MemoryQuery, MemoryStore};
pub use policy::{MutationOp, OpKind, Operation, PolicyChain, Rule, Verdict};
pub use query::{Predicate, QueryExecutor, QueryOp, Queryable, ResultSet, Row};
pub use registry::{EntityDescriptor, EntityRegistry, Enrichment, ModuleRequirement, Scoping, Visibility};
pub use transform::{ResultOrigin, ResultTransformer, TransformTarget};
pub use types::{AuthMethod, OrgId, OrgModule, Relation, SubjectId, SubjectType};
