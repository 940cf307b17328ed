//! Schema Registry Sync
//!
//! Publishes locally declared schemas (Avro, JSON Schema, Protobuf, OpenAPI,
//! AsyncAPI) to an Apicurio-style schema registry and pulls registry
//! dependencies back down.
//!
//! ## Features
//!
//! - **Reference Detection**: Finds cross-schema references per format
//! - **Dependency Ordering**: Publishes dependencies before dependents, failing fast on cycles
//! - **Change Detection**: SHA256 content digests decide between create, version and no-op
//! - **Compatibility Gate**: New versions are checked against the registry's policy first
//! - **Credential Cache**: Shared OAuth2 bearer token with single-flight refresh
//! - **Dependency Pull**: Transitive registry dependencies written to disk
//!
//! ## Architecture
//!
//! ```text
//! discovery ──▶ references ──▶ graph ──▶ publish ──▶ registry ──▶ (HTTP) registry
//!                                                       ▲
//!                                      pull ────────────┤
//!                                                       │
//!                                                 auth (bearer token)
//! ```

pub mod auth;
pub mod checksum;
pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod publish;
pub mod pull;
pub mod references;
pub mod registry;
pub mod schema;

pub use auth::{ClientCredentialsProvider, CredentialCache, TokenProvider};
pub use checksum::Checksum;
pub use config::{CompatibilityPolicy, SyncConfig};
pub use discovery::{discover_schemas, DiscoveryConfig};
pub use error::{Result, SyncError};
pub use graph::{order_by_dependencies, DependencyGraph};
pub use publish::{PublishOrchestrator, PublishOutcome, PublishSummary};
pub use pull::{pull_dependencies, resolve_transitive_dependencies, PullConflict, PullSummary};
pub use references::detect_references;
pub use registry::{ApicurioRegistryClient, RegistryClient};
pub use schema::{
    ContentReference, RegistryDependency, SchemaDocument, SchemaFormat, SchemaReference,
    SchemaWithReferences,
};
