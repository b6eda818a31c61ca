//! Avro Schema Registry
//!
//! An in-process registry that stores, versions and deduplicates Avro schema
//! definitions, tracks the named types each schema depends on, and decides
//! whether a new registration is a compatible evolution or a breaking change.
//!
//! ## Features
//!
//! - **Content Addressing**: Schemas are keyed by a SHA256 hash of their semantic
//!   keywords, so documentation-only edits are duplicates
//! - **Version History**: Every distinct body under a qualified name is a minor version
//! - **Dependency Snapshots**: Referenced schemas are frozen at registration time
//! - **Evolution Policies**: `strict` (every change is major) or `resolve`
//!   (Avro reader/writer resolution decides)
//! - **Events**: Subscribers are notified of new, duplicate and updated schemas
//!
//! ## Example
//!
//! ```
//! use avro_registry::{Registry, SchemaEvolution, Topic};
//! use serde_json::json;
//!
//! let registry = Registry::with_evolution(SchemaEvolution::Resolve);
//! registry.subscribe(Topic::NewMajorSchema, |event| println!("new major: {}", event.name));
//!
//! let v1 = registry.register(json!({
//!     "name": "test", "type": "record",
//!     "fields": [ { "name": "test", "type": "int" } ]
//! })).unwrap();
//! let v2 = registry.register(json!({
//!     "name": "test", "type": "record",
//!     "fields": [ { "name": "test", "type": ["int", "null"] } ]
//! })).unwrap();
//!
//! assert_eq!(v1.major_version, v2.major_version);
//! ```

pub mod checksum;
pub mod classify;
pub mod compatibility;
pub mod config;
pub mod dependency;
pub mod error;
pub mod events;
pub mod loader;
pub mod registry;
pub mod schema;
pub mod version;

pub use checksum::Checksum;
pub use compatibility::{AvroResolver, ResolverInput, SchemaEvolution, SchemaResolver};
pub use config::RegistrySettings;
pub use dependency::{build_snapshot, discover_dependencies, DependencyMap, Snapshot};
pub use error::{RegistryError, Result};
pub use events::{SchemaEvent, Subscription, Topic};
pub use registry::Registry;
pub use schema::{qualified_name, AvroType};
pub use version::{RegistrationEntry, VersionStore};
