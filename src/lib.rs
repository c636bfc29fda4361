//! `bh_relations`: a ticket relations graph engine backed by `SQLite`.
//!
//! Relations are directed, typed edges between product-scoped resource
//! identifiers. Relation types are configured in pairs so that every edge can
//! be mirrored by its reverse, and each type carries an ordered list of graph
//! validators (no cycles, exclusivity, one-to-many, ...) that run before an
//! edge is stored.
//!
//! Layering, leaf first:
//! - [`storage`]: relation, ticket and history rows
//! - [`registry`]: relation type catalog parsed from configuration
//! - [`graph`]: breadth-first traversal over the stored edges
//! - [`validation`]: the validator pipeline
//! - [`api`]: `RelationsSystem`, the add/get/delete entry points
//! - [`config`], [`cli`]: layered configuration and the `bhrel` binary

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod model;
pub mod output;
pub mod registry;
pub mod storage;
pub mod validation;

pub use api::{NewRelation, RelationChangeListener, RelationsSystem, TracingListener};
pub use error::{ErrorCode, RelationsError, Result, StructuredError, ValidationError, ValidationKind};
pub use model::{Relation, RelationId, RelationView, ResourceId};
pub use registry::{RelationType, RelationTypeRegistry};
