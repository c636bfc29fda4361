//! Error types for `bh_relations`.
//!
//! # Design
//!
//! - `thiserror` derive for the error taxonomy
//! - `anyhow` integration for wrapped errors from collaborators
//! - Validation failures carry the offending path so callers can render it
//! - `StructuredError` gives the CLI stable codes and JSON output

mod structured;

pub use structured::{ErrorCode, StructuredError};

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for relations operations.
#[derive(Error, Debug)]
pub enum RelationsError {
    // === Storage Errors ===
    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database schema is newer than this build understands.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    // === Relation Errors ===
    /// A relation with the same (source, destination, type) already exists.
    #[error("Relation already exists: {from} -> {to} ({relation_type})")]
    DuplicateRelation {
        from: String,
        to: String,
        relation_type: String,
    },

    /// The relation to delete or load does not exist.
    #[error("Relation not found: {id}")]
    RelationNotFound { id: String },

    /// The relation type is not declared in the registry.
    #[error("Unknown relation type: {relation_type}")]
    UnknownRelationType { relation_type: String },

    /// A candidate relation was rejected by a validator.
    #[error("{0}")]
    Validation(ValidationError),

    /// Resource identifier is not `product:realm:id`.
    #[error("Invalid resource id '{id}': {reason}")]
    InvalidResourceId { id: String, reason: String },

    /// Relation identifier is not `source,destination,type`.
    #[error("Invalid relation id: {id}")]
    InvalidRelationId { id: String },

    /// Graph traversal visited more nodes than allowed.
    #[error("Traversal limit of {limit} nodes exceeded")]
    TraversalLimitExceeded { limit: usize },

    // === Ticket Errors ===
    /// Ticket with the given resource id was not found.
    #[error("Ticket not found: {id}")]
    TicketNotFound { id: String },

    /// Ticket cannot be closed while blocking resources are open.
    #[error("Cannot close {id}: blocked by {}", .blockers.join(", "))]
    ResourceBlocked { id: String, blockers: Vec<String> },

    // === Configuration Errors ===
    /// Configuration file or relation type error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workspace not initialized.
    #[error("Relations workspace not initialized: run 'bhrel init' first")]
    NotInitialized,

    /// Already initialized.
    #[error("Already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which validator rejected a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    SelfReference,
    Cycle,
    Exclusive,
    OneToMany,
    CrossProduct,
    StaleReference,
    BlockerCycle,
}

impl ValidationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SelfReference => "self_reference",
            Self::Cycle => "cycle",
            Self::Exclusive => "exclusive",
            Self::OneToMany => "one_to_many",
            Self::CrossProduct => "cross_product",
            Self::StaleReference => "stale_reference",
            Self::BlockerCycle => "blocker_cycle",
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validator's rejection of a candidate relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationKind,
    /// Human-readable explanation.
    pub message: String,
    /// Resource ids on the offending path, when the failure is graph-shaped.
    pub failed_ids: Vec<String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            failed_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_failed_ids(mut self, ids: Vec<String>) -> Self {
        self.failed_ids = ids;
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for RelationsError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl RelationsError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::RelationNotFound { .. }
                | Self::DuplicateRelation { .. }
                | Self::UnknownRelationType { .. }
                | Self::Validation(_)
                | Self::InvalidResourceId { .. }
                | Self::InvalidRelationId { .. }
                | Self::TicketNotFound { .. }
                | Self::ResourceBlocked { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run: bhrel init"),
            Self::AlreadyInitialized { .. } => Some("Use --force to reinitialize"),
            Self::UnknownRelationType { .. } => Some("Run 'bhrel types' to list relation types"),
            Self::InvalidResourceId { .. } => {
                Some("Resource ids look like 'product:ticket:42' (product may be empty)")
            }
            Self::InvalidRelationId { .. } => {
                Some("Relation ids look like 'source,destination,type'; see 'bhrel rel list'")
            }
            Self::ResourceBlocked { .. } => Some("Close the blockers first or pass --force"),
            Self::TraversalLimitExceeded { .. } => {
                Some("Raise relations.max_traversal_nodes in config.yaml")
            }
            Self::Validation(err) => match err.kind {
                ValidationKind::Cycle | ValidationKind::BlockerCycle => {
                    Some("Remove one relation on the path to break the cycle")
                }
                ValidationKind::SelfReference => Some("A resource cannot relate to itself"),
                ValidationKind::OneToMany => Some("Remove the existing relation of this type first"),
                _ => None,
            },
            _ => None,
        }
    }

    /// Shorthand for a validation failure.
    #[must_use]
    pub fn validation(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(kind, message))
    }
}

/// Result type using `RelationsError`.
pub type Result<T> = std::result::Result<T, RelationsError>;
