//! Structured error output for scripted callers.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction
//! - Retryability flags
//! - Context (e.g. the offending cycle path) for debugging

use crate::error::RelationsError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable. Format: `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Database Errors (exit code 2) ===
    DatabaseError,
    SchemaMismatch,
    NotInitialized,
    AlreadyInitialized,

    // === Relation Errors (exit code 3) ===
    RelationNotFound,
    DuplicateRelation,
    UnknownRelationType,
    InvalidResourceId,
    InvalidRelationId,
    TicketNotFound,

    // === Validation Errors (exit code 4) ===
    ValidationFailed,
    CycleDetected,
    SelfReference,
    ResourceBlocked,

    // === Traversal Errors (exit code 5) ===
    TraversalLimit,

    // === Config Errors (exit code 7) ===
    ConfigError,

    // === I/O Errors (exit code 8) ===
    IoError,
    JsonError,
    YamlError,

    // === Internal Errors (exit code 1) ===
    InternalError,
}

impl ErrorCode {
    /// String representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::RelationNotFound => "RELATION_NOT_FOUND",
            Self::DuplicateRelation => "DUPLICATE_RELATION",
            Self::UnknownRelationType => "UNKNOWN_RELATION_TYPE",
            Self::InvalidResourceId => "INVALID_RESOURCE_ID",
            Self::InvalidRelationId => "INVALID_RELATION_ID",
            Self::TicketNotFound => "TICKET_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::SelfReference => "SELF_REFERENCE",
            Self::ResourceBlocked => "RESOURCE_BLOCKED",
            Self::TraversalLimit => "TRAVERSAL_LIMIT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying (after fixing input or waiting) can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed
                | Self::UnknownRelationType
                | Self::InvalidResourceId
                | Self::InvalidRelationId
        )
    }

    /// Exit code grouped by error category.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::DatabaseError
            | Self::SchemaMismatch
            | Self::NotInitialized
            | Self::AlreadyInitialized => 2,
            Self::RelationNotFound
            | Self::DuplicateRelation
            | Self::UnknownRelationType
            | Self::InvalidResourceId
            | Self::InvalidRelationId
            | Self::TicketNotFound => 3,
            Self::ValidationFailed
            | Self::CycleDetected
            | Self::SelfReference
            | Self::ResourceBlocked => 4,
            Self::TraversalLimit => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::YamlError => 8,
            Self::InternalError => 1,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a structured error from a `RelationsError`.
    #[must_use]
    pub fn from_error(err: &RelationsError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);
        let hint = err.suggestion().map(str::to_string);

        Self {
            code,
            message: err.to_string(),
            hint,
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Unknown relation type, with suggestions from the known type names.
    #[must_use]
    pub fn unknown_relation_type(provided: &str, known: &[String]) -> Self {
        let similar = find_similar(provided, known, 3);
        let hint = match similar.as_slice() {
            [] => Some("Run 'bhrel types' to list relation types.".to_string()),
            [one] => Some(format!("Did you mean '{one}'?")),
            many => Some(format!("Did you mean one of: {}?", many.join(", "))),
        };

        Self {
            code: ErrorCode::UnknownRelationType,
            message: format!("Unknown relation type: {provided}"),
            hint,
            retryable: true,
            context: Some(json!({
                "provided": provided,
                "similar_types": similar,
            })),
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }
        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &RelationsError) -> (ErrorCode, Option<Value>) {
        match err {
            RelationsError::Database(_) => (ErrorCode::DatabaseError, None),
            RelationsError::SchemaMismatch { expected, found } => (
                ErrorCode::SchemaMismatch,
                Some(json!({"expected": expected, "found": found})),
            ),
            RelationsError::NotInitialized => (ErrorCode::NotInitialized, None),
            RelationsError::AlreadyInitialized { path } => (
                ErrorCode::AlreadyInitialized,
                Some(json!({"path": path.display().to_string()})),
            ),
            RelationsError::RelationNotFound { id } => {
                (ErrorCode::RelationNotFound, Some(json!({"relation_id": id})))
            }
            RelationsError::DuplicateRelation {
                from,
                to,
                relation_type,
            } => (
                ErrorCode::DuplicateRelation,
                Some(json!({"source": from, "destination": to, "type": relation_type})),
            ),
            RelationsError::UnknownRelationType { relation_type } => (
                ErrorCode::UnknownRelationType,
                Some(json!({"type": relation_type})),
            ),
            RelationsError::InvalidResourceId { id, reason } => (
                ErrorCode::InvalidResourceId,
                Some(json!({"id": id, "reason": reason})),
            ),
            RelationsError::InvalidRelationId { id } => {
                (ErrorCode::InvalidRelationId, Some(json!({"relation_id": id})))
            }
            RelationsError::TicketNotFound { id } => {
                (ErrorCode::TicketNotFound, Some(json!({"id": id})))
            }
            RelationsError::ResourceBlocked { id, blockers } => (
                ErrorCode::ResourceBlocked,
                Some(json!({"id": id, "blockers": blockers})),
            ),
            RelationsError::Validation(v) => {
                let code = match v.kind {
                    crate::error::ValidationKind::Cycle
                    | crate::error::ValidationKind::BlockerCycle => ErrorCode::CycleDetected,
                    crate::error::ValidationKind::SelfReference => ErrorCode::SelfReference,
                    _ => ErrorCode::ValidationFailed,
                };
                (
                    code,
                    Some(json!({
                        "validator": v.kind.as_str(),
                        "failed_ids": v.failed_ids,
                    })),
                )
            }
            RelationsError::TraversalLimitExceeded { limit } => {
                (ErrorCode::TraversalLimit, Some(json!({"limit": limit})))
            }
            RelationsError::Config(_) => (ErrorCode::ConfigError, None),
            RelationsError::Io(_) => (ErrorCode::IoError, None),
            RelationsError::Json(_) => (ErrorCode::JsonError, None),
            RelationsError::Yaml(_) => (ErrorCode::YamlError, None),
            RelationsError::Other(_) => (ErrorCode::InternalError, None),
        }
    }
}

/// Levenshtein edit distance.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Candidates within edit distance 3 of `input` tied at the smallest
/// distance, alphabetical.
fn find_similar(input: &str, candidates: &[String], max: usize) -> Vec<String> {
    let input = input.to_lowercase();
    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .map(|c| (levenshtein_distance(&input, &c.to_lowercase()), c))
        .filter(|(d, _)| *d <= 3)
        .collect();
    let Some(best) = scored.iter().map(|(d, _)| *d).min() else {
        return Vec::new();
    };
    scored.retain(|(d, _)| *d == best);
    scored.sort_by(|a, b| a.1.cmp(b.1));
    scored.into_iter().take(max).map(|(_, c)| c.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ValidationError, ValidationKind};

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::CycleDetected.as_str(), "CYCLE_DETECTED");
        assert_eq!(ErrorCode::RelationNotFound.as_str(), "RELATION_NOT_FOUND");
    }

    #[test]
    fn test_error_code_exit_codes() {
        assert_eq!(ErrorCode::DatabaseError.exit_code(), 2);
        assert_eq!(ErrorCode::DuplicateRelation.exit_code(), 3);
        assert_eq!(ErrorCode::CycleDetected.exit_code(), 4);
        assert_eq!(ErrorCode::ConfigError.exit_code(), 7);
        assert_eq!(ErrorCode::InternalError.exit_code(), 1);
    }

    #[test]
    fn test_cycle_maps_to_cycle_code_with_path() {
        let err = RelationsError::Validation(
            ValidationError::new(ValidationKind::Cycle, "Cycle in 'Depends on'")
                .with_failed_ids(vec!["p:ticket:2".into(), "p:ticket:1".into()]),
        );
        let structured = StructuredError::from_error(&err);
        assert_eq!(structured.code, ErrorCode::CycleDetected);
        let json = structured.to_json();
        assert_eq!(json["error"]["code"], "CYCLE_DETECTED");
        assert_eq!(
            json["error"]["context"]["failed_ids"],
            json!(["p:ticket:2", "p:ticket:1"])
        );
    }

    #[test]
    fn test_unknown_relation_type_suggests() {
        let known = vec!["dependson".to_string(), "dependent".to_string(), "parent".to_string()];
        let err = StructuredError::unknown_relation_type("dependsn", &known);
        assert_eq!(err.hint.as_deref(), Some("Did you mean 'dependson'?"));
        let err = StructuredError::unknown_relation_type("zzzzzzzzzz", &known);
        assert_eq!(
            err.hint.as_deref(),
            Some("Run 'bhrel types' to list relation types.")
        );
    }

    #[test]
    fn test_find_similar_keeps_closest_ties_only() {
        let known = vec![
            "dependson".to_string(),
            "dependent".to_string(),
            "blocks".to_string(),
            "blocker".to_string(),
        ];
        assert_eq!(find_similar("dependsn", &known, 3), vec!["dependson"]);
        assert_eq!(find_similar("block", &known, 3), vec!["blocks"]);
        assert_eq!(find_similar("blockr", &known, 3), vec!["blocker", "blocks"]);
        assert!(find_similar("zzzzzzzzzz", &known, 3).is_empty());
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_to_human_output() {
        let err = StructuredError::from_error(&RelationsError::NotInitialized);
        let human = err.to_human(false);
        assert!(human.starts_with("Error: Relations workspace not initialized"));
        assert!(human.contains("Hint: Run: bhrel init"));
    }
}
