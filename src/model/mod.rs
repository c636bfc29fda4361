//! Core data types for `bh_relations`.
//!
//! - `ResourceId` - product-scoped resource identifier
//! - `Relation` - a directed, typed edge between two resources
//! - `RelationId` - the `source,destination,type` lookup key
//! - `RelationView` - a relation annotated for display
//! - `Ticket` - minimal ticket record referenced by relations
//! - `Event` - history entries

use crate::error::RelationsError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Delimiter joining the parts of a relation id.
pub const RELATION_ID_DELIMITER: char = ',';

/// Product-scoped resource identifier: `product:realm:id`.
///
/// The product may be empty, which denotes the global scope
/// (`:ticket:7`). Realm and local id may not be empty, and no part may
/// contain the relation id delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Parse and validate a resource identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResourceId` if the string is not `product:realm:id`.
    pub fn parse(s: &str) -> Result<Self, RelationsError> {
        let invalid = |reason: &str| RelationsError::InvalidResourceId {
            id: s.to_string(),
            reason: reason.to_string(),
        };

        if s.contains(RELATION_ID_DELIMITER) {
            return Err(invalid("must not contain ','"));
        }
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(invalid("expected product:realm:id"));
        }
        if parts[1].is_empty() {
            return Err(invalid("realm is empty"));
        }
        if parts[2].is_empty() {
            return Err(invalid("id is empty"));
        }
        Ok(Self(s.to_string()))
    }

    /// Build an identifier from its parts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResourceId` if the parts do not form a valid id.
    pub fn new(product: &str, realm: &str, id: &str) -> Result<Self, RelationsError> {
        Self::parse(&format!("{product}:{realm}:{id}"))
    }

    /// Ticket identifier in a product (`product:ticket:id`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidResourceId` if the product or id contain delimiters.
    pub fn ticket(product: &str, id: impl fmt::Display) -> Result<Self, RelationsError> {
        Self::new(product, "ticket", &id.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn part(&self, index: usize) -> &str {
        self.0.split(':').nth(index).unwrap_or_default()
    }

    /// Product scope; empty for the global scope.
    #[must_use]
    pub fn product(&self) -> &str {
        self.part(0)
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        self.part(1)
    }

    #[must_use]
    pub fn local_id(&self) -> &str {
        self.part(2)
    }

    #[must_use]
    pub fn is_ticket(&self) -> bool {
        self.realm() == "ticket"
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = RelationsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = RelationsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key of a relation: `source,destination,type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationId {
    pub source: ResourceId,
    pub destination: ResourceId,
    pub relation_type: String,
}

impl RelationId {
    /// Parse a relation id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRelationId` unless the string has exactly three
    /// `,`-separated parts, or `InvalidResourceId` if an endpoint is malformed.
    pub fn parse(s: &str) -> Result<Self, RelationsError> {
        let parts: Vec<&str> = s.split(RELATION_ID_DELIMITER).collect();
        if parts.len() != 3 || parts[2].is_empty() {
            return Err(RelationsError::InvalidRelationId { id: s.to_string() });
        }
        Ok(Self {
            source: ResourceId::parse(parts[0])?,
            destination: ResourceId::parse(parts[1])?,
            relation_type: parts[2].to_string(),
        })
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{RELATION_ID_DELIMITER}{}{RELATION_ID_DELIMITER}{}",
            self.source, self.destination, self.relation_type
        )
    }
}

impl FromStr for RelationId {
    type Err = RelationsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A directed, typed edge.
///
/// `(source, destination, relation_type)` is the key and never changes once
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: ResourceId,
    pub destination: ResourceId,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub author: String,
    pub time: DateTime<Utc>,
}

impl Relation {
    /// New relation stamped with the current time (microsecond precision).
    #[must_use]
    pub fn new(source: ResourceId, destination: ResourceId, relation_type: &str) -> Self {
        Self {
            source,
            destination,
            relation_type: relation_type.to_string(),
            comment: String::new(),
            author: String::new(),
            time: Utc::now().trunc_subsecs(6),
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> RelationId {
        RelationId {
            source: self.source.clone(),
            destination: self.destination.clone(),
            relation_type: self.relation_type.clone(),
        }
    }

    /// The mirrored edge: endpoints swapped, given type, same metadata.
    #[must_use]
    pub fn clone_reverted(&self, relation_type: &str) -> Self {
        Self {
            source: self.destination.clone(),
            destination: self.source.clone(),
            relation_type: relation_type.to_string(),
            comment: self.comment.clone(),
            author: self.author.clone(),
            time: self.time,
        }
    }

    /// Storage representation of `time`.
    #[must_use]
    pub fn time_micros(&self) -> i64 {
        self.time.timestamp_micros()
    }
}

/// Convert stored epoch microseconds back to a timestamp.
#[must_use]
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A relation annotated for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationView {
    pub relation_id: RelationId,
    #[serde(flatten)]
    pub relation: Relation,
    pub label: String,
}

/// Ticket lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    Closed,
}

impl TicketStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = RelationsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(RelationsError::Config(format!(
                "unknown ticket status '{other}'"
            ))),
        }
    }
}

/// Ticket record: the fields relations read (age, status, copied summary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: ResourceId,
    pub summary: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    #[must_use]
    pub fn new(id: ResourceId, summary: impl Into<String>) -> Self {
        Self {
            id,
            summary: summary.into(),
            status: TicketStatus::Open,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Value of a copyable field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "summary" => Some(self.summary.clone()),
            "status" => Some(self.status.to_string()),
            _ => None,
        }
    }
}

/// History event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Closed,
    Reopened,
    Deleted,
    RelationAdded,
    RelationRemoved,
    Custom(String),
}

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::Deleted => "deleted",
            Self::RelationAdded => "relation_added",
            Self::RelationRemoved => "relation_removed",
            Self::Custom(value) => value,
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "closed" => Self::Closed,
            "reopened" => Self::Reopened,
            "deleted" => Self::Deleted,
            "relation_added" => Self::RelationAdded,
            "relation_removed" => Self::RelationRemoved,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// An entry in a resource's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub resource_id: String,
    pub event_type: EventType,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
