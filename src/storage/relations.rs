//! Relation rows.
//!
//! Every function runs on a caller-supplied connection or transaction
//! (`Transaction` derefs to `Connection`); nothing here opens a transaction.

use crate::error::{RelationsError, Result};
use crate::model::{Relation, RelationId, ResourceId, from_micros};
use rusqlite::{Connection, OptionalExtension, ToSql, params, params_from_iter};

/// Frontier ids per batched query, kept well under SQLite's parameter limit.
pub const FRONTIER_CHUNK: usize = 500;

const COLUMNS: &str = "source, destination, type, comment, author, time";

/// Filter for [`select`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RelationCriteria {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub relation_type: Option<String>,
    pub sources: Option<Vec<String>>,
    pub destinations: Option<Vec<String>>,
    pub types: Option<Vec<String>>,
}

impl RelationCriteria {
    #[must_use]
    pub fn from_source(source: &ResourceId) -> Self {
        Self {
            source: Some(source.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to_destination(destination: &ResourceId) -> Self {
        Self {
            destination: Some(destination.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_type(mut self, relation_type: &str) -> Self {
        self.relation_type = Some(relation_type.to_string());
        self
    }
}

/// Which end of an edge the frontier sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow edges source -> destination.
    Outgoing,
    /// Follow edges destination -> source.
    Incoming,
}

fn relation_from_row(row: &rusqlite::Row) -> rusqlite::Result<Relation> {
    let source: String = row.get(0)?;
    let destination: String = row.get(1)?;
    let parse = |idx: usize, value: String| {
        ResourceId::try_from(value).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    };
    Ok(Relation {
        source: parse(0, source)?,
        destination: parse(1, destination)?,
        relation_type: row.get(2)?,
        comment: row.get(3)?,
        author: row.get(4)?,
        time: from_micros(row.get(5)?),
    })
}

/// Insert one row.
///
/// # Errors
///
/// Returns `DuplicateRelation` if the key exists, or a database error.
pub fn insert(conn: &Connection, relation: &Relation) -> Result<()> {
    if exists(
        conn,
        relation.source.as_str(),
        relation.destination.as_str(),
        &relation.relation_type,
    )? {
        return Err(RelationsError::DuplicateRelation {
            from: relation.source.to_string(),
            to: relation.destination.to_string(),
            relation_type: relation.relation_type.clone(),
        });
    }

    conn.execute(
        &format!("INSERT INTO relations ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            relation.source.as_str(),
            relation.destination.as_str(),
            relation.relation_type,
            relation.comment,
            relation.author,
            relation.time_micros(),
        ],
    )?;
    Ok(())
}

/// Whether a row with this key exists.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn exists(conn: &Connection, source: &str, destination: &str, relation_type: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM relations WHERE source = ?1 AND destination = ?2 AND type = ?3",
    )?;
    Ok(stmt.exists(params![source, destination, relation_type])?)
}

/// Load one row by key.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get(conn: &Connection, id: &RelationId) -> Result<Option<Relation>> {
    let relation = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM relations WHERE source = ?1 AND destination = ?2 AND type = ?3"
            ),
            params![id.source.as_str(), id.destination.as_str(), id.relation_type],
            relation_from_row,
        )
        .optional()?;
    Ok(relation)
}

fn push_in(
    clauses: &mut Vec<String>,
    values: &mut Vec<String>,
    column: &str,
    set: &[String],
) {
    if set.is_empty() {
        clauses.push("0".to_string());
        return;
    }
    let placeholders = vec!["?"; set.len()].join(", ");
    clauses.push(format!("{column} IN ({placeholders})"));
    values.extend(set.iter().cloned());
}

/// Rows matching `criteria`, ordered by `(type, source, destination)`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn select(conn: &Connection, criteria: &RelationCriteria) -> Result<Vec<Relation>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(source) = &criteria.source {
        clauses.push("source = ?".to_string());
        values.push(source.clone());
    }
    if let Some(destination) = &criteria.destination {
        clauses.push("destination = ?".to_string());
        values.push(destination.clone());
    }
    if let Some(relation_type) = &criteria.relation_type {
        clauses.push("type = ?".to_string());
        values.push(relation_type.clone());
    }
    if let Some(sources) = &criteria.sources {
        push_in(&mut clauses, &mut values, "source", sources);
    }
    if let Some(destinations) = &criteria.destinations {
        push_in(&mut clauses, &mut values, "destination", destinations);
    }
    if let Some(types) = &criteria.types {
        push_in(&mut clauses, &mut values, "type", types);
    }

    let mut sql = format!("SELECT {COLUMNS} FROM relations");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY type, source, destination");

    let mut stmt = conn.prepare(&sql)?;
    let relations = stmt
        .query_map(params_from_iter(values.iter()), relation_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(relations)
}

/// Every row with `resource` as source or destination, ordered by
/// `(type, source, destination)`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn select_touching(conn: &Connection, resource: &ResourceId) -> Result<Vec<Relation>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM relations WHERE source = ?1 OR destination = ?1
         ORDER BY type, source, destination"
    ))?;
    let relations = stmt
        .query_map([resource.as_str()], relation_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(relations)
}

/// Edges leaving (or entering) any node of `frontier`, restricted to
/// `types`, as `(origin, target)` pairs sorted lexicographically.
///
/// One query per `FRONTIER_CHUNK` frontier ids.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn neighbors(
    conn: &Connection,
    frontier: &[String],
    types: &[String],
    direction: Direction,
) -> Result<Vec<(String, String)>> {
    if frontier.is_empty() || types.is_empty() {
        return Ok(Vec::new());
    }

    let (origin, target) = match direction {
        Direction::Outgoing => ("source", "destination"),
        Direction::Incoming => ("destination", "source"),
    };
    let type_placeholders = vec!["?"; types.len()].join(", ");

    let mut edges = Vec::new();
    for chunk in frontier.chunks(FRONTIER_CHUNK) {
        let origin_placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT {origin}, {target} FROM relations
             WHERE {origin} IN ({origin_placeholders}) AND type IN ({type_placeholders})"
        );
        let params: Vec<&dyn ToSql> = chunk
            .iter()
            .chain(types.iter())
            .map(|s| s as &dyn ToSql)
            .collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
        edges.extend(rows);
    }

    edges.sort();
    edges.dedup();
    Ok(edges)
}

/// Rows of any type from a node in `from` to a node in `to`, ordered by
/// `(type, source, destination)`. Both sets are chunked.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn edges_between(conn: &Connection, from: &[String], to: &[String]) -> Result<Vec<Relation>> {
    let half = FRONTIER_CHUNK / 2;
    let mut found = Vec::new();
    for sources in from.chunks(half) {
        for destinations in to.chunks(half) {
            found.extend(select(
                conn,
                &RelationCriteria {
                    sources: Some(sources.to_vec()),
                    destinations: Some(destinations.to_vec()),
                    ..RelationCriteria::default()
                },
            )?);
        }
    }
    found.sort_by(|a, b| {
        (&a.relation_type, &a.source, &a.destination).cmp(&(&b.relation_type, &b.source, &b.destination))
    });
    Ok(found)
}

/// Delete exactly one row.
///
/// # Errors
///
/// Returns `RelationNotFound` if no row has this key.
pub fn delete(conn: &Connection, id: &RelationId) -> Result<()> {
    let deleted = conn.execute(
        "DELETE FROM relations WHERE source = ?1 AND destination = ?2 AND type = ?3",
        params![id.source.as_str(), id.destination.as_str(), id.relation_type],
    )?;
    if deleted == 0 {
        return Err(RelationsError::RelationNotFound { id: id.to_string() });
    }
    Ok(())
}

/// Delete every row touching `resource`; returns the number removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_for_resource(conn: &Connection, resource: &ResourceId) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM relations WHERE source = ?1 OR destination = ?1",
        [resource.as_str()],
    )?;
    Ok(deleted)
}

/// Total number of rows.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;
    Ok(usize::try_from(n).unwrap_or(0))
}
