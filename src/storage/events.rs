//! History events.
//!
//! Events are written by `SqliteStorage::mutate` in the same transaction as
//! the change they describe, and read back newest first.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::{Event, EventType};

/// Insert an event.
///
/// Call within the transaction of the mutation that triggered it.
///
/// # Errors
///
/// Returns an error if the database insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (resource_id, event_type, actor, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.resource_id,
            event.event_type.as_str(),
            event.actor,
            event.comment,
            event.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Events for a resource, newest first. `limit == 0` means no limit.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(conn: &Connection, resource_id: &str, limit: usize) -> Result<Vec<Event>> {
    let query = if limit > 0 {
        r"
            SELECT id, resource_id, event_type, actor, comment, created_at
            FROM events
            WHERE resource_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "
    } else {
        r"
            SELECT id, resource_id, event_type, actor, comment, created_at
            FROM events
            WHERE resource_id = ?1
            ORDER BY created_at DESC, id DESC
            "
    };

    let mut stmt = conn.prepare(query)?;
    let events: Vec<Event> = if limit > 0 {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        stmt.query_map(params![resource_id, limit], event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else {
        stmt.query_map(params![resource_id], event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
    };

    Ok(events)
}

/// Number of events recorded for a resource.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_events(conn: &Connection, resource_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE resource_id = ?1",
        params![resource_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let event_type: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Event {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        event_type: EventType::parse(&event_type),
        actor: row.get(3)?,
        comment: row.get(4)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;
    use chrono::Duration;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn
    }

    fn event(resource: &str, event_type: EventType, at: DateTime<Utc>) -> Event {
        Event {
            id: 0,
            resource_id: resource.to_string(),
            event_type,
            actor: "tester".to_string(),
            comment: Some("c".to_string()),
            created_at: at,
        }
    }

    #[test]
    fn events_come_back_newest_first() {
        let conn = setup();
        let t0 = Utc::now();
        insert_event(&conn, &event("p:ticket:1", EventType::Created, t0)).unwrap();
        insert_event(
            &conn,
            &event("p:ticket:1", EventType::RelationAdded, t0 + Duration::seconds(1)),
        )
        .unwrap();
        insert_event(&conn, &event("p:ticket:2", EventType::Created, t0)).unwrap();

        let events = get_events(&conn, "p:ticket:1", 0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RelationAdded);
        assert_eq!(events[1].event_type, EventType::Created);
        assert_eq!(events[0].comment.as_deref(), Some("c"));

        let limited = get_events(&conn, "p:ticket:1", 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(count_events(&conn, "p:ticket:2").unwrap(), 1);
    }
}
