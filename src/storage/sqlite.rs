//! `SQLite` storage implementation.

use crate::error::Result;
use crate::model::{Event, EventType, ResourceId, Ticket, TicketStatus};
use crate::storage::schema::apply_schema;
use crate::storage::{events, tickets};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation, collecting side effects written at commit.
pub struct MutationContext {
    pub op_name: String,
    pub actor: String,
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    pub fn record_event(&mut self, event_type: EventType, resource_id: &str, comment: Option<String>) {
        self.events.push(Event {
            id: 0, // DB assigns
            resource_id: resource_id.to_string(),
            event_type,
            actor: self.actor.clone(),
            comment,
            created_at: Utc::now(),
        });
    }
}

impl SqliteStorage {
    /// Open a database file, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open with an optional busy timeout (ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "Opened relations database");
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Read-only access for queries.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation in one IMMEDIATE transaction.
    ///
    /// The write lock is taken before `f` runs, so reads made by `f` (graph
    /// validation) and its writes are serialized against other writers.
    /// Events recorded on the context are written before commit.
    ///
    /// # Errors
    ///
    /// Returns the first error from `f` or the database. The transaction is
    /// rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            events::insert_event(&tx, event)?;
        }

        tx.commit()?;
        tracing::trace!(
            op = %ctx.op_name,
            actor = %ctx.actor,
            events = ctx.events.len(),
            "Committed mutation"
        );

        Ok(result)
    }

    // ========================================================================
    // Tickets
    // ========================================================================

    /// Create a ticket with the next number in `product`.
    ///
    /// # Errors
    ///
    /// Returns an error if the product name is not a valid id part or the
    /// insert fails.
    pub fn create_ticket(&mut self, product: &str, summary: &str, actor: &str) -> Result<Ticket> {
        self.mutate("create_ticket", actor, |tx, ctx| {
            let number = tickets::next_ticket_number(tx, product)?;
            let ticket = Ticket::new(ResourceId::ticket(product, number)?, summary);
            tickets::insert_ticket(tx, &ticket)?;
            ctx.record_event(EventType::Created, ticket.id.as_str(), Some(summary.to_string()));
            Ok(ticket)
        })
    }

    /// Insert a fully specified ticket (imports and tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or the insert fails.
    pub fn insert_ticket(&mut self, ticket: &Ticket, actor: &str) -> Result<()> {
        self.mutate("insert_ticket", actor, |tx, ctx| {
            tickets::insert_ticket(tx, ticket)?;
            ctx.record_event(EventType::Created, ticket.id.as_str(), None);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_ticket(&self, id: &ResourceId) -> Result<Option<Ticket>> {
        tickets::get_ticket(&self.conn, id.as_str())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_tickets(&self, product: Option<&str>) -> Result<Vec<Ticket>> {
        tickets::list_tickets(&self.conn, product)
    }

    /// Set a ticket's status and record `closed`/`reopened`.
    ///
    /// # Errors
    ///
    /// Returns `TicketNotFound` if the ticket does not exist.
    pub fn set_ticket_status(
        &mut self,
        id: &ResourceId,
        status: TicketStatus,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<()> {
        self.mutate("set_ticket_status", actor, |tx, ctx| {
            tickets::set_status(tx, id.as_str(), status)?;
            let event_type = match status {
                TicketStatus::Closed => EventType::Closed,
                TicketStatus::Open => EventType::Reopened,
            };
            ctx.record_event(event_type, id.as_str(), comment.map(str::to_string));
            Ok(())
        })
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Events for a resource, newest first. `limit == 0` means all.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_events(&self, resource: &ResourceId, limit: usize) -> Result<Vec<Event>> {
        events::get_events(&self.conn, resource.as_str(), limit)
    }

    // ========================================================================
    // Runtime config
    // ========================================================================

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// All values stored in the config table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_config(&self) -> Result<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM config")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Returns `true` if a value was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub fn delete_config(&mut self, key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM config WHERE key = ?", rusqlite::params![key])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelationsError;
    use crate::model::Relation;
    use crate::storage::relations;

    #[test]
    fn mutate_writes_events_and_commits() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let ticket = storage.create_ticket("tp1", "First", "alice").unwrap();
        assert_eq!(ticket.id.as_str(), "tp1:ticket:1");

        let events = storage.get_events(&ticket.id, 0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Created);
        assert_eq!(events[0].actor, "alice");
    }

    #[test]
    fn mutation_context_carries_op_and_actor() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let seen = storage
            .mutate("label_op", "bob", |_, ctx| {
                Ok((ctx.op_name.clone(), ctx.actor.clone()))
            })
            .unwrap();
        assert_eq!(seen, ("label_op".to_string(), "bob".to_string()));
    }

    #[test]
    fn mutate_rolls_back_on_error() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let a = ResourceId::parse("p:ticket:1").unwrap();
        let b = ResourceId::parse("p:ticket:2").unwrap();

        let result: Result<()> = storage.mutate("fail", "tester", |tx, ctx| {
            relations::insert(tx, &Relation::new(a.clone(), b.clone(), "dependson"))?;
            ctx.record_event(EventType::RelationAdded, a.as_str(), None);
            Err(RelationsError::Config("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(relations::count(storage.conn()).unwrap(), 0);
        assert!(storage.get_events(&a, 0).unwrap().is_empty());
    }

    #[test]
    fn ticket_status_records_history() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let t = storage.create_ticket("", "Global", "bob").unwrap();
        assert_eq!(t.id.as_str(), ":ticket:1");
        storage
            .set_ticket_status(&t.id, TicketStatus::Closed, "bob", Some("done"))
            .unwrap();
        storage
            .set_ticket_status(&t.id, TicketStatus::Open, "bob", None)
            .unwrap();
        let kinds: Vec<EventType> = storage
            .get_events(&t.id, 0)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert!(kinds.contains(&EventType::Closed));
        assert!(kinds.contains(&EventType::Reopened));
        assert_eq!(
            storage.get_ticket(&t.id).unwrap().unwrap().status,
            TicketStatus::Open
        );
    }

    #[test]
    fn config_table_roundtrip() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.set_config("relations.max_traversal_nodes", "50").unwrap();
        assert_eq!(
            storage.get_config("relations.max_traversal_nodes").unwrap().as_deref(),
            Some("50")
        );
        assert_eq!(storage.get_all_config().unwrap().len(), 1);
        assert!(storage.delete_config("relations.max_traversal_nodes").unwrap());
        assert!(!storage.delete_config("relations.max_traversal_nodes").unwrap());
    }
}
