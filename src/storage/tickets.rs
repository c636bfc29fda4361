//! Ticket catalog rows.

use crate::error::{RelationsError, Result};
use crate::model::{ResourceId, Ticket, TicketStatus, from_micros};
use rusqlite::{Connection, OptionalExtension, params};

fn ticket_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
    let id: String = row.get(0)?;
    let status: String = row.get(2)?;
    let to_sql_err = |idx: usize, e: RelationsError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    };
    Ok(Ticket {
        id: ResourceId::try_from(id).map_err(|e| to_sql_err(0, e))?,
        summary: row.get(1)?,
        status: status.parse::<TicketStatus>().map_err(|e| to_sql_err(2, e))?,
        created_at: from_micros(row.get(3)?),
    })
}

/// Insert a ticket row.
///
/// # Errors
///
/// Returns an error if a ticket with this id exists or the insert fails.
pub fn insert_ticket(conn: &Connection, ticket: &Ticket) -> Result<()> {
    conn.execute(
        "INSERT INTO tickets (id, product, summary, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            ticket.id.as_str(),
            ticket.id.product(),
            ticket.summary,
            ticket.status.as_str(),
            ticket.created_at.timestamp_micros(),
        ],
    )?;
    Ok(())
}

/// Load a ticket.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_ticket(conn: &Connection, id: &str) -> Result<Option<Ticket>> {
    let ticket = conn
        .query_row(
            "SELECT id, summary, status, created_at FROM tickets WHERE id = ?1",
            [id],
            ticket_from_row,
        )
        .optional()?;
    Ok(ticket)
}

/// Tickets, optionally restricted to one product, ordered by creation.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_tickets(conn: &Connection, product: Option<&str>) -> Result<Vec<Ticket>> {
    let mut stmt = conn.prepare(
        "SELECT id, summary, status, created_at FROM tickets
         WHERE ?1 IS NULL OR product = ?1
         ORDER BY created_at, id",
    )?;
    let tickets = stmt
        .query_map([product], ticket_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tickets)
}

/// Set a ticket's status.
///
/// # Errors
///
/// Returns `TicketNotFound` if the ticket does not exist.
pub fn set_status(conn: &Connection, id: &str, status: TicketStatus) -> Result<()> {
    let updated = conn.execute(
        "UPDATE tickets SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    if updated == 0 {
        return Err(RelationsError::TicketNotFound { id: id.to_string() });
    }
    Ok(())
}

/// Delete a ticket row.
///
/// # Errors
///
/// Returns `TicketNotFound` if the ticket does not exist.
pub fn delete_ticket(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn.execute("DELETE FROM tickets WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(RelationsError::TicketNotFound { id: id.to_string() });
    }
    Ok(())
}

/// Reserve the next ticket number in a product.
///
/// # Errors
///
/// Returns an error if the counter cannot be updated.
pub fn next_ticket_number(conn: &Connection, product: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO ticket_counters (product, next_number) VALUES (?1, 1)
         ON CONFLICT(product) DO NOTHING",
        [product],
    )?;
    let number: i64 = conn.query_row(
        "SELECT next_number FROM ticket_counters WHERE product = ?1",
        [product],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE ticket_counters SET next_number = next_number + 1 WHERE product = ?1",
        [product],
    )?;
    Ok(number)
}
