//! Ticket commands: the minimal catalog relations validate against.

use super::{Workspace, parse_resource};
use crate::cli::{TicketCloseArgs, TicketCommands, TicketCreateArgs};
use crate::config::CliOverrides;
use crate::error::{RelationsError, Result};
use crate::model::{RelationView, Ticket, TicketStatus};
use crate::output::OutputContext;
use serde::Serialize;

#[derive(Serialize)]
struct TicketDetails<'a> {
    #[serde(flatten)]
    ticket: &'a Ticket,
    relations: &'a [RelationView],
    blockers: Vec<String>,
}

/// Execute a ticket subcommand.
///
/// # Errors
///
/// Returns an error if an id is malformed, the ticket is missing or blocked,
/// or a database operation fails.
pub fn execute(command: &TicketCommands, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let mut ws = Workspace::open(cli)?;

    match command {
        TicketCommands::Create(args) => create(&mut ws, args, ctx),
        TicketCommands::Close(args) => close(&mut ws, args, ctx),
        TicketCommands::Reopen { id, comment } => {
            let id = parse_resource(id)?;
            ws.storage
                .set_ticket_status(&id, TicketStatus::Open, &ws.actor, comment.as_deref())?;
            report_status(&ws, &id.to_string(), ctx)
        }
        TicketCommands::Delete { id } => {
            let id = parse_resource(id)?;
            if ws.storage.get_ticket(&id)?.is_none() {
                return Err(RelationsError::TicketNotFound { id: id.to_string() });
            }
            let removed = ws.system.delete_resource(&mut ws.storage, &id, &ws.actor)?;
            if ctx.is_json() {
                return ctx.json_pretty(&serde_json::json!({
                    "deleted": id,
                    "relations_removed": removed.len(),
                }));
            }
            ctx.success(&format!(
                "Deleted {id} ({} relation(s) removed)",
                removed.len()
            ));
            Ok(())
        }
        TicketCommands::Show { id } => show(&ws, id, ctx),
        TicketCommands::List { product } => {
            let tickets = ws.storage.list_tickets(product.as_deref())?;
            if ctx.is_json() {
                return ctx.json_pretty(&tickets);
            }
            for ticket in &tickets {
                ctx.print(&format!(
                    "{} [{}] {}",
                    ctx.bold(ticket.id.as_str()),
                    ticket.status,
                    ticket.summary
                ));
            }
            Ok(())
        }
    }
}

fn create(ws: &mut Workspace, args: &TicketCreateArgs, ctx: &OutputContext) -> Result<()> {
    let (ticket, relation) = match (&args.linked_to, &args.relation) {
        (Some(linked_to), Some(relation_type)) => {
            let source = parse_resource(linked_to)?;
            let (ticket, relation) = ws.system.create_linked_ticket(
                &mut ws.storage,
                &source,
                relation_type,
                args.summary.as_deref(),
                &ws.actor,
            )?;
            (ticket, Some(relation))
        }
        _ => {
            let summary = args.summary.clone().unwrap_or_default();
            let ticket = ws
                .storage
                .create_ticket(&args.product, &summary, &ws.actor)?;
            (ticket, None)
        }
    };

    if ctx.is_json() {
        return ctx.json_pretty(&serde_json::json!({
            "ticket": ticket,
            "relation": relation,
        }));
    }
    ctx.success(&format!("Created {}: {}", ticket.id, ticket.summary));
    if let Some(relation) = relation {
        ctx.print(&format!(
            "  {} {} {}",
            relation.source, relation.relation_type, relation.destination
        ));
    }
    Ok(())
}

fn close(ws: &mut Workspace, args: &TicketCloseArgs, ctx: &OutputContext) -> Result<()> {
    let id = parse_resource(&args.id)?;
    ws.system.close_ticket(
        &mut ws.storage,
        &id,
        &ws.actor,
        args.force,
        args.comment.as_deref(),
    )?;
    report_status(ws, &args.id, ctx)
}

fn report_status(ws: &Workspace, id: &str, ctx: &OutputContext) -> Result<()> {
    let id = parse_resource(id)?;
    let ticket = ws
        .storage
        .get_ticket(&id)?
        .ok_or_else(|| RelationsError::TicketNotFound { id: id.to_string() })?;
    if ctx.is_json() {
        return ctx.json_pretty(&ticket);
    }
    ctx.success(&format!("{} is now {}", ticket.id, ticket.status));
    Ok(())
}

fn show(ws: &Workspace, id: &str, ctx: &OutputContext) -> Result<()> {
    let id = parse_resource(id)?;
    let ticket = ws
        .storage
        .get_ticket(&id)?
        .ok_or_else(|| RelationsError::TicketNotFound { id: id.to_string() })?;
    let relations = ws.system.get_relations(&ws.storage, &id)?;
    let blockers: Vec<String> = ws
        .system
        .find_blockers(&ws.storage, &id)?
        .iter()
        .map(ToString::to_string)
        .collect();

    if ctx.is_json() {
        return ctx.json_pretty(&TicketDetails {
            ticket: &ticket,
            relations: &relations,
            blockers,
        });
    }

    ctx.print(&format!(
        "{} [{}] {}",
        ctx.bold(ticket.id.as_str()),
        ticket.status,
        ticket.summary
    ));
    ctx.print(&ctx.dim(&format!(
        "created {}",
        ticket.created_at.format("%Y-%m-%d %H:%M:%S")
    )));
    for view in relations.iter().filter(|v| v.relation.source == id) {
        ctx.print(&format!("  {}: {}", view.label, view.relation.destination));
    }
    if !blockers.is_empty() {
        ctx.print(&format!("  blocked by: {}", blockers.join(", ")));
    }
    Ok(())
}
