//! History command: events recorded for a resource, newest first.

use super::{Workspace, parse_resource};
use crate::config::CliOverrides;
use crate::error::Result;
use crate::output::OutputContext;

/// Execute the history command.
///
/// # Errors
///
/// Returns an error if the resource id is malformed or the query fails.
pub fn execute(resource: &str, limit: usize, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let resource = parse_resource(resource)?;
    let events = ws.storage.get_events(&resource, limit)?;

    if ctx.is_json() {
        return ctx.json_pretty(&events);
    }
    if events.is_empty() {
        ctx.print(&format!("No history for {resource}"));
        return Ok(());
    }
    for event in &events {
        let comment = event
            .comment
            .as_deref()
            .map(|c| format!(" {c}"))
            .unwrap_or_default();
        ctx.print(&format!(
            "{} {} {}{comment}",
            ctx.dim(&event.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ctx.bold(event.event_type.as_str()),
            event.actor,
        ));
    }
    Ok(())
}
