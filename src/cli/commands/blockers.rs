//! Blockers command.

use super::{Workspace, parse_resource};
use crate::config::CliOverrides;
use crate::error::Result;
use crate::output::OutputContext;

/// Execute the blockers command.
///
/// # Errors
///
/// Returns an error if the resource id is malformed or a query fails.
pub fn execute(resource: &str, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let resource = parse_resource(resource)?;
    let blockers = ws.system.find_blockers(&ws.storage, &resource)?;

    if ctx.is_json() {
        return ctx.json_pretty(&serde_json::json!({
            "resource": resource,
            "blockers": blockers,
        }));
    }
    if blockers.is_empty() {
        ctx.print(&format!("{resource} is not blocked"));
        return Ok(());
    }
    ctx.print(&format!("{resource} is blocked by:"));
    for blocker in &blockers {
        let summary = ws
            .storage
            .get_ticket(blocker)?
            .map(|t| t.summary)
            .unwrap_or_default();
        ctx.print(&format!("  {} {}", ctx.bold(blocker.as_str()), summary));
    }
    Ok(())
}
