//! Types command: the relation type catalog.

use super::Workspace;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::output::OutputContext;
use crate::registry::RelationType;

/// Execute the types command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened.
pub fn execute(cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let ws = Workspace::open(cli)?;
    let registry = ws.system.registry();
    let types: Vec<&RelationType> = registry.iter().collect();

    if ctx.is_json() {
        return ctx.json_pretty(&serde_json::json!({
            "global_validators": registry.global_validators(),
            "types": types,
        }));
    }

    for t in types {
        let mut flags = Vec::new();
        if let Some(reverse) = &t.reverse {
            flags.push(format!("reverse={reverse}"));
        }
        if t.is_blocker {
            flags.push("blocks".to_string());
        }
        if t.is_exclusive {
            flags.push("exclusive".to_string());
        }
        if !t.validators.is_empty() {
            let names: Vec<&str> = t.validators.iter().map(|v| v.as_str()).collect();
            flags.push(format!("validators={}", names.join(",")));
        }
        ctx.print(&format!(
            "{:<14} {:<16} {}",
            ctx.bold(&t.name),
            t.label,
            ctx.dim(&flags.join(" "))
        ));
    }
    Ok(())
}
