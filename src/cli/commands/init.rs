//! Init command implementation.

use crate::config;
use crate::error::Result;
use crate::output::OutputContext;
use std::path::Path;

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` unless `force`, or an error if the directory
/// or database cannot be created.
pub fn execute(force: bool, root_dir: Option<&Path>, ctx: &OutputContext) -> Result<()> {
    let base_dir = root_dir.unwrap_or_else(|| Path::new("."));
    let workspace = config::init_workspace(base_dir, force)?;

    if ctx.is_json() {
        return ctx.json_pretty(&serde_json::json!({
            "workspace": workspace.display().to_string(),
            "database": workspace.join(config::DEFAULT_DB_FILENAME).display().to_string(),
        }));
    }
    ctx.success("Initialized relations workspace in .bhrel/");
    Ok(())
}
