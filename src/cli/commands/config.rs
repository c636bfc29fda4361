//! Configuration command.
//!
//! Shows the merged configuration with the layer each value came from, and
//! edits runtime keys stored in the database config table.

use super::Workspace;
use crate::cli::ConfigCommands;
use crate::config::{
    CliOverrides, ConfigLayer, default_config_layer, is_startup_key, load_project_config,
    load_user_config,
};
use crate::error::{RelationsError, Result};
use crate::output::OutputContext;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ConfigSource {
    Default,
    Db,
    User,
    Project,
    Environment,
    Cli,
}

impl ConfigSource {
    const fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Db => "db",
            Self::User => "user config",
            Self::Project => ".bhrel/config.yaml",
            Self::Environment => "environment",
            Self::Cli => "cli",
        }
    }
}

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: String,
    value: String,
    source: ConfigSource,
}

/// Execute the config command.
///
/// # Errors
///
/// Returns an error if config cannot be loaded, the key is startup-only on
/// `set`, or the database write fails.
pub fn execute(command: &ConfigCommands, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let mut ws = Workspace::open(cli)?;

    match command {
        ConfigCommands::List => {
            let entries = collect_entries(&ws, cli)?;
            if ctx.is_json() {
                return ctx.json_pretty(&entries);
            }
            for entry in &entries {
                ctx.print(&format!(
                    "{} = {} {}",
                    ctx.bold(&entry.key),
                    entry.value,
                    ctx.dim(&format!("({})", entry.source.label()))
                ));
            }
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let entries = collect_entries(&ws, cli)?;
            let entry = entries.into_iter().find(|e| &e.key == key);
            if ctx.is_json() {
                return ctx.json_pretty(&entry);
            }
            match entry {
                Some(entry) => ctx.print(&entry.value),
                None => ctx.warning(&format!("{key} is not set")),
            }
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            if is_startup_key(key) {
                return Err(RelationsError::Config(format!(
                    "'{key}' is startup-only; set it in .bhrel/config.yaml, BHREL_* or a flag"
                )));
            }
            ws.storage.set_config(key, value)?;
            tracing::info!(key = %key, "Config value stored");
            if ctx.is_json() {
                return ctx.json_pretty(&serde_json::json!({ "key": key, "value": value }));
            }
            ctx.success(&format!("Set {key} = {value}"));
            Ok(())
        }
        ConfigCommands::Unset { key } => {
            let removed = ws.storage.delete_config(key)?;
            if ctx.is_json() {
                return ctx.json_pretty(&serde_json::json!({ "key": key, "removed": removed }));
            }
            if removed {
                ctx.success(&format!("Removed {key}"));
            } else {
                ctx.warning(&format!("{key} was not set in the database"));
            }
            Ok(())
        }
    }
}

fn collect_entries(ws: &Workspace, cli: &CliOverrides) -> Result<Vec<ConfigEntry>> {
    let layers = [
        (ConfigSource::Default, default_config_layer()),
        (ConfigSource::Db, ConfigLayer::from_db(&ws.storage)?),
        (ConfigSource::User, load_user_config()?),
        (ConfigSource::Project, load_project_config(&ws.dir)?),
        (ConfigSource::Environment, ConfigLayer::from_env()),
        (ConfigSource::Cli, cli.as_layer()),
    ];

    let merged = ws.layer.entries();
    Ok(merged
        .into_iter()
        .map(|(key, value)| {
            let source = layers
                .iter()
                .rev()
                .find(|(_, layer)| layer.entries().contains_key(&key))
                .map_or(ConfigSource::Default, |(source, _)| *source);
            ConfigEntry { key, value, source }
        })
        .collect())
}
