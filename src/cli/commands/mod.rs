//! Command implementations.
//!
//! Every command except `init` and `version` opens the workspace the same
//! way: discover `.bhrel`, open storage, merge config layers, build the
//! relations system.

pub mod blockers;
pub mod config;
pub mod history;
pub mod init;
pub mod rel;
pub mod ticket;
pub mod types;
pub mod version;

use crate::api::RelationsSystem;
use crate::config::{self as cfg, CliOverrides, ConfigLayer, RelationsSettings};
use crate::error::Result;
use crate::model::ResourceId;
use crate::storage::SqliteStorage;
use std::path::{Path, PathBuf};

/// An opened workspace: storage plus the resolved configuration.
pub struct Workspace {
    pub dir: PathBuf,
    pub db_path: PathBuf,
    pub storage: SqliteStorage,
    pub layer: ConfigLayer,
    pub actor: String,
    pub system: RelationsSystem,
}

impl Workspace {
    /// Discover and open the workspace containing the CWD.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized`, a config error, or a database error.
    pub fn open(cli: &CliOverrides) -> Result<Self> {
        Self::open_at(Path::new("."), cli)
    }

    /// Discover and open the workspace containing `start`.
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn open_at(start: &Path, cli: &CliOverrides) -> Result<Self> {
        let dir = cfg::discover_workspace_dir(Some(start))?;
        let (storage, db_path) = cfg::open_storage(&dir, cli.db.as_ref(), cli.lock_timeout)?;
        let layer = cfg::load_config(&dir, Some(&storage), cli)?;
        let actor = cfg::resolve_actor(&layer);
        let system = RelationsSettings::from_layer(&layer)?.build_system()?;
        tracing::debug!(dir = %dir.display(), actor = %actor, "Opened workspace");

        Ok(Self {
            dir,
            db_path,
            storage,
            layer,
            actor,
            system,
        })
    }

    /// The given types, or every configured type when none are given.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRelationType` for a name the registry does not know.
    pub fn types_or_all(&self, types: &[String]) -> Result<Vec<String>> {
        if types.is_empty() {
            return Ok(self.system.registry().all_types());
        }
        for name in types {
            self.system.registry().require(name)?;
        }
        Ok(types.to_vec())
    }
}

/// Relation type names of the current workspace, empty when it cannot be
/// opened. Used for error suggestions only.
#[must_use]
pub fn known_relation_types(cli: &CliOverrides) -> Vec<String> {
    Workspace::open(cli)
        .map(|ws| ws.system.registry().all_types())
        .unwrap_or_default()
}

fn parse_resource(id: &str) -> Result<ResourceId> {
    ResourceId::parse(id.trim())
}
