//! Configuration management for `bh_relations`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`BHREL_*`)
//! 3. Project config (.bhrel/config.yaml)
//! 4. User config (~/.config/bhrel/config.yaml)
//! 5. DB config table
//! 6. Defaults
//!
//! Keys are flattened to dotted paths, so `relations: {types: {oneway:
//! refersto}}` and `relations.types.oneway: refersto` are the same key.

use crate::api::RelationsSystem;
use crate::error::{RelationsError, Result};
use crate::registry::{RelationTypeConfig, RelationTypeRegistry, ValidatorKind};
use crate::storage::SqliteStorage;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Workspace directory name, discovered by walking up from the CWD.
pub const WORKSPACE_DIR_NAME: &str = ".bhrel";
/// Database filename inside the workspace directory.
pub const DEFAULT_DB_FILENAME: &str = "relations.db";
/// Busy timeout used when nothing configures one.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;
/// Traversal node limit used when nothing configures one.
pub const DEFAULT_MAX_TRAVERSAL_NODES: usize = 10_000;

const TYPES_PREFIX: &str = "relations.types.";

/// Relation types used when no layer declares any `relations.types.*` key.
const DEFAULT_RELATION_TYPES: &[(&str, &str)] = &[
    ("dependency", "dependson,dependent"),
    ("dependency.validators", "NoCycles,SingleProduct"),
    ("dependson.blocks", "true"),
    ("dependson.label", "Depends on"),
    ("dependent.label", "Dependency of"),
    ("parent_children", "parent,children"),
    ("parent_children.validators", "OneToMany,SingleProduct,NoCycles"),
    ("parent.exclusive", "true"),
    ("parent.label", "Parent"),
    ("children.blocks", "true"),
    ("children.label", "Child"),
    ("duplicate", "duplicateof,duplicatedby"),
    ("duplicate.validators", "ReferencesOlder"),
    ("duplicateof.label", "Duplicate of"),
    ("duplicatedby.label", "Duplicated by"),
    ("blocker", "blockedby,blocks"),
    ("blockedby.blocks", "true"),
    ("blockedby.label", "Blocked by"),
    ("blocks.label", "Blocks"),
    ("oneway", "refersto"),
    ("refersto.label", "Refers to"),
];

/// Template written to `.bhrel/config.yaml` by `bhrel init`.
pub const CONFIG_TEMPLATE: &str = r"# bhrel project configuration
#
# actor: alice
# lock-timeout: 30000
relations:
  global_validators: NoSelfReference,Exclusive,Blocker
  max_traversal_nodes: 10000
  default_copy_fields: summary
  types:
    dependency: dependson,dependent
    dependency.validators: NoCycles,SingleProduct
    dependson.blocks: true
    dependson.label: Depends on
    dependent.label: Dependency of
    parent_children: parent,children
    parent_children.validators: OneToMany,SingleProduct,NoCycles
    parent.exclusive: true
    parent.label: Parent
    children.blocks: true
    children.label: Child
    duplicate: duplicateof,duplicatedby
    duplicate.validators: ReferencesOlder
    duplicateof.label: Duplicate of
    duplicatedby.label: Duplicated by
    blocker: blockedby,blocks
    blockedby.blocks: true
    blockedby.label: Blocked by
    blocks.label: Blocks
    oneway: refersto
    refersto.label: Refers to
";

/// Discover the active `.bhrel` directory.
///
/// Honors `BHREL_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns `NotInitialized` if no workspace is found, or an IO error if the
/// CWD cannot be read.
pub fn discover_workspace_dir(start: Option<&Path>) -> Result<PathBuf> {
    discover_workspace_dir_with_env(start, None)
}

fn discover_workspace_dir_with_env(
    start: Option<&Path>,
    env_override: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = env_override {
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    } else if let Ok(value) = env::var("BHREL_DIR") {
        if !value.trim().is_empty() {
            let path = PathBuf::from(value);
            if path.is_dir() {
                return Ok(path);
            }
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(WORKSPACE_DIR_NAME);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    Err(RelationsError::NotInitialized)
}

/// Open storage for a workspace, returning the storage and the database path.
///
/// `db_override` wins over a configured `db`; relative paths are resolved
/// against the workspace directory.
///
/// # Errors
///
/// Returns an error if startup config cannot be read or the database cannot
/// be opened.
pub fn open_storage(
    workspace_dir: &Path,
    db_override: Option<&PathBuf>,
    lock_timeout: Option<u64>,
) -> Result<(SqliteStorage, PathBuf)> {
    let startup_layer = load_startup_config(workspace_dir)?;
    let db_path = resolve_db_path(
        workspace_dir,
        db_override
            .cloned()
            .or_else(|| db_override_from_layer(&startup_layer))
            .as_ref(),
    );
    let resolved_lock_timeout = lock_timeout
        .or_else(|| lock_timeout_from_layer(&startup_layer))
        .or(Some(DEFAULT_LOCK_TIMEOUT_MS));
    let storage = SqliteStorage::open_with_timeout(&db_path, resolved_lock_timeout)?;
    Ok((storage, db_path))
}

fn resolve_db_path(workspace_dir: &Path, db_override: Option<&PathBuf>) -> PathBuf {
    match db_override {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => workspace_dir.join(path),
        None => workspace_dir.join(DEFAULT_DB_FILENAME),
    }
}

/// Create `.bhrel/` under `root` with a config template and a fresh database.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an IO/database error.
pub fn init_workspace(root: &Path, force: bool) -> Result<PathBuf> {
    let workspace_dir = root.join(WORKSPACE_DIR_NAME);
    let db_path = workspace_dir.join(DEFAULT_DB_FILENAME);

    if workspace_dir.exists() {
        if db_path.exists() && !force {
            return Err(RelationsError::AlreadyInitialized { path: db_path });
        }
    } else {
        fs::create_dir_all(&workspace_dir)?;
    }

    SqliteStorage::open(&db_path)?;

    let config_path = workspace_dir.join("config.yaml");
    if !config_path.exists() {
        fs::write(&config_path, CONFIG_TEMPLATE)?;
    }

    let gitignore_path = workspace_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(gitignore_path, "*.db\n*.db-shm\n*.db-wal\n")?;
    }

    tracing::info!(path = %workspace_dir.display(), "Initialized workspace");
    Ok(workspace_dir)
}

/// A configuration layer split into startup-only and runtime (DB) keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub startup: HashMap<String, String>,
    pub runtime: HashMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.startup {
            self.startup.insert(key.clone(), value.clone());
        }
        for (key, value) in &other.runtime {
            self.runtime.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();

        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix("BHREL_") else {
                continue;
            };
            match stripped {
                "DIR" => {}
                "MAX_TRAVERSAL_NODES" => {
                    insert_key_value(&mut layer, "relations.max_traversal_nodes", value);
                }
                "GLOBAL_VALIDATORS" => {
                    insert_key_value(&mut layer, "relations.global_validators", value);
                }
                _ => {
                    for variant in env_key_variants(stripped) {
                        insert_key_value(&mut layer, &variant, value.clone());
                    }
                }
            }
        }

        layer
    }

    /// Build a layer from DB config table values.
    ///
    /// # Errors
    ///
    /// Returns an error if config table lookup fails.
    pub fn from_db(storage: &SqliteStorage) -> Result<Self> {
        let mut layer = Self::default();
        for (key, value) in storage.get_all_config()? {
            if is_startup_key(&key) {
                continue;
            }
            layer.runtime.insert(key, value);
        }
        Ok(layer)
    }

    /// Every key in the layer, startup and runtime, sorted.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.startup
            .iter()
            .chain(&self.runtime)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db: Option<PathBuf>,
    pub actor: Option<String>,
    pub json: Option<bool>,
    pub lock_timeout: Option<u64>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.db {
            insert_key_value(&mut layer, "db", path.to_string_lossy().to_string());
        }
        if let Some(actor) = &self.actor {
            insert_key_value(&mut layer, "actor", actor.clone());
        }
        if let Some(json) = self.json {
            insert_key_value(&mut layer, "json", json.to_string());
        }
        if let Some(lock_timeout) = self.lock_timeout {
            insert_key_value(&mut layer, "lock-timeout", lock_timeout.to_string());
        }

        layer
    }
}

/// Load project config (.bhrel/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(workspace_dir: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&workspace_dir.join("config.yaml"))
}

/// Load user config (~/.config/bhrel/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("bhrel")
        .join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Load startup-only configuration layers (YAML + env, no DB).
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed.
pub fn load_startup_config(workspace_dir: &Path) -> Result<ConfigLayer> {
    let user = load_user_config()?;
    let project = load_project_config(workspace_dir)?;
    let env_layer = ConfigLayer::from_env();

    Ok(ConfigLayer::merge_layers(&[user, project, env_layer]))
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.runtime.insert(
        "relations.max_traversal_nodes".to_string(),
        DEFAULT_MAX_TRAVERSAL_NODES.to_string(),
    );
    layer
}

/// Load configuration with classic precedence order.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed, or DB access fails.
pub fn load_config(
    workspace_dir: &Path,
    storage: Option<&SqliteStorage>,
    cli: &CliOverrides,
) -> Result<ConfigLayer> {
    let defaults = default_config_layer();
    let db_layer = match storage {
        Some(storage) => ConfigLayer::from_db(storage)?,
        None => ConfigLayer::default(),
    };
    let user = load_user_config()?;
    let project = load_project_config(workspace_dir)?;
    let env_layer = ConfigLayer::from_env();
    let cli_layer = cli.as_layer();

    Ok(ConfigLayer::merge_layers(&[
        defaults, db_layer, user, project, env_layer, cli_layer,
    ]))
}

/// Relation settings resolved from a merged layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationsSettings {
    pub types: RelationTypeConfig,
    /// `None` when configured as `0` (unlimited).
    pub max_traversal_nodes: Option<usize>,
}

impl Default for RelationsSettings {
    fn default() -> Self {
        Self {
            types: RelationTypeConfig {
                types: default_relation_types(),
                ..RelationTypeConfig::default()
            },
            max_traversal_nodes: Some(DEFAULT_MAX_TRAVERSAL_NODES),
        }
    }
}

impl RelationsSettings {
    /// Read `relations.*` keys from a merged layer.
    ///
    /// When no layer declares any `relations.types.*` key the built-in types
    /// apply; a declaration anywhere replaces them wholesale.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a validator name or the node limit does not parse.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let declared: BTreeMap<String, String> = layer
            .runtime
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(TYPES_PREFIX)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();
        let types = if declared.is_empty() {
            default_relation_types()
        } else {
            declared
        };

        let defaults = RelationTypeConfig::default();
        let global_validators = match get_value(layer, &["relations.global_validators"]) {
            Some(list) => ValidatorKind::parse_list(list)?,
            None => defaults.global_validators,
        };
        let default_copy_fields = get_value(layer, &["relations.default_copy_fields"])
            .map_or(defaults.default_copy_fields, |list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            });

        let max_traversal_nodes = match get_value(layer, &["relations.max_traversal_nodes"]) {
            Some(raw) => {
                let limit = raw.trim().parse::<usize>().map_err(|_| {
                    RelationsError::Config(format!(
                        "relations.max_traversal_nodes: expected a non-negative integer, got '{raw}'"
                    ))
                })?;
                (limit > 0).then_some(limit)
            }
            None => Some(DEFAULT_MAX_TRAVERSAL_NODES),
        };

        Ok(Self {
            types: RelationTypeConfig {
                types,
                global_validators,
                default_copy_fields,
            },
            max_traversal_nodes,
        })
    }

    /// Parse the registry and assemble a `RelationsSystem`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the relation type catalog is invalid.
    pub fn build_system(&self) -> Result<RelationsSystem> {
        let registry = RelationTypeRegistry::from_config(&self.types)?;
        Ok(RelationsSystem::new(registry).with_traversal_limit(self.max_traversal_nodes))
    }
}

/// The built-in relation type option map.
#[must_use]
pub fn default_relation_types() -> BTreeMap<String, String> {
    DEFAULT_RELATION_TYPES
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Resolve actor from a merged config layer.
#[must_use]
pub fn actor_from_layer(layer: &ConfigLayer) -> Option<String> {
    get_startup_value(layer, &["actor"])
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolve actor with fallback to USER and a safe default.
#[must_use]
pub fn resolve_actor(layer: &ConfigLayer) -> String {
    actor_from_layer(layer)
        .or_else(|| env::var("USER").ok().map(|value| value.trim().to_string()))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Determine if a key is startup-only.
///
/// Startup-only keys can only be set in YAML, env or flags, never in the
/// database config table.
#[must_use]
pub fn is_startup_key(key: &str) -> bool {
    matches!(
        normalize_key(key).as_str(),
        "json" | "db" | "database" | "actor" | "lock-timeout"
    )
}

fn insert_key_value(layer: &mut ConfigLayer, key: &str, value: String) {
    if is_startup_key(key) {
        layer.startup.insert(key.to_string(), value);
    } else {
        layer.runtime.insert(key.to_string(), value);
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn env_key_variants(raw: &str) -> Vec<String> {
    let raw_lower = raw.to_lowercase();
    let mut variants = vec![
        raw_lower.clone(),
        raw_lower.replace('_', "."),
        raw_lower.replace('_', "-"),
    ];
    variants.dedup();
    variants
}

/// Parse a boolean config value.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn get_startup_value<'a>(layer: &'a ConfigLayer, keys: &[&str]) -> Option<&'a String> {
    let normalized_keys: Vec<String> = keys.iter().map(|key| normalize_key(key)).collect();
    layer.startup.iter().find_map(|(key, value)| {
        let normalized = normalize_key(key);
        normalized_keys
            .iter()
            .any(|candidate| candidate == &normalized)
            .then_some(value)
    })
}

fn get_value<'a>(layer: &'a ConfigLayer, keys: &[&str]) -> Option<&'a String> {
    keys.iter().find_map(|key| layer.runtime.get(*key))
}

fn db_override_from_layer(layer: &ConfigLayer) -> Option<PathBuf> {
    get_startup_value(layer, &["db", "database"]).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}

fn lock_timeout_from_layer(layer: &ConfigLayer) -> Option<u64> {
    get_startup_value(layer, &["lock-timeout", "lock_timeout"])
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Whether `--json` was requested through any startup layer.
#[must_use]
pub fn json_from_layer(layer: &ConfigLayer) -> bool {
    get_startup_value(layer, &["json"])
        .and_then(|value| parse_bool(value))
        .unwrap_or(false)
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        insert_key_value(&mut layer, &key, value);
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
