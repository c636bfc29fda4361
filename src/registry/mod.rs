//! Relation type catalog.
//!
//! Parsed once from the flat `relations.types` option map:
//!
//! ```yaml
//! relations:
//!   types:
//!     dependency: dependson,dependent    # group -> "end1,end2" (or "end1")
//!     dependency.validators: NoCycles    # applies to both ends
//!     dependson.label: Depends on
//!     dependson.blocks: true
//!     parent.exclusive: true
//!     parent.copy_fields: summary,status
//! ```
//!
//! After parsing, every lookup is a typed field access.

use crate::config::parse_bool;
use crate::error::{RelationsError, Result};
use crate::model::Relation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// The validators a relation type can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ValidatorKind {
    NoSelfReference,
    NoCycles,
    Exclusive,
    OneToMany,
    SingleProduct,
    ReferencesOlder,
    Blocker,
}

impl ValidatorKind {
    pub const ALL: [Self; 7] = [
        Self::NoSelfReference,
        Self::NoCycles,
        Self::Exclusive,
        Self::OneToMany,
        Self::SingleProduct,
        Self::ReferencesOlder,
        Self::Blocker,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSelfReference => "NoSelfReference",
            Self::NoCycles => "NoCycles",
            Self::Exclusive => "Exclusive",
            Self::OneToMany => "OneToMany",
            Self::SingleProduct => "SingleProduct",
            Self::ReferencesOlder => "ReferencesOlder",
            Self::Blocker => "Blocker",
        }
    }

    /// Case-insensitive lookup; `_`, `-` and a trailing `Validator` are
    /// ignored (`no_cycles`, `NoCyclesValidator`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        let normalized = normalized
            .strip_suffix("validator")
            .unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == normalized)
    }

    /// Parse a comma-separated list, keeping first occurrences only.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first unknown validator.
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        let mut out = Vec::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let kind = Self::parse(name)
                .ok_or_else(|| RelationsError::Config(format!("unknown validator '{name}'")))?;
            if !out.contains(&kind) {
                out.push(kind);
            }
        }
        Ok(out)
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured relation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationType {
    pub name: String,
    pub reverse: Option<String>,
    pub label: String,
    pub is_blocker: bool,
    pub is_exclusive: bool,
    pub copy_fields: Vec<String>,
    pub validators: Vec<ValidatorKind>,
    /// First end of its configured pair; validators see this orientation.
    pub is_master: bool,
    pub group: String,
}

/// Explicit relation type configuration, parsed into the registry once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTypeConfig {
    /// Flat option map: groups plus `<name>.<option>` keys.
    pub types: BTreeMap<String, String>,
    pub global_validators: Vec<ValidatorKind>,
    pub default_copy_fields: Vec<String>,
}

impl Default for RelationTypeConfig {
    fn default() -> Self {
        Self {
            types: BTreeMap::new(),
            global_validators: vec![
                ValidatorKind::NoSelfReference,
                ValidatorKind::Exclusive,
                ValidatorKind::Blocker,
            ],
            default_copy_fields: vec!["summary".to_string()],
        }
    }
}

/// Parsed catalog of relation types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTypeRegistry {
    types: BTreeMap<String, RelationType>,
    global_validators: Vec<ValidatorKind>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

impl RelationTypeRegistry {
    /// Parse the catalog.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a type is declared twice, a group value is empty,
    /// a validator name is unknown, or a boolean option does not parse.
    pub fn from_config(config: &RelationTypeConfig) -> Result<Self> {
        let options = &config.types;
        let option = |name: &str, key: &str| options.get(&format!("{name}.{key}"));

        let bool_option = |name: &str, key: &str| -> Result<bool> {
            option(name, key).filter(|v| !v.trim().is_empty()).map_or(Ok(false), |v| {
                parse_bool(v).ok_or_else(|| {
                    RelationsError::Config(format!("{name}.{key}: expected a boolean, got '{v}'"))
                })
            })
        };

        let validators_option = |name: &str| -> Result<Vec<ValidatorKind>> {
            option(name, "validators")
                .or_else(|| option(name, "validator"))
                .map_or(Ok(Vec::new()), |v| ValidatorKind::parse_list(v))
        };

        let mut types: BTreeMap<String, RelationType> = BTreeMap::new();

        for (group, value) in options.iter().filter(|(k, _)| !k.contains('.')) {
            let ends = split_list(value);
            let (end1, end2) = match ends.as_slice() {
                [one] => (one.clone(), None),
                [one, two] => (one.clone(), Some(two.clone())),
                _ => {
                    return Err(RelationsError::Config(format!(
                        "relation group '{group}' must name one or two types, got '{value}'"
                    )));
                }
            };
            if end2.as_deref() == Some(end1.as_str()) {
                return Err(RelationsError::Config(format!(
                    "relation group '{group}' pairs '{end1}' with itself"
                )));
            }

            let group_validators = validators_option(group)?;

            for (name, reverse, is_master) in [
                (Some(end1.clone()), end2.clone(), true),
                (end2.clone(), Some(end1.clone()), false),
            ] {
                let Some(name) = name else { continue };
                if let Some(existing) = types.get(&name) {
                    return Err(RelationsError::Config(format!(
                        "relation type '{name}' declared in both '{}' and '{group}'",
                        existing.group
                    )));
                }

                let mut validators = group_validators.clone();
                for kind in validators_option(&name)? {
                    if !validators.contains(&kind) {
                        validators.push(kind);
                    }
                }

                let relation_type = RelationType {
                    label: option(&name, "label")
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .unwrap_or_else(|| capitalize(&name)),
                    is_blocker: bool_option(&name, "blocks")?,
                    is_exclusive: bool_option(&name, "exclusive")?,
                    copy_fields: option(&name, "copy_fields")
                        .map_or_else(|| config.default_copy_fields.clone(), |v| split_list(v)),
                    validators,
                    is_master,
                    group: group.clone(),
                    reverse,
                    name: name.clone(),
                };
                types.insert(name, relation_type);
            }
        }

        tracing::debug!(count = types.len(), "Parsed relation types");

        Ok(Self {
            types,
            global_validators: config.global_validators.clone(),
        })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RelationType> {
        self.types.get(name)
    }

    /// Look up a type, failing on unknown names.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRelationType`.
    pub fn require(&self, name: &str) -> Result<&RelationType> {
        self.get(name).ok_or_else(|| RelationsError::UnknownRelationType {
            relation_type: name.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    #[must_use]
    pub fn reverse_of(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|t| t.reverse.as_deref())
    }

    /// Display label; unknown names are capitalized.
    #[must_use]
    pub fn label_of(&self, name: &str) -> String {
        self.get(name)
            .map_or_else(|| capitalize(name), |t| t.label.clone())
    }

    #[must_use]
    pub fn is_blocker(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.is_blocker)
    }

    #[must_use]
    pub fn is_exclusive(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.is_exclusive)
    }

    #[must_use]
    pub fn validators_for(&self, name: &str) -> &[ValidatorKind] {
        self.get(name).map_or(&[], |t| t.validators.as_slice())
    }

    #[must_use]
    pub fn copy_fields_for(&self, name: &str) -> &[String] {
        self.get(name).map_or(&[], |t| t.copy_fields.as_slice())
    }

    #[must_use]
    pub fn global_validators(&self) -> &[ValidatorKind] {
        &self.global_validators
    }

    /// All type names, sorted.
    #[must_use]
    pub fn all_types(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationType> {
        self.types.values()
    }

    /// Every type flagged `blocks`.
    #[must_use]
    pub fn blocker_types(&self) -> Vec<String> {
        self.iter()
            .filter(|t| t.is_blocker)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Every type flagged `exclusive`.
    #[must_use]
    pub fn exclusive_types(&self) -> Vec<String> {
        self.iter()
            .filter(|t| t.is_exclusive)
            .map(|t| t.name.clone())
            .collect()
    }

    /// The relation in its master orientation: unchanged for a master (or
    /// unknown, or one-way) type, otherwise reverted to the paired end.
    #[must_use]
    pub fn master_of(&self, relation: &Relation) -> Relation {
        match self.get(&relation.relation_type) {
            Some(t) if !t.is_master => t
                .reverse
                .as_deref()
                .map_or_else(|| relation.clone(), |rev| relation.clone_reverted(rev)),
            _ => relation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceId;

    fn config(pairs: &[(&str, &str)]) -> RelationTypeConfig {
        RelationTypeConfig {
            types: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..RelationTypeConfig::default()
        }
    }

    fn sample() -> RelationTypeConfig {
        config(&[
            ("dependency", "dependson,dependent"),
            ("dependency.validators", "NoCycles,SingleProduct"),
            ("dependson.blocks", "true"),
            ("dependson.label", "Depends on"),
            ("parent_children", "parent,children"),
            ("parent_children.validators", "OneToMany,SingleProduct,NoCycles"),
            ("parent.exclusive", "true"),
            ("children.blocks", "true"),
            ("children.copy_fields", ""),
            ("oneway", "refersto"),
        ])
    }

    #[test]
    fn parses_pairs_and_reverse() {
        let registry = RelationTypeRegistry::from_config(&sample()).unwrap();
        assert_eq!(registry.reverse_of("dependson"), Some("dependent"));
        assert_eq!(registry.reverse_of("dependent"), Some("dependson"));
        assert_eq!(registry.reverse_of("refersto"), None);
        assert!(registry.get("dependson").unwrap().is_master);
        assert!(!registry.get("dependent").unwrap().is_master);
        assert_eq!(
            registry.all_types(),
            vec!["children", "dependent", "dependson", "parent", "refersto"]
        );
    }

    #[test]
    fn labels_default_to_capitalized_name() {
        let registry = RelationTypeRegistry::from_config(&sample()).unwrap();
        assert_eq!(registry.label_of("dependson"), "Depends on");
        assert_eq!(registry.label_of("dependent"), "Dependent");
        assert_eq!(registry.label_of("refersto"), "Refersto");
    }

    #[test]
    fn flags_and_validators() {
        let registry = RelationTypeRegistry::from_config(&sample()).unwrap();
        assert!(registry.is_blocker("dependson"));
        assert!(!registry.is_blocker("dependent"));
        assert!(registry.is_exclusive("parent"));
        assert!(!registry.is_exclusive("children"));
        assert_eq!(
            registry.validators_for("children"),
            &[
                ValidatorKind::OneToMany,
                ValidatorKind::SingleProduct,
                ValidatorKind::NoCycles
            ]
        );
        assert!(registry.validators_for("refersto").is_empty());
        assert_eq!(registry.blocker_types(), vec!["children", "dependson"]);
        assert_eq!(registry.exclusive_types(), vec!["parent"]);
    }

    #[test]
    fn copy_fields_default_and_explicit_empty() {
        let registry = RelationTypeRegistry::from_config(&sample()).unwrap();
        assert_eq!(registry.copy_fields_for("parent"), &["summary".to_string()]);
        assert!(registry.copy_fields_for("children").is_empty());
    }

    #[test]
    fn parsing_is_idempotent() {
        let first = RelationTypeRegistry::from_config(&sample()).unwrap();
        let second = RelationTypeRegistry::from_config(&sample()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.all_types(), second.all_types());
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let err = RelationTypeRegistry::from_config(&config(&[
            ("a", "dependson,dependent"),
            ("b", "dependson"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RelationsError::Config(msg) if msg.contains("dependson")));
    }

    #[test]
    fn unknown_validator_is_rejected() {
        let err = RelationTypeRegistry::from_config(&config(&[
            ("a", "x,y"),
            ("a.validators", "NoSuchThing"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RelationsError::Config(msg) if msg.contains("NoSuchThing")));
    }

    #[test]
    fn validator_names_are_normalized() {
        assert_eq!(ValidatorKind::parse("no_cycles"), Some(ValidatorKind::NoCycles));
        assert_eq!(
            ValidatorKind::parse("NoSelfReferenceValidator"),
            Some(ValidatorKind::NoSelfReference)
        );
        assert_eq!(ValidatorKind::parse("one-to-many"), Some(ValidatorKind::OneToMany));
        assert_eq!(ValidatorKind::parse("bogus"), None);
        assert_eq!(
            ValidatorKind::parse_list("NoCycles, nocycles ,Blocker").unwrap(),
            vec![ValidatorKind::NoCycles, ValidatorKind::Blocker]
        );
    }

    #[test]
    fn master_of_reverts_second_end() {
        let registry = RelationTypeRegistry::from_config(&sample()).unwrap();
        let a = ResourceId::parse("p:ticket:1").unwrap();
        let b = ResourceId::parse("p:ticket:2").unwrap();
        let dependent = Relation::new(a.clone(), b.clone(), "dependent");
        let master = registry.master_of(&dependent);
        assert_eq!(master.relation_type, "dependson");
        assert_eq!(master.source, b);
        assert_eq!(master.destination, a);

        let oneway = Relation::new(a, b, "refersto");
        assert_eq!(registry.master_of(&oneway), oneway);
    }

    #[test]
    fn boolean_options_share_config_spellings() {
        let registry = RelationTypeRegistry::from_config(&config(&[
            ("a", "x,y"),
            ("x.blocks", "enabled"),
            ("x.exclusive", "y"),
            ("y.blocks", ""),
        ]))
        .unwrap();
        assert!(registry.is_blocker("x"));
        assert!(registry.is_exclusive("x"));
        assert!(!registry.is_blocker("y"));
    }

    #[test]
    fn bad_boolean_is_rejected() {
        let err = RelationTypeRegistry::from_config(&config(&[
            ("a", "x,y"),
            ("x.blocks", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RelationsError::Config(_)));
    }
}
