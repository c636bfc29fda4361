#![allow(dead_code)]

use bh_relations::registry::{RelationTypeConfig, RelationTypeRegistry};
use bh_relations::storage::SqliteStorage;
use bh_relations::{NewRelation, Relation, RelationsSystem, ResourceId};
use bh_relations::model::Ticket;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Relation types exercised by the integration suites.
pub const TEST_TYPES: &[(&str, &str)] = &[
    ("dependency", "dependson,dependent"),
    ("dependency.validators", "NoCycles,SingleProduct"),
    ("dependson.blocks", "true"),
    ("parent_children", "parent,children"),
    ("parent_children.validators", "OneToMany,SingleProduct,NoCycles"),
    ("children.label", "Overridden"),
    ("parent.copy_fields", "summary,status"),
    ("parent.exclusive", "true"),
    ("multiproduct_relation", "mprel,mpbackrel"),
    ("oneway", "refersto"),
    ("duplicate", "duplicateof,duplicatedby"),
    ("duplicate.validators", "ReferencesOlder"),
    ("duplicateof.label", "is a duplicate of"),
    ("duplicatedby.label", "duplicates"),
    ("blocker", "blockedby,blocks"),
    ("blockedby.blocks", "true"),
];

pub fn type_config() -> RelationTypeConfig {
    RelationTypeConfig {
        types: TEST_TYPES
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
        ..RelationTypeConfig::default()
    }
}

pub fn registry() -> RelationTypeRegistry {
    RelationTypeRegistry::from_config(&type_config()).expect("test relation types parse")
}

pub fn system() -> RelationsSystem {
    RelationsSystem::new(registry())
}

pub fn rid(s: &str) -> ResourceId {
    ResourceId::parse(s).expect("valid resource id")
}

/// Create a ticket in `product` and return its id.
pub fn ticket(storage: &mut SqliteStorage, product: &str, summary: &str) -> ResourceId {
    storage
        .create_ticket(product, summary, "tester")
        .expect("create ticket")
        .id
}

/// Fixed base time so ticket ages are deterministic.
pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).expect("valid timestamp") // 2025-01-01 00:00:00 UTC
}

/// Insert a ticket with a fixed id created `age_offset_secs` after the base time.
pub fn ticket_at(
    storage: &mut SqliteStorage,
    id: &str,
    summary: &str,
    age_offset_secs: i64,
) -> ResourceId {
    let mut ticket = Ticket::new(rid(id), summary);
    ticket.created_at = base_time() + Duration::seconds(age_offset_secs);
    storage.insert_ticket(&ticket, "tester").expect("insert ticket");
    ticket.id
}

pub fn add(
    system: &RelationsSystem,
    storage: &mut SqliteStorage,
    source: &ResourceId,
    relation_type: &str,
    destination: &ResourceId,
) -> bh_relations::Result<Relation> {
    system.add_relation(
        storage,
        NewRelation::new(source.clone(), relation_type, destination.clone()).with_author("tester"),
    )
}

pub fn types(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}
