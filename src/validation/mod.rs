//! Graph validators for candidate relations.
//!
//! Validators only read: the store through [`Graph`] and the ticket
//! catalog. The pipeline for a relation is the configured global
//! validators followed by the type's own, deduplicated, and stops at the
//! first failure.
//!
//! Validation runs on the master orientation of the candidate. Adding an
//! edge of the second type of a pair (`dependent`) is checked as its
//! reverted first-type edge (`dependson`), so both ends of a pair share one
//! set of graph constraints.

use crate::error::{Result, ValidationError, ValidationKind};
use crate::graph::Graph;
use crate::model::Relation;
use crate::registry::{RelationTypeRegistry, ValidatorKind};
use crate::storage::relations::{self, RelationCriteria};
use crate::storage::tickets;
use rusqlite::Connection;

/// What validators may read.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub conn: &'a Connection,
    pub registry: &'a RelationTypeRegistry,
    pub graph: Graph<'a>,
}

impl<'a> ValidationContext<'a> {
    #[must_use]
    pub const fn new(
        conn: &'a Connection,
        registry: &'a RelationTypeRegistry,
        max_nodes: Option<usize>,
    ) -> Self {
        Self {
            conn,
            registry,
            graph: Graph::new(conn).with_node_limit(max_nodes),
        }
    }

    fn label(&self, relation_type: &str) -> String {
        self.registry.label_of(relation_type)
    }
}

/// A check run against a candidate relation before it is stored.
///
/// Rejections are `RelationsError::Validation`; other errors (database,
/// traversal limit) propagate unchanged.
pub trait Validator {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns a validation error if the relation must not be added.
    fn validate(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()>;
}

fn reversed(mut path: Vec<String>) -> Vec<String> {
    path.reverse();
    path
}

/// Rejects `source == destination`.
pub struct NoSelfReferenceValidator;

impl Validator for NoSelfReferenceValidator {
    fn name(&self) -> &'static str {
        "NoSelfReference"
    }

    fn validate(&self, relation: &Relation, _ctx: &ValidationContext<'_>) -> Result<()> {
        if relation.source == relation.destination {
            return Err(ValidationError::new(
                ValidationKind::SelfReference,
                "Ticket cannot be self-referenced in a relation.",
            )
            .with_failed_ids(vec![relation.source.to_string()])
            .into());
        }
        Ok(())
    }
}

/// Rejects an edge that would close a cycle within its own type.
///
/// The failed ids are the cycle starting at the new edge's source:
/// adding `C -> A` over `A -> B -> C` reports `[C, B, A]`.
pub struct NoCyclesValidator;

impl Validator for NoCyclesValidator {
    fn name(&self) -> &'static str {
        "NoCycles"
    }

    fn validate(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
        let types = [relation.relation_type.clone()];
        let path = ctx.graph.find_path(
            relation.destination.as_str(),
            relation.source.as_str(),
            &types,
        )?;
        if let Some(path) = path {
            let cycle = reversed(path);
            return Err(ValidationError::new(
                ValidationKind::Cycle,
                format!(
                    "Cycle in '{}': {}",
                    ctx.label(&relation.relation_type),
                    cycle.join(" -> ")
                ),
            )
            .with_failed_ids(cycle)
            .into());
        }
        Ok(())
    }
}

/// Allows at most one edge of the type per source.
pub struct OneToManyValidator;

impl Validator for OneToManyValidator {
    fn name(&self) -> &'static str {
        "OneToMany"
    }

    fn validate(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
        let existing = relations::select(
            ctx.conn,
            &RelationCriteria::from_source(&relation.source).with_type(&relation.relation_type),
        )?;
        if let Some(first) = existing.first() {
            return Err(ValidationError::new(
                ValidationKind::OneToMany,
                format!(
                    "{} can only have one '{}' relation (already: {})",
                    relation.source,
                    ctx.label(&relation.relation_type),
                    first.destination
                ),
            )
            .with_failed_ids(vec![
                relation.source.to_string(),
                first.destination.to_string(),
            ])
            .into());
        }
        Ok(())
    }
}

/// Keeps exclusive hierarchies free of any other relation.
///
/// For an edge of an exclusive type (or whose reverse is exclusive), no
/// existing relation may join the ancestor closure of its source with the
/// descendant closure of its destination, in either direction. Any other
/// edge may not join two resources already connected by an exclusive path.
pub struct ExclusiveValidator;

impl ExclusiveValidator {
    fn exclusive_candidate(relation: &Relation, registry: &RelationTypeRegistry) -> Option<Relation> {
        if registry.is_exclusive(&relation.relation_type) {
            return Some(relation.clone());
        }
        registry
            .reverse_of(&relation.relation_type)
            .filter(|rev| registry.is_exclusive(rev))
            .map(|rev| relation.clone_reverted(rev))
    }
}

impl Validator for ExclusiveValidator {
    fn name(&self) -> &'static str {
        "Exclusive"
    }

    fn validate(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
        let exclusive = ctx.registry.exclusive_types();
        if exclusive.is_empty() {
            return Ok(());
        }

        if let Some(candidate) = Self::exclusive_candidate(relation, ctx.registry) {
            let mut upper = ctx.graph.ancestors(candidate.source.as_str(), &exclusive)?;
            upper.insert(candidate.source.to_string());
            let mut lower = ctx
                .graph
                .descendants(candidate.destination.as_str(), &exclusive)?;
            lower.insert(candidate.destination.to_string());

            let upper: Vec<String> = upper.into_iter().collect();
            let lower: Vec<String> = lower.into_iter().collect();
            let mut conflicts = relations::edges_between(ctx.conn, &upper, &lower)?;
            conflicts.extend(relations::edges_between(ctx.conn, &lower, &upper)?);

            if let Some(first) = conflicts.first() {
                let listed: Vec<String> = conflicts.iter().map(|r| r.id().to_string()).collect();
                return Err(ValidationError::new(
                    ValidationKind::Exclusive,
                    format!(
                        "Relation '{}' is incompatible with the following existing relations: {}",
                        ctx.label(&relation.relation_type),
                        listed.join("; ")
                    ),
                )
                .with_failed_ids(vec![first.source.to_string(), first.destination.to_string()])
                .into());
            }
            return Ok(());
        }

        let (source, destination) = (relation.source.as_str(), relation.destination.as_str());
        let path = match ctx.graph.find_path(source, destination, &exclusive)? {
            Some(path) => Some(path),
            None => ctx.graph.find_path(destination, source, &exclusive)?,
        };
        if let Some(path) = path {
            return Err(ValidationError::new(
                ValidationKind::Exclusive,
                format!(
                    "Relation '{}' cannot join resources already related by an exclusive relation: {}",
                    ctx.label(&relation.relation_type),
                    path.join(" -> ")
                ),
            )
            .with_failed_ids(path)
            .into());
        }
        Ok(())
    }
}

/// Both endpoints must belong to the same product.
pub struct SingleProductValidator;

impl Validator for SingleProductValidator {
    fn name(&self) -> &'static str {
        "SingleProduct"
    }

    fn validate(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
        if relation.source.product() != relation.destination.product() {
            return Err(ValidationError::new(
                ValidationKind::CrossProduct,
                format!(
                    "Resources for '{}' relation must belong to the same product.",
                    ctx.label(&relation.relation_type)
                ),
            )
            .with_failed_ids(vec![
                relation.source.to_string(),
                relation.destination.to_string(),
            ])
            .into());
        }
        Ok(())
    }
}

/// The destination ticket must not be newer than the source ticket.
///
/// Resources missing from the ticket catalog are not checked.
pub struct ReferencesOlderValidator;

impl Validator for ReferencesOlderValidator {
    fn name(&self) -> &'static str {
        "ReferencesOlder"
    }

    fn validate(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
        let source = tickets::get_ticket(ctx.conn, relation.source.as_str())?;
        let destination = tickets::get_ticket(ctx.conn, relation.destination.as_str())?;
        let (Some(source), Some(destination)) = (source, destination) else {
            tracing::debug!(relation = %relation.id(), "Skipping age check for non-ticket endpoint");
            return Ok(());
        };
        if destination.created_at > source.created_at {
            return Err(ValidationError::new(
                ValidationKind::StaleReference,
                format!(
                    "Relation '{}' must refer to an older ticket: {} is newer than {}",
                    ctx.label(&relation.relation_type),
                    destination.id,
                    source.id
                ),
            )
            .with_failed_ids(vec![source.id.to_string(), destination.id.to_string()])
            .into());
        }
        Ok(())
    }
}

/// Rejects cycles of blocking relations.
///
/// Applies when the type, or its reverse, blocks; the edge is checked in its
/// blocking orientation. The cycle search follows `blocker_types`, which
/// defaults to every blocking type in the registry, so mixed cycles such as
/// `dependson` then `blockedby` are caught.
#[derive(Debug, Clone, Default)]
pub struct BlockerValidator {
    pub blocker_types: Option<Vec<String>>,
}

impl BlockerValidator {
    #[must_use]
    pub const fn with_types(types: Vec<String>) -> Self {
        Self {
            blocker_types: Some(types),
        }
    }
}

impl Validator for BlockerValidator {
    fn name(&self) -> &'static str {
        "Blocker"
    }

    fn validate(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
        let registry = ctx.registry;
        let candidate = if registry.is_blocker(&relation.relation_type) {
            relation.clone()
        } else {
            match registry
                .reverse_of(&relation.relation_type)
                .filter(|rev| registry.is_blocker(rev))
            {
                Some(rev) => relation.clone_reverted(rev),
                None => return Ok(()),
            }
        };

        let types = self
            .blocker_types
            .clone()
            .unwrap_or_else(|| registry.blocker_types());
        let path = ctx.graph.find_path(
            candidate.destination.as_str(),
            candidate.source.as_str(),
            &types,
        )?;
        if let Some(path) = path {
            let cycle = reversed(path);
            return Err(ValidationError::new(
                ValidationKind::BlockerCycle,
                format!(
                    "Blocking cycle through '{}': {}",
                    ctx.label(&candidate.relation_type),
                    cycle.join(" -> ")
                ),
            )
            .with_failed_ids(cycle)
            .into());
        }
        Ok(())
    }
}

/// The validator implementing a configured kind.
#[must_use]
pub fn validator_for(kind: ValidatorKind) -> Box<dyn Validator> {
    match kind {
        ValidatorKind::NoSelfReference => Box::new(NoSelfReferenceValidator),
        ValidatorKind::NoCycles => Box::new(NoCyclesValidator),
        ValidatorKind::Exclusive => Box::new(ExclusiveValidator),
        ValidatorKind::OneToMany => Box::new(OneToManyValidator),
        ValidatorKind::SingleProduct => Box::new(SingleProductValidator),
        ValidatorKind::ReferencesOlder => Box::new(ReferencesOlderValidator),
        ValidatorKind::Blocker => Box::new(BlockerValidator::default()),
    }
}

/// Ordered, fail-fast list of validators.
pub struct ValidatorPipeline {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorPipeline {
    #[must_use]
    pub fn new(validators: Vec<Box<dyn Validator>>) -> Self {
        Self { validators }
    }

    /// Pipeline from kinds; repeated kinds run once.
    #[must_use]
    pub fn from_kinds(kinds: &[ValidatorKind]) -> Self {
        let mut unique: Vec<ValidatorKind> = Vec::new();
        for kind in kinds {
            if !unique.contains(kind) {
                unique.push(*kind);
            }
        }
        Self::new(unique.into_iter().map(validator_for).collect())
    }

    /// Global validators, then the master type's, then any declared on
    /// `relation_type` itself.
    #[must_use]
    pub fn for_type(registry: &RelationTypeRegistry, relation_type: &str) -> Self {
        let master = registry
            .get(relation_type)
            .filter(|t| !t.is_master)
            .and_then(|t| t.reverse.as_deref())
            .unwrap_or(relation_type);
        let kinds: Vec<ValidatorKind> = registry
            .global_validators()
            .iter()
            .chain(registry.validators_for(master))
            .chain(registry.validators_for(relation_type))
            .copied()
            .collect();
        Self::from_kinds(&kinds)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run every validator in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first validator's error.
    pub fn run(&self, relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
        for validator in &self.validators {
            if let Err(err) = validator.validate(relation, ctx) {
                tracing::debug!(
                    validator = validator.name(),
                    relation = %relation.id(),
                    error = %err,
                    "Relation rejected"
                );
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Validate a candidate relation in its master orientation.
///
/// # Errors
///
/// Returns the first validation failure, or a database/traversal error.
pub fn validate_relation(relation: &Relation, ctx: &ValidationContext<'_>) -> Result<()> {
    let master = ctx.registry.master_of(relation);
    ValidatorPipeline::for_type(ctx.registry, &relation.relation_type).run(&master, ctx)
}
