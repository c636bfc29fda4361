//! `RelationsSystem`: the add/get/delete entry points.
//!
//! Every write runs through `SqliteStorage::mutate`, so validation, the
//! forward row, its mirrored reverse row and the history events commit or
//! roll back together. Listeners are told after commit.

use crate::error::{RelationsError, Result};
use crate::graph::Graph;
use crate::model::{EventType, Relation, RelationId, RelationView, ResourceId, Ticket, TicketStatus};
use crate::registry::RelationTypeRegistry;
use crate::storage::relations;
use crate::storage::tickets;
use crate::storage::{MutationContext, SqliteStorage};
use crate::validation::{ValidationContext, validate_relation};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// Input for [`RelationsSystem::add_relation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelation {
    pub source: ResourceId,
    pub destination: ResourceId,
    pub relation_type: String,
    pub comment: String,
    pub author: String,
}

impl NewRelation {
    #[must_use]
    pub fn new(source: ResourceId, relation_type: &str, destination: ResourceId) -> Self {
        Self {
            source,
            destination,
            relation_type: relation_type.to_string(),
            comment: String::new(),
            author: String::new(),
        }
    }

    /// Build from raw ids.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResourceId` if either id is malformed.
    pub fn parse(source: &str, relation_type: &str, destination: &str) -> Result<Self> {
        Ok(Self::new(
            ResourceId::parse(source)?,
            relation_type,
            ResourceId::parse(destination)?,
        ))
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// The relation this request would store, stamped with the current time.
    #[must_use]
    pub fn into_relation(self) -> Relation {
        Relation::new(self.source, self.destination, &self.relation_type)
            .with_comment(self.comment)
            .with_author(self.author)
    }
}

/// Hook for side effects of relation changes (notification, indexing).
///
/// Called after the change has committed.
pub trait RelationChangeListener {
    fn adding_relation(&self, relation: &Relation);
    fn deleting_relation(&self, relation: &Relation, deleted_by: &str);
}

/// Logs relation changes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl RelationChangeListener for TracingListener {
    fn adding_relation(&self, relation: &Relation) {
        tracing::info!(
            source = %relation.source,
            destination = %relation.destination,
            relation_type = %relation.relation_type,
            author = %relation.author,
            "Relation added"
        );
    }

    fn deleting_relation(&self, relation: &Relation, deleted_by: &str) {
        tracing::info!(
            source = %relation.source,
            destination = %relation.destination,
            relation_type = %relation.relation_type,
            deleted_by,
            "Relation deleted"
        );
    }
}

/// The relations engine: registry, listeners and traversal limit.
pub struct RelationsSystem {
    registry: RelationTypeRegistry,
    listeners: Vec<Box<dyn RelationChangeListener>>,
    max_traversal_nodes: Option<usize>,
}

impl std::fmt::Debug for RelationsSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationsSystem")
            .field("types", &self.registry.all_types())
            .field("listeners", &self.listeners.len())
            .field("max_traversal_nodes", &self.max_traversal_nodes)
            .finish()
    }
}

impl RelationsSystem {
    /// A system with the `TracingListener` installed.
    #[must_use]
    pub fn new(registry: RelationTypeRegistry) -> Self {
        Self {
            registry,
            listeners: vec![Box::new(TracingListener)],
            max_traversal_nodes: None,
        }
    }

    #[must_use]
    pub const fn with_traversal_limit(mut self, max_nodes: Option<usize>) -> Self {
        self.max_traversal_nodes = max_nodes;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn RelationChangeListener>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub const fn registry(&self) -> &RelationTypeRegistry {
        &self.registry
    }

    fn graph<'a>(&self, conn: &'a Connection) -> Graph<'a> {
        Graph::new(conn).with_node_limit(self.max_traversal_nodes)
    }

    fn actor_of(author: &str) -> &str {
        if author.is_empty() { "system" } else { author }
    }

    // ========================================================================
    // Add
    // ========================================================================

    /// Run the validator pipeline without writing.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRelationType`, a validation failure, or a database error.
    pub fn validate(&self, conn: &Connection, relation: &Relation) -> Result<()> {
        self.registry.require(&relation.relation_type)?;
        let ctx = ValidationContext::new(conn, &self.registry, self.max_traversal_nodes);
        validate_relation(relation, &ctx)
    }

    /// Validate and store a relation and its mirror, then notify listeners.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRelationType`, `DuplicateRelation`, a validation
    /// failure, or a database error. Nothing is written on error.
    pub fn add_relation(&self, storage: &mut SqliteStorage, new: NewRelation) -> Result<Relation> {
        let relation = new.into_relation();
        let actor = Self::actor_of(&relation.author).to_string();

        storage.mutate("add_relation", &actor, |tx, ctx| {
            self.add_relation_in_tx(tx, ctx, &relation)
        })?;

        for listener in &self.listeners {
            listener.adding_relation(&relation);
        }
        Ok(relation)
    }

    /// `add_relation` inside a caller's transaction; listeners are not told.
    ///
    /// # Errors
    ///
    /// As [`Self::add_relation`].
    pub fn add_relation_in_tx(
        &self,
        conn: &Connection,
        ctx: &mut MutationContext,
        relation: &Relation,
    ) -> Result<()> {
        self.registry.require(&relation.relation_type)?;

        if relations::exists(
            conn,
            relation.source.as_str(),
            relation.destination.as_str(),
            &relation.relation_type,
        )? {
            return Err(RelationsError::DuplicateRelation {
                from: relation.source.to_string(),
                to: relation.destination.to_string(),
                relation_type: relation.relation_type.clone(),
            });
        }

        let vctx = ValidationContext::new(conn, &self.registry, self.max_traversal_nodes);
        validate_relation(relation, &vctx)?;

        relations::insert(conn, relation)?;
        ctx.record_event(
            EventType::RelationAdded,
            relation.source.as_str(),
            Some(format!("{} {}", relation.relation_type, relation.destination)),
        );

        if let Some(reverse_type) = self.registry.reverse_of(&relation.relation_type) {
            let reverse = relation.clone_reverted(reverse_type);
            relations::insert(conn, &reverse)?;
            ctx.record_event(
                EventType::RelationAdded,
                reverse.source.as_str(),
                Some(format!("{} {}", reverse.relation_type, reverse.destination)),
            );
        } else {
            ctx.record_event(
                EventType::RelationAdded,
                relation.destination.as_str(),
                Some(format!("{} {} (incoming)", relation.relation_type, relation.source)),
            );
        }

        tracing::debug!(relation = %relation.id(), "Stored relation");
        Ok(())
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Every relation with `resource` as source or destination, labelled,
    /// ordered by `(type, source, destination)`.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn get_relations(&self, storage: &SqliteStorage, resource: &ResourceId) -> Result<Vec<RelationView>> {
        let rows = relations::select_touching(storage.conn(), resource)?;
        Ok(rows
            .into_iter()
            .map(|relation| RelationView {
                relation_id: relation.id(),
                label: self.registry.label_of(&relation.relation_type),
                relation,
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns a database error.
    pub fn get_relation(&self, storage: &SqliteStorage, id: &RelationId) -> Result<Option<Relation>> {
        relations::get(storage.conn(), id)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete a relation and its mirror, then notify listeners.
    ///
    /// # Errors
    ///
    /// Returns `RelationNotFound` if the forward row is absent.
    pub fn delete_relation(
        &self,
        storage: &mut SqliteStorage,
        id: &RelationId,
        actor: &str,
    ) -> Result<Relation> {
        let relation = storage.mutate("delete_relation", actor, |tx, ctx| {
            let relation = relations::get(tx, id)?
                .ok_or_else(|| RelationsError::RelationNotFound { id: id.to_string() })?;
            relations::delete(tx, id)?;
            ctx.record_event(
                EventType::RelationRemoved,
                relation.source.as_str(),
                Some(format!("{} {}", relation.relation_type, relation.destination)),
            );

            if let Some(reverse_type) = self.registry.reverse_of(&relation.relation_type) {
                let reverse = relation.clone_reverted(reverse_type).id();
                if relations::get(tx, &reverse)?.is_some() {
                    relations::delete(tx, &reverse)?;
                }
            }
            ctx.record_event(
                EventType::RelationRemoved,
                relation.destination.as_str(),
                Some(format!("{} {}", relation.relation_type, relation.source)),
            );
            Ok(relation)
        })?;

        for listener in &self.listeners {
            listener.deleting_relation(&relation, actor);
        }
        Ok(relation)
    }

    /// Remove every relation touching `resource`, and its ticket row if any.
    /// Returns the removed rows, mirrors included; listeners hear each
    /// relation once, in its master orientation.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn delete_resource(
        &self,
        storage: &mut SqliteStorage,
        resource: &ResourceId,
        actor: &str,
    ) -> Result<Vec<Relation>> {
        let removed = storage.mutate("delete_resource", actor, |tx, ctx| {
            let touching = relations::select_touching(tx, resource)?;
            relations::delete_for_resource(tx, resource)?;

            let others: BTreeSet<&ResourceId> = touching
                .iter()
                .flat_map(|r| [&r.source, &r.destination])
                .filter(|r| *r != resource)
                .collect();
            for other in others {
                ctx.record_event(
                    EventType::RelationRemoved,
                    other.as_str(),
                    Some(format!("{resource} deleted")),
                );
            }

            if tickets::get_ticket(tx, resource.as_str())?.is_some() {
                tickets::delete_ticket(tx, resource.as_str())?;
            }
            ctx.record_event(EventType::Deleted, resource.as_str(), None);
            Ok(touching)
        })?;

        let mut reported: BTreeSet<String> = BTreeSet::new();
        for row in &removed {
            let relation = self.registry.master_of(row);
            if !reported.insert(relation.id().to_string()) {
                continue;
            }
            for listener in &self.listeners {
                listener.deleting_relation(&relation, actor);
            }
        }
        Ok(removed)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    fn require_types(&self, types: &[String]) -> Result<()> {
        for t in types {
            self.registry.require(t)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UnknownRelationType`, `TraversalLimitExceeded` or a database error.
    pub fn find_path(
        &self,
        storage: &SqliteStorage,
        source: &ResourceId,
        destination: &ResourceId,
        types: &[String],
    ) -> Result<Option<Vec<String>>> {
        self.require_types(types)?;
        self.graph(storage.conn())
            .find_path(source.as_str(), destination.as_str(), types)
    }

    /// # Errors
    ///
    /// Returns `UnknownRelationType`, `TraversalLimitExceeded` or a database error.
    pub fn descendants(
        &self,
        storage: &SqliteStorage,
        source: &ResourceId,
        types: &[String],
    ) -> Result<BTreeSet<String>> {
        self.require_types(types)?;
        self.graph(storage.conn()).descendants(source.as_str(), types)
    }

    /// # Errors
    ///
    /// Returns `UnknownRelationType`, `TraversalLimitExceeded` or a database error.
    pub fn ancestors(
        &self,
        storage: &SqliteStorage,
        source: &ResourceId,
        types: &[String],
    ) -> Result<BTreeSet<String>> {
        self.require_types(types)?;
        self.graph(storage.conn()).ancestors(source.as_str(), types)
    }

    // ========================================================================
    // Blockers and tickets
    // ========================================================================

    /// Open tickets blocking `resource`.
    ///
    /// Follows blocking relations out of `resource`; a closed ticket does
    /// not block, but whatever blocks it still does. Resources missing from
    /// the ticket catalog are ignored.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn find_blockers(&self, storage: &SqliteStorage, resource: &ResourceId) -> Result<Vec<ResourceId>> {
        self.blockers_in(storage.conn(), resource)
    }

    fn blockers_in(&self, conn: &Connection, resource: &ResourceId) -> Result<Vec<ResourceId>> {
        let blocker_types = self.registry.blocker_types();

        let mut blockers = BTreeSet::new();
        let mut seen: BTreeSet<ResourceId> = BTreeSet::from([resource.clone()]);
        let mut pending = vec![resource.clone()];

        while let Some(current) = pending.pop() {
            let outgoing = relations::select(
                conn,
                &relations::RelationCriteria {
                    source: Some(current.to_string()),
                    types: Some(blocker_types.clone()),
                    ..relations::RelationCriteria::default()
                },
            )?;
            for relation in outgoing {
                let target = relation.destination;
                if !seen.insert(target.clone()) {
                    continue;
                }
                match tickets::get_ticket(conn, target.as_str())? {
                    Some(ticket) if ticket.status.is_closed() => pending.push(target),
                    Some(_) => {
                        blockers.insert(target);
                    }
                    None => {}
                }
            }
        }

        Ok(blockers.into_iter().collect())
    }

    /// Close a ticket, refusing while it has open blockers unless `force`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceBlocked`, `TicketNotFound` or a database error.
    pub fn close_ticket(
        &self,
        storage: &mut SqliteStorage,
        id: &ResourceId,
        actor: &str,
        force: bool,
        comment: Option<&str>,
    ) -> Result<()> {
        storage.mutate("close_ticket", actor, |tx, ctx| {
            if tickets::get_ticket(tx, id.as_str())?.is_none() {
                return Err(RelationsError::TicketNotFound { id: id.to_string() });
            }
            if !force {
                let blockers = self.blockers_in(tx, id)?;
                if !blockers.is_empty() {
                    return Err(RelationsError::ResourceBlocked {
                        id: id.to_string(),
                        blockers: blockers.iter().map(ToString::to_string).collect(),
                    });
                }
            }
            tickets::set_status(tx, id.as_str(), TicketStatus::Closed)?;
            ctx.record_event(EventType::Closed, id.as_str(), comment.map(str::to_string));
            Ok(())
        })
    }

    /// Field values a ticket linked from `source` by `relation_type` inherits.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRelationType`, `TicketNotFound` or a database error.
    pub fn copied_fields(
        &self,
        storage: &SqliteStorage,
        source: &ResourceId,
        relation_type: &str,
    ) -> Result<BTreeMap<String, String>> {
        let fields = self.registry.require(relation_type)?.copy_fields.clone();
        let ticket = storage
            .get_ticket(source)?
            .ok_or_else(|| RelationsError::TicketNotFound { id: source.to_string() })?;
        Ok(fields
            .into_iter()
            .filter_map(|name| ticket.field(&name).map(|value| (name, value)))
            .collect())
    }

    /// Create a ticket in `source`'s product related to it by
    /// `relation_type` (`new -> source`), copying the type's copy fields
    /// when no summary is given.
    ///
    /// # Errors
    ///
    /// Returns the first error from ticket creation or `add_relation`; the
    /// ticket and relation are written in one transaction.
    pub fn create_linked_ticket(
        &self,
        storage: &mut SqliteStorage,
        source: &ResourceId,
        relation_type: &str,
        summary: Option<&str>,
        actor: &str,
    ) -> Result<(Ticket, Relation)> {
        let copied = self.copied_fields(storage, source, relation_type)?;
        let summary = summary
            .map(str::to_string)
            .or_else(|| copied.get("summary").cloned())
            .unwrap_or_default();
        let product = source.product().to_string();

        let (ticket, relation) = storage.mutate("create_linked_ticket", actor, |tx, ctx| {
            let number = tickets::next_ticket_number(tx, &product)?;
            let ticket = Ticket::new(ResourceId::ticket(&product, number)?, summary.as_str());
            tickets::insert_ticket(tx, &ticket)?;
            ctx.record_event(EventType::Created, ticket.id.as_str(), Some(summary.clone()));

            let relation = Relation::new(ticket.id.clone(), source.clone(), relation_type)
                .with_author(actor);
            self.add_relation_in_tx(tx, ctx, &relation)?;
            Ok((ticket, relation))
        })?;

        for listener in &self.listeners {
            listener.adding_relation(&relation);
        }
        Ok((ticket, relation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RelationTypeConfig;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn registry() -> RelationTypeRegistry {
        let types = [
            ("dependency", "dependson,dependent"),
            ("dependency.validators", "NoCycles,SingleProduct"),
            ("dependson.blocks", "true"),
            ("oneway", "refersto"),
        ];
        RelationTypeRegistry::from_config(&RelationTypeConfig {
            types: types
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..RelationTypeConfig::default()
        })
        .unwrap()
    }

    #[derive(Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl RelationChangeListener for Recorder {
        fn adding_relation(&self, relation: &Relation) {
            self.0.borrow_mut().push(format!("add {}", relation.id()));
        }
        fn deleting_relation(&self, relation: &Relation, deleted_by: &str) {
            self.0
                .borrow_mut()
                .push(format!("delete {} by {deleted_by}", relation.id()));
        }
    }

    #[test]
    fn add_mirrors_and_records_history() {
        let system = RelationsSystem::new(registry());
        let mut storage = SqliteStorage::open_memory().unwrap();
        let new = NewRelation::parse("p:ticket:1", "dependson", "p:ticket:2")
            .unwrap()
            .with_author("alice");
        let rel = system.add_relation(&mut storage, new).unwrap();

        let reverse = rel.clone_reverted("dependent").id();
        assert!(system.get_relation(&storage, &reverse).unwrap().is_some());
        assert_eq!(
            storage.get_events(&rel.source, 0).unwrap()[0].event_type,
            EventType::RelationAdded
        );
        assert_eq!(storage.get_events(&rel.destination, 0).unwrap().len(), 1);
    }

    #[test]
    fn listeners_hear_after_commit_only() {
        let mut system = RelationsSystem::new(registry());
        let log = Rc::new(RefCell::new(Vec::new()));
        system.add_listener(Box::new(Recorder(Rc::clone(&log))));
        let mut storage = SqliteStorage::open_memory().unwrap();

        let rel = system
            .add_relation(
                &mut storage,
                NewRelation::parse("p:ticket:1", "dependson", "p:ticket:2").unwrap(),
            )
            .unwrap();
        // Rejected add: nobody is told.
        assert!(system
            .add_relation(
                &mut storage,
                NewRelation::parse("p:ticket:2", "dependson", "p:ticket:1").unwrap(),
            )
            .is_err());
        system.delete_relation(&mut storage, &rel.id(), "bob").unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "add p:ticket:1,p:ticket:2,dependson".to_string(),
                "delete p:ticket:1,p:ticket:2,dependson by bob".to_string(),
            ]
        );
    }

    #[test]
    fn unknown_type_is_rejected_before_validation() {
        let system = RelationsSystem::new(registry());
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = system
            .add_relation(
                &mut storage,
                NewRelation::parse("p:ticket:1", "nosuch", "p:ticket:1").unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, RelationsError::UnknownRelationType { .. }));
    }

    #[test]
    fn find_blockers_recurses_through_closed() {
        let system = RelationsSystem::new(registry());
        let mut storage = SqliteStorage::open_memory().unwrap();
        let a = storage.create_ticket("p", "a", "t").unwrap().id;
        let b = storage.create_ticket("p", "b", "t").unwrap().id;
        let c = storage.create_ticket("p", "c", "t").unwrap().id;
        system
            .add_relation(&mut storage, NewRelation::new(a.clone(), "dependson", b.clone()))
            .unwrap();
        system
            .add_relation(&mut storage, NewRelation::new(b.clone(), "dependson", c.clone()))
            .unwrap();

        assert_eq!(system.find_blockers(&storage, &a).unwrap(), vec![b.clone()]);

        // b itself waits on c.
        assert!(system.close_ticket(&mut storage, &b, "t", false, None).is_err());
        system.close_ticket(&mut storage, &b, "t", true, None).unwrap();
        assert_eq!(system.find_blockers(&storage, &a).unwrap(), vec![c.clone()]);

        system.close_ticket(&mut storage, &c, "t", false, None).unwrap();
        assert!(system.find_blockers(&storage, &a).unwrap().is_empty());
    }

    #[test]
    fn close_refuses_while_blocked_unless_forced() {
        let system = RelationsSystem::new(registry());
        let mut storage = SqliteStorage::open_memory().unwrap();
        let a = storage.create_ticket("p", "a", "t").unwrap().id;
        let b = storage.create_ticket("p", "b", "t").unwrap().id;
        system
            .add_relation(&mut storage, NewRelation::new(a.clone(), "dependson", b.clone()))
            .unwrap();

        let err = system.close_ticket(&mut storage, &a, "t", false, None).unwrap_err();
        assert!(matches!(err, RelationsError::ResourceBlocked { ref blockers, .. } if blockers == &vec![b.to_string()]));
        system.close_ticket(&mut storage, &a, "t", true, Some("anyway")).unwrap();
        assert!(storage.get_ticket(&a).unwrap().unwrap().status.is_closed());
    }

    #[test]
    fn linked_ticket_copies_summary() {
        let system = RelationsSystem::new(registry());
        let mut storage = SqliteStorage::open_memory().unwrap();
        let origin = storage.create_ticket("p", "Original problem", "t").unwrap().id;
        let (ticket, relation) = system
            .create_linked_ticket(&mut storage, &origin, "dependent", None, "t")
            .unwrap();
        assert_eq!(ticket.summary, "Original problem");
        assert_eq!(ticket.id.as_str(), "p:ticket:2");
        assert_eq!(relation.source, ticket.id);
        assert_eq!(system.get_relations(&storage, &origin).unwrap().len(), 2);
    }
}
