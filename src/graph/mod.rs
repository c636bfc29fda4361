//! Breadth-first traversal over stored relations.
//!
//! Resource ids are opaque strings here. Each BFS layer is one batched
//! `origin IN (frontier)` query, so the number of queries tracks path length,
//! not node count. Layers are expanded in lexicographic `(origin, target)`
//! order, which makes the returned shortest path deterministic. Nothing is
//! cached between calls.

use crate::error::{RelationsError, Result};
use crate::storage::relations::{self, Direction};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Stateless traversal handle over a connection (or open transaction).
#[derive(Debug, Clone, Copy)]
pub struct Graph<'a> {
    conn: &'a Connection,
    max_nodes: Option<usize>,
}

impl<'a> Graph<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            max_nodes: None,
        }
    }

    /// Fail with `TraversalLimitExceeded` once a traversal has visited more
    /// than `limit` nodes. `None` disables the limit.
    #[must_use]
    pub const fn with_node_limit(mut self, limit: Option<usize>) -> Self {
        self.max_nodes = limit;
        self
    }

    fn check_limit(&self, visited: usize) -> Result<()> {
        match self.max_nodes {
            Some(limit) if visited > limit => {
                tracing::warn!(limit, "Traversal node limit exceeded");
                Err(RelationsError::TraversalLimitExceeded { limit })
            }
            _ => Ok(()),
        }
    }

    /// Shortest path from `source` to `destination` following edges of
    /// `types`, both endpoints included. `None` if unreachable.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or the node limit is exceeded.
    pub fn find_path(
        &self,
        source: &str,
        destination: &str,
        types: &[String],
    ) -> Result<Option<Vec<String>>> {
        if source == destination {
            return Ok(Some(vec![source.to_string()]));
        }
        if types.is_empty() {
            return Ok(None);
        }

        let mut previous: HashMap<String, String> = HashMap::new();
        let mut frontier = vec![source.to_string()];

        while !frontier.is_empty() {
            let edges = relations::neighbors(self.conn, &frontier, types, Direction::Outgoing)?;
            let mut next = Vec::new();

            for (origin, target) in edges {
                if target == source || previous.contains_key(&target) {
                    continue;
                }
                previous.insert(target.clone(), origin);
                if target == destination {
                    return Ok(Some(Self::unwind(&previous, source, destination)));
                }
                next.push(target);
            }

            self.check_limit(previous.len() + 1)?;
            next.sort();
            frontier = next;
        }

        Ok(None)
    }

    fn unwind(previous: &HashMap<String, String>, source: &str, destination: &str) -> Vec<String> {
        let mut path = vec![destination.to_string()];
        let mut current = destination;
        while current != source {
            match previous.get(current) {
                Some(parent) => {
                    path.push(parent.clone());
                    current = parent;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Every node reachable from `source` over `types`, excluding `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or the node limit is exceeded.
    pub fn descendants(&self, source: &str, types: &[String]) -> Result<BTreeSet<String>> {
        self.reachable(source, types, Direction::Outgoing)
    }

    /// Every node that reaches `source` over `types`, excluding `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or the node limit is exceeded.
    pub fn ancestors(&self, source: &str, types: &[String]) -> Result<BTreeSet<String>> {
        self.reachable(source, types, Direction::Incoming)
    }

    fn reachable(
        &self,
        source: &str,
        types: &[String],
        direction: Direction,
    ) -> Result<BTreeSet<String>> {
        let mut seen: HashSet<String> = HashSet::from([source.to_string()]);
        let mut frontier = vec![source.to_string()];

        while !frontier.is_empty() {
            let edges = relations::neighbors(self.conn, &frontier, types, direction)?;
            let mut next = Vec::new();
            for (_, target) in edges {
                if seen.insert(target.clone()) {
                    next.push(target);
                }
            }
            self.check_limit(seen.len())?;
            next.sort();
            frontier = next;
        }

        seen.remove(source);
        Ok(seen.into_iter().collect())
    }
}
