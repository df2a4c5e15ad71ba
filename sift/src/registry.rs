//! Node registry and selection policy
//!
//! The registry owns the ordered node sequence behind a single read-write
//! lock. `next()` takes the write lock because selection advances the
//! cursor; enumerations take the read lock.
//!
//! Selection is delegated to a [`NodeSelector`]. [`RoundRobin`] is the
//! default and walks the sequence from the last handed-out position,
//! skipping dead nodes.

use crate::error::{Error, Result};
use crate::metrics;
use crate::node::Node;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Strategy for picking the next node from the registry
pub trait NodeSelector: Send + Sync {
    /// Return the index of the node to use, or `None` if none is eligible
    fn select(&mut self, nodes: &[Node]) -> Option<usize>;

    /// Forget positional state after the node sequence was replaced
    fn reset(&mut self);
}

/// Round-robin over alive nodes
///
/// The cursor is the index of the last node handed out, `-1` before the
/// first selection. It always stays within `[-1, len)`.
#[derive(Debug)]
pub struct RoundRobin {
    cursor: isize,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self { cursor: -1 }
    }
}

impl RoundRobin {
    pub fn cursor(&self) -> isize {
        self.cursor
    }
}

impl NodeSelector for RoundRobin {
    fn select(&mut self, nodes: &[Node]) -> Option<usize> {
        let len = nodes.len() as isize;
        for _ in 0..len {
            self.cursor += 1;
            if self.cursor >= len {
                self.cursor = 0;
            }
            if nodes[self.cursor as usize].is_alive() {
                return Some(self.cursor as usize);
            }
        }
        None
    }

    fn reset(&mut self) {
        self.cursor = -1;
    }
}

/// Membership changes produced by [`NodeRegistry::replace`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// URLs of nodes that were not known before
    pub joined: Vec<String>,
    /// URLs of nodes that were dropped
    pub left: Vec<String>,
}

struct RegistryInner {
    nodes: Vec<Node>,
    selector: Box<dyn NodeSelector>,
}

/// Ordered collection of node records
pub struct NodeRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(Box::<RoundRobin>::default())
    }
}

impl NodeRegistry {
    /// Create an empty registry with the given selection policy
    pub fn new(selector: Box<dyn NodeSelector>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                nodes: Vec::new(),
                selector,
            }),
        }
    }

    /// Atomically swap the node sequence.
    ///
    /// Records whose identifier appears in `incoming` keep their liveness
    /// and failure count. Unknown identifiers are inserted, and records
    /// absent from `incoming` are dropped. Duplicate identifiers within
    /// `incoming` are ignored after the first.
    pub fn replace(&self, incoming: Vec<Node>) -> MembershipChange {
        let mut change = MembershipChange::default();
        let (total, alive) = {
            let mut inner = self.inner.write();
            let mut seen = HashSet::with_capacity(incoming.len());
            let mut nodes = Vec::with_capacity(incoming.len());

            for node in incoming {
                if !seen.insert(node.id.clone()) {
                    continue;
                }
                match inner.nodes.iter().find(|old| old.id == node.id) {
                    Some(old) => nodes.push(old.clone()),
                    None => {
                        change.joined.push(node.url.clone());
                        nodes.push(node);
                    }
                }
            }

            for old in &inner.nodes {
                if !seen.contains(&old.id) {
                    change.left.push(old.url.clone());
                }
            }

            inner.nodes = nodes;
            inner.selector.reset();
            let alive = inner.nodes.iter().filter(|n| n.is_alive()).count();
            (inner.nodes.len(), alive)
        };

        for url in &change.joined {
            info!("{} joined the cluster", url);
        }
        for url in &change.left {
            error!("{} left the cluster", url);
        }
        metrics::record_registry_size(total, alive);
        change
    }

    /// Select the next alive node, or fail with `NoClient` after a full pass
    pub fn next(&self) -> Result<Node> {
        let mut inner = self.inner.write();
        let RegistryInner { nodes, selector } = &mut *inner;
        match selector.select(nodes) {
            Some(idx) => Ok(nodes[idx].clone()),
            None => Err(Error::NoClient("no available connection".into())),
        }
    }

    /// Flip every dead node back to alive, returning how many were revived
    pub fn resurrect_all(&self) -> usize {
        let mut inner = self.inner.write();
        let total = inner.nodes.len();
        let mut revived = 0;
        for node in inner.nodes.iter_mut().filter(|n| n.is_dead()) {
            node.mark_alive();
            metrics::record_node_state(&node.url, true);
            revived += 1;
        }
        if revived > 0 {
            warn!("{} of {} nodes marked as dead; resurrecting them", revived, total);
        }
        revived
    }

    /// Flip a node to alive, keeping its failure count
    pub fn mark_alive(&self, node_id: &str) -> bool {
        self.update(node_id, |n| n.mark_alive())
    }

    /// Flip a node to alive and reset its failure count
    pub fn mark_healthy(&self, node_id: &str) -> bool {
        self.update(node_id, |n| n.mark_healthy())
    }

    /// Mark a node dead; it keeps its position in the sequence
    pub fn mark_dead(&self, node_id: &str) -> bool {
        self.update(node_id, |n| n.mark_dead())
    }

    fn update(&self, node_id: &str, f: impl FnOnce(&mut Node)) -> bool {
        let mut inner = self.inner.write();
        match inner.nodes.iter_mut().find(|n| n.id == node_id) {
            Some(node) => {
                f(node);
                metrics::record_node_state(&node.url, node.is_alive());
                true
            }
            None => {
                // The node may have been dropped by a concurrent replace
                debug!("Node {} is no longer registered", node_id);
                false
            }
        }
    }

    /// Snapshot of all node records in registry order
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.read().nodes.clone()
    }

    /// URLs of all nodes not currently marked dead
    pub fn live_urls(&self) -> Vec<String> {
        self.inner
            .read()
            .nodes
            .iter()
            .filter(|n| !n.is_dead())
            .map(|n| n.url.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.inner.read().nodes.iter().filter(|n| n.is_alive()).count()
    }

    /// True if at least one node is alive
    pub fn has_alive(&self) -> bool {
        self.inner.read().nodes.iter().any(|n| n.is_alive())
    }
}
