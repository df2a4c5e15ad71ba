//! Node records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Liveness state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Node accepts requests
    #[default]
    Alive,
    /// Node failed a request or a health check
    Dead,
}

impl NodeState {
    /// Get state as a string for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Alive => "alive",
            NodeState::Dead => "dead",
        }
    }
}

/// A single reachable server endpoint
#[derive(Debug, Clone)]
pub struct Node {
    /// Identifier reported by the upstream during sniffing, or the URL itself
    pub id: String,
    /// Canonical endpoint URL
    pub url: String,
    /// Current liveness state
    pub state: NodeState,
    /// Consecutive failures since the last successful request
    pub failures: u32,
    /// When the node was last marked dead
    pub dead_since: Option<Instant>,
}

impl Node {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            state: NodeState::Alive,
            failures: 0,
            dead_since: None,
        }
    }

    /// Seed record for a configured URL (identifier = URL)
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(url.clone(), url)
    }

    pub fn is_dead(&self) -> bool {
        self.state == NodeState::Dead
    }

    pub fn is_alive(&self) -> bool {
        self.state == NodeState::Alive
    }

    pub(crate) fn mark_dead(&mut self) {
        self.state = NodeState::Dead;
        self.dead_since = Some(Instant::now());
        self.failures = self.failures.saturating_add(1);
    }

    pub(crate) fn mark_alive(&mut self) {
        self.state = NodeState::Alive;
    }

    pub(crate) fn mark_healthy(&mut self) {
        self.state = NodeState::Alive;
        self.dead_since = None;
        self.failures = 0;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.url, self.state.as_str())
    }
}
