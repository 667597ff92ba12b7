//! Node registry: every DHT node we know of and when it may be sampled again.
//!
//! Owned by the crawler task; nothing else touches it. Entries are created
//! on first observation, eligible immediately, and forgotten once they have
//! not been seen for the configured TTL.

use std::collections::HashMap;
use std::time::Duration;

use hamster_core::Endpoint;
use tokio::time::Instant;

/// Stand-in deadline when `now + wait` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `now + wait`, saturating instead of overflowing.
fn deadline(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Tracked state for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub endpoint: Endpoint,

    /// Earliest time the node may be sampled. `None` = eligible now.
    pub next_eligible: Option<Instant>,

    /// Last time the node was observed or mentioned by another node.
    pub last_seen: Instant,
}

impl NodeState {
    fn new(endpoint: Endpoint, now: Instant) -> Self {
        Self {
            endpoint,
            next_eligible: None,
            last_seen: now,
        }
    }

    /// Due for sampling strictly before `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_eligible.map_or(true, |t| t < now)
    }
}

pub struct NodeRegistry {
    nodes: HashMap<Endpoint, NodeState>,
    min_requery: Duration,
    max_nodes: usize,
    node_ttl: Duration,
}

impl NodeRegistry {
    pub fn new(min_requery: Duration, max_nodes: usize, node_ttl: Duration) -> Self {
        Self {
            nodes: HashMap::new(),
            min_requery,
            max_nodes,
            node_ttl,
        }
    }

    /// A node talked to us. Unknown nodes are added and eligible at once;
    /// known nodes only get their `last_seen` refreshed, never their backoff.
    ///
    /// Returns true if the node was newly added.
    pub fn observe(&mut self, endpoint: Endpoint, now: Instant) -> bool {
        if let Some(node) = self.nodes.get_mut(&endpoint) {
            node.last_seen = now;
            return false;
        }
        self.insert(endpoint, now)
    }

    /// Another node's sample response listed these peers and suggested
    /// waiting `interval` before asking again. Known peers are pushed to
    /// `now + max(interval, min_requery)`; unknown ones are added.
    pub fn on_query_result_peers(
        &mut self,
        peers: &[Endpoint],
        interval: Duration,
        now: Instant,
    ) -> usize {
        let next = deadline(now, interval.max(self.min_requery));
        let mut added = 0;
        for endpoint in peers {
            match self.nodes.get_mut(endpoint) {
                Some(node) => {
                    node.next_eligible = Some(next);
                    node.last_seen = now;
                }
                None => {
                    if self.insert(*endpoint, now) {
                        added += 1;
                    }
                }
            }
        }
        added
    }

    /// Collect every node due strictly before `now` and push each one to
    /// `now + cooldown`.
    pub fn take_due(&mut self, now: Instant, cooldown: Duration) -> Vec<Endpoint> {
        let next = deadline(now, cooldown);
        let mut due = Vec::new();
        for node in self.nodes.values_mut() {
            if node.is_due(now) {
                node.next_eligible = Some(next);
                due.push(node.endpoint);
            }
        }
        due
    }

    /// Forget nodes not seen within the TTL. Returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.nodes.len();
        let ttl = self.node_ttl;
        self.nodes
            .retain(|_, node| now.saturating_duration_since(node.last_seen) < ttl);
        before - self.nodes.len()
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<&NodeState> {
        self.nodes.get(endpoint)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, endpoint: Endpoint, now: Instant) -> bool {
        if self.nodes.len() >= self.max_nodes {
            let removed = self.prune(now);
            if removed > 0 {
                tracing::debug!(removed, "pruned stale nodes at capacity");
            }
            if self.nodes.len() >= self.max_nodes {
                tracing::trace!(node = %endpoint, "node registry full, dropping");
                return false;
            }
        }
        self.nodes.insert(endpoint, NodeState::new(endpoint, now));
        true
    }
}
