//! Periodic sampling of due nodes.

use tokio::time::Instant;

use crate::crawler::Crawler;
use crate::engine::{NetworkEngine, SampleTarget};

impl<E: NetworkEngine> Crawler<E> {
    /// One scheduler pass: forget stale nodes, then send a sample request
    /// to every node due strictly before `now` and hold it off for the
    /// cool-down. Returns how many nodes were sampled.
    pub fn tick(&mut self, now: Instant) -> usize {
        let pruned = self.registry.prune(now);
        let due = self.registry.take_due(now, self.settings.sample_cooldown);

        for endpoint in &due {
            let target: SampleTarget = rand::random();
            self.engine.send_query_request(*endpoint, target);
        }

        self.stats.samples_sent += due.len() as u64;
        tracing::debug!(
            sampled = due.len(),
            pruned,
            nodes = self.registry.len(),
            "sampling tick"
        );

        due.len()
    }
}
