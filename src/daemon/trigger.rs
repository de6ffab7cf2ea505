//! Coalescing Trigger Queue
//!
//! ```text
//! RandR events ──┐
//! acpid socket ──┼──> pending set ──> Notify ──> reconciler
//! gsettings    ──┘    (merged)
//! ```
//!
//! Producers never block. Posting a trigger that is already pending is a
//! no-op, so at most one run of each kind waits while a cycle executes.
//! Draining returns topology triggers before preference triggers.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::Notify;
use tracing::trace;

/// Reason to run a reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Trigger {
    /// Outputs may have changed; poll and reconcile
    Topology,
    /// Re-read the stored preference and reconfigure
    Preference,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology => f.write_str("topology"),
            Self::Preference => f.write_str("preference"),
        }
    }
}

/// Pending triggers plus a wakeup
#[derive(Debug, Default)]
pub struct TriggerQueue {
    pending: Mutex<BTreeSet<Trigger>>,
    notify: Notify,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a cycle; merges with a pending one of the same kind
    pub fn post(&self, trigger: Trigger) {
        let inserted = self.pending.lock().insert(trigger);
        trace!("Trigger {} posted (merged: {})", trigger, !inserted);
        self.notify.notify_one();
    }

    /// Take everything pending without waiting
    pub fn drain(&self) -> Vec<Trigger> {
        let mut pending = self.pending.lock();
        std::mem::take(&mut *pending).into_iter().collect()
    }

    /// Wait until at least one trigger is pending, then take them all
    pub async fn next(&self) -> Vec<Trigger> {
        loop {
            let triggers = self.drain();
            if !triggers.is_empty() {
                return triggers;
            }
            self.notify.notified().await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_duplicates_merge() {
        let queue = TriggerQueue::new();
        queue.post(Trigger::Preference);
        queue.post(Trigger::Topology);
        queue.post(Trigger::Topology);

        assert_eq!(queue.drain(), vec![Trigger::Topology, Trigger::Preference]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[tokio::test]
    async fn test_next_returns_posted_trigger() {
        let queue = Arc::new(TriggerQueue::new());
        let producer = Arc::clone(&queue);

        let waiter = tokio::spawn(async move { queue.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        producer.post(Trigger::Topology);

        let triggers = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(triggers, vec![Trigger::Topology]);
    }

    #[tokio::test]
    async fn test_post_before_wait_is_not_lost() {
        let queue = TriggerQueue::new();
        queue.post(Trigger::Preference);

        let triggers = tokio::time::timeout(Duration::from_secs(1), queue.next())
            .await
            .unwrap();
        assert_eq!(triggers, vec![Trigger::Preference]);
    }
}
