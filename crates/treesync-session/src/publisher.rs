//! Source-side flush driver.

use crate::config::SessionConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use treesync_core::{Envelope, Result};
use treesync_source::Node;

/// Identifies one subscriber of a [`Publisher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An envelope addressed to one subscriber.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    pub subscriber: SubscriberId,
    pub envelope: Envelope,
}

impl Outgoing {
    /// JSON bytes ready for a transport.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.envelope.to_bytes()
    }
}

/// Counters kept across flushes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub flushes: u64,
    pub complete_sent: u64,
    pub deltas_sent: u64,
    pub empty_skipped: u64,
}

#[derive(Debug)]
struct SubscriberState {
    needs_complete: bool,
}

/// Owns a source root and runs its flush cycle on behalf of subscribers.
///
/// Each [`flush`](Publisher::flush) reads the cycle's delta once, hands
/// it (or a complete state, for subscribers that need one) to every
/// subscriber, then resets the tree exactly once.
pub struct Publisher {
    root: Node,
    config: SessionConfig,
    subscribers: BTreeMap<SubscriberId, SubscriberState>,
    next_id: u64,
    stats: FlushStats,
}

impl Publisher {
    pub fn new(root: Node, config: SessionConfig) -> Self {
        Self {
            root,
            config,
            subscribers: BTreeMap::new(),
            next_id: 0,
            stats: FlushStats::default(),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> &FlushStats {
        &self.stats
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Register a subscriber. Its first envelope is a complete state.
    pub fn subscribe(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(
            id,
            SubscriberState {
                needs_complete: true,
            },
        );
        tracing::info!(session = %self.config.name, subscriber = %id, "subscriber joined");
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::info!(session = %self.config.name, subscriber = %id, "subscriber left");
        }
        removed
    }

    /// Send `id` a complete state on the next flush, e.g. after its mirror
    /// rejected an envelope.
    pub fn request_resync(&mut self, id: SubscriberId) -> bool {
        match self.subscribers.get_mut(&id) {
            Some(state) => {
                state.needs_complete = true;
                tracing::debug!(session = %self.config.name, subscriber = %id, "resync requested");
                true
            }
            None => false,
        }
    }

    /// Close the current cycle and address its envelopes.
    pub fn flush(&mut self) -> Vec<Outgoing> {
        self.stats.flushes += 1;
        // A zero interval can still arrive through deserialization.
        let resync_all = self
            .config
            .resync_interval
            .filter(|&every| every > 0)
            .is_some_and(|every| self.stats.flushes % every == 0);

        let delta = self.root.recent_changes();
        let mut complete: Option<Envelope> = None;
        let mut outgoing = Vec::with_capacity(self.subscribers.len());

        for (id, state) in self.subscribers.iter_mut() {
            if state.needs_complete || resync_all {
                let envelope = complete
                    .get_or_insert_with(|| self.root.complete_state())
                    .clone();
                state.needs_complete = false;
                self.stats.complete_sent += 1;
                outgoing.push(Outgoing {
                    subscriber: *id,
                    envelope,
                });
            } else if delta.is_empty() && self.config.skip_empty_deltas {
                self.stats.empty_skipped += 1;
            } else {
                self.stats.deltas_sent += 1;
                outgoing.push(Outgoing {
                    subscriber: *id,
                    envelope: delta.clone(),
                });
            }
        }

        self.root.reset_recent_changes();
        tracing::debug!(
            session = %self.config.name,
            flush = self.stats.flushes,
            envelopes = outgoing.len(),
            empty = delta.is_empty(),
            "flush complete"
        );
        outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfigBuilder;
    use treesync_core::Schema;

    fn root() -> Node {
        let schema = Schema::builder("Simple")
            .scalar("name", "Some Name")
            .scalar("id", 99)
            .build()
            .unwrap();
        Node::new(schema)
    }

    #[test]
    fn test_new_subscriber_gets_complete_state() {
        let mut publisher = Publisher::new(root(), SessionConfig::default());
        let id = publisher.subscribe();

        let out = publisher.flush();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].subscriber, id);
        assert_eq!(
            out[0].encode().unwrap(),
            br#"[1,1,"Some Name",0,99]"#.to_vec()
        );
    }

    #[test]
    fn test_empty_deltas_are_skipped() {
        let mut publisher = Publisher::new(root(), SessionConfig::default());
        publisher.subscribe();
        publisher.flush();

        assert!(publisher.flush().is_empty());
        assert_eq!(publisher.stats().empty_skipped, 1);
    }

    #[test]
    fn test_empty_deltas_can_be_kept() {
        let config = SessionConfigBuilder::new().skip_empty_deltas(false).build();
        let mut publisher = Publisher::new(root(), config);
        publisher.subscribe();
        publisher.flush();

        let out = publisher.flush();
        assert_eq!(out.len(), 1);
        assert!(out[0].envelope.is_empty());
    }

    #[test]
    fn test_mixed_subscribers_share_one_cycle() {
        let mut publisher = Publisher::new(root(), SessionConfig::default());
        let early = publisher.subscribe();
        publisher.flush();

        publisher.root().set("id", 5).unwrap();
        let late = publisher.subscribe();
        let out = publisher.flush();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].subscriber, early);
        assert_eq!(out[0].envelope.to_json().unwrap(), "[2,0,5]");
        assert_eq!(out[1].subscriber, late);
        assert_eq!(
            out[1].envelope.to_json().unwrap(),
            r#"[1,1,"Some Name",0,5]"#
        );
        assert!(!publisher.root().has_changes());
    }

    #[test]
    fn test_periodic_resync() {
        let config = SessionConfigBuilder::new().resync_interval(3).build();
        let mut publisher = Publisher::new(root(), config);
        publisher.subscribe();

        publisher.flush();
        publisher.flush();
        let out = publisher.flush();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].envelope.to_json().unwrap(), r#"[1,1,"Some Name",0,99]"#);
        assert_eq!(publisher.stats().complete_sent, 2);
    }

    #[test]
    fn test_zero_resync_interval_disables_resync() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"skip_empty_deltas":true,"resync_interval":0,"name":"zero"}"#,
        )
        .unwrap();
        let mut publisher = Publisher::new(root(), config);
        publisher.subscribe();

        assert_eq!(publisher.flush().len(), 1);
        publisher.root().set("id", 3).unwrap();
        let out = publisher.flush();
        assert_eq!(out[0].envelope.to_json().unwrap(), "[2,0,3]");
        assert_eq!(publisher.stats().complete_sent, 1);
    }

    #[test]
    fn test_unsubscribe_and_resync_unknown() {
        let mut publisher = Publisher::new(root(), SessionConfig::default());
        let id = publisher.subscribe();
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        assert!(!publisher.request_resync(id));
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
