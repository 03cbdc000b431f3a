//! Per-node record of what changed since the last flush.
//!
//! Slots are keyed by declaration order for nodes and by entry id for maps,
//! so iterating the log yields changes in the order they must be encoded.
//! A slot written several times in one cycle keeps its first `from` and
//! only moves its `to`, collapsing the writes into one net change.

use crate::child::Child;
use std::collections::BTreeMap;
use treesync_core::Value;

/// Net change of one node field during the current cycle.
#[derive(Clone, Debug)]
pub(crate) enum FieldChange {
    Scalar { from: Value, to: Value },
    Nested { from: Option<Child>, to: Option<Child> },
}

/// Net change of one map entry during the current cycle. `None` means the
/// entry did not exist at that end of the cycle.
#[derive(Clone, Debug)]
pub(crate) struct EntryChange<V> {
    pub key: String,
    pub from: Option<V>,
    pub to: Option<V>,
}

#[derive(Clone, Debug)]
pub(crate) struct ChangeLog<C> {
    slots: BTreeMap<usize, C>,
}

impl<C> Default for ChangeLog<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ChangeLog<C> {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &C)> {
        self.slots.iter().map(|(slot, change)| (*slot, change))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl ChangeLog<FieldChange> {
    pub fn record_scalar(&mut self, slot: usize, from: Value, to: Value) {
        match self.slots.get_mut(&slot) {
            Some(FieldChange::Scalar { to: latest, .. }) => *latest = to,
            _ => {
                self.slots.insert(slot, FieldChange::Scalar { from, to });
            }
        }
    }

    pub fn record_nested(&mut self, slot: usize, from: Option<Child>, to: Option<Child>) {
        match self.slots.get_mut(&slot) {
            Some(FieldChange::Nested { to: latest, .. }) => *latest = to,
            _ => {
                self.slots.insert(slot, FieldChange::Nested { from, to });
            }
        }
    }
}

impl<V> ChangeLog<EntryChange<V>> {
    pub fn record(&mut self, slot: usize, key: &str, from: Option<V>, to: Option<V>) {
        match self.slots.get_mut(&slot) {
            Some(change) => change.to = to,
            None => {
                self.slots.insert(
                    slot,
                    EntryChange {
                        key: key.to_string(),
                        from,
                        to,
                    },
                );
            }
        }
    }
}
