//! Dynamic key -> primitive map.
//!
//! Keys get wire ids from a per-map counter in insertion order. An id is
//! never reused: deleting a key retires its id, and setting the key again
//! later hands out a fresh one.

use crate::change_log::{ChangeLog, EntryChange};
use crate::tracker::{propagate, ParentLink, Tracker};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use treesync_core::{Envelope, MapOp, Result, Value, WireId};

#[derive(Default)]
struct PrimitiveMapInner {
    /// id -> (key, value), live entries only
    entries: BTreeMap<WireId, (String, Value)>,
    ids: HashMap<String, WireId>,
    next_id: WireId,
    changes: ChangeLog<EntryChange<Value>>,
    tracker: Tracker,
}

/// Handle to a replicated key -> primitive map.
#[derive(Clone, Default)]
pub struct PrimitiveMap(Rc<RefCell<PrimitiveMapInner>>);

impl fmt::Debug for PrimitiveMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_map()
            .entries(inner.entries.values().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl PrimitiveMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let inner = self.0.borrow();
        let id = inner.ids.get(key)?;
        inner.entries.get(id).map(|(_, value)| value.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().ids.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().entries.is_empty()
    }

    /// Live keys in id order.
    pub fn keys(&self) -> Vec<String> {
        self.0
            .borrow()
            .entries
            .values()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Live entries in id order.
    pub fn iter(&self) -> Vec<(String, Value)> {
        self.0.borrow().entries.values().cloned().collect()
    }

    /// Insert or update `key`. Returns the previous value.
    ///
    /// NaN and infinite floats are rejected with `NonFiniteFloat`.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let value = value.into().ensure_finite(key)?;
        let (previous, hop) = {
            let mut guard = self.0.borrow_mut();
            let inner = &mut *guard;
            match inner.ids.get(key).copied() {
                Some(id) => {
                    let Some(entry) = inner.entries.get_mut(&id) else {
                        return Ok(None);
                    };
                    if entry.1 == value {
                        return Ok(Some(value));
                    }
                    let previous = std::mem::replace(&mut entry.1, value.clone());
                    inner
                        .changes
                        .record(id as usize, key, Some(previous.clone()), Some(value));
                    (Some(previous), inner.tracker.mark_dirty())
                }
                None => {
                    let id = inner.next_id;
                    inner.next_id += 1;
                    inner.ids.insert(key.to_string(), id);
                    inner
                        .entries
                        .insert(id, (key.to_string(), value.clone()));
                    inner.changes.record(id as usize, key, None, Some(value));
                    (None, inner.tracker.mark_dirty())
                }
            }
        };
        propagate(hop);
        Ok(previous)
    }

    /// Remove `key` and retire its id. Removing a missing key does nothing.
    pub fn delete(&self, key: &str) -> Option<Value> {
        let (removed, hop) = {
            let mut guard = self.0.borrow_mut();
            let inner = &mut *guard;
            let id = inner.ids.remove(key)?;
            let (_, removed) = inner.entries.remove(&id)?;
            inner
                .changes
                .record(id as usize, key, Some(removed.clone()), None);
            (removed, inner.tracker.mark_dirty())
        };
        propagate(hop);
        Some(removed)
    }

    /// `[1, count, key, id, value, ...]`
    pub fn complete_state(&self) -> Envelope {
        let inner = self.0.borrow();
        let mut envelope = Envelope::complete();
        envelope.push_count(inner.entries.len());
        for (id, (key, value)) in inner.entries.iter() {
            envelope.push_key(key);
            envelope.push_id(*id);
            envelope.push_value(value.clone());
        }
        envelope
    }

    /// Net changes in id order. An entry added and deleted in the same cycle
    /// is not sent at all.
    pub fn recent_changes(&self) -> Envelope {
        let inner = self.0.borrow();
        let mut envelope = Envelope::partial();
        for (slot, change) in inner.changes.iter() {
            let id = slot as WireId;
            match (&change.from, &change.to) {
                (from, to) if from == to => {}
                (_, None) => {
                    envelope.push_op(MapOp::Remove);
                    envelope.push_id(id);
                }
                (None, Some(value)) => {
                    envelope.push_op(MapOp::Add);
                    envelope.push_key(&change.key);
                    envelope.push_id(id);
                    envelope.push_value(value.clone());
                }
                (Some(_), Some(value)) => {
                    envelope.push_op(MapOp::Update);
                    envelope.push_id(id);
                    envelope.push_value(value.clone());
                }
            }
        }
        envelope
    }

    pub fn reset_recent_changes(&self) {
        let mut inner = self.0.borrow_mut();
        inner.changes.clear();
        inner.tracker.reset();
    }

    pub fn flush(&self) -> Envelope {
        let envelope = self.recent_changes();
        self.reset_recent_changes();
        envelope
    }

    pub fn has_changes(&self) -> bool {
        !self.0.borrow().changes.is_empty()
    }

    pub fn is_attached(&self) -> bool {
        self.0.borrow().tracker.is_attached()
    }

    pub fn ptr_eq(&self, other: &PrimitiveMap) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn attach(&self, link: ParentLink) {
        self.0.borrow_mut().tracker.attach(link);
    }

    pub(crate) fn detach(&self) {
        self.0.borrow_mut().tracker.detach();
    }

    pub(crate) fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}
