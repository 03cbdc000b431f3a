//! Dynamic key -> node map.
//!
//! Entry ids follow the same counter discipline as [`PrimitiveMap`]. Each
//! entry node is attached to the map under its entry id, so edits made
//! inside an entry reach the map (and from there the map's own parent) once
//! per cycle.
//!
//! [`PrimitiveMap`]: crate::PrimitiveMap

use crate::change_log::{ChangeLog, EntryChange};
use crate::child::same_schema;
use crate::node::Node;
use crate::tracker::{is_self_or_ancestor, propagate, Parent, ParentLink, Tracker};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use treesync_core::{Envelope, MapOp, Result, Schema, SyncError, WireId};

pub(crate) struct NodeMapInner {
    element: Arc<Schema>,
    entries: BTreeMap<WireId, (String, Node)>,
    ids: HashMap<String, WireId>,
    next_id: WireId,
    changes: ChangeLog<EntryChange<Node>>,
    tracker: Tracker,
}

impl Parent for NodeMapInner {
    fn child_updated(&mut self, slot: WireId) -> Option<ParentLink> {
        let (key, node) = self.entries.get(&slot)?;
        if !self.changes.contains(slot as usize) {
            self.changes
                .record(slot as usize, key, Some(node.clone()), Some(node.clone()));
        }
        self.tracker.mark_dirty()
    }

    fn parent_node(&self) -> Option<Rc<RefCell<dyn Parent>>> {
        self.tracker.parent_node()
    }
}

/// Handle to a replicated key -> node map.
#[derive(Clone)]
pub struct NodeMap(Rc<RefCell<NodeMapInner>>);

impl fmt::Debug for NodeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("NodeMap")
            .field("element", &inner.element.name())
            .field("keys", &inner.ids.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NodeMap {
    /// An empty map whose entries must all use `element`.
    pub fn new(element: Arc<Schema>) -> Self {
        NodeMap(Rc::new(RefCell::new(NodeMapInner {
            element,
            entries: BTreeMap::new(),
            ids: HashMap::new(),
            next_id: 0,
            changes: ChangeLog::new(),
            tracker: Tracker::default(),
        })))
    }

    pub fn element_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.0.borrow().element)
    }

    pub fn get(&self, key: &str) -> Option<Node> {
        let inner = self.0.borrow();
        let id = inner.ids.get(key)?;
        inner.entries.get(id).map(|(_, node)| node.clone())
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

    /// Put `node` under `key`.
    ///
    /// Setting the instance already stored is a no-op. Storing a different
    /// instance under an existing key detaches the old one and is sent as a
    /// whole-state replacement. Returns the detached node, if any.
    pub fn set(&self, key: &str, node: Node) -> Result<Option<Node>> {
        let existing = {
            let inner = self.0.borrow();
            if !same_schema(&inner.element, &node.schema()) {
                return Err(SyncError::ElementSchemaMismatch {
                    expected: inner.element.name().to_string(),
                    found: node.schema().name().to_string(),
                });
            }
            match inner.ids.get(key).and_then(|id| inner.entries.get(id)) {
                Some((_, current)) if current.ptr_eq(&node) => return Ok(None),
                other => other.map(|(_, current)| current.clone()),
            }
        };

        if node.is_attached() {
            return Err(SyncError::AlreadyAttached);
        }
        let start: Rc<RefCell<dyn Parent>> = self.0.clone();
        if is_self_or_ancestor(node.addr(), start) {
            return Err(SyncError::Cycle(key.to_string()));
        }

        let hop = {
            let mut guard = self.0.borrow_mut();
            let inner = &mut *guard;
            let id = match inner.ids.get(key).copied() {
                Some(id) => id,
                None => {
                    let id = inner.next_id;
                    inner.next_id += 1;
                    inner.ids.insert(key.to_string(), id);
                    id
                }
            };
            if let Some(old) = &existing {
                old.detach();
            }
            node.attach(ParentLink::new(&self.0, id));
            inner.entries.insert(id, (key.to_string(), node.clone()));
            inner
                .changes
                .record(id as usize, key, existing.clone(), Some(node));
            inner.tracker.mark_dirty()
        };
        propagate(hop);
        tracing::trace!(key, replaced = existing.is_some(), "node map entry set");
        Ok(existing)
    }

    /// Remove `key`, detach its node and retire its id.
    pub fn delete(&self, key: &str) -> Option<Node> {
        let (removed, hop) = {
            let mut guard = self.0.borrow_mut();
            let inner = &mut *guard;
            let id = inner.ids.remove(key)?;
            let (_, removed) = inner.entries.remove(&id)?;
            removed.detach();
            inner
                .changes
                .record(id as usize, key, Some(removed.clone()), None);
            (removed, inner.tracker.mark_dirty())
        };
        propagate(hop);
        Some(removed)
    }

    /// `[1, count, key, id, state, ...]`
    pub fn complete_state(&self) -> Envelope {
        let entries: Vec<(WireId, String, Node)> = self
            .0
            .borrow()
            .entries
            .iter()
            .map(|(id, (key, node))| (*id, key.clone(), node.clone()))
            .collect();

        let mut envelope = Envelope::complete();
        envelope.push_count(entries.len());
        for (id, key, node) in entries {
            envelope.push_key(&key);
            envelope.push_id(id);
            envelope.push_envelope(node.complete_state());
        }
        envelope
    }

    /// Net changes in id order.
    ///
    /// An entry edited in place is sent as `UPDATE id delta` and skipped
    /// when its delta is empty; a swapped instance is sent whole as
    /// `REPLACE id state`.
    pub fn recent_changes(&self) -> Envelope {
        let inner = self.0.borrow();
        let mut envelope = Envelope::partial();
        for (slot, change) in inner.changes.iter() {
            let id = slot as WireId;
            match (&change.from, &change.to) {
                (None, None) => {}
                (Some(_), None) => {
                    envelope.push_op(MapOp::Remove);
                    envelope.push_id(id);
                }
                (None, Some(node)) => {
                    envelope.push_op(MapOp::Add);
                    envelope.push_key(&change.key);
                    envelope.push_id(id);
                    envelope.push_envelope(node.complete_state());
                }
                (Some(before), Some(after)) if before.ptr_eq(after) => {
                    let nested = after.recent_changes();
                    if !nested.is_empty() {
                        envelope.push_op(MapOp::Update);
                        envelope.push_id(id);
                        envelope.push_envelope(nested);
                    }
                }
                (Some(_), Some(node)) => {
                    envelope.push_op(MapOp::Replace);
                    envelope.push_id(id);
                    envelope.push_envelope(node.complete_state());
                }
            }
        }
        envelope
    }

    /// Clear the change log here and in every live entry.
    pub fn reset_recent_changes(&self) {
        let nodes: Vec<Node> = {
            let mut inner = self.0.borrow_mut();
            inner.changes.clear();
            inner.tracker.reset();
            inner.entries.values().map(|(_, node)| node.clone()).collect()
        };
        for node in nodes {
            node.reset_recent_changes();
        }
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

    pub fn ptr_eq(&self, other: &NodeMap) -> bool {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn simple() -> Arc<Schema> {
        Schema::builder("Simple")
            .scalar("name", "Some Name")
            .scalar("id", 99)
            .build()
            .unwrap()
    }

    fn other() -> Arc<Schema> {
        Schema::builder("Other").scalar("x", 0).build().unwrap()
    }

    #[test]
    fn test_rejects_foreign_element_schema() {
        let map = NodeMap::new(simple());
        let err = map.set("a", Node::new(other())).unwrap_err();
        assert!(matches!(err, SyncError::ElementSchemaMismatch { .. }));
        assert!(map.is_empty());
    }

    #[test]
    fn test_setting_same_instance_is_a_no_op() {
        let map = NodeMap::new(simple());
        let node = Node::new(simple());
        map.set("a", node.clone()).unwrap();
        map.reset_recent_changes();

        assert!(map.set("a", node).unwrap().is_none());
        assert!(map.recent_changes().is_empty());
    }

    #[test]
    fn test_replace_sends_complete_state() {
        let schema = simple();
        let map = NodeMap::new(Arc::clone(&schema));
        map.set("a", Node::new(Arc::clone(&schema))).unwrap();
        map.reset_recent_changes();

        let replacement = Node::new(Arc::clone(&schema));
        replacement.set("id", 7).unwrap();
        let old = map.set("a", replacement).unwrap().unwrap();

        assert!(!old.is_attached());
        assert_eq!(
            map.recent_changes().to_json().unwrap(),
            r#"[2,3,0,[1,1,"Some Name",0,7]]"#
        );
    }

    #[test]
    fn test_in_place_edit_sends_update() {
        let schema = simple();
        let map = NodeMap::new(Arc::clone(&schema));
        let node = Node::new(schema);
        map.set("a", node.clone()).unwrap();
        map.reset_recent_changes();

        node.set("id", 5).unwrap();
        assert_eq!(map.recent_changes().to_json().unwrap(), r#"[2,2,0,[2,0,5]]"#);

        node.set("id", 99).unwrap();
        assert!(map.recent_changes().is_empty());
    }

    #[test]
    fn test_delete_detaches_entry() {
        let schema = simple();
        let map = NodeMap::new(Arc::clone(&schema));
        map.set("a", Node::new(schema)).unwrap();
        map.reset_recent_changes();

        let removed = map.delete("a").unwrap();
        assert!(!removed.is_attached());
        assert_eq!(map.recent_changes().to_json().unwrap(), "[2,1,0]");

        map.reset_recent_changes();
        removed.set("id", 1).unwrap();
        assert!(!map.has_changes());
    }

    #[test]
    fn test_node_in_another_map_is_rejected() {
        let schema = simple();
        let first = NodeMap::new(Arc::clone(&schema));
        let second = NodeMap::new(Arc::clone(&schema));
        let node = Node::new(schema);

        first.set("a", node.clone()).unwrap();
        assert!(matches!(
            second.set("a", node),
            Err(SyncError::AlreadyAttached)
        ));
    }
}
