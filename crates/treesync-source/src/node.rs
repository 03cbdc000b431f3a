//! Source-side tree node.
//!
//! A [`Node`] is a cheap, clonable handle to one instance of a registered
//! schema. Scalar fields live under their wire id; nested fields hold at
//! most one [`Child`]. Every effective write is recorded in the node's
//! change log under the field's declaration order and reported to the
//! parent once per flush cycle.
//!
//! The flush cycle is:
//!
//! ```text
//! mutate ... -> recent_changes() -> transmit -> reset_recent_changes()
//! ```
//!
//! [`Node::flush`] performs the middle two steps in one call so nothing can
//! be recorded between reading and clearing the log.

use crate::change_log::{ChangeLog, FieldChange};
use crate::child::Child;
use crate::node_map::NodeMap;
use crate::primitive_map::PrimitiveMap;
use crate::tracker::{is_self_or_ancestor, propagate, Parent, ParentLink, Tracker};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use treesync_core::{
    schema_of, Describe, Envelope, FieldKind, Result, Schema, SyncError, Value, WireId,
};

pub(crate) struct NodeInner {
    schema: Arc<Schema>,
    scalars: BTreeMap<WireId, Value>,
    children: BTreeMap<WireId, Child>,
    changes: ChangeLog<FieldChange>,
    tracker: Tracker,
}

impl Parent for NodeInner {
    fn child_updated(&mut self, slot: WireId) -> Option<ParentLink> {
        let order = self.schema.field_by_wire(slot)?.order();
        if !self.changes.contains(order) {
            let current = self.children.get(&slot).cloned();
            self.changes.record_nested(order, current.clone(), current);
        }
        self.tracker.mark_dirty()
    }

    fn parent_node(&self) -> Option<Rc<RefCell<dyn Parent>>> {
        self.tracker.parent_node()
    }
}

/// Handle to a replicated node on the source side.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeInner>>);

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Node")
            .field("schema", &inner.schema.name())
            .field("scalars", &inner.scalars)
            .field("children", &inner.children.len())
            .finish()
    }
}

impl Node {
    /// Create a node with every scalar at its default and every nested
    /// field holding a fresh child.
    pub fn new(schema: Arc<Schema>) -> Self {
        let mut scalars = BTreeMap::new();
        let mut children = BTreeMap::new();
        for field in schema.fields() {
            match field.kind() {
                FieldKind::Scalar(default) => {
                    scalars.insert(field.wire_id(), default.clone());
                }
                FieldKind::Nested(kind) => {
                    children.insert(field.wire_id(), Child::for_kind(kind));
                }
            }
        }

        let node = Node(Rc::new(RefCell::new(NodeInner {
            schema,
            scalars,
            children,
            changes: ChangeLog::new(),
            tracker: Tracker::default(),
        })));

        for (id, child) in node.0.borrow().children.iter() {
            child.attach(ParentLink::new(&node.0, *id));
        }
        node
    }

    /// Create a node of a registered type.
    pub fn of<T: Describe>() -> Result<Self> {
        Ok(Self::new(schema_of::<T>()?))
    }

    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.0.borrow().schema)
    }

    pub fn get(&self, field: &str) -> Result<Value> {
        let inner = self.0.borrow();
        let id = inner.schema.require_scalar(field)?.wire_id();
        inner
            .scalars
            .get(&id)
            .cloned()
            .ok_or_else(|| SyncError::NotScalar {
                schema: inner.schema.name().to_string(),
                field: field.to_string(),
            })
    }

    /// Write a scalar field. Writing the current value records nothing.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        let hop = {
            let mut inner = self.0.borrow_mut();
            let schema = Arc::clone(&inner.schema);
            let spec = schema.require_scalar(field)?;
            let template = spec.default_value().ok_or_else(|| SyncError::NotScalar {
                schema: schema.name().to_string(),
                field: field.to_string(),
            })?;
            let value = value.into().conform_to(template, field)?;

            let previous = inner.scalars.insert(spec.wire_id(), value.clone());
            let from = previous.unwrap_or_else(|| template.clone());
            if from == value {
                return Ok(());
            }
            inner.changes.record_scalar(spec.order(), from, value);
            inner.tracker.mark_dirty()
        };
        propagate(hop);
        Ok(())
    }

    /// The child currently held by a nested field, if any.
    pub fn child(&self, field: &str) -> Result<Option<Child>> {
        let inner = self.0.borrow();
        let id = inner.schema.require_nested(field)?.wire_id();
        Ok(inner.children.get(&id).cloned())
    }

    pub fn node(&self, field: &str) -> Result<Node> {
        self.typed_child(field, "node", |child| child.as_node().cloned())
    }

    pub fn primitive_map(&self, field: &str) -> Result<PrimitiveMap> {
        self.typed_child(field, "primitive map", |child| {
            child.as_primitive_map().cloned()
        })
    }

    pub fn node_map(&self, field: &str) -> Result<NodeMap> {
        self.typed_child(field, "node map", |child| child.as_node_map().cloned())
    }

    fn typed_child<T>(
        &self,
        field: &str,
        expected: &str,
        pick: impl FnOnce(&Child) -> Option<T>,
    ) -> Result<T> {
        let child = self.child(field)?;
        let found = child
            .as_ref()
            .map_or_else(|| "nothing".to_string(), Child::describe);
        child
            .as_ref()
            .and_then(pick)
            .ok_or_else(|| SyncError::ChildKindMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                found,
            })
    }

    /// Put `child` into a nested field, detaching whatever was there.
    ///
    /// The slot keeps its wire id. Returns the detached child.
    pub fn set_child(&self, field: &str, child: impl Into<Child>) -> Result<Option<Child>> {
        self.replace_child(field, Some(child.into()))
    }

    /// Empty a nested field. The next delta carries `null` for it.
    pub fn clear_child(&self, field: &str) -> Result<Option<Child>> {
        self.replace_child(field, None)
    }

    fn replace_child(&self, field: &str, next: Option<Child>) -> Result<Option<Child>> {
        let (id, order) = {
            let inner = self.0.borrow();
            let spec = inner.schema.require_nested(field)?;
            if let (Some(child), Some(kind)) = (&next, spec.nested_kind()) {
                child.check_kind(field, kind)?;
            }
            let current = inner.children.get(&spec.wire_id());
            let unchanged = match (current, &next) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return Ok(current.cloned());
            }
            (spec.wire_id(), spec.order())
        };

        if let Some(child) = &next {
            if child.is_attached() {
                return Err(SyncError::AlreadyAttached);
            }
            let start: Rc<RefCell<dyn Parent>> = self.0.clone();
            if is_self_or_ancestor(child.addr(), start) {
                return Err(SyncError::Cycle(field.to_string()));
            }
        }

        let (previous, hop) = {
            let mut inner = self.0.borrow_mut();
            let previous = match &next {
                Some(child) => inner.children.insert(id, child.clone()),
                None => inner.children.remove(&id),
            };
            if let Some(old) = &previous {
                old.detach();
            }
            if let Some(child) = &next {
                child.attach(ParentLink::new(&self.0, id));
            }
            inner.changes.record_nested(order, previous.clone(), next);
            (previous, inner.tracker.mark_dirty())
        };
        propagate(hop);
        Ok(previous)
    }

    /// Snapshot of every field, in declaration order. Absent nested fields
    /// are omitted.
    pub fn complete_state(&self) -> Envelope {
        let inner = self.0.borrow();
        let mut envelope = Envelope::complete();
        for field in inner.schema.fields() {
            let id = field.wire_id();
            if let Some(value) = inner.scalars.get(&id) {
                envelope.push_id(id);
                envelope.push_value(value.clone());
            } else if let Some(child) = inner.children.get(&id) {
                envelope.push_id(id);
                envelope.push_envelope(child.complete_state());
            }
        }
        envelope
    }

    /// Delta of everything changed since the last reset.
    ///
    /// A replaced child is sent whole; a child changed in place is sent as
    /// its own delta, and left out entirely when that delta is empty.
    pub fn recent_changes(&self) -> Envelope {
        let inner = self.0.borrow();
        let mut envelope = Envelope::partial();
        for (order, change) in inner.changes.iter() {
            let Some(field) = inner.schema.field_at(order) else {
                continue;
            };
            let id = field.wire_id();
            match change {
                FieldChange::Scalar { from, to } => {
                    if from != to {
                        envelope.push_id(id);
                        envelope.push_value(to.clone());
                    }
                }
                FieldChange::Nested { from, to } => match (from, to) {
                    (Some(before), Some(after)) if before.ptr_eq(after) => {
                        let nested = after.recent_changes();
                        if !nested.is_empty() {
                            envelope.push_id(id);
                            envelope.push_envelope(nested);
                        }
                    }
                    (_, Some(after)) => {
                        envelope.push_id(id);
                        envelope.push_envelope(after.complete_state());
                    }
                    (Some(_), None) => {
                        envelope.push_id(id);
                        envelope.push_absent();
                    }
                    (None, None) => {}
                },
            }
        }
        envelope
    }

    /// Clear the change log here and in every attached descendant.
    pub fn reset_recent_changes(&self) {
        let children: Vec<Child> = {
            let mut inner = self.0.borrow_mut();
            inner.changes.clear();
            inner.tracker.reset();
            inner.children.values().cloned().collect()
        };
        for child in children {
            child.reset_recent_changes();
        }
    }

    /// `recent_changes()` followed by `reset_recent_changes()`.
    pub fn flush(&self) -> Envelope {
        let envelope = self.recent_changes();
        self.reset_recent_changes();
        tracing::debug!(
            schema = %self.0.borrow().schema.name(),
            empty = envelope.is_empty(),
            "flushed recent changes"
        );
        envelope
    }

    pub fn has_changes(&self) -> bool {
        !self.0.borrow().changes.is_empty()
    }

    /// False once the node has been replaced or removed from its parent.
    /// Writes to a detached node are still recorded locally but never reach
    /// a parent.
    pub fn is_attached(&self) -> bool {
        self.0.borrow().tracker.is_attached()
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
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
