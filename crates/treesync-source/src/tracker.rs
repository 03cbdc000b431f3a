//! Upward dirtiness propagation.
//!
//! A child reaches its parent only through a [`ParentLink`]: a `Weak`
//! pointer plus the wire id of the slot holding the child. Ownership runs
//! strictly downward through the parent's slots, so detaching a child just
//! drops its link.
//!
//! Every mutation first records the change locally, then asks the node's
//! [`Tracker`] for the next hop. The tracker hands out its link at most once
//! per flush cycle; [`propagate`] walks the hops iteratively, borrowing one
//! node at a time.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use treesync_core::WireId;

/// A node that can hold tracked children.
pub(crate) trait Parent {
    /// The child in `slot` changed internally. Returns the next hop when
    /// this node has not yet reported to its own parent this cycle.
    fn child_updated(&mut self, slot: WireId) -> Option<ParentLink>;

    fn parent_node(&self) -> Option<Rc<RefCell<dyn Parent>>>;
}

#[derive(Clone)]
pub(crate) struct ParentLink {
    node: Weak<RefCell<dyn Parent>>,
    slot: WireId,
}

impl ParentLink {
    pub fn new<P: Parent + 'static>(parent: &Rc<RefCell<P>>, slot: WireId) -> Self {
        let node = Rc::downgrade(parent);
        let node: Weak<RefCell<dyn Parent>> = node;
        Self { node, slot }
    }
}

#[derive(Default)]
pub(crate) struct Tracker {
    parent: Option<ParentLink>,
    reported: bool,
}

impl Tracker {
    pub fn attach(&mut self, link: ParentLink) {
        self.parent = Some(link);
    }

    pub fn detach(&mut self) {
        self.parent = None;
    }

    /// Attached to a parent that is still alive.
    pub fn is_attached(&self) -> bool {
        self.parent
            .as_ref()
            .is_some_and(|link| link.node.strong_count() > 0)
    }

    pub fn parent_node(&self) -> Option<Rc<RefCell<dyn Parent>>> {
        self.parent.as_ref().and_then(|link| link.node.upgrade())
    }

    /// Called after a local change was recorded.
    pub fn mark_dirty(&mut self) -> Option<ParentLink> {
        if self.reported {
            return None;
        }
        let link = self.parent.clone()?;
        self.reported = true;
        Some(link)
    }

    pub fn reset(&mut self) {
        self.reported = false;
    }
}

/// Notify ancestors, one hop at a time, until one has already reported.
pub(crate) fn propagate(mut hop: Option<ParentLink>) {
    while let Some(link) = hop.take() {
        let Some(parent) = link.node.upgrade() else {
            break;
        };
        tracing::trace!(slot = link.slot, "propagating change to parent");
        hop = parent.borrow_mut().child_updated(link.slot);
    }
}

/// Whether `candidate` is `start` or one of its ancestors.
pub(crate) fn is_self_or_ancestor(candidate: *const (), start: Rc<RefCell<dyn Parent>>) -> bool {
    let mut current = Some(start);
    while let Some(node) = current {
        if Rc::as_ptr(&node) as *const () == candidate {
            return true;
        }
        current = node.borrow().parent_node();
    }
    false
}
