//! The three things a nested field can hold.

use crate::node::Node;
use crate::node_map::NodeMap;
use crate::primitive_map::PrimitiveMap;
use crate::tracker::ParentLink;
use std::sync::Arc;
use treesync_core::{Envelope, NestedKind, Result, Schema, SyncError};

/// Handle to the child held by a nested field.
#[derive(Clone, Debug)]
pub enum Child {
    Node(Node),
    PrimitiveMap(PrimitiveMap),
    NodeMap(NodeMap),
}

pub(crate) fn same_schema(a: &Arc<Schema>, b: &Arc<Schema>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

impl Child {
    /// A fresh child for a nested field of the given kind.
    pub fn for_kind(kind: &NestedKind) -> Self {
        match kind {
            NestedKind::Node(schema) => Child::Node(Node::new(Arc::clone(schema))),
            NestedKind::PrimitiveMap => Child::PrimitiveMap(PrimitiveMap::new()),
            NestedKind::NodeMap(schema) => Child::NodeMap(NodeMap::new(Arc::clone(schema))),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Child::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_primitive_map(&self) -> Option<&PrimitiveMap> {
        match self {
            Child::PrimitiveMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node_map(&self) -> Option<&NodeMap> {
        match self {
            Child::NodeMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Child::Node(node) => format!("node<{}>", node.schema().name()),
            Child::PrimitiveMap(_) => "primitive map".to_string(),
            Child::NodeMap(map) => format!("node map<{}>", map.element_schema().name()),
        }
    }

    /// Same instance, not merely equal contents.
    pub fn ptr_eq(&self, other: &Child) -> bool {
        match (self, other) {
            (Child::Node(a), Child::Node(b)) => a.ptr_eq(b),
            (Child::PrimitiveMap(a), Child::PrimitiveMap(b)) => a.ptr_eq(b),
            (Child::NodeMap(a), Child::NodeMap(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        match self {
            Child::Node(node) => node.is_attached(),
            Child::PrimitiveMap(map) => map.is_attached(),
            Child::NodeMap(map) => map.is_attached(),
        }
    }

    pub fn complete_state(&self) -> Envelope {
        match self {
            Child::Node(node) => node.complete_state(),
            Child::PrimitiveMap(map) => map.complete_state(),
            Child::NodeMap(map) => map.complete_state(),
        }
    }

    pub fn recent_changes(&self) -> Envelope {
        match self {
            Child::Node(node) => node.recent_changes(),
            Child::PrimitiveMap(map) => map.recent_changes(),
            Child::NodeMap(map) => map.recent_changes(),
        }
    }

    pub fn reset_recent_changes(&self) {
        match self {
            Child::Node(node) => node.reset_recent_changes(),
            Child::PrimitiveMap(map) => map.reset_recent_changes(),
            Child::NodeMap(map) => map.reset_recent_changes(),
        }
    }

    /// Fails unless this child fits a nested field of kind `expected`.
    pub(crate) fn check_kind(&self, field: &str, expected: &NestedKind) -> Result<()> {
        let fits = match (expected, self) {
            (NestedKind::Node(schema), Child::Node(node)) => same_schema(schema, &node.schema()),
            (NestedKind::PrimitiveMap, Child::PrimitiveMap(_)) => true,
            (NestedKind::NodeMap(schema), Child::NodeMap(map)) => {
                same_schema(schema, &map.element_schema())
            }
            _ => false,
        };
        if fits {
            Ok(())
        } else {
            Err(SyncError::ChildKindMismatch {
                field: field.to_string(),
                expected: expected.describe(),
                found: self.describe(),
            })
        }
    }

    pub(crate) fn attach(&self, link: ParentLink) {
        match self {
            Child::Node(node) => node.attach(link),
            Child::PrimitiveMap(map) => map.attach(link),
            Child::NodeMap(map) => map.attach(link),
        }
    }

    pub(crate) fn detach(&self) {
        match self {
            Child::Node(node) => node.detach(),
            Child::PrimitiveMap(map) => map.detach(),
            Child::NodeMap(map) => map.detach(),
        }
    }

    /// Address used for cycle detection.
    pub(crate) fn addr(&self) -> *const () {
        match self {
            Child::Node(node) => node.addr(),
            Child::PrimitiveMap(map) => map.addr(),
            Child::NodeMap(map) => map.addr(),
        }
    }
}

impl From<Node> for Child {
    fn from(node: Node) -> Self {
        Child::Node(node)
    }
}

impl From<PrimitiveMap> for Child {
    fn from(map: PrimitiveMap) -> Self {
        Child::PrimitiveMap(map)
    }
}

impl From<NodeMap> for Child {
    fn from(map: NodeMap) -> Self {
        Child::NodeMap(map)
    }
}
