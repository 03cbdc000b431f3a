//! The three things a mirrored nested field can hold.

use crate::node::MirrorNode;
use crate::node_map::MirrorNodeMap;
use crate::primitive_map::MirrorPrimitiveMap;
use std::sync::Arc;
use treesync_core::{Envelope, NestedKind, Result, Wire};

#[derive(Debug)]
pub enum MirrorChild {
    Node(MirrorNode),
    PrimitiveMap(MirrorPrimitiveMap),
    NodeMap(MirrorNodeMap),
}

impl MirrorChild {
    pub fn for_kind(kind: &NestedKind) -> Self {
        match kind {
            NestedKind::Node(schema) => MirrorChild::Node(MirrorNode::new(Arc::clone(schema))),
            NestedKind::PrimitiveMap => MirrorChild::PrimitiveMap(MirrorPrimitiveMap::new()),
            NestedKind::NodeMap(schema) => {
                MirrorChild::NodeMap(MirrorNodeMap::new(Arc::clone(schema)))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MirrorChild::Node(node) => format!("node<{}>", node.schema().name()),
            MirrorChild::PrimitiveMap(_) => "primitive map".to_string(),
            MirrorChild::NodeMap(map) => format!("node map<{}>", map.element_schema().name()),
        }
    }

    pub fn as_node(&self) -> Option<&MirrorNode> {
        match self {
            MirrorChild::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut MirrorNode> {
        match self {
            MirrorChild::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_primitive_map(&self) -> Option<&MirrorPrimitiveMap> {
        match self {
            MirrorChild::PrimitiveMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_primitive_map_mut(&mut self) -> Option<&mut MirrorPrimitiveMap> {
        match self {
            MirrorChild::PrimitiveMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node_map(&self) -> Option<&MirrorNodeMap> {
        match self {
            MirrorChild::NodeMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node_map_mut(&mut self) -> Option<&mut MirrorNodeMap> {
        match self {
            MirrorChild::NodeMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn complete_state(&self) -> Envelope {
        match self {
            MirrorChild::Node(node) => node.complete_state(),
            MirrorChild::PrimitiveMap(map) => map.complete_state(),
            MirrorChild::NodeMap(map) => map.complete_state(),
        }
    }

    pub(crate) fn load_complete(&mut self, items: &[Wire]) -> Result<()> {
        match self {
            MirrorChild::Node(node) => node.load_complete(items),
            MirrorChild::PrimitiveMap(map) => map.load_complete(items),
            MirrorChild::NodeMap(map) => map.load_complete(items),
        }
    }

    pub(crate) fn apply_changes(&mut self, items: &[Wire]) -> Result<()> {
        match self {
            MirrorChild::Node(node) => node.apply_changes(items),
            MirrorChild::PrimitiveMap(map) => map.apply_changes(items),
            MirrorChild::NodeMap(map) => map.apply_changes(items),
        }
    }
}
