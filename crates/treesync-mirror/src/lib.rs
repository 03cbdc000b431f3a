//! # treesync-mirror
//!
//! The observer side of the treesync replication engine. A mirror is a
//! plain owned tree built from the same schemas as the source; it applies
//! complete states and deltas and reports what changed through listeners:
//!
//! - [`MirrorNode::on`]: a scalar field was assigned
//! - [`MirrorPrimitiveMap`] / [`MirrorNodeMap`]: `on_add`, `on_update`,
//!   `on_remove`
//!
//! Listeners fire while the envelope is being applied, in envelope order,
//! which is the source's declaration order for node fields and entry-id
//! order for maps.
//!
//! Applying an envelope is not transactional. When an error is returned,
//! every pair before the failing one has already been applied; recover by
//! loading a fresh complete state.
//!
//! ## Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use treesync_core::{Envelope, Schema};
//! use treesync_mirror::MirrorNode;
//!
//! let schema = Schema::builder("Simple")
//!     .scalar("name", "")
//!     .scalar("id", 0)
//!     .build()
//!     .unwrap();
//!
//! let mut mirror = MirrorNode::new(schema);
//! let names = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&names);
//! mirror
//!     .on("name", move |v| sink.borrow_mut().push(v.clone()))
//!     .unwrap();
//!
//! mirror
//!     .apply_recent_changes(&Envelope::from_json(r#"[2,1,"Ann"]"#).unwrap())
//!     .unwrap();
//! assert_eq!(names.borrow().len(), 1);
//! assert_eq!(mirror.get("name").unwrap().as_str(), Some("Ann"));
//! ```

mod child;
mod node;
mod node_map;
mod primitive_map;

pub use child::MirrorChild;
pub use node::MirrorNode;
pub use node_map::MirrorNodeMap;
pub use primitive_map::MirrorPrimitiveMap;

use treesync_core::SyncError;

/// Log a rejected envelope before handing the error back.
pub(crate) fn rejected(context: &str, err: SyncError) -> SyncError {
    tracing::warn!(context, error = %err, "rejected envelope");
    err
}
