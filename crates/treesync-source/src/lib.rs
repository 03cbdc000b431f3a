//! # treesync-source
//!
//! The authority side of the treesync replication engine: a mutable tree
//! whose every effective write is tracked, plus the snapshot and delta
//! encoders that feed mirrors.
//!
//! - [`Node`]: an instance of a registered [`Schema`](treesync_core::Schema)
//! - [`PrimitiveMap`]: dynamic key -> primitive entries
//! - [`NodeMap`]: dynamic key -> node entries
//! - [`Child`]: whichever of the three a nested field holds
//!
//! All handles are single-threaded (`Rc`-based). A tree must be mutated
//! and flushed from one thread.
//!
//! ## Example
//!
//! ```rust
//! use treesync_core::Schema;
//! use treesync_source::Node;
//!
//! let aiming = Schema::builder("Aiming")
//!     .scalar("angle", 0.0)
//!     .build()
//!     .unwrap();
//! let hero = Schema::builder("Hero")
//!     .scalar("name", "")
//!     .node("aiming", aiming)
//!     .build()
//!     .unwrap();
//!
//! let root = Node::new(hero);
//! root.flush();
//!
//! root.node("aiming").unwrap().set("angle", 0.5).unwrap();
//! assert_eq!(root.flush().to_json().unwrap(), "[2,0,[2,0,0.5]]");
//! assert!(root.flush().is_empty());
//! ```

mod change_log;
mod child;
mod node;
mod node_map;
mod primitive_map;
mod tracker;

pub use child::Child;
pub use node::Node;
pub use node_map::NodeMap;
pub use primitive_map::PrimitiveMap;
