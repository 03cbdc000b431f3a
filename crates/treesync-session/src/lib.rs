//! # treesync-session
//!
//! Drives the flush cycle between one source tree and any number of
//! mirrors:
//!
//! ```text
//! mutate ... -> Publisher::flush() -> Outgoing::encode() -> transport
//!                                                         -> Subscriber::receive_bytes()
//! ```
//!
//! The transport itself is left to the caller.
//!
//! ## Example
//!
//! ```rust
//! use treesync_core::Schema;
//! use treesync_mirror::MirrorNode;
//! use treesync_session::{Publisher, SessionConfig, Subscriber};
//! use treesync_source::Node;
//!
//! let schema = Schema::builder("Score").scalar("points", 0).build().unwrap();
//! let mut publisher = Publisher::new(Node::new(schema.clone()), SessionConfig::default());
//! let mut subscriber = Subscriber::new(MirrorNode::new(schema));
//! publisher.subscribe();
//!
//! publisher.root().set("points", 3).unwrap();
//! for out in publisher.flush() {
//!     subscriber.receive_bytes(&out.encode().unwrap()).unwrap();
//! }
//! assert_eq!(subscriber.mirror().get("points").unwrap().as_int(), Some(3));
//! ```

mod config;
mod publisher;
mod subscriber;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use publisher::{FlushStats, Outgoing, Publisher, SubscriberId};
pub use subscriber::Subscriber;
