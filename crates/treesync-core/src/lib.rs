//! # treesync-core
//!
//! Shared vocabulary of the treesync replication engine:
//!
//! - [`Value`]: the primitives a scalar field or primitive map can hold
//! - [`Schema`] / [`SchemaBuilder`]: per-type replicated field sets with
//!   their wire ids and declaration order
//! - [`SchemaRegistry`] / [`Describe`]: lazily built, process-wide schema cache
//! - [`Envelope`] / [`WireReader`]: the tagged snapshot/delta encoding
//! - [`SyncError`]: every error the engine reports
//!
//! ## Example
//!
//! ```rust
//! use treesync_core::Schema;
//!
//! let simple = Schema::builder("Simple")
//!     .scalar("name", "")
//!     .scalar("id", 0)
//!     .build()
//!     .unwrap();
//!
//! // Wire ids follow alphabetical rank, not declaration order.
//! assert_eq!(simple.wire_id("id"), Some(0));
//! assert_eq!(simple.wire_id("name"), Some(1));
//! assert_eq!(simple.declaration_order("name"), Some(0));
//! ```

pub mod error;
pub mod registry;
pub mod schema;
pub mod value;
pub mod wire;

pub use error::{Result, SyncError};
pub use registry::{schema_of, Describe, SchemaRegistry};
pub use schema::{Field, FieldKind, NestedKind, Schema, SchemaBuilder, WireId};
pub use value::Value;
pub use wire::{ChangeKind, Envelope, MapOp, Payload, Wire, WireReader};
