//! Error types shared by the source, mirror and session layers.

use crate::schema::WireId;
use thiserror::Error;

/// Errors that can occur while registering schemas, mutating a source tree
/// or applying an envelope to a mirror.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Field `{field}` on schema {schema} is registered as both scalar and nested")]
    ConflictingField { schema: String, field: String },

    #[error("Field `{field}` is registered twice on schema {schema}")]
    DuplicateField { schema: String, field: String },

    #[error("Unknown field `{field}` on schema {schema}")]
    UnknownField { schema: String, field: String },

    #[error("Field `{field}` on schema {schema} is not a scalar field")]
    NotScalar { schema: String, field: String },

    #[error("Field `{field}` on schema {schema} is not a nested field")]
    NotNested { schema: String, field: String },

    #[error("Nested field `{field}` expects {expected}, found {found}")]
    ChildKindMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Node map holds {expected} entries, found {found}")]
    ElementSchemaMismatch { expected: String, found: String },

    #[error("Type mismatch on `{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Non-finite float written to `{0}`")]
    NonFiniteFloat(String),

    #[error("Unknown wire id {id} on schema {schema}")]
    UnknownWireId { schema: String, id: WireId },

    #[error("Unknown map entry id {0}")]
    UnknownEntryId(WireId),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Node is already attached to another parent")]
    AlreadyAttached,

    #[error("Attaching node under `{0}` would create a cycle")]
    Cycle(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        SyncError::MalformedEnvelope(reason.into())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
