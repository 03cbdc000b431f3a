//! The wire envelope produced by source nodes and consumed by mirrors.
//!
//! An envelope is a flat, ordered sequence whose first element is a tag:
//!
//! ```text
//! COMPLETE (1):  node         -> id, payload, id, payload, ...
//!                primitive map -> count, key, id, value, ...
//!                node map      -> count, key, id, state, ...
//! PARTIAL (2):   node         -> id, payload, ...   (payload = value | envelope | null)
//!                maps         -> opcode, operands..., opcode, operands...
//! ```
//!
//! Field names never travel; both sides resolve wire ids through their own
//! schema. The sequence is shape-only, so decoding it needs the receiving
//! node's schema as context.

use crate::error::{Result, SyncError};
use crate::schema::WireId;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Leading tag of every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Complete = 1,
    Partial = 2,
}

impl ChangeKind {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ChangeKind::Complete),
            2 => Some(ChangeKind::Partial),
            _ => None,
        }
    }
}

/// Map delta instruction.
///
/// Operand shapes:
/// - `ADD key id state`
/// - `REMOVE id`
/// - `UPDATE id value-or-envelope`
/// - `REPLACE id state` (node maps only)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapOp {
    Add = 0,
    Remove = 1,
    Update = 2,
    Replace = 3,
}

impl MapOp {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MapOp::Add),
            1 => Some(MapOp::Remove),
            2 => Some(MapOp::Update),
            3 => Some(MapOp::Replace),
            _ => None,
        }
    }
}

/// One element of an envelope.
///
/// `Absent` marks a nested slot that was cleared during the cycle and is
/// carried as JSON `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Wire {
    Absent,
    Value(Value),
    Seq(Vec<Wire>),
}

impl Wire {
    fn int(i: i64) -> Self {
        Wire::Value(Value::Int(i))
    }

    fn describe(&self) -> &'static str {
        match self {
            Wire::Absent => "null",
            Wire::Value(v) => v.kind(),
            Wire::Seq(_) => "sequence",
        }
    }
}

/// A complete snapshot or a partial delta of one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Vec<Wire>);

impl Envelope {
    pub fn new(kind: ChangeKind) -> Self {
        Self(vec![Wire::int(kind.code())])
    }

    pub fn complete() -> Self {
        Self::new(ChangeKind::Complete)
    }

    pub fn partial() -> Self {
        Self::new(ChangeKind::Partial)
    }

    /// Wrap a raw sequence without validating it. Validation happens when
    /// the envelope is read.
    pub fn from_wire(items: Vec<Wire>) -> Self {
        Self(items)
    }

    pub fn kind(&self) -> Result<ChangeKind> {
        read_tag(&self.0)
    }

    /// True when nothing follows the tag.
    pub fn is_empty(&self) -> bool {
        self.0.len() <= 1
    }

    pub fn as_slice(&self) -> &[Wire] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Wire> {
        self.0
    }

    pub fn push_id(&mut self, id: WireId) {
        self.0.push(Wire::int(id as i64));
    }

    pub fn push_count(&mut self, count: usize) {
        self.0.push(Wire::int(count as i64));
    }

    pub fn push_op(&mut self, op: MapOp) {
        self.0.push(Wire::int(op.code()));
    }

    pub fn push_key(&mut self, key: &str) {
        self.0.push(Wire::Value(Value::Text(key.to_string())));
    }

    pub fn push_value(&mut self, value: Value) {
        self.0.push(Wire::Value(value));
    }

    pub fn push_absent(&mut self) {
        self.0.push(Wire::Absent);
    }

    pub fn push_envelope(&mut self, nested: Envelope) {
        self.0.push(Wire::Seq(nested.0));
    }

    /// Open a reader positioned just after the tag.
    pub fn reader(&self) -> Result<(ChangeKind, WireReader<'_>)> {
        WireReader::open(&self.0)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn read_tag(items: &[Wire]) -> Result<ChangeKind> {
    match items.first() {
        Some(Wire::Value(Value::Int(code))) => ChangeKind::from_code(*code)
            .ok_or_else(|| SyncError::malformed(format!("unknown tag {}", code))),
        Some(other) => Err(SyncError::malformed(format!(
            "expected tag, found {}",
            other.describe()
        ))),
        None => Err(SyncError::malformed("missing tag")),
    }
}

/// Payload following a wire id in a node envelope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Payload<'a> {
    Absent,
    Value(&'a Value),
    Nested(&'a [Wire]),
}

/// Cursor over the body of an envelope.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
    items: &'a [Wire],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Validate the tag of `items` and position the cursor after it.
    pub fn open(items: &'a [Wire]) -> Result<(ChangeKind, Self)> {
        let kind = read_tag(items)?;
        Ok((kind, Self { items, pos: 1 }))
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.items.len()
    }

    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.pos)
    }

    fn next(&mut self, expected: &str) -> Result<&'a Wire> {
        let item = self.items.get(self.pos).ok_or_else(|| {
            SyncError::malformed(format!("truncated at {}, expected {}", self.pos, expected))
        })?;
        self.pos += 1;
        Ok(item)
    }

    fn mismatch(&self, expected: &str, found: &Wire) -> SyncError {
        SyncError::malformed(format!(
            "expected {} at {}, found {}",
            expected,
            self.pos - 1,
            found.describe()
        ))
    }

    fn next_int(&mut self, expected: &str) -> Result<i64> {
        match self.next(expected)? {
            Wire::Value(Value::Int(i)) => Ok(*i),
            other => Err(self.mismatch(expected, other)),
        }
    }

    pub fn next_id(&mut self) -> Result<WireId> {
        let raw = self.next_int("wire id")?;
        WireId::try_from(raw).map_err(|_| SyncError::malformed(format!("bad wire id {}", raw)))
    }

    pub fn next_count(&mut self) -> Result<usize> {
        let raw = self.next_int("count")?;
        usize::try_from(raw).map_err(|_| SyncError::malformed(format!("bad count {}", raw)))
    }

    pub fn next_op(&mut self) -> Result<MapOp> {
        let raw = self.next_int("opcode")?;
        MapOp::from_code(raw).ok_or_else(|| SyncError::malformed(format!("unknown opcode {}", raw)))
    }

    pub fn next_key(&mut self) -> Result<&'a str> {
        match self.next("key")? {
            Wire::Value(Value::Text(key)) => Ok(key),
            other => Err(self.mismatch("key", other)),
        }
    }

    pub fn next_value(&mut self) -> Result<&'a Value> {
        match self.next("value")? {
            Wire::Value(value) => Ok(value),
            other => Err(self.mismatch("value", other)),
        }
    }

    pub fn next_nested(&mut self) -> Result<&'a [Wire]> {
        match self.next("envelope")? {
            Wire::Seq(items) => Ok(items),
            other => Err(self.mismatch("envelope", other)),
        }
    }

    pub fn next_payload(&mut self) -> Result<Payload<'a>> {
        Ok(match self.next("payload")? {
            Wire::Absent => Payload::Absent,
            Wire::Value(value) => Payload::Value(value),
            Wire::Seq(items) => Payload::Nested(items),
        })
    }
}
