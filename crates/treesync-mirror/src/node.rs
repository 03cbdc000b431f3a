//! Mirror-side tree node.

use crate::child::MirrorChild;
use crate::node_map::MirrorNodeMap;
use crate::primitive_map::MirrorPrimitiveMap;
use crate::rejected;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use treesync_core::{
    schema_of, ChangeKind, Describe, Envelope, FieldKind, Payload, Result, Schema, SyncError,
    Value, Wire, WireId, WireReader,
};

type FieldListener = Box<dyn FnMut(&Value)>;

/// Replica of one source node.
///
/// Values assigned while applying an envelope bypass change tracking; the
/// mirror never re-diffs what it receives.
pub struct MirrorNode {
    schema: Arc<Schema>,
    scalars: BTreeMap<WireId, Value>,
    children: BTreeMap<WireId, MirrorChild>,
    listeners: HashMap<WireId, Vec<FieldListener>>,
}

impl fmt::Debug for MirrorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorNode")
            .field("schema", &self.schema.name())
            .field("scalars", &self.scalars)
            .field("children", &self.children)
            .finish()
    }
}

impl MirrorNode {
    /// A replica holding every default, ready to receive a complete state.
    pub fn new(schema: Arc<Schema>) -> Self {
        let mut scalars = BTreeMap::new();
        let mut children = BTreeMap::new();
        for field in schema.fields() {
            match field.kind() {
                FieldKind::Scalar(default) => {
                    scalars.insert(field.wire_id(), default.clone());
                }
                FieldKind::Nested(kind) => {
                    children.insert(field.wire_id(), MirrorChild::for_kind(kind));
                }
            }
        }
        Self {
            schema,
            scalars,
            children,
            listeners: HashMap::new(),
        }
    }

    pub fn of<T: Describe>() -> Result<Self> {
        Ok(Self::new(schema_of::<T>()?))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Result<&Value> {
        let id = self.schema.require_scalar(field)?.wire_id();
        self.scalars.get(&id).ok_or_else(|| SyncError::NotScalar {
            schema: self.schema.name().to_string(),
            field: field.to_string(),
        })
    }

    pub fn has_child(&self, field: &str) -> bool {
        self.schema
            .wire_id(field)
            .is_some_and(|id| self.children.contains_key(&id))
    }

    pub fn child(&self, field: &str) -> Result<Option<&MirrorChild>> {
        let id = self.schema.require_nested(field)?.wire_id();
        Ok(self.children.get(&id))
    }

    fn child_mut(&mut self, field: &str) -> Result<Option<&mut MirrorChild>> {
        let id = self.schema.require_nested(field)?.wire_id();
        Ok(self.children.get_mut(&id))
    }

    pub fn node(&self, field: &str) -> Result<&MirrorNode> {
        let child = self.child(field)?;
        child
            .and_then(MirrorChild::as_node)
            .ok_or_else(|| kind_mismatch(field, "node", child))
    }

    pub fn node_mut(&mut self, field: &str) -> Result<&mut MirrorNode> {
        let found = describe(self.child(field)?);
        self.child_mut(field)?
            .and_then(MirrorChild::as_node_mut)
            .ok_or_else(|| mismatch(field, "node", found))
    }

    pub fn primitive_map(&self, field: &str) -> Result<&MirrorPrimitiveMap> {
        let child = self.child(field)?;
        child
            .and_then(MirrorChild::as_primitive_map)
            .ok_or_else(|| kind_mismatch(field, "primitive map", child))
    }

    pub fn primitive_map_mut(&mut self, field: &str) -> Result<&mut MirrorPrimitiveMap> {
        let found = describe(self.child(field)?);
        self.child_mut(field)?
            .and_then(MirrorChild::as_primitive_map_mut)
            .ok_or_else(|| mismatch(field, "primitive map", found))
    }

    pub fn node_map(&self, field: &str) -> Result<&MirrorNodeMap> {
        let child = self.child(field)?;
        child
            .and_then(MirrorChild::as_node_map)
            .ok_or_else(|| kind_mismatch(field, "node map", child))
    }

    pub fn node_map_mut(&mut self, field: &str) -> Result<&mut MirrorNodeMap> {
        let found = describe(self.child(field)?);
        self.child_mut(field)?
            .and_then(MirrorChild::as_node_map_mut)
            .ok_or_else(|| mismatch(field, "node map", found))
    }

    /// Call `listener` with the new value every time an envelope assigns
    /// `field`. A complete state assigns every field, even unchanged ones.
    pub fn on(&mut self, field: &str, listener: impl FnMut(&Value) + 'static) -> Result<()> {
        let id = self.schema.require_scalar(field)?.wire_id();
        self.listeners
            .entry(id)
            .or_default()
            .push(Box::new(listener));
        Ok(())
    }

    pub fn apply_complete_state(&mut self, envelope: &Envelope) -> Result<()> {
        tracing::debug!(
            schema = %self.schema.name(),
            items = envelope.as_slice().len(),
            "applying complete state"
        );
        self.load_complete(envelope.as_slice())
    }

    /// Apply a delta. A complete state is accepted too and loaded as such.
    pub fn apply_recent_changes(&mut self, envelope: &Envelope) -> Result<()> {
        tracing::debug!(
            schema = %self.schema.name(),
            items = envelope.as_slice().len(),
            "applying recent changes"
        );
        self.apply_changes(envelope.as_slice())
    }

    pub(crate) fn load_complete(&mut self, items: &[Wire]) -> Result<()> {
        let (kind, reader) = self.open(items)?;
        if kind != ChangeKind::Complete {
            return Err(rejected(
                self.schema.name(),
                SyncError::malformed("expected a complete state"),
            ));
        }
        self.read_pairs(reader, ChangeKind::Complete)
    }

    pub(crate) fn apply_changes(&mut self, items: &[Wire]) -> Result<()> {
        let (kind, reader) = self.open(items)?;
        self.read_pairs(reader, kind)
    }

    fn open<'a>(&self, items: &'a [Wire]) -> Result<(ChangeKind, WireReader<'a>)> {
        WireReader::open(items).map_err(|err| rejected(self.schema.name(), err))
    }

    /// Read `(id, payload)` pairs and assign them in order.
    ///
    /// A complete state also drops nested children it does not mention,
    /// since the source omits absent children from snapshots.
    fn read_pairs(&mut self, mut reader: WireReader<'_>, kind: ChangeKind) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let name = schema.name();
        let mut seen = BTreeSet::new();

        while !reader.is_done() {
            let id = reader.next_id().map_err(|err| rejected(name, err))?;
            let field = schema.require_wire(id).map_err(|err| rejected(name, err))?;
            let payload = reader.next_payload().map_err(|err| rejected(name, err))?;
            seen.insert(id);

            match (field.kind(), payload) {
                (FieldKind::Scalar(template), Payload::Value(value)) => {
                    let value = value
                        .clone()
                        .conform_to(template, field.name())
                        .map_err(|err| rejected(name, err))?;
                    self.assign(id, value);
                }
                (FieldKind::Nested(nested), Payload::Nested(items)) => {
                    let child = self
                        .children
                        .entry(id)
                        .or_insert_with(|| MirrorChild::for_kind(nested));
                    match kind {
                        ChangeKind::Complete => child.load_complete(items)?,
                        ChangeKind::Partial => child.apply_changes(items)?,
                    }
                }
                (FieldKind::Nested(_), Payload::Absent) => {
                    self.children.remove(&id);
                }
                (_, _) => {
                    return Err(rejected(
                        name,
                        SyncError::malformed(format!(
                            "payload for `{}` does not match its kind",
                            field.name()
                        )),
                    ));
                }
            }
        }

        if kind == ChangeKind::Complete {
            self.children.retain(|id, _| seen.contains(id));
        }
        Ok(())
    }

    fn assign(&mut self, id: WireId, value: Value) {
        if let Some(listeners) = self.listeners.get_mut(&id) {
            for listener in listeners.iter_mut() {
                listener(&value);
            }
        }
        self.scalars.insert(id, value);
    }

    /// Re-encode the mirrored state in the same shape the source would.
    pub fn complete_state(&self) -> Envelope {
        let mut envelope = Envelope::complete();
        for field in self.schema.fields() {
            let id = field.wire_id();
            if let Some(value) = self.scalars.get(&id) {
                envelope.push_id(id);
                envelope.push_value(value.clone());
            } else if let Some(child) = self.children.get(&id) {
                envelope.push_id(id);
                envelope.push_envelope(child.complete_state());
            }
        }
        envelope
    }
}

fn describe(child: Option<&MirrorChild>) -> String {
    child.map_or_else(|| "nothing".to_string(), MirrorChild::describe)
}

fn mismatch(field: &str, expected: &str, found: String) -> SyncError {
    SyncError::ChildKindMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        found,
    }
}

fn kind_mismatch(field: &str, expected: &str, child: Option<&MirrorChild>) -> SyncError {
    mismatch(field, expected, describe(child))
}
