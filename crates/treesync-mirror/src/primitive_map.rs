//! Mirror-side key -> primitive map.

use crate::rejected;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use treesync_core::{ChangeKind, Envelope, MapOp, Result, SyncError, Value, Wire, WireId, WireReader};

type EntryListener = Box<dyn FnMut(&str, &Value)>;
type RemoveListener = Box<dyn FnMut(&str)>;

const CONTEXT: &str = "primitive map";

/// Replica of a source primitive map, keyed by the source's entry ids.
#[derive(Default)]
pub struct MirrorPrimitiveMap {
    entries: BTreeMap<WireId, (String, Value)>,
    ids: HashMap<String, WireId>,
    on_add: Vec<EntryListener>,
    on_update: Vec<EntryListener>,
    on_remove: Vec<RemoveListener>,
}

impl fmt::Debug for MirrorPrimitiveMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.values().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl MirrorPrimitiveMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let id = self.ids.get(key)?;
        self.entries.get(id).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.ids.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in entry-id order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn on_add(&mut self, listener: impl FnMut(&str, &Value) + 'static) {
        self.on_add.push(Box::new(listener));
    }

    pub fn on_update(&mut self, listener: impl FnMut(&str, &Value) + 'static) {
        self.on_update.push(Box::new(listener));
    }

    pub fn on_remove(&mut self, listener: impl FnMut(&str) + 'static) {
        self.on_remove.push(Box::new(listener));
    }

    pub fn apply_complete_state(&mut self, envelope: &Envelope) -> Result<()> {
        self.load_complete(envelope.as_slice())
    }

    pub fn apply_recent_changes(&mut self, envelope: &Envelope) -> Result<()> {
        self.apply_changes(envelope.as_slice())
    }

    /// Replace every entry, firing `on_add` for each.
    pub(crate) fn load_complete(&mut self, items: &[Wire]) -> Result<()> {
        let (kind, reader) = open(items)?;
        if kind != ChangeKind::Complete {
            return Err(rejected(
                CONTEXT,
                SyncError::malformed("expected a complete state"),
            ));
        }
        self.read_entries(reader)
    }

    pub(crate) fn apply_changes(&mut self, items: &[Wire]) -> Result<()> {
        let (kind, reader) = open(items)?;
        match kind {
            ChangeKind::Complete => self.read_entries(reader),
            ChangeKind::Partial => self.read_ops(reader),
        }
    }

    fn read_entries(&mut self, mut reader: WireReader<'_>) -> Result<()> {
        let count = reader.next_count().map_err(|err| rejected(CONTEXT, err))?;
        self.entries.clear();
        self.ids.clear();

        for _ in 0..count {
            let key = reader.next_key().map_err(|err| rejected(CONTEXT, err))?;
            let id = reader.next_id().map_err(|err| rejected(CONTEXT, err))?;
            let value = reader.next_value().map_err(|err| rejected(CONTEXT, err))?;
            self.add(key, id, value.clone())?;
        }

        if !reader.is_done() {
            return Err(rejected(
                CONTEXT,
                SyncError::malformed(format!("{} trailing items", reader.remaining())),
            ));
        }
        Ok(())
    }

    fn read_ops(&mut self, mut reader: WireReader<'_>) -> Result<()> {
        while !reader.is_done() {
            let op = reader.next_op().map_err(|err| rejected(CONTEXT, err))?;
            match op {
                MapOp::Add => {
                    let key = reader.next_key().map_err(|err| rejected(CONTEXT, err))?;
                    let id = reader.next_id().map_err(|err| rejected(CONTEXT, err))?;
                    let value = reader.next_value().map_err(|err| rejected(CONTEXT, err))?;
                    self.add(key, id, value.clone())?;
                }
                MapOp::Remove => {
                    let id = reader.next_id().map_err(|err| rejected(CONTEXT, err))?;
                    let (key, _) = self
                        .entries
                        .remove(&id)
                        .ok_or_else(|| rejected(CONTEXT, SyncError::UnknownEntryId(id)))?;
                    self.ids.remove(&key);
                    for listener in self.on_remove.iter_mut() {
                        listener(&key);
                    }
                }
                MapOp::Update => {
                    let id = reader.next_id().map_err(|err| rejected(CONTEXT, err))?;
                    let value = reader.next_value().map_err(|err| rejected(CONTEXT, err))?;
                    let (key, slot) = self
                        .entries
                        .get_mut(&id)
                        .ok_or_else(|| rejected(CONTEXT, SyncError::UnknownEntryId(id)))?;
                    *slot = value.clone();
                    for listener in self.on_update.iter_mut() {
                        listener(key, slot);
                    }
                }
                MapOp::Replace => {
                    return Err(rejected(
                        CONTEXT,
                        SyncError::malformed("REPLACE is only valid for node maps"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, key: &str, id: WireId, value: Value) -> Result<()> {
        if let Some((held, _)) = self.entries.get(&id) {
            if held != key {
                return Err(rejected(CONTEXT, id_collision(id, held, key)));
            }
        }
        if let Some(stale) = self.ids.insert(key.to_string(), id) {
            self.entries.remove(&stale);
        }
        self.entries.insert(id, (key.to_string(), value));
        if let Some((key, value)) = self.entries.get(&id) {
            for listener in self.on_add.iter_mut() {
                listener(key, value);
            }
        }
        Ok(())
    }

    pub fn complete_state(&self) -> Envelope {
        let mut envelope = Envelope::complete();
        envelope.push_count(self.entries.len());
        for (id, (key, value)) in self.entries.iter() {
            envelope.push_key(key);
            envelope.push_id(*id);
            envelope.push_value(value.clone());
        }
        envelope
    }
}

/// An ADD may not hand out an id that a different live key still holds.
pub(crate) fn id_collision(id: WireId, held: &str, key: &str) -> SyncError {
    SyncError::malformed(format!(
        "entry id {} already belongs to `{}`, cannot add `{}`",
        id, held, key
    ))
}

fn open(items: &[Wire]) -> Result<(ChangeKind, WireReader<'_>)> {
    WireReader::open(items).map_err(|err| rejected(CONTEXT, err))
}
