//! Mirror-side key -> node map.
//!
//! New entries are loaded twice: once so the node is complete when
//! `on_add` sees it, and again after `on_add` so field listeners the
//! callback registered fire for the initial values.

use crate::node::MirrorNode;
use crate::primitive_map::id_collision;
use crate::rejected;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use treesync_core::{
    ChangeKind, Envelope, MapOp, Result, Schema, SyncError, Wire, WireId, WireReader,
};

type NodeListener = Box<dyn FnMut(&str, &mut MirrorNode)>;
type RemoveListener = Box<dyn FnMut(&str)>;

/// Replica of a source node map.
pub struct MirrorNodeMap {
    element: Arc<Schema>,
    entries: BTreeMap<WireId, (String, MirrorNode)>,
    ids: HashMap<String, WireId>,
    on_add: Vec<NodeListener>,
    on_update: Vec<NodeListener>,
    on_remove: Vec<RemoveListener>,
}

impl fmt::Debug for MirrorNodeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.values().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl MirrorNodeMap {
    pub fn new(element: Arc<Schema>) -> Self {
        Self {
            element,
            entries: BTreeMap::new(),
            ids: HashMap::new(),
            on_add: Vec::new(),
            on_update: Vec::new(),
            on_remove: Vec::new(),
        }
    }

    pub fn element_schema(&self) -> &Arc<Schema> {
        &self.element
    }

    pub fn get(&self, key: &str) -> Option<&MirrorNode> {
        let id = self.ids.get(key)?;
        self.entries.get(id).map(|(_, node)| node)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut MirrorNode> {
        let id = self.ids.get(key)?;
        self.entries.get_mut(id).map(|(_, node)| node)
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

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MirrorNode)> {
        self.entries.values().map(|(key, node)| (key.as_str(), node))
    }

    /// Fired for every new entry, before its field listeners would fire.
    /// Register per-entry listeners here.
    pub fn on_add(&mut self, listener: impl FnMut(&str, &mut MirrorNode) + 'static) {
        self.on_add.push(Box::new(listener));
    }

    /// Fired after an entry was replaced or updated in place.
    pub fn on_update(&mut self, listener: impl FnMut(&str, &mut MirrorNode) + 'static) {
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

    fn context(&self) -> String {
        format!("node map<{}>", self.element.name())
    }

    fn reject(&self, err: SyncError) -> SyncError {
        rejected(&self.context(), err)
    }

    fn open<'a>(&self, items: &'a [Wire]) -> Result<(ChangeKind, WireReader<'a>)> {
        WireReader::open(items).map_err(|err| self.reject(err))
    }

    /// Drop every entry and rebuild from the snapshot. Listeners registered
    /// on the old entries are lost with them.
    pub(crate) fn load_complete(&mut self, items: &[Wire]) -> Result<()> {
        let (kind, reader) = self.open(items)?;
        if kind != ChangeKind::Complete {
            return Err(self.reject(SyncError::malformed("expected a complete state")));
        }
        self.read_entries(reader)
    }

    pub(crate) fn apply_changes(&mut self, items: &[Wire]) -> Result<()> {
        let (kind, reader) = self.open(items)?;
        match kind {
            ChangeKind::Complete => self.read_entries(reader),
            ChangeKind::Partial => self.read_ops(reader),
        }
    }

    fn read_entries(&mut self, mut reader: WireReader<'_>) -> Result<()> {
        let count = reader.next_count().map_err(|err| self.reject(err))?;
        self.entries.clear();
        self.ids.clear();

        for _ in 0..count {
            let key = reader.next_key().map_err(|err| self.reject(err))?;
            let id = reader.next_id().map_err(|err| self.reject(err))?;
            let state = reader.next_nested().map_err(|err| self.reject(err))?;
            self.add(key, id, state)?;
        }

        if !reader.is_done() {
            let trailing = reader.remaining();
            return Err(self.reject(SyncError::malformed(format!(
                "{} trailing items",
                trailing
            ))));
        }
        Ok(())
    }

    fn read_ops(&mut self, mut reader: WireReader<'_>) -> Result<()> {
        while !reader.is_done() {
            let op = reader.next_op().map_err(|err| self.reject(err))?;
            match op {
                MapOp::Add => {
                    let key = reader.next_key().map_err(|err| self.reject(err))?;
                    let id = reader.next_id().map_err(|err| self.reject(err))?;
                    let state = reader.next_nested().map_err(|err| self.reject(err))?;
                    self.add(key, id, state)?;
                }
                MapOp::Remove => {
                    let id = reader.next_id().map_err(|err| self.reject(err))?;
                    let (key, _) = match self.entries.remove(&id) {
                        Some(entry) => entry,
                        None => return Err(self.reject(SyncError::UnknownEntryId(id))),
                    };
                    self.ids.remove(&key);
                    for listener in self.on_remove.iter_mut() {
                        listener(&key);
                    }
                }
                MapOp::Replace | MapOp::Update => {
                    let id = reader.next_id().map_err(|err| self.reject(err))?;
                    let state = reader.next_nested().map_err(|err| self.reject(err))?;
                    if !self.entries.contains_key(&id) {
                        return Err(self.reject(SyncError::UnknownEntryId(id)));
                    }
                    if let Some((key, node)) = self.entries.get_mut(&id) {
                        if op == MapOp::Replace {
                            node.load_complete(state)?;
                        } else {
                            node.apply_changes(state)?;
                        }
                        for listener in self.on_update.iter_mut() {
                            listener(key, node);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, key: &str, id: WireId, state: &[Wire]) -> Result<()> {
        if let Some((held, _)) = self.entries.get(&id) {
            if held != key {
                return Err(self.reject(id_collision(id, held, key)));
            }
        }
        let mut node = MirrorNode::new(Arc::clone(&self.element));
        node.load_complete(state)?;
        for listener in self.on_add.iter_mut() {
            listener(key, &mut node);
        }
        node.load_complete(state)?;

        if let Some(stale) = self.ids.insert(key.to_string(), id) {
            self.entries.remove(&stale);
        }
        self.entries.insert(id, (key.to_string(), node));
        Ok(())
    }

    pub fn complete_state(&self) -> Envelope {
        let mut envelope = Envelope::complete();
        envelope.push_count(self.entries.len());
        for (id, (key, node)) in self.entries.iter() {
            envelope.push_key(key);
            envelope.push_id(*id);
            envelope.push_envelope(node.complete_state());
        }
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use treesync_core::Value;

    fn pet() -> Arc<Schema> {
        Schema::builder("Pet")
            .scalar("species", "cat")
            .scalar("hp", 10)
            .build()
            .unwrap()
    }

    #[test]
    fn test_on_add_sees_loaded_node_and_can_listen() {
        let mut map = MirrorNodeMap::new(pet());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        map.on_add(move |key, node| {
            sink.borrow_mut()
                .push(format!("add {} hp={}", key, node.get("hp").unwrap()));
            let sink = Rc::clone(&sink);
            node.on("hp", move |v| sink.borrow_mut().push(format!("hp={}", v)))
                .unwrap();
        });

        let delta = Envelope::from_json(r#"[2,0,"rex",0,[1,1,"dog",0,5]]"#).unwrap();
        map.apply_recent_changes(&delta).unwrap();
        assert_eq!(*seen.borrow(), vec!["add rex hp=5", "hp=5"]);

        seen.borrow_mut().clear();
        let delta = Envelope::from_json("[2,2,0,[2,0,4]]").unwrap();
        map.apply_recent_changes(&delta).unwrap();
        assert_eq!(*seen.borrow(), vec!["hp=4"]);
        assert_eq!(map.get("rex").unwrap().get("species").unwrap(), &Value::from("dog"));
    }

    #[test]
    fn test_replace_reuses_mirror_entry() {
        let mut map = MirrorNodeMap::new(pet());
        let hits = Rc::new(RefCell::new(0));

        map.apply_recent_changes(&Envelope::from_json(r#"[2,0,"a",0,[1,1,"cat",0,10]]"#).unwrap())
            .unwrap();
        let sink = Rc::clone(&hits);
        map.get_mut("a")
            .unwrap()
            .on("hp", move |_| *sink.borrow_mut() += 1)
            .unwrap();

        map.apply_recent_changes(&Envelope::from_json(r#"[2,3,0,[1,1,"owl",0,1]]"#).unwrap())
            .unwrap();
        assert_eq!(*hits.borrow(), 1);
        assert_eq!(map.get("a").unwrap().get("hp").unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_add_onto_a_live_id_is_rejected() {
        let mut map = MirrorNodeMap::new(pet());
        map.apply_recent_changes(&Envelope::from_json(r#"[2,0,"a",0,[1,1,"cat",0,10]]"#).unwrap())
            .unwrap();

        let clash = Envelope::from_json(r#"[2,0,"b",0,[1,1,"owl",0,1]]"#).unwrap();
        assert!(matches!(
            map.apply_recent_changes(&clash),
            Err(SyncError::MalformedEnvelope(_))
        ));
        assert!(!map.contains_key("b"));
        assert_eq!(map.get("a").unwrap().get("hp").unwrap(), &Value::Int(10));
    }

    #[test]
    fn test_remove_unknown_entry_fails() {
        let mut map = MirrorNodeMap::new(pet());
        assert_eq!(
            map.apply_recent_changes(&Envelope::from_json("[2,1,9]").unwrap()),
            Err(SyncError::UnknownEntryId(9))
        );
    }
}
