//! Schema descriptors: which fields of a type replicate, and under which
//! wire ids.
//!
//! Two numberings exist per schema:
//!
//! - **wire id**: the alphabetical rank of the field name among all
//!   replicated fields. It depends only on the set of names, so a source and
//!   a mirror built from independently declared (but structurally identical)
//!   types agree on it without ever exchanging names.
//! - **declaration order**: the order fields were added to the builder. It
//!   drives the order of entries in an envelope, and therefore the order in
//!   which mirror listeners fire.

use crate::error::{Result, SyncError};
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Small integer identifying a field or map entry on the wire.
pub type WireId = u32;

/// What a nested field holds.
#[derive(Clone, Debug, PartialEq)]
pub enum NestedKind {
    /// A single child node of the given schema.
    Node(Arc<Schema>),
    /// A dynamic key -> primitive map.
    PrimitiveMap,
    /// A dynamic key -> node map whose entries all use the given schema.
    NodeMap(Arc<Schema>),
}

impl NestedKind {
    pub fn describe(&self) -> String {
        match self {
            NestedKind::Node(schema) => format!("node<{}>", schema.name()),
            NestedKind::PrimitiveMap => "primitive map".to_string(),
            NestedKind::NodeMap(schema) => format!("node map<{}>", schema.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// A primitive field; the value is its default and fixes its kind.
    Scalar(Value),
    Nested(NestedKind),
}

/// A single replicated field.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    wire_id: WireId,
    order: usize,
    kind: FieldKind,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire_id(&self) -> WireId {
        self.wire_id
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar(_))
    }

    pub fn default_value(&self) -> Option<&Value> {
        match &self.kind {
            FieldKind::Scalar(value) => Some(value),
            FieldKind::Nested(_) => None,
        }
    }

    pub fn nested_kind(&self) -> Option<&NestedKind> {
        match &self.kind {
            FieldKind::Nested(kind) => Some(kind),
            FieldKind::Scalar(_) => None,
        }
    }
}

/// Immutable, per-type descriptor of the replicated fields.
#[derive(Clone, Debug)]
pub struct Schema {
    name: String,
    /// Fields in declaration order.
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    /// wire id -> declaration order
    by_wire: Vec<usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields
    }
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&order| &self.fields[order])
    }

    pub fn field_by_wire(&self, id: WireId) -> Option<&Field> {
        self.by_wire
            .get(id as usize)
            .map(|&order| &self.fields[order])
    }

    pub fn field_at(&self, order: usize) -> Option<&Field> {
        self.fields.get(order)
    }

    pub fn wire_id(&self, name: &str) -> Option<WireId> {
        self.field(name).map(Field::wire_id)
    }

    pub fn declaration_order(&self, name: &str) -> Option<usize> {
        self.field(name).map(Field::order)
    }

    /// All replicated field names (sorted, which is wire-id order).
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn scalar_fields(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter(|f| f.is_scalar())
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn nested_fields(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter(|f| !f.is_scalar())
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Look up a field or fail with `UnknownField`.
    pub fn require(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| SyncError::UnknownField {
            schema: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn require_scalar(&self, name: &str) -> Result<&Field> {
        let field = self.require(name)?;
        if field.is_scalar() {
            Ok(field)
        } else {
            Err(SyncError::NotScalar {
                schema: self.name.clone(),
                field: name.to_string(),
            })
        }
    }

    pub fn require_nested(&self, name: &str) -> Result<&Field> {
        let field = self.require(name)?;
        if field.is_scalar() {
            Err(SyncError::NotNested {
                schema: self.name.clone(),
                field: name.to_string(),
            })
        } else {
            Ok(field)
        }
    }

    /// Look up a field by wire id or fail with `UnknownWireId`.
    pub fn require_wire(&self, id: WireId) -> Result<&Field> {
        self.field_by_wire(id).ok_or_else(|| SyncError::UnknownWireId {
            schema: self.name.clone(),
            id,
        })
    }
}

/// Collects field declarations and produces an immutable [`Schema`].
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    name: String,
    declared: Vec<(String, FieldKind)>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared: Vec::new(),
        }
    }

    pub fn scalar(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.declared
            .push((name.into(), FieldKind::Scalar(default.into())));
        self
    }

    pub fn nested(mut self, name: impl Into<String>, kind: NestedKind) -> Self {
        self.declared.push((name.into(), FieldKind::Nested(kind)));
        self
    }

    pub fn node(self, name: impl Into<String>, schema: Arc<Schema>) -> Self {
        self.nested(name, NestedKind::Node(schema))
    }

    pub fn primitive_map(self, name: impl Into<String>) -> Self {
        self.nested(name, NestedKind::PrimitiveMap)
    }

    pub fn node_map(self, name: impl Into<String>, element: Arc<Schema>) -> Self {
        self.nested(name, NestedKind::NodeMap(element))
    }

    /// Validate the declarations and fix wire ids and declaration order.
    ///
    /// A name declared as both scalar and nested fails with
    /// `ConflictingField`; a name declared twice with the same kind fails
    /// with `DuplicateField`. Either way no schema is produced.
    pub fn build(self) -> Result<Arc<Schema>> {
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(self.declared.len());

        for (order, (name, kind)) in self.declared.iter().enumerate() {
            if let Some(&previous) = by_name.get(name) {
                let previous_scalar = matches!(self.declared[previous].1, FieldKind::Scalar(_));
                let current_scalar = matches!(kind, FieldKind::Scalar(_));
                return Err(if previous_scalar != current_scalar {
                    SyncError::ConflictingField {
                        schema: self.name,
                        field: name.clone(),
                    }
                } else {
                    SyncError::DuplicateField {
                        schema: self.name,
                        field: name.clone(),
                    }
                });
            }
            by_name.insert(name.clone(), order);
        }

        let mut sorted: Vec<&str> = self.declared.iter().map(|(n, _)| n.as_str()).collect();
        sorted.sort_unstable();
        let rank: HashMap<&str, WireId> = sorted
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, i as WireId))
            .collect();

        let mut by_wire = vec![0; self.declared.len()];
        let mut fields = Vec::with_capacity(self.declared.len());
        for (order, (name, kind)) in self.declared.iter().enumerate() {
            let wire_id = rank[name.as_str()];
            by_wire[wire_id as usize] = order;
            fields.push(Field {
                name: name.clone(),
                wire_id,
                order,
                kind: kind.clone(),
            });
        }

        tracing::debug!(schema = %self.name, fields = fields.len(), "registered schema");

        Ok(Arc::new(Schema {
            name: self.name,
            fields,
            by_name,
            by_wire,
        }))
    }
}
