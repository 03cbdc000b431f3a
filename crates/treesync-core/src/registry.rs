//! Process-wide schema cache keyed by Rust type.
//!
//! Types opt in by implementing [`Describe`]. The descriptor is built the
//! first time it is asked for and shared afterwards; a failed build is not
//! cached, so a broken declaration keeps failing instead of yielding a
//! partially usable schema.

use crate::error::Result;
use crate::schema::Schema;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A type whose replicated fields can be described.
pub trait Describe: 'static {
    /// Build this type's schema. Nested schemas should be fetched through
    /// [`schema_of`] so they are shared too.
    fn describe() -> Result<Arc<Schema>>;
}

/// Cache of built schemas.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<TypeId, Arc<Schema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static SchemaRegistry {
        static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SchemaRegistry::new)
    }

    /// Return the cached schema for `T`, building it on first use.
    pub fn schema_of<T: Describe>(&self) -> Result<Arc<Schema>> {
        let key = TypeId::of::<T>();
        if let Some(schema) = self.schemas.read().get(&key) {
            return Ok(Arc::clone(schema));
        }

        // Built without holding the lock: describe() may recurse into the
        // registry for nested types.
        let built = T::describe()?;

        // First writer wins so every caller shares one descriptor.
        let mut schemas = self.schemas.write();
        let schema = schemas.entry(key).or_insert(built);
        Ok(Arc::clone(schema))
    }

    pub fn contains<T: Describe>(&self) -> bool {
        self.schemas.read().contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}

/// Shorthand for `SchemaRegistry::global().schema_of::<T>()`.
pub fn schema_of<T: Describe>() -> Result<Arc<Schema>> {
    SchemaRegistry::global().schema_of::<T>()
}
