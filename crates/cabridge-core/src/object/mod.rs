//! Domain object instances.
//!
//! Objects live in an `ObjectGraph` arena and reference each other through
//! `ObjectId` handles, so identity is the handle and cyclic graphs need no
//! shared ownership. Attribute semantics (normalization, inverse sync,
//! owner lookup) are applied by `access`; the graph itself only stores values.

pub mod access;
pub mod key;
pub mod merge;
pub mod validate;
pub mod value;

use crate::model::{DomainModel, kind::EntityId};
use derive_more::Display;
use std::{collections::BTreeMap, fmt::Write as _};

pub use value::Value;

static NULL: Value = Value::Null;

///
/// ObjectId
/// Identity of a domain object within one `ObjectGraph`.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("#{_0}")]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

///
/// DomainObject
///

#[derive(Clone, Debug)]
pub struct DomainObject {
    entity: EntityId,
    values: BTreeMap<String, Value>,
}

impl DomainObject {
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Stored value by canonical symbol; unset attributes read as null.
    #[must_use]
    pub fn value(&self, symbol: &str) -> &Value {
        self.values.get(symbol).unwrap_or(&NULL)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

///
/// ObjectGraph
///

#[derive(Clone, Debug, Default)]
pub struct ObjectGraph {
    objects: Vec<DomainObject>,
}

impl ObjectGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct an empty instance of `entity`.
    pub fn create(&mut self, entity: EntityId) -> ObjectId {
        let id = ObjectId(u32::try_from(self.objects.len()).unwrap_or(u32::MAX));
        self.objects.push(DomainObject {
            entity,
            values: BTreeMap::new(),
        });

        id
    }

    /// Borrow an object.
    ///
    /// Panics when `id` was not issued by this graph.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> &DomainObject {
        &self.objects[id.index()]
    }

    #[must_use]
    pub fn entity_of(&self, id: ObjectId) -> EntityId {
        self.get(id).entity
    }

    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        id.index() < self.objects.len()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Drop every object created after the graph held `len` objects. The
    /// objects kept must not reference the dropped ones.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.objects.truncate(len);
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len()).map(|i| ObjectId(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    /// Instances of `entity` or any of its subtypes.
    pub fn instances_of<'a>(
        &'a self,
        model: &'a DomainModel,
        entity: EntityId,
    ) -> impl Iterator<Item = ObjectId> + 'a {
        self.ids()
            .filter(move |id| model.is_subtype(self.entity_of(*id), entity))
    }

    /// Stored value by canonical symbol, bypassing attribute resolution.
    #[must_use]
    pub fn value(&self, id: ObjectId, symbol: &str) -> &Value {
        self.get(id).value(symbol)
    }

    // put
    // raw store; writer semantics are the caller's concern
    pub(crate) fn put(&mut self, id: ObjectId, symbol: &str, value: Value) -> Value {
        let values = &mut self.objects[id.index()].values;
        if value.is_null() {
            values.remove(symbol).unwrap_or_default()
        } else {
            values.insert(symbol.to_string(), value).unwrap_or_default()
        }
    }

    /// Multi-line diagnostic rendering of one object.
    #[must_use]
    pub fn dump(&self, model: &DomainModel, id: ObjectId) -> String {
        let object = self.get(id);
        let mut out = format!("{}{id}{{", model.entity_name(object.entity));
        for (symbol, value) in &object.values {
            let _ = write!(out, "\n  {symbol} => {}", self.describe(model, value));
        }
        out.push_str(if object.values.is_empty() { "}" } else { "\n}" });

        out
    }

    fn describe(&self, model: &DomainModel, value: &Value) -> String {
        match value {
            Value::Ref(id) if self.contains(*id) => {
                format!("{}{id}", model.entity_name(self.entity_of(*id)))
            }
            Value::List(items) => {
                let items: Vec<_> = items.iter().map(|v| self.describe(model, v)).collect();
                format!("[{}]", items.join(", "))
            }
            other => other.to_string(),
        }
    }
}
