use crate::model::kind::{AttributeId, EntityId};
use indexmap::IndexMap;
use std::{
    cell::Cell,
    collections::{BTreeMap, BTreeSet},
};

///
/// EntityType
///
/// One node of the domain type hierarchy and its locally declared attribute
/// registry. Inherited attributes stay on the declaring ancestor and are
/// resolved through `parent`.
///

#[derive(Debug)]
pub struct EntityType {
    pub(crate) id: EntityId,
    pub(crate) name: String,
    pub(crate) qualified_name: Option<String>,
    pub(crate) parent: Option<EntityId>,
    pub(crate) is_abstract: bool,
    pub(crate) service: Option<String>,

    /// Locally declared or locally restricted attributes, in declaration order.
    pub(crate) attributes: IndexMap<String, AttributeId>,
    pub(crate) aliases: BTreeMap<String, String>,
    pub(crate) hidden: BTreeSet<String>,

    pub(crate) primary_key: Vec<String>,
    pub(crate) secondary_key: Vec<String>,
    pub(crate) alternate_key: Vec<String>,
    pub(crate) mandatory: BTreeSet<String>,

    /// owner type -> owner attribute on this type (none when unidirectional)
    pub(crate) owners: IndexMap<EntityId, Option<AttributeId>>,
    pub(crate) dependency_accessed: Cell<bool>,
    pub(crate) introspected: bool,
}

impl EntityType {
    pub(crate) fn new(id: EntityId, name: impl Into<String>, parent: Option<EntityId>) -> Self {
        Self {
            id,
            name: name.into(),
            qualified_name: None,
            parent,
            is_abstract: false,
            service: None,
            attributes: IndexMap::new(),
            aliases: BTreeMap::new(),
            hidden: BTreeSet::new(),
            primary_key: Vec::new(),
            secondary_key: Vec::new(),
            alternate_key: Vec::new(),
            mandatory: BTreeSet::new(),
            owners: IndexMap::new(),
            dependency_accessed: Cell::new(false),
            introspected: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Simple (demodulized) type name, e.g. `Participant`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package-qualified name when known, else the simple name.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        self.qualified_name.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    #[must_use]
    pub const fn is_introspected(&self) -> bool {
        self.introspected
    }

    /// Locally declared attribute symbols in declaration order.
    pub fn local_symbols(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn declares(&self, symbol: &str) -> bool {
        self.attributes.contains_key(symbol)
    }
}
