//! Runtime metadata model.
//!
//! `DomainModel` is the single owner of every entity type and attribute
//! descriptor. Types and attributes are addressed by `EntityId` and
//! `AttributeId` handles; nothing here depends on language-level reflection.
//!
//! In general:
//! - `registry` declares attributes and resolves symbols
//! - `view` derives cached filtered attribute lists
//! - `inverse` and `dependency` add relational semantics
//! - `introspect` fills the registry from a native property source

pub mod attribute;
pub mod date;
pub mod dependency;
pub mod entity;
pub mod flag;
pub mod introspect;
pub mod inverse;
pub mod kind;
pub mod naming;
pub mod registry;
pub mod view;

use crate::{
    error::MetadataError,
    model::{
        attribute::Attribute,
        date::DateConverter,
        entity::EntityType,
        kind::{AttributeId, EntityId},
        registry::AttributeFactory,
        view::ViewCache,
    },
};
use std::{cell::RefCell, collections::HashMap};
use tracing::debug;

///
/// DomainModel
///
/// Arena of entity types and attribute descriptors with one clear owner.
/// Mutation happens while the model is being declared; afterwards it is
/// shared by reference with visitors, the database facade and the migrator.
///

#[derive(Default)]
pub struct DomainModel {
    pub(crate) entities: Vec<EntityType>,
    pub(crate) names: HashMap<String, EntityId>,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) factories: HashMap<EntityId, Box<dyn AttributeFactory>>,
    pub(crate) dates: DateConverter,
    pub(crate) views: RefCell<ViewCache>,
}

impl DomainModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_date_converter(dates: DateConverter) -> Self {
        Self {
            dates,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn date_converter(&self) -> &DateConverter {
        &self.dates
    }

    // ---------------------------------------------------------------------
    // Entity types
    // ---------------------------------------------------------------------

    /// Register an entity type under its simple name.
    pub fn add_entity(
        &mut self,
        name: &str,
        parent: Option<EntityId>,
    ) -> Result<EntityId, MetadataError> {
        if self.names.contains_key(name) {
            return Err(MetadataError::DuplicateEntity(name.to_string()));
        }
        if let Some(parent) = parent
            && parent.index() >= self.entities.len()
        {
            return Err(MetadataError::InvalidSupertype {
                entity: name.to_string(),
                parent: parent.to_string(),
                reason: "supertype is not registered",
            });
        }

        let id = EntityId(u32::try_from(self.entities.len()).unwrap_or(u32::MAX));
        self.entities.push(EntityType::new(id, name, parent));
        self.names.insert(name.to_string(), id);
        self.invalidate();

        debug!(entity = name, "registered entity type");

        Ok(id)
    }

    /// Record the package-qualified name; lookups accept either spelling.
    pub fn set_qualified_name(
        &mut self,
        entity: EntityId,
        qualified: &str,
    ) -> Result<(), MetadataError> {
        if let Some(existing) = self.names.get(qualified)
            && *existing != entity
        {
            return Err(MetadataError::DuplicateEntity(qualified.to_string()));
        }

        self.names.insert(qualified.to_string(), entity);
        self.entity_mut(entity).qualified_name = Some(qualified.to_string());

        Ok(())
    }

    pub fn set_abstract(&mut self, entity: EntityId, is_abstract: bool) {
        self.entity_mut(entity).is_abstract = is_abstract;
    }

    /// Name of the persistence service that stores this type and its subtypes.
    pub fn set_service(&mut self, entity: EntityId, service: &str) {
        self.entity_mut(entity).service = Some(service.to_string());
    }

    /// Resolve the service name declared on this type or its nearest ancestor.
    #[must_use]
    pub fn service_of(&self, entity: EntityId) -> Option<&str> {
        self.lineage(entity)
            .find_map(|id| self.entity(id).service())
    }

    /// Borrow an entity type.
    ///
    /// Panics when `entity` was not issued by this model.
    #[must_use]
    pub fn entity(&self, entity: EntityId) -> &EntityType {
        &self.entities[entity.index()]
    }

    pub(crate) fn entity_mut(&mut self, entity: EntityId) -> &mut EntityType {
        &mut self.entities[entity.index()]
    }

    #[must_use]
    pub fn entity_by_name(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    pub fn require_entity(&self, name: &str) -> Result<EntityId, MetadataError> {
        self.entity_by_name(name)
            .ok_or_else(|| MetadataError::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.iter()
    }

    #[must_use]
    pub fn entity_name(&self, entity: EntityId) -> &str {
        self.entity(entity).name()
    }

    /// The type itself followed by its ancestors, nearest first.
    pub fn lineage(&self, entity: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        std::iter::successors(Some(entity), |id| self.entity(*id).parent)
    }

    /// Ancestors of `entity`, nearest first.
    pub fn supertypes(&self, entity: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.lineage(entity).skip(1)
    }

    /// All transitive subtypes of `entity`.
    #[must_use]
    pub fn subtypes(&self, entity: EntityId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|e| e.id != entity && self.is_subtype(e.id, entity))
            .map(|e| e.id)
            .collect()
    }

    /// True when `entity` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subtype(&self, entity: EntityId, ancestor: EntityId) -> bool {
        self.lineage(entity).any(|id| id == ancestor)
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    /// Borrow an attribute descriptor.
    ///
    /// Panics when `attribute` was not issued by this model.
    #[must_use]
    pub fn attr(&self, attribute: AttributeId) -> &Attribute {
        &self.attributes[attribute.index()]
    }

    pub(crate) fn attr_mut(&mut self, attribute: AttributeId) -> &mut Attribute {
        &mut self.attributes[attribute.index()]
    }

    /// `Entity.symbol` label for diagnostics.
    #[must_use]
    pub fn qualified_symbol(&self, attribute: AttributeId) -> String {
        let attr = self.attr(attribute);

        format!("{}.{}", self.entity_name(attr.declarer), attr.symbol)
    }

    /// The descriptor this one restricts, followed recursively to the original.
    #[must_use]
    pub fn original(&self, attribute: AttributeId) -> AttributeId {
        let mut current = attribute;
        while let Some(parent) = self.attr(current).restriction_of {
            current = parent;
        }

        current
    }

    /// True when both descriptors share the same original descriptor.
    #[must_use]
    pub fn same_lineage(&self, a: AttributeId, b: AttributeId) -> bool {
        self.original(a) == self.original(b)
    }

    // invalidate
    // drop every cached view; called by all mutating registry operations
    pub(crate) fn invalidate(&mut self) {
        self.views.get_mut().clear();
    }
}
