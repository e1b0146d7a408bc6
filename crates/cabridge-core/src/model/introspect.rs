//! Module: model::introspect
//! Responsibility: populate an entity type's registry from a native property
//! listing, once.
//! Does not own: where the listing comes from; callers supply a
//! `PropertySource`.

use crate::{
    error::Error,
    model::{
        DomainModel,
        attribute::Accessors,
        flag::Flags,
        kind::{AttributeType, EntityId, Primitive},
        naming,
    },
};
use tracing::debug;

///
/// NativeType
/// Declared type of a native property as reported by the platform.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NativeType {
    Boolean,
    Collection,
    Date,
    Double,
    Entity(String),
    Integer,
    Long,
    Object,
    Text,
}

///
/// PropertyDescriptor
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub reader: String,
    pub writer: String,
    pub ty: NativeType,
    /// Generic element type of a collection, when the platform kept it.
    pub element: Option<NativeType>,
    pub transient: bool,
}

impl PropertyDescriptor {
    /// Property with conventional `getX`/`setX` accessors.
    pub fn new(name: impl Into<String>, ty: NativeType) -> Self {
        let name = name.into();
        let pascal = naming::pascalize(&name);

        Self {
            reader: format!("get{pascal}"),
            writer: format!("set{pascal}"),
            name,
            ty,
            element: None,
            transient: false,
        }
    }

    #[must_use]
    pub fn with_element(mut self, element: NativeType) -> Self {
        self.element = Some(element);
        self
    }

    #[must_use]
    pub const fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.ty == NativeType::Collection
    }
}

///
/// PropertySource
/// Native read/write property pairs declared directly on a type.
///

pub trait PropertySource {
    fn properties(&self, entity: &str) -> Vec<PropertyDescriptor>;
}

impl DomainModel {
    /// Populate `entity` (and its supertypes first) from `source`.
    /// A type already introspected is left untouched.
    pub fn introspect(&mut self, entity: EntityId, source: &dyn PropertySource) -> Result<(), Error> {
        if self.entity(entity).introspected {
            return Ok(());
        }
        if let Some(parent) = self.entity(entity).parent {
            self.introspect(parent, source)?;
        }

        let name = self.entity_name(entity).to_string();
        let properties = source.properties(self.entity(entity).qualified_name());
        let mut added = 0usize;

        for property in properties {
            if property.transient {
                debug!(entity = %name, property = %property.name, "skipped transient property");
                continue;
            }
            if self.add_property(entity, &property)? {
                added += 1;
            }
        }

        self.entity_mut(entity).introspected = true;
        debug!(entity = %name, attributes = added, "introspected entity type");

        Ok(())
    }

    // add_property
    // false when an ancestor already declares the symbol
    fn add_property(&mut self, entity: EntityId, property: &PropertyDescriptor) -> Result<bool, Error> {
        let collection = property.is_collection();
        let symbol = naming::attribute_symbol(&property.name, collection);
        if self.supertypes(entity).any(|s| self.entity(s).declares(&symbol)) {
            return Ok(false);
        }

        let ty = if collection {
            self.infer_element_type(property)
        } else {
            self.resolve_native(&property.ty)
        };
        let flags = if collection {
            Flags::COLLECTION
        } else {
            Flags::empty()
        };

        let attr = self.add_attribute(entity, &symbol, ty, flags)?;
        self.attr_mut(attr).accessors = Some(Accessors {
            property: property.name.clone(),
            reader: property.reader.clone(),
            writer: property.writer.clone(),
        });

        let underscored = naming::underscore(&property.name);
        for alias in [property.name.clone(), naming::camelize(&symbol), underscored] {
            self.add_alias(entity, &alias, &symbol)?;
        }
        if ty == AttributeType::Primitive(Primitive::Bool) {
            self.add_alias(entity, &format!("{symbol}?"), &symbol)?;
        }

        Ok(true)
    }

    // infer_element_type
    // generic argument, then the type named by the property stem, then untyped
    fn infer_element_type(&self, property: &PropertyDescriptor) -> AttributeType {
        if let Some(element) = &property.element {
            return self.resolve_native(element);
        }

        let stem = property
            .name
            .strip_suffix(naming::COLLECTION_SUFFIX)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(&property.name);
        let candidates = [
            naming::pascalize(stem),
            naming::pascalize(&naming::singularize(&naming::underscore(stem))),
        ];

        candidates
            .iter()
            .find_map(|name| self.entity_by_name(name))
            .map_or(Primitive::Object.into(), AttributeType::Entity)
    }

    fn resolve_native(&self, ty: &NativeType) -> AttributeType {
        match ty {
            NativeType::Boolean => Primitive::Bool.into(),
            NativeType::Date => Primitive::Date.into(),
            NativeType::Double => Primitive::Float.into(),
            NativeType::Integer | NativeType::Long => Primitive::Int.into(),
            NativeType::Text => Primitive::Text.into(),
            NativeType::Entity(name) => self
                .entity_by_name(name)
                .or_else(|| self.entity_by_name(naming::demodulize(name)))
                .map_or(Primitive::Object.into(), AttributeType::Entity),
            NativeType::Collection | NativeType::Object => Primitive::Object.into(),
        }
    }
}
