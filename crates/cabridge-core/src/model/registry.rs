//! Module: model::registry
//! Responsibility: attribute declaration, symbol/alias resolution, flag
//! qualification, restriction and removal.
//! Does not own: derived views (`view`) or relational semantics
//! (`inverse`, `dependency`).

use crate::{
    error::{AttributeNotFoundError, Error, MetadataError, TypeMismatchError},
    model::{
        DomainModel,
        attribute::{Attribute, Normalize},
        entity::EntityType,
        flag::Flags,
        kind::{AttributeId, AttributeType, EntityId, Primitive},
    },
};
use tracing::debug;

///
/// AttributeFactory
///
/// Explicit on-demand attribute synthesis for symbols an entity type does not
/// declare up front (e.g. annotation or owner attributes). Registered per
/// entity type and consulted only by `attribute_or_synthesize`.
///

pub trait AttributeFactory {
    fn synthesize(&self, model: &DomainModel, entity: EntityId, symbol: &str)
    -> Option<AttributeSpec>;
}

///
/// AttributeSpec
/// Declaration produced by an `AttributeFactory`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeSpec {
    pub symbol: String,
    pub ty: AttributeType,
    pub flags: Flags,
}

impl DomainModel {
    /// Declare a new attribute on `entity`.
    ///
    /// Shadowing an inherited symbol is allowed; redeclaring a local one is not.
    pub fn add_attribute(
        &mut self,
        entity: EntityId,
        symbol: &str,
        ty: impl Into<AttributeType>,
        flags: Flags,
    ) -> Result<AttributeId, MetadataError> {
        if self.entity(entity).declares(symbol) {
            return Err(MetadataError::DuplicateAttribute {
                entity: self.entity_name(entity).to_string(),
                attribute: symbol.to_string(),
            });
        }
        self.check_flags(entity, symbol, flags)?;

        let ty = ty.into();
        let id = self.next_attribute_id();
        let mut attr = Attribute::new(id, symbol, entity, ty, flags);
        attr.writer.normalize = match ty {
            AttributeType::Primitive(Primitive::Text) => Normalize::Text,
            AttributeType::Primitive(Primitive::Date) => Normalize::Date,
            _ => Normalize::None,
        };

        self.attributes.push(attr);
        let local = self.entity_mut(entity);
        local.attributes.insert(symbol.to_string(), id);
        local.hidden.remove(symbol);
        self.invalidate();

        Ok(id)
    }

    /// Register `alias` as another name for `symbol` on `entity`.
    pub fn add_alias(&mut self, entity: EntityId, alias: &str, symbol: &str) -> Result<(), Error> {
        let canonical = self.attr(self.attribute(entity, symbol)?).symbol.clone();
        if alias != canonical {
            self.entity_mut(entity)
                .aliases
                .insert(alias.to_string(), canonical);
        }

        Ok(())
    }

    /// Resolve a symbol or alias to the descriptor visible on `entity`.
    pub fn attribute(
        &self,
        entity: EntityId,
        name: &str,
    ) -> Result<AttributeId, AttributeNotFoundError> {
        let canonical = self.canonical_symbol(entity, name);

        for id in self.lineage(entity) {
            let node = self.entity(id);
            if node.hidden.contains(canonical) {
                break;
            }
            if let Some(attr) = node.attributes.get(canonical) {
                return Ok(*attr);
            }
        }

        Err(AttributeNotFoundError::new(self.entity_name(entity), name))
    }

    /// Resolve like `attribute`, returning the descriptor itself.
    pub fn attribute_of(&self, entity: EntityId, name: &str) -> Result<&Attribute, Error> {
        Ok(self.attr(self.attribute(entity, name)?))
    }

    /// Resolve `name`, giving registered factories a chance to synthesize a
    /// missing attribute first.
    pub fn attribute_or_synthesize(
        &mut self,
        entity: EntityId,
        name: &str,
    ) -> Result<AttributeId, Error> {
        if let Ok(id) = self.attribute(entity, name) {
            return Ok(id);
        }

        let spec = self.lineage(entity).find_map(|id| {
            self.factories
                .get(&id)
                .and_then(|factory| factory.synthesize(self, entity, name))
        });
        let Some(spec) = spec else {
            return Err(AttributeNotFoundError::new(self.entity_name(entity), name).into());
        };

        debug!(
            entity = self.entity_name(entity),
            attribute = %spec.symbol,
            "synthesized attribute"
        );
        let id = self.add_attribute(entity, &spec.symbol, spec.ty, spec.flags)?;
        if spec.symbol != name {
            self.add_alias(entity, name, &spec.symbol)?;
        }

        Ok(id)
    }

    /// Register the synthesis hook for `entity` and its subtypes.
    pub fn register_factory(&mut self, entity: EntityId, factory: Box<dyn AttributeFactory>) {
        self.factories.insert(entity, factory);
    }

    /// True when `attribute` is declared (or restricted) on `entity` itself.
    #[must_use]
    pub fn is_local(&self, entity: EntityId, attribute: AttributeId) -> bool {
        self.attr(attribute).declarer == entity
    }

    /// Add flags to an attribute as seen from `entity`.
    ///
    /// A local descriptor is updated in place and the flags propagate to its
    /// restrictions. An inherited descriptor is left untouched and a
    /// restricted copy carrying the flags is registered on `entity`.
    pub fn qualify(
        &mut self,
        entity: EntityId,
        symbol: &str,
        flags: Flags,
    ) -> Result<AttributeId, Error> {
        let id = self.attribute(entity, symbol)?;
        if !self.is_local(entity, id) {
            return self.restrict(entity, id, None, flags);
        }

        for chained in self.restriction_closure(id) {
            let attr = self.attr(chained);
            self.check_flags(attr.declarer, symbol, attr.flags | flags)?;
        }
        self.add_flags(id, flags);
        self.invalidate();

        Ok(id)
    }

    /// Copy an inherited attribute onto `entity` with a narrower type and/or
    /// extra flags. The copy links back through `restriction_of`.
    pub fn restrict(
        &mut self,
        entity: EntityId,
        attribute: AttributeId,
        ty: Option<AttributeType>,
        flags: Flags,
    ) -> Result<AttributeId, Error> {
        let original = self.attr(attribute);
        let ty = ty.unwrap_or(original.ty);
        if !self.is_subtype(entity, original.declarer) {
            return Err(TypeMismatchError::new(
                format!("restrict {}", self.qualified_symbol(attribute)),
                format!("a subtype of {}", self.entity_name(original.declarer)),
                self.entity_name(entity),
            )
            .into());
        }
        if !self.is_assignable(ty, original.ty) {
            return Err(TypeMismatchError::new(
                format!("restrict {} on {}", self.qualified_symbol(attribute), self.entity_name(entity)),
                self.type_name(original.ty),
                self.type_name(ty),
            )
            .into());
        }
        let symbol = original.symbol.clone();
        self.check_flags(entity, &symbol, original.flags | flags)?;

        let id = self.next_attribute_id();
        let copy = self.attr(attribute).restricted_copy(id, entity, ty, flags);
        self.attributes.push(copy);
        self.attr_mut(attribute).restrictions.push(id);
        self.entity_mut(entity).attributes.insert(symbol.clone(), id);
        self.invalidate();

        debug!(
            entity = self.entity_name(entity),
            attribute = %symbol,
            "restricted inherited attribute"
        );

        Ok(id)
    }

    /// Remove an attribute from `entity`'s view.
    ///
    /// A local declaration is deleted; an inherited one is hidden on `entity`
    /// and its subtypes while the ancestor keeps it.
    pub fn remove_attribute(&mut self, entity: EntityId, symbol: &str) -> Result<(), Error> {
        let id = self.attribute(entity, symbol)?;
        let canonical = self.attr(id).symbol.clone();

        let local = self.entity_mut(entity);
        let removed = local.attributes.shift_remove(&canonical);
        local.aliases.retain(|_, target| *target != canonical);

        // a removed restriction must not uncover the inherited original
        let restriction_of = removed.and_then(|removed| self.attr(removed).restriction_of);
        if removed.is_none() || restriction_of.is_some() {
            self.entity_mut(entity).hidden.insert(canonical);
        }
        if let (Some(removed), Some(original)) = (removed, restriction_of) {
            self.attr_mut(original).restrictions.retain(|r| *r != removed);
        }
        self.invalidate();

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Keys and mandatory attributes
    // ---------------------------------------------------------------------

    pub fn set_primary_key(&mut self, entity: EntityId, symbols: &[&str]) -> Result<(), Error> {
        let key = self.resolve_symbols(entity, symbols)?;
        self.entity_mut(entity).primary_key = key;
        self.invalidate();

        Ok(())
    }

    pub fn set_secondary_key(&mut self, entity: EntityId, symbols: &[&str]) -> Result<(), Error> {
        let key = self.resolve_symbols(entity, symbols)?;
        self.entity_mut(entity).secondary_key = key;
        self.invalidate();

        Ok(())
    }

    pub fn set_alternate_key(&mut self, entity: EntityId, symbols: &[&str]) -> Result<(), Error> {
        let key = self.resolve_symbols(entity, symbols)?;
        self.entity_mut(entity).alternate_key = key;
        self.invalidate();

        Ok(())
    }

    pub fn add_mandatory_attributes(
        &mut self,
        entity: EntityId,
        symbols: &[&str],
    ) -> Result<(), Error> {
        let symbols = self.resolve_symbols(entity, symbols)?;
        self.entity_mut(entity).mandatory.extend(symbols);
        self.invalidate();

        Ok(())
    }

    /// Primary key symbols, inherited from the nearest ancestor declaring one.
    #[must_use]
    pub fn primary_key(&self, entity: EntityId) -> &[String] {
        self.inherited_key(entity, |e| &e.primary_key)
    }

    #[must_use]
    pub fn secondary_key(&self, entity: EntityId) -> &[String] {
        self.inherited_key(entity, |e| &e.secondary_key)
    }

    #[must_use]
    pub fn alternate_key(&self, entity: EntityId) -> &[String] {
        self.inherited_key(entity, |e| &e.alternate_key)
    }

    // ---------------------------------------------------------------------
    // Type helpers
    // ---------------------------------------------------------------------

    /// True when a value of type `ty` may be stored where `expected` is declared.
    #[must_use]
    pub fn is_assignable(&self, ty: AttributeType, expected: AttributeType) -> bool {
        match (ty, expected) {
            (AttributeType::Entity(a), AttributeType::Entity(b)) => self.is_subtype(a, b),
            (AttributeType::Primitive(_), AttributeType::Primitive(Primitive::Object)) => true,
            (AttributeType::Primitive(a), AttributeType::Primitive(b)) => a == b,
            _ => false,
        }
    }

    #[must_use]
    pub fn type_name(&self, ty: AttributeType) -> String {
        match ty {
            AttributeType::Entity(id) => self.entity_name(id).to_string(),
            AttributeType::Primitive(p) => p.to_string(),
        }
    }

    // canonical_symbol
    // first alias hit walking up the hierarchy, else the name itself
    fn canonical_symbol<'a>(&'a self, entity: EntityId, name: &'a str) -> &'a str {
        self.lineage(entity)
            .find_map(|id| self.entity(id).aliases.get(name))
            .map_or(name, String::as_str)
    }

    fn inherited_key(
        &self,
        entity: EntityId,
        key: impl Fn(&EntityType) -> &Vec<String>,
    ) -> &[String] {
        self.lineage(entity)
            .map(|id| key(self.entity(id)))
            .find(|k| !k.is_empty())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn resolve_symbols(&self, entity: EntityId, symbols: &[&str]) -> Result<Vec<String>, Error> {
        symbols
            .iter()
            .map(|s| Ok(self.attr(self.attribute(entity, s)?).symbol.clone()))
            .collect()
    }

    // add_flags
    // in place, then down every restriction of this descriptor
    pub(crate) fn add_flags(&mut self, attribute: AttributeId, flags: Flags) {
        for id in self.restriction_closure(attribute) {
            self.attr_mut(id).flags |= flags;
        }
    }

    // restriction_closure
    // the descriptor followed by its restrictions, transitively
    pub(crate) fn restriction_closure(&self, attribute: AttributeId) -> Vec<AttributeId> {
        let mut closure = Vec::new();
        let mut pending = vec![attribute];
        while let Some(id) = pending.pop() {
            closure.push(id);
            pending.extend(self.attr(id).restrictions.iter().copied());
        }

        closure
    }

    fn check_flags(&self, entity: EntityId, symbol: &str, flags: Flags) -> Result<(), MetadataError> {
        if flags.contains(Flags::OWNER | Flags::DEPENDENT) {
            return Err(MetadataError::OwnerDependentConflict {
                entity: self.entity_name(entity).to_string(),
                attribute: symbol.to_string(),
            });
        }

        Ok(())
    }

    fn next_attribute_id(&self) -> AttributeId {
        AttributeId(u32::try_from(self.attributes.len()).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kind::Primitive;

    fn base_and_site() -> (DomainModel, EntityId, EntityId) {
        let mut model = DomainModel::new();
        let base = model.add_entity("AbstractDomainObject", None).unwrap();
        let site = model.add_entity("Site", Some(base)).unwrap();
        model
            .add_attribute(base, "identifier", Primitive::Int, Flags::empty())
            .unwrap();
        model
            .add_attribute(site, "name", Primitive::Text, Flags::empty())
            .unwrap();

        (model, base, site)
    }

    #[test]
    fn duplicate_local_attribute_is_rejected() {
        let (mut model, _, site) = base_and_site();

        let err = model
            .add_attribute(site, "name", Primitive::Text, Flags::empty())
            .unwrap_err();

        assert!(matches!(err, MetadataError::DuplicateAttribute { .. }));
    }

    #[test]
    fn inherited_attribute_resolves_on_subtype() {
        let (model, base, site) = base_and_site();

        let id = model.attribute(site, "identifier").unwrap();
        assert_eq!(model.attr(id).declarer(), base);
        assert!(!model.is_local(site, id));
    }

    #[test]
    fn alias_resolves_to_canonical_attribute() {
        let (mut model, _, site) = base_and_site();
        model.add_alias(site, "siteName", "name").unwrap();

        assert_eq!(
            model.attribute(site, "siteName").unwrap(),
            model.attribute(site, "name").unwrap()
        );
    }

    #[test]
    fn unknown_attribute_reports_entity_and_symbol() {
        let (model, _, site) = base_and_site();

        assert_eq!(
            model.attribute(site, "nmae"),
            Err(AttributeNotFoundError::new("Site", "nmae"))
        );
    }

    #[test]
    fn qualify_inherited_attribute_restricts_without_touching_ancestor() {
        let (mut model, base, site) = base_and_site();
        let original = model.attribute(base, "identifier").unwrap();

        let restricted = model.qualify(site, "identifier", Flags::OPTIONAL).unwrap();

        assert_ne!(restricted, original);
        assert!(model.attr(restricted).is_optional());
        assert!(!model.attr(original).is_optional());
        assert_eq!(model.attr(restricted).restriction_of(), Some(original));
        assert_eq!(model.attribute(site, "identifier").unwrap(), restricted);
    }

    #[test]
    fn qualify_original_propagates_to_restrictions() {
        let (mut model, base, site) = base_and_site();
        let restricted = model.qualify(site, "identifier", Flags::OPTIONAL).unwrap();

        model.qualify(base, "identifier", Flags::AUTOGENERATED).unwrap();

        assert!(model.attr(restricted).is_autogenerated());
        assert!(model.attr(restricted).is_optional());
    }

    #[test]
    fn qualify_original_rejects_conflict_on_a_restriction() {
        let (mut model, base, site) = base_and_site();
        model
            .add_attribute(base, "peer", base, Flags::empty())
            .unwrap();
        let restricted = model.qualify(site, "peer", Flags::OWNER).unwrap();
        let original = model.attribute(base, "peer").unwrap();

        let err = model.qualify(base, "peer", Flags::DEPENDENT).unwrap_err();

        assert!(matches!(
            err,
            Error::Metadata(MetadataError::OwnerDependentConflict { .. })
        ));
        assert!(!model.attr(original).is_dependent());
        assert!(!model.attr(restricted).is_dependent());
    }

    #[test]
    fn owner_and_dependent_flags_conflict() {
        let (mut model, _, site) = base_and_site();

        let err = model
            .qualify(site, "name", Flags::OWNER | Flags::DEPENDENT)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Metadata(MetadataError::OwnerDependentConflict { .. })
        ));
    }

    #[test]
    fn restrict_rejects_incompatible_type() {
        let (mut model, _, site) = base_and_site();
        let name = model.attribute(site, "name").unwrap();
        let other = model.add_entity("Other", None).unwrap();

        let err = model
            .restrict(other, name, Some(Primitive::Int.into()), Flags::empty())
            .unwrap_err();

        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn remove_inherited_attribute_hides_it_only_on_subtype() {
        let (mut model, base, site) = base_and_site();

        model.remove_attribute(site, "identifier").unwrap();

        assert!(model.attribute(site, "identifier").is_err());
        assert!(model.attribute(base, "identifier").is_ok());
    }

    #[test]
    fn remove_restricted_attribute_hides_the_original() {
        let (mut model, base, site) = base_and_site();
        let original = model.attribute(base, "identifier").unwrap();
        let restricted = model.qualify(site, "identifier", Flags::OPTIONAL).unwrap();

        model.remove_attribute(site, "identifier").unwrap();

        assert!(model.attribute(site, "identifier").is_err());
        assert_eq!(model.attribute(base, "identifier"), Ok(original));
        assert!(model.attr(original).restrictions().is_empty());

        model.qualify(base, "identifier", Flags::AUTOGENERATED).unwrap();
        assert!(!model.attr(restricted).is_autogenerated());
    }

    #[test]
    fn remove_local_attribute_deletes_it() {
        let (mut model, _, site) = base_and_site();

        model.remove_attribute(site, "name").unwrap();

        assert!(!model.entity(site).declares("name"));
        assert!(model.attribute(site, "name").is_err());
    }

    #[test]
    fn secondary_key_is_inherited() {
        let (mut model, base, site) = base_and_site();
        let tissue_site = model.add_entity("TissueSite", Some(site)).unwrap();
        model.set_secondary_key(site, &["name"]).unwrap();

        assert_eq!(model.secondary_key(tissue_site), ["name".to_string()]);
        assert!(model.secondary_key(base).is_empty());
    }

    struct AnnotationFactory;

    impl AttributeFactory for AnnotationFactory {
        fn synthesize(
            &self,
            _: &DomainModel,
            _: EntityId,
            symbol: &str,
        ) -> Option<AttributeSpec> {
            symbol.strip_suffix("_annotation").map(|_| AttributeSpec {
                symbol: symbol.to_string(),
                ty: Primitive::Object.into(),
                flags: Flags::OPTIONAL,
            })
        }
    }

    #[test]
    fn factory_synthesizes_missing_attribute_once() {
        let (mut model, base, site) = base_and_site();
        model.register_factory(base, Box::new(AnnotationFactory));

        assert!(model.attribute(site, "pathology_annotation").is_err());
        let id = model
            .attribute_or_synthesize(site, "pathology_annotation")
            .unwrap();

        assert_eq!(model.attribute(site, "pathology_annotation").unwrap(), id);
        assert!(model.attribute_or_synthesize(site, "colour").is_err());
    }
}
