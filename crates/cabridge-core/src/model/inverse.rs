//! Module: model::inverse
//! Responsibility: detect and enforce bidirectional attribute pairs.
//! Does not own: runtime propagation of writes (`object::access` consumes the
//! `InverseSync` chosen here).

use crate::{
    error::{Error, MetadataError, TypeMismatchError},
    model::{
        DomainModel,
        attribute::{Attribute, InverseSync, Writer},
        flag::Flags,
        kind::{AttributeId, EntityId},
        naming,
    },
};
use tracing::debug;

impl DomainModel {
    /// Find the attribute on the referenced type that points back at
    /// `entity` through `symbol`. `None` means the relation is unidirectional.
    #[must_use]
    pub fn detect_inverse(&self, entity: EntityId, symbol: &str) -> Option<AttributeId> {
        let attr = self.attribute(entity, symbol).ok()?;
        let target = self.attr(attr).target()?;

        let candidates: Vec<AttributeId> = self
            .all_attributes(target)
            .into_iter()
            .filter(|id| *id != attr)
            .filter(|id| {
                let candidate = self.attr(*id);
                candidate.inverse.is_none()
                    && candidate
                        .target()
                        .is_some_and(|t| self.is_subtype(entity, t))
            })
            .collect();

        if let [only] = candidates.as_slice() {
            return Some(*only);
        }

        let singular = naming::type_symbol(self.entity_name(entity));
        let plural = naming::pluralize(&singular);

        candidates.into_iter().find(|id| {
            let symbol = &self.attr(*id).symbol;
            *symbol == singular || *symbol == plural
        })
    }

    /// Pair `entity.symbol` with `inverse` on the referenced type.
    pub fn set_inverse(&mut self, entity: EntityId, symbol: &str, inverse: &str) -> Result<(), Error> {
        let attr = self.attribute(entity, symbol)?;
        let target = self.domain_target(entity, attr)?;
        let inv = self.attribute(target, inverse)?;

        self.link_inverse(entity, attr, target, inv)
    }

    /// Detect and set the inverse of `entity.symbol`, if one exists.
    pub fn infer_inverse(&mut self, entity: EntityId, symbol: &str) -> Result<Option<AttributeId>, Error> {
        let Some(inv) = self.detect_inverse(entity, symbol) else {
            return Ok(None);
        };
        let attr = self.attribute(entity, symbol)?;
        let target = self.domain_target(entity, attr)?;
        self.link_inverse(entity, attr, target, inv)?;

        Ok(self.attr(self.attribute(entity, symbol)?).inverse)
    }

    // link_inverse
    // establish symmetry between `entity.attr` and `target.inv`
    pub(crate) fn link_inverse(
        &mut self,
        entity: EntityId,
        attr: AttributeId,
        target: EntityId,
        inv: AttributeId,
    ) -> Result<(), Error> {
        // Phase 1: already paired
        if let Some(existing) = self.attr(attr).inverse
            && self.same_lineage(existing, inv)
        {
            return Ok(());
        }

        // Phase 2: type compatibility
        let inv_target = self.domain_target(target, inv)?;
        if !self.is_subtype(entity, inv_target) {
            return Err(TypeMismatchError::new(
                format!(
                    "inverse of {} is {}",
                    self.qualified_symbol(attr),
                    self.qualified_symbol(inv)
                ),
                self.entity_name(inv_target),
                self.entity_name(entity),
            )
            .into());
        }

        // Phase 3: the scalar side owns the inverse writer
        if self.attr(attr).is_collection() && !self.attr(inv).is_collection() {
            return self.link_inverse(target, inv, entity, attr);
        }

        // Phase 4: never mutate an ancestor's descriptor
        let attr = self.localize(entity, attr)?;
        let inv = self.localize(target, inv)?;

        self.check_inverse_conflict(attr, inv)?;
        self.check_inverse_conflict(inv, attr)?;

        // Phase 5: link both ways and install writer sync
        let scalar = !self.attr(attr).is_collection();
        let inv_collection = self.attr(inv).is_collection();
        let reflexive = attr == inv;
        self.update_chain(attr, |a| {
            if a.id == attr || a.inverse.is_none() {
                a.inverse = Some(inv);
            }
            if scalar {
                a.writer.inverse = InverseSync::Scalar;
            }
        });
        self.update_chain(inv, |a| {
            if a.id == inv || a.inverse.is_none() {
                a.inverse = Some(attr);
            }
            if scalar && inv_collection {
                a.writer.inverse = InverseSync::Append;
            } else if scalar && !reflexive {
                a.writer.inverse = InverseSync::Scalar;
            }
        });
        self.invalidate();

        debug!(
            attribute = %self.qualified_symbol(attr),
            inverse = %self.qualified_symbol(inv),
            "set inverse"
        );

        Ok(())
    }

    pub(crate) fn domain_target(&self, entity: EntityId, attr: AttributeId) -> Result<EntityId, MetadataError> {
        self.attr(attr)
            .target()
            .ok_or_else(|| MetadataError::NotDomainAttribute {
                entity: self.entity_name(entity).to_string(),
                attribute: self.attr(attr).symbol.clone(),
            })
    }

    // localize
    // restricted copy on `entity` when the descriptor is inherited
    pub(crate) fn localize(&mut self, entity: EntityId, attr: AttributeId) -> Result<AttributeId, Error> {
        if self.is_local(entity, attr) {
            Ok(attr)
        } else {
            self.restrict(entity, attr, None, Flags::empty())
        }
    }

    fn check_inverse_conflict(&self, attr: AttributeId, inv: AttributeId) -> Result<(), MetadataError> {
        match self.attr(attr).inverse {
            Some(existing) if !self.same_lineage(existing, inv) && !self.inherits_inverse(attr) => {
                let a = self.attr(attr);
                Err(MetadataError::InverseConflict {
                    entity: self.entity_name(a.declarer).to_string(),
                    attribute: a.symbol.clone(),
                    inverse: self.qualified_symbol(inv),
                    existing: self.qualified_symbol(existing),
                })
            }
            _ => Ok(()),
        }
    }

    // inherits_inverse
    // a restriction may replace the inverse copied from its original
    fn inherits_inverse(&self, attr: AttributeId) -> bool {
        self.attr(attr)
            .restriction_of
            .is_some_and(|original| self.attr(original).inverse == self.attr(attr).inverse)
    }

    // update_chain
    // apply to a descriptor and every restriction below it
    pub(crate) fn update_chain(&mut self, attr: AttributeId, f: impl Fn(&mut Attribute)) {
        let mut pending = vec![attr];
        while let Some(id) = pending.pop() {
            let a = self.attr_mut(id);
            f(a);
            pending.extend(a.restrictions.iter().copied());
        }
    }

    /// Writer behavior of an attribute as declared.
    #[must_use]
    pub fn writer(&self, attr: AttributeId) -> Writer {
        self.attr(attr).writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kind::Primitive;
    use proptest::prelude::*;

    fn study_sites() -> (DomainModel, EntityId, EntityId) {
        let mut model = DomainModel::new();
        let study = model.add_entity("Study", None).unwrap();
        let site = model.add_entity("Site", None).unwrap();
        model
            .add_attribute(study, "sites", site, Flags::COLLECTION)
            .unwrap();
        model
            .add_attribute(site, "study", study, Flags::empty())
            .unwrap();
        model
            .add_attribute(site, "name", Primitive::Text, Flags::empty())
            .unwrap();

        (model, study, site)
    }

    #[test]
    fn detect_single_candidate() {
        let (model, study, site) = study_sites();

        assert_eq!(
            model.detect_inverse(study, "sites"),
            Some(model.attribute(site, "study").unwrap())
        );
    }

    #[test]
    fn detect_prefers_type_named_candidate_when_ambiguous() {
        let (mut model, study, site) = study_sites();
        model
            .add_attribute(site, "parent_study", study, Flags::empty())
            .unwrap();

        assert_eq!(
            model.detect_inverse(study, "sites"),
            Some(model.attribute(site, "study").unwrap())
        );
    }

    #[test]
    fn detect_returns_none_for_unrelated_types() {
        let (mut model, study, _) = study_sites();
        let other = model.add_entity("Address", None).unwrap();
        model.add_attribute(study, "address", other, Flags::empty()).unwrap();

        assert_eq!(model.detect_inverse(study, "address"), None);
    }

    #[test]
    fn collection_side_delegates_to_scalar_side() {
        let (mut model, study, site) = study_sites();

        model.set_inverse(study, "sites", "study").unwrap();

        let sites = model.attribute(study, "sites").unwrap();
        let back = model.attribute(site, "study").unwrap();
        assert_eq!(model.attr(sites).inverse(), Some(back));
        assert_eq!(model.attr(back).inverse(), Some(sites));
        assert_eq!(model.writer(back).inverse, InverseSync::Scalar);
        assert_eq!(model.writer(sites).inverse, InverseSync::Append);
    }

    #[test]
    fn one_to_one_installs_scalar_sync_on_both_sides() {
        let mut model = DomainModel::new();
        let participant = model.add_entity("Participant", None).unwrap();
        let record = model.add_entity("MedicalRecord", None).unwrap();
        model.add_attribute(participant, "medical_record", record, Flags::empty()).unwrap();
        model.add_attribute(record, "participant", participant, Flags::empty()).unwrap();

        model.set_inverse(participant, "medical_record", "participant").unwrap();

        for (entity, symbol) in [(participant, "medical_record"), (record, "participant")] {
            let id = model.attribute(entity, symbol).unwrap();
            assert_eq!(model.writer(id).inverse, InverseSync::Scalar);
        }
    }

    #[test]
    fn setting_same_inverse_twice_is_a_no_op() {
        let (mut model, study, _) = study_sites();
        model.set_inverse(study, "sites", "study").unwrap();

        assert!(model.set_inverse(study, "sites", "study").is_ok());
    }

    #[test]
    fn incompatible_inverse_type_is_rejected_at_declaration() {
        let (mut model, study, site) = study_sites();
        let address = model.add_entity("Address", None).unwrap();
        model.add_attribute(site, "address", address, Flags::empty()).unwrap();

        let err = model.set_inverse(study, "sites", "address").unwrap_err();

        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn conflicting_inverse_is_a_metadata_error() {
        let (mut model, study, site) = study_sites();
        model.add_attribute(study, "lead_site", site, Flags::empty()).unwrap();
        model.set_inverse(study, "sites", "study").unwrap();

        let err = model.set_inverse(study, "lead_site", "study").unwrap_err();

        assert!(matches!(err, Error::Metadata(MetadataError::InverseConflict { .. })));
    }

    #[test]
    fn inherited_attribute_is_restricted_before_linking() {
        let mut model = DomainModel::new();
        let specimen = model.add_entity("Specimen", None).unwrap();
        let tissue = model.add_entity("TissueSpecimen", Some(specimen)).unwrap();
        let event = model.add_entity("SpecimenEvent", None).unwrap();
        let base = model
            .add_attribute(specimen, "events", event, Flags::COLLECTION)
            .unwrap();
        model
            .add_attribute(event, "tissue_specimen", tissue, Flags::empty())
            .unwrap();

        model.set_inverse(tissue, "events", "tissue_specimen").unwrap();

        let local = model.attribute(tissue, "events").unwrap();
        assert_ne!(local, base);
        assert_eq!(model.attr(local).restriction_of(), Some(base));
        assert!(model.attr(local).inverse().is_some());
        assert_eq!(model.attr(base).inverse(), None);
    }

    proptest! {
        #[test]
        fn set_inverse_is_symmetric(many in any::<bool>(), back_many in any::<bool>(), inherited in any::<bool>()) {
            let mut model = DomainModel::new();
            let base = model.add_entity("Program", None).unwrap();
            let owner = if inherited {
                model.add_entity("Protocol", Some(base)).unwrap()
            } else {
                base
            };
            let item = model.add_entity("Event", None).unwrap();
            let flags = if many { Flags::COLLECTION } else { Flags::empty() };
            let back_flags = if back_many { Flags::COLLECTION } else { Flags::empty() };
            model.add_attribute(base, "events", item, flags).unwrap();
            model.add_attribute(item, "protocol", base, back_flags).unwrap();

            model.set_inverse(owner, "events", "protocol").unwrap();

            let a = model.attribute(owner, "events").unwrap();
            let b = model.attribute(item, "protocol").unwrap();
            let a_inv = model.attr(a).inverse().unwrap();
            let b_inv = model.attr(b).inverse().unwrap();
            prop_assert!(model.same_lineage(a_inv, b));
            prop_assert!(model.same_lineage(b_inv, a));
        }
    }
}
