pub mod service;

pub use service::{MemoryService, RecordingSession};

use crate::model::{
    DomainModel,
    flag::Flags,
    introspect::{NativeType, PropertyDescriptor, PropertySource},
    kind::EntityId,
};

/// Service name every fixture type resolves to.
pub const FIXTURE_SERVICE: &str = "catissuecore";

///
/// Fixture
///
/// A small introspected caTissue-like model shared by core tests.
///

pub struct Fixture {
    pub model: DomainModel,
    pub base: EntityId,
    pub study: EntityId,
    pub site: EntityId,
    pub participant: EntityId,
    pub protocol: EntityId,
    pub registration: EntityId,
    pub specimen: EntityId,
    pub tissue_specimen: EntityId,
    pub external_identifier: EntityId,
    pub characteristics: EntityId,
}

///
/// FixtureSource
///

struct FixtureSource;

impl PropertySource for FixtureSource {
    fn properties(&self, entity: &str) -> Vec<PropertyDescriptor> {
        use NativeType::{Boolean, Collection, Date, Double, Entity, Long, Text};

        let entity_ref = |name: &str| Entity(name.to_string());
        match entity {
            "AbstractDomainObject" => vec![PropertyDescriptor::new("identifier", Long)],
            "Study" => vec![
                PropertyDescriptor::new("name", Text),
                PropertyDescriptor::new("code", Text),
                PropertyDescriptor::new("startDate", Date),
                PropertyDescriptor::new("siteCollection", Collection),
            ],
            "Site" => vec![
                PropertyDescriptor::new("name", Text),
                PropertyDescriptor::new("code", Text),
                PropertyDescriptor::new("study", entity_ref("Study")),
            ],
            "Participant" => vec![
                PropertyDescriptor::new("lastName", Text),
                PropertyDescriptor::new("firstName", Text),
                PropertyDescriptor::new("medicalRecordNumber", Text),
            ],
            "Protocol" => vec![
                PropertyDescriptor::new("title", Text),
                PropertyDescriptor::new("registrationCollection", Collection),
            ],
            "Registration" => vec![
                PropertyDescriptor::new("protocol", entity_ref("Protocol")),
                PropertyDescriptor::new("participant", entity_ref("Participant")),
                PropertyDescriptor::new("specimenCollection", Collection),
                PropertyDescriptor::new("registrationDate", Date),
            ],
            "Specimen" => vec![
                PropertyDescriptor::new("label", Text),
                PropertyDescriptor::new("registration", entity_ref("Registration")),
                PropertyDescriptor::new("externalIdentifierCollection", Collection),
                PropertyDescriptor::new("characteristics", entity_ref("Characteristics")),
                PropertyDescriptor::new("quantity", Double),
                PropertyDescriptor::new("available", Boolean),
            ],
            "TissueSpecimen" => vec![PropertyDescriptor::new("tissueType", Text)],
            "ExternalIdentifier" => vec![
                PropertyDescriptor::new("name", Text),
                PropertyDescriptor::new("value", Text),
                PropertyDescriptor::new("specimen", entity_ref("Specimen")),
            ],
            "Characteristics" => vec![PropertyDescriptor::new("tissueSite", Text)],
            _ => Vec::new(),
        }
    }
}

/// Build the fixture model. Panics on any metadata error.
#[must_use]
pub fn fixture() -> Fixture {
    let mut model = DomainModel::new();
    let base = model.add_entity("AbstractDomainObject", None).unwrap();
    model.set_abstract(base, true);
    let study = model.add_entity("Study", Some(base)).unwrap();
    let site = model.add_entity("Site", Some(base)).unwrap();
    let participant = model.add_entity("Participant", Some(base)).unwrap();
    let protocol = model.add_entity("Protocol", Some(base)).unwrap();
    let registration = model.add_entity("Registration", Some(base)).unwrap();
    let specimen = model.add_entity("Specimen", Some(base)).unwrap();
    let tissue_specimen = model.add_entity("TissueSpecimen", Some(specimen)).unwrap();
    let external_identifier = model.add_entity("ExternalIdentifier", Some(base)).unwrap();
    let characteristics = model.add_entity("Characteristics", Some(base)).unwrap();

    let entities = [
        study,
        site,
        participant,
        protocol,
        registration,
        specimen,
        tissue_specimen,
        external_identifier,
        characteristics,
    ];
    for entity in entities {
        model.introspect(entity, &FixtureSource).unwrap();
    }

    model.qualify(base, "identifier", Flags::AUTOGENERATED).unwrap();

    model.add_dependent_attribute(study, "sites", Flags::empty()).unwrap();
    model
        .add_dependent_attribute(protocol, "registrations", Flags::empty())
        .unwrap();
    model
        .add_dependent_attribute(registration, "specimens", Flags::CASCADED)
        .unwrap();
    model
        .add_dependent_attribute(specimen, "external_identifiers", Flags::CASCADED)
        .unwrap();
    model
        .add_dependent_attribute(specimen, "characteristics", Flags::AUTOGENERATED)
        .unwrap();

    model.set_secondary_key(site, &["name", "code"]).unwrap();
    model
        .set_secondary_key(participant, &["medical_record_number"])
        .unwrap();
    model.set_secondary_key(specimen, &["label"]).unwrap();
    model.set_secondary_key(protocol, &["title"]).unwrap();
    model
        .add_mandatory_attributes(registration, &["participant"])
        .unwrap();
    model.set_service(base, FIXTURE_SERVICE);

    Fixture {
        model,
        base,
        study,
        site,
        participant,
        protocol,
        registration,
        specimen,
        tissue_specimen,
        external_identifier,
        characteristics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::view::AttributeView;

    #[test]
    fn fixture_wires_owners_and_inverses() {
        let fx = fixture();
        let model = &fx.model;

        assert_eq!(model.owners(fx.site), vec![fx.study]);
        assert_eq!(model.owners(fx.characteristics), vec![fx.specimen]);
        assert!(model.owner_attribute(fx.characteristics).is_none());
        assert_eq!(
            model.symbols(fx.specimen, AttributeView::Dependent),
            ["external_identifiers", "characteristics"]
        );
        assert!(model.depends_on(fx.external_identifier, fx.protocol, true));
    }
}
