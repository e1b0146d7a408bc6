use crate::{
    error::ValidationError,
    model::DomainModel,
    object::{ObjectGraph, ObjectId},
};

impl ObjectGraph {
    /// Symbols of mandatory attributes of `obj` that are still empty.
    #[must_use]
    pub fn missing_mandatory(&self, model: &DomainModel, obj: ObjectId) -> Vec<String> {
        model
            .mandatory_attributes(self.entity_of(obj))
            .iter()
            .map(|attr| model.attr(*attr).symbol())
            .filter(|symbol| self.value(obj, symbol).is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Reject `obj` when a mandatory attribute is empty. The error carries
    /// the missing symbols and a dump of the object.
    pub fn validate(&self, model: &DomainModel, obj: ObjectId) -> Result<(), ValidationError> {
        let missing = self.missing_mandatory(model, obj);
        if missing.is_empty() {
            return Ok(());
        }

        Err(ValidationError::MissingMandatory {
            entity: model.entity_name(self.entity_of(obj)).to_string(),
            attributes: missing,
            dump: self.dump(model, obj),
        })
    }
}
