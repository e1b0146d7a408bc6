//! Module: migrate
//! Responsibility: materialize domain objects from flat `column → text`
//! rows using the attribute metadata and dependency graph.
//! Does not own: reading input files or saving the results.

use crate::{
    error::{Error, MetadataError, MigrationError},
    model::{
        DomainModel,
        kind::{AttributeId, AttributeType, EntityId, Primitive},
        view::AttributeView,
    },
    object::{ObjectGraph, ObjectId, Value},
};
use cabridge_config::MigrationConfig;
use chrono::{NaiveDate, TimeZone};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

///
/// ColumnMapping
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnMapping {
    pub column: String,
    pub entity: EntityId,
    pub attribute: AttributeId,
}

///
/// DefaultValue
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DefaultValue {
    pub entity: EntityId,
    pub attribute: AttributeId,
    pub text: String,
}

///
/// MigrationSpec
/// Which columns feed which attributes, and the type each row migrates into.
///

#[derive(Clone, Debug)]
pub struct MigrationSpec {
    pub target: EntityId,
    pub columns: Vec<ColumnMapping>,
    pub defaults: Vec<DefaultValue>,
}

impl MigrationSpec {
    #[must_use]
    pub const fn new(target: EntityId) -> Self {
        Self {
            target,
            columns: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Map `column` onto `entity.attribute`.
    pub fn map(
        mut self,
        model: &DomainModel,
        column: &str,
        entity: &str,
        attribute: &str,
    ) -> Result<Self, Error> {
        let entity = model.require_entity(entity)?;
        let attribute = model.attribute(entity, attribute)?;
        self.columns.push(ColumnMapping {
            column: column.to_string(),
            entity,
            attribute,
        });

        Ok(self)
    }

    /// Text applied to `entity.attribute` when a row leaves it empty.
    pub fn default_value(
        mut self,
        model: &DomainModel,
        entity: &str,
        attribute: &str,
        text: &str,
    ) -> Result<Self, Error> {
        let entity = model.require_entity(entity)?;
        let attribute = model.attribute(entity, attribute)?;
        self.defaults.push(DefaultValue {
            entity,
            attribute,
            text: text.to_string(),
        });

        Ok(self)
    }

    pub fn from_config(model: &DomainModel, config: &MigrationConfig) -> Result<Self, Error> {
        let mut spec = Self::new(model.require_entity(&config.target)?);

        for (column, path) in &config.mapping {
            let (entity, attribute) = split(path)?;
            spec = spec.map(model, column, entity, attribute)?;
        }
        for (path, text) in &config.defaults {
            let (entity, attribute) = split(path)?;
            spec = spec.default_value(model, entity, attribute, text)?;
        }

        Ok(spec)
    }

    // entities
    // every type a row can instantiate, target first
    fn entities(&self) -> Vec<EntityId> {
        let mut entities = vec![self.target];
        for entity in self
            .columns
            .iter()
            .map(|c| c.entity)
            .chain(self.defaults.iter().map(|d| d.entity))
        {
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }

        entities
    }
}

fn split(path: &str) -> Result<(&str, &str), Error> {
    MigrationConfig::split_path(path).ok_or_else(|| {
        MetadataError::UnknownEntity(path.to_string()).into()
    })
}

///
/// Migrator
///

pub struct Migrator<'m> {
    model: &'m DomainModel,
    spec: MigrationSpec,
}

impl<'m> Migrator<'m> {
    /// Mapped attributes must be nondomain; references are resolved from the
    /// row's own objects.
    pub fn new(model: &'m DomainModel, spec: MigrationSpec) -> Result<Self, Error> {
        let mapped = spec
            .columns
            .iter()
            .map(|c| (c.entity, c.attribute))
            .chain(spec.defaults.iter().map(|d| (d.entity, d.attribute)));
        for (entity, attribute) in mapped {
            if model.attr(attribute).is_domain() {
                return Err(MigrationError::UnmappableAttribute {
                    entity: model.entity_name(entity).to_string(),
                    attribute: model.attr(attribute).symbol().to_string(),
                }
                .into());
            }
        }

        Ok(Self { model, spec })
    }

    #[must_use]
    pub const fn spec(&self) -> &MigrationSpec {
        &self.spec
    }

    /// Migrate every row, returning the target objects in row order.
    pub fn migrate<I>(&self, graph: &mut ObjectGraph, rows: I) -> Result<Vec<ObjectId>, Error>
    where
        I: IntoIterator<Item = BTreeMap<String, String>>,
    {
        rows.into_iter()
            .enumerate()
            .map(|(index, row)| self.migrate_row(graph, index, &row))
            .collect()
    }

    /// Build the objects of one row and return its validated target. A failed
    /// row leaves `graph` as it was.
    pub fn migrate_row(
        &self,
        graph: &mut ObjectGraph,
        row: usize,
        values: &BTreeMap<String, String>,
    ) -> Result<ObjectId, Error> {
        let start = graph.len();
        let result = self.build_row(graph, row, values);
        if result.is_err() {
            graph.truncate(start);
        }

        result
    }

    // build_row
    // row objects only reference each other, so truncation drops them cleanly
    fn build_row(
        &self,
        graph: &mut ObjectGraph,
        row: usize,
        values: &BTreeMap<String, String>,
    ) -> Result<ObjectId, Error> {
        let model = self.model;

        // Phase 1: parse mapped columns, grouped by the type they populate
        let mut parsed: IndexMap<EntityId, Vec<(AttributeId, Value)>> = IndexMap::new();
        for mapping in &self.spec.columns {
            let Some(text) = values.get(&mapping.column).map(|t| t.trim()) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let value = self.parse(row, mapping.entity, mapping.attribute, text)?;
            parsed
                .entry(mapping.entity)
                .or_default()
                .push((mapping.attribute, value));
        }

        // Phase 2: one instance per type with values, then defaults
        let mut instances: IndexMap<EntityId, ObjectId> = IndexMap::new();
        for entity in self.spec.entities() {
            let Some(assignments) = parsed.get(&entity) else {
                continue;
            };
            let obj = graph.create(entity);
            for (attribute, value) in assignments {
                graph.set_attribute(model, obj, model.attr(*attribute).symbol(), value.clone())?;
            }
            instances.insert(entity, obj);
        }
        for default in &self.spec.defaults {
            let Some(obj) = instances.get(&default.entity).copied() else {
                continue;
            };
            let symbol = model.attr(default.attribute).symbol();
            if graph.value(obj, symbol).is_empty() {
                let value = self.parse(row, default.entity, default.attribute, &default.text)?;
                graph.set_attribute(model, obj, symbol, value)?;
            }
        }

        // Phase 3: owners, then independent references
        let objects: Vec<ObjectId> = instances.values().copied().collect();
        for obj in &objects {
            self.attach_owners(graph, *obj, &objects)?;
        }
        for obj in &objects {
            self.attach_references(graph, row, *obj, &objects)?;
        }

        let target = instances
            .get(&self.spec.target)
            .copied()
            .ok_or_else(|| MigrationError::MissingTarget {
                row,
                entity: model.entity_name(self.spec.target).to_string(),
            })?;
        graph.validate(model, target)?;
        debug!(row, target = %graph.dump(model, target), "migrated row");

        Ok(target)
    }

    fn attach_owners(
        &self,
        graph: &mut ObjectGraph,
        obj: ObjectId,
        objects: &[ObjectId],
    ) -> Result<(), Error> {
        let model = self.model;
        for attr in model.owner_attributes(graph.entity_of(obj)) {
            let symbol = model.attr(attr).symbol();
            if !graph.value(obj, symbol).is_null() {
                continue;
            }
            if let Some(owner) = self.candidates(graph, obj, attr, objects).first() {
                graph.set_attribute(model, obj, symbol, *owner)?;
            }
        }

        Ok(())
    }

    // attach_references
    // an independent reference is set only when exactly one row object fits
    fn attach_references(
        &self,
        graph: &mut ObjectGraph,
        row: usize,
        obj: ObjectId,
        objects: &[ObjectId],
    ) -> Result<(), Error> {
        let model = self.model;
        let entity = graph.entity_of(obj);
        for attr in model.attributes(entity, AttributeView::SavedIndependent).iter() {
            let symbol = model.attr(*attr).symbol();
            if !graph.value(obj, symbol).is_empty() {
                continue;
            }

            match self.candidates(graph, obj, *attr, objects).as_slice() {
                [] => {}
                [only] if model.attr(*attr).is_collection() => {
                    graph.add_to(model, obj, symbol, *only)?;
                }
                [only] => graph.set_attribute(model, obj, symbol, *only)?,
                many => warn!(
                    row,
                    entity = model.entity_name(entity),
                    attribute = symbol,
                    candidates = many.len(),
                    "ambiguous reference skipped"
                ),
            }
        }

        Ok(())
    }

    fn candidates(
        &self,
        graph: &ObjectGraph,
        obj: ObjectId,
        attr: AttributeId,
        objects: &[ObjectId],
    ) -> Vec<ObjectId> {
        let Some(target) = self.model.attr(attr).target() else {
            return Vec::new();
        };

        objects
            .iter()
            .copied()
            .filter(|other| *other != obj && self.model.is_subtype(graph.entity_of(*other), target))
            .collect()
    }

    fn parse(
        &self,
        row: usize,
        entity: EntityId,
        attribute: AttributeId,
        text: &str,
    ) -> Result<Value, MigrationError> {
        let attr = self.model.attr(attribute);
        let AttributeType::Primitive(primitive) = attr.ty() else {
            return Err(self.parse_error(row, entity, attribute, text, "a primitive"));
        };

        let value = match primitive {
            Primitive::Text | Primitive::Object => Some(Value::Text(text.to_string())),
            Primitive::Bool => parse_bool(text).map(Value::Bool),
            Primitive::Int => text.parse().ok().map(Value::Int),
            Primitive::Float => text.parse().ok().map(Value::Float),
            Primitive::Date => self.parse_date(text).map(Value::Date),
        };

        value.ok_or_else(|| {
            self.parse_error(row, entity, attribute, text, &primitive.to_string())
        })
    }

    // parse_date
    // calendar dates are taken at midnight in the converter's zone
    fn parse_date(&self, text: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        let date = DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok())?;
        let midnight = date.and_hms_opt(0, 0, 0)?;

        self.model
            .date_converter()
            .zone()
            .from_local_datetime(&midnight)
            .earliest()
            .map(|date| date.fixed_offset())
    }

    fn parse_error(
        &self,
        row: usize,
        entity: EntityId,
        attribute: AttributeId,
        text: &str,
        expected: &str,
    ) -> MigrationError {
        MigrationError::Parse {
            row,
            entity: self.model.entity_name(entity).to_string(),
            attribute: self.model.attr(attribute).symbol().to_string(),
            text: text.to_string(),
            expected: expected.to_string(),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}
