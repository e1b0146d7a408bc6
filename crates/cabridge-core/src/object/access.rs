//! Module: object::access
//! Responsibility: the single generic attribute read/write path.
//! Does not own: choosing writer behavior; that is declared on the
//! `Attribute` descriptor (`Writer`) and only consulted here.
//!
//! Invariant: after any write through `set_attribute`, a scalar attribute
//! with an inverse is mirrored on the referenced object (scalar inverse set,
//! or collection inverse containing the writer's object).

use crate::{
    error::{Error, MetadataError, ValidationError},
    model::{
        DomainModel,
        attribute::{Attribute, InverseSync, Normalize},
        kind::{AttributeId, AttributeType, Primitive},
        view::AttributeView,
    },
    object::{ObjectGraph, ObjectId, Value},
};
use tracing::warn;

impl ObjectGraph {
    /// Read an attribute by symbol or alias.
    pub fn get_attribute(
        &self,
        model: &DomainModel,
        obj: ObjectId,
        name: &str,
    ) -> Result<&Value, Error> {
        let attr = model.attribute(self.entity_of(obj), name)?;

        Ok(self.value(obj, model.attr(attr).symbol()))
    }

    /// Write an attribute by symbol or alias, applying the descriptor's
    /// writer: input normalization, type check, owner-change warning and
    /// inverse synchronization.
    pub fn set_attribute(
        &mut self,
        model: &DomainModel,
        obj: ObjectId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let attr_id = model.attribute(self.entity_of(obj), name)?;
        let attr = model.attr(attr_id);
        let value = self.normalize(model, obj, attr, value.into())?;
        let old = self.value(obj, attr.symbol()).clone();
        if old == value {
            return Ok(());
        }

        let writer = attr.writer();
        if writer.warn_owner_change
            && let (Some(from), Some(to)) = (old.as_object(), value.as_object())
        {
            warn!(
                object = %self.describe_ref(model, obj),
                attribute = attr.symbol(),
                from = %self.describe_ref(model, from),
                to = %self.describe_ref(model, to),
                "owner reassigned"
            );
        }

        self.put(obj, attr.symbol(), value.clone());

        match (writer.inverse, attr.inverse()) {
            (InverseSync::Scalar, Some(inverse)) => {
                self.sync_scalar(model, obj, attr_id, inverse, &old, &value);
            }
            (InverseSync::Append, Some(inverse)) => {
                self.sync_append(model, obj, attr_id, inverse, &old, &value);
            }
            _ => {}
        }

        Ok(())
    }

    /// Add `item` to a collection attribute unless already present.
    pub fn add_to(
        &mut self,
        model: &DomainModel,
        obj: ObjectId,
        name: &str,
        item: impl Into<Value>,
    ) -> Result<(), Error> {
        let attr = self.collection_attribute(model, obj, name)?;
        let item = item.into();
        let mut items = self.value(obj, attr.symbol()).as_list().unwrap_or_default().to_vec();
        if items.contains(&item) {
            return Ok(());
        }
        items.push(item);

        self.set_attribute(model, obj, attr.symbol(), Value::List(items))
    }

    /// Remove `item` from a collection attribute.
    pub fn remove_from(
        &mut self,
        model: &DomainModel,
        obj: ObjectId,
        name: &str,
        item: &Value,
    ) -> Result<(), Error> {
        let attr = self.collection_attribute(model, obj, name)?;
        let items: Vec<Value> = self
            .value(obj, attr.symbol())
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter(|v| *v != item)
            .cloned()
            .collect();
        let value = if items.is_empty() {
            Value::Null
        } else {
            Value::List(items)
        };

        self.set_attribute(model, obj, attr.symbol(), value)
    }

    /// The `identifier` (primary key) value, when set.
    #[must_use]
    pub fn identifier(&self, obj: ObjectId) -> Option<i64> {
        self.value(obj, IDENTIFIER).as_int()
    }

    pub fn set_identifier(&mut self, obj: ObjectId, identifier: Option<i64>) {
        self.put(obj, IDENTIFIER, identifier.map_or(Value::Null, Value::Int));
    }

    /// Objects referenced from `obj` through the attributes in `view`.
    #[must_use]
    pub fn references(&self, model: &DomainModel, obj: ObjectId, view: AttributeView) -> Vec<ObjectId> {
        model
            .attributes(self.entity_of(obj), view)
            .iter()
            .flat_map(|attr| self.value(obj, model.attr(*attr).symbol()).refs())
            .collect()
    }

    /// The first populated owner reference of `obj`.
    #[must_use]
    pub fn owner(&self, model: &DomainModel, obj: ObjectId) -> Option<ObjectId> {
        model
            .owner_attributes(self.entity_of(obj))
            .into_iter()
            .find_map(|attr| self.value(obj, model.attr(attr).symbol()).as_object())
    }

    /// Objects held through dependent attributes of `obj`.
    #[must_use]
    pub fn dependents_of(&self, model: &DomainModel, obj: ObjectId) -> Vec<ObjectId> {
        self.references(model, obj, AttributeView::Dependent)
    }

    #[must_use]
    pub fn is_owner_of(&self, model: &DomainModel, owner: ObjectId, dependent: ObjectId) -> bool {
        self.owner(model, dependent) == Some(owner)
    }

    // normalize
    // writer input normalization, then a type check against the descriptor
    fn normalize(
        &self,
        model: &DomainModel,
        obj: ObjectId,
        attr: &Attribute,
        value: Value,
    ) -> Result<Value, ValidationError> {
        let value = match (attr.writer().normalize, value) {
            (Normalize::Text, Value::Text(s)) if s.is_empty() => Value::Null,
            (Normalize::Date, Value::NativeDate(native)) => model
                .date_converter()
                .to_internal(native)
                .map(Value::Date)
                .ok_or_else(|| self.incompatible(model, obj, attr, format!("{native} is out of range")))?,
            (_, Value::List(items)) if items.is_empty() => Value::Null,
            (_, value) => value,
        };

        match &value {
            Value::Null => {}
            Value::List(items) if attr.is_collection() => {
                for item in items {
                    self.check_type(model, obj, attr, item)?;
                }
            }
            _ if attr.is_collection() => {
                return Err(self.incompatible(
                    model,
                    obj,
                    attr,
                    format!("expected a list, found {}", value.kind()),
                ));
            }
            item => self.check_type(model, obj, attr, item)?,
        }

        Ok(value)
    }

    fn check_type(
        &self,
        model: &DomainModel,
        obj: ObjectId,
        attr: &Attribute,
        value: &Value,
    ) -> Result<(), ValidationError> {
        let ok = match (attr.ty(), value) {
            (AttributeType::Entity(target), Value::Ref(id)) => {
                self.contains(*id) && model.is_subtype(self.entity_of(*id), target)
            }
            (AttributeType::Primitive(Primitive::Object), _)
            | (AttributeType::Primitive(Primitive::Bool), Value::Bool(_))
            | (AttributeType::Primitive(Primitive::Int), Value::Int(_))
            | (AttributeType::Primitive(Primitive::Float), Value::Float(_) | Value::Int(_))
            | (AttributeType::Primitive(Primitive::Text), Value::Text(_))
            | (AttributeType::Primitive(Primitive::Date), Value::Date(_)) => true,
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(self.incompatible(
                model,
                obj,
                attr,
                format!("expected {}, found {}", model.type_name(attr.ty()), value.kind()),
            ))
        }
    }

    fn incompatible(
        &self,
        model: &DomainModel,
        obj: ObjectId,
        attr: &Attribute,
        reason: String,
    ) -> ValidationError {
        ValidationError::IncompatibleValue {
            entity: model.entity_name(self.entity_of(obj)).to_string(),
            attribute: attr.symbol().to_string(),
            reason,
        }
    }

    fn collection_attribute<'m>(
        &self,
        model: &'m DomainModel,
        obj: ObjectId,
        name: &str,
    ) -> Result<&'m Attribute, Error> {
        let entity = self.entity_of(obj);
        let attr = model.attr(model.attribute(entity, name)?);
        if !attr.is_collection() {
            return Err(MetadataError::NotCollection {
                entity: model.entity_name(entity).to_string(),
                attribute: attr.symbol().to_string(),
            }
            .into());
        }

        Ok(attr)
    }

    // sync_scalar
    // `obj.attr` changed from `old` to `new`; mirror it on the inverse side
    fn sync_scalar(
        &mut self,
        model: &DomainModel,
        obj: ObjectId,
        attr: AttributeId,
        inverse: AttributeId,
        old: &Value,
        new: &Value,
    ) {
        let symbol = model.attr(attr).symbol();
        let inv = model.attr(inverse);

        if let Some(previous) = old.as_object() {
            if inv.is_collection() {
                self.raw_remove(previous, inv.symbol(), obj);
            } else if self.value(previous, inv.symbol()).as_object() == Some(obj) {
                self.put(previous, inv.symbol(), Value::Null);
            }
        }

        let Some(target) = new.as_object() else {
            return;
        };
        if inv.is_collection() {
            self.raw_add(target, inv.symbol(), obj);
        } else {
            let displaced = self.put(target, inv.symbol(), Value::Ref(obj)).as_object();
            if let Some(displaced) = displaced
                && displaced != obj
                && self.value(displaced, symbol).as_object() == Some(target)
            {
                self.put(displaced, symbol, Value::Null);
            }
        }
    }

    // sync_append
    // collection side of a one-to-many: added items point back at `obj`,
    // removed items that still point at `obj` are cleared
    fn sync_append(
        &mut self,
        model: &DomainModel,
        obj: ObjectId,
        attr: AttributeId,
        inverse: AttributeId,
        old: &Value,
        new: &Value,
    ) {
        let symbol = model.attr(attr).symbol();
        let inv = model.attr(inverse).symbol();
        let before = old.refs();
        let after = new.refs();

        for removed in before.iter().filter(|id| !after.contains(id)) {
            if self.value(*removed, inv).as_object() == Some(obj) {
                self.put(*removed, inv, Value::Null);
            }
        }

        for added in after.iter().filter(|id| !before.contains(id)) {
            let previous = self.put(*added, inv, Value::Ref(obj)).as_object();
            if let Some(previous) = previous
                && previous != obj
            {
                self.raw_remove(previous, symbol, *added);
            }
        }
    }

    fn raw_add(&mut self, obj: ObjectId, symbol: &str, item: ObjectId) {
        let mut items = self.value(obj, symbol).as_list().unwrap_or_default().to_vec();
        if !items.contains(&Value::Ref(item)) {
            items.push(Value::Ref(item));
            self.put(obj, symbol, Value::List(items));
        }
    }

    fn raw_remove(&mut self, obj: ObjectId, symbol: &str, item: ObjectId) {
        let items: Vec<Value> = self
            .value(obj, symbol)
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter(|v| **v != Value::Ref(item))
            .cloned()
            .collect();
        let value = if items.is_empty() {
            Value::Null
        } else {
            Value::List(items)
        };
        self.put(obj, symbol, value);
    }

    fn describe_ref(&self, model: &DomainModel, obj: ObjectId) -> String {
        format!("{}{obj}", model.entity_name(self.entity_of(obj)))
    }
}

/// Canonical symbol of the primary key attribute.
pub const IDENTIFIER: &str = "identifier";
