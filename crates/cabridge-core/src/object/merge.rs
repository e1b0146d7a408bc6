//! Non-destructive merge of attribute values.
//!
//! A populated target value is never overwritten by a different source
//! value. Conflicts are silently kept; callers that need last-writer-wins
//! must write explicitly.

use crate::{
    error::Error,
    model::{DomainModel, view::AttributeView},
    object::{DomainObject, ObjectGraph, ObjectId, Value},
};

///
/// Merge
/// Outcome of merging one source value into one target value.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Merge {
    /// Source is empty or equal to the target.
    Skip,
    /// Target takes this value.
    Assign(Value),
    /// Target is populated with a conflicting value and is left unchanged.
    Keep,
}

/// Decide how `new` merges into `old`.
#[must_use]
pub fn merge_value(old: &Value, new: &Value) -> Merge {
    if new.is_empty() || old == new {
        return Merge::Skip;
    }
    if old.is_empty() {
        return Merge::Assign(new.clone());
    }

    match (old, new) {
        (Value::List(current), Value::List(incoming)) => {
            let mut merged = current.clone();
            for item in incoming {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            if merged.len() == current.len() {
                Merge::Skip
            } else {
                Merge::Assign(Value::List(merged))
            }
        }
        _ => Merge::Keep,
    }
}

impl ObjectGraph {
    /// Merge the nondomain attribute values of `source` (from any graph)
    /// into `target`. Returns the number of attributes changed.
    pub fn merge_nondomain(
        &mut self,
        model: &DomainModel,
        target: ObjectId,
        source: &DomainObject,
    ) -> Result<usize, Error> {
        let entity = self.entity_of(target);
        let mut changed = 0;

        for attr in model.attributes(entity, AttributeView::Nondomain).iter() {
            let symbol = model.attr(*attr).symbol();
            if let Merge::Assign(value) = merge_value(self.value(target, symbol), source.value(symbol)) {
                self.set_attribute(model, target, symbol, value)?;
                changed += 1;
            }
        }

        Ok(changed)
    }

    /// Merge a `symbol → value` map into `target`; references must already
    /// belong to this graph.
    pub fn merge_values<'a>(
        &mut self,
        model: &DomainModel,
        target: ObjectId,
        values: impl IntoIterator<Item = (&'a str, &'a Value)>,
    ) -> Result<usize, Error> {
        let mut changed = 0;
        for (name, value) in values {
            let current = self.get_attribute(model, target, name)?.clone();
            if let Merge::Assign(value) = merge_value(&current, value) {
                self.set_attribute(model, target, name, value)?;
                changed += 1;
            }
        }

        Ok(changed)
    }
}
