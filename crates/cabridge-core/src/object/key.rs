//! Key values used to find and match objects: the primary key (`identifier`
//! by default), then the secondary key, then the alternate key.

use crate::{
    model::DomainModel,
    object::{ObjectGraph, ObjectId, Value, access::IDENTIFIER},
};
use derive_more::Display;

///
/// KeyKind
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum KeyKind {
    Primary,
    Secondary,
    Alternate,
}

impl KeyKind {
    pub const ALL: [Self; 3] = [Self::Primary, Self::Secondary, Self::Alternate];
}

impl ObjectGraph {
    /// Symbols of a key of `obj`'s entity type.
    #[must_use]
    pub fn key_symbols(&self, model: &DomainModel, obj: ObjectId, kind: KeyKind) -> Vec<String> {
        let entity = self.entity_of(obj);
        match kind {
            KeyKind::Primary => {
                let declared = model.primary_key(entity);
                if declared.is_empty() && model.attribute(entity, IDENTIFIER).is_ok() {
                    vec![IDENTIFIER.to_string()]
                } else {
                    declared.to_vec()
                }
            }
            KeyKind::Secondary => model.secondary_key(entity).to_vec(),
            KeyKind::Alternate => model.alternate_key(entity).to_vec(),
        }
    }

    /// Comparable key values, or `None` when the key is undeclared or any
    /// component is empty. References compare by the referenced identifier.
    #[must_use]
    pub fn key_values(&self, model: &DomainModel, obj: ObjectId, kind: KeyKind) -> Option<Vec<Value>> {
        let symbols = self.key_symbols(model, obj, kind);
        if symbols.is_empty() {
            return None;
        }

        symbols
            .iter()
            .map(|symbol| {
                let value = self.comparable(self.value(obj, symbol));
                (!value.is_empty()).then_some(value)
            })
            .collect()
    }

    /// The first complete key of `obj`, in primary/secondary/alternate order.
    #[must_use]
    pub fn searchable_key(&self, model: &DomainModel, obj: ObjectId) -> Option<(KeyKind, Vec<Value>)> {
        KeyKind::ALL
            .into_iter()
            .find_map(|kind| self.key_values(model, obj, kind).map(|values| (kind, values)))
    }

    /// True when `obj` and `other` (possibly in another graph) agree on the
    /// first key both have complete.
    #[must_use]
    pub fn key_matches(
        &self,
        model: &DomainModel,
        obj: ObjectId,
        other_graph: &Self,
        other: ObjectId,
    ) -> bool {
        if !model.is_subtype(other_graph.entity_of(other), self.entity_of(obj))
            && !model.is_subtype(self.entity_of(obj), other_graph.entity_of(other))
        {
            return false;
        }

        KeyKind::ALL.into_iter().find_map(|kind| {
            let mine = self.key_values(model, obj, kind)?;
            let theirs = other_graph.key_values(model, other, kind)?;
            Some(mine == theirs)
        }) == Some(true)
    }

    fn comparable(&self, value: &Value) -> Value {
        match value {
            Value::Ref(id) => self.identifier(*id).map_or(Value::Null, Value::Int),
            other => other.clone(),
        }
    }
}
