//! Module: model::dependency
//! Responsibility: owner/dependent relations between entity types.
//! Does not own: runtime owner lookup on instances (`object::access`).
//! Boundary: the graph must be fully declared before any dependency view of a
//! type is read; later `add_owner` calls fail.

use crate::{
    error::{Error, MetadataError, TypeMismatchError, ValidationError},
    model::{
        DomainModel,
        flag::Flags,
        kind::{AttributeId, EntityId},
        naming,
        view::AttributeView,
    },
};
use std::{collections::HashSet, rc::Rc};
use tracing::debug;

impl DomainModel {
    /// Mark `owner.symbol` as a dependent reference and record the reverse
    /// owner relation on the referenced type.
    pub fn add_dependent_attribute(
        &mut self,
        owner: EntityId,
        symbol: &str,
        flags: Flags,
    ) -> Result<AttributeId, Error> {
        let existing = self.attribute(owner, symbol)?;
        let dependent = self.domain_target(owner, existing)?;
        self.check_owner_open(dependent, owner)?;

        let snapshot: Vec<(AttributeId, Flags)> = self
            .restriction_closure(existing)
            .into_iter()
            .map(|id| (id, self.attr(id).flags))
            .collect();
        let attr = self.qualify(owner, symbol, Flags::DEPENDENT | flags)?;
        let canonical = self.attr(attr).symbol.clone();
        let known = self
            .attr(attr)
            .inverse
            .map(|inv| self.attr(inv).symbol.clone());

        if let Err(err) = self.add_owner(dependent, owner, Some(&canonical), known.as_deref()) {
            self.revert_dependent(owner, existing, attr, &snapshot);
            return Err(err);
        }

        Ok(self.attribute(owner, &canonical)?)
    }

    // revert_dependent
    // undo the qualify step of a failed add_dependent_attribute
    fn revert_dependent(
        &mut self,
        owner: EntityId,
        existing: AttributeId,
        attr: AttributeId,
        snapshot: &[(AttributeId, Flags)],
    ) {
        for (id, flags) in snapshot {
            self.attr_mut(*id).flags = *flags;
        }
        if attr != existing {
            let symbol = self.attr(attr).symbol.clone();
            self.entity_mut(owner).attributes.shift_remove(&symbol);
            self.attr_mut(existing).restrictions.retain(|r| *r != attr);
        }
        self.invalidate();
    }

    fn check_owner_open(&self, entity: EntityId, owner: EntityId) -> Result<(), MetadataError> {
        if self.entity(entity).dependency_accessed.get() {
            return Err(MetadataError::OwnerAfterAccess {
                entity: self.entity_name(entity).to_string(),
                owner: self.entity_name(owner).to_string(),
            });
        }

        Ok(())
    }

    /// Record that `owner` owns instances of `entity`.
    ///
    /// `inverse` names the dependent attribute on the owner side. `attribute`
    /// names the owner reference on `entity`; it is detected when omitted and
    /// may legitimately be absent for a unidirectional relation.
    pub fn add_owner(
        &mut self,
        entity: EntityId,
        owner: EntityId,
        inverse: Option<&str>,
        attribute: Option<&str>,
    ) -> Result<Option<AttributeId>, Error> {
        let Some(inverse) = inverse else {
            return Err(ValidationError::MissingDependentAttribute {
                owner: self.entity_name(owner).to_string(),
                dependent: self.entity_name(entity).to_string(),
            }
            .into());
        };
        self.check_owner_open(entity, owner)?;

        let attr = match attribute {
            Some(symbol) => Some(self.attribute(entity, symbol)?),
            None => self.detect_owner_attribute(entity, owner, inverse),
        };

        if let Some(Some(existing)) = self.entity(entity).owners.get(&owner).copied()
            && let Some(attr) = attr
            && !self.same_lineage(existing, attr)
            && !self.attr(attr).is_disjoint()
        {
            return Err(MetadataError::DuplicateOwner {
                entity: self.entity_name(entity).to_string(),
                owner: self.entity_name(owner).to_string(),
            }
            .into());
        }

        let attr = match attr {
            Some(attr) => Some(self.bind_owner_attribute(entity, owner, attr, inverse)?),
            None => None,
        };

        let owners = &mut self.entity_mut(entity).owners;
        let keep_known = attr.is_none() && matches!(owners.get(&owner), Some(Some(_)));
        if !keep_known {
            owners.insert(owner, attr);
        }
        self.invalidate();

        debug!(
            entity = self.entity_name(entity),
            owner = self.entity_name(owner),
            attribute = ?attr.map(|a| self.attr(a).symbol.as_str()),
            "added owner"
        );

        Ok(attr)
    }

    // detect_owner_attribute
    // single candidate, then the inverse-named one, then the owner-type-named one
    fn detect_owner_attribute(
        &self,
        entity: EntityId,
        owner: EntityId,
        inverse: &str,
    ) -> Option<AttributeId> {
        let candidates: Vec<AttributeId> = self
            .all_attributes(entity)
            .into_iter()
            .filter(|id| {
                self.attr(*id)
                    .target()
                    .is_some_and(|t| self.is_subtype(owner, t))
            })
            .collect();

        if let [only] = candidates.as_slice() {
            return Some(*only);
        }

        let by_inverse = candidates.iter().copied().find(|id| {
            let attr = self.attr(*id);
            attr.symbol == inverse
                || attr
                    .inverse
                    .is_some_and(|inv| self.attr(inv).symbol == inverse)
        });
        if by_inverse.is_some() {
            return by_inverse;
        }

        let owner_symbol = naming::type_symbol(self.entity_name(owner));
        candidates
            .into_iter()
            .find(|id| self.attr(*id).symbol == owner_symbol)
    }

    // bind_owner_attribute
    // link to the owner's dependent attribute, then flag as owner
    fn bind_owner_attribute(
        &mut self,
        entity: EntityId,
        owner: EntityId,
        attr: AttributeId,
        inverse: &str,
    ) -> Result<AttributeId, Error> {
        let symbol = self.attr(attr).symbol.clone();
        let target = self.domain_target(entity, attr)?;
        if !self.is_subtype(owner, target) {
            return Err(TypeMismatchError::new(
                format!("owner attribute {}", self.qualified_symbol(attr)),
                self.entity_name(owner),
                self.entity_name(target),
            )
            .into());
        }

        if self.attr(attr).inverse.is_none() {
            let dependent_attr = self.attribute(owner, inverse)?;
            self.link_inverse(entity, attr, owner, dependent_attr)?;
        }

        let attr = self.qualify(entity, &symbol, Flags::OWNER)?;
        self.update_chain(attr, |a| a.writer.warn_owner_change = true);

        Ok(attr)
    }

    /// Owner types of `entity`, nearest declaration first, inherited ones after.
    #[must_use]
    pub fn owners(&self, entity: EntityId) -> Vec<EntityId> {
        self.mark_dependency_accessed(entity);

        let mut seen = HashSet::new();
        self.lineage(entity)
            .flat_map(|id| self.entity(id).owners.keys().copied())
            .filter(|owner| seen.insert(*owner))
            .collect()
    }

    /// Owner reference attributes visible on `entity`.
    #[must_use]
    pub fn owner_attributes(&self, entity: EntityId) -> Vec<AttributeId> {
        self.attributes(entity, AttributeView::Owner).to_vec()
    }

    /// The owner attribute, only when there is exactly one.
    #[must_use]
    pub fn owner_attribute(&self, entity: EntityId) -> Option<AttributeId> {
        match self.owner_attributes(entity).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// The owner attribute on `entity` referencing `owner` (or a supertype of it).
    #[must_use]
    pub fn owner_attribute_for(&self, entity: EntityId, owner: EntityId) -> Option<AttributeId> {
        self.mark_dependency_accessed(entity);

        self.lineage(entity)
            .flat_map(|id| self.entity(id).owners.iter())
            .find(|(declared, attr)| attr.is_some() && self.is_subtype(owner, **declared))
            .and_then(|(_, attr)| *attr)
            .and_then(|attr| self.attribute(entity, &self.attr(attr).symbol).ok())
    }

    #[must_use]
    pub fn dependent_attributes(&self, entity: EntityId) -> Rc<[AttributeId]> {
        self.attributes(entity, AttributeView::Dependent)
    }

    /// Types referenced through dependent attributes of `entity`.
    #[must_use]
    pub fn dependents(&self, entity: EntityId) -> Vec<EntityId> {
        let mut seen = HashSet::new();
        self.dependent_attributes(entity)
            .iter()
            .filter_map(|id| self.attr(*id).target())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// True when `entity` has at least one owner type.
    #[must_use]
    pub fn is_dependent(&self, entity: EntityId) -> bool {
        !self.owners(entity).is_empty()
    }

    /// True when `other` (or a subtype of one of them) owns `entity`,
    /// optionally through a chain of owners.
    #[must_use]
    pub fn depends_on(&self, entity: EntityId, other: EntityId, recursive: bool) -> bool {
        let mut visited = HashSet::new();

        self.depends_on_inner(entity, other, recursive, &mut visited)
    }

    fn depends_on_inner(
        &self,
        entity: EntityId,
        other: EntityId,
        recursive: bool,
        visited: &mut HashSet<EntityId>,
    ) -> bool {
        if !visited.insert(entity) {
            return false;
        }

        self.owners(entity).into_iter().any(|owner| {
            self.is_subtype(other, owner)
                || (recursive && self.depends_on_inner(owner, other, true, visited))
        })
    }

    fn mark_dependency_accessed(&self, entity: EntityId) {
        self.entity(entity).dependency_accessed.set(true);
    }
}
