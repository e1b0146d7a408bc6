//! Module: model::view
//! Responsibility: derived, cached attribute lists per entity type.
//! Does not own: the flag vocabulary or attribute declaration.
//! Boundary: every registry mutation calls `DomainModel::invalidate`, so a
//! cached view is never stale.

use crate::model::{
    DomainModel,
    attribute::Attribute,
    flag::Flags,
    kind::{AttributeId, EntityId},
};
use indexmap::IndexMap;
use std::{
    collections::{BTreeSet, HashMap},
    rc::Rc,
};

///
/// AttributeView
/// Named attribute filter. Each view is computed once per entity type.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[remain::sorted]
pub enum AttributeView {
    All,
    Autogenerated,
    AutogeneratedDependent,
    Cascaded,
    Collection,
    Creatable,
    Dependent,
    Domain,
    Fetched,
    Independent,
    LogicalDependent,
    Mergeable,
    Nondomain,
    Owner,
    Saved,
    SavedIndependent,
    SaveTemplate,
    UnidirectionalDependent,
    Updatable,
}

impl AttributeView {
    /// True when `attr` belongs in this view.
    #[must_use]
    pub const fn includes(self, attr: &Attribute) -> bool {
        match self {
            Self::All => true,
            Self::Autogenerated => attr.is_autogenerated(),
            Self::AutogeneratedDependent => attr.is_dependent() && attr.is_autogenerated(),
            Self::Cascaded => attr.is_cascaded(),
            Self::Collection => attr.is_collection(),
            Self::Creatable => attr.is_creatable(),
            Self::Dependent => attr.is_dependent(),
            Self::Domain => attr.is_domain(),
            Self::Fetched => attr.is_fetched(),
            Self::Independent => attr.is_independent(),
            Self::LogicalDependent => attr.is_dependent() && attr.is_logical(),
            Self::Mergeable => attr.is_domain() && !attr.is_owner(),
            Self::Nondomain => !attr.is_domain(),
            Self::Owner => attr.is_owner(),
            Self::Saved => attr.is_saved(),
            Self::SavedIndependent => attr.is_saved() && attr.is_independent(),
            Self::SaveTemplate => {
                attr.is_saved()
                    && (!attr.is_domain()
                        || attr.flags().contains(Flags::INCLUDE_IN_SAVE_TEMPLATE)
                        || (attr.is_independent() && !attr.is_collection()))
            }
            Self::UnidirectionalDependent => {
                attr.is_dependent()
                    && (attr.inverse().is_none() || attr.flags().contains(Flags::UNIDIRECTIONAL))
            }
            Self::Updatable => attr.is_updatable(),
        }
    }

    // touches_dependency
    // views whose content depends on the owner/dependent declarations
    const fn touches_dependency(self) -> bool {
        matches!(
            self,
            Self::AutogeneratedDependent
                | Self::Dependent
                | Self::Independent
                | Self::LogicalDependent
                | Self::Owner
                | Self::SavedIndependent
                | Self::UnidirectionalDependent
        )
    }
}

///
/// ViewCache
///

#[derive(Debug, Default)]
pub(crate) struct ViewCache {
    views: HashMap<(EntityId, AttributeView), Rc<[AttributeId]>>,
    mandatory: HashMap<EntityId, Rc<[AttributeId]>>,
}

impl ViewCache {
    pub(crate) fn clear(&mut self) {
        self.views.clear();
        self.mandatory.clear();
    }
}

impl DomainModel {
    /// Every attribute visible on `entity`, ancestor declarations first.
    /// A restriction takes the place of the descriptor it restricts.
    #[must_use]
    pub fn all_attributes(&self, entity: EntityId) -> Vec<AttributeId> {
        let mut lineage: Vec<_> = self.lineage(entity).collect();
        lineage.reverse();

        let mut visible = IndexMap::<&str, AttributeId>::new();
        for id in lineage {
            let node = self.entity(id);
            for hidden in &node.hidden {
                visible.shift_remove(hidden.as_str());
            }
            for (symbol, attr) in &node.attributes {
                visible.insert(symbol.as_str(), *attr);
            }
        }

        visible.into_values().collect()
    }

    /// Cached filtered attribute list of `entity`.
    pub fn attributes(&self, entity: EntityId, view: AttributeView) -> Rc<[AttributeId]> {
        if view.touches_dependency() {
            self.entity(entity).dependency_accessed.set(true);
        }
        if let Some(cached) = self.views.borrow().views.get(&(entity, view)) {
            return Rc::clone(cached);
        }

        let computed: Rc<[AttributeId]> = self
            .all_attributes(entity)
            .into_iter()
            .filter(|id| view.includes(self.attr(*id)))
            .collect();
        self.views
            .borrow_mut()
            .views
            .insert((entity, view), Rc::clone(&computed));

        computed
    }

    /// Symbols of a cached view, in view order.
    #[must_use]
    pub fn symbols(&self, entity: EntityId, view: AttributeView) -> Vec<String> {
        self.attributes(entity, view)
            .iter()
            .map(|id| self.attr(*id).symbol.clone())
            .collect()
    }

    /// Attributes a saved instance of `entity` must populate.
    ///
    /// Explicit mandatory attributes, the secondary key and the sole owner
    /// attribute, merged with the supertype's set, less anything autogenerated
    /// or optional on this type. Ordered by symbol.
    pub fn mandatory_attributes(&self, entity: EntityId) -> Rc<[AttributeId]> {
        if let Some(cached) = self.views.borrow().mandatory.get(&entity) {
            return Rc::clone(cached);
        }

        let node = self.entity(entity);
        let mut symbols: BTreeSet<String> = node.mandatory.iter().cloned().collect();
        symbols.extend(self.secondary_key(entity).iter().cloned());
        if let Some(owner) = self.owner_attribute(entity) {
            symbols.insert(self.attr(owner).symbol.clone());
        }
        if let Some(parent) = node.parent {
            symbols.extend(
                self.mandatory_attributes(parent)
                    .iter()
                    .map(|id| self.attr(*id).symbol.clone()),
            );
        }

        let computed: Rc<[AttributeId]> = symbols
            .iter()
            .filter_map(|symbol| self.attribute(entity, symbol).ok())
            .filter(|id| {
                let attr = self.attr(*id);
                !attr.is_autogenerated() && !attr.is_optional()
            })
            .collect();
        self.views
            .borrow_mut()
            .mandatory
            .insert(entity, Rc::clone(&computed));

        computed
    }

    /// Convenience: mandatory symbols as a set.
    #[must_use]
    pub fn mandatory_symbols(&self, entity: EntityId) -> BTreeSet<String> {
        self.mandatory_attributes(entity)
            .iter()
            .map(|id| self.attr(*id).symbol.clone())
            .collect()
    }
}
