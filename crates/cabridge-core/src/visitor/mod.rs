//! Transitive-closure traversal of object reference graphs.
//!
//! `ReferenceVisitor` walks one graph along selected attributes.
//! `MatchVisitor` walks a source graph while pairing each node with a node in
//! a target graph; `MergeVisitor` and `CopyVisitor` build on those pairs.

pub mod copy;
pub mod matcher;
pub mod merge;
pub mod reference;

pub use copy::CopyVisitor;
pub use matcher::{Copier, KeyMatcher, MatchVisitor, Matcher, NeverMatch, ShallowCopier};
pub use merge::MergeVisitor;
pub use reference::ReferenceVisitor;

use crate::{
    model::{
        DomainModel,
        kind::{AttributeId, EntityId},
        view::AttributeView,
    },
    object::{ObjectGraph, ObjectId},
};
use std::{collections::HashSet, convert::Infallible, rc::Rc};

// ============================================================================
// Selector
// ============================================================================

/// Chooses the attributes a traversal follows out of an entity type.
pub trait Selector {
    fn select(&self, model: &DomainModel, entity: EntityId) -> Rc<[AttributeId]>;
}

impl Selector for AttributeView {
    fn select(&self, model: &DomainModel, entity: EntityId) -> Rc<[AttributeId]> {
        model.attributes(entity, *self)
    }
}

impl<F> Selector for F
where
    F: Fn(&DomainModel, EntityId) -> Vec<AttributeId>,
{
    fn select(&self, model: &DomainModel, entity: EntityId) -> Rc<[AttributeId]> {
        self(model, entity).into()
    }
}

// ============================================================================
// Traversal state
// ============================================================================

///
/// Visit
/// Callback verdict for the current node.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visit {
    Continue,
    /// Do not descend into this node's references.
    Prune,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VisitOrder {
    #[default]
    DepthFirst,
    BreadthFirst,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VisitState {
    #[default]
    Unvisited,
    Queued,
    Visited,
}

///
/// VisitContext
/// What the callback sees of the traversal at the current node.
///

#[derive(Debug)]
pub struct VisitContext<'a> {
    pub current: ObjectId,
    pub parent: Option<ObjectId>,
    /// Attribute of `parent` through which `current` was reached.
    pub attribute: Option<AttributeId>,
    /// Path from the root to `current`, inclusive.
    pub lineage: &'a [ObjectId],
}

impl VisitContext<'_> {
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.lineage.len().saturating_sub(1)
    }
}

// ============================================================================
// Dependency ordering
// ============================================================================

/// Objects reachable from `roots` in creation order: each object's owner
/// chain first, then the object, then its dependents.
#[must_use]
pub fn creation_order(model: &DomainModel, graph: &ObjectGraph, roots: &[ObjectId]) -> Vec<ObjectId> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut visitor = ReferenceVisitor::new(model, AttributeView::Dependent);

    for root in roots {
        let top = top_owner(model, graph, *root);
        let result: Result<(), Infallible> = visitor.visit(graph, top, |ctx| {
            if seen.insert(ctx.current) {
                order.push(ctx.current);
            }
            Ok(Visit::Continue)
        });
        let Ok(()) = result;
    }

    order
}

// top_owner
// follow populated owner references upward, stopping on a cycle
fn top_owner(model: &DomainModel, graph: &ObjectGraph, obj: ObjectId) -> ObjectId {
    let mut seen = HashSet::from([obj]);
    let mut current = obj;
    while let Some(owner) = graph.owner(model, current) {
        if !seen.insert(owner) {
            break;
        }
        current = owner;
    }

    current
}
