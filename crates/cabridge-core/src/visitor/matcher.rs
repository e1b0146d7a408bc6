//! Pairing of source objects with target objects.
//!
//! A `MatchVisitor` walks the source graph and, for every node it reaches,
//! finds (or makes) the corresponding node of the target graph. Children are
//! only matched among the target parent's references through the same
//! attribute, so matching follows the shape of the target graph.

use crate::{
    error::Error,
    model::{DomainModel, kind::{AttributeId, EntityId}, view::AttributeView},
    object::{ObjectGraph, ObjectId},
    visitor::{ReferenceVisitor, Visit, VisitContext},
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

// ============================================================================
// Strategies
// ============================================================================

///
/// Matcher
/// Picks the target object corresponding to a source object.
///

pub trait Matcher {
    fn find(
        &self,
        model: &DomainModel,
        source: &ObjectGraph,
        obj: ObjectId,
        target: &ObjectGraph,
        candidates: &[ObjectId],
    ) -> Option<ObjectId>;
}

///
/// KeyMatcher
/// Matches on the first key both sides have complete: identifier, then
/// secondary key, then alternate key.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct KeyMatcher;

impl Matcher for KeyMatcher {
    fn find(
        &self,
        model: &DomainModel,
        source: &ObjectGraph,
        obj: ObjectId,
        target: &ObjectGraph,
        candidates: &[ObjectId],
    ) -> Option<ObjectId> {
        candidates
            .iter()
            .copied()
            .find(|candidate| source.key_matches(model, obj, target, *candidate))
    }
}

///
/// NeverMatch
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NeverMatch;

impl Matcher for NeverMatch {
    fn find(
        &self,
        _: &DomainModel,
        _: &ObjectGraph,
        _: ObjectId,
        _: &ObjectGraph,
        _: &[ObjectId],
    ) -> Option<ObjectId> {
        None
    }
}

///
/// Copier
/// Materializes an unmatched source object in the target graph.
///

pub trait Copier {
    fn copy(
        &self,
        model: &DomainModel,
        source: &ObjectGraph,
        obj: ObjectId,
        target: &mut ObjectGraph,
    ) -> Result<ObjectId, Error>;
}

///
/// ShallowCopier
/// New instance of the same type carrying the source's nondomain values.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ShallowCopier;

impl Copier for ShallowCopier {
    fn copy(
        &self,
        model: &DomainModel,
        source: &ObjectGraph,
        obj: ObjectId,
        target: &mut ObjectGraph,
    ) -> Result<ObjectId, Error> {
        let copy = target.create(source.entity_of(obj));
        target.merge_nondomain(model, copy, source.get(obj))?;

        Ok(copy)
    }
}

// ============================================================================
// MatchVisitor
// ============================================================================

///
/// MatchVisitor
///

pub struct MatchVisitor<'m> {
    model: &'m DomainModel,
    view: AttributeView,
    matcher: Box<dyn Matcher + 'm>,
    copier: Option<Box<dyn Copier + 'm>>,
    identifiers: bool,
}

impl<'m> MatchVisitor<'m> {
    /// Key matching over mergeable references, no copying.
    #[must_use]
    pub fn new(model: &'m DomainModel) -> Self {
        Self {
            model,
            view: AttributeView::Mergeable,
            matcher: Box::new(KeyMatcher),
            copier: None,
            identifiers: true,
        }
    }

    #[must_use]
    pub const fn with_view(mut self, view: AttributeView) -> Self {
        self.view = view;
        self
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: impl Matcher + 'm) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    #[must_use]
    pub fn with_copier(mut self, copier: impl Copier + 'm) -> Self {
        self.copier = Some(Box::new(copier));
        self
    }

    /// Skip the identifier lookup so only the matcher and copier decide.
    #[must_use]
    pub const fn without_identifier_matching(mut self) -> Self {
        self.identifiers = false;
        self
    }

    #[must_use]
    pub const fn view(&self) -> AttributeView {
        self.view
    }

    /// Match the closure of `root` in `source` against `target`, returning
    /// the source → target pairs. `target_root`, when given, is the match
    /// for `root`. Unmatched sources are copied when a copier is set and
    /// otherwise pruned.
    pub fn visit(
        &self,
        source: &ObjectGraph,
        root: ObjectId,
        target: &mut ObjectGraph,
        target_root: Option<ObjectId>,
    ) -> Result<HashMap<ObjectId, ObjectId>, Error> {
        let model = self.model;
        let mut matches = HashMap::new();
        let mut taken = HashSet::new();
        let mut by_identifier = if self.identifiers {
            identifier_index(target)
        } else {
            HashMap::new()
        };

        let mut visitor = ReferenceVisitor::new(model, self.view);
        visitor.visit(source, root, |ctx| -> Result<Visit, Error> {
            if matches.contains_key(&ctx.current) {
                return Ok(Visit::Continue);
            }

            let found = if ctx.parent.is_none() && target_root.is_some() {
                target_root
            } else {
                self.find(source, ctx, target, &matches, &taken, &by_identifier)
            };

            let matched = match (found, &self.copier) {
                (Some(found), _) => found,
                (None, Some(copier)) => {
                    let copy = copier.copy(model, source, ctx.current, target)?;
                    if let Some(id) = target.identifier(copy) {
                        by_identifier.insert((target.entity_of(copy), id), copy);
                    }
                    debug!(
                        source = %ctx.current,
                        copy = %copy,
                        entity = model.entity_name(source.entity_of(ctx.current)),
                        "copied unmatched object"
                    );
                    copy
                }
                (None, None) => return Ok(Visit::Prune),
            };

            matches.insert(ctx.current, matched);
            taken.insert(matched);

            Ok(Visit::Continue)
        })?;

        Ok(matches)
    }

    // find
    // identifier within the same type first, even when already taken; then the
    // pluggable matcher over candidates not yet taken
    fn find(
        &self,
        source: &ObjectGraph,
        ctx: &VisitContext<'_>,
        target: &ObjectGraph,
        matches: &HashMap<ObjectId, ObjectId>,
        taken: &HashSet<ObjectId>,
        by_identifier: &HashMap<(EntityId, i64), ObjectId>,
    ) -> Option<ObjectId> {
        let obj = ctx.current;
        if self.identifiers
            && let Some(id) = source.identifier(obj)
            && let Some(found) = by_identifier.get(&(source.entity_of(obj), id))
        {
            return Some(*found);
        }

        let candidates: Vec<ObjectId> = match (ctx.parent, ctx.attribute) {
            (Some(parent), Some(attribute)) => matches
                .get(&parent)
                .map(|target_parent| self.children(target, *target_parent, attribute))
                .unwrap_or_default(),
            _ => target
                .instances_of(self.model, source.entity_of(obj))
                .collect(),
        };
        let candidates: Vec<ObjectId> = candidates
            .into_iter()
            .filter(|candidate| !taken.contains(candidate))
            .collect();

        self.matcher
            .find(self.model, source, obj, target, &candidates)
    }

    // children
    // references of the target parent through the attribute of the same name
    fn children(&self, target: &ObjectGraph, parent: ObjectId, attribute: AttributeId) -> Vec<ObjectId> {
        let symbol = self.model.attr(attribute).symbol();
        self.model
            .attribute(target.entity_of(parent), symbol)
            .map(|attr| target.value(parent, self.model.attr(attr).symbol()).refs())
            .unwrap_or_default()
    }
}

fn identifier_index(graph: &ObjectGraph) -> HashMap<(EntityId, i64), ObjectId> {
    graph
        .ids()
        .filter_map(|obj| graph.identifier(obj).map(|id| ((graph.entity_of(obj), id), obj)))
        .collect()
}
