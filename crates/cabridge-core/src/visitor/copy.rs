use crate::{
    error::Error,
    model::{DomainModel, view::AttributeView},
    object::{ObjectGraph, ObjectId},
    visitor::{Copier, MergeVisitor, NeverMatch, ShallowCopier},
};

///
/// CopyVisitor
///
/// Deep copy of the closure of an object along a view: a merge that never
/// matches, so every visited object is copied and the copies are wired
/// together through the copied references.
///

pub struct CopyVisitor<'m> {
    model: &'m DomainModel,
    merger: MergeVisitor<'m>,
}

impl<'m> CopyVisitor<'m> {
    #[must_use]
    pub fn new(model: &'m DomainModel) -> Self {
        Self {
            model,
            merger: MergeVisitor::new(model)
                .with_matcher(NeverMatch)
                .with_copier(ShallowCopier)
                .without_identifier_matching(),
        }
    }

    #[must_use]
    pub fn with_view(mut self, view: AttributeView) -> Self {
        self.merger = self.merger.with_view(view);
        self
    }

    /// Copy `root` and its closure into `target`; returns the root's copy.
    pub fn copy(&self, source: &ObjectGraph, root: ObjectId, target: &mut ObjectGraph) -> Result<ObjectId, Error> {
        let copy = ShallowCopier.copy(self.model, source, root, target)?;
        self.merger.merge(source, root, target, Some(copy))?;

        Ok(copy)
    }

    /// Copy within one graph. The copies carry the source identifiers.
    pub fn copy_within(&self, graph: &mut ObjectGraph, root: ObjectId) -> Result<ObjectId, Error> {
        let source = graph.clone();

        self.copy(&source, root, graph)
    }
}
