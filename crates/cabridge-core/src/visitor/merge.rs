use crate::{
    error::Error,
    model::{DomainModel, view::AttributeView},
    object::{ObjectGraph, ObjectId, Value},
    visitor::{Copier, MatchVisitor, Matcher},
};
use std::collections::HashMap;

///
/// MergeVisitor
///
/// Merges the closure of a source object into a target graph. Nondomain
/// values follow the no-clobber merge rule; domain references are re-pointed
/// at the matched targets, filling empty scalars and appending missing
/// collection members.
///

pub struct MergeVisitor<'m> {
    model: &'m DomainModel,
    matcher: MatchVisitor<'m>,
}

impl<'m> MergeVisitor<'m> {
    #[must_use]
    pub fn new(model: &'m DomainModel) -> Self {
        Self {
            model,
            matcher: MatchVisitor::new(model),
        }
    }

    #[must_use]
    pub fn with_view(mut self, view: AttributeView) -> Self {
        self.matcher = self.matcher.with_view(view);
        self
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: impl Matcher + 'm) -> Self {
        self.matcher = self.matcher.with_matcher(matcher);
        self
    }

    #[must_use]
    pub fn with_copier(mut self, copier: impl Copier + 'm) -> Self {
        self.matcher = self.matcher.with_copier(copier);
        self
    }

    #[must_use]
    pub fn without_identifier_matching(mut self) -> Self {
        self.matcher = self.matcher.without_identifier_matching();
        self
    }

    /// Merge `root` and its matched closure into `target`, returning the
    /// source → target pairs.
    pub fn merge(
        &self,
        source: &ObjectGraph,
        root: ObjectId,
        target: &mut ObjectGraph,
        target_root: Option<ObjectId>,
    ) -> Result<HashMap<ObjectId, ObjectId>, Error> {
        let matches = self.matcher.visit(source, root, target, target_root)?;

        let mut pairs: Vec<(ObjectId, ObjectId)> = matches.iter().map(|(s, t)| (*s, *t)).collect();
        pairs.sort_unstable();

        // Phase 1: nondomain values
        for (from, to) in &pairs {
            target.merge_nondomain(self.model, *to, source.get(*from))?;
        }

        // Phase 2: references between matched objects
        for (from, to) in &pairs {
            self.merge_references(source, *from, target, *to, &matches)?;
        }

        Ok(matches)
    }

    fn merge_references(
        &self,
        source: &ObjectGraph,
        from: ObjectId,
        target: &mut ObjectGraph,
        to: ObjectId,
        matches: &HashMap<ObjectId, ObjectId>,
    ) -> Result<(), Error> {
        let model = self.model;
        let target_entity = target.entity_of(to);

        for attr in model.attributes(source.entity_of(from), AttributeView::Domain).iter() {
            let symbol = model.attr(*attr).symbol();
            let Ok(target_attr) = model.attribute(target_entity, symbol) else {
                continue;
            };
            let target_attr = model.attr(target_attr);
            let mapped: Vec<ObjectId> = source
                .value(from, symbol)
                .refs()
                .iter()
                .filter_map(|r| matches.get(r).copied())
                .collect();

            if target_attr.is_collection() {
                let current = target.value(to, target_attr.symbol()).refs();
                for item in mapped.into_iter().filter(|item| !current.contains(item)) {
                    target.add_to(model, to, target_attr.symbol(), Value::Ref(item))?;
                }
            } else if let Some(item) = mapped.first()
                && target.value(to, target_attr.symbol()).is_null()
            {
                target.set_attribute(model, to, target_attr.symbol(), *item)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_support::fixture, visitor::ShallowCopier};

    #[test]
    fn merge_fills_target_without_clobbering() {
        let fx = fixture();
        let model = &fx.model;
        let mut source = ObjectGraph::new();
        let mut target = ObjectGraph::new();
        let s_study = source.create(fx.study);
        source.set_identifier(s_study, Some(1));
        source.set_attribute(model, s_study, "name", "Source").unwrap();
        source.set_attribute(model, s_study, "code", "S").unwrap();
        let t_study = target.create(fx.study);
        target.set_identifier(t_study, Some(1));
        target.set_attribute(model, t_study, "name", "Target").unwrap();

        let matches = MergeVisitor::new(model)
            .merge(&source, s_study, &mut target, None)
            .unwrap();

        assert_eq!(matches[&s_study], t_study);
        assert_eq!(target.value(t_study, "name"), &Value::from("Target"));
        assert_eq!(target.value(t_study, "code"), &Value::from("S"));
    }

    #[test]
    fn copied_dependents_are_attached_to_the_matched_owner() {
        let fx = fixture();
        let model = &fx.model;
        let mut source = ObjectGraph::new();
        let mut target = ObjectGraph::new();
        let s_study = source.create(fx.study);
        let s_site = source.create(fx.site);
        source.set_attribute(model, s_site, "name", "Main").unwrap();
        source.add_to(model, s_study, "sites", s_site).unwrap();
        let t_study = target.create(fx.study);

        let matches = MergeVisitor::new(model)
            .with_copier(ShallowCopier)
            .merge(&source, s_study, &mut target, Some(t_study))
            .unwrap();

        let t_site = matches[&s_site];
        assert_eq!(target.value(t_study, "sites").refs(), vec![t_site]);
        assert_eq!(target.value(t_site, "study"), &Value::Ref(t_study));
        assert_eq!(target.value(t_site, "name"), &Value::from("Main"));
    }

    #[test]
    fn populated_scalar_reference_is_kept() {
        let fx = fixture();
        let model = &fx.model;
        let mut source = ObjectGraph::new();
        let mut target = ObjectGraph::new();
        let s_reg = source.create(fx.registration);
        let s_participant = source.create(fx.participant);
        source.set_identifier(s_reg, Some(3));
        source.set_identifier(s_participant, Some(10));
        source.set_attribute(model, s_reg, "participant", s_participant).unwrap();

        let t_reg = target.create(fx.registration);
        let t_kept = target.create(fx.participant);
        let t_other = target.create(fx.participant);
        target.set_identifier(t_reg, Some(3));
        target.set_identifier(t_kept, Some(11));
        target.set_identifier(t_other, Some(10));
        target.set_attribute(model, t_reg, "participant", t_kept).unwrap();

        let matches = MergeVisitor::new(model)
            .merge(&source, s_reg, &mut target, None)
            .unwrap();

        assert_eq!(matches[&s_participant], t_other);
        assert_eq!(target.value(t_reg, "participant"), &Value::Ref(t_kept));
    }
}
