use crate::{
    model::{DomainModel, kind::AttributeId},
    object::{ObjectGraph, ObjectId},
    visitor::{Selector, Visit, VisitContext, VisitOrder, VisitState},
};
use std::collections::{HashMap, HashSet, VecDeque};

///
/// ReferenceVisitor
///
/// Visits the transitive closure of an object along the attributes chosen by
/// a `Selector`. Each object is visited at most once per top-level visit;
/// identity-keyed state makes cyclic graphs terminate.
///

pub struct ReferenceVisitor<'m> {
    model: &'m DomainModel,
    selector: Box<dyn Selector + 'm>,
    order: VisitOrder,
    states: HashMap<ObjectId, VisitState>,
    from: HashMap<ObjectId, (ObjectId, AttributeId)>,
    exclude: HashSet<ObjectId>,
    visited: Vec<ObjectId>,
}

impl<'m> ReferenceVisitor<'m> {
    pub fn new(model: &'m DomainModel, selector: impl Selector + 'm) -> Self {
        Self {
            model,
            selector: Box::new(selector),
            order: VisitOrder::default(),
            states: HashMap::new(),
            from: HashMap::new(),
            exclude: HashSet::new(),
            visited: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_order(mut self, order: VisitOrder) -> Self {
        self.order = order;
        self
    }

    /// Skip `obj` during the next top-level visit only.
    pub fn exclude(&mut self, obj: ObjectId) {
        self.exclude.insert(obj);
    }

    #[must_use]
    pub fn state(&self, obj: ObjectId) -> VisitState {
        self.states.get(&obj).copied().unwrap_or_default()
    }

    /// The attribute through which `obj` was first reached in the last visit.
    #[must_use]
    pub fn from_attribute(&self, obj: ObjectId) -> Option<AttributeId> {
        self.from.get(&obj).map(|(_, attr)| *attr)
    }

    /// Objects of the last visit, in visit order.
    #[must_use]
    pub fn visited(&self) -> &[ObjectId] {
        &self.visited
    }

    /// Visit `root` and everything reachable from it.
    pub fn visit<E>(
        &mut self,
        graph: &ObjectGraph,
        root: ObjectId,
        mut f: impl FnMut(&VisitContext<'_>) -> Result<Visit, E>,
    ) -> Result<(), E> {
        self.states.clear();
        self.from.clear();
        self.visited.clear();

        let result = match self.order {
            VisitOrder::DepthFirst => {
                let mut lineage = Vec::new();
                self.depth_first(graph, root, &mut lineage, &mut f)
            }
            VisitOrder::BreadthFirst => self.breadth_first(graph, root, &mut f),
        };
        self.exclude.clear();

        result
    }

    /// Visit and return every reachable object in visit order.
    pub fn collect(&mut self, graph: &ObjectGraph, root: ObjectId) -> Vec<ObjectId> {
        let result: Result<(), std::convert::Infallible> =
            self.visit(graph, root, |_| Ok(Visit::Continue));
        let Ok(()) = result;

        self.visited.clone()
    }

    fn depth_first<E>(
        &mut self,
        graph: &ObjectGraph,
        node: ObjectId,
        lineage: &mut Vec<ObjectId>,
        f: &mut impl FnMut(&VisitContext<'_>) -> Result<Visit, E>,
    ) -> Result<(), E> {
        self.states.insert(node, VisitState::Visited);
        self.visited.push(node);
        lineage.push(node);

        let (parent, attribute) = self.origin(node);
        let verdict = f(&VisitContext {
            current: node,
            parent,
            attribute,
            lineage: lineage.as_slice(),
        });

        let result = match verdict {
            Ok(Visit::Continue) => {
                let mut result = Ok(());
                for (child, attr) in self.children(graph, node) {
                    if self.state(child) != VisitState::Unvisited || self.exclude.contains(&child) {
                        continue;
                    }
                    self.from.insert(child, (node, attr));
                    result = self.depth_first(graph, child, lineage, f);
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
            Ok(Visit::Prune) => Ok(()),
            Err(err) => Err(err),
        };
        lineage.pop();

        result
    }

    fn breadth_first<E>(
        &mut self,
        graph: &ObjectGraph,
        root: ObjectId,
        f: &mut impl FnMut(&VisitContext<'_>) -> Result<Visit, E>,
    ) -> Result<(), E> {
        let mut queue = VecDeque::from([root]);
        self.states.insert(root, VisitState::Queued);

        while let Some(node) = queue.pop_front() {
            self.states.insert(node, VisitState::Visited);
            self.visited.push(node);

            let lineage = self.lineage_of(node);
            let (parent, attribute) = self.origin(node);
            let verdict = f(&VisitContext {
                current: node,
                parent,
                attribute,
                lineage: &lineage,
            })?;
            if verdict == Visit::Prune {
                continue;
            }

            for (child, attr) in self.children(graph, node) {
                if self.state(child) != VisitState::Unvisited || self.exclude.contains(&child) {
                    continue;
                }
                self.states.insert(child, VisitState::Queued);
                self.from.insert(child, (node, attr));
                queue.push_back(child);
            }
        }

        Ok(())
    }

    fn children(&self, graph: &ObjectGraph, node: ObjectId) -> Vec<(ObjectId, AttributeId)> {
        self.selector
            .select(self.model, graph.entity_of(node))
            .iter()
            .flat_map(|attr| {
                graph
                    .value(node, self.model.attr(*attr).symbol())
                    .refs()
                    .into_iter()
                    .map(move |child| (child, *attr))
            })
            .collect()
    }

    fn origin(&self, node: ObjectId) -> (Option<ObjectId>, Option<AttributeId>) {
        self.from
            .get(&node)
            .map_or((None, None), |(parent, attr)| (Some(*parent), Some(*attr)))
    }

    fn lineage_of(&self, node: ObjectId) -> Vec<ObjectId> {
        let mut lineage = vec![node];
        let mut current = node;
        while let Some((parent, _)) = self.from.get(&current) {
            lineage.push(*parent);
            current = *parent;
        }
        lineage.reverse();

        lineage
    }
}
