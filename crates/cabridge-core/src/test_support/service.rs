use crate::{
    db::{PersistenceService, Session},
    error::{Error, ServiceError},
    model::{DomainModel, kind::AttributeId, view::AttributeView},
    object::{ObjectGraph, ObjectId},
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

///
/// MemoryService
///
/// In-memory persistence service. Clones share the same store, so a test
/// keeps one handle while the database owns another.
///

#[derive(Clone)]
pub struct MemoryService {
    name: String,
    store: Rc<RefCell<Store>>,
}

#[derive(Default)]
struct Store {
    graph: ObjectGraph,
    by_identifier: BTreeMap<i64, ObjectId>,
    references: BTreeMap<(i64, String), Vec<i64>>,
    next_identifier: i64,
    calls: Vec<String>,
}

impl MemoryService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            store: Rc::new(RefCell::new(Store {
                next_identifier: 1,
                ..Store::default()
            })),
        }
    }

    /// Mutating calls in order, e.g. `create Site`.
    pub fn calls(&self) -> Vec<String> {
        self.store.borrow().calls.clone()
    }

    /// Number of objects currently stored.
    pub fn stored(&self) -> usize {
        self.store.borrow().by_identifier.len()
    }

    fn failure(&self, err: impl ToString) -> ServiceError {
        ServiceError::new(self.name.clone(), err.to_string())
    }

    // materialize
    // copy a stored object into the caller's graph
    fn materialize(
        &self,
        model: &DomainModel,
        store: &Store,
        graph: &mut ObjectGraph,
        stored: ObjectId,
    ) -> Result<ObjectId, ServiceError> {
        let copy = graph.create(store.graph.entity_of(stored));
        graph
            .merge_nondomain(model, copy, store.graph.get(stored))
            .map_err(|err: Error| self.failure(err))?;

        Ok(copy)
    }

    fn stored_counterpart(
        &self,
        store: &Store,
        graph: &ObjectGraph,
        obj: ObjectId,
    ) -> Result<ObjectId, ServiceError> {
        graph
            .identifier(obj)
            .and_then(|id| store.by_identifier.get(&id).copied())
            .ok_or_else(|| self.failure(format!("{obj} is not stored")))
    }

    // record_references
    // domain references are kept by identifier; unsaved targets are skipped
    fn record_references(
        store: &mut Store,
        model: &DomainModel,
        graph: &ObjectGraph,
        obj: ObjectId,
        identifier: i64,
    ) {
        let entity = graph.entity_of(obj);
        for attr in model.attributes(entity, AttributeView::Domain).iter() {
            let symbol = model.attr(*attr).symbol();
            let targets = graph
                .value(obj, symbol)
                .refs()
                .into_iter()
                .filter_map(|target| graph.identifier(target))
                .collect();
            store
                .references
                .insert((identifier, symbol.to_string()), targets);
        }
    }
}

impl PersistenceService for MemoryService {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        template: ObjectId,
        attribute: Option<AttributeId>,
    ) -> Result<Vec<ObjectId>, ServiceError> {
        let store = self.store.borrow();

        let matches: Vec<ObjectId> = match attribute {
            Some(attr) => {
                let identifier = graph
                    .identifier(template)
                    .ok_or_else(|| self.failure(format!("{template} is not stored")))?;
                let key = (identifier, model.attr(attr).symbol().to_string());
                store
                    .references
                    .get(&key)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| store.by_identifier.get(id).copied())
                    .collect()
            }
            None => store
                .by_identifier
                .values()
                .copied()
                .filter(|stored| graph.key_matches(model, template, &store.graph, *stored))
                .collect(),
        };

        matches
            .into_iter()
            .map(|stored| self.materialize(model, &store, graph, stored))
            .collect()
    }

    fn create(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        obj: ObjectId,
    ) -> Result<(), ServiceError> {
        let mut store = self.store.borrow_mut();
        let entity = graph.entity_of(obj);
        store
            .calls
            .push(format!("create {}", model.entity_name(entity)));

        let identifier = store.next_identifier;
        store.next_identifier += 1;
        graph.set_identifier(obj, Some(identifier));

        let stored = store.graph.create(entity);
        store
            .graph
            .merge_nondomain(model, stored, graph.get(obj))
            .map_err(|err| self.failure(err))?;
        store.by_identifier.insert(identifier, stored);
        Self::record_references(&mut store, model, graph, obj, identifier);

        Ok(())
    }

    fn update(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        obj: ObjectId,
    ) -> Result<(), ServiceError> {
        let mut store = self.store.borrow_mut();
        let entity = graph.entity_of(obj);
        store
            .calls
            .push(format!("update {}", model.entity_name(entity)));

        let stored = self.stored_counterpart(&store, graph, obj)?;
        for attr in model.attributes(entity, AttributeView::Nondomain).iter() {
            let symbol = model.attr(*attr).symbol();
            store.graph.put(stored, symbol, graph.value(obj, symbol).clone());
        }
        if let Some(identifier) = graph.identifier(obj) {
            Self::record_references(&mut store, model, graph, obj, identifier);
        }

        Ok(())
    }

    fn delete(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        obj: ObjectId,
    ) -> Result<(), ServiceError> {
        let mut store = self.store.borrow_mut();
        store
            .calls
            .push(format!("delete {}", model.entity_name(graph.entity_of(obj))));

        let stored = self.stored_counterpart(&store, graph, obj)?;
        store.by_identifier.retain(|_, id| *id != stored);

        Ok(())
    }
}

///
/// RecordingSession
///

#[derive(Clone, Default)]
pub struct RecordingSession {
    log: Rc<RefCell<Vec<String>>>,
}

impl RecordingSession {
    pub fn log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }
}

impl Session for RecordingSession {
    fn login(&mut self, user: &str, _password: &str) -> Result<(), ServiceError> {
        self.log.borrow_mut().push(format!("login {user}"));

        Ok(())
    }

    fn logout(&mut self) -> Result<(), ServiceError> {
        self.log.borrow_mut().push("logout".to_string());

        Ok(())
    }
}
