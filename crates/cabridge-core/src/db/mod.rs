//! Module: db
//! Responsibility: session lifecycle and the nested-operation stack around
//! calls to remote persistence services.
//! Does not own: wire protocols or save ordering beyond single objects;
//! those belong to the `PersistenceService` implementations and callers.

pub mod lazy;
pub mod operation;
pub mod service;

pub use lazy::{LazyLoader, SuspendGuard};
pub use operation::{Operation, OperationKind, OperationOptions, Subject};
pub use service::{PersistenceService, ServiceHandle, Session};

use crate::{
    error::{DatabaseError, Error, ServiceError},
    model::{DomainModel, kind::EntityId, view::AttributeView},
    object::{ObjectGraph, ObjectId, Value},
};
use cabridge_config::DatabaseConfig;
use chrono_tz::Tz;
use indexmap::IndexMap;
use std::{collections::HashSet, time::Duration};
use tracing::{debug, error, warn};

/// Nesting depth at which `perform` refuses to push another frame.
pub const MAX_NESTED_OPERATIONS: usize = 20;

///
/// DbState
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DbState {
    #[default]
    Closed,
    Opened,
}

///
/// Database
///
/// Facade over a session and a set of named persistence services. One
/// logical session per instance; not shareable across threads.
///

pub struct Database<'m> {
    model: &'m DomainModel,
    config: DatabaseConfig,
    session: Box<dyn Session + 'm>,
    services: IndexMap<String, ServiceHandle<'m>>,
    state: DbState,
    operations: Vec<Operation>,
    transients: HashSet<ObjectId>,
    lazy: LazyLoader,
    error_logged: bool,
}

impl<'m> Database<'m> {
    pub fn new(model: &'m DomainModel, config: DatabaseConfig, session: impl Session + 'm) -> Self {
        Self {
            model,
            config,
            session: Box::new(session),
            services: IndexMap::new(),
            state: DbState::Closed,
            operations: Vec::new(),
            transients: HashSet::new(),
            lazy: LazyLoader::new(),
            error_logged: false,
        }
    }

    pub fn register_service(&mut self, service: impl PersistenceService + 'm) {
        let name = service.name().to_string();
        self.services.insert(name, ServiceHandle::new(Box::new(service)));
    }

    #[must_use]
    pub const fn model(&self) -> &'m DomainModel {
        self.model
    }

    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> DbState {
        self.state
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, DbState::Opened)
    }

    /// The current nested-operation stack, outermost first.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub const fn lazy_loader(&self) -> &LazyLoader {
        &self.lazy
    }

    /// Total time spent in service calls since the last `open`.
    #[must_use]
    pub fn execution_time(&self) -> Duration {
        self.services.values().map(ServiceHandle::elapsed).sum()
    }

    /// The configured time zone.
    pub fn time_zone(&self) -> Result<Tz, DatabaseError> {
        self.config
            .timezone
            .parse()
            .map_err(|_| DatabaseError::InvalidTimeZone(self.config.timezone.clone()))
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Authenticate, run `f` and close again whether or not `f` failed.
    /// Missing credentials fall back to the configured ones.
    pub fn open<T>(
        &mut self,
        user: Option<&str>,
        password: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.is_open() {
            return Err(DatabaseError::AlreadyOpen.into());
        }

        let user = user
            .map(str::to_string)
            .or_else(|| self.config.user.clone())
            .ok_or(DatabaseError::MissingCredentials("user"))?;
        let password = password
            .map(str::to_string)
            .or_else(|| self.config.password.clone())
            .ok_or(DatabaseError::MissingCredentials("password"))?;

        for handle in self.services.values_mut() {
            handle.reset_timer();
        }
        self.session.login(&user, &password)?;
        self.state = DbState::Opened;
        debug!(user = %user, host = %self.config.host, port = self.config.port, "database opened");

        let result = f(self);
        self.close();

        result
    }

    fn close(&mut self) {
        if let Err(err) = self.session.logout() {
            warn!(error = %err, "logout failed");
        }
        self.state = DbState::Closed;
        debug!(elapsed = ?self.execution_time(), "database closed");
    }

    // ========================================================================
    // Operation stack
    // ========================================================================

    /// Run `f` as one nested database operation on `subject`.
    pub fn perform<T>(
        &mut self,
        kind: OperationKind,
        subject: Subject,
        options: OperationOptions,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        debug!(
            operation = %kind,
            subject = %self.describe(subject),
            depth = self.operations.len(),
            "perform"
        );
        self.error_logged = false;

        if self.operations.len() >= MAX_NESTED_OPERATIONS {
            return Err(DatabaseError::NestingTooDeep {
                limit: MAX_NESTED_OPERATIONS,
                kind: kind.to_string(),
                subject: self.describe(subject),
            }
            .into());
        }

        self.operations.push(Operation::new(kind, subject, options));
        let result = if self.is_open() {
            let _suspended = self.lazy.suspend();
            f(self)
        } else {
            self.open(None, None, f)
        };

        if let Err(err) = &result
            && !self.error_logged
        {
            error!(
                operation = %kind,
                subject = %self.describe(subject),
                error = %err,
                "database operation failed"
            );
            self.error_logged = true;
        }

        self.operations.pop();
        if self.operations.is_empty() {
            self.transients.clear();
        }

        result
    }

    /// True when the stack, read from the innermost frame outward, is a run
    /// of updates each scoping the owner of the frame inside it, ending in a
    /// create of an object whose type has autogenerated dependents.
    #[must_use]
    pub fn mergeable_autogenerated_operation(&self, graph: &ObjectGraph) -> bool {
        let mut inner: Option<ObjectId> = None;

        for op in self.operations.iter().rev() {
            let outer = op.subject.object;
            if let Some(inner) = inner
                && !graph.is_owner_of(self.model, outer, inner)
                && !graph.dependents_of(self.model, outer).contains(&inner)
            {
                return false;
            }

            match op.kind {
                OperationKind::Create => {
                    return !self
                        .model
                        .attributes(op.subject.entity, AttributeView::AutogeneratedDependent)
                        .is_empty();
                }
                OperationKind::Update => inner = Some(outer),
                _ => return false,
            }
        }

        false
    }

    // ========================================================================
    // Services
    // ========================================================================

    /// The service handle for `entity`: the type's declared service, else the
    /// configured default.
    pub fn persistence_service(&self, entity: EntityId) -> Result<&ServiceHandle<'m>, DatabaseError> {
        let name = self.service_name(entity);

        self.services
            .get(name)
            .ok_or_else(|| DatabaseError::ServiceNotFound(name.to_string()))
    }

    fn service_name(&self, entity: EntityId) -> &str {
        self.model
            .service_of(entity)
            .unwrap_or(self.config.service.as_str())
    }

    fn call_service<T>(
        &mut self,
        entity: EntityId,
        f: impl FnOnce(&mut dyn PersistenceService, &DomainModel) -> Result<T, ServiceError>,
    ) -> Result<T, Error> {
        let model = self.model;
        let name = self.service_name(entity).to_string();
        let handle = self
            .services
            .get_mut(&name)
            .ok_or(DatabaseError::ServiceNotFound(name))?;

        Ok(handle.timed(|service| f(service, model))?)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Fetch the stored object matching `obj`'s key and merge its nondomain
    /// values into `obj`. Returns whether a match was found.
    pub fn find(&mut self, graph: &mut ObjectGraph, obj: ObjectId) -> Result<bool, Error> {
        let subject = Subject::of(graph, obj);

        self.perform(OperationKind::Find, subject, OperationOptions::default(), |db| {
            let found = db.call_service(subject.entity, |service, model| {
                service.query(model, graph, obj, None)
            })?;
            let Some(first) = found.into_iter().find(|id| *id != obj) else {
                return Ok(false);
            };

            let fetched = graph.get(first).clone();
            graph.merge_nondomain(db.model, obj, &fetched)?;

            Ok(true)
        })
    }

    /// Stored objects matching `template`, or the objects it references
    /// through `attribute`.
    pub fn query(
        &mut self,
        graph: &mut ObjectGraph,
        template: ObjectId,
        attribute: Option<&str>,
    ) -> Result<Vec<ObjectId>, Error> {
        let subject = Subject::of(graph, template);
        let attribute = attribute
            .map(|name| self.model.attribute(subject.entity, name))
            .transpose()?;
        let options = OperationOptions {
            attribute,
            ..OperationOptions::default()
        };

        self.perform(OperationKind::Query, subject, options, |db| {
            db.call_service(subject.entity, |service, model| {
                service.query(model, graph, template, attribute)
            })
        })
    }

    /// Validate mandatory attributes, then create `obj` remotely.
    pub fn create(&mut self, graph: &mut ObjectGraph, obj: ObjectId) -> Result<(), Error> {
        graph.validate(self.model, obj)?;
        let subject = Subject::of(graph, obj);

        self.perform(OperationKind::Create, subject, OperationOptions::default(), |db| {
            db.call_service(subject.entity, |service, model| service.create(model, graph, obj))
        })
    }

    pub fn update(&mut self, graph: &mut ObjectGraph, obj: ObjectId) -> Result<(), Error> {
        self.update_with(graph, obj, OperationOptions::default())
    }

    /// Update a dependent the service autogenerated for its owner. Inside the
    /// owner's create the update is folded into that create and not sent.
    pub fn update_autogenerated(
        &mut self,
        graph: &mut ObjectGraph,
        obj: ObjectId,
    ) -> Result<(), Error> {
        let options = OperationOptions {
            autogenerated: true,
            ..OperationOptions::default()
        };

        self.update_with(graph, obj, options)
    }

    fn update_with(
        &mut self,
        graph: &mut ObjectGraph,
        obj: ObjectId,
        options: OperationOptions,
    ) -> Result<(), Error> {
        let subject = Subject::of(graph, obj);

        self.perform(OperationKind::Update, subject, options, |db| {
            if options.autogenerated && db.mergeable_autogenerated_operation(graph) {
                debug!(subject = %db.describe(subject), "update folded into enclosing create");
                return Ok(());
            }

            db.call_service(subject.entity, |service, model| service.update(model, graph, obj))
        })
    }

    pub fn delete(&mut self, graph: &mut ObjectGraph, obj: ObjectId) -> Result<(), Error> {
        let subject = Subject::of(graph, obj);

        self.perform(OperationKind::Delete, subject, OperationOptions::default(), |db| {
            db.call_service(subject.entity, |service, model| service.delete(model, graph, obj))
        })
    }

    /// Create `obj` when it has no identifier, update it otherwise.
    pub fn save(&mut self, graph: &mut ObjectGraph, obj: ObjectId) -> Result<(), Error> {
        if graph.identifier(obj).is_some() {
            self.update(graph, obj)
        } else {
            self.create(graph, obj)
        }
    }

    /// True when `obj` has an identifier or a stored match. Objects found
    /// missing are not rechecked until the top-level operation ends.
    pub fn exists(&mut self, graph: &mut ObjectGraph, obj: ObjectId) -> Result<bool, Error> {
        if graph.identifier(obj).is_some() {
            return Ok(true);
        }
        if self.transients.contains(&obj) {
            return Ok(false);
        }

        let found = self.find(graph, obj)?;
        if !found {
            self.transients.insert(obj);
        }

        Ok(found)
    }

    /// Referenced objects through `name`, querying them when the slot is
    /// empty and lazy loading is enabled.
    pub fn fetch_reference(
        &mut self,
        graph: &mut ObjectGraph,
        obj: ObjectId,
        name: &str,
    ) -> Result<Vec<ObjectId>, Error> {
        let current = graph.get_attribute(self.model, obj, name)?.refs();
        if !current.is_empty() || !self.lazy.is_enabled() {
            return Ok(current);
        }

        let fetched = self.query(graph, obj, Some(name))?;
        let attr = self.model.attribute_of(graph.entity_of(obj), name)?;
        let value = if attr.is_collection() {
            Value::from(fetched.clone())
        } else {
            fetched.first().map_or(Value::Null, |id| Value::Ref(*id))
        };
        graph.set_attribute(self.model, obj, name, value)?;

        Ok(graph.get_attribute(self.model, obj, name)?.refs())
    }

    fn describe(&self, subject: Subject) -> String {
        format!("{}{}", self.model.entity_name(subject.entity), subject.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ValidationError,
        test_support::{FIXTURE_SERVICE, Fixture, MemoryService, RecordingSession, fixture},
    };

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            user: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..DatabaseConfig::default()
        }
    }

    // stored_site
    // a saved study with one saved site; returns (study, site)
    fn stored_site(fx: &Fixture, db: &mut Database<'_>, graph: &mut ObjectGraph) -> (ObjectId, ObjectId) {
        let model = &fx.model;
        let study = graph.create(fx.study);
        let site = graph.create(fx.site);
        graph.set_attribute(model, site, "name", "Main").unwrap();
        graph.set_attribute(model, site, "code", "M").unwrap();
        graph.add_to(model, study, "sites", site).unwrap();
        db.save(graph, study).unwrap();
        db.save(graph, site).unwrap();

        (study, site)
    }

    fn nest(db: &mut Database<'_>, subject: Subject, depth: usize) -> Result<usize, Error> {
        if depth == 0 {
            return Ok(db.operations().len());
        }

        db.perform(OperationKind::Find, subject, OperationOptions::default(), |db| {
            nest(db, subject, depth - 1)
        })
    }

    #[test]
    fn twenty_nested_operations_are_allowed() {
        let fx = fixture();
        let mut graph = ObjectGraph::new();
        let study = graph.create(fx.study);
        let subject = Subject::of(&graph, study);
        let mut db = Database::new(&fx.model, config(), RecordingSession::default());

        assert_eq!(nest(&mut db, subject, MAX_NESTED_OPERATIONS).unwrap(), 20);
        assert!(db.operations().is_empty());
        assert!(!db.is_open());
    }

    #[test]
    fn twenty_first_nested_operation_fails() {
        let fx = fixture();
        let mut graph = ObjectGraph::new();
        let study = graph.create(fx.study);
        let subject = Subject::of(&graph, study);
        let mut db = Database::new(&fx.model, config(), RecordingSession::default());

        let err = nest(&mut db, subject, MAX_NESTED_OPERATIONS + 1).unwrap_err();

        assert!(matches!(
            err,
            Error::Database(DatabaseError::NestingTooDeep { limit: 20, .. })
        ));
        assert!(db.operations().is_empty());
    }

    #[test]
    fn open_is_not_reentrant_and_always_closes() {
        let fx = fixture();
        let session = RecordingSession::default();
        let log = session.log();
        let mut db = Database::new(&fx.model, config(), session);

        let result: Result<(), Error> = db.open(None, None, |db| db.open(None, None, |_| Ok(())));

        assert!(matches!(result, Err(Error::Database(DatabaseError::AlreadyOpen))));
        assert!(!db.is_open());
        assert_eq!(*log.borrow(), ["login admin", "logout"]);
    }

    #[test]
    fn missing_credentials_are_reported() {
        let fx = fixture();
        let mut db = Database::new(&fx.model, DatabaseConfig::default(), RecordingSession::default());

        let err = db.open(None, None, |_| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::MissingCredentials("user"))
        ));

        let err = db.open(Some("admin"), None, |_| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::MissingCredentials("password"))
        ));
    }

    #[test]
    fn perform_suspends_lazy_loading_while_open() {
        let fx = fixture();
        let mut graph = ObjectGraph::new();
        let study = graph.create(fx.study);
        let subject = Subject::of(&graph, study);
        let mut db = Database::new(&fx.model, config(), RecordingSession::default());

        let states = db
            .open(None, None, |db| {
                let before = db.lazy_loader().is_enabled();
                let during = db.perform(OperationKind::Find, subject, OperationOptions::default(), |db| {
                    Ok(db.lazy_loader().is_enabled())
                })?;
                Ok((before, during, db.lazy_loader().is_enabled()))
            })
            .unwrap();

        assert_eq!(states, (true, false, true));
    }

    #[test]
    fn create_validates_then_assigns_identifier() {
        let fx = fixture();
        let model = &fx.model;
        let service = MemoryService::new("catissuecore");
        let mut graph = ObjectGraph::new();
        let study = graph.create(fx.study);
        let site = graph.create(fx.site);
        graph.set_attribute(model, site, "name", "Main").unwrap();
        let mut db = Database::new(model, config(), RecordingSession::default());
        db.register_service(service.clone());

        let err = db.create(&mut graph, site).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingMandatory { .. })
        ));

        graph.set_attribute(model, site, "code", "M").unwrap();
        graph.add_to(model, study, "sites", site).unwrap();
        db.create(&mut graph, site).unwrap();

        assert!(graph.identifier(site).is_some());
        assert_eq!(service.calls(), ["create Site"]);
        assert_eq!(db.persistence_service(fx.site).unwrap().calls(), 1);
    }

    #[test]
    fn find_merges_stored_values_and_exists_tracks_transients() {
        let fx = fixture();
        let model = &fx.model;
        let service = MemoryService::new("catissuecore");
        let mut db = Database::new(model, config(), RecordingSession::default());
        db.register_service(service.clone());

        let mut graph = ObjectGraph::new();
        let stored = graph.create(fx.participant);
        graph
            .set_attribute(model, stored, "medical_record_number", "MRN-1")
            .unwrap();
        graph.set_attribute(model, stored, "last_name", "Doe").unwrap();
        db.create(&mut graph, stored).unwrap();

        let lookup = graph.create(fx.participant);
        graph
            .set_attribute(model, lookup, "medical_record_number", "MRN-1")
            .unwrap();
        assert!(db.exists(&mut graph, lookup).unwrap());
        assert_eq!(graph.value(lookup, "last_name"), &Value::from("Doe"));
        assert_eq!(graph.identifier(lookup), graph.identifier(stored));

        let missing = graph.create(fx.participant);
        graph
            .set_attribute(model, missing, "medical_record_number", "MRN-2")
            .unwrap();
        assert!(!db.exists(&mut graph, missing).unwrap());
    }

    #[test]
    fn unknown_service_is_an_error() {
        let fx = fixture();
        let db = Database::new(&fx.model, config(), RecordingSession::default());

        assert_eq!(
            db.persistence_service(fx.study).err(),
            Some(DatabaseError::ServiceNotFound("catissuecore".to_string()))
        );
    }

    #[test]
    fn invalid_time_zone_is_rejected() {
        let fx = fixture();
        let mut config = config();
        assert_eq!(
            Database::new(&fx.model, config.clone(), RecordingSession::default()).time_zone(),
            Ok(Tz::UTC)
        );

        config.timezone = "Mars/Olympus".to_string();
        let db = Database::new(&fx.model, config, RecordingSession::default());
        assert!(matches!(db.time_zone(), Err(DatabaseError::InvalidTimeZone(_))));
    }

    #[test]
    fn update_inside_create_with_autogenerated_dependents_is_mergeable() {
        let fx = fixture();
        let model = &fx.model;
        let mut graph = ObjectGraph::new();
        let specimen = graph.create(fx.specimen);
        let characteristics = graph.create(fx.characteristics);
        graph
            .set_attribute(model, specimen, "characteristics", characteristics)
            .unwrap();
        let site = graph.create(fx.site);
        let mut db = Database::new(model, config(), RecordingSession::default());

        let nested = |db: &mut Database<'_>, outer: ObjectId, inner: ObjectId, kind| {
            let graph = &graph;
            db.perform(kind, Subject::of(graph, outer), OperationOptions::default(), |db| {
                db.perform(OperationKind::Update, Subject::of(graph, inner), OperationOptions::default(), |db| {
                    Ok(db.mergeable_autogenerated_operation(graph))
                })
            })
            .unwrap()
        };

        assert!(nested(&mut db, specimen, characteristics, OperationKind::Create));
        assert!(!nested(&mut db, specimen, characteristics, OperationKind::Update));
        assert!(!nested(&mut db, specimen, site, OperationKind::Create));
    }

    #[test]
    fn autogenerated_update_folds_into_owner_create() {
        let fx = fixture();
        let model = &fx.model;
        let service = MemoryService::new(FIXTURE_SERVICE);
        let mut db = Database::new(model, config(), RecordingSession::default());
        db.register_service(service.clone());

        let mut graph = ObjectGraph::new();
        let specimen = graph.create(fx.specimen);
        let characteristics = graph.create(fx.characteristics);
        graph
            .set_attribute(model, specimen, "characteristics", characteristics)
            .unwrap();
        let subject = Subject::of(&graph, specimen);

        db.perform(OperationKind::Create, subject, OperationOptions::default(), |db| {
            db.update_autogenerated(&mut graph, characteristics)
        })
        .unwrap();
        assert!(service.calls().is_empty());

        db.create(&mut graph, characteristics).unwrap();
        db.update_autogenerated(&mut graph, characteristics).unwrap();
        assert_eq!(
            service.calls(),
            ["create Characteristics", "update Characteristics"]
        );
    }

    #[test]
    fn save_creates_then_updates_and_delete_removes() {
        let fx = fixture();
        let model = &fx.model;
        let service = MemoryService::new(FIXTURE_SERVICE);
        let mut db = Database::new(model, config(), RecordingSession::default());
        db.register_service(service.clone());

        let mut graph = ObjectGraph::new();
        let (_, site) = stored_site(&fx, &mut db, &mut graph);
        assert_eq!(service.stored(), 2);

        graph.set_attribute(model, site, "name", "Annex").unwrap();
        db.save(&mut graph, site).unwrap();
        assert_eq!(service.calls(), ["create Study", "create Site", "update Site"]);

        let lookup = graph.create(fx.site);
        graph.set_attribute(model, lookup, "name", "Annex").unwrap();
        graph.set_attribute(model, lookup, "code", "M").unwrap();
        assert!(db.find(&mut graph, lookup).unwrap());

        db.delete(&mut graph, site).unwrap();
        assert_eq!(service.calls().last().map(String::as_str), Some("delete Site"));
        assert_eq!(service.stored(), 1);
    }

    #[test]
    fn fetch_reference_waits_for_lazy_loading() {
        let fx = fixture();
        let service = MemoryService::new(FIXTURE_SERVICE);
        let mut db = Database::new(&fx.model, config(), RecordingSession::default());
        db.register_service(service.clone());

        let mut graph = ObjectGraph::new();
        let (study, site) = stored_site(&fx, &mut db, &mut graph);

        let mut fresh = ObjectGraph::new();
        let lookup = fresh.create(fx.site);
        fresh.set_identifier(lookup, graph.identifier(site));
        let subject = Subject::of(&fresh, lookup);

        let suspended = db
            .open(None, None, |db| {
                db.perform(OperationKind::Find, subject, OperationOptions::default(), |db| {
                    db.fetch_reference(&mut fresh, lookup, "study")
                })
            })
            .unwrap();
        assert!(suspended.is_empty());
        assert_eq!(fresh.value(lookup, "study"), &Value::Null);

        let fetched = db.fetch_reference(&mut fresh, lookup, "study").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fresh.identifier(fetched[0]), graph.identifier(study));
        assert_eq!(fresh.value(lookup, "study"), &Value::Ref(fetched[0]));
    }

    #[test]
    fn fetch_reference_keeps_a_populated_slot() {
        let fx = fixture();
        let service = MemoryService::new(FIXTURE_SERVICE);
        let mut db = Database::new(&fx.model, config(), RecordingSession::default());
        db.register_service(service.clone());

        let mut graph = ObjectGraph::new();
        let (study, site) = stored_site(&fx, &mut db, &mut graph);
        let len = graph.len();

        assert_eq!(db.fetch_reference(&mut graph, site, "study").unwrap(), [study]);
        assert_eq!(graph.len(), len);
    }
}
