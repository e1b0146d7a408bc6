use crate::{
    error::ServiceError,
    model::{DomainModel, kind::AttributeId},
    object::{ObjectGraph, ObjectId},
};
use std::time::{Duration, Instant};

///
/// PersistenceService
///
/// A named remote endpoint. Implementations read and write the objects of
/// the caller's graph; query results are materialized into that graph.
///

pub trait PersistenceService {
    fn name(&self) -> &str;

    /// Objects matching `template`, or the objects `template` references
    /// through `attribute` when one is given.
    fn query(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        template: ObjectId,
        attribute: Option<AttributeId>,
    ) -> Result<Vec<ObjectId>, ServiceError>;

    /// Persist a new object; the service assigns its identifier.
    fn create(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        obj: ObjectId,
    ) -> Result<(), ServiceError>;

    fn update(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        obj: ObjectId,
    ) -> Result<(), ServiceError>;

    fn delete(
        &mut self,
        model: &DomainModel,
        graph: &mut ObjectGraph,
        obj: ObjectId,
    ) -> Result<(), ServiceError>;
}

///
/// Session
/// Authentication against the remote application.
///

pub trait Session {
    fn login(&mut self, user: &str, password: &str) -> Result<(), ServiceError>;

    fn logout(&mut self) -> Result<(), ServiceError>;
}

///
/// ServiceHandle
/// A registered service plus its call timer.
///

pub struct ServiceHandle<'m> {
    service: Box<dyn PersistenceService + 'm>,
    elapsed: Duration,
    calls: usize,
}

impl<'m> ServiceHandle<'m> {
    pub(crate) fn new(service: Box<dyn PersistenceService + 'm>) -> Self {
        Self {
            service,
            elapsed: Duration::ZERO,
            calls: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.service.name()
    }

    /// Time spent in service calls since the database was last opened.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[must_use]
    pub const fn calls(&self) -> usize {
        self.calls
    }

    pub(crate) const fn reset_timer(&mut self) {
        self.elapsed = Duration::ZERO;
        self.calls = 0;
    }

    pub(crate) fn timed<T>(
        &mut self,
        f: impl FnOnce(&mut dyn PersistenceService) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let start = Instant::now();
        let result = f(self.service.as_mut());
        self.elapsed += start.elapsed();
        self.calls += 1;

        result
    }
}
