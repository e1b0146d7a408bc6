//! Core runtime for cabridge: attribute metadata, the dependency graph,
//! object graphs and visitors, persistence orchestration and row migration,
//! plus the vocabulary exported via the `prelude`.

// public exports are one module level down
pub mod db;
pub mod error;
pub mod migrate;
pub mod model;
pub mod object;
pub mod visitor;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No executors, services or visitors are re-exported here.
///

pub mod prelude {
    pub use crate::{
        model::{
            DomainModel,
            flag::Flags,
            kind::{AttributeId, AttributeType, EntityId, Primitive},
            view::AttributeView,
        },
        object::{ObjectGraph, ObjectId, Value},
    };
}
