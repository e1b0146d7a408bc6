use crate::{
    model::kind::{AttributeId, EntityId},
    object::{ObjectGraph, ObjectId},
};
use derive_more::Display;

///
/// OperationKind
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum OperationKind {
    #[display("find")]
    Find,
    #[display("query")]
    Query,
    #[display("create")]
    Create,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
}

impl OperationKind {
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Find | Self::Query)
    }

    #[must_use]
    pub const fn is_save(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

///
/// Subject
/// The object an operation acts on, with its type captured at push time.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Subject {
    pub object: ObjectId,
    pub entity: EntityId,
}

impl Subject {
    #[must_use]
    pub fn of(graph: &ObjectGraph, object: ObjectId) -> Self {
        Self {
            object,
            entity: graph.entity_of(object),
        }
    }
}

///
/// OperationOptions
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OperationOptions {
    /// Attribute being fetched, for reference queries.
    pub attribute: Option<AttributeId>,
    /// Update of a dependent the service autogenerated for its owner.
    pub autogenerated: bool,
}

///
/// Operation
/// One frame of the nested-operation stack.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub subject: Subject,
    pub attribute: Option<AttributeId>,
    pub autogenerated: bool,
}

impl Operation {
    #[must_use]
    pub const fn new(kind: OperationKind, subject: Subject, options: OperationOptions) -> Self {
        Self {
            kind,
            subject,
            attribute: options.attribute,
            autogenerated: options.autogenerated,
        }
    }
}
