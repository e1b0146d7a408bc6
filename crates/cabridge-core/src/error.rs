use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured runtime error for the metadata engine, object graph, visitors
/// and database facade. Every leaf error converts into this with `?`.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    AttributeNotFound(#[from] AttributeNotFoundError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl Error {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::AttributeNotFound(_) => ErrorClass::NotFound,
            Self::Metadata(_) | Self::Database(_) => ErrorClass::InvariantViolation,
            Self::TypeMismatch(_) => ErrorClass::Conflict,
            Self::Validation(_) | Self::Migration(_) => ErrorClass::Invalid,
            Self::Service(_) => ErrorClass::Remote,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::AttributeNotFound(_) | Self::Metadata(_) | Self::TypeMismatch(_) => {
                ErrorOrigin::Metadata
            }
            Self::Validation(_) => ErrorOrigin::Object,
            Self::Database(_) => ErrorOrigin::Database,
            Self::Service(_) => ErrorOrigin::Service,
            Self::Migration(_) => ErrorOrigin::Migration,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {self}", self.origin(), self.class())
    }
}

///
/// AttributeNotFoundError
///
/// An attribute symbol or alias did not resolve on an entity type, even after
/// any registered attribute factory was consulted.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("attribute not found: {entity}.{attribute}")]
pub struct AttributeNotFoundError {
    pub entity: String,
    pub attribute: String,
}

impl AttributeNotFoundError {
    pub fn new(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }
}

///
/// MetadataError
///
/// Structural violations of the metadata model.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MetadataError {
    #[error("attribute {entity}.{attribute} is already declared")]
    DuplicateAttribute { entity: String, attribute: String },

    #[error("entity type '{0}' is already registered")]
    DuplicateEntity(String),

    #[error("entity type '{0}' is not registered")]
    UnknownEntity(String),

    #[error("attribute {entity}.{attribute} cannot be both owner and dependent")]
    OwnerDependentConflict { entity: String, attribute: String },

    #[error("{entity} already has a different owner attribute for owner {owner}")]
    DuplicateOwner { entity: String, owner: String },

    #[error(
        "cannot add {entity} owner {owner} after the {entity} dependency attributes have been accessed"
    )]
    OwnerAfterAccess { entity: String, owner: String },

    #[error("attribute {entity}.{attribute} is not a domain attribute")]
    NotDomainAttribute { entity: String, attribute: String },

    #[error("attribute {entity}.{attribute} is not a collection")]
    NotCollection { entity: String, attribute: String },

    #[error("cannot set {entity}.{attribute} inverse to {inverse}: already inverse of {existing}")]
    InverseConflict {
        entity: String,
        attribute: String,
        inverse: String,
        existing: String,
    },

    #[error("entity type '{entity}' cannot extend '{parent}': {reason}")]
    InvalidSupertype {
        entity: String,
        parent: String,
        reason: &'static str,
    },
}

///
/// TypeMismatchError
///
/// Inverse or restriction type incompatibility, raised at type-registration
/// time before any traversal runs.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{context}: expected {expected}, found {found}")]
pub struct TypeMismatchError {
    pub context: String,
    pub expected: String,
    pub found: String,
}

impl TypeMismatchError {
    pub fn new(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

///
/// ValidationError
///
/// Domain object or relation declaration rejected by a validation rule.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ValidationError {
    #[error("{entity} is missing mandatory attributes ({}):\n{dump}", .attributes.join(", "))]
    MissingMandatory {
        entity: String,
        attributes: Vec<String>,
        dump: String,
    },

    #[error("owner {owner} is missing a dependent attribute for dependent {dependent}")]
    MissingDependentAttribute { owner: String, dependent: String },

    #[error("value for {entity}.{attribute} is incompatible: {reason}")]
    IncompatibleValue {
        entity: String,
        attribute: String,
        reason: String,
    },
}

///
/// DatabaseError
///
/// Operation-stack and session invariant violations. Never retried.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DatabaseError {
    #[error("database is already open")]
    AlreadyOpen,

    #[error("database operation nesting exceeds {limit}: {kind} {subject}")]
    NestingTooDeep {
        limit: usize,
        kind: String,
        subject: String,
    },

    #[error("database credentials are missing the {0}")]
    MissingCredentials(&'static str),

    #[error("no persistence service is registered for '{0}'")]
    ServiceNotFound(String),

    #[error("invalid time zone '{0}'")]
    InvalidTimeZone(String),
}

///
/// ServiceError
///
/// Failure reported by a remote persistence or session collaborator.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("service '{service}' failed: {message}")]
pub struct ServiceError {
    pub service: String,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

///
/// MigrationError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MigrationError {
    #[error("row {row}: cannot parse '{text}' as {expected} for {entity}.{attribute}")]
    Parse {
        row: usize,
        entity: String,
        attribute: String,
        text: String,
        expected: String,
    },

    #[error("row {row}: migration target {entity} was not created")]
    MissingTarget { row: usize, entity: String },

    #[error("migration mapping for {entity}.{attribute} is not a nondomain attribute")]
    UnmappableAttribute { entity: String, attribute: String },
}

///
/// ErrorClass
/// Error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    InvariantViolation,
    Conflict,
    Invalid,
    Remote,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::InvariantViolation => "invariant_violation",
            Self::Conflict => "conflict",
            Self::Invalid => "invalid",
            Self::Remote => "remote",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Metadata,
    Object,
    Database,
    Service,
    Migration,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Metadata => "metadata",
            Self::Object => "object",
            Self::Database => "database",
            Self::Service => "service",
            Self::Migration => "migration",
        };
        write!(f, "{label}")
    }
}
