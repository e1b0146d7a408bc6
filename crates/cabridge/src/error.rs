use cabridge_config::ConfigError;
use cabridge_core::error::{
    Error as CoreError, ErrorClass as CoreErrorClass, ErrorOrigin as CoreErrorOrigin,
};
use derive_more::Display;
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// `origin:kind: message`, the form written to logs.
    #[must_use]
    pub fn display_with_kind(&self) -> String {
        format!("{}:{}: {}", self.origin, self.kind, self.message)
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        Self::new(err.class().into(), err.origin().into(), err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        let kind = match err {
            ConfigError::Io { .. } => ErrorKind::NotFound,
            ConfigError::Parse(_) | ConfigError::Invalid(_) => ErrorKind::Invalid,
        };

        Self::new(kind, ErrorOrigin::Config, err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
    #[display("not_found")]
    NotFound,

    /// A metadata or session invariant was broken; the caller cannot remediate this.
    #[display("internal")]
    Internal,

    #[display("conflict")]
    Conflict,

    #[display("invalid")]
    Invalid,

    /// The remote application rejected the call.
    #[display("remote")]
    Remote,
}

impl From<CoreErrorClass> for ErrorKind {
    fn from(class: CoreErrorClass) -> Self {
        match class {
            CoreErrorClass::NotFound => Self::NotFound,
            CoreErrorClass::InvariantViolation => Self::Internal,
            CoreErrorClass::Conflict => Self::Conflict,
            CoreErrorClass::Invalid => Self::Invalid,
            CoreErrorClass::Remote => Self::Remote,
        }
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorOrigin {
    #[display("config")]
    Config,

    #[display("database")]
    Database,

    #[display("metadata")]
    Metadata,

    #[display("migration")]
    Migration,

    #[display("object")]
    Object,

    #[display("service")]
    Service,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Metadata => Self::Metadata,
            CoreErrorOrigin::Object => Self::Object,
            CoreErrorOrigin::Database => Self::Database,
            CoreErrorOrigin::Service => Self::Service,
            CoreErrorOrigin::Migration => Self::Migration,
        }
    }
}
