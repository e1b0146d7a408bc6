//! ## Crate layout
//! - `config`: TOML configuration for database sessions and migrations.
//! - `core`: attribute metadata, dependency graph, object graphs, visitors,
//!   the database facade and row migration.
//! - `error`: public error type with a stable kind + origin taxonomy.
//!
//! The `prelude` module mirrors the surface most callers need.

pub use cabridge_config as config;
pub use cabridge_core as core;

pub mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

use std::path::Path;
use tracing::info;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<config::Config, Error> {
    let path = path.as_ref();
    let config = config::Config::from_path(path)?;

    info!(
        path = %path.display(),
        host = %config.database.host,
        service = %config.database.service,
        migration = config.migration.is_some(),
        "loaded configuration"
    );

    Ok(config)
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Error,
        config::{Config, DatabaseConfig, MigrationConfig},
        core::{
            db::{Database, OperationKind, PersistenceService, Session},
            migrate::{MigrationSpec, Migrator},
            prelude::*,
            visitor::{CopyVisitor, MatchVisitor, MergeVisitor, ReferenceVisitor, Visit},
        },
    };
}
