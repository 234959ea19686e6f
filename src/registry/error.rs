//! Error types for the parser registry.

use thiserror::Error;

use crate::options::ValidationError;
use crate::types::ParserHandle;
use crate::watcher::WatchError;

/// Errors returned synchronously by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid parser options: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("Parser '{parser_name}' conflicts with registered parser '{existing}'")]
    ParserNotUnique {
        parser_name: String,
        existing: String,
    },

    #[error("Parser {0} is not registered")]
    ParserNotRegistered(ParserHandle),

    #[error(transparent)]
    Watcher(#[from] WatchError),

    #[error("{} parser operations failed", .failures.len())]
    Bulk {
        failures: Vec<(ParserHandle, WatchError)>,
    },

    #[error("Registry is missing a {0}")]
    MissingComponent(&'static str),
}
