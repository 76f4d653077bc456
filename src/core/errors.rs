/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

/// Errors returned to callers of the dispatch layer
///
/// Only locally-detectable misuse surfaces here. Failures reported by the
/// engine arrive as error results through the normal callback path, and
/// unrecoverable engine conditions go through fatal error escalation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(client::invalid_argument),
        help("Pass a query; absent queries are rejected before reaching the engine.")
    )]
    InvalidArgument(String),

    #[error("Failed to start drain thread: {0}")]
    #[diagnostic(
        code(client::thread_spawn_failed),
        help("The process may have hit its thread limit. Close unused clients.")
    )]
    ThreadSpawn(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(client::configuration_error),
        help("Review TDCLIENT_* environment variables.")
    )]
    Configuration(String),
}

impl ClientError {
    pub(crate) fn null_query() -> Self {
        ClientError::InvalidArgument("query is null".to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::ThreadSpawn(err.to_string())
    }
}

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;
