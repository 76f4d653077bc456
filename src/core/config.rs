/*!
 * Client Configuration
 *
 * Runtime configuration for the drain loop and synthetic results
 */

use super::errors::{ClientError, ClientResult};
use super::limits::{
    CLIENT_CLOSED_CODE, CLIENT_CLOSED_MESSAGE, DRAIN_THREAD_NAME, MAX_EVENTS, RECEIVE_TIMEOUT,
};
use std::time::Duration;

/// Environment variable overriding the drain receive timeout, in seconds
pub const ENV_RECEIVE_TIMEOUT_SECS: &str = "TDCLIENT_RECEIVE_TIMEOUT_SECS";
/// Environment variable overriding the receive batch capacity
pub const ENV_MAX_EVENTS: &str = "TDCLIENT_MAX_EVENTS";
/// Environment variable overriding the drain thread name
pub const ENV_THREAD_NAME: &str = "TDCLIENT_THREAD_NAME";

/// Client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Bounded wait of one drain iteration
    pub receive_timeout: Duration,
    /// Capacity of one receive batch
    pub max_events: usize,
    /// Name given to the drain thread
    pub thread_name: String,
    /// Code of the error delivered once the client is closed
    pub closed_error_code: i32,
    /// Message of the error delivered once the client is closed
    pub closed_error_message: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            receive_timeout: RECEIVE_TIMEOUT,
            max_events: MAX_EVENTS,
            thread_name: DRAIN_THREAD_NAME.to_string(),
            closed_error_code: CLIENT_CLOSED_CODE,
            closed_error_message: CLIENT_CLOSED_MESSAGE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Configuration with a short receive timeout, for tests and tools that
    /// drive an in-process engine
    pub fn responsive() -> Self {
        Self {
            receive_timeout: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// Load configuration from `TDCLIENT_*` environment variables,
    /// falling back to defaults for unset values
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_RECEIVE_TIMEOUT_SECS) {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                ClientError::Configuration(format!("{ENV_RECEIVE_TIMEOUT_SECS}={raw} is not a number"))
            })?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(ClientError::Configuration(format!(
                    "{ENV_RECEIVE_TIMEOUT_SECS} must be non-negative"
                )));
            }
            config.receive_timeout = Duration::try_from_secs_f64(secs).map_err(|_| {
                ClientError::Configuration(format!("{ENV_RECEIVE_TIMEOUT_SECS}={raw} is out of range"))
            })?;
        }

        if let Some(raw) = lookup(ENV_MAX_EVENTS) {
            let max_events: usize = raw.trim().parse().map_err(|_| {
                ClientError::Configuration(format!("{ENV_MAX_EVENTS}={raw} is not a count"))
            })?;
            config.max_events = max_events;
        }

        if let Some(name) = lookup(ENV_THREAD_NAME) {
            config.thread_name = name;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the drain loop relies on
    pub fn validate(&self) -> ClientResult<()> {
        if self.max_events == 0 {
            return Err(ClientError::Configuration(
                "max_events must be positive".to_string(),
            ));
        }
        // Thread names are passed to the OS as C strings
        if self.thread_name.contains('\0') {
            return Err(ClientError::Configuration(
                "thread_name must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }
}
