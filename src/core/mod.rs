/*!
 * Core Module
 * Fundamental types, ids, limits, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod id;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::ClientConfig;
pub use errors::*;
pub use id::{IdGenerator, QueryIdGenerator};
pub use types::*;
