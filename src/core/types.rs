/*!
 * Core Types
 * Common types used across the dispatch layer
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id linking a submitted query to its eventual result
///
/// Id 0 is reserved for the standing updates subscriber and is never
/// issued to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl QueryId {
    /// Id of the standing updates subscriber
    pub const UPDATES: QueryId = QueryId(0);

    #[inline]
    pub const fn is_updates(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for QueryId {
    fn from(id: u64) -> Self {
        QueryId(id)
    }
}

/// Engine-side identifier of one client instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineClientId(pub u64);

impl fmt::Display for EngineClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of a client handed to the fatal error hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub engine_client_id: EngineClientId,
    pub is_debug: bool,
    pub pending: usize,
}
