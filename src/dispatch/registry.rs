/*!
 * Handler Registry
 * Concurrent map from correlation id to the call waiting for its result
 */

use super::handlers::{ExceptionHandler, ResultHandler};
use crate::core::types::QueryId;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifetime of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Updates subscriber at id 0, lives as long as the client
    Standing,
    /// Submitted query, removed when its result is resolved
    OneShot,
}

/// A submitted query waiting for its result
pub struct PendingCall<Q, R> {
    pub kind: CallKind,
    /// Absent for the standing subscriber
    pub query: Option<Arc<Q>>,
    pub submitted_at: Option<Instant>,
    pub on_result: Option<ResultHandler<R>>,
    pub on_exception: Option<ExceptionHandler>,
}

impl<Q, R> PendingCall<Q, R> {
    pub fn standing(
        on_result: Option<ResultHandler<R>>,
        on_exception: Option<ExceptionHandler>,
    ) -> Self {
        Self {
            kind: CallKind::Standing,
            query: None,
            submitted_at: None,
            on_result,
            on_exception,
        }
    }

    pub fn one_shot(
        query: Arc<Q>,
        on_result: Option<ResultHandler<R>>,
        on_exception: Option<ExceptionHandler>,
    ) -> Self {
        Self {
            kind: CallKind::OneShot,
            query: Some(query),
            submitted_at: Some(Instant::now()),
            on_result,
            on_exception,
        }
    }

    /// Time since submission, `None` for the standing subscriber
    pub fn elapsed(&self) -> Option<Duration> {
        self.submitted_at.map(|at| at.elapsed())
    }
}

impl<Q, R> Clone for PendingCall<Q, R> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            query: self.query.clone(),
            submitted_at: self.submitted_at,
            on_result: self.on_result.clone(),
            on_exception: self.on_exception.clone(),
        }
    }
}

/// Registry of pending calls
///
/// # Performance
/// - Sharded map, no global lock on the submit/resolve hot path
/// - Removal on resolve is a single atomic `remove_if`
pub struct HandlerRegistry<Q, R> {
    calls: DashMap<QueryId, PendingCall<Q, R>, RandomState>,
}

impl<Q, R> HandlerRegistry<Q, R> {
    pub fn new() -> Self {
        Self {
            calls: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Install or replace the standing subscriber; last writer wins
    pub fn install_updates_handler(
        &self,
        on_result: Option<ResultHandler<R>>,
        on_exception: Option<ExceptionHandler>,
    ) {
        self.calls
            .insert(QueryId::UPDATES, PendingCall::standing(on_result, on_exception));
    }

    /// Register a submitted query under a freshly issued id
    pub fn insert(&self, id: QueryId, call: PendingCall<Q, R>) {
        debug_assert!(!id.is_updates(), "id 0 is reserved for updates");
        debug_assert_eq!(call.kind, CallKind::OneShot);
        self.calls.insert(id, call);
    }

    /// Claim the call a result belongs to
    ///
    /// One-shot calls are removed atomically, so at most one resolver ever
    /// gets them. The standing subscriber is cloned and stays in place.
    pub fn resolve(&self, id: QueryId) -> Option<PendingCall<Q, R>> {
        if let Some((_, call)) = self
            .calls
            .remove_if(&id, |_, call| call.kind == CallKind::OneShot)
        {
            return Some(call);
        }
        self.calls
            .get(&id)
            .filter(|call| call.kind == CallKind::Standing)
            .map(|call| call.value().clone())
    }

    pub fn contains(&self, id: QueryId) -> bool {
        self.calls.contains_key(&id)
    }

    /// Ids of calls still waiting, standing subscriber excluded
    pub fn pending_ids(&self) -> Vec<QueryId> {
        let mut ids: Vec<QueryId> = self
            .calls
            .iter()
            .filter(|entry| entry.kind == CallKind::OneShot)
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of calls still waiting, standing subscriber excluded
    pub fn pending_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|entry| entry.kind == CallKind::OneShot)
            .count()
    }

    /// Total entries, standing subscriber included
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl<Q, R> Default for HandlerRegistry<Q, R> {
    fn default() -> Self {
        Self::new()
    }
}
