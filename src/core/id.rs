/*!
 * ID Generation
 * Lock-free, strictly increasing id generators for correlation and engine ids
 */

use super::types::{EngineClientId, QueryId};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// ID Generator Trait
// ============================================================================

/// Generic ID generator interface
pub trait IdGenerator<T> {
    /// Generate next ID
    fn next(&self) -> T;

    /// Next ID that would be issued (for debugging)
    fn current(&self) -> T;
}

// ============================================================================
// Atomic Counter Generator
// ============================================================================

/// Atomic counter for hot paths
///
/// # Performance
/// - Cache-line aligned to prevent false sharing between submitting threads
/// - Lock-free, one `fetch_add` per id
#[repr(C, align(64))]
pub struct AtomicGenerator<T> {
    counter: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T> AtomicGenerator<T> {
    /// Create new generator starting at given value
    #[inline]
    pub const fn new(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
            _marker: PhantomData,
        }
    }

    /// Create new generator starting at 1
    #[inline]
    pub const fn default_start() -> Self {
        Self::new(1)
    }
}

impl<T> Default for AtomicGenerator<T> {
    fn default() -> Self {
        Self::default_start()
    }
}

impl<T: From<u64>> IdGenerator<T> for AtomicGenerator<T> {
    #[inline]
    fn next(&self) -> T {
        T::from(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    #[inline]
    fn current(&self) -> T {
        T::from(self.counter.load(Ordering::Relaxed))
    }
}

impl From<u64> for EngineClientId {
    fn from(id: u64) -> Self {
        EngineClientId(id)
    }
}

// ============================================================================
// Convenience Type Aliases
// ============================================================================

/// Correlation id generator (starts at 1, id 0 belongs to the updates subscriber)
pub type QueryIdGenerator = AtomicGenerator<QueryId>;

/// Engine client id generator
pub type EngineClientIdGenerator = AtomicGenerator<EngineClientId>;
