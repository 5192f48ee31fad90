//! Call correlation identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Identifier pairing a request log line with its response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing call counter, starting at 1.
///
/// Clones share the same sequence.
#[derive(Debug, Clone)]
pub struct CorrelationCounter {
    next: Arc<AtomicU64>,
}

impl CorrelationCounter {
    /// A fresh, independent sequence.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The process-wide sequence.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<CorrelationCounter> = OnceLock::new();
        GLOBAL.get_or_init(CorrelationCounter::new).clone()
    }

    /// Take the next identifier. Called exactly once per logical call.
    pub fn next_id(&self) -> CallId {
        CallId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CorrelationCounter {
    fn default() -> Self {
        Self::global()
    }
}
