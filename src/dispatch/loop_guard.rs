//! Reentrancy guard for dispatches.
//!
//! # Responsibilities
//! - Derive the dispatch key for a reference
//! - Refuse a key seen within the TTL window
//! - Stay bounded in size
//!
//! # Design Decisions
//! - Expired entries are evicted before every check
//! - Check, target resolution and record happen under one lock acquisition,
//!   so a concurrent duplicate is refused even while the first open runs
//! - At capacity the oldest entry is dropped

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// Default window in which a repeat dispatch is refused.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2);

/// Default maximum number of remembered keys.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Dispatch key: the whole reference, lower-cased.
///
/// Lower-casing the path and query is kept for compatibility; two references
/// differing only in path case share a key.
pub fn dispatch_key(reference: &Url) -> String {
    reference.as_str().to_lowercase()
}

/// Result of trying to claim a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim<T> {
    /// The key was dispatched within the TTL.
    Reentrant,
    /// Resolution produced nothing; no entry was recorded.
    Unresolved,
    /// The key is now recorded.
    Claimed(T),
}

#[derive(Debug)]
pub struct LoopGuard {
    ttl: Duration,
    max_entries: usize,
    recent: Mutex<HashMap<String, Duration>>,
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl LoopGuard {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Duration>> {
        self.recent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Evict, check, resolve and record as one step.
    ///
    /// `resolve` runs under the lock and must not block.
    pub fn claim<T, F>(&self, key: &str, now: Duration, resolve: F) -> Claim<T>
    where
        F: FnOnce() -> Option<T>,
    {
        let mut recent = self.lock();
        let ttl = self.ttl;
        recent.retain(|_, at| now.saturating_sub(*at) <= ttl);

        if recent.contains_key(key) {
            return Claim::Reentrant;
        }

        let Some(resolved) = resolve() else {
            return Claim::Unresolved;
        };

        if recent.len() >= self.max_entries {
            let oldest = recent
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                recent.remove(&oldest);
            }
        }
        recent.insert(key.to_string(), now);
        Claim::Claimed(resolved)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
