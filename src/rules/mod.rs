//! Rule model and persistence.
//!
//! # Data Flow
//! ```text
//! rules.json (version 1 or 2)
//!     → schema.rs (version probe, decode, sanitize)
//!     → store.rs (in-memory set + host index, behind one lock)
//!     → RuleSource (rule snapshots for the engine, host lookup for legacy)
//!
//! On write:
//!     whole rule set → schema.rs (encode as version 2)
//!     → temp file + sync → backup ← primary → rename temp over primary
//! ```
//!
//! # Design Decisions
//! - Readers always see a complete rule set, never a partial update
//! - The legacy host view is derived from the full records, never stored

pub mod model;
pub mod schema;
pub mod store;

pub use model::{rank, MatchPredicate, RuleAction, RuleRecord, TargetReference, HOST_RULE_PRIORITY};
pub use schema::{LegacyAction, StoreError};
pub use store::{RuleStore, StorePaths};

/// Read access to the current rules.
pub trait RuleSource: Send + Sync + std::fmt::Debug {
    /// Legacy exact-host lookup; `None` for "ask" or no rule.
    fn preferred_target(&self, host: &str) -> Option<String>;

    /// Snapshot of every rule.
    fn rules(&self) -> Vec<RuleRecord>;
}
