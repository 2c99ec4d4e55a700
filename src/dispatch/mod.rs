//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest + preferred target id(s) + discovered HandlerTargets
//!     → loop_guard.rs (dispatch key, refuse repeats within the TTL)
//!     → executor.rs (resolve targets, run single / failover / fan-out)
//!     → launcher.rs (Opener: open(references, target) → Ok | LaunchError)
//!     → Return: used target id, or per-target traces
//! ```
//!
//! # Design Decisions
//! - Discovery and opening are injected capabilities (traits)
//! - Traces are recorded in attempt order for every entry

pub mod executor;
pub mod launcher;
pub mod loop_guard;
pub mod target;

pub use executor::{
    DispatchFailure, Dispatcher, MultiDispatchResult, MultiOutcome, TargetDispatchTrace, TargetStatus,
    DEFAULT_BROWSER,
};
pub use launcher::{CommandLauncher, LaunchError, Opener};
pub use loop_guard::LoopGuard;
pub use target::{ConfiguredDiscovery, HandlerCapabilities, HandlerDiscovery, HandlerTarget};
