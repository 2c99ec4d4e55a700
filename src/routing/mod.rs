//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest (+ EvaluationContext)
//!     → request.rs (normalized view, extension/MIME hints)
//!     → matcher.rs (per-rule predicate matching, specificity)
//!     → engine.rs (rank candidates, pick winner)
//!     → rewrite.rs (optional reference rewrite)
//!     → Return: ExecutionPlan (plan.rs)
//!
//! Legacy path (during rollout):
//!     reference
//!     → legacy.rs (host lookup under a time budget)
//!     → shadow.rs (compare with the new engine, count agreement)
//! ```
//!
//! # Design Decisions
//! - Evaluation is pure and synchronous; no shared mutable state
//! - Deterministic: same input always yields the same plan
//! - Highest-ranked match wins (priority, specificity, age, id)

pub mod engine;
pub mod legacy;
pub mod matcher;
pub mod plan;
pub mod request;
pub mod rewrite;
pub mod shadow;

pub use engine::RuleEngine;
pub use legacy::{FallbackReason, LegacyDecision, LegacyEngine};
pub use plan::{DispatchMode, ExecutionPlan, PlanStep};
pub use request::{EvaluationContext, InboundRequest, RequestKind, SourceContext, SourceTrigger};
pub use rewrite::{RewriteInstruction, RewriteOutcome, RewritePipeline, RewriteReason, RewriteStatus};
pub use shadow::{RolloutFlags, RolloutMode, ShadowComparator, ShadowComparison, ShadowCounts};
