//! Link routing library
//!
//! Decides which handler program opens an incoming reference, optionally
//! rewrites it first, and dispatches it to one or more handlers.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod intake;
pub mod observability;
pub mod profiles;
pub mod routing;
pub mod rules;
pub mod service;

pub use config::schema::RouterConfig;
pub use routing::{EvaluationContext, ExecutionPlan, InboundRequest, RuleEngine};
pub use rules::{RuleRecord, RuleStore};
pub use service::{Decision, HandoffOutcome, LinkRouter, OpenOutcome, RouterDeps, RouterSettings};
