//! Intake subsystem.
//!
//! # Data Flow
//! ```text
//! raw reference (command line, OS open event)
//!     → inbound.rs (parse, classify link / email / file, validate)
//!
//! extension envelope (JSON)
//!     → handoff.rs (parse v1 envelope, map source → kind + trigger)
//!     → fallback-to-direct-open when rejected with a usable fallback
//!
//!     → Return: InboundRequest, or an explicit rejection reason
//! ```
//!
//! # Design Decisions
//! - Rejections are values with a reason, never silently dropped

pub mod handoff;
pub mod inbound;

pub use handoff::{HandoffBroker, HandoffRejection, HandoffResult};
pub use inbound::{classify_reference, classify_url, InboundRejection};
