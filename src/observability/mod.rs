//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, redacted references)
//!     → metrics.rs (counters through the metrics facade)
//!     → diagnostics.rs (typed events to an injected sink)
//!
//! Consumers:
//!     → stderr (fmt layer)
//!     → any metrics recorder the embedding application installs
//!     → DiagnosticsRecorder export bundle (JSON)
//! ```
//!
//! # Design Decisions
//! - Diagnostics are values, not log lines, so tests can assert on them
//! - Metrics are cheap (atomic increments)

pub mod diagnostics;
pub mod logging;
pub mod metrics;

pub use diagnostics::{DiagnosticEvent, DiagnosticsRecorder, DiagnosticsSink, TracingDiagnostics};
pub use logging::{init_logging, redact_reference, redact_url};
