//! Diagnostics channel.
//!
//! # Responsibilities
//! - Define the closed set of diagnostic events
//! - Deliver them to an injected sink (log + metric, or in-memory recorder)
//! - Export recorded events as a JSON bundle
//!
//! # Design Decisions
//! - Emitting never fails and never blocks on I/O
//! - References inside events are already redacted by the emitter

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::observability::metrics;
use crate::routing::shadow::ShadowComparison;

/// Something worth reporting that is not an error returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    StoreCorrupted { path: String, error: String },
    StoreRecovered { path: String },
    StoreWriteFailed { error: String },
    TargetMissing { requested: String, used: String },
    InvalidRolloutConfiguration { flags: Vec<String> },
    ShadowComparison(ShadowComparison),
    TargetReferenceFallback { target_id: String, reason: String },
    InboundRejected { reason: String, reference: String },
}

impl DiagnosticEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosticEvent::StoreCorrupted { .. } => "store_corrupted",
            DiagnosticEvent::StoreRecovered { .. } => "store_recovered",
            DiagnosticEvent::StoreWriteFailed { .. } => "store_write_failed",
            DiagnosticEvent::TargetMissing { .. } => "target_missing",
            DiagnosticEvent::InvalidRolloutConfiguration { .. } => "invalid_rollout_configuration",
            DiagnosticEvent::ShadowComparison(_) => "shadow_comparison",
            DiagnosticEvent::TargetReferenceFallback { .. } => "target_reference_fallback",
            DiagnosticEvent::InboundRejected { .. } => "inbound_rejected",
        }
    }
}

/// Receiver of diagnostic events.
pub trait DiagnosticsSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: DiagnosticEvent);
}

/// Logs each event and bumps its counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn emit(&self, event: DiagnosticEvent) {
        metrics::record_diagnostic(event.kind());
        match &event {
            DiagnosticEvent::StoreCorrupted { path, error } => {
                tracing::warn!(path = %path, error = %error, "Rule store unreadable, trying backup");
            }
            DiagnosticEvent::StoreRecovered { path } => {
                tracing::warn!(path = %path, "Rule store recovered from backup");
            }
            DiagnosticEvent::StoreWriteFailed { error } => {
                tracing::error!(error = %error, "Rule store write failed");
            }
            DiagnosticEvent::TargetMissing { requested, used } => {
                tracing::info!(requested = %requested, used = %used, "Preferred target missing");
            }
            DiagnosticEvent::InvalidRolloutConfiguration { flags } => {
                tracing::warn!(flags = ?flags, "Conflicting rollout flags, using legacy engine only");
            }
            DiagnosticEvent::ShadowComparison(comparison) => {
                tracing::info!(
                    outcome = comparison.outcome.as_str(),
                    reason = comparison.reason.as_str(),
                    legacy = %comparison.legacy_summary,
                    new_engine = %comparison.new_engine_summary,
                    "Shadow comparison recorded"
                );
            }
            DiagnosticEvent::TargetReferenceFallback { target_id, reason } => {
                tracing::info!(target_id = %target_id, reason = %reason, "Target reference fell back");
            }
            DiagnosticEvent::InboundRejected { reason, reference } => {
                tracing::warn!(reason = %reason, reference = %reference, "Inbound reference rejected");
            }
        }
    }
}

/// A recorded event with the time it was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedEvent {
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub event: DiagnosticEvent,
}

/// Exported diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsBundle {
    pub exported_at_ms: u64,
    pub events: Vec<RecordedEvent>,
}

/// In-memory sink that keeps every event, optionally forwarding to another sink.
#[derive(Debug)]
pub struct DiagnosticsRecorder {
    clock: Arc<dyn Clock>,
    forward: Option<Arc<dyn DiagnosticsSink>>,
    events: Mutex<Vec<RecordedEvent>>,
}

impl Default for DiagnosticsRecorder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

impl DiagnosticsRecorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            forward: None,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Also deliver every event to `sink`.
    pub fn forwarding_to(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.forward = Some(sink);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of all recorded events in emission order.
    pub fn snapshot(&self) -> Vec<DiagnosticEvent> {
        self.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Number of recorded events of one kind.
    pub fn count(&self, kind: &str) -> usize {
        self.lock().iter().filter(|r| r.event.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn export(&self) -> DiagnosticsBundle {
        DiagnosticsBundle {
            exported_at_ms: millis(self.clock.now()),
            events: self.lock().clone(),
        }
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export())
    }
}

impl DiagnosticsSink for DiagnosticsRecorder {
    fn emit(&self, event: DiagnosticEvent) {
        if let Some(forward) = &self.forward {
            forward.emit(event.clone());
        }
        let recorded = RecordedEvent {
            timestamp_ms: millis(self.clock.now()),
            event,
        };
        self.lock().push(recorded);
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_recorder_keeps_order_and_counts() {
        let recorder = DiagnosticsRecorder::new(Arc::new(ManualClock::default()));
        recorder.emit(DiagnosticEvent::StoreRecovered { path: "a".into() });
        recorder.emit(DiagnosticEvent::StoreWriteFailed { error: "disk".into() });
        recorder.emit(DiagnosticEvent::StoreRecovered { path: "b".into() });

        assert_eq!(recorder.count("store_recovered"), 2);
        assert_eq!(recorder.snapshot()[1].kind(), "store_write_failed");

        recorder.clear();
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn test_export_bundle() {
        let clock = Arc::new(ManualClock::new(Duration::from_millis(1_000)));
        let recorder = DiagnosticsRecorder::new(clock.clone());
        recorder.emit(DiagnosticEvent::InvalidRolloutConfiguration {
            flags: vec!["enable_new_engine".into(), "enable_shadow_comparison".into()],
        });
        clock.advance(Duration::from_millis(500));

        let bundle = recorder.export();
        assert_eq!(bundle.exported_at_ms, 1_500);
        assert_eq!(bundle.events[0].timestamp_ms, 1_000);

        let json: serde_json::Value = serde_json::from_str(&recorder.export_json().unwrap()).unwrap();
        assert_eq!(json["events"][0]["event"], "invalid_rollout_configuration");
        assert_eq!(json["events"][0]["timestampMs"], 1_000);
    }

    #[test]
    fn test_forwarding() {
        let inner = Arc::new(DiagnosticsRecorder::new(Arc::new(ManualClock::default())));
        let outer = DiagnosticsRecorder::new(Arc::new(ManualClock::default())).forwarding_to(inner.clone());
        outer.emit(DiagnosticEvent::StoreRecovered { path: "p".into() });
        assert_eq!(inner.count("store_recovered"), 1);
        assert_eq!(outer.count("store_recovered"), 1);
    }
}
