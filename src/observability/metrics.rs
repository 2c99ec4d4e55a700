//! Metrics recording.
//!
//! # Metrics
//! - `linkroute_shadow_comparisons_total` (counter): by outcome
//! - `linkroute_dispatch_attempts_total` (counter): open attempts by status
//! - `linkroute_rewrites_total` (counter): rewrite pipeline runs by status
//! - `linkroute_diagnostics_total` (counter): diagnostic events by kind
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; the binary installs no exporter
//! - Label values are closed sets of static strings

pub fn record_shadow_comparison(outcome: &'static str) {
    metrics::counter!("linkroute_shadow_comparisons_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch_attempt(status: &'static str) {
    metrics::counter!("linkroute_dispatch_attempts_total", "status" => status).increment(1);
}

pub fn record_rewrite(status: &'static str) {
    metrics::counter!("linkroute_rewrites_total", "status" => status).increment(1);
}

pub fn record_diagnostic(kind: &'static str) {
    metrics::counter!("linkroute_diagnostics_total", "kind" => kind).increment(1);
}
