//! Rollout flags and shadow comparison between the legacy and new engines.
//!
//! # Responsibilities
//! - Resolve the two rollout flags into a mode, failing closed on conflict
//! - Classify agreement between a legacy decision and a new-engine plan
//! - Count every comparison exactly once
//!
//! # Design Decisions
//! - Comparison never changes the decision that is acted upon
//! - The new-engine plan is evaluated lazily, only when a comparison runs

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::observability::metrics;
use crate::routing::legacy::LegacyDecision;
use crate::routing::plan::ExecutionPlan;

/// The two independent rollout switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutFlags {
    pub enable_new_engine: bool,
    pub enable_shadow_comparison: bool,
}

/// Effective behavior for a flag combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RolloutMode {
    LegacyOnly,
    NewEnginePrimary,
    LegacyWithShadow,
    /// Both flags set. Behaves like `LegacyOnly`.
    Invalid,
}

impl RolloutFlags {
    pub fn mode(&self) -> RolloutMode {
        match (self.enable_new_engine, self.enable_shadow_comparison) {
            (false, false) => RolloutMode::LegacyOnly,
            (true, false) => RolloutMode::NewEnginePrimary,
            (false, true) => RolloutMode::LegacyWithShadow,
            (true, true) => RolloutMode::Invalid,
        }
    }
}

impl RolloutMode {
    /// Only the new-engine-primary mode acts on the new engine's plan.
    pub fn routes_with_new_engine(self) -> bool {
        self == RolloutMode::NewEnginePrimary
    }

    pub fn shadow_enabled(self) -> bool {
        self == RolloutMode::LegacyWithShadow
    }

    pub fn is_invalid(self) -> bool {
        self == RolloutMode::Invalid
    }
}

/// Names of the conflicting flags, for the invalid-configuration diagnostic.
pub const CONFLICTING_FLAGS: [&str; 2] = ["enable_new_engine", "enable_shadow_comparison"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowOutcome {
    Matched,
    Mismatched,
    Skipped,
}

impl ShadowOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ShadowOutcome::Matched => "matched",
            ShadowOutcome::Mismatched => "mismatched",
            ShadowOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowReason {
    MatchedRoute,
    MatchedChooser,
    V2MissingPlanForV1Route,
    V2TargetMismatch,
    V1ChooserButV2Target,
    V1RouteButV2Chooser,
    V2Disabled,
    V1Fallback,
}

impl ShadowReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ShadowReason::MatchedRoute => "matched_route",
            ShadowReason::MatchedChooser => "matched_chooser",
            ShadowReason::V2MissingPlanForV1Route => "v2_missing_plan_for_v1_route",
            ShadowReason::V2TargetMismatch => "v2_target_mismatch",
            ShadowReason::V1ChooserButV2Target => "v1_chooser_but_v2_target",
            ShadowReason::V1RouteButV2Chooser => "v1_route_but_v2_chooser",
            ShadowReason::V2Disabled => "v2_disabled",
            ShadowReason::V1Fallback => "v1_fallback",
        }
    }
}

/// One comparison result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowComparison {
    pub outcome: ShadowOutcome,
    pub reason: ShadowReason,
    pub legacy_summary: String,
    pub new_engine_summary: String,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShadowCounts {
    pub total: u64,
    pub matched: u64,
    pub mismatched: u64,
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct ShadowCounters {
    total: AtomicU64,
    matched: AtomicU64,
    mismatched: AtomicU64,
    skipped: AtomicU64,
}

impl ShadowCounters {
    fn record(&self, outcome: ShadowOutcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let slot = match outcome {
            ShadowOutcome::Matched => &self.matched,
            ShadowOutcome::Mismatched => &self.mismatched,
            ShadowOutcome::Skipped => &self.skipped,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        metrics::record_shadow_comparison(outcome.as_str());
    }

    fn snapshot(&self) -> ShadowCounts {
        ShadowCounts {
            total: self.total.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            mismatched: self.mismatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Compares legacy decisions against new-engine plans and keeps counts.
#[derive(Debug, Default)]
pub struct ShadowComparator {
    counters: ShadowCounters,
}

impl ShadowComparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare and count. `evaluate` yields the new engine's plan, `None`
    /// when it produced no plan at all.
    pub fn compare<F>(&self, shadow_enabled: bool, legacy: &LegacyDecision, evaluate: F) -> ShadowComparison
    where
        F: FnOnce() -> Option<ExecutionPlan>,
    {
        let comparison = classify(shadow_enabled, legacy, evaluate);
        self.counters.record(comparison.outcome);
        tracing::debug!(
            outcome = comparison.outcome.as_str(),
            reason = comparison.reason.as_str(),
            legacy = %comparison.legacy_summary,
            new_engine = %comparison.new_engine_summary,
            "Shadow comparison"
        );
        comparison
    }

    pub fn counts(&self) -> ShadowCounts {
        self.counters.snapshot()
    }
}

fn plan_summary(plan: Option<&ExecutionPlan>) -> String {
    match plan.and_then(ExecutionPlan::route_target) {
        Some(target) => format!("route:{target}"),
        None => "showChooser".to_string(),
    }
}

fn classify<F>(shadow_enabled: bool, legacy: &LegacyDecision, evaluate: F) -> ShadowComparison
where
    F: FnOnce() -> Option<ExecutionPlan>,
{
    let legacy_summary = legacy.summary();
    let skipped = |reason: ShadowReason, summary: &str| ShadowComparison {
        outcome: ShadowOutcome::Skipped,
        reason,
        legacy_summary: legacy_summary.clone(),
        new_engine_summary: summary.to_string(),
    };

    if !shadow_enabled {
        return skipped(ShadowReason::V2Disabled, "disabled");
    }

    let expected = match legacy {
        LegacyDecision::Fallback(_) => return skipped(ShadowReason::V1Fallback, "not-evaluated"),
        LegacyDecision::Route(target) => Some(target.as_str()),
        LegacyDecision::ShowChooser => None,
    };

    let plan = evaluate();
    let actual = plan.as_ref().and_then(ExecutionPlan::route_target);

    let (outcome, reason) = match (expected, actual) {
        (Some(_), None) if plan.is_none() => {
            (ShadowOutcome::Mismatched, ShadowReason::V2MissingPlanForV1Route)
        }
        (Some(_), None) => (ShadowOutcome::Mismatched, ShadowReason::V1RouteButV2Chooser),
        (Some(want), Some(got)) if want == got => (ShadowOutcome::Matched, ShadowReason::MatchedRoute),
        (Some(_), Some(_)) => (ShadowOutcome::Mismatched, ShadowReason::V2TargetMismatch),
        (None, None) => (ShadowOutcome::Matched, ShadowReason::MatchedChooser),
        (None, Some(_)) => (ShadowOutcome::Mismatched, ShadowReason::V1ChooserButV2Target),
    };

    ShadowComparison {
        outcome,
        reason,
        new_engine_summary: plan_summary(plan.as_ref()),
        legacy_summary,
    }
}
