//! Dispatch orchestration.
//!
//! # Responsibilities
//! - Resolve which discovered handler(s) to use
//! - Apply the reentrancy guard
//! - Issue open attempts and record per-target traces
//!
//! # Design Decisions
//! - Open attempts are strictly sequential within one dispatch call
//! - No retries at this layer; an attempt runs to completion
//! - The guard lock is never held across an open attempt

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::dispatch::launcher::Opener;
use crate::dispatch::loop_guard::{dispatch_key, Claim, LoopGuard};
use crate::dispatch::target::HandlerTarget;
use crate::observability::{metrics, DiagnosticEvent, DiagnosticsSink};
use crate::routing::plan::DispatchMode;
use crate::routing::request::InboundRequest;

/// Identifier of the system default browser.
pub const DEFAULT_BROWSER: &str = "com.apple.Safari";

/// Why a dispatch did not open anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailure {
    #[error("reference was dispatched moments ago")]
    LoopPrevented,

    #[error("no handler targets are available")]
    NoTargets,

    #[error("handler {0} failed to open the reference")]
    OpenFailed(String),

    #[error("handler {0} is not installed")]
    MissingTarget(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Success,
    OpenFailed,
    MissingTarget,
}

impl TargetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetStatus::Success => "success",
            TargetStatus::OpenFailed => "open_failed",
            TargetStatus::MissingTarget => "missing_target",
        }
    }
}

/// What happened for one target, in attempt order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDispatchTrace {
    pub target_id: String,
    pub status: TargetStatus,
}

impl TargetDispatchTrace {
    fn new(target_id: &str, status: TargetStatus) -> Self {
        Self {
            target_id: target_id.to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiOutcome {
    Success,
    PartialFailure,
    Failure,
}

/// Result of a multi-target dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiDispatchResult {
    pub outcome: MultiOutcome,
    pub traces: Vec<TargetDispatchTrace>,
    /// Set when the dispatch was refused before any target was tried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refused: Option<DispatchFailure>,
}

impl MultiDispatchResult {
    fn new(outcome: MultiOutcome, traces: Vec<TargetDispatchTrace>) -> Self {
        Self {
            outcome,
            traces,
            refused: None,
        }
    }

    fn failure(traces: Vec<TargetDispatchTrace>) -> Self {
        Self::new(MultiOutcome::Failure, traces)
    }

    fn refused(reason: DispatchFailure) -> Self {
        Self {
            refused: Some(reason),
            ..Self::failure(Vec::new())
        }
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.traces
            .iter()
            .filter(|t| t.status == TargetStatus::Success)
            .map(|t| t.target_id.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.traces
            .iter()
            .filter(|t| t.status != TargetStatus::Success)
            .map(|t| t.target_id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone)]
enum DispatchEntry {
    Target(HandlerTarget),
    Missing(String),
}

/// Single-target resolution result.
#[derive(Debug, Clone)]
struct Resolution {
    target: HandlerTarget,
    /// The preferred id was requested but not discovered.
    preferred_missing: Option<String>,
}

/// Opens references with one or more handlers.
#[derive(Debug)]
pub struct Dispatcher {
    opener: Arc<dyn Opener>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    guard: LoopGuard,
    default_browser: String,
}

impl Dispatcher {
    pub fn new(
        opener: Arc<dyn Opener>,
        clock: Arc<dyn Clock>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        guard: LoopGuard,
    ) -> Self {
        Self {
            opener,
            clock,
            diagnostics,
            guard,
            default_browser: DEFAULT_BROWSER.to_string(),
        }
    }

    pub fn with_default_browser(mut self, id: impl Into<String>) -> Self {
        self.default_browser = id.into();
        self
    }

    /// Open with one resolved handler.
    ///
    /// Resolution order: preferred, configured fallback, default browser,
    /// first discovered.
    pub async fn execute_single(
        &self,
        request: &InboundRequest,
        preferred: Option<&str>,
        discovered: &[HandlerTarget],
        configured_fallback: Option<&str>,
    ) -> Result<String, DispatchFailure> {
        let key = dispatch_key(request.target());
        let preferred = preferred.map(str::trim).filter(|p| !p.is_empty());
        let fallback = configured_fallback.map(str::trim).filter(|p| !p.is_empty());

        let claim = self.guard.claim(&key, self.clock.now(), || {
            self.resolve_single(preferred, discovered, fallback)
        });
        let resolution = match claim {
            Claim::Reentrant => {
                tracing::info!(handler = ?preferred, "Dispatch refused, loop guard active");
                metrics::record_dispatch_attempt("loop_prevented");
                return Err(DispatchFailure::LoopPrevented);
            }
            Claim::Unresolved => return Err(DispatchFailure::NoTargets),
            Claim::Claimed(resolution) => resolution,
        };

        if let Some(requested) = resolution.preferred_missing {
            self.diagnostics.emit(DiagnosticEvent::TargetMissing {
                requested,
                used: resolution.target.id.clone(),
            });
        }

        let target = resolution.target;
        if self.attempt(request, &target).await {
            Ok(target.id)
        } else {
            Err(DispatchFailure::OpenFailed(target.id))
        }
    }

    fn resolve_single(
        &self,
        preferred: Option<&str>,
        discovered: &[HandlerTarget],
        configured_fallback: Option<&str>,
    ) -> Option<Resolution> {
        let find = |id: &str| discovered.iter().find(|t| t.id == id).cloned();

        if let Some(target) = preferred.and_then(find) {
            return Some(Resolution {
                target,
                preferred_missing: None,
            });
        }

        let target = configured_fallback
            .and_then(find)
            .or_else(|| find(self.default_browser.as_str()))
            .or_else(|| discovered.first().cloned())?;

        Some(Resolution {
            target,
            preferred_missing: preferred.map(str::to_string),
        })
    }

    /// Open with several handlers according to `mode`.
    pub async fn execute_multi(
        &self,
        request: &InboundRequest,
        preferred: &[String],
        discovered: &[HandlerTarget],
        mode: DispatchMode,
    ) -> MultiDispatchResult {
        let key = dispatch_key(request.target());
        let claim = self.guard.claim(&key, self.clock.now(), || {
            let entries = resolve_entries(preferred, discovered);
            (!entries.is_empty()).then_some(entries)
        });
        let entries = match claim {
            Claim::Reentrant => {
                tracing::info!(handlers = preferred.len(), "Dispatch refused, loop guard active");
                metrics::record_dispatch_attempt("loop_prevented");
                return MultiDispatchResult::refused(DispatchFailure::LoopPrevented);
            }
            Claim::Unresolved => return MultiDispatchResult::refused(DispatchFailure::NoTargets),
            Claim::Claimed(entries) => entries,
        };

        match mode {
            DispatchMode::Single => self.dispatch_first(request, entries).await,
            DispatchMode::OrderedFailover => self.dispatch_failover(request, entries).await,
            DispatchMode::FanOut => self.dispatch_fan_out(request, entries).await,
        }
    }

    /// Only the first entry is considered; later entries are ignored.
    async fn dispatch_first(&self, request: &InboundRequest, entries: Vec<DispatchEntry>) -> MultiDispatchResult {
        let Some(entry) = entries.into_iter().next() else {
            return MultiDispatchResult::refused(DispatchFailure::NoTargets);
        };
        let trace = self.dispatch_entry(request, &entry).await;
        let outcome = if trace.status == TargetStatus::Success {
            MultiOutcome::Success
        } else {
            MultiOutcome::Failure
        };
        MultiDispatchResult::new(outcome, vec![trace])
    }

    async fn dispatch_failover(&self, request: &InboundRequest, entries: Vec<DispatchEntry>) -> MultiDispatchResult {
        let mut traces = Vec::new();
        for entry in &entries {
            let trace = self.dispatch_entry(request, entry).await;
            let opened = trace.status == TargetStatus::Success;
            traces.push(trace);
            if opened {
                return MultiDispatchResult::new(MultiOutcome::Success, traces);
            }
        }
        MultiDispatchResult::failure(traces)
    }

    async fn dispatch_fan_out(&self, request: &InboundRequest, entries: Vec<DispatchEntry>) -> MultiDispatchResult {
        let mut traces = Vec::with_capacity(entries.len());
        for entry in &entries {
            traces.push(self.dispatch_entry(request, entry).await);
        }

        let succeeded = traces.iter().filter(|t| t.status == TargetStatus::Success).count();
        let outcome = if succeeded == traces.len() {
            MultiOutcome::Success
        } else if succeeded == 0 {
            MultiOutcome::Failure
        } else {
            MultiOutcome::PartialFailure
        };
        MultiDispatchResult::new(outcome, traces)
    }

    async fn dispatch_entry(&self, request: &InboundRequest, entry: &DispatchEntry) -> TargetDispatchTrace {
        match entry {
            DispatchEntry::Missing(id) => {
                metrics::record_dispatch_attempt(TargetStatus::MissingTarget.as_str());
                TargetDispatchTrace::new(id, TargetStatus::MissingTarget)
            }
            DispatchEntry::Target(target) => {
                let status = if self.attempt(request, target).await {
                    TargetStatus::Success
                } else {
                    TargetStatus::OpenFailed
                };
                TargetDispatchTrace::new(&target.id, status)
            }
        }
    }

    async fn attempt(&self, request: &InboundRequest, target: &HandlerTarget) -> bool {
        let references = [request.target().clone()];
        let result = self.opener.open(&references, target).await;
        let status = if result.is_ok() {
            TargetStatus::Success
        } else {
            TargetStatus::OpenFailed
        };
        metrics::record_dispatch_attempt(status.as_str());

        match result {
            Ok(()) => {
                tracing::debug!(handler = %target.id, "Handler opened reference");
                true
            }
            Err(e) => {
                tracing::warn!(handler = %target.id, error = %e, "Handler failed to open reference");
                false
            }
        }
    }
}

/// Trimmed, de-duplicated ids in order; the first discovered target when
/// nothing usable was requested.
fn resolve_entries(preferred: &[String], discovered: &[HandlerTarget]) -> Vec<DispatchEntry> {
    let mut seen = HashSet::new();
    let mut ids: Vec<&str> = preferred
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(*id))
        .collect();

    if ids.is_empty() {
        ids.extend(discovered.first().map(|t| t.id.as_str()));
    }

    ids.into_iter()
        .map(|id| match discovered.iter().find(|t| t.id == id) {
            Some(target) => DispatchEntry::Target(target.clone()),
            None => DispatchEntry::Missing(id.to_string()),
        })
        .collect()
}
