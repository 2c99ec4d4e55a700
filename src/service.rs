//! The routing service.
//!
//! # Responsibilities
//! - Accept raw references and extension envelopes
//! - Decide with the legacy or new engine according to the rollout mode
//! - Record shadow comparisons without changing the live decision
//! - Resolve profile/workspace references and dispatch route decisions
//!
//! # Data Flow
//! ```text
//! raw reference / envelope
//!     → intake (classify, validate)
//!     → decide
//!         new-engine-primary: RuleEngine::evaluate → plan (rewritten reference)
//!         otherwise:          LegacyEngine::decide (+ ShadowComparator)
//!     → resolve target reference (profiles)
//!     → Dispatcher::execute_single / execute_multi
//! ```
//!
//! # Design Decisions
//! - Conflicting rollout flags behave as legacy-only and emit one diagnostic per decision
//! - Every collaborator is injected so tests can script discovery, opening and time

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::config::RouterConfig;
use crate::dispatch::launcher::{CommandLauncher, Opener};
use crate::dispatch::loop_guard::LoopGuard;
use crate::dispatch::target::{ConfiguredDiscovery, HandlerDiscovery, HandlerTarget};
use crate::dispatch::{Dispatcher, MultiDispatchResult, DEFAULT_BROWSER};
use crate::intake::handoff::{HandoffBroker, HandoffRejection, HandoffResult};
use crate::intake::inbound::{classify_reference, InboundRejection};
use crate::observability::{redact_reference, redact_url, DiagnosticEvent, DiagnosticsSink};
use crate::profiles::{ProfileCatalog, TargetReferenceResolver, TargetResolution};
use crate::routing::legacy::{FallbackReason, LegacyDecision, LegacyEngine, DEFAULT_DECISION_BUDGET};
use crate::routing::shadow::{RolloutFlags, RolloutMode, ShadowComparator, ShadowComparison, ShadowCounts, CONFLICTING_FLAGS};
use crate::routing::{DispatchMode, EvaluationContext, ExecutionPlan, InboundRequest, RuleEngine, SourceContext};
use crate::rules::{RuleSource, TargetReference};

/// Tunables for a router instance.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub rollout: RolloutFlags,
    pub loop_guard_ttl: Duration,
    pub max_guard_entries: usize,
    pub default_browser: String,
    pub fallback_target: Option<String>,
    pub decision_budget: Duration,
    pub debug_urls: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            rollout: RolloutFlags::default(),
            loop_guard_ttl: crate::dispatch::loop_guard::DEFAULT_TTL,
            max_guard_entries: crate::dispatch::loop_guard::DEFAULT_MAX_ENTRIES,
            default_browser: DEFAULT_BROWSER.to_string(),
            fallback_target: None,
            decision_budget: DEFAULT_DECISION_BUDGET,
            debug_urls: false,
        }
    }
}

impl From<&RouterConfig> for RouterSettings {
    fn from(config: &RouterConfig) -> Self {
        Self {
            rollout: config.rollout,
            loop_guard_ttl: config.dispatch.loop_guard_ttl(),
            max_guard_entries: config.dispatch.max_guard_entries,
            default_browser: config.dispatch.default_browser.clone(),
            fallback_target: config.dispatch.fallback_target.clone(),
            decision_budget: config.legacy.decision_budget(),
            debug_urls: config.observability.debug_urls,
        }
    }
}

/// Injected collaborators.
#[derive(Debug, Clone)]
pub struct RouterDeps {
    pub rules: Arc<dyn RuleSource>,
    pub discovery: Arc<dyn HandlerDiscovery>,
    pub resolver: Arc<dyn TargetReferenceResolver>,
    pub opener: Arc<dyn Opener>,
    pub clock: Arc<dyn Clock>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

/// Which engine produced the acted-upon decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionEngine {
    Legacy,
    NewEngine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DecisionAction {
    ShowChooser,
    Route {
        target_id: String,
        /// Reference to dispatch, after any rewrite.
        reference: Url,
        configured_fallback: Option<String>,
        target_reference: Option<TargetReference>,
    },
    /// Terminal: nothing further happens automatically.
    Fallback { reason: FallbackReason },
}

/// A routing decision and how it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub mode: RolloutMode,
    pub engine: DecisionEngine,
    pub action: DecisionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<ShadowComparison>,
}

/// What happened to one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OpenOutcome {
    Opened {
        target_id: String,
        reference: Url,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_reference: Option<TargetReference>,
    },
    ShowChooser {
        reference: Url,
        candidates: Vec<String>,
    },
    Fallback {
        reason: FallbackReason,
    },
    Failed {
        error: String,
    },
    Rejected {
        reason: InboundRejection,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "handoff", rename_all = "snake_case")]
pub enum HandoffOutcome {
    Routed { result: OpenOutcome },
    DirectOpen { reason: HandoffRejection, result: OpenOutcome },
    Rejected { reason: HandoffRejection },
}

/// Side-effect free view of both engines for one reference.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub request: InboundRequest,
    pub mode: RolloutMode,
    pub legacy: LegacyDecision,
    pub plan: ExecutionPlan,
    pub candidates: Vec<CandidateSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub rule_id: String,
    pub priority: i64,
    pub specificity: usize,
}

/// Composes intake, decision engines, profiles and dispatch.
#[derive(Debug)]
pub struct LinkRouter {
    settings: RouterSettings,
    rules: Arc<dyn RuleSource>,
    discovery: Arc<dyn HandlerDiscovery>,
    resolver: Arc<dyn TargetReferenceResolver>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    legacy: LegacyEngine,
    engine: RuleEngine,
    shadow: ShadowComparator,
    broker: HandoffBroker,
    dispatcher: Dispatcher,
}

impl LinkRouter {
    pub fn new(settings: RouterSettings, deps: RouterDeps) -> Self {
        let legacy = LegacyEngine::with_budget(deps.rules.clone(), deps.clock.clone(), settings.decision_budget);
        let dispatcher = Dispatcher::new(
            deps.opener,
            deps.clock,
            deps.diagnostics.clone(),
            LoopGuard::new(settings.loop_guard_ttl, settings.max_guard_entries),
        )
        .with_default_browser(settings.default_browser.clone());

        Self {
            settings,
            rules: deps.rules,
            discovery: deps.discovery,
            resolver: deps.resolver,
            diagnostics: deps.diagnostics,
            legacy,
            engine: RuleEngine::new(),
            shadow: ShadowComparator::new(),
            broker: HandoffBroker::new(),
            dispatcher,
        }
    }

    /// Router wired from a validated configuration, using the system clock
    /// and the configured launcher.
    pub fn from_config(
        config: &RouterConfig,
        rules: Arc<dyn RuleSource>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let mut discovery =
            ConfiguredDiscovery::new(config.handlers.iter().map(|h| h.to_target()).collect())
                .hiding(config.launcher.hidden.iter().cloned());
        if let Some(self_id) = &config.launcher.self_id {
            discovery = discovery.excluding_self(self_id.clone());
        }

        let deps = RouterDeps {
            rules,
            discovery: Arc::new(discovery),
            resolver: Arc::new(ProfileCatalog::new(config.profiles.clone(), config.workspaces.clone())),
            opener: Arc::new(CommandLauncher::new(config.launcher.program.clone(), config.launcher.args.clone())),
            clock: Arc::new(SystemClock::new()),
            diagnostics,
        };
        Self::new(RouterSettings::from(config), deps)
    }

    pub fn rollout_mode(&self) -> RolloutMode {
        self.settings.rollout.mode()
    }

    pub fn shadow_counts(&self) -> ShadowCounts {
        self.shadow.counts()
    }

    pub fn discovered(&self) -> Vec<HandlerTarget> {
        self.discovery.discover()
    }

    /// Classify a raw reference, reporting rejections.
    pub fn intake(&self, raw: &str, source: SourceContext) -> Result<InboundRequest, InboundRejection> {
        classify_reference(raw, source).inspect_err(|reason| {
            let reference = redact_reference(raw, self.settings.debug_urls);
            tracing::info!(reason = reason.as_str(), reference = %reference, "Inbound reference rejected");
            self.diagnostics.emit(DiagnosticEvent::InboundRejected {
                reason: reason.as_str().to_string(),
                reference,
            });
        })
    }

    /// Decide what to do with a request.
    pub fn decide(&self, request: &InboundRequest, context: &EvaluationContext) -> Decision {
        let mode = self.rollout_mode();
        if mode.is_invalid() {
            tracing::warn!(flags = ?CONFLICTING_FLAGS, "Conflicting rollout flags, using legacy engine");
            self.diagnostics.emit(DiagnosticEvent::InvalidRolloutConfiguration {
                flags: CONFLICTING_FLAGS.iter().map(|f| f.to_string()).collect(),
            });
        }

        if mode.routes_with_new_engine() {
            // A legacy fallback is terminal in every mode.
            let legacy = self.legacy.decide(request.target());
            if let LegacyDecision::Fallback(reason) = &legacy {
                return Decision {
                    mode,
                    engine: DecisionEngine::Legacy,
                    action: DecisionAction::Fallback { reason: *reason },
                    legacy: Some(legacy),
                    plan: None,
                    shadow: None,
                };
            }

            let rules = self.rules.rules();
            let plan = self.engine.evaluate(request, &rules, context);
            let action = match plan.route_target() {
                Some(target) => DecisionAction::Route {
                    target_id: target.to_string(),
                    reference: plan.request.target().clone(),
                    configured_fallback: plan
                        .configured_fallback
                        .clone()
                        .or_else(|| self.settings.fallback_target.clone()),
                    target_reference: plan.target_reference.clone(),
                },
                None => DecisionAction::ShowChooser,
            };
            return Decision {
                mode,
                engine: DecisionEngine::NewEngine,
                action,
                legacy: Some(legacy),
                plan: Some(plan),
                shadow: None,
            };
        }

        let legacy = self.legacy.decide(request.target());
        let shadow = mode.shadow_enabled().then(|| {
            let comparison = self
                .shadow
                .compare(true, &legacy, || self.shadow_plan(request, context));
            self.diagnostics
                .emit(DiagnosticEvent::ShadowComparison(comparison.clone()));
            comparison
        });

        let action = match &legacy {
            LegacyDecision::Route(target) => DecisionAction::Route {
                target_id: target.clone(),
                reference: request.target().clone(),
                configured_fallback: self.settings.fallback_target.clone(),
                target_reference: None,
            },
            LegacyDecision::ShowChooser => DecisionAction::ShowChooser,
            LegacyDecision::Fallback(reason) => DecisionAction::Fallback { reason: *reason },
        };

        Decision {
            mode,
            engine: DecisionEngine::Legacy,
            action,
            legacy: Some(legacy),
            plan: None,
            shadow,
        }
    }

    /// New-engine plan for a shadow comparison; none without rules.
    fn shadow_plan(&self, request: &InboundRequest, context: &EvaluationContext) -> Option<ExecutionPlan> {
        let rules = self.rules.rules();
        if rules.is_empty() {
            return None;
        }
        Some(self.engine.evaluate(request, &rules, context))
    }

    /// Both engines' view of a reference, with no counters or diagnostics.
    pub fn explain(
        &self,
        raw: &str,
        source: SourceContext,
        context: &EvaluationContext,
    ) -> Result<Explanation, InboundRejection> {
        let request = classify_reference(raw, source)?;
        let rules = self.rules.rules();
        let candidates = self
            .engine
            .candidates(&request, &rules, context)
            .into_iter()
            .map(|c| CandidateSummary {
                rule_id: c.rule.rule_id.clone(),
                priority: c.rule.priority,
                specificity: c.specificity,
            })
            .collect();

        Ok(Explanation {
            mode: self.rollout_mode(),
            legacy: self.legacy.decide(request.target()),
            plan: self.engine.evaluate(&request, &rules, context),
            candidates,
            request,
        })
    }

    /// Classify, decide and dispatch one raw reference.
    pub async fn open(&self, raw: &str, source: SourceContext, context: &EvaluationContext) -> OpenOutcome {
        match self.intake(raw, source) {
            Ok(request) => self.open_request(&request, context).await,
            Err(reason) => OpenOutcome::Rejected { reason },
        }
    }

    /// Decide and dispatch an already classified request.
    pub async fn open_request(&self, request: &InboundRequest, context: &EvaluationContext) -> OpenOutcome {
        let decision = self.decide(request, context);
        tracing::debug!(
            engine = ?decision.engine,
            reference = %self.redact(request.target()),
            "Decision made"
        );

        match decision.action {
            DecisionAction::ShowChooser => OpenOutcome::ShowChooser {
                reference: request.target().clone(),
                candidates: self.discovered().into_iter().map(|t| t.id).collect(),
            },
            DecisionAction::Fallback { reason } => {
                tracing::info!(reason = %reason, "Decision fell back, nothing opened");
                OpenOutcome::Fallback { reason }
            }
            DecisionAction::Route {
                target_id,
                reference,
                configured_fallback,
                target_reference,
            } => {
                let dispatched = request.with_target(reference);
                self.dispatch_route(&dispatched, &target_id, configured_fallback.as_deref(), target_reference)
                    .await
            }
        }
    }

    async fn dispatch_route(
        &self,
        request: &InboundRequest,
        target_id: &str,
        configured_fallback: Option<&str>,
        target_reference: Option<TargetReference>,
    ) -> OpenOutcome {
        let discovered = self.discovered();
        match self
            .dispatcher
            .execute_single(request, Some(target_id), &discovered, configured_fallback)
            .await
        {
            Ok(used) => {
                let target_reference = target_reference
                    .filter(|r| r.target_id.trim().eq_ignore_ascii_case(&used))
                    .map(|r| self.resolve_reference(&r, &discovered, &used));
                OpenOutcome::Opened {
                    target_id: used,
                    reference: request.target().clone(),
                    target_reference,
                }
            }
            Err(failure) => OpenOutcome::Failed {
                error: failure.to_string(),
            },
        }
    }

    fn resolve_reference(
        &self,
        reference: &TargetReference,
        discovered: &[HandlerTarget],
        used: &str,
    ) -> TargetReference {
        let capabilities = discovered
            .iter()
            .find(|t| t.id == used)
            .map(|t| t.capabilities.clone())
            .unwrap_or_default();

        match self.resolver.resolve(reference, &capabilities) {
            TargetResolution::Resolved(resolved) => resolved,
            TargetResolution::Fallback { reference, reason } => {
                tracing::info!(handler = %reference.target_id, reason = reason.as_str(), "Target reference degraded");
                self.diagnostics.emit(DiagnosticEvent::TargetReferenceFallback {
                    target_id: reference.target_id.clone(),
                    reason: reason.as_str().to_string(),
                });
                reference
            }
        }
    }

    /// Open a raw reference with explicit targets, bypassing the decision.
    pub async fn open_with(
        &self,
        raw: &str,
        source: SourceContext,
        targets: &[String],
        mode: DispatchMode,
    ) -> Result<MultiDispatchResult, InboundRejection> {
        let request = self.intake(raw, source)?;
        let discovered = self.discovered();
        Ok(self
            .dispatcher
            .execute_multi(&request, targets, &discovered, mode)
            .await)
    }

    /// Process an extension envelope.
    pub async fn handoff(
        &self,
        envelope: &[u8],
        fallback: Option<&Url>,
        context: &EvaluationContext,
    ) -> HandoffOutcome {
        match self.broker.process(envelope, fallback) {
            HandoffResult::Request(request) => HandoffOutcome::Routed {
                result: self.open_request(&request, context).await,
            },
            HandoffResult::FallbackToDirectOpen { url, reason } => {
                tracing::info!(reason = reason.as_str(), reference = %self.redact(&url), "Handoff rejected, opening directly");
                let request = InboundRequest::new(
                    crate::routing::RequestKind::Link,
                    url.clone(),
                    SourceContext::default(),
                );
                let discovered = self.discovered();
                let result = match self
                    .dispatcher
                    .execute_single(&request, None, &discovered, self.settings.fallback_target.as_deref())
                    .await
                {
                    Ok(target_id) => OpenOutcome::Opened {
                        target_id,
                        reference: url,
                        target_reference: None,
                    },
                    Err(failure) => OpenOutcome::Failed {
                        error: failure.to_string(),
                    },
                };
                HandoffOutcome::DirectOpen { reason, result }
            }
            HandoffResult::Rejected(reason) => {
                tracing::info!(reason = reason.as_str(), "Handoff rejected");
                HandoffOutcome::Rejected { reason }
            }
        }
    }

    fn redact(&self, url: &Url) -> String {
        if self.settings.debug_urls {
            url.to_string()
        } else {
            redact_url(url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::launcher::LaunchError;
    use crate::dispatch::target::HandlerCapabilities;
    use crate::observability::DiagnosticsRecorder;
    use crate::rules::{MatchPredicate, RuleAction, RuleRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct StaticRules(Vec<RuleRecord>);

    impl RuleSource for StaticRules {
        fn preferred_target(&self, host: &str) -> Option<String> {
            self.0
                .iter()
                .find(|r| r.host.as_deref() == Some(host))
                .and_then(|r| r.action.target_id().map(str::to_string))
        }

        fn rules(&self) -> Vec<RuleRecord> {
            self.0.clone()
        }
    }

    #[derive(Debug, Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Opener for RecordingOpener {
        async fn open(&self, references: &[Url], target: &HandlerTarget) -> Result<(), LaunchError> {
            let mut opened = self.opened.lock().unwrap();
            for reference in references {
                opened.push((target.id.clone(), reference.to_string()));
            }
            Ok(())
        }
    }

    struct Fixture {
        router: LinkRouter,
        opener: Arc<RecordingOpener>,
        recorder: Arc<DiagnosticsRecorder>,
    }

    fn fixture(rules: Vec<RuleRecord>, rollout: RolloutFlags) -> Fixture {
        let clock = Arc::new(ManualClock::new(Duration::from_secs(100)));
        let opener = Arc::new(RecordingOpener::default());
        let recorder = Arc::new(DiagnosticsRecorder::new(clock.clone()));
        let handlers = vec![
            HandlerTarget::new("com.apple.Safari", "Safari", "/Applications/Safari.app"),
            HandlerTarget::new("com.apple.Music", "Music", "/Applications/Music.app"),
            HandlerTarget::new("com.google.Chrome", "Chrome", "/Applications/Chrome.app").with_capabilities(
                HandlerCapabilities::new(&[], &[], &[], false, false),
            ),
        ];
        let deps = RouterDeps {
            rules: Arc::new(StaticRules(rules)),
            discovery: Arc::new(ConfiguredDiscovery::new(handlers)),
            resolver: Arc::new(ProfileCatalog::default()),
            opener: opener.clone(),
            clock,
            diagnostics: recorder.clone(),
        };
        let settings = RouterSettings {
            rollout,
            ..RouterSettings::default()
        };
        Fixture {
            router: LinkRouter::new(settings, deps),
            opener,
            recorder,
        }
    }

    fn music_rule() -> RuleRecord {
        RuleRecord {
            rule_id: "music".into(),
            priority: 10,
            created_at: 1,
            host: None,
            predicate: MatchPredicate::domain("music.apple.com"),
            action: RuleAction::RunCommand {
                target_id: "com.apple.Music".into(),
                command: r"rewrite_regex|^https://music\.apple\.com|music://music.apple.com".into(),
            },
            target_reference: None,
        }
    }

    fn new_engine() -> RolloutFlags {
        RolloutFlags {
            enable_new_engine: true,
            enable_shadow_comparison: false,
        }
    }

    const MUSIC: &str = "https://music.apple.com/us/album/example";

    #[tokio::test]
    async fn test_new_engine_dispatches_rewritten_reference() {
        let f = fixture(vec![music_rule()], new_engine());
        let outcome = f
            .router
            .open(MUSIC, SourceContext::warm_open(), &EvaluationContext::default())
            .await;

        assert_eq!(
            outcome,
            OpenOutcome::Opened {
                target_id: "com.apple.Music".into(),
                reference: Url::parse("music://music.apple.com/us/album/example").unwrap(),
                target_reference: None,
            }
        );
        assert_eq!(
            f.opener.opened.lock().unwrap().as_slice(),
            &[("com.apple.Music".to_string(), "music://music.apple.com/us/album/example".to_string())]
        );
    }

    #[tokio::test]
    async fn test_legacy_only_ignores_run_command_rules() {
        let f = fixture(vec![music_rule()], RolloutFlags::default());
        let outcome = f
            .router
            .open(MUSIC, SourceContext::warm_open(), &EvaluationContext::default())
            .await;
        assert!(matches!(outcome, OpenOutcome::ShowChooser { .. }));
        assert!(f.opener.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_flags_fail_closed() {
        let f = fixture(
            vec![music_rule()],
            RolloutFlags {
                enable_new_engine: true,
                enable_shadow_comparison: true,
            },
        );
        let request = f.router.intake(MUSIC, SourceContext::warm_open()).unwrap();

        for expected in 1..=3 {
            let decision = f.router.decide(&request, &EvaluationContext::default());
            assert_eq!(decision.engine, DecisionEngine::Legacy);
            assert_eq!(decision.mode, RolloutMode::Invalid);
            assert!(decision.shadow.is_none());
            assert_eq!(f.recorder.count("invalid_rollout_configuration"), expected);
        }
        assert_eq!(f.router.shadow_counts().total, 0);
    }

    #[tokio::test]
    async fn test_shadow_mode_records_comparison() {
        let host_rule = RuleRecord::for_host("example.com", RuleAction::AlwaysOpenIn { target_id: "com.google.Chrome".into() }, 1);
        let f = fixture(
            vec![host_rule, music_rule()],
            RolloutFlags {
                enable_new_engine: false,
                enable_shadow_comparison: true,
            },
        );

        let outcome = f
            .router
            .open("https://example.com/a", SourceContext::warm_open(), &EvaluationContext::default())
            .await;
        assert!(matches!(outcome, OpenOutcome::Opened { ref target_id, .. } if target_id == "com.google.Chrome"));

        let counts = f.router.shadow_counts();
        assert_eq!((counts.total, counts.matched), (1, 1));
        assert_eq!(f.recorder.count("shadow_comparison"), 1);
    }

    #[tokio::test]
    async fn test_rejected_reference_is_reported() {
        let f = fixture(Vec::new(), RolloutFlags::default());
        let outcome = f
            .router
            .open("ftp://example.com/x?token=secret", SourceContext::warm_open(), &EvaluationContext::default())
            .await;
        assert_eq!(
            outcome,
            OpenOutcome::Rejected {
                reason: InboundRejection::UnsupportedScheme
            }
        );
        let events = f.recorder.snapshot();
        assert_eq!(
            events,
            vec![DiagnosticEvent::InboundRejected {
                reason: "unsupported_scheme".into(),
                reference: "ftp://example.com/x".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_unsupported_profile_reference_degrades() {
        let mut rule = RuleRecord::for_host("work.example", RuleAction::AlwaysOpenIn { target_id: "com.google.Chrome".into() }, 1);
        rule.target_reference = Some(TargetReference {
            target_id: "com.google.Chrome".into(),
            profile_id: Some("profile:com.google.chrome:work".into()),
            workspace_id: None,
        });
        let f = fixture(vec![rule], new_engine());

        let outcome = f
            .router
            .open("https://work.example/", SourceContext::warm_open(), &EvaluationContext::default())
            .await;
        let OpenOutcome::Opened { target_reference, .. } = outcome else {
            panic!("not opened: {outcome:?}");
        };
        assert_eq!(target_reference, Some(TargetReference::new("com.google.chrome")));
        assert_eq!(f.recorder.count("target_reference_fallback"), 1);
    }

    #[tokio::test]
    async fn test_handoff_direct_open() {
        let f = fixture(Vec::new(), RolloutFlags::default());
        let fallback = Url::parse("https://fallback.example/").unwrap();
        let outcome = f
            .router
            .handoff(b"not json", Some(&fallback), &EvaluationContext::default())
            .await;

        assert_eq!(
            outcome,
            HandoffOutcome::DirectOpen {
                reason: HandoffRejection::MalformedEnvelope,
                result: OpenOutcome::Opened {
                    target_id: "com.apple.Safari".into(),
                    reference: fallback,
                    target_reference: None,
                },
            }
        );
    }

    #[tokio::test]
    async fn test_new_engine_keeps_legacy_fallback() {
        let mail_rule = RuleRecord {
            rule_id: "mail".into(),
            priority: 10,
            created_at: 1,
            host: None,
            predicate: MatchPredicate {
                scheme: Some("mailto".into()),
                ..MatchPredicate::default()
            },
            action: RuleAction::AlwaysOpenIn {
                target_id: "com.google.Chrome".into(),
            },
            target_reference: None,
        };
        let f = fixture(vec![mail_rule], new_engine());
        let request = f.router.intake("mailto:a@example.com", SourceContext::warm_open()).unwrap();

        let decision = f.router.decide(&request, &EvaluationContext::default());
        assert_eq!(decision.engine, DecisionEngine::Legacy);
        assert_eq!(
            decision.action,
            DecisionAction::Fallback {
                reason: FallbackReason::InvalidUrl
            }
        );
        assert!(decision.plan.is_none());

        let outcome = f.router.open_request(&request, &EvaluationContext::default()).await;
        assert_eq!(
            outcome,
            OpenOutcome::Fallback {
                reason: FallbackReason::InvalidUrl
            }
        );
        assert!(f.opener.opened.lock().unwrap().is_empty());
    }

    #[test]
    fn test_explain_has_no_side_effects() {
        let f = fixture(
            vec![music_rule()],
            RolloutFlags {
                enable_new_engine: true,
                enable_shadow_comparison: true,
            },
        );
        let explanation = f
            .router
            .explain(MUSIC, SourceContext::warm_open(), &EvaluationContext::default())
            .unwrap();
        assert_eq!(explanation.plan.route_target(), Some("com.apple.Music"));
        assert_eq!(explanation.candidates.len(), 1);
        assert!(f.recorder.snapshot().is_empty());
    }
}
