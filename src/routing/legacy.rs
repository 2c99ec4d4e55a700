//! Legacy host-lookup decision engine.
//!
//! # Responsibilities
//! - Extract a lower-cased host from the raw reference
//! - Look up an exact-host preferred target
//! - Enforce the decision budget at three checkpoints
//!
//! # Design Decisions
//! - The clock is injected so budget overruns are testable
//! - Fallback is terminal and distinct from "show chooser"

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::clock::Clock;
use crate::rules::RuleSource;

/// Default decision budget.
pub const DEFAULT_DECISION_BUDGET: Duration = Duration::from_millis(1500);

/// Why the legacy engine gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackReason {
    Timeout,
    #[serde(rename = "invalidURL")]
    InvalidUrl,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Timeout => write!(f, "timeout"),
            FallbackReason::InvalidUrl => write!(f, "invalidURL"),
        }
    }
}

/// Outcome of a legacy decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "value", rename_all = "camelCase")]
pub enum LegacyDecision {
    ShowChooser,
    Route(String),
    Fallback(FallbackReason),
}

impl LegacyDecision {
    /// Short form used in shadow comparisons and logs.
    pub fn summary(&self) -> String {
        match self {
            LegacyDecision::Route(target) => format!("route:{target}"),
            LegacyDecision::ShowChooser => "showChooser".to_string(),
            LegacyDecision::Fallback(reason) => format!("fallback:{reason}"),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, LegacyDecision::Fallback(_))
    }
}

/// Host-only decision engine with a time budget.
#[derive(Debug, Clone)]
pub struct LegacyEngine {
    rules: Arc<dyn RuleSource>,
    clock: Arc<dyn Clock>,
    budget: Duration,
}

impl LegacyEngine {
    pub fn new(rules: Arc<dyn RuleSource>, clock: Arc<dyn Clock>) -> Self {
        Self::with_budget(rules, clock, DEFAULT_DECISION_BUDGET)
    }

    pub fn with_budget(rules: Arc<dyn RuleSource>, clock: Arc<dyn Clock>, budget: Duration) -> Self {
        Self {
            rules,
            clock,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn decide(&self, reference: &Url) -> LegacyDecision {
        let start = self.clock.now();

        let Some(host) = extract_host(reference.as_str()) else {
            return LegacyDecision::Fallback(FallbackReason::InvalidUrl);
        };

        if self.over_budget(start) {
            return LegacyDecision::Fallback(FallbackReason::Timeout);
        }

        if let Some(target) = self.rules.preferred_target(&host) {
            if self.over_budget(start) {
                return LegacyDecision::Fallback(FallbackReason::Timeout);
            }
            return LegacyDecision::Route(target);
        }

        if self.over_budget(start) {
            return LegacyDecision::Fallback(FallbackReason::Timeout);
        }

        LegacyDecision::ShowChooser
    }

    /// Decide for a raw string; unparseable input is an invalid-url fallback.
    pub fn decide_raw(&self, reference: &str) -> LegacyDecision {
        match Url::parse(reference.trim()) {
            Ok(url) => self.decide(&url),
            Err(_) => LegacyDecision::Fallback(FallbackReason::InvalidUrl),
        }
    }

    fn over_budget(&self, start: Duration) -> bool {
        self.clock.now().saturating_sub(start) > self.budget
    }
}

/// Lower-cased host from the text after `://`, without userinfo or port.
/// Bracketed IPv6 hosts keep their brackets.
pub fn extract_host(raw: &str) -> Option<String> {
    let (_, rest) = raw.split_once("://")?;

    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let mut authority = &rest[..end];
    if let Some(at) = authority.rfind('@') {
        authority = &authority[at + 1..];
    }

    let host = if authority.starts_with('[') {
        let close = authority.find(']')?;
        &authority[..=close]
    } else {
        authority.split(':').next().unwrap_or_default()
    };

    let host = host.to_lowercase();
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rules::RuleRecord;
    use std::collections::HashMap;

    /// Rule source that advances the clock on every lookup.
    #[derive(Debug)]
    struct SlowSource {
        hosts: HashMap<String, String>,
        clock: Arc<ManualClock>,
        delay: Duration,
    }

    impl RuleSource for SlowSource {
        fn preferred_target(&self, host: &str) -> Option<String> {
            self.clock.advance(self.delay);
            self.hosts.get(host).cloned()
        }

        fn rules(&self) -> Vec<RuleRecord> {
            Vec::new()
        }
    }

    fn engine(delay: Duration) -> LegacyEngine {
        let clock = Arc::new(ManualClock::default());
        let mut hosts = HashMap::new();
        hosts.insert("example.com".to_string(), "org.mozilla.firefox".to_string());
        let source = SlowSource {
            hosts,
            clock: clock.clone(),
            delay,
        };
        LegacyEngine::new(Arc::new(source), clock)
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host("https://User:pw@Example.COM:8443/a?b#c").as_deref(), Some("example.com"));
        assert_eq!(extract_host("http://[::1]:8080/").as_deref(), Some("[::1]"));
        assert_eq!(extract_host("http://[::1/"), None);
        assert_eq!(extract_host("mailto:someone@example.com"), None);
        assert_eq!(extract_host("file:///tmp/a"), None);
    }

    #[test]
    fn test_route_and_chooser() {
        let engine = engine(Duration::ZERO);
        let hit = Url::parse("https://EXAMPLE.com/path").unwrap();
        assert_eq!(engine.decide(&hit), LegacyDecision::Route("org.mozilla.firefox".into()));

        let miss = Url::parse("https://other.com/").unwrap();
        assert_eq!(engine.decide(&miss), LegacyDecision::ShowChooser);
    }

    #[test]
    fn test_invalid_reference() {
        let engine = engine(Duration::ZERO);
        assert_eq!(
            engine.decide_raw("not a url"),
            LegacyDecision::Fallback(FallbackReason::InvalidUrl)
        );
        assert_eq!(
            engine.decide_raw("mailto:a@b.com"),
            LegacyDecision::Fallback(FallbackReason::InvalidUrl)
        );
    }

    #[test]
    fn test_budget_exceeded_during_lookup() {
        let engine = engine(Duration::from_millis(1600));
        let hit = Url::parse("https://example.com/").unwrap();
        assert_eq!(engine.decide(&hit), LegacyDecision::Fallback(FallbackReason::Timeout));

        let miss = Url::parse("https://other.com/").unwrap();
        assert_eq!(engine.decide(&miss), LegacyDecision::Fallback(FallbackReason::Timeout));
    }

    #[test]
    fn test_budget_boundary_is_inclusive() {
        let engine = engine(Duration::from_millis(1500));
        let hit = Url::parse("https://example.com/").unwrap();
        assert_eq!(engine.decide(&hit), LegacyDecision::Route("org.mozilla.firefox".into()));
    }

    #[test]
    fn test_summary() {
        assert_eq!(LegacyDecision::Route("a".into()).summary(), "route:a");
        assert_eq!(LegacyDecision::ShowChooser.summary(), "showChooser");
        assert_eq!(
            LegacyDecision::Fallback(FallbackReason::InvalidUrl).summary(),
            "fallback:invalidURL"
        );
    }
}
