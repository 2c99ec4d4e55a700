//! Execution plans produced by the rule engine.

use serde::{Deserialize, Serialize};

use crate::routing::request::InboundRequest;
use crate::rules::TargetReference;

/// How the dispatcher should treat a list of targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchMode {
    /// Only the first resolved target is attempted.
    #[default]
    Single,
    /// Targets are attempted in order until one opens.
    OrderedFailover,
    /// Every target is attempted.
    FanOut,
}

impl std::str::FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(DispatchMode::Single),
            "failover" | "ordered-failover" => Ok(DispatchMode::OrderedFailover),
            "fanout" | "fan-out" => Ok(DispatchMode::FanOut),
            other => Err(format!("unknown dispatch mode: {other}")),
        }
    }
}

/// One human-auditable step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    pub detail: String,
}

impl PlanStep {
    pub fn new(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            detail: detail.into(),
        }
    }
}

/// The engine's decision for one request. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Request after any rewrite.
    pub request: InboundRequest,
    /// `None` means "show the chooser".
    pub preferred_target: Option<String>,
    pub configured_fallback: Option<String>,
    pub target_reference: Option<TargetReference>,
    pub dispatch_mode: DispatchMode,
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Plan with no preferred target.
    pub fn ask(request: InboundRequest) -> Self {
        Self {
            request,
            preferred_target: None,
            configured_fallback: None,
            target_reference: None,
            dispatch_mode: DispatchMode::Single,
            steps: Vec::new(),
        }
    }

    /// Trimmed, non-empty preferred target.
    pub fn route_target(&self) -> Option<&str> {
        self.preferred_target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!("single".parse::<DispatchMode>(), Ok(DispatchMode::Single));
        assert_eq!("Failover".parse::<DispatchMode>(), Ok(DispatchMode::OrderedFailover));
        assert_eq!("fan-out".parse::<DispatchMode>(), Ok(DispatchMode::FanOut));
        assert!("broadcast".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_route_target_ignores_blank() {
        let url = url::Url::parse("https://example.com/").unwrap();
        let mut plan = ExecutionPlan::ask(InboundRequest::link(url));
        assert_eq!(plan.route_target(), None);

        plan.preferred_target = Some("  ".into());
        assert_eq!(plan.route_target(), None);

        plan.preferred_target = Some(" com.apple.Safari ".into());
        assert_eq!(plan.route_target(), Some("com.apple.Safari"));
    }
}
