//! Rule records as persisted in the version-2 schema.
//!
//! Field names on the wire are load-bearing for existing stores, so every
//! renamed field carries an explicit serde name.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};

/// Priority assigned to rules created from a bare host.
pub const HOST_RULE_PRIORITY: i64 = 100;

/// What to do when a rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Open directly in the given handler.
    AlwaysOpenIn {
        #[serde(rename = "bundleIdentifier")]
        target_id: String,
    },
    /// Show the chooser.
    AlwaysAsk,
    /// Open in the handler after applying the command (rewrite instruction).
    RunCommand {
        #[serde(rename = "bundleIdentifier")]
        target_id: String,
        command: String,
    },
}

impl RuleAction {
    /// Handler this action routes to, `None` for "ask".
    pub fn target_id(&self) -> Option<&str> {
        match self {
            RuleAction::AlwaysOpenIn { target_id } => Some(target_id),
            RuleAction::AlwaysAsk => None,
            RuleAction::RunCommand { target_id, .. } => Some(target_id),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RuleAction::AlwaysOpenIn { .. } => "alwaysOpenIn",
            RuleAction::AlwaysAsk => "alwaysAsk",
            RuleAction::RunCommand { .. } => "runCommand",
        }
    }
}

/// Optional constraints; a rule matches iff every specified one holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Exact host or `*.suffix`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Exact path or `prefix*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(rename = "source", default, skip_serializing_if = "Option::is_none")]
    pub source_app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_hint: Option<String>,
    #[serde(rename = "context", default, skip_serializing_if = "Option::is_none")]
    pub context_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

impl MatchPredicate {
    /// Predicate constraining only the domain.
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Default::default()
        }
    }

    /// Blank strings and empty sets become unspecified.
    pub fn sanitized(self) -> Self {
        fn text(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        fn set(v: Option<Vec<String>>) -> Option<Vec<String>> {
            v.map(|items| {
                items
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|items| !items.is_empty())
        }

        Self {
            scheme: text(self.scheme),
            domain: text(self.domain),
            path: text(self.path),
            query: text(self.query),
            source_app: text(self.source_app),
            modifier_keys: set(self.modifier_keys),
            focus_hint: text(self.focus_hint),
            context_tag: text(self.context_tag),
            mime_types: set(self.mime_types),
            extensions: set(self.extensions),
        }
    }
}

/// Handler plus optional profile/workspace selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReference {
    #[serde(rename = "bundleIdentifier")]
    pub target_id: String,
    #[serde(rename = "profileID", default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(rename = "workspaceID", default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl TargetReference {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            profile_id: None,
            workspace_id: None,
        }
    }
}

/// A routing rule. Identity is `rule_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub rule_id: String,
    pub priority: i64,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "match")]
    pub predicate: MatchPredicate,
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_reference: Option<TargetReference>,
}

impl RuleRecord {
    /// Domain-only rule in the shape legacy host rules take.
    pub fn for_host(host: &str, action: RuleAction, created_at: i64) -> Self {
        Self {
            rule_id: host.to_string(),
            priority: HOST_RULE_PRIORITY,
            created_at,
            host: Some(host.to_string()),
            predicate: MatchPredicate::domain(host),
            action,
            target_reference: None,
        }
    }

    /// Domain constraint: the predicate's domain wins over the legacy host.
    pub fn effective_domain(&self) -> Option<&str> {
        fn non_blank(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        non_blank(&self.predicate.domain).or_else(|| non_blank(&self.host))
    }

    /// Number of predicate dimensions this rule constrains on.
    pub fn specificity(&self) -> usize {
        let p = &self.predicate;
        let text = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let set = |v: &Option<Vec<String>>| v.as_ref().is_some_and(|s| !s.is_empty());

        [
            text(&p.scheme),
            self.effective_domain().is_some(),
            text(&p.path),
            text(&p.query),
            text(&p.source_app),
            text(&p.focus_hint),
            text(&p.context_tag),
            set(&p.modifier_keys),
            set(&p.mime_types),
            set(&p.extensions),
        ]
        .into_iter()
        .filter(|specified| *specified)
        .count()
    }

    /// Handler the rule routes to; an explicit target reference wins.
    pub fn preferred_target(&self) -> Option<&str> {
        match &self.target_reference {
            Some(reference) => Some(reference.target_id.as_str()),
            None => self.action.target_id(),
        }
    }

    fn rank_key(&self, specificity: usize) -> (Reverse<i64>, Reverse<usize>, i64, &str) {
        (
            Reverse(self.priority),
            Reverse(specificity),
            self.created_at,
            self.rule_id.as_str(),
        )
    }
}

/// Total order used everywhere rules compete: priority desc, specificity
/// desc, created-at asc, rule-id asc.
pub fn rank(a: &RuleRecord, a_specificity: usize, b: &RuleRecord, b_specificity: usize) -> Ordering {
    a.rank_key(a_specificity).cmp(&b.rank_key(b_specificity))
}
