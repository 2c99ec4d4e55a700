//! Predicate matching logic.
//!
//! # Responsibilities
//! - Match each predicate dimension against the normalized request/context
//! - Combine conditions with AND semantics
//! - Report how many dimensions a rule constrained on (specificity)
//!
//! # Design Decisions
//! - Scheme, domain, source-app, focus and context compare case-insensitively
//! - Path and query compare case-sensitively
//! - Unspecified dimension = no matcher = always matches
//! - Wildcards are `*.suffix` (domain) and `prefix*` (path); no regex here

use std::collections::HashSet;

use crate::routing::request::{EvaluationContext, NormalizedRequest};
use crate::rules::RuleRecord;

/// What a matcher sees.
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    pub request: &'a NormalizedRequest,
    pub context: &'a EvaluationContext,
}

/// Trait for matching requests against one predicate dimension.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the input satisfies this condition.
    fn matches(&self, input: &MatchInput<'_>) -> bool;
}

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Exact scheme match.
#[derive(Debug, Clone)]
pub struct SchemeMatcher {
    expected: String,
}

impl SchemeMatcher {
    pub fn new(scheme: &str) -> Self {
        Self {
            expected: fold(scheme),
        }
    }
}

impl Matcher for SchemeMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        input.request.scheme.as_deref() == Some(self.expected.as_str())
    }
}

/// Exact host or `*.suffix` wildcard. The wildcard also matches the bare suffix.
#[derive(Debug, Clone)]
pub struct DomainMatcher {
    expected: String,
}

impl DomainMatcher {
    pub fn new(domain: &str) -> Self {
        Self {
            expected: fold(domain),
        }
    }
}

impl Matcher for DomainMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        let Some(host) = input.request.host.as_deref() else {
            return false;
        };
        match self.expected.strip_prefix("*.") {
            Some(suffix) => {
                host == suffix
                    || host
                        .strip_suffix(suffix)
                        .is_some_and(|head| head.ends_with('.'))
            }
            None => host == self.expected,
        }
    }
}

/// Exact path or `prefix*` wildcard.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    expected: String,
}

impl PathMatcher {
    pub fn new(path: &str) -> Self {
        Self {
            expected: path.trim().to_string(),
        }
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        match self.expected.strip_suffix('*') {
            Some(prefix) => input.request.path.starts_with(prefix),
            None => input.request.path == self.expected,
        }
    }
}

/// Exact query string.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    expected: String,
}

impl QueryMatcher {
    pub fn new(query: &str) -> Self {
        Self {
            expected: query.trim().to_string(),
        }
    }
}

impl Matcher for QueryMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        input.request.query.as_deref() == Some(self.expected.as_str())
    }
}

/// Which free-form string field a [`TextMatcher`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    SourceApp,
    FocusHint,
    ContextTag,
}

/// Case-insensitive equality on a string field.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    field: TextField,
    expected: String,
}

impl TextMatcher {
    pub fn new(field: TextField, value: &str) -> Self {
        Self {
            field,
            expected: fold(value),
        }
    }
}

impl Matcher for TextMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        let actual = match self.field {
            TextField::SourceApp => input.request.origin_app.as_deref(),
            TextField::FocusHint => input.context.focus_hint.as_deref(),
            TextField::ContextTag => input.context.context_tag.as_deref(),
        };
        actual.is_some_and(|v| fold(v) == self.expected)
    }
}

/// Which hint a [`MembershipMatcher`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintField {
    MimeType,
    PathExtension,
}

/// The hint must be one of the listed values.
#[derive(Debug, Clone)]
pub struct MembershipMatcher {
    field: HintField,
    allowed: HashSet<String>,
}

impl MembershipMatcher {
    pub fn new(field: HintField, values: &[String]) -> Self {
        Self {
            field,
            allowed: values.iter().map(|v| fold(v)).collect(),
        }
    }
}

impl Matcher for MembershipMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        let actual = match self.field {
            HintField::MimeType => input.context.mime_type.as_deref(),
            HintField::PathExtension => input.context.path_extension.as_deref(),
        };
        actual.is_some_and(|v| self.allowed.contains(&fold(v)))
    }
}

/// All required modifier keys must be held (subset test).
#[derive(Debug, Clone)]
pub struct ModifierKeysMatcher {
    required: HashSet<String>,
}

impl ModifierKeysMatcher {
    pub fn new(keys: &[String]) -> Self {
        Self {
            required: keys
                .iter()
                .map(|k| fold(k))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Matcher for ModifierKeysMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        let held: HashSet<String> = input
            .context
            .modifier_keys
            .iter()
            .map(|k| fold(k))
            .filter(|k| !k.is_empty())
            .collect();
        self.required.is_subset(&held)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// Build the matcher set for a rule's specified dimensions.
    pub fn for_rule(rule: &RuleRecord) -> Self {
        let p = &rule.predicate;
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();

        let text = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        let set = |v: &Option<Vec<String>>| v.clone().filter(|s| !s.is_empty());

        if let Some(scheme) = text(&p.scheme) {
            matchers.push(Box::new(SchemeMatcher::new(&scheme)));
        }
        if let Some(domain) = rule.effective_domain() {
            matchers.push(Box::new(DomainMatcher::new(domain)));
        }
        if let Some(path) = text(&p.path) {
            matchers.push(Box::new(PathMatcher::new(&path)));
        }
        if let Some(query) = text(&p.query) {
            matchers.push(Box::new(QueryMatcher::new(&query)));
        }
        if let Some(source) = text(&p.source_app) {
            matchers.push(Box::new(TextMatcher::new(TextField::SourceApp, &source)));
        }
        if let Some(focus) = text(&p.focus_hint) {
            matchers.push(Box::new(TextMatcher::new(TextField::FocusHint, &focus)));
        }
        if let Some(tag) = text(&p.context_tag) {
            matchers.push(Box::new(TextMatcher::new(TextField::ContextTag, &tag)));
        }
        if let Some(keys) = set(&p.modifier_keys) {
            matchers.push(Box::new(ModifierKeysMatcher::new(&keys)));
        }
        if let Some(mimes) = set(&p.mime_types) {
            matchers.push(Box::new(MembershipMatcher::new(HintField::MimeType, &mimes)));
        }
        if let Some(exts) = set(&p.extensions) {
            matchers.push(Box::new(MembershipMatcher::new(HintField::PathExtension, &exts)));
        }

        Self::new(matchers)
    }

    /// Number of combined conditions; for a rule this is its specificity.
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, input: &MatchInput<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(input))
    }
}
