//! Reference rewriting before dispatch.
//!
//! # Responsibilities
//! - Decode a `run-command` string into a rewrite instruction
//! - Apply regex rewrites and the three fixed script verbs
//! - Validate the rewritten reference
//!
//! # Design Decisions
//! - Never fails outward: every path returns a [`RewriteOutcome`]
//! - On failure the original request is returned untouched
//! - Scripts are matched against an anchored, closed grammar and are never
//!   evaluated; a token denylist runs first as a separate check

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use url::Url;

use crate::observability::metrics;
use crate::routing::request::InboundRequest;

/// Longest accepted script source, in characters.
pub const MAX_SCRIPT_LEN: usize = 256;

/// Longest accepted rewritten reference, in characters.
pub const MAX_OUTPUT_LEN: usize = 4096;

const REGEX_PREFIX: &str = "rewrite_regex|";
const SCRIPT_PREFIX: &str = "rewrite_script|";

/// Tokens that reference I/O, processes, networking, imports or loops.
const UNSAFE_SCRIPT_TOKENS: &[&str] = &[
    "URLSession",
    "FileManager",
    "Process(",
    "import ",
    "while ",
    "for ",
    "repeat ",
    "DispatchQueue",
];

/// A decoded rewrite instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteInstruction {
    Regex { pattern: String, replacement: String },
    Script { source: String },
}

impl RewriteInstruction {
    /// Decode the command string of a `run-command` action.
    ///
    /// Unknown prefixes carry no rewrite. A regex payload without the
    /// `pattern|replacement` separator decodes to an empty pattern so the
    /// pipeline reports it as malformed.
    pub fn from_command(command: &str) -> Option<Self> {
        let command = command.trim();
        if let Some(payload) = command.strip_prefix(REGEX_PREFIX) {
            return Some(match payload.split_once('|') {
                Some((pattern, replacement)) => RewriteInstruction::Regex {
                    pattern: pattern.to_string(),
                    replacement: replacement.to_string(),
                },
                None => RewriteInstruction::Regex {
                    pattern: String::new(),
                    replacement: String::new(),
                },
            });
        }
        command
            .strip_prefix(SCRIPT_PREFIX)
            .map(|source| RewriteInstruction::Script {
                source: source.to_string(),
            })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RewriteInstruction::Regex { .. } => "regex",
            RewriteInstruction::Script { .. } => "script",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStatus {
    NotConfigured,
    Applied,
    Failed,
}

impl RewriteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RewriteStatus::NotConfigured => "not_configured",
            RewriteStatus::Applied => "applied",
            RewriteStatus::Failed => "failed",
        }
    }
}

/// Machine-readable rewrite reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteReason {
    NoRewriteInstruction,
    Ok,
    MalformedInstruction,
    InvalidRegex,
    InvalidOutputUrl,
    ScriptTooLong,
    UnsafeScriptToken,
    UnsupportedScript,
}

impl RewriteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RewriteReason::NoRewriteInstruction => "no_rewrite_instruction",
            RewriteReason::Ok => "ok",
            RewriteReason::MalformedInstruction => "malformed_instruction",
            RewriteReason::InvalidRegex => "invalid_regex",
            RewriteReason::InvalidOutputUrl => "invalid_output_url",
            RewriteReason::ScriptTooLong => "script_too_long",
            RewriteReason::UnsafeScriptToken => "unsafe_script_token",
            RewriteReason::UnsupportedScript => "unsupported_script",
        }
    }
}

/// Result of running the pipeline. `request` is always usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub request: InboundRequest,
    pub status: RewriteStatus,
    pub reason: RewriteReason,
}

impl RewriteOutcome {
    fn unchanged(request: &InboundRequest, status: RewriteStatus, reason: RewriteReason) -> Self {
        Self {
            request: request.clone(),
            status,
            reason,
        }
    }

    fn failed(request: &InboundRequest, reason: RewriteReason) -> Self {
        Self::unchanged(request, RewriteStatus::Failed, reason)
    }

    fn applied(request: InboundRequest) -> Self {
        Self {
            request,
            status: RewriteStatus::Applied,
            reason: RewriteReason::Ok,
        }
    }
}

/// The script grammar: `verb('arg')` or `verb('a','b')`, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScriptCall {
    SetScheme(String),
    ReplacePrefix(String, String),
    ReplaceRegex(String, String),
}

fn grammar() -> &'static [(&'static str, Regex); 3] {
    static GRAMMAR: OnceLock<[(&'static str, Regex); 3]> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("valid rewrite grammar");
        [
            ("setScheme", compile(r"^setScheme\('([^']+)'\)$")),
            ("replacePrefix", compile(r"^replacePrefix\('([^']*)','([^']*)'\)$")),
            ("replaceRegex", compile(r"^replaceRegex\('([^']*)','([^']*)'\)$")),
        ]
    })
}

fn parse_script(source: &str) -> Option<ScriptCall> {
    for (verb, pattern) in grammar() {
        let Some(caps) = pattern.captures(source) else {
            continue;
        };
        let arg = |i: usize| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default();
        return Some(match *verb {
            "setScheme" => ScriptCall::SetScheme(arg(1)),
            "replacePrefix" => ScriptCall::ReplacePrefix(arg(1), arg(2)),
            _ => ScriptCall::ReplaceRegex(arg(1), arg(2)),
        });
    }
    None
}

/// Applies an optional rewrite instruction to a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct RewritePipeline;

impl RewritePipeline {
    pub fn new() -> Self {
        Self
    }

    pub fn rewrite(
        &self,
        request: &InboundRequest,
        instruction: Option<&RewriteInstruction>,
    ) -> RewriteOutcome {
        let outcome = match instruction {
            None => RewriteOutcome::unchanged(
                request,
                RewriteStatus::NotConfigured,
                RewriteReason::NoRewriteInstruction,
            ),
            Some(RewriteInstruction::Regex {
                pattern,
                replacement,
            }) => self.apply_regex(request, pattern, replacement),
            Some(RewriteInstruction::Script { source }) => self.apply_script(request, source),
        };

        if outcome.status == RewriteStatus::Failed {
            tracing::debug!(reason = outcome.reason.as_str(), "Rewrite rejected, keeping original reference");
        }
        metrics::record_rewrite(outcome.status.as_str());
        outcome
    }

    fn apply_regex(
        &self,
        request: &InboundRequest,
        pattern: &str,
        replacement: &str,
    ) -> RewriteOutcome {
        if pattern.is_empty() {
            return RewriteOutcome::failed(request, RewriteReason::MalformedInstruction);
        }
        let Ok(regex) = Regex::new(pattern) else {
            return RewriteOutcome::failed(request, RewriteReason::InvalidRegex);
        };

        let rewritten = regex.replace_all(request.target().as_str(), replacement);
        finalize(request, &rewritten)
    }

    fn apply_script(&self, request: &InboundRequest, source: &str) -> RewriteOutcome {
        if source.chars().count() > MAX_SCRIPT_LEN {
            return RewriteOutcome::failed(request, RewriteReason::ScriptTooLong);
        }
        if UNSAFE_SCRIPT_TOKENS.iter().any(|token| source.contains(token)) {
            return RewriteOutcome::failed(request, RewriteReason::UnsafeScriptToken);
        }

        match parse_script(source) {
            Some(ScriptCall::SetScheme(scheme)) => set_scheme(request, &scheme),
            Some(ScriptCall::ReplacePrefix(from, to)) => {
                let current = request.target().as_str();
                let rewritten = match current.strip_prefix(from.as_str()) {
                    Some(rest) => format!("{to}{rest}"),
                    None => current.to_string(),
                };
                finalize(request, &rewritten)
            }
            Some(ScriptCall::ReplaceRegex(pattern, replacement)) => {
                self.apply_regex(request, &pattern, &replacement)
            }
            None => RewriteOutcome::failed(request, RewriteReason::UnsupportedScript),
        }
    }
}

fn set_scheme(request: &InboundRequest, scheme: &str) -> RewriteOutcome {
    if !scheme.chars().next().is_some_and(char::is_alphabetic) {
        return RewriteOutcome::failed(request, RewriteReason::UnsupportedScript);
    }

    let current = request.target();
    let rest = &current.as_str()[current.scheme().len()..];
    match Url::parse(&format!("{scheme}{rest}")) {
        Ok(url) => RewriteOutcome::applied(request.with_target(url)),
        Err(_) => RewriteOutcome::failed(request, RewriteReason::InvalidOutputUrl),
    }
}

fn finalize(request: &InboundRequest, rewritten: &str) -> RewriteOutcome {
    if rewritten.chars().count() > MAX_OUTPUT_LEN {
        return RewriteOutcome::failed(request, RewriteReason::InvalidOutputUrl);
    }
    match Url::parse(rewritten) {
        Ok(url) if !url.scheme().is_empty() => RewriteOutcome::applied(request.with_target(url)),
        _ => RewriteOutcome::failed(request, RewriteReason::InvalidOutputUrl),
    }
}
