//! Browser-extension handoff envelopes.
//!
//! # Responsibilities
//! - Parse the version-1 JSON envelope
//! - Validate the carried reference and map the source to a request kind
//! - Fall back to opening a caller-supplied reference directly on rejection
//!
//! # Design Decisions
//! - Field types are checked by hand so each failure maps to one reason
//! - A fallback reference must itself pass the scheme and file checks

use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::intake::inbound::is_canonical_file;
use crate::routing::request::{InboundRequest, RequestKind, SourceContext, SourceTrigger};

const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "mailto", "file"];

/// Where in the extension the handoff started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffSource {
    Toolbar,
    ContextMenu,
    Link,
    Share,
    Handoff,
}

impl HandoffSource {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "toolbar" => Some(HandoffSource::Toolbar),
            "contextmenu" => Some(HandoffSource::ContextMenu),
            "link" => Some(HandoffSource::Link),
            "share" => Some(HandoffSource::Share),
            "handoff" => Some(HandoffSource::Handoff),
            _ => None,
        }
    }

    fn mapping(self) -> (RequestKind, SourceTrigger) {
        match self {
            HandoffSource::Toolbar => (RequestKind::ExtensionHandoff, SourceTrigger::ExtensionToolbar),
            HandoffSource::ContextMenu => (RequestKind::ExtensionHandoff, SourceTrigger::ExtensionContextMenu),
            HandoffSource::Link => (RequestKind::Link, SourceTrigger::ExtensionContextMenu),
            HandoffSource::Share => (RequestKind::Share, SourceTrigger::Share),
            HandoffSource::Handoff => (RequestKind::Handoff, SourceTrigger::Handoff),
        }
    }
}

/// A parsed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffEnvelope {
    pub version: i64,
    pub url: String,
    pub source: HandoffSource,
    pub origin_app: Option<String>,
    pub user_initiated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum HandoffRejection {
    #[error("envelope is not a JSON object with a version")]
    MalformedEnvelope,
    #[error("envelope version is not supported")]
    UnsupportedVersion,
    #[error("envelope has no url")]
    MissingUrl,
    #[error("envelope url is invalid")]
    InvalidUrl,
    #[error("envelope source is invalid")]
    InvalidSource,
    #[error("envelope url scheme is not supported")]
    UnsupportedScheme,
    #[error("envelope file url is not canonical")]
    NonCanonicalFileUrl,
}

impl HandoffRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            HandoffRejection::MalformedEnvelope => "malformed_envelope",
            HandoffRejection::UnsupportedVersion => "unsupported_version",
            HandoffRejection::MissingUrl => "missing_url",
            HandoffRejection::InvalidUrl => "invalid_url",
            HandoffRejection::InvalidSource => "invalid_source",
            HandoffRejection::UnsupportedScheme => "unsupported_scheme",
            HandoffRejection::NonCanonicalFileUrl => "non_canonical_file_url",
        }
    }
}

/// What to do with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffResult {
    Request(InboundRequest),
    FallbackToDirectOpen { url: Url, reason: HandoffRejection },
    Rejected(HandoffRejection),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HandoffBroker;

impl HandoffBroker {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, data: &[u8], fallback: Option<&Url>) -> HandoffResult {
        let outcome = parse_envelope(data).and_then(|envelope| map_envelope(&envelope));
        match outcome {
            Ok(request) => HandoffResult::Request(request),
            Err(reason) => match fallback.filter(|url| is_valid_fallback(url)) {
                Some(url) => HandoffResult::FallbackToDirectOpen {
                    url: url.clone(),
                    reason,
                },
                None => HandoffResult::Rejected(reason),
            },
        }
    }
}

pub fn parse_envelope(data: &[u8]) -> Result<HandoffEnvelope, HandoffRejection> {
    let value: Value = serde_json::from_slice(data).map_err(|_| HandoffRejection::MalformedEnvelope)?;
    let payload = value.as_object().ok_or(HandoffRejection::MalformedEnvelope)?;

    let version = payload
        .get("version")
        .and_then(Value::as_i64)
        .ok_or(HandoffRejection::MalformedEnvelope)?;
    if version != 1 {
        return Err(HandoffRejection::UnsupportedVersion);
    }

    let url = payload
        .get("url")
        .and_then(Value::as_str)
        .ok_or(HandoffRejection::MissingUrl)?;

    let source = payload
        .get("source")
        .and_then(Value::as_str)
        .and_then(HandoffSource::parse)
        .ok_or(HandoffRejection::InvalidSource)?;

    Ok(HandoffEnvelope {
        version,
        url: url.to_string(),
        source,
        origin_app: payload
            .get("sourceApplicationBundleIdentifier")
            .and_then(Value::as_str)
            .map(str::to_string),
        user_initiated: payload
            .get("isUserInitiated")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    })
}

fn map_envelope(envelope: &HandoffEnvelope) -> Result<InboundRequest, HandoffRejection> {
    let url = Url::parse(envelope.url.trim()).map_err(|_| HandoffRejection::InvalidUrl)?;
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(HandoffRejection::UnsupportedScheme);
    }
    if url.scheme() == "file" && !is_canonical_file(&url) {
        return Err(HandoffRejection::NonCanonicalFileUrl);
    }

    let (kind, trigger) = envelope.source.mapping();
    let source = SourceContext::new(envelope.origin_app.clone(), trigger, envelope.user_initiated);
    Ok(InboundRequest::new(kind, url, source))
}

fn is_valid_fallback(url: &Url) -> bool {
    SUPPORTED_SCHEMES.contains(&url.scheme()) && (url.scheme() != "file" || is_canonical_file(url))
}
