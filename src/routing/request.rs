//! Inbound request model and the normalized view the matcher works on.
//!
//! # Responsibilities
//! - Represent an immutable inbound request (kind, reference, source context)
//! - Extract a scheme/host/path/query view for predicate matching
//! - Derive path-extension and MIME hints for file-shaped requests
//!
//! # Design Decisions
//! - Pure functions only; nothing here holds state
//! - A missing MIME mapping leaves the hint unset, it is never guessed

use serde::{Deserialize, Serialize};
use url::Url;

/// What kind of object arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Link,
    Email,
    File,
    ExtensionHandoff,
    Share,
    Handoff,
}

/// How the request was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceTrigger {
    ColdStart,
    WarmOpen,
    ExtensionToolbar,
    ExtensionContextMenu,
    Share,
    Handoff,
    #[default]
    Unknown,
}

/// Where the request came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    /// Identifier of the application that handed us the reference.
    pub origin_app: Option<String>,
    pub trigger: SourceTrigger,
    pub user_initiated: bool,
}

impl SourceContext {
    pub fn new(origin_app: Option<String>, trigger: SourceTrigger, user_initiated: bool) -> Self {
        Self {
            origin_app,
            trigger,
            user_initiated,
        }
    }

    /// Context used for references arriving while the app is running.
    pub fn warm_open() -> Self {
        Self::new(None, SourceTrigger::WarmOpen, true)
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::new(None, SourceTrigger::Unknown, true)
    }
}

/// A reference to be routed. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    kind: RequestKind,
    target: Url,
    source: SourceContext,
}

impl InboundRequest {
    pub fn new(kind: RequestKind, target: Url, source: SourceContext) -> Self {
        Self {
            kind,
            target,
            source,
        }
    }

    /// A plain link with a default source context.
    pub fn link(target: Url) -> Self {
        Self::new(RequestKind::Link, target, SourceContext::default())
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn source(&self) -> &SourceContext {
        &self.source
    }

    /// Same request pointing at a different reference.
    pub fn with_target(&self, target: Url) -> Self {
        Self {
            kind: self.kind,
            target,
            source: self.source.clone(),
        }
    }

    /// True for file objects and `file:` references.
    pub fn is_file_shaped(&self) -> bool {
        self.kind == RequestKind::File || self.target.scheme().eq_ignore_ascii_case("file")
    }

    /// Lower-cased extension of the last path segment, if any.
    pub fn path_extension(&self) -> Option<String> {
        let last = self.target.path().rsplit('/').next().unwrap_or_default();
        let (stem, ext) = last.rsplit_once('.')?;
        let ext = ext.trim();
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }

    /// Matching view of the reference.
    pub fn normalized(&self) -> NormalizedRequest {
        let url = &self.target;
        let path = url.path();
        NormalizedRequest {
            scheme: Some(url.scheme().trim().to_lowercase()).filter(|s| !s.is_empty()),
            host: url
                .host_str()
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty()),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query: url.query().map(str::to_string),
            origin_app: self.source.origin_app.clone(),
        }
    }
}

/// Scheme/host/path/query view of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub path: String,
    pub query: Option<String>,
    pub origin_app: Option<String>,
}

/// Caller-supplied hints that are not part of the reference itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub modifier_keys: Vec<String>,
    pub focus_hint: Option<String>,
    pub context_tag: Option<String>,
    pub mime_type: Option<String>,
    pub path_extension: Option<String>,
}

impl EvaluationContext {
    /// Fill in missing extension and MIME hints from the request.
    pub fn enrich(&self, request: &InboundRequest) -> EvaluationContext {
        let path_extension = self
            .path_extension
            .clone()
            .or_else(|| request.path_extension());

        let mime_type = self.mime_type.clone().or_else(|| {
            if !request.is_file_shaped() {
                return None;
            }
            path_extension.as_deref().and_then(mime_for_extension)
        });

        EvaluationContext {
            modifier_keys: self.modifier_keys.clone(),
            focus_hint: self.focus_hint.clone(),
            context_tag: self.context_tag.clone(),
            mime_type,
            path_extension,
        }
    }
}

/// Platform extension to MIME lookup.
pub fn mime_for_extension(ext: &str) -> Option<String> {
    mime_guess::from_ext(ext)
        .first()
        .map(|mime| mime.essence_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_normalized_view() {
        let req = InboundRequest::new(
            RequestKind::Link,
            url("HTTPS://Example.COM/Docs/Page?q=1#frag"),
            SourceContext::new(Some("com.slack".into()), SourceTrigger::WarmOpen, true),
        );
        let view = req.normalized();
        assert_eq!(view.scheme.as_deref(), Some("https"));
        assert_eq!(view.host.as_deref(), Some("example.com"));
        assert_eq!(view.path, "/Docs/Page");
        assert_eq!(view.query.as_deref(), Some("q=1"));
        assert_eq!(view.origin_app.as_deref(), Some("com.slack"));
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(
            InboundRequest::link(url("https://a.com/files/Report.PDF")).path_extension(),
            Some("pdf".to_string())
        );
        assert_eq!(InboundRequest::link(url("https://a.com/")).path_extension(), None);
        assert_eq!(InboundRequest::link(url("https://a.com/.hidden")).path_extension(), None);
    }

    #[test]
    fn test_enrich_derives_mime_only_for_files() {
        let file = InboundRequest::new(
            RequestKind::File,
            url("file:///Users/me/report.pdf"),
            SourceContext::default(),
        );
        let ctx = EvaluationContext::default().enrich(&file);
        assert_eq!(ctx.path_extension.as_deref(), Some("pdf"));
        assert_eq!(ctx.mime_type.as_deref(), Some("application/pdf"));

        let link = InboundRequest::link(url("https://a.com/report.pdf"));
        let ctx = EvaluationContext::default().enrich(&link);
        assert_eq!(ctx.path_extension.as_deref(), Some("pdf"));
        assert_eq!(ctx.mime_type, None);
    }

    #[test]
    fn test_enrich_keeps_caller_hints() {
        let file = InboundRequest::new(
            RequestKind::File,
            url("file:///tmp/notes.txt"),
            SourceContext::default(),
        );
        let ctx = EvaluationContext {
            path_extension: Some("md".into()),
            mime_type: Some("text/markdown".into()),
            ..Default::default()
        }
        .enrich(&file);
        assert_eq!(ctx.path_extension.as_deref(), Some("md"));
        assert_eq!(ctx.mime_type.as_deref(), Some("text/markdown"));
    }

    #[test]
    fn test_unknown_extension_has_no_mime() {
        let file = InboundRequest::new(
            RequestKind::File,
            url("file:///tmp/data.zzqx"),
            SourceContext::default(),
        );
        let ctx = EvaluationContext::default().enrich(&file);
        assert_eq!(ctx.path_extension.as_deref(), Some("zzqx"));
        assert_eq!(ctx.mime_type, None);
    }
}
