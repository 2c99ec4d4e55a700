//! Classification and validation of raw inbound references.

use serde::Serialize;
use std::borrow::Cow;
use url::Url;

use crate::routing::request::{InboundRequest, RequestKind, SourceContext};

/// Why an inbound reference was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum InboundRejection {
    #[error("reference could not be parsed")]
    InvalidReference,

    #[error("scheme is not handled")]
    UnsupportedScheme,

    #[error("mailto reference has no valid address")]
    InvalidMailtoAddress,

    #[error("file reference is not a local absolute path")]
    NonCanonicalFileReference,
}

impl InboundRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            InboundRejection::InvalidReference => "invalid_reference",
            InboundRejection::UnsupportedScheme => "unsupported_scheme",
            InboundRejection::InvalidMailtoAddress => "invalid_mailto_address",
            InboundRejection::NonCanonicalFileReference => "non_canonical_file_reference",
        }
    }
}

/// Parse and classify a raw reference.
pub fn classify_reference(raw: &str, source: SourceContext) -> Result<InboundRequest, InboundRejection> {
    let url = Url::parse(raw.trim()).map_err(|_| InboundRejection::InvalidReference)?;
    classify_url(url, source)
}

/// Classify an already parsed reference.
pub fn classify_url(url: Url, source: SourceContext) -> Result<InboundRequest, InboundRejection> {
    let kind = match url.scheme() {
        "http" | "https" => RequestKind::Link,
        "mailto" if is_valid_mailto(&url) => RequestKind::Email,
        "mailto" => return Err(InboundRejection::InvalidMailtoAddress),
        "file" if is_canonical_file(&url) => RequestKind::File,
        "file" => return Err(InboundRejection::NonCanonicalFileReference),
        _ => return Err(InboundRejection::UnsupportedScheme),
    };
    Ok(InboundRequest::new(kind, url, source))
}

/// `file:///absolute/path` with no host.
pub fn is_canonical_file(url: &Url) -> bool {
    url.scheme() == "file"
        && url.host_str().unwrap_or_default().is_empty()
        && url.as_str().starts_with("file:///")
        && url.path().starts_with('/')
}

/// Every recipient has an `@` that is neither first nor last. Recipients
/// come from the path, or from `to=` query items when the path has none.
pub fn is_valid_mailto(url: &Url) -> bool {
    if url.scheme() != "mailto" {
        return false;
    }

    fn valid(candidate: &str) -> bool {
        let trimmed = candidate.trim();
        trimmed.contains('@') && !trimmed.starts_with('@') && !trimmed.ends_with('@')
    }

    let direct = mailto_recipients(url.path());
    if !direct.is_empty() {
        return direct.iter().all(|r| valid(r));
    }

    let query: Vec<String> = url
        .query_pairs()
        .filter(|(name, _)| name.eq_ignore_ascii_case("to"))
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(str::to_string)
                .filter(|r| !r.trim().is_empty())
                .collect::<Vec<_>>()
        })
        .collect();

    !query.is_empty() && query.iter().all(|r| valid(r))
}

/// Comma separated recipients, percent-decoded. Malformed escapes stay literal.
fn mailto_recipients(list: &str) -> Vec<String> {
    list.split(',')
        .map(|r| urlencoding::decode(r).map(Cow::into_owned).unwrap_or_else(|_| r.to_string()))
        .filter(|r| !r.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(raw: &str) -> Result<RequestKind, InboundRejection> {
        classify_reference(raw, SourceContext::warm_open()).map(|r| r.kind())
    }

    #[test]
    fn test_links() {
        assert_eq!(classify("https://example.com/"), Ok(RequestKind::Link));
        assert_eq!(classify("HTTP://example.com/"), Ok(RequestKind::Link));
        assert_eq!(classify("ftp://example.com/"), Err(InboundRejection::UnsupportedScheme));
        assert_eq!(classify("not a url"), Err(InboundRejection::InvalidReference));
    }

    #[test]
    fn test_mailto() {
        assert_eq!(classify("mailto:a@example.com"), Ok(RequestKind::Email));
        assert_eq!(classify("mailto:a@example.com,b@example.org"), Ok(RequestKind::Email));
        assert_eq!(classify("mailto:a%40example.com"), Ok(RequestKind::Email));
        assert_eq!(classify("mailto:?to=a@example.com&subject=hi"), Ok(RequestKind::Email));
        assert_eq!(classify("mailto:a@example.com,@bad"), Err(InboundRejection::InvalidMailtoAddress));
        assert_eq!(classify("mailto:user@"), Err(InboundRejection::InvalidMailtoAddress));
        assert_eq!(classify("mailto:?subject=hi"), Err(InboundRejection::InvalidMailtoAddress));
        assert_eq!(classify("mailto:"), Err(InboundRejection::InvalidMailtoAddress));
    }

    #[test]
    fn test_files() {
        assert_eq!(classify("file:///Users/me/report.pdf"), Ok(RequestKind::File));
        assert_eq!(
            classify("file://server/share/report.pdf"),
            Err(InboundRejection::NonCanonicalFileReference)
        );
    }

    #[test]
    fn test_mailto_recipients_decoding() {
        assert_eq!(mailto_recipients("a%40b.com, ,c@d.com"), vec!["a@b.com", "c@d.com"]);
        assert_eq!(mailto_recipients("a%+1@b.com"), vec!["a%+1@b.com"]);
        assert_eq!(mailto_recipients("100%"), vec!["100%"]);
        assert_eq!(mailto_recipients("%zz@x.com"), vec!["%zz@x.com"]);
    }
}
