//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Redact references before they are logged
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Logged references keep scheme, host and path only unless debug
//!   logging of full references is switched on

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

/// Placeholder for references that cannot be parsed.
pub const REDACTED: &str = "<redacted-url>";

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Reference text suitable for logs.
pub fn redact_reference(reference: &str, debug_urls: bool) -> String {
    if debug_urls {
        return reference.to_string();
    }
    match Url::parse(reference.trim()) {
        Ok(url) => redact_url(&url),
        Err(_) => REDACTED.to_string(),
    }
}

/// `scheme://host/path`, dropping userinfo, port, query and fragment.
pub fn redact_url(url: &Url) -> String {
    if url.cannot_be_a_base() {
        return format!("{}:{}", url.scheme(), url.path());
    }
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.path()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        assert_eq!(
            redact_reference("https://user:pw@example.com:8443/a/b?token=x#frag", false),
            "https://example.com/a/b"
        );
        assert_eq!(redact_reference("not a url", false), REDACTED);
        assert_eq!(redact_reference("https://example.com/?q=1", true), "https://example.com/?q=1");
    }

    #[test]
    fn test_redaction_without_host() {
        assert_eq!(redact_reference("mailto:someone@example.com?subject=hi", false), "mailto:someone@example.com");
        assert_eq!(redact_reference("file:///tmp/a.pdf", false), "file:///tmp/a.pdf");
    }
}
