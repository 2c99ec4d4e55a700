//! Handler targets and discovery.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// What a handler can open and how it can be launched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerCapabilities {
    pub schemes: Vec<String>,
    pub extensions: Vec<String>,
    pub mime_types: Vec<String>,
    pub supports_profiles: bool,
    pub supports_workspaces: bool,
}

impl HandlerCapabilities {
    /// Value lists are trimmed, lower-cased, de-duplicated and sorted.
    pub fn new(
        schemes: &[String],
        extensions: &[String],
        mime_types: &[String],
        supports_profiles: bool,
        supports_workspaces: bool,
    ) -> Self {
        Self {
            schemes: normalized(schemes),
            extensions: normalized(extensions),
            mime_types: normalized(mime_types),
            supports_profiles,
            supports_workspaces,
        }
    }

    pub fn handles_scheme(&self, scheme: &str) -> bool {
        let scheme = scheme.trim().to_lowercase();
        self.schemes.iter().any(|s| *s == scheme)
    }
}

fn normalized(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// An installed handler program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerTarget {
    pub id: String,
    pub display_name: String,
    /// Where the handler lives; handed to the opener.
    pub location: String,
    pub capabilities: HandlerCapabilities,
}

impl HandlerTarget {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            location: location.into(),
            capabilities: HandlerCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: HandlerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Source of installed handlers.
pub trait HandlerDiscovery: Send + Sync + std::fmt::Debug {
    fn discover(&self) -> Vec<HandlerTarget>;
}

/// Handlers listed in configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDiscovery {
    handlers: Vec<HandlerTarget>,
    self_id: Option<String>,
    hidden: HashSet<String>,
}

impl ConfiguredDiscovery {
    pub fn new(handlers: Vec<HandlerTarget>) -> Self {
        Self {
            handlers,
            ..Default::default()
        }
    }

    /// Exclude the host application's own id.
    pub fn excluding_self(mut self, self_id: impl Into<String>) -> Self {
        self.self_id = Some(self_id.into());
        self
    }

    pub fn hiding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden.extend(ids.into_iter().map(Into::into));
        self
    }
}

impl HandlerDiscovery for ConfiguredDiscovery {
    fn discover(&self) -> Vec<HandlerTarget> {
        self.handlers
            .iter()
            .filter(|h| self.self_id.as_deref() != Some(h.id.as_str()))
            .filter(|h| !self.hidden.contains(&h.id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_are_normalized() {
        let caps = HandlerCapabilities::new(
            &["HTTPS".into(), " http ".into(), "https".into(), "".into()],
            &[],
            &["Text/HTML".into()],
            true,
            false,
        );
        assert_eq!(caps.schemes, vec!["http", "https"]);
        assert_eq!(caps.mime_types, vec!["text/html"]);
        assert!(caps.handles_scheme("HTTP"));
        assert!(!caps.handles_scheme("mailto"));
    }

    #[test]
    fn test_discovery_excludes_self_and_hidden() {
        let discovery = ConfiguredDiscovery::new(vec![
            HandlerTarget::new("com.example.linkroute", "Self", "/apps/self"),
            HandlerTarget::new("org.mozilla.firefox", "Firefox", "/apps/firefox"),
            HandlerTarget::new("com.hidden", "Hidden", "/apps/hidden"),
            HandlerTarget::new("com.apple.Safari", "Safari", "/apps/safari"),
        ])
        .excluding_self("com.example.linkroute")
        .hiding(["com.hidden"]);

        let ids: Vec<String> = discovery.discover().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["org.mozilla.firefox", "com.apple.Safari"]);
    }
}
