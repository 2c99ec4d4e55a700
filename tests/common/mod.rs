//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use linkroute::clock::ManualClock;
use linkroute::dispatch::{ConfiguredDiscovery, HandlerCapabilities, HandlerTarget, LaunchError, Opener};
use linkroute::observability::DiagnosticsRecorder;
use linkroute::profiles::ProfileCatalog;
use linkroute::routing::RolloutFlags;
use linkroute::rules::{RuleSource, RuleStore, StorePaths};
use linkroute::service::{LinkRouter, RouterDeps, RouterSettings};

pub const SAFARI: &str = "com.apple.Safari";
pub const CHROME: &str = "com.google.Chrome";
pub const FIREFOX: &str = "org.mozilla.firefox";
pub const MUSIC: &str = "com.apple.Music";

/// Opener whose outcome per handler id is scripted up front.
#[derive(Debug, Default)]
pub struct ScriptedOpener {
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedOpener {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Handler ids in the order they were asked to open something.
    pub fn targets(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn references(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, refs)| refs.clone())
            .collect()
    }
}

#[async_trait]
impl Opener for ScriptedOpener {
    async fn open(&self, references: &[Url], target: &HandlerTarget) -> Result<(), LaunchError> {
        self.calls.lock().unwrap().push((
            target.id.clone(),
            references.iter().map(|r| r.to_string()).collect(),
        ));
        if self.failing.contains(&target.id) {
            Err(LaunchError::Refused(target.id.clone()))
        } else {
            Ok(())
        }
    }
}

pub fn handlers() -> Vec<HandlerTarget> {
    vec![
        HandlerTarget::new(SAFARI, "Safari", "/Applications/Safari.app"),
        HandlerTarget::new(CHROME, "Google Chrome", "/Applications/Google Chrome.app").with_capabilities(
            HandlerCapabilities::new(&["http".into(), "https".into()], &[], &[], true, false),
        ),
        HandlerTarget::new(FIREFOX, "Firefox", "/Applications/Firefox.app"),
        HandlerTarget::new(MUSIC, "Music", "/System/Applications/Music.app"),
    ]
}

pub struct Harness {
    pub router: LinkRouter,
    pub store: Arc<RuleStore>,
    pub opener: Arc<ScriptedOpener>,
    pub clock: Arc<ManualClock>,
    pub recorder: Arc<DiagnosticsRecorder>,
}

/// Router over a store in `dir` with the standard handler set.
pub fn harness(dir: &Path, rollout: RolloutFlags, failing: &[&str]) -> Harness {
    let clock = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
    let recorder = Arc::new(DiagnosticsRecorder::new(clock.clone()));
    let store = Arc::new(RuleStore::open(StorePaths::in_dir(dir), recorder.clone()));
    let opener = Arc::new(ScriptedOpener::failing(failing));

    let rules: Arc<dyn RuleSource> = store.clone();
    let deps = RouterDeps {
        rules,
        discovery: Arc::new(ConfiguredDiscovery::new(handlers())),
        resolver: Arc::new(ProfileCatalog::default()),
        opener: opener.clone(),
        clock: clock.clone(),
        diagnostics: recorder.clone(),
    };
    let settings = RouterSettings {
        rollout,
        ..RouterSettings::default()
    };

    Harness {
        router: LinkRouter::new(settings, deps),
        store,
        opener,
        clock,
        recorder,
    }
}

pub fn new_engine() -> RolloutFlags {
    RolloutFlags {
        enable_new_engine: true,
        enable_shadow_comparison: false,
    }
}

pub fn shadow() -> RolloutFlags {
    RolloutFlags {
        enable_new_engine: false,
        enable_shadow_comparison: true,
    }
}
