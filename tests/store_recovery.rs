//! Rule store migration and recovery against real files.

use std::fs;
use std::sync::Arc;

use linkroute::observability::{DiagnosticEvent, DiagnosticsRecorder};
use linkroute::routing::{EvaluationContext, RolloutFlags, SourceContext};
use linkroute::rules::{LegacyAction, RuleSource, RuleStore, StorePaths};
use linkroute::service::OpenOutcome;

mod common;

use common::{CHROME, FIREFOX};

const V1_STORE: &str = r#"{"version":1,"rules":[
    {"host":"news.example","action":{"type":"always_open_in","bundleIdentifier":"org.mozilla.firefox"}},
    {"host":"bank.example","action":{"type":"always_ask"}}
]}"#;

fn recorder() -> Arc<DiagnosticsRecorder> {
    Arc::new(DiagnosticsRecorder::default())
}

#[test]
fn test_v1_store_is_migrated_on_first_write() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::in_dir(dir.path());
    fs::write(&paths.primary, V1_STORE).unwrap();

    let store = RuleStore::open(paths.clone(), recorder());
    assert_eq!(store.rules().len(), 2);
    assert_eq!(store.preferred_target("news.example").as_deref(), Some(FIREFOX));
    assert_eq!(store.action_for_host("bank.example"), Some(LegacyAction::AlwaysAsk));

    store.set_always_open_in("shop.example", CHROME).unwrap();

    let written: serde_json::Value = serde_json::from_slice(&fs::read(&paths.primary).unwrap()).unwrap();
    assert_eq!(written["version"], 2);
    let backup: serde_json::Value = serde_json::from_slice(&fs::read(&paths.backup).unwrap()).unwrap();
    assert_eq!(backup["version"], 1);

    let reopened = RuleStore::open(paths, recorder());
    assert_eq!(reopened.rules().len(), 3);
    assert_eq!(reopened.preferred_target("shop.example").as_deref(), Some(CHROME));
}

#[test]
fn test_legacy_export_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::in_dir(dir.path());
    fs::write(&paths.primary, V1_STORE).unwrap();

    let store = RuleStore::open(paths, recorder());
    let first = store.export_legacy().unwrap();
    let second = store.export_legacy().unwrap();
    assert_eq!(first, second);

    let exported: serde_json::Value = serde_json::from_slice(&first).unwrap();
    let hosts: Vec<&str> = exported["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["host"].as_str().unwrap())
        .collect();
    assert_eq!(hosts.len(), 2);
    assert!(hosts.contains(&"news.example"));
    assert!(hosts.contains(&"bank.example"));
}

#[test]
fn test_corrupt_primary_recovers_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::in_dir(dir.path());
    fs::write(&paths.primary, b"{ truncated").unwrap();
    fs::write(&paths.backup, V1_STORE).unwrap();

    let diagnostics = recorder();
    let store = RuleStore::open(paths, diagnostics.clone());

    assert_eq!(store.rules().len(), 2);
    let kinds: Vec<&str> = diagnostics.snapshot().iter().map(DiagnosticEvent::kind).collect();
    assert_eq!(kinds, vec!["store_corrupted", "store_recovered"]);
}

#[test]
fn test_corrupt_primary_and_backup_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::in_dir(dir.path());
    fs::write(&paths.primary, br#"{"version":7,"rules":[]}"#).unwrap();
    fs::write(&paths.backup, b"garbage").unwrap();

    let diagnostics = recorder();
    let store = RuleStore::open(paths, diagnostics.clone());

    assert!(store.rules().is_empty());
    assert_eq!(diagnostics.count("store_corrupted"), 1);
    assert_eq!(diagnostics.count("store_recovered"), 0);
}

#[tokio::test]
async fn test_router_reads_recovered_rules() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::in_dir(dir.path());
    fs::write(&paths.primary, b"").unwrap();
    fs::write(&paths.backup, V1_STORE).unwrap();

    let h = common::harness(dir.path(), RolloutFlags::default(), &[]);
    let outcome = h
        .router
        .open("https://NEWS.example:8443/today", SourceContext::warm_open(), &EvaluationContext::default())
        .await;

    assert!(matches!(outcome, OpenOutcome::Opened { ref target_id, .. } if target_id == FIREFOX));
    assert_eq!(h.recorder.count("store_recovered"), 1);
}
