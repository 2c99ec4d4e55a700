//! Persistent rule store.
//!
//! # Responsibilities
//! - Load rules from the primary file, recovering from the backup
//! - Keep the in-memory rule set and derived host index
//! - Persist whole-set replacements atomically with a one-generation backup
//!
//! # Design Decisions
//! - One lock guards the cache; writes are serialized under it
//! - In-memory state changes only after the write succeeded
//! - Load never fails: corruption is reported through diagnostics

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;

use crate::observability::{DiagnosticEvent, DiagnosticsSink};
use crate::rules::model::{RuleAction, RuleRecord};
use crate::rules::schema::{self, normalize_host, LegacyAction, StoreError};
use crate::rules::RuleSource;

/// Primary and backup file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub primary: PathBuf,
    pub backup: PathBuf,
}

impl StorePaths {
    pub fn new(primary: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
        }
    }

    /// `rules.json` and `rules.backup.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("rules.json"), dir.join("rules.backup.json"))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<RuleRecord>,
    by_host: HashMap<String, LegacyAction>,
}

impl StoreState {
    fn new(records: Vec<RuleRecord>) -> Self {
        let by_host = schema::project_legacy(&records)
            .rules
            .into_iter()
            .map(|r| (r.host, r.action))
            .collect();
        Self { records, by_host }
    }
}

/// File-backed rule store.
#[derive(Debug)]
pub struct RuleStore {
    paths: StorePaths,
    diagnostics: Arc<dyn DiagnosticsSink>,
    state: Mutex<StoreState>,
}

impl RuleStore {
    /// Open the store, loading whatever is on disk.
    pub fn open(paths: StorePaths, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        let records = load(&paths, diagnostics.as_ref());
        tracing::debug!(path = %paths.primary.display(), rules = records.len(), "Rule store loaded");
        Self {
            paths,
            diagnostics,
            state: Mutex::new(StoreState::new(records)),
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Legacy host action for a host, if any.
    pub fn action_for_host(&self, host: &str) -> Option<LegacyAction> {
        let host = normalize_host(host)?;
        self.lock().by_host.get(&host).cloned()
    }

    pub fn set_always_open_in(&self, host: &str, target_id: &str) -> Result<(), StoreError> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(StoreError::InvalidRule("target id is empty".into()));
        }
        self.set_host_action(
            host,
            RuleAction::AlwaysOpenIn {
                target_id: target_id.to_string(),
            },
        )
    }

    pub fn set_always_ask(&self, host: &str) -> Result<(), StoreError> {
        self.set_host_action(host, RuleAction::AlwaysAsk)
    }

    fn set_host_action(&self, host: &str, action: RuleAction) -> Result<(), StoreError> {
        let host = normalize_host(host).ok_or(StoreError::InvalidHost)?;
        self.mutate(|records| {
            let created_at = next_created_at(records);
            match records.iter_mut().find(|r| r.rule_id == host) {
                Some(existing) => {
                    existing.action = action;
                    existing.host = Some(host.clone());
                }
                None => records.push(RuleRecord::for_host(&host, action, created_at)),
            }
            Ok(())
        })
    }

    /// Insert or replace a rule by id.
    pub fn upsert_rule(&self, record: RuleRecord) -> Result<(), StoreError> {
        let mut sanitized = schema::sanitize(vec![record]);
        let record = sanitized
            .pop()
            .ok_or_else(|| StoreError::InvalidRule("rule id or target id is empty".into()))?;

        self.mutate(|records| {
            match records.iter_mut().find(|r| r.rule_id == record.rule_id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
            Ok(())
        })
    }

    /// Remove a rule by id. Returns whether it existed.
    pub fn remove_rule(&self, rule_id: &str) -> Result<bool, StoreError> {
        let mut removed = false;
        self.mutate(|records| {
            let before = records.len();
            records.retain(|r| r.rule_id != rule_id);
            removed = records.len() != before;
            Ok(())
        })?;
        Ok(removed)
    }

    /// Replace the whole rule set.
    pub fn replace_rules(&self, rules: Vec<RuleRecord>) -> Result<(), StoreError> {
        let rules = schema::sanitize(rules);
        self.mutate(move |records| {
            *records = rules;
            Ok(())
        })
    }

    /// Deterministic version-1 projection of the current rules.
    pub fn export_legacy(&self) -> Result<Vec<u8>, StoreError> {
        schema::encode_legacy(&self.lock().records)
    }

    fn mutate<F>(&self, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<RuleRecord>) -> Result<(), StoreError>,
    {
        let mut state = self.lock();
        let mut records = state.records.clone();
        edit(&mut records)?;

        if let Err(e) = persist(&self.paths, &records) {
            self.diagnostics.emit(DiagnosticEvent::StoreWriteFailed {
                error: e.to_string(),
            });
            return Err(e);
        }

        *state = StoreState::new(records);
        Ok(())
    }
}

impl RuleSource for RuleStore {
    fn preferred_target(&self, host: &str) -> Option<String> {
        self.action_for_host(host)
            .and_then(|action| action.target_id().map(str::to_string))
    }

    fn rules(&self) -> Vec<RuleRecord> {
        self.lock().records.clone()
    }
}

fn next_created_at(records: &[RuleRecord]) -> i64 {
    records
        .iter()
        .map(|r| r.created_at)
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

fn read(path: &Path) -> Result<Vec<RuleRecord>, StoreError> {
    let bytes = fs::read(path)?;
    schema::decode(&bytes)
}

fn load(paths: &StorePaths, diagnostics: &dyn DiagnosticsSink) -> Vec<RuleRecord> {
    match read(&paths.primary) {
        Ok(records) => return records,
        Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => diagnostics.emit(DiagnosticEvent::StoreCorrupted {
            path: paths.primary.display().to_string(),
            error: e.to_string(),
        }),
    }

    match read(&paths.backup) {
        Ok(records) => {
            diagnostics.emit(DiagnosticEvent::StoreRecovered {
                path: paths.backup.display().to_string(),
            });
            records
        }
        Err(e) => {
            tracing::warn!(error = %e, "Backup unusable, starting with no rules");
            Vec::new()
        }
    }
}

fn persist(paths: &StorePaths, records: &[RuleRecord]) -> Result<(), StoreError> {
    let bytes = schema::encode(records)?;

    let dir = match paths.primary.parent().filter(|d| !d.as_os_str().is_empty()) {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            dir
        }
        None => Path::new("."),
    };

    // The temp file is removed on drop if any step below fails.
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&bytes)?;
    temp.as_file().sync_all()?;

    if paths.primary.exists() {
        fs::copy(&paths.primary, &paths.backup)?;
    }
    temp.persist(&paths.primary).map_err(|e| e.error)?;
    Ok(())
}
