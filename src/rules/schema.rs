//! Versioned on-disk schema for the rule store.
//!
//! # Responsibilities
//! - Probe the `version` field, then decode the matching schema
//! - Project version-1 host rules into full records
//! - Project full records down to the version-1 host view
//!
//! # Design Decisions
//! - Writes always use the latest version
//! - The down-projection is a pure function; equal input gives equal bytes

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::rules::model::{rank, RuleAction, RuleRecord};

/// Version written by this crate.
pub const CURRENT_VERSION: i64 = 2;

/// Errors from decoding, encoding and persisting rule stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store has no version field")]
    MissingVersion,

    #[error("unsupported store version {0}")]
    UnsupportedVersion(i64),

    #[error("host is empty")]
    InvalidHost,

    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

/// Action expressible in the version-1 schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegacyAction {
    AlwaysOpenIn {
        #[serde(rename = "bundleIdentifier")]
        target_id: String,
    },
    AlwaysAsk,
}

impl LegacyAction {
    fn from_action(action: &RuleAction) -> Option<Self> {
        match action {
            RuleAction::AlwaysOpenIn { target_id } => Some(LegacyAction::AlwaysOpenIn {
                target_id: target_id.clone(),
            }),
            RuleAction::AlwaysAsk => Some(LegacyAction::AlwaysAsk),
            RuleAction::RunCommand { .. } => None,
        }
    }

    pub fn into_action(self) -> RuleAction {
        match self {
            LegacyAction::AlwaysOpenIn { target_id } => RuleAction::AlwaysOpenIn { target_id },
            LegacyAction::AlwaysAsk => RuleAction::AlwaysAsk,
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        match self {
            LegacyAction::AlwaysOpenIn { target_id } => Some(target_id),
            LegacyAction::AlwaysAsk => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    pub host: String,
    pub action: LegacyAction,
}

/// Version-1 document: one action per host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySchema {
    pub version: i64,
    pub rules: Vec<LegacyRecord>,
}

impl LegacySchema {
    pub fn new(rules: Vec<LegacyRecord>) -> Self {
        Self { version: 1, rules }
    }
}

/// Version-2 document: full rule records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSchemaV2 {
    pub version: i64,
    pub rules: Vec<RuleRecord>,
}

impl RuleSchemaV2 {
    pub fn new(rules: Vec<RuleRecord>) -> Self {
        Self {
            version: CURRENT_VERSION,
            rules,
        }
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: i64,
}

/// Trimmed, lower-cased host; `None` when blank.
pub fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim().to_lowercase();
    (!host.is_empty()).then_some(host)
}

/// Decode any supported store document into sanitized records.
pub fn decode(bytes: &[u8]) -> Result<Vec<RuleRecord>, StoreError> {
    let probe: VersionProbe = serde_json::from_slice(bytes).map_err(|_| StoreError::MissingVersion)?;

    let records = match probe.version {
        1 => {
            let legacy: LegacySchema = serde_json::from_slice(bytes)?;
            from_legacy(legacy)
        }
        2 => serde_json::from_slice::<RuleSchemaV2>(bytes)?.rules,
        other => return Err(StoreError::UnsupportedVersion(other)),
    };

    Ok(sanitize(records))
}

/// Version-1 records as full records: id = host, fixed priority, index order.
pub fn from_legacy(schema: LegacySchema) -> Vec<RuleRecord> {
    schema
        .rules
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let host = normalize_host(&record.host)?;
            Some(RuleRecord::for_host(&host, record.action.into_action(), index as i64))
        })
        .collect()
}

/// Drop unusable records: empty id, empty target id, repeated id (first wins).
pub fn sanitize(records: Vec<RuleRecord>) -> Vec<RuleRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|mut record| {
            record.rule_id = record.rule_id.trim().to_string();
            if record.rule_id.is_empty() {
                return None;
            }
            if record.action.target_id().is_some_and(|t| t.trim().is_empty()) {
                return None;
            }
            if !seen.insert(record.rule_id.clone()) {
                return None;
            }
            record.predicate = record.predicate.sanitized();
            Some(record)
        })
        .collect()
}

/// Full records down to one action per host.
///
/// Records are visited in rank order; `run_command` has no version-1 form
/// and is skipped; the first accepted record for a host wins.
pub fn project_legacy(records: &[RuleRecord]) -> LegacySchema {
    let mut ordered: Vec<(&RuleRecord, usize)> = records.iter().map(|r| (r, r.specificity())).collect();
    ordered.sort_by(|(a, a_spec), (b, b_spec)| rank(a, *a_spec, b, *b_spec));

    let mut seen = HashSet::new();
    let mut rules = Vec::new();
    for (record, _) in ordered {
        let Some(action) = LegacyAction::from_action(&record.action) else {
            continue;
        };
        let host = record.host.as_deref().or(record.predicate.domain.as_deref());
        let Some(host) = host.and_then(normalize_host) else {
            continue;
        };
        if seen.insert(host.clone()) {
            rules.push(LegacyRecord { host, action });
        }
    }

    LegacySchema::new(rules)
}

pub fn encode(records: &[RuleRecord]) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(&RuleSchemaV2::new(records.to_vec()))?)
}

pub fn encode_legacy(records: &[RuleRecord]) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(&project_legacy(records))?)
}
