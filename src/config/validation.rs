//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (workspaces reference known profiles)
//! - Validate value ranges (guard TTL and capacity > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Conflicting rollout flags are accepted here and fail closed per decision

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::schema::RouterConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyHandlerId { index: usize },
    DuplicateHandlerId(String),
    ZeroLoopGuardTtl,
    ZeroGuardCapacity,
    EmptyLauncherProgram,
    LauncherMissingUrl,
    UnknownWorkspaceProfile { workspace: String, profile: String },
    WorkspaceProfileHandlerMismatch { workspace: String, profile: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyHandlerId { index } => write!(f, "handler #{} has an empty id", index),
            ValidationError::DuplicateHandlerId(id) => write!(f, "handler id '{}' is defined twice", id),
            ValidationError::ZeroLoopGuardTtl => write!(f, "dispatch.loop_guard_ttl_ms must be > 0"),
            ValidationError::ZeroGuardCapacity => write!(f, "dispatch.max_guard_entries must be > 0"),
            ValidationError::EmptyLauncherProgram => write!(f, "launcher.program is empty"),
            ValidationError::LauncherMissingUrl => write!(f, "launcher.args has no {{url}} placeholder"),
            ValidationError::UnknownWorkspaceProfile { workspace, profile } => {
                write!(f, "workspace '{}' references unknown profile '{}'", workspace, profile)
            }
            ValidationError::WorkspaceProfileHandlerMismatch { workspace, profile } => {
                write!(f, "workspace '{}' is bound to profile '{}' of another handler", workspace, profile)
            }
        }
    }
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for (index, handler) in config.handlers.iter().enumerate() {
        let id = handler.id.trim().to_lowercase();
        if id.is_empty() {
            errors.push(ValidationError::EmptyHandlerId { index });
        } else if !seen.insert(id) {
            errors.push(ValidationError::DuplicateHandlerId(handler.id.trim().to_string()));
        }
    }

    if config.dispatch.loop_guard_ttl_ms == 0 {
        errors.push(ValidationError::ZeroLoopGuardTtl);
    }
    if config.dispatch.max_guard_entries == 0 {
        errors.push(ValidationError::ZeroGuardCapacity);
    }

    if config.launcher.program.trim().is_empty() {
        errors.push(ValidationError::EmptyLauncherProgram);
    }
    if !config.launcher.args.iter().any(|arg| arg.contains("{url}")) {
        errors.push(ValidationError::LauncherMissingUrl);
    }

    let profile_owner: HashMap<&str, String> = config
        .profiles
        .iter()
        .map(|p| (p.id.trim(), p.target_id.trim().to_lowercase()))
        .collect();
    for workspace in &config.workspaces {
        let Some(profile) = workspace.profile_id.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            continue;
        };
        match profile_owner.get(profile) {
            None => errors.push(ValidationError::UnknownWorkspaceProfile {
                workspace: workspace.id.clone(),
                profile: profile.to_string(),
            }),
            Some(owner) if *owner != workspace.target_id.trim().to_lowercase() => {
                errors.push(ValidationError::WorkspaceProfileHandlerMismatch {
                    workspace: workspace.id.clone(),
                    profile: profile.to_string(),
                })
            }
            Some(_) => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::HandlerConfig;
    use crate::profiles::{Profile, Workspace};

    fn handler(id: &str) -> HandlerConfig {
        HandlerConfig {
            id: id.to_string(),
            display_name: id.to_string(),
            location: id.to_string(),
            schemes: vec![],
            extensions: vec![],
            mime_types: vec![],
            supports_profiles: false,
            supports_workspaces: false,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&RouterConfig::default()), Ok(()));
    }

    #[test]
    fn test_conflicting_rollout_flags_are_accepted() {
        let mut config = RouterConfig::default();
        config.rollout.enable_new_engine = true;
        config.rollout.enable_shadow_comparison = true;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = RouterConfig::default();
        config.handlers = vec![handler("a"), handler(" A "), handler(" ")];
        config.dispatch.loop_guard_ttl_ms = 0;
        config.dispatch.max_guard_entries = 0;
        config.launcher.program = String::new();
        config.launcher.args = vec!["-a".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::DuplicateHandlerId("A".into()),
                ValidationError::EmptyHandlerId { index: 2 },
                ValidationError::ZeroLoopGuardTtl,
                ValidationError::ZeroGuardCapacity,
                ValidationError::EmptyLauncherProgram,
                ValidationError::LauncherMissingUrl,
            ]
        );
    }

    #[test]
    fn test_workspace_profile_references() {
        let mut config = RouterConfig::default();
        config.profiles = vec![Profile {
            id: "p-firefox".into(),
            target_id: "org.mozilla.firefox".into(),
            display_name: "Default".into(),
        }];
        config.workspaces = vec![
            Workspace {
                id: "w1".into(),
                target_id: "com.google.chrome".into(),
                display_name: "One".into(),
                profile_id: Some("p-missing".into()),
            },
            Workspace {
                id: "w2".into(),
                target_id: "com.google.chrome".into(),
                display_name: "Two".into(),
                profile_id: Some("p-firefox".into()),
            },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::UnknownWorkspaceProfile { .. }));
        assert!(matches!(errors[1], ValidationError::WorkspaceProfileHandlerMismatch { .. }));
    }
}
