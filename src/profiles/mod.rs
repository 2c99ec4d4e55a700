//! Profile and workspace resolution.
//!
//! # Responsibilities
//! - Hold the known profiles and workspaces per handler
//! - Check a rule's target reference against a handler's capabilities
//! - Degrade to a plain handler reference with a reason when it cannot be honoured
//!
//! # Design Decisions
//! - Resolution never fails; it falls back to the target id alone
//! - A workspace bound to a profile supplies that profile when none was requested

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::dispatch::target::HandlerCapabilities;
use crate::rules::model::TargetReference;

/// A named browser profile belonging to one handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub target_id: String,
    pub display_name: String,
}

/// A workspace, optionally bound to a profile of the same handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub target_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
}

/// Stable id derived from the owning handler and display name.
pub fn profile_id(target_id: &str, display_name: &str) -> String {
    format!("profile:{}:{}", normalize_id(target_id), slug(display_name))
}

pub fn workspace_id(target_id: &str, display_name: &str) -> String {
    format!("workspace:{}:{}", normalize_id(target_id), slug(display_name))
}

fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

fn slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileFallbackReason {
    UnsupportedProfileLaunch,
    UnsupportedWorkspace,
    MissingProfile,
    MissingWorkspace,
    WorkspaceProfileMismatch,
    BundleMismatch,
}

impl ProfileFallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileFallbackReason::UnsupportedProfileLaunch => "unsupported_profile_launch",
            ProfileFallbackReason::UnsupportedWorkspace => "unsupported_workspace",
            ProfileFallbackReason::MissingProfile => "missing_profile",
            ProfileFallbackReason::MissingWorkspace => "missing_workspace",
            ProfileFallbackReason::WorkspaceProfileMismatch => "workspace_profile_mismatch",
            ProfileFallbackReason::BundleMismatch => "bundle_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResolution {
    Resolved(TargetReference),
    Fallback {
        reference: TargetReference,
        reason: ProfileFallbackReason,
    },
}

impl TargetResolution {
    pub fn reference(&self) -> &TargetReference {
        match self {
            TargetResolution::Resolved(reference) => reference,
            TargetResolution::Fallback { reference, .. } => reference,
        }
    }

    pub fn fallback_reason(&self) -> Option<ProfileFallbackReason> {
        match self {
            TargetResolution::Resolved(_) => None,
            TargetResolution::Fallback { reason, .. } => Some(*reason),
        }
    }
}

pub trait TargetReferenceResolver: Send + Sync + std::fmt::Debug {
    fn resolve(&self, reference: &TargetReference, capabilities: &HandlerCapabilities) -> TargetResolution;
}

/// In-memory profile and workspace registry.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: HashMap<String, Profile>,
    workspaces: HashMap<String, Workspace>,
}

impl ProfileCatalog {
    pub fn new(profiles: Vec<Profile>, workspaces: Vec<Workspace>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.id.trim().to_string(), Profile { target_id: normalize_id(&p.target_id), ..p }))
                .collect(),
            workspaces: workspaces
                .into_iter()
                .map(|w| (w.id.trim().to_string(), Workspace { target_id: normalize_id(&w.target_id), ..w }))
                .collect(),
        }
    }

    /// Profiles owned by a handler, ordered by id.
    pub fn profiles_for(&self, target_id: &str) -> Vec<&Profile> {
        let target_id = normalize_id(target_id);
        let mut profiles: Vec<_> = self.profiles.values().filter(|p| p.target_id == target_id).collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    pub fn workspaces_for(&self, target_id: &str) -> Vec<&Workspace> {
        let target_id = normalize_id(target_id);
        let mut workspaces: Vec<_> = self.workspaces.values().filter(|w| w.target_id == target_id).collect();
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));
        workspaces
    }
}

impl TargetReferenceResolver for ProfileCatalog {
    fn resolve(&self, reference: &TargetReference, capabilities: &HandlerCapabilities) -> TargetResolution {
        let target_id = normalize_id(&reference.target_id);
        let profile_id = trimmed(&reference.profile_id);
        let workspace_id = trimmed(&reference.workspace_id);

        let fallback = |reason| TargetResolution::Fallback {
            reference: TargetReference::new(target_id.clone()),
            reason,
        };

        if profile_id.is_some() && !capabilities.supports_profiles {
            return fallback(ProfileFallbackReason::UnsupportedProfileLaunch);
        }
        if workspace_id.is_some() && !capabilities.supports_workspaces {
            return fallback(ProfileFallbackReason::UnsupportedWorkspace);
        }

        if let Some(id) = &profile_id {
            match self.profiles.get(id) {
                None => return fallback(ProfileFallbackReason::MissingProfile),
                Some(profile) if profile.target_id != target_id => {
                    return fallback(ProfileFallbackReason::BundleMismatch)
                }
                Some(_) => {}
            }
        }

        let mut resolved_profile = profile_id;
        if let Some(id) = &workspace_id {
            let Some(workspace) = self.workspaces.get(id) else {
                return fallback(ProfileFallbackReason::MissingWorkspace);
            };
            if workspace.target_id != target_id {
                return fallback(ProfileFallbackReason::BundleMismatch);
            }
            if let Some(bound) = trimmed(&workspace.profile_id) {
                match &resolved_profile {
                    Some(requested) if *requested != bound => {
                        return fallback(ProfileFallbackReason::WorkspaceProfileMismatch)
                    }
                    _ => resolved_profile = Some(bound),
                }
            }
        }

        TargetResolution::Resolved(TargetReference {
            target_id,
            profile_id: resolved_profile,
            workspace_id,
        })
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME: &str = "com.google.chrome";

    fn catalog() -> ProfileCatalog {
        let work = profile_id(CHROME, "Work");
        let personal = profile_id(CHROME, "Personal");
        ProfileCatalog::new(
            vec![
                Profile { id: work.clone(), target_id: CHROME.into(), display_name: "Work".into() },
                Profile { id: personal, target_id: CHROME.into(), display_name: "Personal".into() },
                Profile {
                    id: "profile:org.mozilla.firefox:default".into(),
                    target_id: "org.mozilla.firefox".into(),
                    display_name: "Default".into(),
                },
            ],
            vec![Workspace {
                id: workspace_id(CHROME, "Sprint Board"),
                target_id: CHROME.into(),
                display_name: "Sprint Board".into(),
                profile_id: Some(work),
            }],
        )
    }

    fn full_support() -> HandlerCapabilities {
        HandlerCapabilities { supports_profiles: true, supports_workspaces: true, ..Default::default() }
    }

    fn reference(profile: Option<&str>, workspace: Option<&str>) -> TargetReference {
        TargetReference {
            target_id: " Com.Google.Chrome ".into(),
            profile_id: profile.map(str::to_string),
            workspace_id: workspace.map(str::to_string),
        }
    }

    #[test]
    fn test_stable_ids() {
        assert_eq!(profile_id(" Com.Google.Chrome", " My Work "), "profile:com.google.chrome:my-work");
        assert_eq!(workspace_id(CHROME, "Sprint Board"), "workspace:com.google.chrome:sprint-board");
    }

    #[test]
    fn test_resolves_known_profile() {
        let resolution = catalog().resolve(&reference(Some("profile:com.google.chrome:work"), None), &full_support());
        assert_eq!(resolution.fallback_reason(), None);
        assert_eq!(resolution.reference().target_id, CHROME);
    }

    #[test]
    fn test_workspace_fills_profile() {
        let resolution = catalog().resolve(
            &reference(None, Some("workspace:com.google.chrome:sprint-board")),
            &full_support(),
        );
        assert_eq!(
            resolution,
            TargetResolution::Resolved(TargetReference {
                target_id: CHROME.into(),
                profile_id: Some("profile:com.google.chrome:work".into()),
                workspace_id: Some("workspace:com.google.chrome:sprint-board".into()),
            })
        );
    }

    #[test]
    fn test_fallback_reasons() {
        let catalog = catalog();
        let cases = [
            (reference(Some("profile:com.google.chrome:work"), None), HandlerCapabilities::default(), ProfileFallbackReason::UnsupportedProfileLaunch),
            (
                reference(None, Some("workspace:com.google.chrome:sprint-board")),
                HandlerCapabilities { supports_profiles: true, ..Default::default() },
                ProfileFallbackReason::UnsupportedWorkspace,
            ),
            (reference(Some("profile:com.google.chrome:gone"), None), full_support(), ProfileFallbackReason::MissingProfile),
            (reference(None, Some("workspace:gone")), full_support(), ProfileFallbackReason::MissingWorkspace),
            (reference(Some("profile:org.mozilla.firefox:default"), None), full_support(), ProfileFallbackReason::BundleMismatch),
            (
                reference(Some("profile:com.google.chrome:personal"), Some("workspace:com.google.chrome:sprint-board")),
                full_support(),
                ProfileFallbackReason::WorkspaceProfileMismatch,
            ),
        ];

        for (reference, capabilities, reason) in cases {
            let resolution = catalog.resolve(&reference, &capabilities);
            assert_eq!(
                resolution,
                TargetResolution::Fallback { reference: TargetReference::new(CHROME), reason },
                "{reference:?}"
            );
        }
    }

    #[test]
    fn test_blank_ids_are_absent() {
        let resolution = catalog().resolve(&reference(Some("  "), Some("")), &HandlerCapabilities::default());
        assert_eq!(resolution, TargetResolution::Resolved(TargetReference::new(CHROME)));
    }

    #[test]
    fn test_listing_by_handler() {
        let catalog = catalog();
        assert_eq!(catalog.profiles_for("COM.GOOGLE.CHROME").len(), 2);
        assert_eq!(catalog.workspaces_for(CHROME).len(), 1);
        assert!(catalog.workspaces_for("org.mozilla.firefox").is_empty());
    }
}
