//! Update candidates, pending dependencies, and plan assembly

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::item::ItemId;
use crate::provider::{Provider, RemoteVersion};

/// An installed item paired with the newer compatible version chosen for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCandidate {
    pub item: ItemId,
    pub name: String,
    pub provider: Provider,
    /// Installed identity being replaced
    pub old_file_id: String,
    pub old_version: String,
    /// The chosen newer version, carrying its download locator
    pub version: RemoteVersion,
    pub changelog: Option<String>,
    /// Whether the user has confirmed this candidate for download
    pub confirmed: bool,
}

/// A required project referenced by a chosen version with no installed
/// counterpart; resolved to its own best matching version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDependency {
    pub provider: Provider,
    pub project_id: String,
    /// Display name, filled from a project lookup when available
    pub name: Option<String>,
    /// Best matching version for the active constraints
    pub version: RemoteVersion,
    /// Items whose chosen update pulled this dependency in
    pub required_by: Vec<ItemId>,
}

/// Per-item terminal outcome of an update check.
///
/// `Unresolvable` (no remote identity) is deliberately distinct from
/// `UpToDate` (checked, nothing newer) and from `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckOutcome {
    UpdateAvailable { new_file_id: String },
    UpToDate,
    Unresolvable { reason: String },
    Failed { reason: String, status: Option<u16> },
}

/// Everything one per-item job produced, merged by the reconcile loop
#[derive(Debug)]
pub struct ItemCheckResult {
    pub item: ItemId,
    pub outcome: CheckOutcome,
    pub update: Option<UpdateCandidate>,
    pub pending: Vec<PendingDependency>,
}

/// One row of the flat confirmation list shown before downloading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanEntry {
    /// Update of an installed item
    Direct(UpdateCandidate),
    /// New install pulled in as a dependency of an update
    Dependency(PendingDependency),
}

impl PlanEntry {
    /// Identity used for deduplication: the target (provider, project)
    pub fn target_identity(&self) -> (Provider, &str) {
        match self {
            PlanEntry::Direct(c) => (c.provider, c.version.project_id.as_str()),
            PlanEntry::Dependency(d) => (d.provider, d.project_id.as_str()),
        }
    }
}

/// Merge direct candidates and dependency-induced installs into one flat
/// confirmation list: direct entries first, dependencies second,
/// deduplicated by target identity.
pub fn merge_plan(
    updates: Vec<UpdateCandidate>,
    dependencies: Vec<PendingDependency>,
) -> Vec<PlanEntry> {
    let mut seen: HashSet<(Provider, String)> = HashSet::new();
    let mut plan = Vec::with_capacity(updates.len() + dependencies.len());

    for candidate in updates {
        let key = (candidate.provider, candidate.version.project_id.clone());
        if seen.insert(key) {
            plan.push(PlanEntry::Direct(candidate));
        }
    }
    for dependency in dependencies {
        let key = (dependency.provider, dependency.project_id.clone());
        if seen.insert(key) {
            plan.push(PlanEntry::Dependency(dependency));
        }
    }

    plan
}
