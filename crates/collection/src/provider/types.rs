//! Normalized shapes shared by all providers
//!
//! Provider responses are parsed into their native JSON first, then mapped
//! into these types, so the resolver never sees provider-specific structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{DependencyKind, GameVersion, Loader};
use crate::provider::Provider;

/// A remote project (the catalog entry an installed item belongs to)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProject {
    pub provider: Provider,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Release channel of a remote version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Release,
    Beta,
    Alpha,
}

impl ReleaseType {
    pub fn parse(s: &str) -> Option<ReleaseType> {
        match s {
            "release" => Some(ReleaseType::Release),
            "beta" => Some(ReleaseType::Beta),
            "alpha" => Some(ReleaseType::Alpha),
            _ => None,
        }
    }

    /// Numeric release type used by the Flame API
    pub fn from_flame(n: u64) -> Option<ReleaseType> {
        match n {
            1 => Some(ReleaseType::Release),
            2 => Some(ReleaseType::Beta),
            3 => Some(ReleaseType::Alpha),
            _ => None,
        }
    }
}

/// Required dependency reference declared by a remote version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDependency {
    pub project_id: String,
    pub kind: DependencyKind,
}

/// A single fetchable release of a remote project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub provider: Provider,
    pub project_id: String,
    /// File identifier; the identity compared against the installed item
    pub file_id: String,
    /// Human-readable version label
    pub name: String,
    #[serde(default)]
    pub version_number: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    pub release_type: ReleaseType,
    /// Declared loader compatibility; empty means unrestricted
    #[serde(default)]
    pub loaders: Vec<Loader>,
    /// Declared game version compatibility; empty means unrestricted
    #[serde(default)]
    pub game_versions: Vec<GameVersion>,
    #[serde(default)]
    pub dependencies: Vec<RemoteDependency>,
}

impl RemoteVersion {
    /// Whether this version's declared compatibility intersects the
    /// requested constraints. An empty declared list is treated as
    /// unrestricted, matching provider behavior for untagged files.
    pub fn is_compatible(&self, game_versions: &[GameVersion], loaders: &[Loader]) -> bool {
        let loader_ok = self.loaders.is_empty()
            || loaders.is_empty()
            || self.loaders.iter().any(|l| loaders.contains(l));
        let version_ok = self.game_versions.is_empty()
            || game_versions.is_empty()
            || self.game_versions.iter().any(|v| game_versions.contains(v));
        loader_ok && version_ok
    }

    /// Required dependency project ids declared by this version
    pub fn required_dependencies(&self) -> impl Iterator<Item = &RemoteDependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Required)
    }
}

/// Sort a version list into canonical order: newest publish date first.
/// Ties keep the order the provider returned.
pub fn sort_newest_first(versions: &mut [RemoteVersion]) {
    versions.sort_by(|a, b| b.date.cmp(&a.date));
}

/// The newest compatible version, which is not necessarily the newest
/// version of the project overall.
pub fn best_match<'a>(
    versions: &'a [RemoteVersion],
    game_versions: &[GameVersion],
    loaders: &[Loader],
) -> Option<&'a RemoteVersion> {
    versions
        .iter()
        .filter(|v| v.is_compatible(game_versions, loaders))
        .max_by_key(|v| v.date)
}
