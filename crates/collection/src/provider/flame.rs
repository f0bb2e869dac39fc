//! Flame-shaped provider adapter
//!
//! Endpoints take scalar query parameters, wrap every response in a `data`
//! envelope, and use POST bodies for multi-id lookups. File entries mix
//! loaders and game versions in one `gameVersions` string array.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::error::{EngineError, Result};
use crate::item::{DependencyKind, GameVersion, Loader};
use crate::provider::types::{ReleaseType, RemoteDependency, RemoteProject, RemoteVersion};
use crate::provider::{
    DependencySearchArgs, Provider, ProviderClient, ProviderRequest, SearchArgs, SortingMethod,
    VersionSearchArgs,
};

const DEFAULT_BASE_URL: &str = "https://api.curseforge.com/v1";

/// Game id the adapter is scoped to
const GAME_ID: u32 = 432;

static SORTING_METHODS: &[SortingMethod] = &[
    SortingMethod { index: 1, name: "Featured", readable_name: "Featured" },
    SortingMethod { index: 2, name: "Popularity", readable_name: "Popularity" },
    SortingMethod { index: 3, name: "LastUpdated", readable_name: "Last updated" },
    SortingMethod { index: 4, name: "Name", readable_name: "Name" },
    SortingMethod { index: 6, name: "TotalDownloads", readable_name: "Total downloads" },
];

pub struct FlameClient {
    base_url: String,
}

impl FlameClient {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at a different endpoint (test servers)
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn dependency_kind(relation_type: u64) -> Option<DependencyKind> {
        match relation_type {
            1 => Some(DependencyKind::Embedded),
            2 => Some(DependencyKind::Optional),
            3 => Some(DependencyKind::Required),
            5 => Some(DependencyKind::Incompatible),
            _ => None,
        }
    }
}

impl Default for FlameClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderClient for FlameClient {
    fn provider(&self) -> Provider {
        Provider::Flame
    }

    fn sorting_methods(&self) -> &'static [SortingMethod] {
        SORTING_METHODS
    }

    fn search_request(&self, args: &SearchArgs) -> Option<ProviderRequest> {
        let mut url = format!(
            "{}/mods/search?gameId={GAME_ID}&index={}&pageSize={}",
            self.base_url,
            args.offset,
            args.limit.max(1),
        );
        if let Some(query) = &args.query {
            url.push_str(&format!("&searchFilter={query}"));
        }
        if let Some(sorting) = &args.sorting {
            url.push_str(&format!("&sortField={}", sorting.index));
        }
        if let Some(loader) = args.loaders.first() {
            url.push_str(&format!("&modLoaderType={}", loader.flame_class()));
        }
        if let Some(version) = args.game_versions.first() {
            url.push_str(&format!("&gameVersion={version}"));
        }
        Some(ProviderRequest::get(url))
    }

    fn project_request(&self, project_id: &str) -> Option<ProviderRequest> {
        Some(ProviderRequest::get(format!(
            "{}/mods/{project_id}",
            self.base_url
        )))
    }

    fn projects_request(&self, project_ids: &[String]) -> Option<ProviderRequest> {
        if project_ids.is_empty() {
            return None;
        }
        // Numeric mod ids; a non-numeric id cannot be expressed here
        let ids: Option<Vec<u64>> = project_ids.iter().map(|id| id.parse().ok()).collect();
        Some(ProviderRequest::post(
            format!("{}/mods", self.base_url),
            json!({ "modIds": ids? }),
        ))
    }

    fn versions_request(&self, args: &VersionSearchArgs) -> Option<ProviderRequest> {
        let mut url = format!("{}/mods/{}/files", self.base_url, args.project_id);
        let mut sep = '?';
        if let Some(version) = args.game_versions.first() {
            url.push_str(&format!("{sep}gameVersion={version}"));
            sep = '&';
        }
        if let Some(loader) = args.loaders.first() {
            url.push_str(&format!("{sep}modLoaderType={}", loader.flame_class()));
        }
        Some(ProviderRequest::get(url))
    }

    fn dependency_request(&self, args: &DependencySearchArgs) -> Option<ProviderRequest> {
        self.versions_request(&VersionSearchArgs {
            project_id: args.project_id.clone(),
            loaders: args.loaders.clone(),
            game_versions: args.game_versions.clone(),
        })
    }

    fn fingerprint_request(&self, _fingerprint: &str) -> Option<ProviderRequest> {
        // Fingerprint matching on this provider needs a provider-private
        // hash of the file body, which the engine does not compute
        None
    }

    fn entries(&self, doc: &Value) -> Vec<Value> {
        match doc {
            Value::Array(arr) => arr.clone(),
            Value::Object(obj) => obj
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn normalize_project(&self, obj: &Value) -> Result<RemoteProject> {
        let id = obj
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::Parse {
                context: "reading flame project".to_string(),
                reason: "missing numeric id".to_string(),
            })?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Parse {
                context: format!("reading flame project '{id}'"),
                reason: "missing name".to_string(),
            })?;
        Ok(RemoteProject {
            provider: Provider::Flame,
            id: id.to_string(),
            name: name.to_string(),
            slug: obj.get("slug").and_then(Value::as_str).map(String::from),
            description: obj
                .get("summary")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    fn normalize_version(
        &self,
        obj: &Value,
        project_id_hint: Option<&str>,
    ) -> Option<RemoteVersion> {
        let file_id = obj.get("id")?.as_u64()?.to_string();
        let project_id = obj
            .get("modId")
            .and_then(Value::as_u64)
            .map(|id| id.to_string())
            .or_else(|| project_id_hint.map(String::from))?;
        let date: DateTime<Utc> = obj
            .get("fileDate")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))?;
        let name = obj.get("displayName")?.as_str()?.to_string();

        // One mixed array of loader tags and game versions
        let mut loaders = Vec::new();
        let mut game_versions = Vec::new();
        if let Some(tags) = obj.get("gameVersions").and_then(Value::as_array) {
            for tag in tags.iter().filter_map(Value::as_str) {
                match Loader::parse(tag) {
                    Some(loader) => loaders.push(loader),
                    None => game_versions.push(GameVersion::from(tag)),
                }
            }
        }

        let dependencies = obj
            .get("dependencies")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(|d| {
                        let project_id = d.get("modId")?.as_u64()?.to_string();
                        let kind = Self::dependency_kind(
                            d.get("relationType").and_then(Value::as_u64)?,
                        )?;
                        Some(RemoteDependency { project_id, kind })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(RemoteVersion {
            provider: Provider::Flame,
            project_id,
            file_id,
            name,
            version_number: None,
            date,
            // Distribution-blocked files carry a null url; kept, but not fetchable
            download_url: obj
                .get("downloadUrl")
                .and_then(Value::as_str)
                .map(String::from),
            changelog: None,
            release_type: obj
                .get("releaseType")
                .and_then(Value::as_u64)
                .and_then(ReleaseType::from_flame)
                .unwrap_or(ReleaseType::Release),
            loaders,
            game_versions,
            dependencies,
        })
    }
}
