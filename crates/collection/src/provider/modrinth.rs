//! Modrinth-shaped provider adapter
//!
//! Endpoints take filter parameters as JSON-array query strings and answer
//! with bare arrays (versions) or a `hits` envelope (search).

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::error::{EngineError, Result};
use crate::item::{DependencyKind, GameVersion, Loader};
use crate::provider::types::{ReleaseType, RemoteDependency, RemoteProject, RemoteVersion};
use crate::provider::{
    DependencySearchArgs, Provider, ProviderClient, ProviderRequest, SearchArgs, SortingMethod,
    VersionSearchArgs,
};

const DEFAULT_BASE_URL: &str = "https://api.modrinth.com/v2";

static SORTING_METHODS: &[SortingMethod] = &[
    SortingMethod { index: 0, name: "relevance", readable_name: "Relevance" },
    SortingMethod { index: 1, name: "downloads", readable_name: "Downloads" },
    SortingMethod { index: 2, name: "follows", readable_name: "Follows" },
    SortingMethod { index: 3, name: "newest", readable_name: "Newest" },
    SortingMethod { index: 4, name: "updated", readable_name: "Recently updated" },
];

pub struct ModrinthClient {
    base_url: String,
}

impl ModrinthClient {
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

    fn filter_params(loaders: &[Loader], game_versions: &[GameVersion]) -> String {
        let mut params = String::new();
        if !loaders.is_empty() {
            let list: Vec<&str> = loaders.iter().map(Loader::as_str).collect();
            params.push_str(&format!("loaders={}", json!(list)));
        }
        if !game_versions.is_empty() {
            if !params.is_empty() {
                params.push('&');
            }
            let list: Vec<&str> = game_versions.iter().map(GameVersion::as_str).collect();
            params.push_str(&format!("game_versions={}", json!(list)));
        }
        params
    }
}

impl Default for ModrinthClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderClient for ModrinthClient {
    fn provider(&self) -> Provider {
        Provider::Modrinth
    }

    fn sorting_methods(&self) -> &'static [SortingMethod] {
        SORTING_METHODS
    }

    fn search_request(&self, args: &SearchArgs) -> Option<ProviderRequest> {
        let mut facets: Vec<Vec<String>> = vec![vec!["project_type:mod".to_string()]];
        if !args.loaders.is_empty() {
            facets.push(
                args.loaders
                    .iter()
                    .map(|l| format!("categories:{l}"))
                    .collect(),
            );
        }
        if !args.game_versions.is_empty() {
            facets.push(
                args.game_versions
                    .iter()
                    .map(|v| format!("versions:{v}"))
                    .collect(),
            );
        }

        let mut url = format!(
            "{}/search?offset={}&limit={}&facets={}",
            self.base_url,
            args.offset,
            args.limit.max(1),
            json!(facets)
        );
        if let Some(query) = &args.query {
            url.push_str(&format!("&query={query}"));
        }
        if let Some(sorting) = &args.sorting {
            url.push_str(&format!("&index={}", sorting.name));
        }
        Some(ProviderRequest::get(url))
    }

    fn project_request(&self, project_id: &str) -> Option<ProviderRequest> {
        Some(ProviderRequest::get(format!(
            "{}/project/{project_id}",
            self.base_url
        )))
    }

    fn projects_request(&self, project_ids: &[String]) -> Option<ProviderRequest> {
        if project_ids.is_empty() {
            return None;
        }
        Some(ProviderRequest::get(format!(
            "{}/projects?ids={}",
            self.base_url,
            json!(project_ids)
        )))
    }

    fn versions_request(&self, args: &VersionSearchArgs) -> Option<ProviderRequest> {
        let mut url = format!("{}/project/{}/version", self.base_url, args.project_id);
        let params = Self::filter_params(&args.loaders, &args.game_versions);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params);
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

    fn fingerprint_request(&self, fingerprint: &str) -> Option<ProviderRequest> {
        Some(ProviderRequest::get(format!(
            "{}/version_file/{fingerprint}?algorithm=sha512",
            self.base_url
        )))
    }

    fn entries(&self, doc: &Value) -> Vec<Value> {
        match doc {
            Value::Array(arr) => arr.clone(),
            Value::Object(obj) => obj
                .get("hits")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn normalize_project(&self, obj: &Value) -> Result<RemoteProject> {
        // Search hits carry `project_id`, the project endpoint carries `id`
        let id = obj
            .get("project_id")
            .or_else(|| obj.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Parse {
                context: "reading modrinth project".to_string(),
                reason: "missing project id".to_string(),
            })?;
        let name = obj
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Parse {
                context: format!("reading modrinth project '{id}'"),
                reason: "missing title".to_string(),
            })?;
        Ok(RemoteProject {
            provider: Provider::Modrinth,
            id: id.to_string(),
            name: name.to_string(),
            slug: obj.get("slug").and_then(Value::as_str).map(String::from),
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    fn normalize_version(
        &self,
        obj: &Value,
        project_id_hint: Option<&str>,
    ) -> Option<RemoteVersion> {
        let file_id = obj.get("id")?.as_str()?.to_string();
        let project_id = obj
            .get("project_id")
            .and_then(Value::as_str)
            .or(project_id_hint)?
            .to_string();
        let date: DateTime<Utc> = obj
            .get("date_published")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))?;

        let files = obj.get("files").and_then(Value::as_array);
        let primary_file = files.and_then(|files| {
            files
                .iter()
                .find(|f| f.get("primary").and_then(Value::as_bool).unwrap_or(false))
                .or_else(|| files.first())
        });
        // A version without a fetchable file is not a usable candidate
        let download_url = primary_file?
            .get("url")
            .and_then(Value::as_str)?
            .to_string();

        let dependencies = obj
            .get("dependencies")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(|d| {
                        let project_id = d.get("project_id")?.as_str()?.to_string();
                        let kind = match d.get("dependency_type").and_then(Value::as_str)? {
                            "required" => DependencyKind::Required,
                            "optional" => DependencyKind::Optional,
                            "embedded" => DependencyKind::Embedded,
                            "incompatible" => DependencyKind::Incompatible,
                            _ => return None,
                        };
                        Some(RemoteDependency { project_id, kind })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(RemoteVersion {
            provider: Provider::Modrinth,
            project_id,
            file_id,
            name: obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            version_number: obj
                .get("version_number")
                .and_then(Value::as_str)
                .map(String::from),
            date,
            download_url: Some(download_url),
            changelog: obj
                .get("changelog")
                .and_then(Value::as_str)
                .map(String::from),
            release_type: obj
                .get("version_type")
                .and_then(Value::as_str)
                .and_then(ReleaseType::parse)
                .unwrap_or(ReleaseType::Release),
            loaders: obj
                .get("loaders")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .filter_map(Loader::parse)
                        .collect()
                })
                .unwrap_or_default(),
            game_versions: obj
                .get("game_versions")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(GameVersion::from)
                        .collect()
                })
                .unwrap_or_default(),
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version_json(id: &str, date: &str) -> Value {
        json!({
            "id": id,
            "project_id": "AABBCC",
            "name": format!("Version {id}"),
            "version_number": "2.0.0",
            "date_published": date,
            "version_type": "release",
            "changelog": "fixes",
            "loaders": ["fabric", "quilt"],
            "game_versions": ["1.20.1"],
            "files": [
                { "url": "https://cdn.modrinth.example/f.jar", "primary": true }
            ],
            "dependencies": [
                { "project_id": "DEPDEP", "dependency_type": "required" },
                { "project_id": "OPTOPT", "dependency_type": "optional" }
            ]
        })
    }

    #[test]
    fn normalizes_a_full_version_entry() {
        let client = ModrinthClient::new();
        let version = client
            .normalize_version(&version_json("v1", "2024-03-01T10:00:00Z"), None)
            .unwrap();

        assert_eq!(version.file_id, "v1");
        assert_eq!(version.project_id, "AABBCC");
        assert_eq!(version.release_type, ReleaseType::Release);
        assert_eq!(version.loaders, vec![Loader::Fabric, Loader::Quilt]);
        assert_eq!(version.download_url.as_deref(), Some("https://cdn.modrinth.example/f.jar"));
        assert_eq!(version.required_dependencies().count(), 1);
    }

    #[test]
    fn version_without_files_is_rejected() {
        let client = ModrinthClient::new();
        let mut entry = version_json("v1", "2024-03-01T10:00:00Z");
        entry["files"] = json!([]);
        assert!(client.normalize_version(&entry, None).is_none());
    }

    #[test]
    fn version_with_bad_date_is_rejected() {
        let client = ModrinthClient::new();
        let entry = version_json("v1", "not-a-date");
        assert!(client.normalize_version(&entry, None).is_none());
    }

    #[test]
    fn project_id_hint_fills_missing_field() {
        let client = ModrinthClient::new();
        let mut entry = version_json("v1", "2024-03-01T10:00:00Z");
        entry.as_object_mut().unwrap().remove("project_id");
        let version = client.normalize_version(&entry, Some("HINT")).unwrap();
        assert_eq!(version.project_id, "HINT");
    }

    #[test]
    fn search_entries_come_from_hits_envelope() {
        let client = ModrinthClient::new();
        let doc = json!({ "hits": [ { "project_id": "p1", "title": "One" } ] });
        let entries = client.entries(&doc);
        assert_eq!(entries.len(), 1);
        let project = client.normalize_project(&entries[0]).unwrap();
        assert_eq!(project.id, "p1");
        assert_eq!(project.name, "One");
    }

    #[test]
    fn versions_request_carries_filters() {
        let client = ModrinthClient::new();
        let request = client
            .versions_request(&VersionSearchArgs {
                project_id: "abc".to_string(),
                loaders: vec![Loader::Fabric],
                game_versions: vec![GameVersion::from("1.20.1")],
            })
            .unwrap();
        assert!(request.url.contains("/project/abc/version"));
        assert!(request.url.contains("loaders="));
        assert!(request.url.contains("game_versions="));
    }
}
