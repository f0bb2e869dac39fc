//! Remote catalog providers
//!
//! One small, stateless adapter per remote service translates engine
//! requests into provider requests and provider JSON into the shared
//! normalized shapes. The registry routes operations to the right adapter
//! and owns the single HTTP client.

pub mod flame;
pub mod modrinth;
pub mod types;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CheckConfig;
use crate::error::{EngineError, Result};
use crate::item::{GameVersion, Loader};

pub use flame::FlameClient;
pub use modrinth::ModrinthClient;
pub use types::{
    RemoteDependency, RemoteProject, RemoteVersion, ReleaseType, best_match, sort_newest_first,
};

/// The remote catalog services the engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Modrinth,
    Flame,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Modrinth => "modrinth",
            Provider::Flame => "flame",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A sorting method a provider's search endpoint accepts.
/// Flame selects by index, Modrinth by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortingMethod {
    pub index: u32,
    pub name: &'static str,
    pub readable_name: &'static str,
}

/// Arguments for a remote catalog search
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub query: Option<String>,
    pub sorting: Option<SortingMethod>,
    pub loaders: Vec<Loader>,
    pub game_versions: Vec<GameVersion>,
    pub offset: u32,
    pub limit: u32,
}

/// Arguments for fetching a project's version list
#[derive(Debug, Clone)]
pub struct VersionSearchArgs {
    pub project_id: String,
    pub loaders: Vec<Loader>,
    pub game_versions: Vec<GameVersion>,
}

/// Arguments for resolving a dependency's best version
#[derive(Debug, Clone)]
pub struct DependencySearchArgs {
    pub project_id: String,
    pub loaders: Vec<Loader>,
    pub game_versions: Vec<GameVersion>,
}

/// HTTP method of a provider request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestMethod {
    Get,
    /// POST with a JSON body (Flame multi-id and fingerprint lookups)
    Post(Value),
}

/// A provider request described as data, so GET and POST providers share
/// one transport path
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub method: RequestMethod,
    pub url: String,
}

impl ProviderRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: RequestMethod::Get,
            url: url.into(),
        }
    }

    pub fn post<S: Into<String>>(url: S, body: Value) -> Self {
        Self {
            method: RequestMethod::Post(body),
            url: url.into(),
        }
    }
}

/// Capability surface implemented once per remote provider.
///
/// Request builders return `None` when the provider cannot express the
/// operation; the caller decides whether that fails a batch or skips an
/// item. Normalizers map provider-native JSON into the shared shapes.
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Sorting methods the provider's search endpoint accepts
    fn sorting_methods(&self) -> &'static [SortingMethod];

    fn search_request(&self, args: &SearchArgs) -> Option<ProviderRequest>;
    fn project_request(&self, project_id: &str) -> Option<ProviderRequest>;
    /// Chunked multi-id project lookup, where the API supports it
    fn projects_request(&self, project_ids: &[String]) -> Option<ProviderRequest>;
    fn versions_request(&self, args: &VersionSearchArgs) -> Option<ProviderRequest>;
    fn dependency_request(&self, args: &DependencySearchArgs) -> Option<ProviderRequest>;
    /// Content-fingerprint identity lookup; `None` when unsupported
    fn fingerprint_request(&self, fingerprint: &str) -> Option<ProviderRequest>;

    /// Unwrap a response document into its entry array. Providers return
    /// either a bare array or an envelope object holding one.
    fn entries(&self, doc: &Value) -> Vec<Value>;

    fn normalize_project(&self, obj: &Value) -> Result<RemoteProject>;

    /// Normalize one version entry. Malformed entries yield `None` and are
    /// skipped by callers, so one bad entry does not fail a whole response.
    fn normalize_version(&self, obj: &Value, project_id_hint: Option<&str>)
    -> Option<RemoteVersion>;
}

/// Registry routing operations to provider adapters over one shared client
pub struct ProviderRegistry {
    client: reqwest::Client,
    providers: Vec<Box<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new(config: &CheckConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            providers: Vec::new(),
        })
    }

    /// Registry with both default providers registered
    pub fn with_default_providers(config: &CheckConfig) -> Result<Self> {
        Ok(Self::new(config)?
            .register(ModrinthClient::new())
            .register(FlameClient::new()))
    }

    pub fn register<P: ProviderClient + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&dyn ProviderClient> {
        self.providers
            .iter()
            .find(|p| p.provider() == provider)
            .map(|p| p.as_ref())
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn ProviderClient> {
        self.providers.iter().map(|p| p.as_ref())
    }

    /// Execute a provider request and parse the JSON payload.
    ///
    /// The future resolves to `Aborted` as soon as the token fires; the
    /// in-flight transfer is dropped with it, never delivered late.
    pub async fn execute(&self, request: &ProviderRequest, token: &CancellationToken) -> Result<Value> {
        let builder = match &request.method {
            RequestMethod::Get => self.client.get(&request.url),
            RequestMethod::Post(body) => self.client.post(&request.url).json(body),
        };

        debug!(url = %request.url, "dispatching provider request");

        let response = tokio::select! {
            _ = token.cancelled() => return Err(EngineError::Aborted),
            resp = builder.send() => resp?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport {
                url: request.url.clone(),
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let payload = tokio::select! {
            _ = token.cancelled() => return Err(EngineError::Aborted),
            body = response.json::<Value>() => body,
        };

        payload.map_err(|e| EngineError::Parse {
            context: format!("reading response from '{}'", request.url),
            reason: e.to_string(),
        })
    }

    /// Search the provider's catalog, skipping malformed entries
    pub async fn search(
        &self,
        provider: Provider,
        args: &SearchArgs,
        token: &CancellationToken,
    ) -> Result<Vec<RemoteProject>> {
        let client = self.require(provider)?;
        let request = client
            .search_request(args)
            .ok_or(EngineError::RequestConstruction {
                provider,
                operation: "search",
            })?;
        let doc = self.execute(&request, token).await?;

        let mut projects = Vec::new();
        for entry in client.entries(&doc) {
            match client.normalize_project(&entry) {
                Ok(project) => projects.push(project),
                Err(e) => warn!(provider = %provider, error = %e, "skipping malformed search entry"),
            }
        }
        Ok(projects)
    }

    /// Fetch a single project's normalized info
    pub async fn fetch_project(
        &self,
        provider: Provider,
        project_id: &str,
        token: &CancellationToken,
    ) -> Result<RemoteProject> {
        let client = self.require(provider)?;
        let request =
            client
                .project_request(project_id)
                .ok_or(EngineError::RequestConstruction {
                    provider,
                    operation: "get-project",
                })?;
        let doc = self.execute(&request, token).await?;
        // Single-project endpoints may still wrap the object in an envelope
        let obj = match &doc {
            Value::Object(map) if map.contains_key("data") => &map["data"],
            other => other,
        };
        client.normalize_project(obj)
    }

    /// Fetch several projects in one request, skipping malformed entries
    pub async fn fetch_projects(
        &self,
        provider: Provider,
        project_ids: &[String],
        token: &CancellationToken,
    ) -> Result<Vec<RemoteProject>> {
        let client = self.require(provider)?;
        let request =
            client
                .projects_request(project_ids)
                .ok_or(EngineError::RequestConstruction {
                    provider,
                    operation: "get-projects",
                })?;
        let doc = self.execute(&request, token).await?;

        let mut projects = Vec::new();
        for entry in client.entries(&doc) {
            match client.normalize_project(&entry) {
                Ok(project) => projects.push(project),
                Err(e) => warn!(provider = %provider, error = %e, "skipping malformed project entry"),
            }
        }
        Ok(projects)
    }

    /// Fetch a project's version list, normalized and sorted newest first
    pub async fn fetch_versions(
        &self,
        provider: Provider,
        args: &VersionSearchArgs,
        token: &CancellationToken,
    ) -> Result<Vec<RemoteVersion>> {
        let client = self.require(provider)?;
        let request = client
            .versions_request(args)
            .ok_or(EngineError::RequestConstruction {
                provider,
                operation: "get-versions",
            })?;
        let doc = self.execute(&request, token).await?;

        let mut versions: Vec<RemoteVersion> = client
            .entries(&doc)
            .iter()
            .filter_map(|entry| client.normalize_version(entry, Some(&args.project_id)))
            .collect();
        sort_newest_first(&mut versions);
        Ok(versions)
    }

    /// Resolve a dependency reference to its best matching version
    pub async fn fetch_dependency_version(
        &self,
        provider: Provider,
        args: &DependencySearchArgs,
        token: &CancellationToken,
    ) -> Result<Option<RemoteVersion>> {
        let client = self.require(provider)?;
        let request =
            client
                .dependency_request(args)
                .ok_or(EngineError::RequestConstruction {
                    provider,
                    operation: "get-dependency-version",
                })?;
        let doc = self.execute(&request, token).await?;

        let versions: Vec<RemoteVersion> = client
            .entries(&doc)
            .iter()
            .filter_map(|entry| client.normalize_version(entry, Some(&args.project_id)))
            .collect();
        Ok(best_match(&versions, &args.game_versions, &args.loaders).cloned())
    }

    /// Identify the version an unknown file belongs to by content
    /// fingerprint. `Ok(None)` when the provider cannot do fingerprint
    /// lookups or the fingerprint is unknown to it.
    pub async fn fetch_fingerprint_version(
        &self,
        provider: Provider,
        fingerprint: &str,
        token: &CancellationToken,
    ) -> Result<Option<RemoteVersion>> {
        let client = self.require(provider)?;
        let Some(request) = client.fingerprint_request(fingerprint) else {
            return Ok(None);
        };
        match self.execute(&request, token).await {
            Ok(doc) => {
                let obj = match &doc {
                    Value::Object(map) if map.contains_key("data") => &map["data"],
                    other => other,
                };
                Ok(client.normalize_version(obj, None))
            }
            // An unknown fingerprint is "no identity", not an error
            Err(EngineError::Transport { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn require(&self, provider: Provider) -> Result<&dyn ProviderClient> {
        self.get(provider).ok_or(EngineError::Configuration {
            message: format!("provider '{provider}' is not registered"),
        })
    }
}
