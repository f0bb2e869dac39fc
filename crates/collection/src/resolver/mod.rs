//! Update resolution pipeline
//!
//! For a batch of installed items, determines per item whether a newer
//! compatible remote version exists, resolves missing required dependencies
//! transitively, and assembles the material for a download plan. One
//! resolver instance serves one check; construct a fresh one per batch.

pub mod candidate;
pub mod job;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CheckConfig;
use crate::error::{EngineError, Result};
use crate::item::{Item, ItemId, ItemMetadata};
use crate::provider::{
    DependencySearchArgs, Provider, ProviderRegistry, VersionSearchArgs, best_match,
};

pub use candidate::{
    CheckOutcome, ItemCheckResult, PendingDependency, PlanEntry, UpdateCandidate, merge_plan,
};
pub use job::{
    JobHandle, JobOutcome, JobResult, JobState, Ticket, TicketLedger, outcome_channel, spawn_job,
};

/// Owned snapshot of the item fields a check needs; jobs never borrow the
/// store across the I/O boundary
#[derive(Debug, Clone)]
pub struct ResolveTarget {
    pub id: ItemId,
    pub name: String,
    pub metadata: Option<ItemMetadata>,
    pub fingerprint: Option<String>,
}

impl ResolveTarget {
    pub fn from_item(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            metadata: item.metadata.clone(),
            fingerprint: item.fingerprint.clone(),
        }
    }
}

/// Opaque handle for cancelling a running check; cheap to clone, owns
/// nothing
#[derive(Debug, Clone)]
pub struct BatchHandle {
    token: CancellationToken,
}

impl BatchHandle {
    /// Abort every still-running job in the batch. Idempotent; after this
    /// returns no further result is delivered for the batch.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Orchestrates one update check batch
pub struct UpdateResolver {
    registry: Arc<ProviderRegistry>,
    config: CheckConfig,
    tickets: Arc<TicketLedger>,
    token: CancellationToken,
    updates: Vec<UpdateCandidate>,
    dependencies: Vec<PendingDependency>,
    outcomes: HashMap<ItemId, CheckOutcome>,
    finished: bool,
    aborted: bool,
}

impl UpdateResolver {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: CheckConfig,
        tickets: Arc<TicketLedger>,
    ) -> Self {
        Self {
            registry,
            config,
            tickets,
            token: CancellationToken::new(),
            updates: Vec::new(),
            dependencies: Vec::new(),
            outcomes: HashMap::new(),
            finished: false,
            aborted: false,
        }
    }

    pub fn abort_handle(&self) -> BatchHandle {
        BatchHandle {
            token: self.token.clone(),
        }
    }

    /// Run the check for `targets`. `installed_projects` is the set of
    /// (provider, project id) pairs already satisfied by the collection,
    /// used to tell pending dependencies from installed ones.
    ///
    /// The resolver is done only when every dispatched job has reached a
    /// terminal state; aborting resolves early with no partial results
    /// reported as final.
    pub async fn run(
        &mut self,
        targets: Vec<ResolveTarget>,
        installed_projects: HashSet<(Provider, String)>,
    ) -> Result<()> {
        if self.finished {
            return Err(EngineError::Configuration {
                message: "resolver already ran; construct a fresh one per check".to_string(),
            });
        }
        self.finished = true;

        let installed = Arc::new(installed_projects);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let (tx, mut rx) = outcome_channel();

        // Provider-level precheck: a provider that cannot construct a
        // versions request fails its whole share of the batch before any
        // request is sent.
        let mut failed_providers: HashSet<Provider> = HashSet::new();
        for target in &targets {
            let Some(metadata) = &target.metadata else {
                continue;
            };
            let provider = metadata.provider;
            if failed_providers.contains(&provider) {
                continue;
            }
            let Some(client) = self.registry.get(provider) else {
                failed_providers.insert(provider);
                continue;
            };
            let probe = VersionSearchArgs {
                project_id: metadata.project_id.clone(),
                loaders: self.config.loaders.clone(),
                game_versions: self.config.game_versions.clone(),
            };
            if client.versions_request(&probe).is_none() {
                warn!(provider = %provider, "provider cannot build version requests; failing its batch");
                failed_providers.insert(provider);
            }
        }

        let mut outstanding = 0usize;
        for target in targets {
            if let Some(metadata) = &target.metadata {
                if failed_providers.contains(&metadata.provider) {
                    self.outcomes.insert(
                        target.id.clone(),
                        CheckOutcome::Failed {
                            reason: format!(
                                "{} cannot build a request for get-versions",
                                metadata.provider
                            ),
                            status: None,
                        },
                    );
                    continue;
                }
            } else if target.fingerprint.is_none() {
                // No metadata and no fingerprint: nothing any provider
                // could resolve. Distinct from a failed check.
                self.outcomes.insert(
                    target.id.clone(),
                    CheckOutcome::Unresolvable {
                        reason: "item has neither provider metadata nor a fingerprint".to_string(),
                    },
                );
                continue;
            }

            let ticket = self.tickets.issue(&target.id);
            let item = target.id.clone();
            let work = check_item(
                self.registry.clone(),
                self.config.clone(),
                target,
                installed.clone(),
                semaphore.clone(),
                self.token.clone(),
            );
            spawn_job(ticket, item, &self.token, tx.clone(), work);
            outstanding += 1;
        }
        drop(tx);

        while outstanding > 0 {
            let Some(outcome) = rx.recv().await else {
                break;
            };
            outstanding -= 1;

            // After an abort, arriving results are suppressed, not applied
            if self.token.is_cancelled() {
                self.aborted = true;
                continue;
            }
            self.apply_outcome(outcome);
        }

        if self.aborted {
            info!("update check aborted; partial results discarded");
            self.updates.clear();
            self.dependencies.clear();
            self.outcomes.clear();
            return Ok(());
        }

        self.fill_dependency_names().await;

        info!(
            updates = self.updates.len(),
            dependencies = self.dependencies.len(),
            checked = self.outcomes.len(),
            "update check finished"
        );
        Ok(())
    }

    fn apply_outcome(&mut self, outcome: JobOutcome) {
        let item = &outcome.item;
        if !self.tickets.is_current(item, outcome.ticket) {
            debug!(item = %item, "discarding superseded check result");
            return;
        }

        match outcome.result {
            JobResult::Succeeded(result) => {
                self.outcomes.insert(result.item.clone(), result.outcome);
                if let Some(update) = result.update {
                    self.updates.push(update);
                }
                for pending in result.pending {
                    self.merge_pending(pending);
                }
            }
            JobResult::Failed { reason, status } => {
                warn!(item = %item, reason = %reason, "update check failed for item");
                self.outcomes
                    .insert(item.clone(), CheckOutcome::Failed { reason, status });
            }
            JobResult::Aborted => {
                self.aborted = true;
            }
        }
    }

    fn merge_pending(&mut self, pending: PendingDependency) {
        if let Some(existing) = self
            .dependencies
            .iter_mut()
            .find(|d| d.provider == pending.provider && d.project_id == pending.project_id)
        {
            for id in pending.required_by {
                if !existing.required_by.contains(&id) {
                    existing.required_by.push(id);
                }
            }
        } else {
            self.dependencies.push(pending);
        }
    }

    /// Fill display names for pending dependencies with chunked multi-id
    /// project lookups, run concurrently per chunk. Best effort; a failed
    /// chunk leaves its names empty.
    async fn fill_dependency_names(&mut self) {
        let mut by_provider: HashMap<Provider, Vec<String>> = HashMap::new();
        for dep in self.dependencies.iter().filter(|d| d.name.is_none()) {
            by_provider
                .entry(dep.provider)
                .or_default()
                .push(dep.project_id.clone());
        }

        let registry = &self.registry;
        let token = &self.token;
        let lookups: Vec<_> = by_provider
            .iter()
            .flat_map(|(provider, ids)| {
                self.config.chunks(ids).map(move |chunk| async move {
                    (*provider, registry.fetch_projects(*provider, chunk, token).await)
                })
            })
            .collect();
        let results: Vec<(Provider, Result<Vec<crate::provider::RemoteProject>>)> =
            stream::iter(lookups)
                .buffer_unordered(self.config.max_concurrent.max(1))
                .collect()
                .await;

        for (provider, result) in results {
            match result {
                Ok(projects) => {
                    let names: HashMap<&str, &str> = projects
                        .iter()
                        .map(|p| (p.id.as_str(), p.name.as_str()))
                        .collect();
                    for dep in &mut self.dependencies {
                        if dep.provider == provider && dep.name.is_none() {
                            dep.name = names.get(dep.project_id.as_str()).map(|n| n.to_string());
                        }
                    }
                }
                Err(e) if e.is_abort() => return,
                Err(e) => {
                    warn!(provider = %provider, error = %e, "dependency name lookup failed");
                }
            }
        }
    }

    /// Whether the batch was aborted before completion
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Per-item outcomes of the finished check
    pub fn outcomes(&self) -> &HashMap<ItemId, CheckOutcome> {
        &self.outcomes
    }

    /// Consume the update candidates. Move-out; a second call yields nothing.
    pub fn take_updates(&mut self) -> Vec<UpdateCandidate> {
        std::mem::take(&mut self.updates)
    }

    /// Consume the pending dependencies. Move-out; a second call yields nothing.
    pub fn take_dependencies(&mut self) -> Vec<PendingDependency> {
        std::mem::take(&mut self.dependencies)
    }
}

/// Resolve one item end to end: identity, version list, best match,
/// missing required dependencies. Runs inside a job; every network call is
/// raced against the batch token.
async fn check_item(
    registry: Arc<ProviderRegistry>,
    config: CheckConfig,
    target: ResolveTarget,
    installed: Arc<HashSet<(Provider, String)>>,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
) -> std::result::Result<ItemCheckResult, EngineError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| EngineError::Aborted)?;

    // Identity: stored metadata, else content-fingerprint lookup
    let (provider, project_id, old_file_id, old_version) = match &target.metadata {
        Some(metadata) => (
            metadata.provider,
            metadata.project_id.clone(),
            metadata.file_id.clone(),
            metadata.version.clone(),
        ),
        None => {
            let fingerprint = target.fingerprint.as_deref().unwrap_or_default();
            match identify_by_fingerprint(&registry, fingerprint, &token).await? {
                Some((provider, version)) => {
                    let label = version.version_number.clone().unwrap_or(version.name);
                    (provider, version.project_id, version.file_id, label)
                }
                None => {
                    return Ok(ItemCheckResult {
                        item: target.id,
                        outcome: CheckOutcome::Unresolvable {
                            reason: "no provider recognizes this item's fingerprint".to_string(),
                        },
                        update: None,
                        pending: Vec::new(),
                    });
                }
            }
        }
    };

    let versions = registry
        .fetch_versions(
            provider,
            &VersionSearchArgs {
                project_id: project_id.clone(),
                loaders: config.loaders.clone(),
                game_versions: config.game_versions.clone(),
            },
            &token,
        )
        .await?;

    let Some(best) = best_match(&versions, &config.game_versions, &config.loaders) else {
        return Ok(ItemCheckResult {
            item: target.id,
            outcome: CheckOutcome::Failed {
                reason: "no compatible version found".to_string(),
                status: None,
            },
            update: None,
            pending: Vec::new(),
        });
    };

    if best.file_id == old_file_id {
        return Ok(ItemCheckResult {
            item: target.id,
            outcome: CheckOutcome::UpToDate,
            update: None,
            pending: Vec::new(),
        });
    }

    let pending = if config.include_dependencies {
        resolve_missing_dependencies(&registry, &config, provider, best, &target.id, &installed, &token)
            .await
    } else {
        Vec::new()
    };

    let update = UpdateCandidate {
        item: target.id.clone(),
        name: target.name,
        provider,
        old_file_id,
        old_version,
        version: best.clone(),
        changelog: best.changelog.clone(),
        confirmed: true,
    };

    Ok(ItemCheckResult {
        item: target.id,
        outcome: CheckOutcome::UpdateAvailable {
            new_file_id: best.file_id.clone(),
        },
        update: Some(update),
        pending,
    })
}

/// Try every registered provider's fingerprint lookup until one recognizes
/// the item
async fn identify_by_fingerprint(
    registry: &ProviderRegistry,
    fingerprint: &str,
    token: &CancellationToken,
) -> Result<Option<(Provider, crate::provider::RemoteVersion)>> {
    if fingerprint.is_empty() {
        return Ok(None);
    }
    for client in registry.providers() {
        let provider = client.provider();
        match registry
            .fetch_fingerprint_version(provider, fingerprint, token)
            .await
        {
            Ok(Some(version)) => return Ok(Some((provider, version))),
            Ok(None) => continue,
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => {
                warn!(provider = %provider, error = %e, "fingerprint lookup failed");
                continue;
            }
        }
    }
    Ok(None)
}

/// Worklist resolution of required dependencies the collection does not
/// satisfy, scoped to the update's provider. Cycle-safe via the seen set.
async fn resolve_missing_dependencies(
    registry: &ProviderRegistry,
    config: &CheckConfig,
    provider: Provider,
    chosen: &crate::provider::RemoteVersion,
    required_by: &ItemId,
    installed: &HashSet<(Provider, String)>,
    token: &CancellationToken,
) -> Vec<PendingDependency> {
    let mut pending = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = chosen
        .required_dependencies()
        .map(|d| d.project_id.clone())
        .collect();

    while let Some(dep_project) = queue.pop_front() {
        if !seen.insert(dep_project.clone()) {
            continue;
        }
        if installed.contains(&(provider, dep_project.clone())) {
            continue;
        }

        let resolved = registry
            .fetch_dependency_version(
                provider,
                &DependencySearchArgs {
                    project_id: dep_project.clone(),
                    loaders: config.loaders.clone(),
                    game_versions: config.game_versions.clone(),
                },
                token,
            )
            .await;

        match resolved {
            Ok(Some(version)) => {
                for transitive in version.required_dependencies() {
                    queue.push_back(transitive.project_id.clone());
                }
                pending.push(PendingDependency {
                    provider,
                    project_id: dep_project,
                    name: None,
                    version,
                    required_by: vec![required_by.clone()],
                });
            }
            Ok(None) => {
                warn!(project = %dep_project, "no compatible version for required dependency");
            }
            Err(e) if e.is_abort() => break,
            Err(e) => {
                warn!(project = %dep_project, error = %e, "dependency resolution failed");
            }
        }
    }

    pending
}
