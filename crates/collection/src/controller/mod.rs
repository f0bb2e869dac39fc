//! Collection façade
//!
//! Owns the item store and dependency graph, runs cascade-aware state
//! changes through the confirmation seam, and starts update checks. UI
//! layers talk to this type only; everything below is engine plumbing.

pub mod events;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CheckConfig;
use crate::error::Result;
use crate::graph::{DependencyGraph, EnableAction, Relation};
use crate::item::{Item, ItemId, ItemStore};
use crate::provider::{Provider, ProviderRegistry};
use crate::resolver::{
    BatchHandle, CheckOutcome, PendingDependency, PlanEntry, ResolveTarget, TicketLedger,
    UpdateCandidate, UpdateResolver, merge_plan,
};

pub use events::{
    CascadeConfirmer, CascadeDecision, CascadeSummary, ChangeCallback, ChangeEvent,
    PolicyConfirmer,
};

/// Everything a finished update check produced
#[derive(Debug)]
pub struct UpdateReport {
    pub updates: Vec<UpdateCandidate>,
    pub dependencies: Vec<PendingDependency>,
    pub outcomes: HashMap<ItemId, CheckOutcome>,
    pub aborted: bool,
}

impl UpdateReport {
    /// Flatten into the confirmation list: direct updates first, then
    /// dependency-induced installs, deduplicated by target project
    pub fn into_plan(self) -> Vec<PlanEntry> {
        merge_plan(self.updates, self.dependencies)
    }
}

/// An update check that has been prepared but not yet run. Holds owned
/// snapshots, so the controller is free while the check is in flight.
pub struct UpdateCheck {
    resolver: UpdateResolver,
    targets: Vec<ResolveTarget>,
    installed: HashSet<(Provider, String)>,
}

impl UpdateCheck {
    /// Handle for aborting the check, usable from another task
    pub fn handle(&self) -> BatchHandle {
        self.resolver.abort_handle()
    }

    pub async fn run(mut self) -> Result<UpdateReport> {
        self.resolver.run(self.targets, self.installed).await?;
        let aborted = self.resolver.aborted();
        let outcomes = self.resolver.outcomes().clone();
        Ok(UpdateReport {
            updates: self.resolver.take_updates(),
            dependencies: self.resolver.take_dependencies(),
            outcomes,
            aborted,
        })
    }
}

/// Façade over the item store, the dependency graph, and update checks
pub struct CollectionController {
    store: ItemStore,
    graph: DependencyGraph,
    registry: Arc<ProviderRegistry>,
    config: CheckConfig,
    tickets: Arc<TicketLedger>,
    confirmer: Arc<dyn CascadeConfirmer>,
    listeners: Vec<ChangeCallback>,
}

impl CollectionController {
    pub fn new(store: ItemStore, config: CheckConfig, registry: Arc<ProviderRegistry>) -> Self {
        let confirmer = Arc::new(PolicyConfirmer::new(config.cascade_default));
        let mut controller = Self {
            store,
            graph: DependencyGraph::new(),
            registry,
            config,
            tickets: Arc::new(TicketLedger::new()),
            confirmer,
            listeners: Vec::new(),
        };
        controller.graph = DependencyGraph::rebuild(&controller.store);
        controller.refresh_counts();
        controller
    }

    /// Replace the cascade confirmation seam (interactive frontends)
    pub fn with_confirmer(mut self, confirmer: Arc<dyn CascadeConfirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Register a change subscriber, invoked synchronously after each change
    pub fn subscribe(&mut self, callback: ChangeCallback) {
        self.listeners.push(callback);
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.store.get(id)
    }

    /// Display names of the items this item directly requires
    pub fn requires_names(&self, id: &ItemId) -> Vec<String> {
        self.names_of(self.graph.requires_of(id))
    }

    /// Display names of the items directly requiring this item
    pub fn required_by_names(&self, id: &ItemId) -> Vec<String> {
        self.names_of(self.graph.required_by_of(id))
    }

    fn names_of(&self, ids: Vec<ItemId>) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.store.get(id).map(|item| item.name.clone()))
            .collect()
    }

    /// Add scanned items to the collection, rebuilding edges
    pub fn add_items<I: IntoIterator<Item = Item>>(&mut self, items: I) {
        let mut added = Vec::new();
        for item in items {
            added.push(item.id.clone());
            self.store.insert(item);
        }
        if added.is_empty() {
            return;
        }
        self.graph = DependencyGraph::rebuild(&self.store);
        let mut changed = self.refresh_counts();
        changed.extend(added);
        changed.sort();
        changed.dedup();
        self.emit(ChangeEvent::ItemsChanged(changed));
    }

    /// Apply an enable/disable/toggle action to a selection.
    ///
    /// Items the action would transitively affect are gathered first; when
    /// that cascade is non-empty the confirmer decides whether it is
    /// applied, skipped, or the whole action cancelled. Returns the ids
    /// whose enabled state actually changed.
    pub async fn set_enabled(&mut self, ids: &[ItemId], action: EnableAction) -> Vec<ItemId> {
        let mut enable_seeds: HashSet<ItemId> = HashSet::new();
        let mut disable_seeds: HashSet<ItemId> = HashSet::new();
        for id in ids {
            let Some(item) = self.store.get(id) else {
                continue;
            };
            let target = match action {
                EnableAction::Enable => true,
                EnableAction::Disable => false,
                EnableAction::Toggle => !item.enabled,
            };
            if target {
                enable_seeds.insert(id.clone());
            } else {
                disable_seeds.insert(id.clone());
            }
        }

        let cascade_enable = self
            .graph
            .affected(&self.store, &enable_seeds, Relation::Requires, true);
        let mut cascade_disable =
            self.graph
                .affected(&self.store, &disable_seeds, Relation::RequiredBy, false);
        // An item pulled both ways stays enabled
        for id in cascade_enable.iter().chain(enable_seeds.iter()) {
            cascade_disable.remove(id);
        }

        let summary = CascadeSummary {
            to_enable: sorted(&cascade_enable),
            to_disable: sorted(&cascade_disable),
        };
        let decision = if summary.is_empty() {
            CascadeDecision::DirectOnly
        } else {
            self.confirmer.confirm(&summary).await
        };
        if decision == CascadeDecision::Cancel {
            debug!("state change cancelled at cascade confirmation");
            return Vec::new();
        }

        let mut changed = Vec::new();
        self.apply_enabled(&enable_seeds, true, &mut changed);
        self.apply_enabled(&disable_seeds, false, &mut changed);
        if decision == CascadeDecision::ApplyCascade {
            self.apply_enabled(&cascade_enable, true, &mut changed);
            self.apply_enabled(&cascade_disable, false, &mut changed);
        }
        changed.sort();

        if !changed.is_empty() {
            self.emit(ChangeEvent::ItemsChanged(changed.clone()));
        }
        changed
    }

    fn apply_enabled(&mut self, ids: &HashSet<ItemId>, enabled: bool, changed: &mut Vec<ItemId>) {
        for id in ids {
            if let Some(item) = self.store.get_mut(id) {
                if item.enabled != enabled {
                    item.enabled = enabled;
                    changed.push(id.clone());
                }
            }
        }
    }

    /// Remove items from the collection. Surviving items keep their state;
    /// their edges and counts are recomputed and reported as changes.
    /// Returns the ids actually removed.
    pub fn delete(&mut self, ids: &[ItemId]) -> Vec<ItemId> {
        let mut removed = Vec::new();
        for id in ids {
            if self.store.remove(id).is_some() {
                removed.push(id.clone());
            }
        }
        if removed.is_empty() {
            return removed;
        }
        removed.sort();

        self.graph = DependencyGraph::rebuild(&self.store);
        let changed = self.refresh_counts();
        if !changed.is_empty() {
            self.emit(ChangeEvent::ItemsChanged(changed));
        }
        self.emit(ChangeEvent::ItemsRemoved(removed.clone()));
        info!(removed = removed.len(), "items removed from collection");
        removed
    }

    /// Prepare an update check for a selection (or the whole collection),
    /// snapshotting everything it needs. The check runs detached from the
    /// controller; abort it through its handle.
    pub fn begin_update_check(&self, ids: Option<&[ItemId]>) -> UpdateCheck {
        let targets: Vec<ResolveTarget> = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.store.get(id))
                .map(ResolveTarget::from_item)
                .collect(),
            None => self.store.iter().map(ResolveTarget::from_item).collect(),
        };
        let installed: HashSet<(Provider, String)> = self
            .store
            .iter()
            .filter_map(|item| {
                item.metadata
                    .as_ref()
                    .map(|m| (m.provider, m.project_id.clone()))
            })
            .collect();

        UpdateCheck {
            resolver: UpdateResolver::new(
                self.registry.clone(),
                self.config.clone(),
                self.tickets.clone(),
            ),
            targets,
            installed,
        }
    }

    /// Run an update check to completion
    pub async fn check_updates(&self, ids: Option<&[ItemId]>) -> Result<UpdateReport> {
        self.begin_update_check(ids).run().await
    }

    /// Recompute display counts from the graph; returns ids whose counts
    /// changed
    fn refresh_counts(&mut self) -> Vec<ItemId> {
        let counts: Vec<(ItemId, (usize, usize))> = self
            .store
            .ids()
            .map(|id| (id.clone(), self.graph.counts(id)))
            .collect();

        let mut changed = Vec::new();
        for (id, (requires, required_by)) in counts {
            if let Some(item) = self.store.get_mut(&id) {
                if item.requires_count != requires || item.required_by_count != required_by {
                    item.requires_count = requires;
                    item.required_by_count = required_by;
                    changed.push(id);
                }
            }
        }
        changed.sort();
        changed
    }

    fn emit(&self, event: ChangeEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }
}

fn sorted(set: &HashSet<ItemId>) -> Vec<ItemId> {
    let mut out: Vec<ItemId> = set.iter().cloned().collect();
    out.sort();
    out
}
