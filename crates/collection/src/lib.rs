//! Mod collection engine
//!
//! Core of a mod manager: tracks installed items, maintains their
//! dependency graph, runs cascade-aware enable/disable/delete actions,
//! and checks remote providers for updates with transitive dependency
//! resolution. Frontends sit on top of [`CollectionController`]; nothing
//! in here renders or prompts.

pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod item;
pub mod provider;
pub mod resolver;

pub use tokio_util::sync::CancellationToken;

pub use config::CheckConfig;
pub use controller::{
    CascadeConfirmer, CascadeDecision, CascadeSummary, ChangeCallback, ChangeEvent,
    CollectionController, PolicyConfirmer, UpdateCheck, UpdateReport,
};
pub use error::{EngineError, Result};
pub use graph::{DependencyGraph, EnableAction, Relation};
pub use item::{
    Dependency, DependencyKind, GameVersion, Item, ItemId, ItemMetadata, ItemStore, Loader,
};
pub use provider::{
    FlameClient, ModrinthClient, Provider, ProviderClient, ProviderRegistry, ReleaseType,
    RemoteDependency, RemoteProject, RemoteVersion, SearchArgs, SortingMethod, VersionSearchArgs,
};
pub use resolver::{
    BatchHandle, CheckOutcome, PendingDependency, PlanEntry, UpdateCandidate, UpdateResolver,
    merge_plan,
};

#[cfg(test)]
mod tests;
