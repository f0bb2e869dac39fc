//! Configuration types for update checks and cascade policy

use std::time::Duration;

use crate::controller::CascadeDecision;
use crate::item::{GameVersion, Loader};

/// Configuration for an update check batch
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Active game versions; remote versions must intersect this set
    pub game_versions: Vec<GameVersion>,
    /// Active mod loaders; remote versions must intersect this set
    pub loaders: Vec<Loader>,
    /// Maximum number of jobs in flight per check
    pub max_concurrent: usize,
    /// Project ids per chunked multi-id lookup
    pub project_chunk_size: usize,
    /// Whether missing required dependencies are resolved transitively
    pub include_dependencies: bool,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Answer used when no interactive confirmer is wired in.
    /// A product decision, deliberately not hardcoded.
    pub cascade_default: CascadeDecision,
}

impl CheckConfig {
    pub fn with_game_version<V: Into<GameVersion>>(mut self, version: V) -> Self {
        self.game_versions.push(version.into());
        self
    }

    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Split a list of project ids into lookup chunks
    pub fn chunks<'a>(&self, ids: &'a [String]) -> impl Iterator<Item = &'a [String]> + use<'a> {
        ids.chunks(self.project_chunk_size.max(1))
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            game_versions: Vec::new(),
            loaders: Vec::new(),
            max_concurrent: 6,
            project_chunk_size: 50,
            include_dependencies: true,
            request_timeout: Duration::from_secs(30),
            user_agent: "collection/0.1.0".to_string(),
            cascade_default: CascadeDecision::DirectOnly,
        }
    }
}
