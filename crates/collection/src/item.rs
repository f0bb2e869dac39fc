//! Installed item types and the flat item store
//!
//! Items are discovered by an external scanning collaborator and handed to
//! the engine fully formed. The engine owns the authoritative store; the
//! dependency graph only holds back-references by id.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// Stable local identifier of an installed item, derived from a content hash
/// or filename by the scanning collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId(s)
    }
}

/// Mod loader an item or remote version targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Forge,
    Fabric,
    Quilt,
    NeoForge,
}

impl Loader {
    pub fn as_str(&self) -> &'static str {
        match self {
            Loader::Forge => "forge",
            Loader::Fabric => "fabric",
            Loader::Quilt => "quilt",
            Loader::NeoForge => "neoforge",
        }
    }

    /// Parse a loader from the free-form strings providers use
    pub fn parse(s: &str) -> Option<Loader> {
        match s.to_ascii_lowercase().as_str() {
            "forge" => Some(Loader::Forge),
            "fabric" => Some(Loader::Fabric),
            "quilt" => Some(Loader::Quilt),
            "neoforge" => Some(Loader::NeoForge),
            _ => None,
        }
    }

    /// Numeric loader class used by the Flame API
    pub fn flame_class(&self) -> u8 {
        match self {
            Loader::Forge => 1,
            Loader::Fabric => 4,
            Loader::Quilt => 5,
            Loader::NeoForge => 6,
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A supported game version, kept as the provider-facing string (e.g. "1.20.1")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameVersion(pub String);

impl GameVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameVersion {
    fn from(s: &str) -> Self {
        GameVersion(s.to_string())
    }
}

/// Kind tag on a provider-declared dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Required,
    Optional,
    Embedded,
    Incompatible,
}

/// Provider-declared dependency reference, matched by project id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub project_id: String,
    pub kind: DependencyKind,
}

/// Remote metadata attached to an item when its provider is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub provider: Provider,
    pub project_id: String,
    /// Identifier of the installed release's file on the provider
    pub file_id: String,
    /// Human-readable installed version label
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// An installed add-on tracked by the collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Self-reported dependency ids (provider-agnostic, matched by local id)
    #[serde(default)]
    pub local_dependencies: Vec<ItemId>,
    /// Content fingerprint for identity fallback when metadata is missing
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub metadata: Option<ItemMetadata>,
    /// Direct dependency counts, maintained by the controller for display
    #[serde(default, skip_serializing)]
    pub requires_count: usize,
    #[serde(default, skip_serializing)]
    pub required_by_count: usize,
}

fn default_enabled() -> bool {
    true
}

impl Item {
    pub fn new<S: Into<String>>(id: S, name: S) -> Self {
        Self {
            id: ItemId(id.into()),
            name: name.into(),
            enabled: true,
            local_dependencies: Vec::new(),
            fingerprint: None,
            metadata: None,
            requires_count: 0,
            required_by_count: 0,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_local_dependency<S: Into<String>>(mut self, id: S) -> Self {
        self.local_dependencies.push(ItemId(id.into()));
        self
    }

    pub fn with_fingerprint<S: Into<String>>(mut self, fingerprint: S) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Project id from the item's metadata, when the provider is known
    pub fn project_id(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.project_id.as_str())
    }
}

/// Flat, id-keyed store of installed items. The single authoritative owner;
/// everything else refers to items by id.
#[derive(Debug, Default, Clone)]
pub struct ItemStore {
    items: HashMap<ItemId, Item>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items<I: IntoIterator<Item = Item>>(items: I) -> Self {
        let mut store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    pub fn insert(&mut self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<Item> {
        self.items.remove(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.items.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.keys()
    }

    /// Look up an item by (provider, project id), the match rule for
    /// provider-declared dependencies
    pub fn find_by_project(&self, provider: Provider, project_id: &str) -> Option<&Item> {
        self.items.values().find(|item| {
            item.metadata
                .as_ref()
                .is_some_and(|m| m.provider == provider && m.project_id == project_id)
        })
    }
}
