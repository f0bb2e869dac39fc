//! In-memory dependency graph over installed items
//!
//! Maps every item to the set of items it requires and the set that require
//! it, and answers cascade queries for enable/disable actions. Edges are
//! recomputed in full whenever the item set changes; dependency lists are
//! small, and full recomputation avoids stale edges.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::item::{DependencyKind, ItemId, ItemStore};

/// Direction of a cascade traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Follow "A requires B" edges (enable cascade)
    Requires,
    /// Follow "B is required by A" edges (disable cascade)
    RequiredBy,
}

/// User intent on a selection of items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableAction {
    Enable,
    Disable,
    Toggle,
}

/// Directed requires/required-by graph, keyed by item id.
/// Holds ids only; items stay owned by the store.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    requires: HashMap<ItemId, HashSet<ItemId>>,
    required_by: HashMap<ItemId, HashSet<ItemId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute all edges from the current item set.
    ///
    /// An edge A -> B is inserted when A declares a dependency that resolves
    /// to installed item B, either by exact local id, or by (provider,
    /// project id) for metadata dependencies tagged required. Unresolvable
    /// declarations produce no edge and no error.
    pub fn rebuild(store: &ItemStore) -> Self {
        let mut graph = Self::new();

        for item in store.iter() {
            for dep_id in &item.local_dependencies {
                if dep_id != &item.id && store.contains(dep_id) {
                    graph.insert_edge(&item.id, dep_id);
                }
            }
            let Some(metadata) = &item.metadata else {
                continue;
            };
            for dep in &metadata.dependencies {
                if dep.kind != DependencyKind::Required {
                    continue;
                }
                if let Some(target) = store.find_by_project(metadata.provider, &dep.project_id) {
                    if target.id != item.id {
                        graph.insert_edge(&item.id, &target.id);
                    }
                }
            }
        }

        graph
    }

    fn insert_edge(&mut self, from: &ItemId, to: &ItemId) {
        self.requires
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.required_by
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
    }

    fn relation_map(&self, relation: Relation) -> &HashMap<ItemId, HashSet<ItemId>> {
        match relation {
            Relation::Requires => &self.requires,
            Relation::RequiredBy => &self.required_by,
        }
    }

    /// Direct (non-transitive) dependencies of an item, for display
    pub fn requires_of(&self, id: &ItemId) -> Vec<ItemId> {
        self.neighbors(id, Relation::Requires)
    }

    /// Direct (non-transitive) dependents of an item, for display
    pub fn required_by_of(&self, id: &ItemId) -> Vec<ItemId> {
        self.neighbors(id, Relation::RequiredBy)
    }

    fn neighbors(&self, id: &ItemId, relation: Relation) -> Vec<ItemId> {
        let mut out: Vec<ItemId> = self
            .relation_map(relation)
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Direct requires/required-by counts for an item
    pub fn counts(&self, id: &ItemId) -> (usize, usize) {
        (
            self.requires.get(id).map_or(0, HashSet::len),
            self.required_by.get(id).map_or(0, HashSet::len),
        )
    }

    /// Items that must additionally change state when `seeds` move to
    /// `target_enabled`, following `relation` transitively.
    ///
    /// Seeds are acted on directly and never appear in the result. An item
    /// joins the result only when its current enabled state differs from the
    /// target. The visited set guarantees termination on cyclic declarations.
    pub fn affected(
        &self,
        store: &ItemStore,
        seeds: &HashSet<ItemId>,
        relation: Relation,
        target_enabled: bool,
    ) -> HashSet<ItemId> {
        let edges = self.relation_map(relation);

        let mut affected = HashSet::new();
        let mut visited: HashSet<ItemId> = seeds.clone();
        let mut queue: VecDeque<ItemId> = seeds.iter().cloned().collect();

        while let Some(id) = queue.pop_front() {
            let Some(neighbors) = edges.get(&id) else {
                continue;
            };
            for neighbor in neighbors {
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                if let Some(item) = store.get(neighbor) {
                    if item.enabled != target_enabled {
                        affected.insert(neighbor.clone());
                    }
                }
                queue.push_back(neighbor.clone());
            }
        }

        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Dependency, Item, ItemMetadata};
    use crate::provider::Provider;

    fn metadata(project_id: &str, deps: &[&str]) -> ItemMetadata {
        ItemMetadata {
            provider: Provider::Modrinth,
            project_id: project_id.to_string(),
            file_id: format!("file-{project_id}"),
            version: "1.0".to_string(),
            dependencies: deps
                .iter()
                .map(|d| Dependency {
                    project_id: d.to_string(),
                    kind: DependencyKind::Required,
                })
                .collect(),
        }
    }

    fn seeds(ids: &[&str]) -> HashSet<ItemId> {
        ids.iter().map(|s| ItemId::from(*s)).collect()
    }

    #[test]
    fn local_id_and_project_id_edges_both_resolve() {
        let store = ItemStore::from_items([
            Item::new("a", "A").with_local_dependency("b"),
            Item::new("b", "B").with_metadata(metadata("proj-b", &["proj-c"])),
            Item::new("c", "C").with_metadata(metadata("proj-c", &[])),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        assert_eq!(graph.requires_of(&"a".into()), vec![ItemId::from("b")]);
        assert_eq!(graph.requires_of(&"b".into()), vec![ItemId::from("c")]);
        assert_eq!(graph.required_by_of(&"c".into()), vec![ItemId::from("b")]);
        assert_eq!(graph.counts(&"b".into()), (1, 1));
    }

    #[test]
    fn optional_and_missing_dependencies_produce_no_edges() {
        let mut meta = metadata("proj-a", &["proj-missing"]);
        meta.dependencies.push(Dependency {
            project_id: "proj-b".to_string(),
            kind: DependencyKind::Optional,
        });
        let store = ItemStore::from_items([
            Item::new("a", "A").with_metadata(meta),
            Item::new("b", "B").with_metadata(metadata("proj-b", &[])),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        assert!(graph.requires_of(&"a".into()).is_empty());
        assert_eq!(graph.counts(&"b".into()), (0, 0));
    }

    #[test]
    fn self_edges_are_never_created() {
        let store =
            ItemStore::from_items([Item::new("a", "A").with_local_dependency("a")]);
        let graph = DependencyGraph::rebuild(&store);
        assert!(graph.requires_of(&"a".into()).is_empty());
    }

    #[test]
    fn enable_cascade_returns_single_disabled_dependency() {
        let store = ItemStore::from_items([
            Item::new("a", "A").with_local_dependency("b"),
            Item::new("b", "B").with_enabled(false),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        let affected = graph.affected(&store, &seeds(&["a"]), Relation::Requires, true);
        assert_eq!(affected, seeds(&["b"]));
    }

    #[test]
    fn disable_cascade_returns_both_enabled_dependents() {
        let store = ItemStore::from_items([
            Item::new("lib", "Lib"),
            Item::new("a", "A").with_local_dependency("lib"),
            Item::new("b", "B").with_local_dependency("lib"),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        let affected = graph.affected(&store, &seeds(&["lib"]), Relation::RequiredBy, false);
        assert_eq!(affected, seeds(&["a", "b"]));
    }

    #[test]
    fn seed_items_never_appear_in_affected_set() {
        let store = ItemStore::from_items([
            Item::new("a", "A").with_local_dependency("b"),
            Item::new("b", "B").with_local_dependency("a").with_enabled(false),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        let affected = graph.affected(&store, &seeds(&["a", "b"]), Relation::Requires, true);
        assert!(affected.is_empty());
    }

    #[test]
    fn cyclic_declarations_terminate_with_finite_result() {
        let store = ItemStore::from_items([
            Item::new("a", "A").with_local_dependency("b"),
            Item::new("b", "B").with_local_dependency("c").with_enabled(false),
            Item::new("c", "C").with_local_dependency("a").with_enabled(false),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        let affected = graph.affected(&store, &seeds(&["a"]), Relation::Requires, true);
        assert_eq!(affected, seeds(&["b", "c"]));
    }

    #[test]
    fn items_already_in_target_state_are_not_affected() {
        let store = ItemStore::from_items([
            Item::new("a", "A").with_local_dependency("b"),
            Item::new("b", "B"),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        // B is already enabled; enabling A is a no-op cascade
        let affected = graph.affected(&store, &seeds(&["a"]), Relation::Requires, true);
        assert!(affected.is_empty());
    }

    #[test]
    fn unrelated_items_are_untouched() {
        let store = ItemStore::from_items([
            Item::new("a", "A").with_local_dependency("b"),
            Item::new("b", "B").with_enabled(false),
            Item::new("c", "C").with_enabled(false),
        ]);
        let graph = DependencyGraph::rebuild(&store);

        let affected = graph.affected(&store, &seeds(&["c"]), Relation::Requires, true);
        assert!(affected.is_empty());

        let affected = graph.affected(&store, &seeds(&["a"]), Relation::RequiredBy, false);
        assert!(affected.is_empty());
    }
}
