//! Module registry and dependency graph.
//!
//! Every id the loader ever sees gets a [`Module`] entry here. Edges are
//! stored by id on both ends (`dependencies` on the source, `clients` on the
//! target), so the registry alone owns the modules and cycles in the graph
//! never turn into reference cycles.

use indexmap::{IndexMap, IndexSet};
use log::debug;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use crate::error::LoaderError;
use crate::exports::Exports;

/// A directed relationship between two modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Module whose execution declared the relationship
    pub source: String,
    /// Module depended upon
    pub target: String,
    /// Required edges come from `require`, optional ones from `symbol`
    pub required: bool,
}

/// Registry entry for one loadable unit
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) id: String,
    pub(crate) exports: Option<Exports>,
    pub(crate) is_required: bool,
    pub(crate) is_pending: bool,
    pub(crate) failure: Option<LoaderError>,
    pub(crate) dependencies: IndexMap<String, Dependency>,
    pub(crate) clients: IndexSet<String>,
}

impl Module {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            exports: None,
            is_required: false,
            is_pending: false,
            failure: None,
            dependencies: IndexMap::new(),
            clients: IndexSet::new(),
        }
    }

    /// Module id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Exported value, once resolved
    pub fn exports(&self) -> Option<&Exports> {
        self.exports.as_ref()
    }

    /// Whether exports are set
    pub fn is_resolved(&self) -> bool {
        self.exports.is_some()
    }

    /// Whether anything declared a hard dependency on this module
    pub fn is_required(&self) -> bool {
        self.is_required
    }

    /// Whether a fetch for this module is in progress
    pub fn is_pending(&self) -> bool {
        self.is_pending
    }

    /// The failure recorded by the last load attempt, if it failed
    pub fn failure(&self) -> Option<&LoaderError> {
        self.failure.as_ref()
    }

    /// Outgoing edges in declaration order
    pub fn dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.values()
    }

    /// Ids of the modules this one depends on, in declaration order
    pub fn dependency_ids(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    /// Ids of the modules depending on this one
    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(String::as_str)
    }
}

/// All modules known to a loader, in registration order
#[derive(Debug, Default)]
pub struct Registry {
    modules: IndexMap<String, Module>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the module for `id`, registering it first if needed
    pub fn ensure(&mut self, id: &str) -> &mut Module {
        if !self.modules.contains_key(id) {
            debug!("Registering module: {}", id);
            self.modules.insert(id.to_owned(), Module::new(id));
        }
        &mut self.modules[id]
    }

    /// Look a module up without registering it
    pub fn get(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module was registered yet
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Registered modules in registration order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Drop every module
    pub fn clear(&mut self) {
        self.modules.clear();
    }

    /// Record that `source` depends on `target`.
    ///
    /// Repeated declarations are idempotent; a required declaration upgrades
    /// an existing optional edge.
    pub fn add_dependency(&mut self, source: &str, target: &str, required: bool) {
        self.ensure(target).clients.insert(source.to_owned());
        let module = self.ensure(source);
        match module.dependencies.get_mut(target) {
            Some(edge) => edge.required |= required,
            None => {
                debug!(
                    "Adding {} dependency: {} -> {}",
                    if required { "required" } else { "optional" },
                    source,
                    target
                );
                module.dependencies.insert(
                    target.to_owned(),
                    Dependency {
                        source: source.to_owned(),
                        target: target.to_owned(),
                        required,
                    },
                );
            }
        }
    }

    /// Every module transitively reachable from `id`.
    ///
    /// Depth-first, in first-discovered order. The root is never part of its
    /// own closure, even when a cycle leads back to it.
    pub fn deep_dependencies(&self, id: &str) -> Vec<&Module> {
        let mut seen = IndexSet::new();
        seen.insert(id);
        self.collect_dependencies(id, &mut seen);
        seen.into_iter()
            .skip(1)
            .filter_map(|dep| self.modules.get(dep))
            .collect()
    }

    fn collect_dependencies<'a>(&'a self, id: &str, seen: &mut IndexSet<&'a str>) {
        let Some(module) = self.modules.get(id) else {
            return;
        };
        for dep in module.dependencies.keys() {
            if seen.insert(dep.as_str()) {
                self.collect_dependencies(dep, seen);
            }
        }
    }

    /// Whether `id` and its whole dependency closure have exports
    pub fn is_preloaded(&self, id: &str) -> bool {
        self.modules
            .get(id)
            .is_some_and(Module::is_resolved)
            && self
                .deep_dependencies(id)
                .into_iter()
                .all(Module::is_resolved)
    }

    /// Directed graph of all modules, with edge weights marking required edges
    pub fn dependency_graph(&self) -> DiGraph<&str, bool> {
        let mut graph = DiGraph::new();
        let mut nodes: FxHashMap<&str, NodeIndex> = FxHashMap::default();
        for id in self.modules.keys() {
            nodes.insert(id, graph.add_node(id.as_str()));
        }
        for module in self.modules.values() {
            for edge in module.dependencies.values() {
                if let (Some(&from), Some(&to)) =
                    (nodes.get(edge.source.as_str()), nodes.get(edge.target.as_str()))
                {
                    graph.add_edge(from, to, edge.required);
                }
            }
        }
        graph
    }

    /// Groups of modules that reach each other through their dependencies.
    ///
    /// Only real cycles are returned: components with more than one module,
    /// or a single module depending on itself.
    pub fn circular_groups(&self) -> Vec<Vec<String>> {
        let graph = self.dependency_graph();
        let mut groups: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&node| graph.contains_edge(node, node))
            })
            .map(|component| {
                let mut ids: Vec<String> = component
                    .into_iter()
                    .map(|node| graph[node].to_owned())
                    .collect();
                ids.sort_by_key(|id| self.modules.get_index_of(id.as_str()));
                ids
            })
            .collect();
        groups.sort_by_key(|group| {
            group
                .first()
                .and_then(|id| self.modules.get_index_of(id.as_str()))
        });
        groups
    }
}
