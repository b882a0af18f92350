use std::collections::HashMap;
use std::sync::Arc;

use crate::dependencies::graph::{DependenciesGraph, DependencyEdge, DependencyNode, MissingDependency};
use crate::dependencies::{DependencyFinder, DependencyResolution, Plugin, PluginDependency};

#[derive(Debug)]
enum ResolveState {
    Resolved(Arc<Plugin>),
    Failed(String),
}

/// Builds the dependency graph of a plugin, resolving every dependency id at most once.
pub struct DependenciesGraphBuilder<'a> {
    finder: &'a dyn DependencyFinder,
    states: HashMap<String, ResolveState>,
}

impl<'a> DependenciesGraphBuilder<'a> {
    pub fn new(finder: &'a dyn DependencyFinder) -> Self {
        Self {
            finder,
            states: HashMap::new(),
        }
    }

    pub fn build(mut self, plugin: Arc<Plugin>) -> DependenciesGraph {
        let mut graph = DependenciesGraph::new();
        self.states
            .insert(plugin.id.clone(), ResolveState::Resolved(Arc::clone(&plugin)));
        self.fill_graph(&plugin, &mut graph);
        log::debug!(
            "dependency graph of {}: {} vertices, {} edges",
            plugin.id,
            graph.vertices().len(),
            graph.edges().len()
        );
        graph
    }

    /// Adds `current` and everything reachable from it. Does nothing when `current` is
    /// already a vertex.
    pub fn fill_graph(&mut self, current: &Arc<Plugin>, graph: &mut DependenciesGraph) {
        if !graph.add_vertex(DependencyNode::new(current)) {
            return;
        }
        for dependency in &current.dependencies {
            match self.resolve(dependency) {
                Ok(target) => {
                    // A plugin satisfying its own module dependency is not an edge.
                    if target.id == current.id {
                        continue;
                    }
                    graph.add_edge(DependencyEdge {
                        from: current.id.clone(),
                        to: target.id.clone(),
                        dependency: dependency.clone(),
                    });
                    self.fill_graph(&target, graph);
                }
                Err(reason) => graph.add_missing(
                    &current.id,
                    MissingDependency {
                        dependency: dependency.clone(),
                        reason,
                    },
                ),
            }
        }
    }

    fn resolve(&mut self, dependency: &PluginDependency) -> Result<Arc<Plugin>, String> {
        match self.states.get(&dependency.id) {
            Some(ResolveState::Resolved(plugin)) => return Ok(Arc::clone(plugin)),
            Some(ResolveState::Failed(reason)) => return Err(reason.clone()),
            None => {}
        }

        let result = match self.finder.find(dependency) {
            DependencyResolution::Found(plugin) => Ok(plugin),
            failure => {
                let reason = failure.failure_reason(dependency).unwrap_or_default();
                log::debug!("dependency {} unresolved: {reason}", dependency.id);
                Err(reason)
            }
        };
        let state = match &result {
            Ok(plugin) => ResolveState::Resolved(Arc::clone(plugin)),
            Err(reason) => ResolveState::Failed(reason.clone()),
        };
        self.states.insert(dependency.id.clone(), state);
        result
    }
}
