use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use crate::dependencies::{Plugin, PluginDependency};

/// A dependency whose target could not be resolved, recorded on the dependent node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MissingDependency {
    pub dependency: PluginDependency,
    pub reason: String,
}

/// A resolved plugin in the graph. Nodes are identified by plugin id alone.
#[derive(Clone, Debug, Serialize)]
pub struct DependencyNode {
    pub id: String,
    pub version: String,
    pub missing: Vec<MissingDependency>,
    #[serde(skip)]
    pub plugin: Arc<Plugin>,
}

impl DependencyNode {
    pub fn new(plugin: &Arc<Plugin>) -> Self {
        Self {
            id: plugin.id.clone(),
            version: plugin.version.clone(),
            missing: Vec::new(),
            plugin: Arc::clone(plugin),
        }
    }

    pub fn label(&self) -> String {
        if self.version.is_empty() {
            self.id.clone()
        } else {
            format!("{}:{}", self.id, self.version)
        }
    }
}

impl PartialEq for DependencyNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DependencyNode {}

impl Hash for DependencyNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A resolved dependency, carrying the descriptor it was declared with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub dependency: PluginDependency,
}

/// Dependency graph of one verified plugin. Never holds two nodes with the same id.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DependenciesGraph {
    vertices: Vec<DependencyNode>,
    edges: Vec<DependencyEdge>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl DependenciesGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first vertex added, i.e. the verified plugin.
    pub fn root(&self) -> Option<&DependencyNode> {
        self.vertices.first()
    }

    pub fn vertices(&self) -> &[DependencyNode] {
        &self.vertices
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn vertex(&self, id: &str) -> Option<&DependencyNode> {
        self.index.get(id).map(|&position| &self.vertices[position])
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    /// Adds `node` unless a node with its id exists. Returns whether it was added.
    pub(crate) fn add_vertex(&mut self, node: DependencyNode) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        self.index.insert(node.id.clone(), self.vertices.len());
        self.vertices.push(node);
        true
    }

    pub(crate) fn add_edge(&mut self, edge: DependencyEdge) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    pub(crate) fn add_missing(&mut self, id: &str, missing: MissingDependency) {
        if let Some(&position) = self.index.get(id) {
            let node = &mut self.vertices[position];
            if !node.missing.contains(&missing) {
                node.missing.push(missing);
            }
        }
    }

    /// Every elementary cycle, each rotated to start at its smallest id, in sorted order.
    pub fn all_cycles(&self) -> Vec<Vec<String>> {
        let mut successors: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for edge in &self.edges {
            successors
                .entry(edge.from.as_str())
                .or_default()
                .insert(edge.to.as_str());
        }
        let mut ids: Vec<&str> = self.vertices.iter().map(|node| node.id.as_str()).collect();
        ids.sort_unstable();

        let mut cycles = BTreeSet::new();
        for &start in &ids {
            let mut path = vec![start];
            collect_cycles(start, start, &successors, &mut path, &mut cycles);
        }
        cycles.into_iter().collect()
    }
}

/// Extends `path` through nodes greater than `start`, so each cycle is found once, from its
/// smallest node.
fn collect_cycles<'a>(
    start: &'a str,
    current: &'a str,
    successors: &HashMap<&'a str, BTreeSet<&'a str>>,
    path: &mut Vec<&'a str>,
    cycles: &mut BTreeSet<Vec<String>>,
) {
    let Some(next) = successors.get(current) else {
        return;
    };
    for &candidate in next {
        if candidate == start {
            cycles.insert(path.iter().map(|id| id.to_string()).collect());
        } else if candidate > start && !path.contains(&candidate) {
            path.push(candidate);
            collect_cycles(start, candidate, successors, path, cycles);
            path.pop();
        }
    }
}
