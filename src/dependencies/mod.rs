use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::diagnostics::{Problem, Registrar, Warning};

pub mod builder;
pub mod graph;
pub mod printer;

pub use builder::DependenciesGraphBuilder;
pub use graph::{DependenciesGraph, DependencyEdge, DependencyNode, MissingDependency};
pub use printer::pretty_print;

/// A dependency as declared by a plugin.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PluginDependency {
    pub id: String,
    pub is_optional: bool,
    /// The id names a module declared by some plugin rather than a plugin.
    pub is_module: bool,
}

impl PluginDependency {
    pub fn plugin(id: &str) -> Self {
        Self {
            id: id.to_string(),
            is_optional: false,
            is_module: false,
        }
    }

    pub fn module(id: &str) -> Self {
        Self {
            is_module: true,
            ..Self::plugin(id)
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }
}

/// An already parsed plugin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Plugin {
    pub id: String,
    pub version: String,
    pub dependencies: Vec<PluginDependency>,
    pub extension_points: Vec<String>,
    /// Module ids this plugin declares.
    pub modules: Vec<String>,
}

impl Plugin {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    pub fn depends_on(mut self, dependency: PluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn declares_module(mut self, module: &str) -> Self {
        self.modules.push(module.to_string());
        self
    }
}

/// Outcome of looking up the target of a dependency.
#[derive(Clone, Debug)]
pub enum DependencyResolution {
    Found(Arc<Plugin>),
    NotFound,
    InvalidPlugin(String),
    ReadFailure(String),
}

impl DependencyResolution {
    /// Human-readable reason a dependency could not be resolved; `None` when it was found.
    pub fn failure_reason(&self, dependency: &PluginDependency) -> Option<String> {
        let kind = if dependency.is_module { "module" } else { "plugin" };
        match self {
            DependencyResolution::Found(_) => None,
            DependencyResolution::NotFound => Some(format!("{kind} {} is not found", dependency.id)),
            DependencyResolution::InvalidPlugin(reason) => {
                Some(format!("{kind} {} is invalid: {reason}", dependency.id))
            }
            DependencyResolution::ReadFailure(reason) => {
                Some(format!("failed to read {kind} {}: {reason}", dependency.id))
            }
        }
    }
}

/// Looks up the plugins that satisfy dependencies.
pub trait DependencyFinder: Send + Sync {
    fn find(&self, dependency: &PluginDependency) -> DependencyResolution;
}

/// In-memory plugin repository.
#[derive(Debug, Default)]
pub struct MapDependencyFinder {
    plugins: BTreeMap<String, Arc<Plugin>>,
    failures: BTreeMap<String, DependencyResolution>,
}

impl MapDependencyFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.insert(plugin.id.clone(), Arc::new(plugin));
        self
    }

    /// Makes lookups of `id` fail with `resolution`.
    pub fn with_failure(mut self, id: &str, resolution: DependencyResolution) -> Self {
        self.failures.insert(id.to_string(), resolution);
        self
    }
}

impl DependencyFinder for MapDependencyFinder {
    fn find(&self, dependency: &PluginDependency) -> DependencyResolution {
        if let Some(failure) = self.failures.get(&dependency.id) {
            return failure.clone();
        }
        if !dependency.is_module {
            if let Some(plugin) = self.plugins.get(&dependency.id) {
                return DependencyResolution::Found(Arc::clone(plugin));
            }
        }
        self.plugins
            .values()
            .find(|plugin| plugin.modules.iter().any(|module| module == &dependency.id))
            .map(|plugin| DependencyResolution::Found(Arc::clone(plugin)))
            .unwrap_or(DependencyResolution::NotFound)
    }
}

/// Reports the missing dependencies of the verified plugin: mandatory ones as problems,
/// optional ones as warnings.
pub fn register_dependency_problems(graph: &DependenciesGraph, registrar: &dyn Registrar) {
    let Some(root) = graph.root() else {
        return;
    };
    for missing in &root.missing {
        if missing.dependency.is_optional {
            registrar.register_warning(Warning::MissingOptionalDependency {
                plugin_id: root.id.clone(),
                dependency_id: missing.dependency.id.clone(),
                reason: missing.reason.clone(),
            });
        } else {
            registrar.register_problem(Problem::MissingMandatoryDependency {
                plugin_id: root.id.clone(),
                dependency_id: missing.dependency.id.clone(),
                reason: missing.reason.clone(),
            });
        }
    }
}
