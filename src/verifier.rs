use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::checks::{default_checks, CheckContext, ClassCheck};
use crate::config::VerifierConfig;
use crate::dependencies::{
    register_dependency_problems, DependenciesGraph, DependenciesGraphBuilder, DependencyFinder,
    MapDependencyFinder, Plugin,
};
use crate::diagnostics::{Location, Problem, Registrar};
use crate::error::VerificationError;
use crate::resolver::{
    CachingResolver, ExternalClassesResolver, ResolutionResult, Resolver, UnionResolver,
};
use crate::usage::UsagePipeline;

/// Shared flag that aborts a verification between two classes.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One plugin checked against one platform.
///
/// Each request builds its own resolver tree, so requests never share mutable state.
pub struct VerificationRequest {
    pub plugin: Arc<Plugin>,
    /// Classes of the plugin itself; every one of them is verified.
    pub plugin_classes: Arc<dyn Resolver>,
    /// Platform and runtime classes, in resolution order.
    pub platform: Vec<Arc<dyn Resolver>>,
    /// Classes of resolved dependencies, searched after the platform.
    pub classpath: Vec<Arc<dyn Resolver>>,
    pub dependency_finder: Option<Arc<dyn DependencyFinder>>,
}

impl VerificationRequest {
    pub fn new(plugin: Plugin, plugin_classes: Arc<dyn Resolver>) -> Self {
        Self {
            plugin: Arc::new(plugin),
            plugin_classes,
            platform: Vec::new(),
            classpath: Vec::new(),
            dependency_finder: None,
        }
    }

    pub fn with_platform(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.platform.push(resolver);
        self
    }

    pub fn with_classpath(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.classpath.push(resolver);
        self
    }

    pub fn with_dependency_finder(mut self, finder: Arc<dyn DependencyFinder>) -> Self {
        self.dependency_finder = Some(finder);
        self
    }
}

/// What a finished verification looked at.
#[derive(Debug, Serialize)]
pub struct VerificationSummary {
    pub plugin_id: String,
    pub classes_verified: usize,
    pub dependency_graph: DependenciesGraph,
    pub dependency_cycles: Vec<Vec<String>>,
    pub elapsed_ms: u128,
}

/// Runs every check and usage classification over the classes of a plugin.
pub struct Verifier {
    config: VerifierConfig,
    checks: Vec<Box<dyn ClassCheck>>,
    pipeline: UsagePipeline,
}

impl Verifier {
    pub fn new(config: VerifierConfig) -> Self {
        let pipeline = UsagePipeline::standard(&config);
        Self {
            config,
            checks: default_checks(),
            pipeline,
        }
    }

    pub fn with_checks(mut self, checks: Vec<Box<dyn ClassCheck>>) -> Self {
        self.checks = checks;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn verify(
        &self,
        request: &VerificationRequest,
        registrar: &dyn Registrar,
        cancellation: &CancellationToken,
    ) -> Result<VerificationSummary, VerificationError> {
        let started_at = Instant::now();
        let plugin_id = request.plugin.id.clone();
        log::info!("verifying {plugin_id}");

        let empty_finder = MapDependencyFinder::new();
        let finder: &dyn DependencyFinder = match &request.dependency_finder {
            Some(finder) => finder.as_ref(),
            None => &empty_finder,
        };
        let dependency_graph = DependenciesGraphBuilder::new(finder).build(Arc::clone(&request.plugin));
        register_dependency_problems(&dependency_graph, registrar);
        let dependency_cycles = dependency_graph.all_cycles();
        for cycle in &dependency_cycles {
            log::debug!("dependency cycle in {plugin_id}: {}", cycle.join(" -> "));
        }

        let resolver = self.resolver_tree(request);
        let context = CheckContext {
            resolver: &resolver,
            registrar,
            config: &self.config,
        };
        let mut classes_verified = 0;
        for class_name in request.plugin_classes.all_classes() {
            if cancellation.is_cancelled() {
                log::info!("verification of {plugin_id} cancelled after {classes_verified} classes");
                return Err(VerificationError::Cancelled);
            }
            self.verify_class(&class_name, &context);
            if let Some(violation) = resolver.take_violation() {
                return Err(violation);
            }
            classes_verified += 1;
        }

        let elapsed_ms = started_at.elapsed().as_millis();
        log::info!("verified {classes_verified} classes of {plugin_id} in {elapsed_ms} ms");
        Ok(VerificationSummary {
            plugin_id,
            classes_verified,
            dependency_graph,
            dependency_cycles,
            elapsed_ms,
        })
    }

    fn resolver_tree(&self, request: &VerificationRequest) -> CachingResolver {
        let children: Vec<Arc<dyn Resolver>> = std::iter::once(Arc::clone(&request.plugin_classes))
            .chain(request.platform.iter().cloned())
            .chain(request.classpath.iter().cloned())
            .collect();
        let union: Arc<dyn Resolver> = Arc::new(UnionResolver::new(children));
        if self.config.external_packages.is_empty() {
            CachingResolver::new(union)
        } else {
            CachingResolver::new(Arc::new(ExternalClassesResolver::new(
                union,
                self.config.external_packages.clone(),
            )))
        }
    }

    fn verify_class(&self, class_name: &str, context: &CheckContext<'_>) {
        let usage = Location::class(class_name);
        let class = match context.resolver.resolve_class(class_name) {
            ResolutionResult::Found(class) => class,
            ResolutionResult::InvalidBinary(reason) => {
                context.registrar.register_problem(Problem::InvalidClassFile {
                    class_name: class_name.to_string(),
                    reason,
                    usage,
                });
                return;
            }
            ResolutionResult::ReadFailure(reason) => {
                context.registrar.register_problem(Problem::FailedToReadClassFile {
                    class_name: class_name.to_string(),
                    reason,
                    usage,
                });
                return;
            }
            other => {
                log::debug!("plugin class {class_name} resolved to {other}");
                return;
            }
        };
        for check in &self.checks {
            check.verify(&class, context);
        }
        self.pipeline.scan_class(&class, context);
    }
}
