use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::in_packages;
use crate::error::VerificationError;
use crate::ir::{package_of, ClassFile};
use crate::source::PackageSet;

/// Outcome of resolving one class name. Every resolver call yields exactly one variant.
#[derive(Clone, Debug)]
pub enum ResolutionResult {
    Found(Arc<ClassFile>),
    NotFound,
    /// The class exists but is intentionally outside the analysis scope.
    ExternalClass,
    InvalidBinary(String),
    ReadFailure(String),
}

impl ResolutionResult {
    pub fn found(&self) -> Option<&Arc<ClassFile>> {
        match self {
            ResolutionResult::Found(class) => Some(class),
            _ => None,
        }
    }

    pub fn into_found(self) -> Option<Arc<ClassFile>> {
        match self {
            ResolutionResult::Found(class) => Some(class),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ResolutionResult::InvalidBinary(_) | ResolutionResult::ReadFailure(_)
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ResolutionResult::Found(_) => "found",
            ResolutionResult::NotFound => "not-found",
            ResolutionResult::ExternalClass => "external",
            ResolutionResult::InvalidBinary(_) => "invalid-binary",
            ResolutionResult::ReadFailure(_) => "read-failure",
        }
    }
}

impl fmt::Display for ResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionResult::Found(class) => write!(f, "found {} in {}", class.name, class.origin),
            ResolutionResult::InvalidBinary(reason) => write!(f, "invalid class file: {reason}"),
            ResolutionResult::ReadFailure(reason) => write!(f, "failed to read class file: {reason}"),
            other => f.write_str(other.kind_name()),
        }
    }
}

/// Answers class and package existence and lookup queries.
pub trait Resolver: Send + Sync {
    fn resolve_class(&self, name: &str) -> ResolutionResult;
    fn contains_class(&self, name: &str) -> bool;
    fn contains_package(&self, package: &str) -> bool;
    /// Names of every class this resolver can produce. Each call starts a fresh iteration.
    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        (**self).resolve_class(name)
    }

    fn contains_class(&self, name: &str) -> bool {
        (**self).contains_class(name)
    }

    fn contains_package(&self, package: &str) -> bool {
        (**self).contains_package(package)
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        (**self).all_classes()
    }
}

/// Folds child results in order: the first `Found` wins; otherwise a failure is surfaced before
/// an external marker, and `NotFound` only when every child said so.
fn first_found<'a>(
    name: &str,
    children: impl Iterator<Item = &'a Arc<dyn Resolver>>,
) -> ResolutionResult {
    let mut failure = None;
    let mut external = false;
    for child in children {
        match child.resolve_class(name) {
            found @ ResolutionResult::Found(_) => return found,
            ResolutionResult::NotFound => {}
            ResolutionResult::ExternalClass => external = true,
            failed => {
                if failure.is_none() {
                    failure = Some(failed);
                }
            }
        }
    }
    match failure {
        Some(failed) => failed,
        None if external => ResolutionResult::ExternalClass,
        None => ResolutionResult::NotFound,
    }
}

/// Ordered union of resolvers with a merged package-existence index.
///
/// Package absence is answered from the index before any child is asked; only children that
/// contain the package are consulted.
pub struct UnionResolver {
    children: Vec<Arc<dyn Resolver>>,
    packages: PackageSet,
}

impl UnionResolver {
    pub fn new(children: Vec<Arc<dyn Resolver>>) -> Self {
        let mut packages = PackageSet::new();
        for child in &children {
            for name in child.all_classes() {
                packages.add_class(&name);
            }
        }
        Self { children, packages }
    }

    pub fn children(&self) -> &[Arc<dyn Resolver>] {
        &self.children
    }
}

impl Resolver for UnionResolver {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        let package = package_of(name);
        if !self.packages.contains_package(package) {
            return ResolutionResult::NotFound;
        }
        first_found(
            name,
            self.children
                .iter()
                .filter(|child| child.contains_package(package)),
        )
    }

    fn contains_class(&self, name: &str) -> bool {
        self.packages.contains_package(package_of(name))
            && self.children.iter().any(|child| child.contains_class(name))
    }

    fn contains_package(&self, package: &str) -> bool {
        self.packages.contains_package(package)
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.children.iter().flat_map(|child| child.all_classes()))
    }
}

/// Small fixed composition of resolvers without a package index.
pub struct SimpleCompositeResolver {
    children: Vec<Arc<dyn Resolver>>,
}

impl SimpleCompositeResolver {
    pub fn new(children: Vec<Arc<dyn Resolver>>) -> Self {
        Self { children }
    }
}

impl Resolver for SimpleCompositeResolver {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        first_found(name, self.children.iter())
    }

    fn contains_class(&self, name: &str) -> bool {
        self.children.iter().any(|child| child.contains_class(name))
    }

    fn contains_package(&self, package: &str) -> bool {
        self.children
            .iter()
            .any(|child| child.contains_package(package))
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.children.iter().flat_map(|child| child.all_classes()))
    }
}

/// Reports classes under the given package prefixes as [`ResolutionResult::ExternalClass`].
pub struct ExternalClassesResolver {
    inner: Arc<dyn Resolver>,
    packages: Vec<String>,
}

impl ExternalClassesResolver {
    pub fn new(inner: Arc<dyn Resolver>, packages: Vec<String>) -> Self {
        let packages = packages
            .into_iter()
            .map(|package| package.trim_end_matches('/').replace('.', "/"))
            .filter(|package| !package.is_empty())
            .collect();
        Self { inner, packages }
    }

    fn is_external(&self, name: &str) -> bool {
        in_packages(&self.packages, name)
    }
}

impl Resolver for ExternalClassesResolver {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        if self.is_external(name) {
            return ResolutionResult::ExternalClass;
        }
        self.inner.resolve_class(name)
    }

    fn contains_class(&self, name: &str) -> bool {
        self.inner.contains_class(name)
    }

    fn contains_package(&self, package: &str) -> bool {
        self.inner.contains_package(package)
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        self.inner.all_classes()
    }
}

/// Memoises resolutions for the duration of one verification run and watches for coherence
/// violations between `resolve_class` and `contains_class`.
pub struct CachingResolver {
    inner: Arc<dyn Resolver>,
    cache: Mutex<HashMap<String, ResolutionResult>>,
    violation: Mutex<Option<VerificationError>>,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn Resolver>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            violation: Mutex::new(None),
        }
    }

    /// First coherence violation observed since the last call, if any.
    pub fn take_violation(&self) -> Option<VerificationError> {
        self.violation
            .lock()
            .ok()
            .and_then(|mut violation| violation.take())
    }

    fn check_coherence(&self, name: &str, result: &ResolutionResult) {
        let contained = self.inner.contains_class(name);
        let incoherent = match result {
            ResolutionResult::Found(_) => !contained,
            ResolutionResult::NotFound => contained,
            _ => false,
        };
        if !incoherent {
            return;
        }
        log::warn!("incoherent resolver answer for {name}: {result}, contains={contained}");
        if let Ok(mut violation) = self.violation.lock() {
            violation.get_or_insert(VerificationError::IncoherentResolver {
                class_name: name.to_string(),
                first: format!("contains_class={contained}"),
                second: format!("resolve_class={}", result.kind_name()),
            });
        }
    }
}

impl Resolver for CachingResolver {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(name) {
                return cached.clone();
            }
        }
        let result = self.inner.resolve_class(name);
        self.check_coherence(name, &result);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(name.to_string(), result.clone());
        }
        result
    }

    fn contains_class(&self, name: &str) -> bool {
        self.inner.contains_class(name)
    }

    fn contains_package(&self, package: &str) -> bool {
        self.inner.contains_package(package)
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        self.inner.all_classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::ir::{Modifiers, Origin, OriginKind};
    use crate::source::MemorySource;
    use crate::testing::ClassBuilder;

    fn source(id: &str, classes: Vec<ClassFile>) -> Arc<dyn Resolver> {
        let mut source = MemorySource::new(Origin::new(OriginKind::Library, id));
        for class in classes {
            source = source.with_class(class);
        }
        Arc::new(source)
    }

    fn origin_id(result: ResolutionResult) -> String {
        result.into_found().expect("found").origin.id.clone()
    }

    #[test]
    fn union_resolution_follows_child_order() {
        let a = source("a", vec![ClassBuilder::new("p/X").build()]);
        let b = source(
            "b",
            vec![ClassBuilder::new("p/X").with_modifiers(Modifiers::FINAL).build()],
        );

        let ab = UnionResolver::new(vec![a.clone(), b.clone()]);
        let ba = UnionResolver::new(vec![b, a]);

        assert_eq!(origin_id(ab.resolve_class("p/X")), "a");
        assert_eq!(origin_id(ba.resolve_class("p/X")), "b");
    }

    #[test]
    fn simple_composite_follows_child_order() {
        let a = source("a", vec![ClassBuilder::new("p/X").build()]);
        let b = source("b", vec![ClassBuilder::new("p/X").build()]);

        let composite = SimpleCompositeResolver::new(vec![b, a]);

        assert_eq!(origin_id(composite.resolve_class("p/X")), "b");
        assert!(composite.contains_package("p"));
        assert!(!composite.contains_package("q"));
    }

    #[test]
    fn union_surfaces_failures_instead_of_not_found() {
        let broken: Arc<dyn Resolver> = Arc::new(
            MemorySource::new(Origin::new(OriginKind::Library, "broken"))
                .with_bytes("p/X", b"broken".to_vec()),
        );
        let empty = source("empty", vec![ClassBuilder::new("p/Other").build()]);

        let union = UnionResolver::new(vec![empty, broken]);

        assert!(matches!(
            union.resolve_class("p/X"),
            ResolutionResult::InvalidBinary(_)
        ));
    }

    #[test]
    fn found_wins_over_earlier_failure() {
        let broken: Arc<dyn Resolver> = Arc::new(
            MemorySource::new(Origin::new(OriginKind::Library, "broken"))
                .with_bytes("p/X", b"broken".to_vec()),
        );
        let good = source("good", vec![ClassBuilder::new("p/X").build()]);

        let union = UnionResolver::new(vec![broken, good]);

        assert_eq!(origin_id(union.resolve_class("p/X")), "good");
    }

    struct CountingResolver {
        inner: Arc<dyn Resolver>,
        resolutions: AtomicUsize,
    }

    impl Resolver for CountingResolver {
        fn resolve_class(&self, name: &str) -> ResolutionResult {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve_class(name)
        }

        fn contains_class(&self, name: &str) -> bool {
            self.inner.contains_class(name)
        }

        fn contains_package(&self, package: &str) -> bool {
            self.inner.contains_package(package)
        }

        fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
            self.inner.all_classes()
        }
    }

    #[test]
    fn union_skips_children_for_unknown_packages() {
        let counting = Arc::new(CountingResolver {
            inner: source("a", vec![ClassBuilder::new("p/X").build()]),
            resolutions: AtomicUsize::new(0),
        });

        let union = UnionResolver::new(vec![counting.clone()]);

        assert!(matches!(
            union.resolve_class("q/Missing"),
            ResolutionResult::NotFound
        ));
        assert!(!union.contains_package("q"));
        assert_eq!(counting.resolutions.load(Ordering::SeqCst), 0);
        assert!(matches!(
            union.resolve_class("p/X"),
            ResolutionResult::Found(_)
        ));
        assert_eq!(counting.resolutions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn caching_resolver_resolves_once() {
        let counting = Arc::new(CountingResolver {
            inner: source("a", vec![ClassBuilder::new("p/X").build()]),
            resolutions: AtomicUsize::new(0),
        });
        let caching = CachingResolver::new(counting.clone());

        caching.resolve_class("p/X");
        caching.resolve_class("p/X");

        assert_eq!(counting.resolutions.load(Ordering::SeqCst), 1);
        assert!(caching.take_violation().is_none());
    }

    struct LyingResolver;

    impl Resolver for LyingResolver {
        fn resolve_class(&self, _name: &str) -> ResolutionResult {
            ResolutionResult::NotFound
        }

        fn contains_class(&self, _name: &str) -> bool {
            true
        }

        fn contains_package(&self, _package: &str) -> bool {
            true
        }

        fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
            Box::new(std::iter::empty())
        }
    }

    #[test]
    fn caching_resolver_reports_incoherent_answers() {
        let caching = CachingResolver::new(Arc::new(LyingResolver));

        caching.resolve_class("p/X");

        assert!(matches!(
            caching.take_violation(),
            Some(VerificationError::IncoherentResolver { class_name, .. }) if class_name == "p/X"
        ));
        assert!(caching.take_violation().is_none());
    }

    #[test]
    fn external_packages_are_marked() {
        let inner = source("a", vec![ClassBuilder::new("org/lib/X").build()]);
        let resolver = ExternalClassesResolver::new(inner, vec!["org.lib".to_string()]);

        assert!(matches!(
            resolver.resolve_class("org/lib/X"),
            ResolutionResult::ExternalClass
        ));
        assert!(matches!(
            resolver.resolve_class("org/library/X"),
            ResolutionResult::NotFound
        ));
        assert!(matches!(
            resolver.resolve_class("org/lib/sub/Y"),
            ResolutionResult::ExternalClass
        ));
    }
}
