use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Mutex;

use serde::Serialize;

use super::{ApiUsage, DeprecatedApiUsage, Problem, Warning};

/// Severity of a diagnostic as produced by the checkers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Error,
    Warning,
}

/// Severity assigned to a problem by an external remapping policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemappedLevel {
    Ignore,
    Warning,
    UnacceptableWarning,
    Error,
}

/// Sink for every diagnostic category. Deduplication is up to the implementation.
pub trait Registrar: Send + Sync {
    fn register_problem(&self, problem: Problem);
    fn register_warning(&self, warning: Warning);
    fn register_deprecated_usage(&self, usage: DeprecatedApiUsage);
    fn register_experimental_usage(&self, usage: ApiUsage);
    fn register_internal_usage(&self, usage: ApiUsage);
    fn register_override_only_usage(&self, usage: ApiUsage);
    fn register_non_extendable_usage(&self, usage: ApiUsage);
    fn register_discouraged_usage(&self, usage: ApiUsage);
}

/// Everything registered during one verification request, in first-seen order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Diagnostics {
    pub problems: Vec<Problem>,
    pub warnings: Vec<Warning>,
    pub deprecated_usages: Vec<DeprecatedApiUsage>,
    pub experimental_usages: Vec<ApiUsage>,
    pub internal_usages: Vec<ApiUsage>,
    pub override_only_usages: Vec<ApiUsage>,
    pub non_extendable_usages: Vec<ApiUsage>,
    pub discouraged_usages: Vec<ApiUsage>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
            && self.warnings.is_empty()
            && self.deprecated_usages.is_empty()
            && self.experimental_usages.is_empty()
            && self.internal_usages.is_empty()
            && self.override_only_usages.is_empty()
            && self.non_extendable_usages.is_empty()
            && self.discouraged_usages.is_empty()
    }
}

struct Bucket<T> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Bucket<T> {
    fn push(&mut self, item: T) {
        if self.seen.insert(item.clone()) {
            self.items.push(item);
        }
    }
}

#[derive(Default)]
struct Collected {
    problems: Bucket<Problem>,
    warnings: Bucket<Warning>,
    deprecated: Bucket<DeprecatedApiUsage>,
    experimental: Bucket<ApiUsage>,
    internal: Bucket<ApiUsage>,
    override_only: Bucket<ApiUsage>,
    non_extendable: Bucket<ApiUsage>,
    discouraged: Bucket<ApiUsage>,
}

/// Registrar that keeps every distinct diagnostic in memory.
#[derive(Default)]
pub struct CollectingRegistrar {
    collected: Mutex<Collected>,
}

impl CollectingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<F: FnOnce(&mut Collected)>(&self, update: F) {
        match self.collected.lock() {
            Ok(mut collected) => update(&mut collected),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    pub fn snapshot(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::default();
        self.with(|collected| {
            diagnostics = Diagnostics {
                problems: collected.problems.items.clone(),
                warnings: collected.warnings.items.clone(),
                deprecated_usages: collected.deprecated.items.clone(),
                experimental_usages: collected.experimental.items.clone(),
                internal_usages: collected.internal.items.clone(),
                override_only_usages: collected.override_only.items.clone(),
                non_extendable_usages: collected.non_extendable.items.clone(),
                discouraged_usages: collected.discouraged.items.clone(),
            };
        });
        diagnostics
    }
}

impl Registrar for CollectingRegistrar {
    fn register_problem(&self, problem: Problem) {
        log::debug!("problem: {problem}");
        self.with(|collected| collected.problems.push(problem));
    }

    fn register_warning(&self, warning: Warning) {
        self.with(|collected| collected.warnings.push(warning));
    }

    fn register_deprecated_usage(&self, usage: DeprecatedApiUsage) {
        self.with(|collected| collected.deprecated.push(usage));
    }

    fn register_experimental_usage(&self, usage: ApiUsage) {
        self.with(|collected| collected.experimental.push(usage));
    }

    fn register_internal_usage(&self, usage: ApiUsage) {
        self.with(|collected| collected.internal.push(usage));
    }

    fn register_override_only_usage(&self, usage: ApiUsage) {
        self.with(|collected| collected.override_only.push(usage));
    }

    fn register_non_extendable_usage(&self, usage: ApiUsage) {
        self.with(|collected| collected.non_extendable.push(usage));
    }

    fn register_discouraged_usage(&self, usage: ApiUsage) {
        self.with(|collected| collected.discouraged.push(usage));
    }
}

/// Applies a remapping policy to problems before forwarding them.
///
/// Ignored problems are dropped, downgraded ones become [`Warning::RemappedProblem`]. All
/// other categories pass through unchanged.
pub struct RemappingRegistrar<R, P> {
    inner: R,
    policy: P,
}

impl<R, P> RemappingRegistrar<R, P>
where
    R: Registrar,
    P: Fn(&Problem) -> RemappedLevel + Send + Sync,
{
    pub fn new(inner: R, policy: P) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R, P> Registrar for RemappingRegistrar<R, P>
where
    R: Registrar,
    P: Fn(&Problem) -> RemappedLevel + Send + Sync,
{
    fn register_problem(&self, problem: Problem) {
        match (self.policy)(&problem) {
            RemappedLevel::Error => self.inner.register_problem(problem),
            RemappedLevel::Ignore => log::debug!("ignored by policy: {problem}"),
            RemappedLevel::Warning => self.inner.register_warning(Warning::RemappedProblem {
                problem: Box::new(problem),
                unacceptable: false,
            }),
            RemappedLevel::UnacceptableWarning => {
                self.inner.register_warning(Warning::RemappedProblem {
                    problem: Box::new(problem),
                    unacceptable: true,
                })
            }
        }
    }

    fn register_warning(&self, warning: Warning) {
        self.inner.register_warning(warning);
    }

    fn register_deprecated_usage(&self, usage: DeprecatedApiUsage) {
        self.inner.register_deprecated_usage(usage);
    }

    fn register_experimental_usage(&self, usage: ApiUsage) {
        self.inner.register_experimental_usage(usage);
    }

    fn register_internal_usage(&self, usage: ApiUsage) {
        self.inner.register_internal_usage(usage);
    }

    fn register_override_only_usage(&self, usage: ApiUsage) {
        self.inner.register_override_only_usage(usage);
    }

    fn register_non_extendable_usage(&self, usage: ApiUsage) {
        self.inner.register_non_extendable_usage(usage);
    }

    fn register_discouraged_usage(&self, usage: ApiUsage) {
        self.inner.register_discouraged_usage(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{ApiElement, Location, ReferenceOrigin};

    fn superclass_problem(class_name: &str) -> Problem {
        Problem::SuperclassBecameInterface {
            class_name: class_name.to_string(),
            super_name: "base/Base".to_string(),
        }
    }

    #[test]
    fn collecting_registrar_deduplicates_in_first_seen_order() {
        let registrar = CollectingRegistrar::new();

        registrar.register_problem(superclass_problem("p/B"));
        registrar.register_problem(superclass_problem("p/A"));
        registrar.register_problem(superclass_problem("p/B"));

        let diagnostics = registrar.snapshot();
        assert_eq!(
            diagnostics.problems,
            vec![superclass_problem("p/B"), superclass_problem("p/A")]
        );
    }

    #[test]
    fn usages_are_kept_per_category() {
        let registrar = CollectingRegistrar::new();
        let usage = ApiUsage {
            api: ApiElement::Class {
                class_name: "api/Internal".to_string(),
            },
            usage: Location::class("p/Plugin"),
            origin: ReferenceOrigin::Bytecode,
        };

        registrar.register_internal_usage(usage.clone());
        registrar.register_internal_usage(usage.clone());
        registrar.register_experimental_usage(usage);

        let diagnostics = registrar.snapshot();
        assert_eq!(diagnostics.internal_usages.len(), 1);
        assert_eq!(diagnostics.experimental_usages.len(), 1);
        assert!(diagnostics.problems.is_empty());
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn remapping_registrar_applies_policy() {
        let registrar = RemappingRegistrar::new(CollectingRegistrar::new(), |problem: &Problem| {
            match problem {
                Problem::SuperclassBecameInterface { class_name, .. } if class_name == "p/Ignored" => {
                    RemappedLevel::Ignore
                }
                Problem::SuperclassBecameInterface { class_name, .. } if class_name == "p/Soft" => {
                    RemappedLevel::UnacceptableWarning
                }
                _ => RemappedLevel::Error,
            }
        });

        registrar.register_problem(superclass_problem("p/Ignored"));
        registrar.register_problem(superclass_problem("p/Soft"));
        registrar.register_problem(superclass_problem("p/Hard"));

        let diagnostics = registrar.inner().snapshot();
        assert_eq!(diagnostics.problems, vec![superclass_problem("p/Hard")]);
        assert_eq!(
            diagnostics.warnings,
            vec![Warning::RemappedProblem {
                problem: Box::new(superclass_problem("p/Soft")),
                unacceptable: true,
            }]
        );
    }
}
