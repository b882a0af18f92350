use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::checks::{CheckContext, CheckMetadata, ClassCheck};
use crate::diagnostics::{MemberReference, Problem};
use crate::hierarchy::{found_class, HierarchyWalker};
use crate::ir::ClassFile;

/// Reports abstract methods a concrete class inherits without an implementation.
///
/// Stays silent whenever any ancestor fails to resolve: the missing ancestor may have supplied
/// the implementation.
pub struct AbstractMethodsCheck;

impl ClassCheck for AbstractMethodsCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "ABSTRACT_METHOD_NOT_IMPLEMENTED",
            name: "Abstract method not implemented",
            description: "A concrete class leaves an inherited abstract method unimplemented",
        }
    }

    fn verify(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        if class.is_abstract() || class.is_interface() {
            return;
        }

        let mut abstract_methods: BTreeMap<(String, String), MemberReference> = BTreeMap::new();
        let mut implemented: HashSet<(String, String)> = HashSet::new();
        let outcome = HierarchyWalker::new(true).visit_class(
            class,
            true,
            |name| found_class(context.resolver, name),
            |node| {
                for method in &node.methods {
                    if method.is_private() || method.is_static() || method.is_constructor() {
                        continue;
                    }
                    let key = (method.name.clone(), method.descriptor.clone());
                    if method.is_abstract() {
                        abstract_methods.entry(key).or_insert_with(|| {
                            MemberReference::new(&node.name, &method.name, &method.descriptor)
                        });
                    } else {
                        implemented.insert(key);
                    }
                }
                true
            },
            |_| {},
        );
        if outcome.has_unresolved_parents() {
            log::debug!(
                "skipping abstract method check of {}: unresolved {:?}",
                class.name,
                outcome.unresolved
            );
            return;
        }

        for (key, method) in abstract_methods {
            if implemented.contains(&key) {
                continue;
            }
            context.registrar.register_problem(Problem::MethodNotImplemented {
                class_name: class.name.clone(),
                method,
            });
        }
    }
}
