use std::sync::Arc;

use crate::checks::{resolve_referenced_class, CheckContext, CheckMetadata, ClassCheck};
use crate::diagnostics::{Location, Problem};
use crate::hierarchy::{found_class, ClassHierarchy};
use crate::ir::{package_of, top_level_class_of, AccessLevel, ClassFile, Modifiers};
use crate::resolver::Resolver;

/// Whether code in `accessor` may name `target` (JVMS 5.4.4).
pub(crate) fn can_access_class(accessor: &ClassFile, target: &ClassFile) -> bool {
    target.is_public() || package_of(&accessor.name) == package_of(&target.name)
}

/// Whether code in `accessor` may use a member of `declaring` with the given modifiers.
///
/// Private access is granted within a nest, approximated by a shared top-level class.
/// Protected access is granted when the subclass relation cannot be decided.
pub(crate) fn can_access_member(
    resolver: &dyn Resolver,
    root_type: &str,
    accessor: &Arc<ClassFile>,
    declaring: &ClassFile,
    modifiers: Modifiers,
) -> bool {
    let same_package = package_of(&accessor.name) == package_of(&declaring.name);
    match modifiers.access_level() {
        AccessLevel::Public => true,
        AccessLevel::PackagePrivate => same_package,
        AccessLevel::Private => {
            top_level_class_of(&accessor.name) == top_level_class_of(&declaring.name)
        }
        AccessLevel::Protected => {
            same_package
                || is_subclass_or_nested_in_subclass(resolver, root_type, accessor, &declaring.name)
        }
    }
}

fn is_subclass_or_nested_in_subclass(
    resolver: &dyn Resolver,
    root_type: &str,
    accessor: &Arc<ClassFile>,
    ancestor: &str,
) -> bool {
    let mut current = Some(Arc::clone(accessor));
    while let Some(class) = current {
        let hierarchy = ClassHierarchy::build(&class, resolver, root_type);
        if hierarchy.inherits_from(ancestor) != Some(false) {
            return true;
        }
        current = class
            .outer_class_name()
            .and_then(|outer| found_class(resolver, outer));
    }
    false
}

/// Reports superclasses and interfaces the class cannot access or resolve.
pub struct SuperTypeAccessCheck;

impl ClassCheck for SuperTypeAccessCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "SUPER_TYPE_ACCESS",
            name: "Super type access",
            description: "Superclasses and interfaces must resolve and be accessible",
        }
    }

    fn verify(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        let usage = Location::class(&class.name);
        let super_name = if class.name == context.config.root_type {
            None
        } else {
            Some(
                class
                    .super_name
                    .as_deref()
                    .unwrap_or(context.config.root_type.as_str()),
            )
        };
        for parent_name in super_name.into_iter().chain(class.interfaces.iter().map(String::as_str)) {
            let Some(parent) = resolve_referenced_class(parent_name, &usage, context) else {
                continue;
            };
            if !can_access_class(class, &parent) {
                context.registrar.register_problem(Problem::IllegalClassAccess {
                    class_name: parent.name.clone(),
                    access: parent.modifiers.access_level(),
                    usage: usage.clone(),
                });
            }
        }
    }
}
