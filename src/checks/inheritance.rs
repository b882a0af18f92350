use std::sync::Arc;

use crate::checks::{CheckContext, CheckMetadata, ClassCheck};
use crate::diagnostics::Problem;
use crate::hierarchy::found_class;
use crate::ir::ClassFile;

/// Declared superclass, defaulting to the root type; `None` for the root type and interfaces.
fn effective_super_name<'a>(class: &'a ClassFile, root_type: &'a str) -> Option<&'a str> {
    if class.name == root_type || class.is_interface() {
        return None;
    }
    Some(class.super_name.as_deref().unwrap_or(root_type))
}

/// Reports a superclass that resolves to an interface.
pub struct SuperclassBecameInterfaceCheck;

impl ClassCheck for SuperclassBecameInterfaceCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "SUPERCLASS_BECAME_INTERFACE",
            name: "Superclass became interface",
            description: "The declared superclass is an interface on the target platform",
        }
    }

    fn verify(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        let Some(super_name) = effective_super_name(class, &context.config.root_type) else {
            return;
        };
        let Some(parent) = found_class(context.resolver, super_name) else {
            return;
        };
        if parent.is_interface() {
            context.registrar.register_problem(Problem::SuperclassBecameInterface {
                class_name: class.name.clone(),
                super_name: parent.name.clone(),
            });
        }
    }
}

/// Reports declared interfaces that resolve to classes.
pub struct InterfaceBecameClassCheck;

impl ClassCheck for InterfaceBecameClassCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "INTERFACE_BECAME_CLASS",
            name: "Interface became class",
            description: "A declared interface is a class on the target platform",
        }
    }

    fn verify(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        for interface in &class.interfaces {
            let Some(parent) = found_class(context.resolver, interface) else {
                continue;
            };
            if !parent.is_interface() {
                context.registrar.register_problem(Problem::InterfaceBecameClass {
                    class_name: class.name.clone(),
                    interface_name: parent.name.clone(),
                });
            }
        }
    }
}

/// Reports classes extending a final class; the JVM refuses to load them.
pub struct InheritFromFinalCheck;

impl ClassCheck for InheritFromFinalCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "INHERIT_FROM_FINAL",
            name: "Inheritance from final class",
            description: "The superclass is final on the target platform",
        }
    }

    fn verify(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        let Some(super_name) = effective_super_name(class, &context.config.root_type) else {
            return;
        };
        let Some(parent) = found_class(context.resolver, super_name) else {
            return;
        };
        if parent.is_final() && !parent.is_interface() {
            context.registrar.register_problem(Problem::InheritFromFinalClass {
                class_name: class.name.clone(),
                super_name: parent.name.clone(),
            });
        }
    }
}
