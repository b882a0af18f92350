use std::sync::Arc;

use crate::checks::access::{can_access_class, can_access_member};
use crate::checks::{resolve_referenced_class, CheckContext, CheckMetadata, ClassCheck};
use crate::diagnostics::{Location, MemberReference, Problem};
use crate::hierarchy::{resolve_class_method, resolve_field, resolve_interface_method, MemberLookup};
use crate::ir::{CallKind, CallSite, ClassFile, FieldAccessSite, InstructionKind};
use crate::opcodes;

/// Resolves every class, method and field reference in the bytecode of a plugin class.
pub struct ReferencesCheck;

impl ClassCheck for ReferencesCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "UNRESOLVED_REFERENCES",
            name: "Bytecode references",
            description: "Class, method and field references must resolve and be accessible",
        }
    }

    fn verify(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        for method in &class.methods {
            let usage = Location::method(&class.name, &method.name, &method.descriptor);
            for instruction in &method.instructions {
                match &instruction.kind {
                    InstructionKind::TypeReference(name) => {
                        check_type_reference(class, name, instruction.opcode, &usage, context);
                    }
                    InstructionKind::ConstClass(name) => {
                        check_class_reference(class, name, &usage, context);
                    }
                    InstructionKind::Invoke(call) => check_invocation(class, call, &usage, context),
                    InstructionKind::FieldAccess(site) => {
                        check_field_access(class, site, &usage, context)
                    }
                    InstructionKind::ConstString(_)
                    | InstructionKind::ConstInt(_)
                    | InstructionKind::Other(_) => {}
                }
            }
        }
    }
}

fn check_class_reference(
    class: &Arc<ClassFile>,
    name: &str,
    usage: &Location,
    context: &CheckContext<'_>,
) -> Option<Arc<ClassFile>> {
    if name.starts_with('[') {
        return None;
    }
    let target = resolve_referenced_class(name, usage, context)?;
    if !can_access_class(class, &target) {
        context.registrar.register_problem(Problem::IllegalClassAccess {
            class_name: target.name.clone(),
            access: target.modifiers.access_level(),
            usage: usage.clone(),
        });
    }
    Some(target)
}

fn check_type_reference(
    class: &Arc<ClassFile>,
    name: &str,
    opcode: u8,
    usage: &Location,
    context: &CheckContext<'_>,
) {
    let Some(target) = check_class_reference(class, name, usage, context) else {
        return;
    };
    if opcode != opcodes::NEW {
        return;
    }
    if target.is_interface() {
        context.registrar.register_problem(Problem::InterfaceInstantiation {
            class_name: target.name.clone(),
            usage: usage.clone(),
        });
    } else if target.is_abstract() {
        context.registrar.register_problem(Problem::AbstractClassInstantiation {
            class_name: target.name.clone(),
            usage: usage.clone(),
        });
    }
}

fn check_invocation(
    class: &Arc<ClassFile>,
    call: &CallSite,
    usage: &Location,
    context: &CheckContext<'_>,
) {
    let Some(owner) = check_class_reference(class, &call.owner, usage, context) else {
        return;
    };
    let lookup = if owner.is_interface() {
        resolve_interface_method(
            context.resolver,
            &owner,
            &call.name,
            &call.descriptor,
            &context.config.root_type,
        )
    } else {
        resolve_class_method(context.resolver, &owner, &call.name, &call.descriptor)
    };
    let resolved = match lookup {
        MemberLookup::Found(resolved) => resolved,
        MemberLookup::Incomplete => return,
        MemberLookup::NotFound => {
            context.registrar.register_problem(Problem::MethodNotFound {
                method: MemberReference::new(&call.owner, &call.name, &call.descriptor),
                usage: usage.clone(),
            });
            return;
        }
    };

    let method = resolved.method();
    let reference = MemberReference::new(&resolved.class.name, &method.name, &method.descriptor);
    match call.kind {
        CallKind::Static if !method.is_static() => {
            context.registrar.register_problem(Problem::InvokeStaticOnInstanceMethod {
                method: reference.clone(),
                usage: usage.clone(),
            });
        }
        CallKind::Virtual | CallKind::Interface | CallKind::Special if method.is_static() => {
            context.registrar.register_problem(Problem::InvokeInstanceOnStaticMethod {
                method: reference.clone(),
                usage: usage.clone(),
            });
        }
        CallKind::Special if method.is_abstract() => {
            context.registrar.register_problem(Problem::AbstractMethodInvocation {
                method: reference.clone(),
                usage: usage.clone(),
            });
        }
        _ => {}
    }
    if !can_access_member(
        context.resolver,
        &context.config.root_type,
        class,
        &resolved.class,
        method.modifiers,
    ) {
        context.registrar.register_problem(Problem::IllegalMethodAccess {
            method: reference,
            access: method.modifiers.access_level(),
            usage: usage.clone(),
        });
    }
}

fn check_field_access(
    class: &Arc<ClassFile>,
    site: &FieldAccessSite,
    usage: &Location,
    context: &CheckContext<'_>,
) {
    let Some(owner) = check_class_reference(class, &site.owner, usage, context) else {
        return;
    };
    let resolved = match resolve_field(context.resolver, &owner, &site.name, &site.descriptor) {
        MemberLookup::Found(resolved) => resolved,
        MemberLookup::Incomplete => return,
        MemberLookup::NotFound => {
            context.registrar.register_problem(Problem::FieldNotFound {
                field: MemberReference::new(&site.owner, &site.name, &site.descriptor),
                usage: usage.clone(),
            });
            return;
        }
    };

    let field = resolved.field();
    let reference = MemberReference::new(&resolved.class.name, &field.name, &field.descriptor);
    if site.kind.is_static() && !field.is_static() {
        context.registrar.register_problem(Problem::StaticAccessOfInstanceField {
            field: reference.clone(),
            usage: usage.clone(),
        });
    } else if !site.kind.is_static() && field.is_static() {
        context.registrar.register_problem(Problem::InstanceAccessOfStaticField {
            field: reference.clone(),
            usage: usage.clone(),
        });
    }
    if !can_access_member(
        context.resolver,
        &context.config.root_type,
        class,
        &resolved.class,
        field.modifiers,
    ) {
        context.registrar.register_problem(Problem::IllegalFieldAccess {
            field: reference.clone(),
            access: field.modifiers.access_level(),
            usage: usage.clone(),
        });
    }
    // Final fields may only be assigned by their declaring class.
    if site.kind.is_put() && field.is_final() && resolved.class.name != class.name {
        context.registrar.register_problem(Problem::ChangeFinalField {
            field: reference,
            usage: usage.clone(),
        });
    }
}
