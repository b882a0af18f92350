use std::fmt;

use serde::Serialize;

use crate::descriptor::{java_class_name, render_field_descriptor, render_method_descriptor};
use crate::ir::AccessLevel;

mod registrar;

pub use registrar::{
    CollectingRegistrar, Diagnostics, Level, RemappedLevel, RemappingRegistrar, Registrar,
};

/// A method or field referenced by owner, name and descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MemberReference {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberReference {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    pub fn render_method(&self) -> String {
        format!(
            "{}.{}{}",
            java_class_name(&self.owner),
            self.name,
            render_method_descriptor(&self.descriptor)
        )
    }

    pub fn render_field(&self) -> String {
        format!(
            "{}.{} : {}",
            java_class_name(&self.owner),
            self.name,
            render_field_descriptor(&self.descriptor)
        )
    }
}

/// Place in plugin code where a diagnostic was observed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Location {
    Class { class_name: String },
    Method { method: MemberReference },
    Field { field: MemberReference },
}

impl Location {
    pub fn class(class_name: &str) -> Self {
        Location::Class {
            class_name: class_name.to_string(),
        }
    }

    pub fn method(owner: &str, name: &str, descriptor: &str) -> Self {
        Location::Method {
            method: MemberReference::new(owner, name, descriptor),
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Location::Class { class_name } => class_name,
            Location::Method { method } => &method.owner,
            Location::Field { field } => &field.owner,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Class { class_name } => write!(f, "class {}", java_class_name(class_name)),
            Location::Method { method } => write!(f, "method {}", method.render_method()),
            Location::Field { field } => write!(f, "field {}", field.render_field()),
        }
    }
}

/// Compatibility problems. Messages are derived from the structured fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Problem {
    ClassNotFound {
        class_name: String,
        package_missing: bool,
        usage: Location,
    },
    InvalidClassFile {
        class_name: String,
        reason: String,
        usage: Location,
    },
    FailedToReadClassFile {
        class_name: String,
        reason: String,
        usage: Location,
    },
    IllegalClassAccess {
        class_name: String,
        access: AccessLevel,
        usage: Location,
    },
    AbstractClassInstantiation {
        class_name: String,
        usage: Location,
    },
    InterfaceInstantiation {
        class_name: String,
        usage: Location,
    },
    MethodNotFound {
        method: MemberReference,
        usage: Location,
    },
    IllegalMethodAccess {
        method: MemberReference,
        access: AccessLevel,
        usage: Location,
    },
    InvokeStaticOnInstanceMethod {
        method: MemberReference,
        usage: Location,
    },
    InvokeInstanceOnStaticMethod {
        method: MemberReference,
        usage: Location,
    },
    AbstractMethodInvocation {
        method: MemberReference,
        usage: Location,
    },
    FieldNotFound {
        field: MemberReference,
        usage: Location,
    },
    IllegalFieldAccess {
        field: MemberReference,
        access: AccessLevel,
        usage: Location,
    },
    StaticAccessOfInstanceField {
        field: MemberReference,
        usage: Location,
    },
    InstanceAccessOfStaticField {
        field: MemberReference,
        usage: Location,
    },
    ChangeFinalField {
        field: MemberReference,
        usage: Location,
    },
    MethodNotImplemented {
        class_name: String,
        method: MemberReference,
    },
    SuperclassBecameInterface {
        class_name: String,
        super_name: String,
    },
    InterfaceBecameClass {
        class_name: String,
        interface_name: String,
    },
    InheritFromFinalClass {
        class_name: String,
        super_name: String,
    },
    MissingMandatoryDependency {
        plugin_id: String,
        dependency_id: String,
        reason: String,
    },
}

impl Problem {
    pub fn level(&self) -> Level {
        Level::Error
    }

    /// Stable rule identifier, also used by remapping policies.
    pub fn kind(&self) -> &'static str {
        match self {
            Problem::ClassNotFound { .. } => "class-not-found",
            Problem::InvalidClassFile { .. } => "invalid-class-file",
            Problem::FailedToReadClassFile { .. } => "failed-to-read-class-file",
            Problem::IllegalClassAccess { .. } => "illegal-class-access",
            Problem::AbstractClassInstantiation { .. } => "abstract-class-instantiation",
            Problem::InterfaceInstantiation { .. } => "interface-instantiation",
            Problem::MethodNotFound { .. } => "method-not-found",
            Problem::IllegalMethodAccess { .. } => "illegal-method-access",
            Problem::InvokeStaticOnInstanceMethod { .. } => "invoke-static-on-instance-method",
            Problem::InvokeInstanceOnStaticMethod { .. } => "invoke-instance-on-static-method",
            Problem::AbstractMethodInvocation { .. } => "abstract-method-invocation",
            Problem::FieldNotFound { .. } => "field-not-found",
            Problem::IllegalFieldAccess { .. } => "illegal-field-access",
            Problem::StaticAccessOfInstanceField { .. } => "static-access-of-instance-field",
            Problem::InstanceAccessOfStaticField { .. } => "instance-access-of-static-field",
            Problem::ChangeFinalField { .. } => "change-final-field",
            Problem::MethodNotImplemented { .. } => "method-not-implemented",
            Problem::SuperclassBecameInterface { .. } => "superclass-became-interface",
            Problem::InterfaceBecameClass { .. } => "interface-became-class",
            Problem::InheritFromFinalClass { .. } => "inherit-from-final-class",
            Problem::MissingMandatoryDependency { .. } => "missing-mandatory-dependency",
        }
    }

    pub fn short_description(&self) -> String {
        match self {
            Problem::ClassNotFound { class_name, .. } => {
                format!("Access to unresolved class {}", java_class_name(class_name))
            }
            Problem::InvalidClassFile { class_name, .. } => {
                format!("Invalid class file {}", java_class_name(class_name))
            }
            Problem::FailedToReadClassFile { class_name, .. } => {
                format!("Failed to read class file {}", java_class_name(class_name))
            }
            Problem::IllegalClassAccess {
                class_name, access, ..
            } => format!(
                "Illegal access to {access} class {}",
                java_class_name(class_name)
            ),
            Problem::AbstractClassInstantiation { class_name, .. } => format!(
                "Instantiation of an abstract class {}",
                java_class_name(class_name)
            ),
            Problem::InterfaceInstantiation { class_name, .. } => format!(
                "Instantiation of an interface {}",
                java_class_name(class_name)
            ),
            Problem::MethodNotFound { method, .. } => {
                format!("Invocation of unresolved method {}", method.render_method())
            }
            Problem::IllegalMethodAccess { method, access, .. } => format!(
                "Illegal invocation of {access} method {}",
                method.render_method()
            ),
            Problem::InvokeStaticOnInstanceMethod { method, .. } => format!(
                "Attempt to execute invokestatic instruction on instance method {}",
                method.render_method()
            ),
            Problem::InvokeInstanceOnStaticMethod { method, .. } => format!(
                "Attempt to execute an instance instruction on static method {}",
                method.render_method()
            ),
            Problem::AbstractMethodInvocation { method, .. } => format!(
                "Attempt to invoke an abstract method {}",
                method.render_method()
            ),
            Problem::FieldNotFound { field, .. } => {
                format!("Access to unresolved field {}", field.render_field())
            }
            Problem::IllegalFieldAccess { field, access, .. } => {
                format!("Illegal access to {access} field {}", field.render_field())
            }
            Problem::StaticAccessOfInstanceField { field, .. } => format!(
                "Attempt to execute static access instruction on instance field {}",
                field.render_field()
            ),
            Problem::InstanceAccessOfStaticField { field, .. } => format!(
                "Attempt to execute instance access instruction on static field {}",
                field.render_field()
            ),
            Problem::ChangeFinalField { field, .. } => {
                format!("Attempt to change a final field {}", field.render_field())
            }
            Problem::MethodNotImplemented { method, .. } => {
                format!("Abstract method {} is not implemented", method.render_method())
            }
            Problem::SuperclassBecameInterface { super_name, .. } => format!(
                "Incompatible change of super class {} to interface",
                java_class_name(super_name)
            ),
            Problem::InterfaceBecameClass { interface_name, .. } => format!(
                "Incompatible change of interface {} to class",
                java_class_name(interface_name)
            ),
            Problem::InheritFromFinalClass { super_name, .. } => format!(
                "Inheritance from a final class {}",
                java_class_name(super_name)
            ),
            Problem::MissingMandatoryDependency { dependency_id, .. } => {
                format!("Missing mandatory dependency {dependency_id}")
            }
        }
    }

    pub fn full_description(&self) -> String {
        match self {
            Problem::ClassNotFound {
                class_name,
                package_missing,
                usage,
            } => {
                let suffix = if *package_missing {
                    format!(
                        " The package '{}' is not found either.",
                        java_class_name(crate::ir::package_of(class_name))
                    )
                } else {
                    String::new()
                };
                format!(
                    "{} references an unresolved class {}. This can lead to **NoSuchClassError** exception at runtime.{suffix}",
                    capitalize(&usage.to_string()),
                    java_class_name(class_name)
                )
            }
            Problem::InvalidClassFile {
                class_name,
                reason,
                usage,
            } => format!(
                "{} references class {} whose class file is invalid: {reason}",
                capitalize(&usage.to_string()),
                java_class_name(class_name)
            ),
            Problem::FailedToReadClassFile {
                class_name,
                reason,
                usage,
            } => format!(
                "{} references class {} which could not be read: {reason}",
                capitalize(&usage.to_string()),
                java_class_name(class_name)
            ),
            Problem::IllegalClassAccess {
                class_name,
                access,
                usage,
            } => format!(
                "{} contains illegal access to {access} class {}. This can lead to **IllegalAccessError** exception at runtime.",
                capitalize(&usage.to_string()),
                java_class_name(class_name)
            ),
            Problem::AbstractClassInstantiation { class_name, usage } => format!(
                "{} has instantiation *new* instruction referencing an abstract class {}. This can lead to **InstantiationError** exception at runtime.",
                capitalize(&usage.to_string()),
                java_class_name(class_name)
            ),
            Problem::InterfaceInstantiation { class_name, usage } => format!(
                "{} has instantiation *new* instruction referencing an interface {}. This can lead to **InstantiationError** exception at runtime.",
                capitalize(&usage.to_string()),
                java_class_name(class_name)
            ),
            Problem::MethodNotFound { method, usage } => format!(
                "{} contains an invocation of method {} that is not declared in the class or any of its ancestors. This can lead to **NoSuchMethodError** exception at runtime.",
                capitalize(&usage.to_string()),
                method.render_method()
            ),
            Problem::IllegalMethodAccess {
                method,
                access,
                usage,
            } => format!(
                "{} contains an invocation of {access} method {}. This can lead to **IllegalAccessError** exception at runtime.",
                capitalize(&usage.to_string()),
                method.render_method()
            ),
            Problem::InvokeStaticOnInstanceMethod { method, usage } => format!(
                "{} contains an *invokestatic* instruction referencing instance method {}. This can lead to **IncompatibleClassChangeError** exception at runtime.",
                capitalize(&usage.to_string()),
                method.render_method()
            ),
            Problem::InvokeInstanceOnStaticMethod { method, usage } => format!(
                "{} contains an instance invocation instruction referencing static method {}. This can lead to **IncompatibleClassChangeError** exception at runtime.",
                capitalize(&usage.to_string()),
                method.render_method()
            ),
            Problem::AbstractMethodInvocation { method, usage } => format!(
                "{} contains an *invokespecial* instruction referencing an abstract method {}. This can lead to **AbstractMethodError** exception at runtime.",
                capitalize(&usage.to_string()),
                method.render_method()
            ),
            Problem::FieldNotFound { field, usage } => format!(
                "{} accesses field {} that is not declared in the class or any of its ancestors. This can lead to **NoSuchFieldError** exception at runtime.",
                capitalize(&usage.to_string()),
                field.render_field()
            ),
            Problem::IllegalFieldAccess {
                field,
                access,
                usage,
            } => format!(
                "{} contains illegal access to {access} field {}. This can lead to **IllegalAccessError** exception at runtime.",
                capitalize(&usage.to_string()),
                field.render_field()
            ),
            Problem::StaticAccessOfInstanceField { field, usage } => format!(
                "{} has static field access instruction referencing an instance field {}. This can lead to **IncompatibleClassChangeError** exception at runtime.",
                capitalize(&usage.to_string()),
                field.render_field()
            ),
            Problem::InstanceAccessOfStaticField { field, usage } => format!(
                "{} has instance field access instruction referencing a static field {}. This can lead to **IncompatibleClassChangeError** exception at runtime.",
                capitalize(&usage.to_string()),
                field.render_field()
            ),
            Problem::ChangeFinalField { field, usage } => format!(
                "{} has modifying instruction for a final field {}. This can lead to **IllegalAccessError** exception at runtime.",
                capitalize(&usage.to_string()),
                field.render_field()
            ),
            Problem::MethodNotImplemented { class_name, method } => format!(
                "Non-abstract class {} inherits from {} but does not implement the abstract method {}. This can lead to **AbstractMethodError** exception at runtime.",
                java_class_name(class_name),
                java_class_name(&method.owner),
                method.render_method()
            ),
            Problem::SuperclassBecameInterface {
                class_name,
                super_name,
            } => format!(
                "Class {} has a *super class* {} which is actually an *interface*. This can lead to **IncompatibleClassChangeError** exception at runtime.",
                java_class_name(class_name),
                java_class_name(super_name)
            ),
            Problem::InterfaceBecameClass {
                class_name,
                interface_name,
            } => format!(
                "Class {} implements an *interface* {} which is actually a *class*. This can lead to **IncompatibleClassChangeError** exception at runtime.",
                java_class_name(class_name),
                java_class_name(interface_name)
            ),
            Problem::InheritFromFinalClass {
                class_name,
                super_name,
            } => format!(
                "Class {} inherits from a final class {}. This can lead to **VerifyError** exception at runtime.",
                java_class_name(class_name),
                java_class_name(super_name)
            ),
            Problem::MissingMandatoryDependency {
                plugin_id,
                dependency_id,
                reason,
            } => format!(
                "Plugin {plugin_id} declares a mandatory dependency on {dependency_id} which cannot be resolved: {reason}"
            ),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_description())
    }
}

/// Non-fatal findings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    MissingOptionalDependency {
        plugin_id: String,
        dependency_id: String,
        reason: String,
    },
    /// A problem downgraded by a remapping policy.
    RemappedProblem {
        problem: Box<Problem>,
        unacceptable: bool,
    },
}

impl Warning {
    pub fn level(&self) -> Level {
        Level::Warning
    }

    pub fn short_description(&self) -> String {
        match self {
            Warning::MissingOptionalDependency { dependency_id, .. } => {
                format!("Missing optional dependency {dependency_id}")
            }
            Warning::RemappedProblem { problem, .. } => problem.short_description(),
        }
    }

    pub fn full_description(&self) -> String {
        match self {
            Warning::MissingOptionalDependency {
                plugin_id,
                dependency_id,
                reason,
            } => format!(
                "Plugin {plugin_id} declares an optional dependency on {dependency_id} which cannot be resolved: {reason}"
            ),
            Warning::RemappedProblem { problem, .. } => problem.full_description(),
        }
    }
}

/// How the referenced API was reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceOrigin {
    Bytecode,
    Reflection,
}

/// The API element a usage points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ApiElement {
    Class { class_name: String },
    Method { method: MemberReference },
    Field { field: MemberReference },
}

impl fmt::Display for ApiElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiElement::Class { class_name } => write!(f, "class {}", java_class_name(class_name)),
            ApiElement::Method { method } => write!(f, "method {}", method.render_method()),
            ApiElement::Field { field } => write!(f, "field {}", field.render_field()),
        }
    }
}

/// One classified usage of an API element from plugin code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ApiUsage {
    pub api: ApiElement,
    pub usage: Location,
    pub origin: ReferenceOrigin,
}

impl ApiUsage {
    pub fn short_description(&self, category: &str) -> String {
        let api = self.api.to_string();
        format!("{} {category} {api}", capitalize(self.action()))
    }

    pub fn full_description(&self, category: &str) -> String {
        let via = match self.origin {
            ReferenceOrigin::Bytecode => "",
            ReferenceOrigin::Reflection => " via reflection",
        };
        format!(
            "{} {} {category} {}{via}.",
            capitalize(&self.usage.to_string()),
            self.action(),
            self.api
        )
    }

    fn action(&self) -> &'static str {
        match self.api {
            ApiElement::Class { .. } => "references",
            ApiElement::Method { .. } => "invokes",
            ApiElement::Field { .. } => "accesses",
        }
    }
}

/// Usage of a deprecated API element.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DeprecatedApiUsage {
    #[serde(flatten)]
    pub usage: ApiUsage,
    pub for_removal: bool,
}

impl DeprecatedApiUsage {
    pub fn short_description(&self) -> String {
        let category = if self.for_removal {
            "scheduled for removal"
        } else {
            "deprecated"
        };
        self.usage.short_description(category)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
