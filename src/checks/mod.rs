use std::sync::Arc;

use crate::config::VerifierConfig;
use crate::diagnostics::{Location, Problem, Registrar};
use crate::ir::{package_of, ClassFile};
use crate::resolver::{ResolutionResult, Resolver};

pub(crate) mod abstract_methods;
pub(crate) mod access;
pub(crate) mod inheritance;
pub(crate) mod references;

pub use abstract_methods::AbstractMethodsCheck;
pub use access::SuperTypeAccessCheck;
pub use inheritance::{InheritFromFinalCheck, InterfaceBecameClassCheck, SuperclassBecameInterfaceCheck};
pub use references::ReferencesCheck;

/// Metadata describing a check.
#[derive(Clone, Debug)]
pub struct CheckMetadata {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Everything a check may consult while verifying one class.
pub struct CheckContext<'a> {
    pub resolver: &'a dyn Resolver,
    pub registrar: &'a dyn Registrar,
    pub config: &'a VerifierConfig,
}

/// A check over one plugin class. Checks never mutate the class universe and only report
/// through the registrar, so they can run in any order.
pub trait ClassCheck: Send + Sync {
    fn metadata(&self) -> CheckMetadata;
    fn verify(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>);
}

/// Every built-in check, in a fixed order.
pub fn default_checks() -> Vec<Box<dyn ClassCheck>> {
    vec![
        Box::new(SuperclassBecameInterfaceCheck),
        Box::new(InterfaceBecameClassCheck),
        Box::new(InheritFromFinalCheck),
        Box::new(AbstractMethodsCheck),
        Box::new(SuperTypeAccessCheck),
        Box::new(ReferencesCheck),
    ]
}

/// Resolves a class referenced from plugin code, reporting failures at `usage`.
///
/// Returns `None` when the class did not resolve; external classes are skipped silently.
pub(crate) fn resolve_referenced_class(
    class_name: &str,
    usage: &Location,
    context: &CheckContext<'_>,
) -> Option<Arc<ClassFile>> {
    match context.resolver.resolve_class(class_name) {
        ResolutionResult::Found(class) => Some(class),
        ResolutionResult::ExternalClass => None,
        ResolutionResult::NotFound => {
            let package_missing = !context.resolver.contains_package(package_of(class_name));
            context.registrar.register_problem(Problem::ClassNotFound {
                class_name: class_name.to_string(),
                package_missing,
                usage: usage.clone(),
            });
            None
        }
        ResolutionResult::InvalidBinary(reason) => {
            context.registrar.register_problem(Problem::InvalidClassFile {
                class_name: class_name.to_string(),
                reason,
                usage: usage.clone(),
            });
            None
        }
        ResolutionResult::ReadFailure(reason) => {
            context.registrar.register_problem(Problem::FailedToReadClassFile {
                class_name: class_name.to_string(),
                reason,
                usage: usage.clone(),
            });
            None
        }
    }
}
