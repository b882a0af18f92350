use std::collections::BTreeSet;

use crate::hierarchy::found_class;
use crate::ir::{package_of, ClassFile};
use crate::resolver::Resolver;

const PACKAGE_INFO: &str = "package-info";

/// Where an effective annotation was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnotationScope {
    Member,
    Class(String),
    Package(String),
}

/// An annotation considered present on an element, with the scope that supplied it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationHit {
    pub annotation: String,
    pub scope: AnnotationScope,
}

fn first_match<F: Fn(&str) -> bool>(annotations: &BTreeSet<String>, matches: &F) -> Option<String> {
    annotations
        .iter()
        .find(|annotation| matches(annotation.as_str()))
        .cloned()
}

/// Searches the annotation scopes of an element, closest first: the member itself, the
/// declaring class and its enclosing classes, then the package marker class.
///
/// `member` is `None` when the element is the class itself. The enclosing chain stops at the
/// first enclosing class that cannot be resolved.
pub fn find_effective_annotation<F: Fn(&str) -> bool>(
    resolver: &dyn Resolver,
    class: &ClassFile,
    member: Option<&BTreeSet<String>>,
    matches: F,
) -> Option<AnnotationHit> {
    if let Some(annotations) = member {
        if let Some(annotation) = first_match(annotations, &matches) {
            return Some(AnnotationHit {
                annotation,
                scope: AnnotationScope::Member,
            });
        }
    }

    if let Some(annotation) = first_match(&class.annotations, &matches) {
        return Some(AnnotationHit {
            annotation,
            scope: AnnotationScope::Class(class.name.clone()),
        });
    }
    let mut enclosing = class.outer_class_name().map(str::to_string);
    while let Some(name) = enclosing {
        let Some(outer) = found_class(resolver, &name) else {
            break;
        };
        if let Some(annotation) = first_match(&outer.annotations, &matches) {
            return Some(AnnotationHit {
                annotation,
                scope: AnnotationScope::Class(outer.name.clone()),
            });
        }
        enclosing = outer.outer_class_name().map(str::to_string);
    }

    let package = package_of(&class.name);
    let marker = if package.is_empty() {
        PACKAGE_INFO.to_string()
    } else {
        format!("{package}/{PACKAGE_INFO}")
    };
    let package_info = found_class(resolver, &marker)?;
    first_match(&package_info.annotations, &matches).map(|annotation| AnnotationHit {
        annotation,
        scope: AnnotationScope::Package(package.to_string()),
    })
}

/// Convenience wrapper for a single annotation name.
pub fn has_effective_annotation(
    resolver: &dyn Resolver,
    class: &ClassFile,
    member: Option<&BTreeSet<String>>,
    annotation: &str,
) -> bool {
    find_effective_annotation(resolver, class, member, |name| name == annotation).is_some()
}
