use std::collections::BTreeSet;
use std::sync::Arc;

use crate::checks::CheckContext;
use crate::hierarchy::{ResolvedField, ResolvedMethod};
use crate::ir::ClassFile;
use crate::usage::annotations::has_effective_annotation;
use crate::usage::{ApiUsageFilter, UsageSite};

/// Allows usages of elements that come from the caller's own origin.
///
/// Elements that effectively carry the cross-origin marker are never allowed, so their usages
/// are classified even from inside the origin that declares them.
pub struct SameOriginFilter {
    cross_origin_marker: String,
}

impl SameOriginFilter {
    pub fn new(cross_origin_marker: &str) -> Self {
        Self {
            cross_origin_marker: cross_origin_marker.to_string(),
        }
    }

    fn allows(
        &self,
        declaring: &ClassFile,
        member: Option<&BTreeSet<String>>,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        declaring.origin == site.caller.origin
            && !has_effective_annotation(context.resolver, declaring, member, &self.cross_origin_marker)
    }
}

impl ApiUsageFilter for SameOriginFilter {
    fn allow_class_usage(
        &self,
        target: &Arc<ClassFile>,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.allows(target, None, site, context)
    }

    fn allow_method_usage(
        &self,
        method: &ResolvedMethod,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.allows(&method.class, Some(&method.method().annotations), site, context)
    }

    fn allow_field_usage(
        &self,
        field: &ResolvedField,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.allows(&field.class, Some(&field.field().annotations), site, context)
    }
}

/// Allows every usage made from a caller that opted in with an annotation on the calling
/// method, the calling class, an enclosing class or the package.
pub struct CallerAnnotationFilter {
    annotation: String,
}

impl CallerAnnotationFilter {
    pub fn new(annotation: &str) -> Self {
        Self {
            annotation: annotation.to_string(),
        }
    }

    fn caller_opted_in(&self, site: &UsageSite<'_>, context: &CheckContext<'_>) -> bool {
        has_effective_annotation(
            context.resolver,
            site.caller,
            site.method.map(|method| &method.annotations),
            &self.annotation,
        )
    }
}

impl ApiUsageFilter for CallerAnnotationFilter {
    fn allow_class_usage(
        &self,
        _target: &Arc<ClassFile>,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.caller_opted_in(site, context)
    }

    fn allow_method_usage(
        &self,
        _method: &ResolvedMethod,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.caller_opted_in(site, context)
    }

    fn allow_field_usage(
        &self,
        _field: &ResolvedField,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.caller_opted_in(site, context)
    }
}

/// Allows a usage when any of its filters does.
pub struct AnyOfFilter {
    filters: Vec<Box<dyn ApiUsageFilter>>,
}

impl AnyOfFilter {
    pub fn new(filters: Vec<Box<dyn ApiUsageFilter>>) -> Self {
        Self { filters }
    }
}

impl ApiUsageFilter for AnyOfFilter {
    fn allow_class_usage(
        &self,
        target: &Arc<ClassFile>,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.allow_class_usage(target, site, context))
    }

    fn allow_method_usage(
        &self,
        method: &ResolvedMethod,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.allow_method_usage(method, site, context))
    }

    fn allow_field_usage(
        &self,
        field: &ResolvedField,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.allow_field_usage(field, site, context))
    }
}
