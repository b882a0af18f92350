use std::sync::Arc;

use crate::checks::CheckContext;
use crate::config::VerifierConfig;
use crate::diagnostics::{Location, ReferenceOrigin};
use crate::hierarchy::{
    declared_method, field_named, found_class, methods_named, resolve_class_method, resolve_field,
    resolve_interface_method, HierarchyWalker, MemberLookup, ResolvedField, ResolvedMethod,
};
use crate::interpreter::interpret;
use crate::ir::{CallKind, CallSite, ClassFile, FieldAccessSite, InstructionKind, MethodFile};

pub mod annotations;
pub mod filters;
pub mod processors;
pub mod reflection;

pub use annotations::{find_effective_annotation, has_effective_annotation, AnnotationHit, AnnotationScope};
pub use filters::{AnyOfFilter, CallerAnnotationFilter, SameOriginFilter};
pub use processors::{
    DeprecatedUsageProcessor, DiscouragedJdkProcessor, MarkerCategory, MarkerUsageProcessor,
    NonExtendableProcessor, OverrideOnlyProcessor,
};
pub use reflection::{ReflectionListener, ReflectiveTarget};

/// Where in plugin code a usage happens.
#[derive(Clone, Copy, Debug)]
pub struct UsageSite<'a> {
    pub caller: &'a Arc<ClassFile>,
    /// `None` for class-level usages such as `extends` clauses.
    pub method: Option<&'a MethodFile>,
    pub origin: ReferenceOrigin,
}

impl UsageSite<'_> {
    pub fn location(&self) -> Location {
        match self.method {
            Some(method) => Location::method(&self.caller.name, &method.name, &method.descriptor),
            None => Location::class(&self.caller.name),
        }
    }
}

/// How a class is referenced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassUsageKind {
    Reference,
    Extends,
    Implements,
}

/// Receives resolved usages of API elements from plugin code.
///
/// Every method defaults to ignoring the event.
pub trait ApiUsageProcessor: Send + Sync {
    fn process_class_reference(
        &self,
        _target: &Arc<ClassFile>,
        _kind: ClassUsageKind,
        _site: &UsageSite<'_>,
        _context: &CheckContext<'_>,
    ) {
    }

    fn process_method_invocation(
        &self,
        _method: &ResolvedMethod,
        _kind: CallKind,
        _site: &UsageSite<'_>,
        _context: &CheckContext<'_>,
    ) {
    }

    fn process_field_access(
        &self,
        _field: &ResolvedField,
        _site: &UsageSite<'_>,
        _context: &CheckContext<'_>,
    ) {
    }

    /// `overriding` is declared by `site.caller` and overrides `overridden`.
    fn process_method_override(
        &self,
        _overriding: &MethodFile,
        _overridden: &ResolvedMethod,
        _site: &UsageSite<'_>,
        _context: &CheckContext<'_>,
    ) {
    }
}

/// Decides whether a usage is allowed, which suppresses it before classification.
pub trait ApiUsageFilter: Send + Sync {
    fn allow_class_usage(
        &self,
        _target: &Arc<ClassFile>,
        _site: &UsageSite<'_>,
        _context: &CheckContext<'_>,
    ) -> bool {
        false
    }

    fn allow_method_usage(
        &self,
        _method: &ResolvedMethod,
        _site: &UsageSite<'_>,
        _context: &CheckContext<'_>,
    ) -> bool {
        false
    }

    fn allow_field_usage(
        &self,
        _field: &ResolvedField,
        _site: &UsageSite<'_>,
        _context: &CheckContext<'_>,
    ) -> bool {
        false
    }
}

/// Forwards a usage to `processor` only when `filter` does not allow it.
pub struct FilteringApiUsageProcessor<P, F> {
    processor: P,
    filter: F,
}

impl<P, F> FilteringApiUsageProcessor<P, F> {
    pub fn new(processor: P, filter: F) -> Self {
        Self { processor, filter }
    }
}

impl<P: ApiUsageProcessor, F: ApiUsageFilter> ApiUsageProcessor for FilteringApiUsageProcessor<P, F> {
    fn process_class_reference(
        &self,
        target: &Arc<ClassFile>,
        kind: ClassUsageKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if !self.filter.allow_class_usage(target, site, context) {
            self.processor.process_class_reference(target, kind, site, context);
        }
    }

    fn process_method_invocation(
        &self,
        method: &ResolvedMethod,
        kind: CallKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if !self.filter.allow_method_usage(method, site, context) {
            self.processor.process_method_invocation(method, kind, site, context);
        }
    }

    fn process_field_access(
        &self,
        field: &ResolvedField,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if !self.filter.allow_field_usage(field, site, context) {
            self.processor.process_field_access(field, site, context);
        }
    }

    fn process_method_override(
        &self,
        overriding: &MethodFile,
        overridden: &ResolvedMethod,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if !self.filter.allow_method_usage(overridden, site, context) {
            self.processor
                .process_method_override(overriding, overridden, site, context);
        }
    }
}

/// Scans plugin classes and feeds every resolved usage to the processors.
///
/// Resolution here is quiet: unresolved references are reported by the reference checks, not
/// by the pipeline.
pub struct UsagePipeline {
    processors: Vec<Box<dyn ApiUsageProcessor>>,
}

impl UsagePipeline {
    pub fn new(processors: Vec<Box<dyn ApiUsageProcessor>>) -> Self {
        Self { processors }
    }

    /// Every built-in classification, configured from `config`.
    pub fn standard(config: &VerifierConfig) -> Self {
        let same_origin = || SameOriginFilter::new(&config.cross_origin_check_annotation);
        let mut internal_annotations = config.internal_annotations.clone();
        internal_annotations.sort();
        Self::new(vec![
            Box::new(FilteringApiUsageProcessor::new(
                DeprecatedUsageProcessor::new(
                    &config.deprecated_annotation,
                    &config.scheduled_for_removal_annotation,
                ),
                same_origin(),
            )),
            Box::new(FilteringApiUsageProcessor::new(
                MarkerUsageProcessor::new(
                    MarkerCategory::Experimental,
                    vec![config.experimental_annotation.clone()],
                ),
                AnyOfFilter::new(vec![
                    Box::new(same_origin()),
                    Box::new(CallerAnnotationFilter::new(&config.experimental_opt_in_annotation)),
                ]),
            )),
            Box::new(FilteringApiUsageProcessor::new(
                MarkerUsageProcessor::new(MarkerCategory::Internal, internal_annotations),
                same_origin(),
            )),
            Box::new(FilteringApiUsageProcessor::new(
                OverrideOnlyProcessor::new(&config.override_only_annotation),
                same_origin(),
            )),
            Box::new(FilteringApiUsageProcessor::new(
                NonExtendableProcessor::new(&config.non_extendable_annotation),
                same_origin(),
            )),
            Box::new(DiscouragedJdkProcessor),
        ])
    }

    pub fn scan_class(&self, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        let class_site = UsageSite {
            caller: class,
            method: None,
            origin: ReferenceOrigin::Bytecode,
        };
        if let Some(super_name) = &class.super_name {
            if let Some(parent) = found_class(context.resolver, super_name) {
                self.class_reference(&parent, ClassUsageKind::Extends, &class_site, context);
            }
        }
        for interface in &class.interfaces {
            if let Some(parent) = found_class(context.resolver, interface) {
                self.class_reference(&parent, ClassUsageKind::Implements, &class_site, context);
            }
        }

        for method in &class.methods {
            let site = UsageSite {
                caller: class,
                method: Some(method),
                origin: ReferenceOrigin::Bytecode,
            };
            self.scan_overrides(method, &site, context);
            self.scan_instructions(method, &site, context);
            self.scan_reflection(method, class, context);
        }
    }

    fn scan_overrides(&self, method: &MethodFile, site: &UsageSite<'_>, context: &CheckContext<'_>) {
        if method.is_static() || method.is_private() || method.is_constructor() {
            return;
        }
        let mut overridden = Vec::new();
        HierarchyWalker::new(true).visit_class(
            site.caller,
            false,
            |name| found_class(context.resolver, name),
            |parent| match declared_method(parent, &method.name, &method.descriptor) {
                Some(resolved) if !resolved.method().is_static() && !resolved.method().is_private() => {
                    overridden.push(resolved);
                    false
                }
                _ => true,
            },
            |_| {},
        );
        for parent_method in &overridden {
            for processor in &self.processors {
                processor.process_method_override(method, parent_method, site, context);
            }
        }
    }

    fn scan_instructions(&self, method: &MethodFile, site: &UsageSite<'_>, context: &CheckContext<'_>) {
        for instruction in &method.instructions {
            match &instruction.kind {
                InstructionKind::TypeReference(name) | InstructionKind::ConstClass(name) => {
                    if let Some(target) = quiet_class(name, context) {
                        self.class_reference(&target, ClassUsageKind::Reference, site, context);
                    }
                }
                InstructionKind::Invoke(call) => {
                    if let Some(resolved) = quiet_method(call, context) {
                        self.method_invocation(&resolved, call.kind, site, context);
                    }
                }
                InstructionKind::FieldAccess(access) => {
                    if let Some(resolved) = quiet_field(access, context) {
                        self.field_access(&resolved, site, context);
                    }
                }
                InstructionKind::ConstString(_)
                | InstructionKind::ConstInt(_)
                | InstructionKind::Other(_) => {}
            }
        }
    }

    fn scan_reflection(&self, method: &MethodFile, class: &Arc<ClassFile>, context: &CheckContext<'_>) {
        let mut listener = ReflectionListener::default();
        if let Err(err) = interpret(method, &mut listener) {
            log::debug!("skipping reflection scan of {}.{}: {err:#}", class.name, method.name);
            return;
        }
        let site = UsageSite {
            caller: class,
            method: Some(method),
            origin: ReferenceOrigin::Reflection,
        };
        for target in listener.into_targets() {
            match target {
                ReflectiveTarget::Class(name) => {
                    if let Some(target) = quiet_class(&name, context) {
                        self.class_reference(&target, ClassUsageKind::Reference, &site, context);
                    }
                }
                ReflectiveTarget::Method { class_name, name } => {
                    for resolved in reflective_methods(&class_name, &name, context) {
                        self.method_invocation(&resolved, CallKind::Virtual, &site, context);
                    }
                }
                ReflectiveTarget::Field { class_name, name } => {
                    if let Some(resolved) = reflective_field(&class_name, &name, context) {
                        self.field_access(&resolved, &site, context);
                    }
                }
            }
        }
    }

    fn class_reference(
        &self,
        target: &Arc<ClassFile>,
        kind: ClassUsageKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        for processor in &self.processors {
            processor.process_class_reference(target, kind, site, context);
        }
    }

    fn method_invocation(
        &self,
        method: &ResolvedMethod,
        kind: CallKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        for processor in &self.processors {
            processor.process_method_invocation(method, kind, site, context);
        }
    }

    fn field_access(&self, field: &ResolvedField, site: &UsageSite<'_>, context: &CheckContext<'_>) {
        for processor in &self.processors {
            processor.process_field_access(field, site, context);
        }
    }
}

fn quiet_class(name: &str, context: &CheckContext<'_>) -> Option<Arc<ClassFile>> {
    if name.starts_with('[') {
        return None;
    }
    found_class(context.resolver, name)
}

fn quiet_method(call: &CallSite, context: &CheckContext<'_>) -> Option<ResolvedMethod> {
    let owner = quiet_class(&call.owner, context)?;
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
    match lookup {
        MemberLookup::Found(resolved) => Some(resolved),
        MemberLookup::NotFound | MemberLookup::Incomplete => None,
    }
}

fn quiet_field(access: &FieldAccessSite, context: &CheckContext<'_>) -> Option<ResolvedField> {
    let owner = quiet_class(&access.owner, context)?;
    match resolve_field(context.resolver, &owner, &access.name, &access.descriptor) {
        MemberLookup::Found(resolved) => Some(resolved),
        MemberLookup::NotFound | MemberLookup::Incomplete => None,
    }
}

/// Methods named `name` declared by the closest class in the hierarchy of `class_name` that
/// declares any.
fn reflective_methods(class_name: &str, name: &str, context: &CheckContext<'_>) -> Vec<ResolvedMethod> {
    let Some(class) = quiet_class(class_name, context) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    HierarchyWalker::new(true).visit_class(
        &class,
        true,
        |parent| found_class(context.resolver, parent),
        |node| {
            if !found.is_empty() {
                return false;
            }
            found = methods_named(node, name);
            found.is_empty()
        },
        |_| {},
    );
    found
}

fn reflective_field(class_name: &str, name: &str, context: &CheckContext<'_>) -> Option<ResolvedField> {
    let class = quiet_class(class_name, context)?;
    let mut found = None;
    HierarchyWalker::new(true).visit_class(
        &class,
        true,
        |parent| found_class(context.resolver, parent),
        |node| {
            if found.is_none() {
                found = field_named(node, name);
            }
            found.is_none()
        },
        |_| {},
    );
    found
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::checks::CheckContext;
    use crate::config::VerifierConfig;
    use crate::diagnostics::{CollectingRegistrar, Diagnostics};
    use crate::ir::ClassFile;
    use crate::resolver::{Resolver, UnionResolver};
    use crate::source::MemorySource;
    use crate::testing::{platform_origin, plugin_origin, ClassBuilder};

    use super::UsagePipeline;

    /// Runs the standard pipeline over the first of `plugin` against `platform`.
    pub(crate) fn scan(plugin: Vec<ClassFile>, platform: Vec<ClassFile>) -> Diagnostics {
        let config = VerifierConfig::default();
        scan_with(&config, plugin, platform)
    }

    pub(crate) fn scan_with(
        config: &VerifierConfig,
        plugin: Vec<ClassFile>,
        platform: Vec<ClassFile>,
    ) -> Diagnostics {
        let target = plugin.first().map(|class| class.name.clone()).unwrap_or_default();
        let mut plugin_source = MemorySource::new(plugin_origin());
        for class in plugin {
            plugin_source = plugin_source.with_class(class);
        }
        let mut platform_source =
            MemorySource::new(platform_origin()).with_class(ClassBuilder::object().build());
        for class in platform {
            platform_source = platform_source.with_class(class);
        }
        let resolver = UnionResolver::new(vec![
            Arc::new(plugin_source) as Arc<dyn Resolver>,
            Arc::new(platform_source),
        ]);
        let registrar = CollectingRegistrar::new();
        let context = CheckContext {
            resolver: &resolver,
            registrar: &registrar,
            config,
        };
        let class = resolver
            .resolve_class(&target)
            .into_found()
            .expect("plugin class resolves");
        UsagePipeline::standard(config).scan_class(&class, &context);
        registrar.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::scan;
    use super::*;
    use crate::diagnostics::{ApiElement, ApiUsage, MemberReference};
    use crate::testing::{ClassBuilder, MethodBuilder};

    const INTERNAL: &str = "org/jetbrains/annotations/ApiStatus$Internal";

    fn internal_service() -> ClassFile {
        ClassBuilder::new("api/Service")
            .method(MethodBuilder::new("hidden", "()V").annotation(INTERNAL))
            .build()
    }

    fn caller(owner: &str) -> ClassFile {
        ClassBuilder::new("p/Caller")
            .method(MethodBuilder::new("run", "()V").invoke(CallKind::Virtual, owner, "hidden", "()V"))
            .build()
    }

    #[test]
    fn internal_call_across_origins_is_reported() {
        let diagnostics = scan(vec![caller("api/Service")], vec![internal_service()]);

        assert_eq!(
            diagnostics.internal_usages,
            vec![ApiUsage {
                api: ApiElement::Method {
                    method: MemberReference::new("api/Service", "hidden", "()V"),
                },
                usage: Location::method("p/Caller", "run", "()V"),
                origin: ReferenceOrigin::Bytecode,
            }]
        );
    }

    #[test]
    fn internal_call_within_one_origin_is_not_reported() {
        let plugin_service = ClassBuilder::new("p/Service")
            .method(MethodBuilder::new("hidden", "()V").annotation(INTERNAL))
            .build();

        let diagnostics = scan(vec![caller("p/Service"), plugin_service], Vec::new());

        assert!(diagnostics.internal_usages.is_empty());
    }

    #[test]
    fn cross_origin_marker_disables_the_same_origin_exemption() {
        let plugin_service = ClassBuilder::new("p/Service")
            .annotation(&VerifierConfig::default().cross_origin_check_annotation)
            .method(MethodBuilder::new("hidden", "()V").annotation(INTERNAL))
            .build();

        let diagnostics = scan(vec![caller("p/Service"), plugin_service], Vec::new());

        assert_eq!(diagnostics.internal_usages.len(), 1);
    }

    #[test]
    fn unresolved_references_are_ignored_quietly() {
        let diagnostics = scan(vec![caller("gone/Service")], Vec::new());

        assert!(diagnostics.is_empty());
    }

    #[test]
    fn array_owners_are_skipped() {
        let diagnostics = scan(vec![caller("[Lapi/Service;")], vec![internal_service()]);

        assert!(diagnostics.is_empty());
    }

    struct Counting<'a>(&'a std::sync::atomic::AtomicUsize);

    impl ApiUsageProcessor for Counting<'_> {
        fn process_method_invocation(
            &self,
            _method: &ResolvedMethod,
            _kind: CallKind,
            _site: &UsageSite<'_>,
            _context: &CheckContext<'_>,
        ) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    struct AllowAll;

    impl ApiUsageFilter for AllowAll {
        fn allow_method_usage(
            &self,
            _method: &ResolvedMethod,
            _site: &UsageSite<'_>,
            _context: &CheckContext<'_>,
        ) -> bool {
            true
        }
    }

    #[test]
    fn filter_that_allows_suppresses_the_processor() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let class = Arc::new(ClassBuilder::new("p/Caller").build());
        let method = Arc::new(
            ClassBuilder::new("api/Service")
                .method(MethodBuilder::new("run", "()V"))
                .build(),
        );
        let resolved = declared_method(&method, "run", "()V").expect("method");
        let resolver = crate::source::MemorySource::new(crate::testing::plugin_origin());
        let registrar = crate::diagnostics::CollectingRegistrar::new();
        let config = VerifierConfig::default();
        let context = CheckContext {
            resolver: &resolver,
            registrar: &registrar,
            config: &config,
        };
        let site = UsageSite {
            caller: &class,
            method: None,
            origin: ReferenceOrigin::Bytecode,
        };
        let count = AtomicUsize::new(0);

        FilteringApiUsageProcessor::new(Counting(&count), AllowAll)
            .process_method_invocation(&resolved, CallKind::Virtual, &site, &context);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        struct AllowNone;
        impl ApiUsageFilter for AllowNone {}
        FilteringApiUsageProcessor::new(Counting(&count), AllowNone)
            .process_method_invocation(&resolved, CallKind::Virtual, &site, &context);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
