use std::collections::BTreeSet;
use std::sync::Arc;

use crate::checks::CheckContext;
use crate::diagnostics::{ApiElement, ApiUsage, DeprecatedApiUsage, MemberReference, Registrar};
use crate::hierarchy::{ResolvedField, ResolvedMethod};
use crate::ir::{CallKind, ClassFile, MethodFile, Modifiers};
use crate::usage::annotations::{find_effective_annotation, has_effective_annotation};
use crate::usage::{ApiUsageProcessor, ClassUsageKind, UsageSite};

fn class_element(class: &ClassFile) -> ApiElement {
    ApiElement::Class {
        class_name: class.name.clone(),
    }
}

fn method_element(method: &ResolvedMethod) -> ApiElement {
    let declared = method.method();
    ApiElement::Method {
        method: MemberReference::new(&method.class.name, &declared.name, &declared.descriptor),
    }
}

fn field_element(field: &ResolvedField) -> ApiElement {
    let declared = field.field();
    ApiElement::Field {
        field: MemberReference::new(&field.class.name, &declared.name, &declared.descriptor),
    }
}

fn usage_of(api: ApiElement, site: &UsageSite<'_>) -> ApiUsage {
    ApiUsage {
        api,
        usage: site.location(),
        origin: site.origin,
    }
}

/// Reports usages of deprecated elements, including those deprecated through an enclosing
/// class or the package.
pub struct DeprecatedUsageProcessor {
    deprecated: String,
    scheduled_for_removal: String,
}

impl DeprecatedUsageProcessor {
    pub fn new(deprecated: &str, scheduled_for_removal: &str) -> Self {
        Self {
            deprecated: deprecated.to_string(),
            scheduled_for_removal: scheduled_for_removal.to_string(),
        }
    }

    /// `Some(for_removal)` when the element is deprecated.
    fn deprecation(
        &self,
        class: &ClassFile,
        member: Option<(&BTreeSet<String>, Modifiers)>,
        context: &CheckContext<'_>,
    ) -> Option<bool> {
        let flagged = match member {
            Some((_, modifiers)) => modifiers.contains(Modifiers::DEPRECATED),
            None => class.is_deprecated(),
        };
        let annotations = member.map(|(annotations, _)| annotations);
        let annotated = find_effective_annotation(context.resolver, class, annotations, |name| {
            name == self.deprecated || name == self.scheduled_for_removal
        })
        .is_some();
        if !flagged && !annotated {
            return None;
        }
        Some(has_effective_annotation(
            context.resolver,
            class,
            annotations,
            &self.scheduled_for_removal,
        ))
    }

    fn register(&self, api: ApiElement, for_removal: bool, site: &UsageSite<'_>, context: &CheckContext<'_>) {
        context.registrar.register_deprecated_usage(DeprecatedApiUsage {
            usage: usage_of(api, site),
            for_removal,
        });
    }
}

impl ApiUsageProcessor for DeprecatedUsageProcessor {
    fn process_class_reference(
        &self,
        target: &Arc<ClassFile>,
        _kind: ClassUsageKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if let Some(for_removal) = self.deprecation(target, None, context) {
            self.register(class_element(target), for_removal, site, context);
        }
    }

    fn process_method_invocation(
        &self,
        method: &ResolvedMethod,
        _kind: CallKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        let declared = method.method();
        let member = Some((&declared.annotations, declared.modifiers));
        if let Some(for_removal) = self.deprecation(&method.class, member, context) {
            self.register(method_element(method), for_removal, site, context);
        }
    }

    fn process_field_access(
        &self,
        field: &ResolvedField,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        let declared = field.field();
        let member = Some((&declared.annotations, declared.modifiers));
        if let Some(for_removal) = self.deprecation(&field.class, member, context) {
            self.register(field_element(field), for_removal, site, context);
        }
    }

    fn process_method_override(
        &self,
        _overriding: &MethodFile,
        overridden: &ResolvedMethod,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        self.process_method_invocation(overridden, CallKind::Virtual, site, context);
    }
}

/// Usage categories driven purely by a marker annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerCategory {
    Experimental,
    Internal,
}

impl MarkerCategory {
    fn register(self, registrar: &dyn Registrar, usage: ApiUsage) {
        match self {
            MarkerCategory::Experimental => registrar.register_experimental_usage(usage),
            MarkerCategory::Internal => registrar.register_internal_usage(usage),
        }
    }
}

/// Reports usages of elements effectively annotated with any of the marker annotations.
pub struct MarkerUsageProcessor {
    category: MarkerCategory,
    annotations: Vec<String>,
}

impl MarkerUsageProcessor {
    pub fn new(category: MarkerCategory, annotations: Vec<String>) -> Self {
        Self {
            category,
            annotations,
        }
    }

    fn is_marked(
        &self,
        class: &ClassFile,
        member: Option<&BTreeSet<String>>,
        context: &CheckContext<'_>,
    ) -> bool {
        find_effective_annotation(context.resolver, class, member, |name| {
            self.annotations.iter().any(|annotation| annotation == name)
        })
        .is_some()
    }
}

impl ApiUsageProcessor for MarkerUsageProcessor {
    fn process_class_reference(
        &self,
        target: &Arc<ClassFile>,
        _kind: ClassUsageKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if self.is_marked(target, None, context) {
            self.category
                .register(context.registrar, usage_of(class_element(target), site));
        }
    }

    fn process_method_invocation(
        &self,
        method: &ResolvedMethod,
        _kind: CallKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if self.is_marked(&method.class, Some(&method.method().annotations), context) {
            self.category
                .register(context.registrar, usage_of(method_element(method), site));
        }
    }

    fn process_field_access(
        &self,
        field: &ResolvedField,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if self.is_marked(&field.class, Some(&field.field().annotations), context) {
            self.category
                .register(context.registrar, usage_of(field_element(field), site));
        }
    }

    fn process_method_override(
        &self,
        _overriding: &MethodFile,
        overridden: &ResolvedMethod,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        self.process_method_invocation(overridden, CallKind::Virtual, site, context);
    }
}

/// Reports direct invocations of methods that plugins may only override.
///
/// A `super` call from the overriding method itself is allowed.
pub struct OverrideOnlyProcessor {
    annotation: String,
}

impl OverrideOnlyProcessor {
    pub fn new(annotation: &str) -> Self {
        Self {
            annotation: annotation.to_string(),
        }
    }
}

impl ApiUsageProcessor for OverrideOnlyProcessor {
    fn process_method_invocation(
        &self,
        method: &ResolvedMethod,
        kind: CallKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        let declared = method.method();
        if declared.is_constructor() || declared.is_static() {
            return;
        }
        let is_super_call = kind == CallKind::Special
            && site.method.is_some_and(|caller| {
                caller.name == declared.name && caller.descriptor == declared.descriptor
            });
        if is_super_call {
            return;
        }
        if has_effective_annotation(
            context.resolver,
            &method.class,
            Some(&declared.annotations),
            &self.annotation,
        ) {
            context
                .registrar
                .register_override_only_usage(usage_of(method_element(method), site));
        }
    }
}

/// Reports plugin classes extending or implementing non-extendable types, and plugin methods
/// overriding non-extendable methods.
pub struct NonExtendableProcessor {
    annotation: String,
}

impl NonExtendableProcessor {
    pub fn new(annotation: &str) -> Self {
        Self {
            annotation: annotation.to_string(),
        }
    }
}

impl ApiUsageProcessor for NonExtendableProcessor {
    fn process_class_reference(
        &self,
        target: &Arc<ClassFile>,
        kind: ClassUsageKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if kind == ClassUsageKind::Reference || !target.has_annotation(&self.annotation) {
            return;
        }
        context
            .registrar
            .register_non_extendable_usage(usage_of(class_element(target), site));
    }

    fn process_method_override(
        &self,
        _overriding: &MethodFile,
        overridden: &ResolvedMethod,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        if overridden.method().has_annotation(&self.annotation) {
            context
                .registrar
                .register_non_extendable_usage(usage_of(method_element(overridden), site));
        }
    }
}

/// Reports references to the configured discouraged JDK packages when the class really comes
/// from the platform or the runtime rather than from a bundled copy.
pub struct DiscouragedJdkProcessor;

impl DiscouragedJdkProcessor {
    fn report(&self, class: &ClassFile, site: &UsageSite<'_>, context: &CheckContext<'_>) {
        if context.config.is_discouraged_jdk_class(&class.name)
            && class.origin.is_platform_or_runtime()
        {
            context
                .registrar
                .register_discouraged_usage(usage_of(class_element(class), site));
        }
    }
}

impl ApiUsageProcessor for DiscouragedJdkProcessor {
    fn process_class_reference(
        &self,
        target: &Arc<ClassFile>,
        _kind: ClassUsageKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        self.report(target, site, context);
    }

    fn process_method_invocation(
        &self,
        method: &ResolvedMethod,
        _kind: CallKind,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        self.report(&method.class, site, context);
    }

    fn process_field_access(
        &self,
        field: &ResolvedField,
        site: &UsageSite<'_>,
        context: &CheckContext<'_>,
    ) {
        self.report(&field.class, site, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::diagnostics::{Location, ReferenceOrigin};
    use crate::ir::FieldAccessKind;
    use crate::testing::{jdk_origin, ClassBuilder, MethodBuilder};
    use crate::usage::test_support::{scan, scan_with};

    fn config() -> VerifierConfig {
        VerifierConfig::default()
    }

    fn run_usage() -> Location {
        Location::method("p/Caller", "run", "()V")
    }

    fn method_usage(owner: &str, name: &str) -> ApiUsage {
        ApiUsage {
            api: ApiElement::Method {
                method: MemberReference::new(owner, name, "()V"),
            },
            usage: run_usage(),
            origin: ReferenceOrigin::Bytecode,
        }
    }

    fn caller(method: MethodBuilder) -> ClassFile {
        ClassBuilder::new("p/Caller").method(method).build()
    }

    #[test]
    fn deprecated_members_and_removal_marker() {
        let config = config();
        let api = ClassBuilder::new("api/Old")
            .method(MethodBuilder::new("legacy", "()V").annotation(&config.deprecated_annotation))
            .method(
                MethodBuilder::new("doomed", "()V")
                    .annotation(&config.deprecated_annotation)
                    .annotation(&config.scheduled_for_removal_annotation),
            )
            .method(MethodBuilder::new("fresh", "()V"))
            .build();

        let diagnostics = scan(
            vec![caller(
                MethodBuilder::new("run", "()V")
                    .invoke(CallKind::Virtual, "api/Old", "legacy", "()V")
                    .invoke(CallKind::Virtual, "api/Old", "doomed", "()V")
                    .invoke(CallKind::Virtual, "api/Old", "fresh", "()V"),
            )],
            vec![api],
        );

        assert_eq!(
            diagnostics.deprecated_usages,
            vec![
                DeprecatedApiUsage {
                    usage: method_usage("api/Old", "legacy"),
                    for_removal: false,
                },
                DeprecatedApiUsage {
                    usage: method_usage("api/Old", "doomed"),
                    for_removal: true,
                },
            ]
        );
    }

    #[test]
    fn deprecated_class_covers_its_fields() {
        let config = config();
        let api = ClassBuilder::new("api/Old")
            .annotation(&config.deprecated_annotation)
            .field("LIMIT", "I", Modifiers::PUBLIC | Modifiers::STATIC)
            .build();

        let diagnostics = scan(
            vec![caller(MethodBuilder::new("run", "()V").field_access(
                FieldAccessKind::GetStatic,
                "api/Old",
                "LIMIT",
                "I",
            ))],
            vec![api],
        );

        assert_eq!(diagnostics.deprecated_usages.len(), 1);
        assert!(matches!(
            diagnostics.deprecated_usages[0].usage.api,
            ApiElement::Field { .. }
        ));
    }

    #[test]
    fn experimental_usage_respects_caller_opt_in() {
        let config = config();
        let api = ClassBuilder::new("api/Preview")
            .annotation(&config.experimental_annotation)
            .method(MethodBuilder::new("<init>", "()V"))
            .build();
        let plain = caller(MethodBuilder::new("run", "()V").new_object("api/Preview"));
        let opted_in = ClassBuilder::new("p/Caller")
            .annotation(&config.experimental_opt_in_annotation)
            .method(MethodBuilder::new("run", "()V").new_object("api/Preview"))
            .build();

        let reported = scan(vec![plain], vec![api.clone()]);
        let silent = scan(vec![opted_in], vec![api]);

        assert_eq!(
            reported.experimental_usages,
            vec![ApiUsage {
                api: ApiElement::Class {
                    class_name: "api/Preview".to_string(),
                },
                usage: run_usage(),
                origin: ReferenceOrigin::Bytecode,
            }]
        );
        assert!(silent.experimental_usages.is_empty());
    }

    #[test]
    fn internal_package_marker_applies() {
        let config = config();
        let diagnostics = scan(
            vec![caller(
                MethodBuilder::new("run", "()V").invoke(CallKind::Static, "api/impl/Util", "help", "()V"),
            )],
            vec![
                ClassBuilder::new("api/impl/package-info")
                    .annotation(&config.internal_annotations[0])
                    .build(),
                ClassBuilder::new("api/impl/Util")
                    .method(MethodBuilder::new("help", "()V").modifiers(Modifiers::PUBLIC | Modifiers::STATIC))
                    .build(),
            ],
        );

        assert_eq!(diagnostics.internal_usages, vec![method_usage("api/impl/Util", "help")]);
    }

    fn listener_api(config: &VerifierConfig) -> ClassFile {
        ClassBuilder::new("api/Listener")
            .method(MethodBuilder::new("onEvent", "()V").annotation(&config.override_only_annotation))
            .build()
    }

    #[test]
    fn override_only_direct_call_is_reported() {
        let config = config();
        let diagnostics = scan(
            vec![caller(
                MethodBuilder::new("run", "()V").invoke(CallKind::Virtual, "api/Listener", "onEvent", "()V"),
            )],
            vec![listener_api(&config)],
        );

        assert_eq!(
            diagnostics.override_only_usages,
            vec![method_usage("api/Listener", "onEvent")]
        );
    }

    #[test]
    fn override_only_super_call_from_override_is_allowed() {
        let config = config();
        let plugin = ClassBuilder::new("p/MyListener")
            .super_class("api/Listener")
            .method(
                MethodBuilder::new("onEvent", "()V")
                    .invoke(CallKind::Special, "api/Listener", "onEvent", "()V"),
            )
            .build();

        let diagnostics = scan(vec![plugin], vec![listener_api(&config)]);

        assert!(diagnostics.override_only_usages.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn non_extendable_types_and_methods() {
        let config = config();
        let api = ClassBuilder::new("api/Sealed")
            .annotation(&config.non_extendable_annotation)
            .method(MethodBuilder::new("fixed", "()V").annotation(&config.non_extendable_annotation))
            .build();
        let plugin = ClassBuilder::new("p/Impl")
            .super_class("api/Sealed")
            .method(MethodBuilder::new("fixed", "()V"))
            .build();

        let diagnostics = scan(vec![plugin], vec![api]);

        assert_eq!(
            diagnostics.non_extendable_usages,
            vec![
                ApiUsage {
                    api: ApiElement::Class {
                        class_name: "api/Sealed".to_string(),
                    },
                    usage: Location::class("p/Impl"),
                    origin: ReferenceOrigin::Bytecode,
                },
                ApiUsage {
                    api: ApiElement::Method {
                        method: MemberReference::new("api/Sealed", "fixed", "()V"),
                    },
                    usage: Location::method("p/Impl", "fixed", "()V"),
                    origin: ReferenceOrigin::Bytecode,
                },
            ]
        );
    }

    #[test]
    fn discouraged_jdk_class_only_from_runtime() {
        let jaxb = || {
            ClassBuilder::new("javax/xml/bind/JAXBContext")
                .method(MethodBuilder::new("<init>", "()V"))
        };
        let plugin = caller(MethodBuilder::new("run", "()V").new_object("javax/xml/bind/JAXBContext"));

        let from_runtime = scan(vec![plugin.clone()], vec![jaxb().origin(jdk_origin()).build()]);
        let bundled = scan_with(&config(), vec![plugin, jaxb().build()], Vec::new());

        assert_eq!(from_runtime.discouraged_usages.len(), 1);
        assert!(bundled.discouraged_usages.is_empty());
    }

    #[test]
    fn discouraged_packages_follow_the_config() {
        let legacy = ClassBuilder::new("com/legacy/rpc/Stub")
            .method(MethodBuilder::new("<init>", "()V"))
            .origin(jdk_origin())
            .build();
        let plugin = caller(MethodBuilder::new("run", "()V").new_object("com/legacy/rpc/Stub"));
        let config = VerifierConfig {
            discouraged_jdk_packages: vec!["com/legacy".to_string()],
            ..VerifierConfig::default()
        };

        let configured = scan_with(&config, vec![plugin.clone()], vec![legacy.clone()]);
        let default = scan(vec![plugin], vec![legacy]);

        assert_eq!(configured.discouraged_usages.len(), 1);
        assert!(default.discouraged_usages.is_empty());
    }
}
