use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ir::{ClassFile, FieldFile, MethodFile, Modifiers, Origin};
use crate::resolver::{ResolutionResult, Resolver};

const METHOD_HANDLE: &str = "java/lang/invoke/MethodHandle";
const VAR_HANDLE: &str = "java/lang/invoke/VarHandle";
const POLYMORPHIC_DESCRIPTOR: &str = "([Ljava/lang/Object;)Ljava/lang/Object;";

/// Names of parents that could not be resolved during one traversal, in discovery order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    pub unresolved: Vec<String>,
}

impl WalkOutcome {
    pub fn has_unresolved_parents(&self) -> bool {
        !self.unresolved.is_empty()
    }
}

enum Frame {
    Name(String),
    Exit(Arc<ClassFile>),
}

/// Depth-first traversal over superclass and interface edges.
///
/// The superclass subtree is always walked before the interfaces. A name is entered at most
/// once per traversal, which keeps malformed cyclic hierarchies finite.
#[derive(Clone, Copy, Debug)]
pub struct HierarchyWalker {
    visit_interfaces: bool,
}

impl HierarchyWalker {
    pub fn new(visit_interfaces: bool) -> Self {
        Self { visit_interfaces }
    }

    /// Walks the parents of `root` (and `root` itself when `visit_self` is set).
    ///
    /// `on_enter` returning false prunes the parents of that node; `on_exit` runs after all of
    /// a node's parents were visited. Parents for which `resolve` returns `None` are recorded in
    /// the outcome and skipped.
    pub fn visit_class<R, E, X>(
        &self,
        root: &Arc<ClassFile>,
        visit_self: bool,
        mut resolve: R,
        mut on_enter: E,
        mut on_exit: X,
    ) -> WalkOutcome
    where
        R: FnMut(&str) -> Option<Arc<ClassFile>>,
        E: FnMut(&Arc<ClassFile>) -> bool,
        X: FnMut(&Arc<ClassFile>),
    {
        let mut outcome = WalkOutcome::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = Vec::new();

        visited.insert(root.name.clone());
        if visit_self {
            if !on_enter(root) {
                return outcome;
            }
            stack.push(Frame::Exit(Arc::clone(root)));
        }
        self.push_parents(root, &mut stack);

        while let Some(frame) = stack.pop() {
            let node = match frame {
                Frame::Exit(node) => {
                    on_exit(&node);
                    continue;
                }
                Frame::Name(name) => {
                    if visited.contains(&name) {
                        continue;
                    }
                    visited.insert(name.clone());
                    match resolve(&name) {
                        Some(node) => node,
                        None => {
                            outcome.unresolved.push(name);
                            continue;
                        }
                    }
                }
            };
            if !on_enter(&node) {
                continue;
            }
            stack.push(Frame::Exit(Arc::clone(&node)));
            self.push_parents(&node, &mut stack);
        }
        outcome
    }

    fn push_parents(&self, node: &ClassFile, stack: &mut Vec<Frame>) {
        // Pushed in reverse so the superclass is popped first.
        if self.visit_interfaces {
            for interface in node.interfaces.iter().rev() {
                stack.push(Frame::Name(interface.clone()));
            }
        }
        if let Some(super_name) = &node.super_name {
            stack.push(Frame::Name(super_name.clone()));
        }
    }
}

/// Convenience resolver callback for the walker.
pub fn found_class(resolver: &dyn Resolver, name: &str) -> Option<Arc<ClassFile>> {
    resolver.resolve_class(name).into_found()
}

/// Recursively built view of a class and its resolved ancestors.
///
/// An ancestor reachable along several paths is built once and shared between its children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassHierarchy {
    pub name: String,
    pub is_interface: bool,
    pub origin: Origin,
    pub super_class: Option<Arc<ClassHierarchy>>,
    pub super_interfaces: Vec<Arc<ClassHierarchy>>,
    /// Parents of this node that failed to resolve.
    pub unresolved: Vec<String>,
}

impl ClassHierarchy {
    /// Builds the hierarchy of `class`. The root object type terminates every chain; parents
    /// that would close a cycle are left out.
    pub fn build(class: &ClassFile, resolver: &dyn Resolver, root_type: &str) -> Arc<Self> {
        HierarchyBuilder {
            resolver,
            root_type,
            built: HashMap::new(),
            path: HashSet::new(),
        }
        .node(class)
    }

    /// Every distinct ancestor, superclass chain first.
    pub fn ancestors(&self) -> Vec<&ClassHierarchy> {
        let mut seen = HashSet::new();
        let mut ancestors = Vec::new();
        let mut stack: Vec<&ClassHierarchy> = self.parents().rev().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.name.as_str()) {
                continue;
            }
            ancestors.push(node);
            stack.extend(node.parents().rev());
        }
        ancestors
    }

    pub fn is_subtype_of(&self, name: &str) -> bool {
        self.name == name || self.ancestors().iter().any(|ancestor| ancestor.name == name)
    }

    /// Whether `name` is a proper ancestor. `None` when the answer depends on a parent that
    /// did not resolve.
    pub fn inherits_from(&self, name: &str) -> Option<bool> {
        let ancestors = self.ancestors();
        if ancestors.iter().any(|ancestor| ancestor.name == name) {
            Some(true)
        } else if !self.unresolved.is_empty()
            || ancestors.iter().any(|ancestor| !ancestor.unresolved.is_empty())
        {
            None
        } else {
            Some(false)
        }
    }

    fn parents(&self) -> impl DoubleEndedIterator<Item = &ClassHierarchy> {
        self.super_class
            .iter()
            .chain(&self.super_interfaces)
            .map(|parent| parent.as_ref())
    }
}

struct HierarchyBuilder<'a> {
    resolver: &'a dyn Resolver,
    root_type: &'a str,
    built: HashMap<String, Arc<ClassHierarchy>>,
    path: HashSet<String>,
}

impl HierarchyBuilder<'_> {
    fn node(&mut self, class: &ClassFile) -> Arc<ClassHierarchy> {
        if let Some(node) = self.built.get(&class.name) {
            return Arc::clone(node);
        }
        let mut node = ClassHierarchy {
            name: class.name.clone(),
            is_interface: class.is_interface(),
            origin: class.origin.clone(),
            super_class: None,
            super_interfaces: Vec::new(),
            unresolved: Vec::new(),
        };
        if class.name != self.root_type {
            self.path.insert(class.name.clone());
            let super_name = class.super_name.as_deref().unwrap_or(self.root_type);
            node.super_class = self.parent(super_name, &mut node.unresolved);
            for interface in &class.interfaces {
                if let Some(parent) = self.parent(interface, &mut node.unresolved) {
                    node.super_interfaces.push(parent);
                }
            }
            self.path.remove(&class.name);
        }
        let node = Arc::new(node);
        self.built.insert(class.name.clone(), Arc::clone(&node));
        node
    }

    fn parent(&mut self, name: &str, unresolved: &mut Vec<String>) -> Option<Arc<ClassHierarchy>> {
        if self.path.contains(name) {
            return None;
        }
        if let Some(node) = self.built.get(name) {
            return Some(Arc::clone(node));
        }
        match found_class(self.resolver, name) {
            Some(parent) => Some(self.node(&parent)),
            None => {
                unresolved.push(name.to_string());
                None
            }
        }
    }
}

/// A method found by resolution together with its declaring class.
#[derive(Clone, Debug)]
pub struct ResolvedMethod {
    pub class: Arc<ClassFile>,
    index: usize,
}

impl ResolvedMethod {
    pub fn method(&self) -> &MethodFile {
        &self.class.methods[self.index]
    }
}

/// A field found by resolution together with its declaring class.
#[derive(Clone, Debug)]
pub struct ResolvedField {
    pub class: Arc<ClassFile>,
    index: usize,
}

impl ResolvedField {
    pub fn field(&self) -> &FieldFile {
        &self.class.fields[self.index]
    }
}

/// Result of a member lookup over a hierarchy.
#[derive(Clone, Debug)]
pub enum MemberLookup<T> {
    Found(T),
    NotFound,
    /// Some ancestor could not be resolved, so absence cannot be concluded.
    Incomplete,
}

pub(crate) fn declared_method(
    class: &Arc<ClassFile>,
    name: &str,
    descriptor: &str,
) -> Option<ResolvedMethod> {
    class
        .methods
        .iter()
        .position(|method| method.name == name && method.descriptor == descriptor)
        .map(|index| ResolvedMethod {
            class: Arc::clone(class),
            index,
        })
}

/// Methods of `class` with the given name, regardless of descriptor.
pub(crate) fn methods_named(class: &Arc<ClassFile>, name: &str) -> Vec<ResolvedMethod> {
    class
        .methods
        .iter()
        .enumerate()
        .filter(|(_, method)| method.name == name)
        .map(|(index, _)| ResolvedMethod {
            class: Arc::clone(class),
            index,
        })
        .collect()
}

/// Field of `class` with the given name, regardless of descriptor.
pub(crate) fn field_named(class: &Arc<ClassFile>, name: &str) -> Option<ResolvedField> {
    class
        .fields
        .iter()
        .position(|field| field.name == name)
        .map(|index| ResolvedField {
            class: Arc::clone(class),
            index,
        })
}

fn polymorphic_method(class: &Arc<ClassFile>, name: &str) -> Option<ResolvedMethod> {
    if class.name != METHOD_HANDLE && class.name != VAR_HANDLE {
        return None;
    }
    class
        .methods
        .iter()
        .position(|method| {
            method.name == name
                && method.descriptor == POLYMORPHIC_DESCRIPTOR
                && method
                    .modifiers
                    .contains(Modifiers::NATIVE | Modifiers::VARARGS)
        })
        .map(|index| ResolvedMethod {
            class: Arc::clone(class),
            index,
        })
}

/// Resolves a method reference on a class owner (JVMS 5.4.3.3).
///
/// The owner and its superclasses are searched first, then the maximally specific
/// superinterface methods; a non-abstract interface method is preferred over abstract ones.
pub fn resolve_class_method(
    resolver: &dyn Resolver,
    owner: &Arc<ClassFile>,
    name: &str,
    descriptor: &str,
) -> MemberLookup<ResolvedMethod> {
    let mut found = None;
    let walker = HierarchyWalker::new(false);
    let chain = walker.visit_class(
        owner,
        true,
        |parent| found_class(resolver, parent),
        |class| {
            if found.is_some() {
                return false;
            }
            found = declared_method(class, name, descriptor)
                .or_else(|| polymorphic_method(class, name));
            found.is_none()
        },
        |_| {},
    );
    if let Some(method) = found {
        return MemberLookup::Found(method);
    }
    interface_method_search(resolver, owner, name, descriptor, chain.has_unresolved_parents())
}

/// Resolves a method reference on an interface owner (JVMS 5.4.3.4).
pub fn resolve_interface_method(
    resolver: &dyn Resolver,
    owner: &Arc<ClassFile>,
    name: &str,
    descriptor: &str,
    root_type: &str,
) -> MemberLookup<ResolvedMethod> {
    if let Some(method) = declared_method(owner, name, descriptor) {
        return MemberLookup::Found(method);
    }
    let mut incomplete = false;
    match resolver.resolve_class(root_type) {
        ResolutionResult::Found(object) => {
            if let Some(method) = declared_method(&object, name, descriptor) {
                let declared = method.method();
                if declared.modifiers.contains(Modifiers::PUBLIC) && !declared.is_static()
                {
                    return MemberLookup::Found(method);
                }
            }
        }
        _ => incomplete = true,
    }
    interface_method_search(resolver, owner, name, descriptor, incomplete)
}

fn interface_method_search(
    resolver: &dyn Resolver,
    owner: &Arc<ClassFile>,
    name: &str,
    descriptor: &str,
    mut incomplete: bool,
) -> MemberLookup<ResolvedMethod> {
    let mut concrete = None;
    let mut abstract_candidate = None;
    let walker = HierarchyWalker::new(true);
    let outcome = walker.visit_class(
        owner,
        false,
        |parent| found_class(resolver, parent),
        |class| {
            if class.is_interface() && concrete.is_none() {
                if let Some(candidate) = declared_method(class, name, descriptor) {
                    let method = candidate.method();
                    if !method.is_private() && !method.is_static() {
                        if method.is_abstract() {
                            abstract_candidate.get_or_insert(candidate);
                        } else {
                            concrete = Some(candidate);
                        }
                    }
                }
            }
            concrete.is_none()
        },
        |_| {},
    );
    incomplete |= outcome.has_unresolved_parents();
    match concrete.or(abstract_candidate) {
        Some(method) => MemberLookup::Found(method),
        None if incomplete => MemberLookup::Incomplete,
        None => MemberLookup::NotFound,
    }
}

/// Resolves a field reference (JVMS 5.4.3.2): the owner, its superinterfaces, then its
/// superclass, recursively.
pub fn resolve_field(
    resolver: &dyn Resolver,
    owner: &Arc<ClassFile>,
    name: &str,
    descriptor: &str,
) -> MemberLookup<ResolvedField> {
    let mut visited = HashSet::new();
    let mut incomplete = false;
    match field_lookup(resolver, owner, name, descriptor, &mut visited, &mut incomplete) {
        Some(field) => MemberLookup::Found(field),
        None if incomplete => MemberLookup::Incomplete,
        None => MemberLookup::NotFound,
    }
}

fn field_lookup(
    resolver: &dyn Resolver,
    class: &Arc<ClassFile>,
    name: &str,
    descriptor: &str,
    visited: &mut HashSet<String>,
    incomplete: &mut bool,
) -> Option<ResolvedField> {
    if !visited.insert(class.name.clone()) {
        return None;
    }
    if let Some(index) = class
        .fields
        .iter()
        .position(|field| field.name == name && field.descriptor == descriptor)
    {
        return Some(ResolvedField {
            class: Arc::clone(class),
            index,
        });
    }
    let parents = class.interfaces.iter().chain(class.super_name.iter());
    for parent in parents {
        if visited.contains(parent) {
            continue;
        }
        match found_class(resolver, parent) {
            Some(parent) => {
                if let Some(field) =
                    field_lookup(resolver, &parent, name, descriptor, visited, incomplete)
                {
                    return Some(field);
                }
            }
            None => *incomplete = true,
        }
    }
    None
}
