use std::collections::BTreeSet;
use std::fmt;

use bitflags::bitflags;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

bitflags! {
    /// Modifiers of a class, method or field.
    ///
    /// The bit layout is private to this crate; class-file access flags are translated by
    /// [`Modifiers::from_class_access`], [`Modifiers::from_method_access`] and
    /// [`Modifiers::from_field_access`] because the same class-file bit means different things
    /// on different members.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
    pub struct Modifiers: u32 {
        const PUBLIC = 1 << 0;
        const PRIVATE = 1 << 1;
        const PROTECTED = 1 << 2;
        const STATIC = 1 << 3;
        const FINAL = 1 << 4;
        const SYNCHRONIZED = 1 << 5;
        const VOLATILE = 1 << 6;
        const BRIDGE = 1 << 7;
        const TRANSIENT = 1 << 8;
        const VARARGS = 1 << 9;
        const NATIVE = 1 << 10;
        const INTERFACE = 1 << 11;
        const ABSTRACT = 1 << 12;
        const STRICT = 1 << 13;
        const SYNTHETIC = 1 << 14;
        const ANNOTATION = 1 << 15;
        const ENUM = 1 << 16;
        const DEPRECATED = 1 << 17;
    }
}

const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_PROTECTED: u16 = 0x0004;
const ACC_STATIC: u16 = 0x0008;
const ACC_FINAL: u16 = 0x0010;
const ACC_SYNCHRONIZED: u16 = 0x0020;
const ACC_VOLATILE_OR_BRIDGE: u16 = 0x0040;
const ACC_TRANSIENT_OR_VARARGS: u16 = 0x0080;
const ACC_NATIVE: u16 = 0x0100;
const ACC_INTERFACE: u16 = 0x0200;
const ACC_ABSTRACT: u16 = 0x0400;
const ACC_STRICT: u16 = 0x0800;
const ACC_SYNTHETIC: u16 = 0x1000;
const ACC_ANNOTATION: u16 = 0x2000;
const ACC_ENUM: u16 = 0x4000;

impl Modifiers {
    pub fn from_class_access(access: u16) -> Self {
        let mut modifiers = Self::common(access);
        modifiers.set(Self::INTERFACE, access & ACC_INTERFACE != 0);
        modifiers.set(Self::ANNOTATION, access & ACC_ANNOTATION != 0);
        modifiers.set(Self::ENUM, access & ACC_ENUM != 0);
        modifiers
    }

    pub fn from_method_access(access: u16) -> Self {
        let mut modifiers = Self::common(access);
        modifiers.set(Self::STATIC, access & ACC_STATIC != 0);
        modifiers.set(Self::SYNCHRONIZED, access & ACC_SYNCHRONIZED != 0);
        modifiers.set(Self::BRIDGE, access & ACC_VOLATILE_OR_BRIDGE != 0);
        modifiers.set(Self::VARARGS, access & ACC_TRANSIENT_OR_VARARGS != 0);
        modifiers.set(Self::NATIVE, access & ACC_NATIVE != 0);
        modifiers.set(Self::STRICT, access & ACC_STRICT != 0);
        modifiers
    }

    pub fn from_field_access(access: u16) -> Self {
        let mut modifiers = Self::common(access);
        modifiers.set(Self::STATIC, access & ACC_STATIC != 0);
        modifiers.set(Self::VOLATILE, access & ACC_VOLATILE_OR_BRIDGE != 0);
        modifiers.set(Self::TRANSIENT, access & ACC_TRANSIENT_OR_VARARGS != 0);
        modifiers.set(Self::ENUM, access & ACC_ENUM != 0);
        modifiers
    }

    fn common(access: u16) -> Self {
        let mut modifiers = Self::empty();
        modifiers.set(Self::PUBLIC, access & ACC_PUBLIC != 0);
        modifiers.set(Self::PRIVATE, access & ACC_PRIVATE != 0);
        modifiers.set(Self::PROTECTED, access & ACC_PROTECTED != 0);
        modifiers.set(Self::FINAL, access & ACC_FINAL != 0);
        modifiers.set(Self::ABSTRACT, access & ACC_ABSTRACT != 0);
        modifiers.set(Self::SYNTHETIC, access & ACC_SYNTHETIC != 0);
        modifiers
    }

    /// Access level implied by the visibility modifiers.
    pub fn access_level(self) -> AccessLevel {
        if self.contains(Self::PUBLIC) {
            AccessLevel::Public
        } else if self.contains(Self::PROTECTED) {
            AccessLevel::Protected
        } else if self.contains(Self::PRIVATE) {
            AccessLevel::Private
        } else {
            AccessLevel::PackagePrivate
        }
    }
}

impl Serialize for Modifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names: Vec<String> = self
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in &names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

/// Java access level of a class or member.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    Public,
    Protected,
    PackagePrivate,
    Private,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AccessLevel::Public => "public",
            AccessLevel::Protected => "protected",
            AccessLevel::PackagePrivate => "package-private",
            AccessLevel::Private => "private",
        };
        f.write_str(text)
    }
}

/// Kind of binary source a class was read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
    Plugin,
    Platform,
    Jdk,
    Library,
    Unknown,
}

/// Identifies the binary source (archive, directory, runtime) that produced a class.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct Origin {
    pub kind: OriginKind,
    pub id: String,
}

impl Origin {
    pub fn new(kind: OriginKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(OriginKind::Unknown, "")
    }

    /// Origins whose classes carry forward-compatibility risk for plugins.
    pub fn is_platform_or_runtime(&self) -> bool {
        matches!(self.kind, OriginKind::Platform | OriginKind::Jdk)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.id)
    }
}

/// Enclosing class as recorded by the `InnerClasses` and `EnclosingMethod` attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Nesting {
    /// The attributes were not read; nesting is inferred from the `$` in the name.
    #[default]
    Unrecorded,
    TopLevel,
    Nested(String),
}

/// Structural view of one parsed class file.
#[derive(Clone, Debug)]
pub struct ClassFile {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub modifiers: Modifiers,
    pub methods: Vec<MethodFile>,
    pub fields: Vec<FieldFile>,
    pub annotations: BTreeSet<String>,
    pub signature: Option<String>,
    pub major_version: u16,
    pub nesting: Nesting,
    pub origin: Origin,
}

impl ClassFile {
    pub fn is_interface(&self) -> bool {
        self.modifiers.contains(Modifiers::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(Modifiers::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.contains(Modifiers::FINAL)
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.contains(Modifiers::PUBLIC)
    }

    pub fn is_deprecated(&self) -> bool {
        self.modifiers.contains(Modifiers::DEPRECATED)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.contains(name)
    }

    pub fn package_name(&self) -> &str {
        package_of(&self.name)
    }

    /// Name of the lexically enclosing class of a nested, local or anonymous class.
    pub fn outer_class_name(&self) -> Option<&str> {
        match &self.nesting {
            Nesting::Nested(outer) => Some(outer),
            Nesting::TopLevel => None,
            Nesting::Unrecorded => outer_class_of(&self.name),
        }
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodFile> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldFile> {
        self.fields
            .iter()
            .find(|field| field.name == name && field.descriptor == descriptor)
    }
}

/// Declared method of a [`ClassFile`]; `owner` names the declaring class.
#[derive(Clone, Debug)]
pub struct MethodFile {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub modifiers: Modifiers,
    pub signature: Option<String>,
    pub annotations: BTreeSet<String>,
    pub bytecode: Vec<u8>,
    pub instructions: Vec<Instruction>,
    pub cfg: ControlFlowGraph,
}

impl MethodFile {
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(Modifiers::ABSTRACT)
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.contains(Modifiers::PRIVATE)
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.contains(Modifiers::FINAL)
    }

    pub fn is_deprecated(&self) -> bool {
        self.modifiers.contains(Modifiers::DEPRECATED)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.contains(name)
    }
}

/// Declared field of a [`ClassFile`]; `owner` names the declaring class.
#[derive(Clone, Debug)]
pub struct FieldFile {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub modifiers: Modifiers,
    pub signature: Option<String>,
    pub annotations: BTreeSet<String>,
}

impl FieldFile {
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.contains(Modifiers::FINAL)
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.contains(Modifiers::PRIVATE)
    }

    pub fn is_deprecated(&self) -> bool {
        self.modifiers.contains(Modifiers::DEPRECATED)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.contains(name)
    }
}

/// Package part of a binary class name; empty for the default package.
pub fn package_of(class_name: &str) -> &str {
    class_name
        .rsplit_once('/')
        .map(|(package, _)| package)
        .unwrap_or("")
}

pub fn outer_class_of(class_name: &str) -> Option<&str> {
    let simple_start = class_name.rfind('/').map(|index| index + 1).unwrap_or(0);
    let (outer, inner) = class_name.rsplit_once('$')?;
    if outer.len() < simple_start || outer.len() == simple_start || inner.is_empty() {
        return None;
    }
    Some(outer)
}

/// Top-level class of a (possibly nested) class name, used as its nest host.
pub fn top_level_class_of(class_name: &str) -> &str {
    let mut current = class_name;
    while let Some(outer) = outer_class_of(current) {
        current = outer;
    }
    current
}

/// Basic block graph for method bytecode.
#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<FlowEdge>,
}

/// Basic block covering a range of bytecode offsets.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub start_offset: u32,
    pub end_offset: u32,
    pub instructions: Vec<Instruction>,
}

/// Edge between basic blocks.
#[derive(Clone, Debug)]
pub struct FlowEdge {
    pub from: u32,
    pub to: u32,
    pub kind: EdgeKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum EdgeKind {
    FallThrough,
    Branch,
    Exception,
}

/// Bytecode instruction captured for analysis.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: u8,
    pub kind: InstructionKind,
}

/// Instruction kinds carrying a symbolic reference or a constant.
#[derive(Clone, Debug)]
pub enum InstructionKind {
    Invoke(CallSite),
    FieldAccess(FieldAccessSite),
    TypeReference(String),
    ConstString(String),
    ConstClass(String),
    ConstInt(i32),
    Other(u8),
}

/// Method reference extracted from an invoke instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallSite {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub kind: CallKind,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CallKind::Virtual => "invokevirtual",
            CallKind::Interface => "invokeinterface",
            CallKind::Special => "invokespecial",
            CallKind::Static => "invokestatic",
        };
        f.write_str(text)
    }
}

/// Field reference extracted from a get/put instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldAccessSite {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub kind: FieldAccessKind,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldAccessKind {
    GetField,
    PutField,
    GetStatic,
    PutStatic,
}

impl FieldAccessKind {
    pub fn is_static(self) -> bool {
        matches!(self, FieldAccessKind::GetStatic | FieldAccessKind::PutStatic)
    }

    pub fn is_put(self) -> bool {
        matches!(self, FieldAccessKind::PutField | FieldAccessKind::PutStatic)
    }
}

impl fmt::Display for FieldAccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FieldAccessKind::GetField => "getfield",
            FieldAccessKind::PutField => "putfield",
            FieldAccessKind::GetStatic => "getstatic",
            FieldAccessKind::PutStatic => "putstatic",
        };
        f.write_str(text)
    }
}
