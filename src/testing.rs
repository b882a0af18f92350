//! Test fixtures: in-memory class builders and a minimal class-file writer.

use std::collections::{BTreeSet, HashMap};

use crate::ir::{
    BasicBlock, CallKind, CallSite, ClassFile, ControlFlowGraph, FieldAccessKind,
    FieldAccessSite, FieldFile, Instruction, InstructionKind, MethodFile, Modifiers, Nesting,
    Origin, OriginKind,
};
use crate::opcodes;

pub(crate) const OBJECT: &str = "java/lang/Object";

pub(crate) fn plugin_origin() -> Origin {
    Origin::new(OriginKind::Plugin, "plugin.jar")
}

pub(crate) fn platform_origin() -> Origin {
    Origin::new(OriginKind::Platform, "platform")
}

pub(crate) fn jdk_origin() -> Origin {
    Origin::new(OriginKind::Jdk, "jdk")
}

/// Builds [`ClassFile`] values directly, without going through class-file bytes.
pub(crate) struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            class: ClassFile {
                name: name.to_string(),
                super_name: Some(OBJECT.to_string()),
                interfaces: Vec::new(),
                modifiers: Modifiers::PUBLIC,
                methods: Vec::new(),
                fields: Vec::new(),
                annotations: BTreeSet::new(),
                signature: None,
                major_version: 52,
                nesting: Nesting::Unrecorded,
                origin: plugin_origin(),
            },
        }
    }

    pub(crate) fn interface(name: &str) -> Self {
        Self::new(name).modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT)
    }

    pub(crate) fn object() -> Self {
        Self::new(OBJECT)
            .no_super()
            .origin(jdk_origin())
            .method(MethodBuilder::new("<init>", "()V"))
            .method(MethodBuilder::new("hashCode", "()I"))
            .method(MethodBuilder::new("toString", "()Ljava/lang/String;"))
    }

    pub(crate) fn super_class(mut self, name: &str) -> Self {
        self.class.super_name = Some(name.to_string());
        self
    }

    pub(crate) fn no_super(mut self) -> Self {
        self.class.super_name = None;
        self
    }

    pub(crate) fn implements(mut self, name: &str) -> Self {
        self.class.interfaces.push(name.to_string());
        self
    }

    pub(crate) fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.class.modifiers = modifiers;
        self
    }

    pub(crate) fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.class.modifiers |= modifiers;
        self
    }

    pub(crate) fn nesting(mut self, nesting: Nesting) -> Self {
        self.class.nesting = nesting;
        self
    }

    pub(crate) fn origin(mut self, origin: Origin) -> Self {
        self.class.origin = origin;
        self
    }

    pub(crate) fn annotation(mut self, name: &str) -> Self {
        self.class.annotations.insert(name.to_string());
        self
    }

    pub(crate) fn method(mut self, method: MethodBuilder) -> Self {
        let mut method = method.build();
        method.owner = self.class.name.clone();
        self.class.methods.push(method);
        self
    }

    pub(crate) fn abstract_method(self, name: &str, descriptor: &str) -> Self {
        self.method(
            MethodBuilder::new(name, descriptor)
                .modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT),
        )
    }

    pub(crate) fn field(mut self, name: &str, descriptor: &str, modifiers: Modifiers) -> Self {
        self.class.fields.push(FieldFile {
            owner: self.class.name.clone(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            modifiers,
            signature: None,
            annotations: BTreeSet::new(),
        });
        self
    }

    pub(crate) fn annotated_field(
        mut self,
        name: &str,
        descriptor: &str,
        modifiers: Modifiers,
        annotation: &str,
    ) -> Self {
        self = self.field(name, descriptor, modifiers);
        if let Some(field) = self.class.fields.last_mut() {
            field.annotations.insert(annotation.to_string());
        }
        self
    }

    pub(crate) fn build(self) -> ClassFile {
        self.class
    }
}

/// Builds [`MethodFile`] values with symbolic instructions.
pub(crate) struct MethodBuilder {
    method: MethodFile,
    next_offset: u32,
}

impl MethodBuilder {
    pub(crate) fn new(name: &str, descriptor: &str) -> Self {
        Self {
            method: MethodFile {
                owner: String::new(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                modifiers: Modifiers::PUBLIC,
                signature: None,
                annotations: BTreeSet::new(),
                bytecode: Vec::new(),
                instructions: Vec::new(),
                cfg: ControlFlowGraph::default(),
            },
            next_offset: 0,
        }
    }

    pub(crate) fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.method.modifiers = modifiers;
        self
    }

    pub(crate) fn annotation(mut self, name: &str) -> Self {
        self.method.annotations.insert(name.to_string());
        self
    }

    pub(crate) fn invoke(mut self, kind: CallKind, owner: &str, name: &str, descriptor: &str) -> Self {
        let opcode = match kind {
            CallKind::Virtual => opcodes::INVOKEVIRTUAL,
            CallKind::Special => opcodes::INVOKESPECIAL,
            CallKind::Static => opcodes::INVOKESTATIC,
            CallKind::Interface => opcodes::INVOKEINTERFACE,
        };
        let offset = self.next_offset;
        self.push(
            opcode,
            InstructionKind::Invoke(CallSite {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                kind,
                offset,
            }),
        )
    }

    pub(crate) fn field_access(
        mut self,
        kind: FieldAccessKind,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Self {
        let opcode = match kind {
            FieldAccessKind::GetField => opcodes::GETFIELD,
            FieldAccessKind::PutField => opcodes::PUTFIELD,
            FieldAccessKind::GetStatic => opcodes::GETSTATIC,
            FieldAccessKind::PutStatic => opcodes::PUTSTATIC,
        };
        let offset = self.next_offset;
        self.push(
            opcode,
            InstructionKind::FieldAccess(FieldAccessSite {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                kind,
                offset,
            }),
        )
    }

    pub(crate) fn new_object(self, class_name: &str) -> Self {
        self.push(opcodes::NEW, InstructionKind::TypeReference(class_name.to_string()))
    }

    pub(crate) fn checkcast(self, class_name: &str) -> Self {
        self.push(
            opcodes::CHECKCAST,
            InstructionKind::TypeReference(class_name.to_string()),
        )
    }

    fn push(mut self, opcode: u8, kind: InstructionKind) -> Self {
        self.method.instructions.push(Instruction {
            offset: self.next_offset,
            opcode,
            kind,
        });
        self.next_offset += 3;
        self
    }

    pub(crate) fn build(mut self) -> MethodFile {
        if !self.method.instructions.is_empty() {
            self.method.cfg = ControlFlowGraph {
                blocks: vec![BasicBlock {
                    start_offset: 0,
                    end_offset: self.next_offset,
                    instructions: self.method.instructions.clone(),
                }],
                edges: Vec::new(),
            };
        }
        self.method
    }
}

/// Writes minimal but well-formed class files (version 52) for parser-level tests.
pub(crate) struct ClassBytes {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access: u16,
    annotations: Vec<String>,
    fields: Vec<(u16, String, String)>,
    methods: Vec<MethodBytes>,
    inner_classes: Vec<(String, Option<String>)>,
}

impl ClassBytes {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some(OBJECT.to_string()),
            interfaces: Vec::new(),
            access: 0x0021,
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
        }
    }

    /// Adds an `InnerClasses` entry; `outer` is `None` for local and anonymous classes.
    pub(crate) fn inner_class(mut self, inner: &str, outer: Option<&str>) -> Self {
        self.inner_classes
            .push((inner.to_string(), outer.map(str::to_string)));
        self
    }

    pub(crate) fn super_class(mut self, name: &str) -> Self {
        self.super_name = Some(name.to_string());
        self
    }

    pub(crate) fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub(crate) fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub(crate) fn annotation(mut self, name: &str) -> Self {
        self.annotations.push(name.to_string());
        self
    }

    pub(crate) fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields
            .push((access, name.to_string(), descriptor.to_string()));
        self
    }

    pub(crate) fn method(mut self, method: MethodBytes) -> Self {
        self.methods.push(method);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut pool = ConstantPoolWriter::default();
        let this_class = pool.class(&self.name);
        let super_class = self
            .super_name
            .as_deref()
            .map(|name| pool.class(name))
            .unwrap_or(0);
        let interfaces: Vec<u16> = self.interfaces.iter().map(|name| pool.class(name)).collect();

        let mut body = Vec::new();
        put_u16(&mut body, self.access);
        put_u16(&mut body, this_class);
        put_u16(&mut body, super_class);
        put_u16(&mut body, interfaces.len() as u16);
        for interface in interfaces {
            put_u16(&mut body, interface);
        }

        put_u16(&mut body, self.fields.len() as u16);
        for (access, name, descriptor) in &self.fields {
            put_u16(&mut body, *access);
            put_u16(&mut body, pool.utf8(name));
            put_u16(&mut body, pool.utf8(descriptor));
            put_u16(&mut body, 0);
        }

        put_u16(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            method.write(&mut pool, &mut body);
        }

        let attribute_count =
            u16::from(!self.annotations.is_empty()) + u16::from(!self.inner_classes.is_empty());
        put_u16(&mut body, attribute_count);
        if !self.annotations.is_empty() {
            write_annotation_attribute(&mut pool, &mut body, &self.annotations);
        }
        if !self.inner_classes.is_empty() {
            put_u16(&mut body, pool.utf8("InnerClasses"));
            put_u32(&mut body, (2 + 8 * self.inner_classes.len()) as u32);
            put_u16(&mut body, self.inner_classes.len() as u16);
            for (inner, outer) in &self.inner_classes {
                put_u16(&mut body, pool.class(inner));
                put_u16(&mut body, outer.as_deref().map(|name| pool.class(name)).unwrap_or(0));
                put_u16(&mut body, 0);
                put_u16(&mut body, 0x0001);
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        put_u16(&mut out, 0);
        put_u16(&mut out, 52);
        pool.write(&mut out);
        out.extend_from_slice(&body);
        out
    }
}

enum CodeOp {
    Raw(Vec<u8>),
    Member(u8, u8, String, String, String),
    Class(u8, String),
    LdcString(String),
    LdcClass(String),
    LdcInt(i32),
}

/// Method with bytecode assembled against the enclosing class's constant pool.
pub(crate) struct MethodBytes {
    access: u16,
    name: String,
    descriptor: String,
    annotations: Vec<String>,
    code: Vec<CodeOp>,
}

impl MethodBytes {
    pub(crate) fn new(access: u16, name: &str, descriptor: &str) -> Self {
        Self {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            annotations: Vec::new(),
            code: Vec::new(),
        }
    }

    pub(crate) fn annotation(mut self, name: &str) -> Self {
        self.annotations.push(name.to_string());
        self
    }

    pub(crate) fn op(mut self, opcode: u8) -> Self {
        self.code.push(CodeOp::Raw(vec![opcode]));
        self
    }

    pub(crate) fn raw(mut self, bytes: &[u8]) -> Self {
        self.code.push(CodeOp::Raw(bytes.to_vec()));
        self
    }

    pub(crate) fn invoke_static(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.code.push(CodeOp::Member(
            opcodes::INVOKESTATIC,
            10,
            owner.to_string(),
            name.to_string(),
            descriptor.to_string(),
        ));
        self
    }

    pub(crate) fn invoke_virtual(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.code.push(CodeOp::Member(
            opcodes::INVOKEVIRTUAL,
            10,
            owner.to_string(),
            name.to_string(),
            descriptor.to_string(),
        ));
        self
    }

    pub(crate) fn get_static(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.code.push(CodeOp::Member(
            opcodes::GETSTATIC,
            9,
            owner.to_string(),
            name.to_string(),
            descriptor.to_string(),
        ));
        self
    }

    pub(crate) fn new_object(mut self, class_name: &str) -> Self {
        self.code
            .push(CodeOp::Class(opcodes::NEW, class_name.to_string()));
        self
    }

    pub(crate) fn anewarray(mut self, class_name: &str) -> Self {
        self.code
            .push(CodeOp::Class(opcodes::ANEWARRAY, class_name.to_string()));
        self
    }

    pub(crate) fn ldc_string(mut self, value: &str) -> Self {
        self.code.push(CodeOp::LdcString(value.to_string()));
        self
    }

    pub(crate) fn ldc_class(mut self, class_name: &str) -> Self {
        self.code.push(CodeOp::LdcClass(class_name.to_string()));
        self
    }

    pub(crate) fn ldc_int(mut self, value: i32) -> Self {
        self.code.push(CodeOp::LdcInt(value));
        self
    }

    fn write(&self, pool: &mut ConstantPoolWriter, out: &mut Vec<u8>) {
        put_u16(out, self.access);
        put_u16(out, pool.utf8(&self.name));
        put_u16(out, pool.utf8(&self.descriptor));

        let mut code = Vec::new();
        for op in &self.code {
            match op {
                CodeOp::Raw(bytes) => code.extend_from_slice(bytes),
                CodeOp::Member(opcode, tag, owner, name, descriptor) => {
                    let index = pool.member(*tag, owner, name, descriptor);
                    code.push(*opcode);
                    put_u16(&mut code, index);
                }
                CodeOp::Class(opcode, name) => {
                    let index = pool.class(name);
                    code.push(*opcode);
                    put_u16(&mut code, index);
                }
                CodeOp::LdcString(value) => {
                    let index = pool.string(value);
                    push_ldc(&mut code, index);
                }
                CodeOp::LdcClass(name) => {
                    let index = pool.class(name);
                    push_ldc(&mut code, index);
                }
                CodeOp::LdcInt(value) => {
                    let index = pool.integer(*value);
                    push_ldc(&mut code, index);
                }
            }
        }

        let has_code = !code.is_empty();
        let attribute_count = u16::from(has_code) + u16::from(!self.annotations.is_empty());
        put_u16(out, attribute_count);
        if has_code {
            put_u16(out, pool.utf8("Code"));
            put_u32(out, (12 + code.len()) as u32);
            put_u16(out, 16);
            put_u16(out, 16);
            put_u32(out, code.len() as u32);
            out.extend_from_slice(&code);
            put_u16(out, 0);
            put_u16(out, 0);
        }
        if !self.annotations.is_empty() {
            write_annotation_attribute(pool, out, &self.annotations);
        }
    }
}

fn push_ldc(code: &mut Vec<u8>, index: u16) {
    if index <= u8::MAX as u16 {
        code.push(opcodes::LDC);
        code.push(index as u8);
    } else {
        code.push(opcodes::LDC_W);
        put_u16(code, index);
    }
}

fn write_annotation_attribute(
    pool: &mut ConstantPoolWriter,
    out: &mut Vec<u8>,
    annotations: &[String],
) {
    put_u16(out, pool.utf8("RuntimeVisibleAnnotations"));
    put_u32(out, (2 + 4 * annotations.len()) as u32);
    put_u16(out, annotations.len() as u16);
    for annotation in annotations {
        put_u16(out, pool.utf8(&format!("L{annotation};")));
        put_u16(out, 0);
    }
}

#[derive(Default)]
struct ConstantPoolWriter {
    entries: Vec<Vec<u8>>,
    cache: HashMap<Vec<u8>, u16>,
}

impl ConstantPoolWriter {
    fn intern(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(index) = self.cache.get(&entry) {
            return *index;
        }
        self.entries.push(entry.clone());
        let index = self.entries.len() as u16;
        self.cache.insert(entry, index);
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut entry = vec![1u8];
        put_u16(&mut entry, value.len() as u16);
        entry.extend_from_slice(value.as_bytes());
        self.intern(entry)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = vec![7u8];
        put_u16(&mut entry, name_index);
        self.intern(entry)
    }

    fn string(&mut self, value: &str) -> u16 {
        let value_index = self.utf8(value);
        let mut entry = vec![8u8];
        put_u16(&mut entry, value_index);
        self.intern(entry)
    }

    fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3u8];
        entry.extend_from_slice(&value.to_be_bytes());
        self.intern(entry)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut name_and_type = vec![12u8];
        put_u16(&mut name_and_type, name_index);
        put_u16(&mut name_and_type, descriptor_index);
        let name_and_type_index = self.intern(name_and_type);
        let mut entry = vec![tag];
        put_u16(&mut entry, class_index);
        put_u16(&mut entry, name_and_type_index);
        self.intern(entry)
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, (self.entries.len() + 1) as u16);
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}
