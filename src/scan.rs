use std::collections::BTreeSet;

use anyhow::{Context, Result};
use jclassfile::attributes::Attribute;
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;

use crate::cfg::{build_cfg, HandlerRange};
use crate::ir::{
    CallKind, CallSite, ClassFile, ControlFlowGraph, FieldAccessKind, FieldAccessSite, FieldFile,
    Instruction, InstructionKind, MethodFile, Modifiers, Nesting, Origin,
};
use crate::opcodes;

const CLASS_MAGIC: u32 = 0xCAFEBABE;
const DEPRECATED_ANNOTATION: &str = "java/lang/Deprecated";

/// Parse class file bytes into the structural view used by the verifier.
///
/// Class files carrying attributes jclassfile does not understand are retried with a
/// header-only reader that keeps names, flags and member signatures but drops bytecode. Any
/// other failure, including malformed bytecode, is an error.
pub(crate) fn parse_class_bytes(data: &[u8], origin: &Origin) -> Result<ClassFile> {
    let mut offset = 0usize;
    let magic = read_u32_class(data, &mut offset).context("read class file magic")?;
    if magic != CLASS_MAGIC {
        anyhow::bail!("invalid class file magic 0x{magic:08x}");
    }
    parse_full(data, origin)
}

fn parse_full(data: &[u8], origin: &Origin) -> Result<ClassFile> {
    let class_file = match class_file::parse(data) {
        Ok(parsed) => parsed,
        Err(err) => {
            let message = format!("{err}");
            if message.contains("unmatched attribute") {
                let parsed = parse_class_bytes_minimal(data, origin)
                    .context("failed to parse class file bytes")?;
                log::debug!("class {} parsed without bytecode: {message}", parsed.name);
                return Ok(parsed);
            }
            return Err(err).context("failed to parse class file bytes");
        }
    };
    let constant_pool = class_file.constant_pool();
    let class_name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;
    let super_name = if class_file.super_class() == 0 {
        None
    } else {
        Some(
            resolve_class_name(constant_pool, class_file.super_class())
                .context("resolve super class name")?,
        )
    };
    let mut interfaces = Vec::new();
    for interface in class_file.interfaces() {
        interfaces
            .push(resolve_class_name(constant_pool, *interface).context("resolve interface name")?);
    }

    let annotations =
        parse_annotations(class_file.attributes(), constant_pool).context("parse annotations")?;
    let mut modifiers = Modifiers::from_class_access(class_file.access_flags().bits());
    modifiers.set(
        Modifiers::DEPRECATED,
        annotations.contains(DEPRECATED_ANNOTATION),
    );
    let signature =
        parse_signature(class_file.attributes(), constant_pool).context("parse signature")?;
    let nesting = parse_nesting(&class_name, class_file.attributes(), constant_pool)
        .context("parse inner classes")?;
    let fields = parse_fields(&class_name, constant_pool, class_file.fields())
        .context("parse fields")?;
    let methods = parse_methods(&class_name, constant_pool, class_file.methods())
        .with_context(|| format!("parse methods of {class_name}"))?;

    Ok(ClassFile {
        name: class_name,
        super_name,
        interfaces,
        modifiers,
        methods,
        fields,
        annotations,
        signature,
        major_version: major_version(data)?,
        nesting,
        origin: origin.clone(),
    })
}

fn major_version(data: &[u8]) -> Result<u16> {
    let mut offset = 6usize;
    read_u16_class(data, &mut offset).context("read major version")
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

/// Element class of an array descriptor, or the name itself for plain classes.
///
/// Primitive arrays carry no class reference and yield `None`.
pub(crate) fn normalize_class_name(raw: &str) -> Option<String> {
    if !raw.starts_with('[') {
        return Some(raw.to_string());
    }
    let element = raw.trim_start_matches('[');
    element
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .map(str::to_string)
}

fn parse_annotations(
    attributes: &[Attribute],
    constant_pool: &[ConstantPool],
) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for attribute in attributes {
        let annotations = match attribute {
            Attribute::RuntimeVisibleAnnotations { annotations, .. } => annotations,
            Attribute::RuntimeInvisibleAnnotations { annotations, .. } => annotations,
            _ => continue,
        };
        for annotation in annotations {
            names.insert(annotation_class_name(constant_pool, annotation)?);
        }
    }
    Ok(names)
}

fn annotation_class_name(
    constant_pool: &[ConstantPool],
    annotation: &jclassfile::attributes::Annotation,
) -> Result<String> {
    let descriptor =
        resolve_utf8(constant_pool, annotation.type_index()).context("resolve annotation type")?;
    let trimmed = descriptor
        .strip_prefix('L')
        .and_then(|value| value.strip_suffix(';'))
        .context("invalid annotation descriptor")?;
    Ok(trimmed.to_string())
}

fn parse_signature(
    attributes: &[Attribute],
    constant_pool: &[ConstantPool],
) -> Result<Option<String>> {
    for attribute in attributes {
        if let Attribute::Signature { signature_index } = attribute {
            return resolve_utf8(constant_pool, *signature_index).map(Some);
        }
    }
    Ok(None)
}

/// A member class names its outer class in its own `InnerClasses` entry; local and anonymous
/// classes leave it out and name the class of their `EnclosingMethod` instead.
fn parse_nesting(
    class_name: &str,
    attributes: &[Attribute],
    constant_pool: &[ConstantPool],
) -> Result<Nesting> {
    let mut own_entry = false;
    for attribute in attributes {
        let Attribute::InnerClasses { classes } = attribute else {
            continue;
        };
        for record in classes {
            if resolve_class_name(constant_pool, record.inner_class_info_index())? != class_name {
                continue;
            }
            if record.outer_class_info_index() != 0 {
                let outer = resolve_class_name(constant_pool, record.outer_class_info_index())?;
                return Ok(Nesting::Nested(outer));
            }
            own_entry = true;
        }
    }
    if own_entry {
        for attribute in attributes {
            if let Attribute::EnclosingMethod { class_index, .. } = attribute {
                let outer = resolve_class_name(constant_pool, *class_index)?;
                return Ok(Nesting::Nested(outer));
            }
        }
    }
    Ok(Nesting::TopLevel)
}

fn parse_fields(
    owner: &str,
    constant_pool: &[ConstantPool],
    fields: &[jclassfile::fields::FieldInfo],
) -> Result<Vec<FieldFile>> {
    let mut parsed = Vec::with_capacity(fields.len());
    for field in fields {
        let name = resolve_utf8(constant_pool, field.name_index()).context("resolve field name")?;
        let descriptor = resolve_utf8(constant_pool, field.descriptor_index())
            .context("resolve field descriptor")?;
        let annotations = parse_annotations(field.attributes(), constant_pool)
            .with_context(|| format!("parse annotations of field {name}"))?;
        let mut modifiers = Modifiers::from_field_access(field.access_flags().bits());
        modifiers.set(
            Modifiers::DEPRECATED,
            annotations.contains(DEPRECATED_ANNOTATION),
        );
        parsed.push(FieldFile {
            owner: owner.to_string(),
            signature: parse_signature(field.attributes(), constant_pool)?,
            name,
            descriptor,
            modifiers,
            annotations,
        });
    }
    Ok(parsed)
}

fn parse_methods(
    owner: &str,
    constant_pool: &[ConstantPool],
    methods: &[jclassfile::methods::MethodInfo],
) -> Result<Vec<MethodFile>> {
    let mut parsed = Vec::with_capacity(methods.len());
    for method in methods {
        let name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let annotations = parse_annotations(method.attributes(), constant_pool)
            .with_context(|| format!("parse annotations of {name}{descriptor}"))?;
        let mut modifiers = Modifiers::from_method_access(method.access_flags().bits());
        modifiers.set(
            Modifiers::DEPRECATED,
            annotations.contains(DEPRECATED_ANNOTATION),
        );
        let code = method
            .attributes()
            .iter()
            .find_map(|attribute| match attribute {
                Attribute::Code {
                    code,
                    exception_table,
                    ..
                } => Some((code, exception_table)),
                _ => None,
            });
        let (bytecode, instructions, cfg) = match code {
            Some((code, exception_table)) => {
                let instructions = parse_bytecode(code, constant_pool)
                    .with_context(|| format!("parse bytecode of {name}{descriptor}"))?;
                let handlers: Vec<HandlerRange> = exception_table
                    .iter()
                    .map(|entry| HandlerRange {
                        start_pc: entry.start_pc() as u32,
                        end_pc: entry.end_pc() as u32,
                        handler_pc: entry.handler_pc() as u32,
                    })
                    .collect();
                let cfg = build_cfg(code, &instructions, &handlers)
                    .with_context(|| format!("build control flow graph of {name}{descriptor}"))?;
                (code.clone(), instructions, cfg)
            }
            None => (Vec::new(), Vec::new(), ControlFlowGraph::default()),
        };
        parsed.push(MethodFile {
            owner: owner.to_string(),
            signature: parse_signature(method.attributes(), constant_pool)?,
            name,
            descriptor,
            modifiers,
            annotations,
            bytecode,
            instructions,
            cfg,
        });
    }
    Ok(parsed)
}

fn parse_bytecode(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let start_offset = offset as u32;
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            anyhow::bail!("invalid bytecode length at offset {}", offset);
        }
        let kind = match opcode {
            opcodes::INVOKEVIRTUAL
            | opcodes::INVOKESPECIAL
            | opcodes::INVOKESTATIC
            | opcodes::INVOKEINTERFACE => {
                let method_index = read_u16(code, offset + 1)?;
                let member = resolve_member_ref(constant_pool, method_index)
                    .context("resolve method ref")?;
                let call_kind = match opcode {
                    opcodes::INVOKESPECIAL => CallKind::Special,
                    opcodes::INVOKESTATIC => CallKind::Static,
                    opcodes::INVOKEINTERFACE => CallKind::Interface,
                    _ => CallKind::Virtual,
                };
                InstructionKind::Invoke(CallSite {
                    owner: member.owner,
                    name: member.name,
                    descriptor: member.descriptor,
                    kind: call_kind,
                    offset: start_offset,
                })
            }
            opcodes::GETFIELD | opcodes::PUTFIELD | opcodes::GETSTATIC | opcodes::PUTSTATIC => {
                let field_index = read_u16(code, offset + 1)?;
                let member = resolve_member_ref(constant_pool, field_index)
                    .context("resolve field ref")?;
                let access_kind = match opcode {
                    opcodes::GETFIELD => FieldAccessKind::GetField,
                    opcodes::PUTFIELD => FieldAccessKind::PutField,
                    opcodes::GETSTATIC => FieldAccessKind::GetStatic,
                    _ => FieldAccessKind::PutStatic,
                };
                InstructionKind::FieldAccess(FieldAccessSite {
                    owner: member.owner,
                    name: member.name,
                    descriptor: member.descriptor,
                    kind: access_kind,
                    offset: start_offset,
                })
            }
            opcodes::NEW
            | opcodes::ANEWARRAY
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF
            | opcodes::MULTIANEWARRAY => {
                let class_index = read_u16(code, offset + 1)?;
                let raw = resolve_class_name(constant_pool, class_index)
                    .context("resolve type reference")?;
                match normalize_class_name(&raw) {
                    Some(name) => InstructionKind::TypeReference(name),
                    None => InstructionKind::Other(opcode),
                }
            }
            opcodes::LDC => {
                let index = code.get(offset + 1).copied().context("ldc index")? as u16;
                resolve_loadable_constant(constant_pool, index, opcode)?
            }
            opcodes::LDC_W => {
                let index = read_u16(code, offset + 1)?;
                resolve_loadable_constant(constant_pool, index, opcode)?
            }
            _ => InstructionKind::Other(opcode),
        };

        instructions.push(Instruction {
            offset: start_offset,
            opcode,
            kind,
        });
        offset += length;
    }
    Ok(instructions)
}

/// Resolved constant pool member reference (method or field).
struct MemberRef {
    owner: String,
    name: String,
    descriptor: String,
}

fn resolve_member_ref(constant_pool: &[ConstantPool], index: u16) -> Result<MemberRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing member ref entry")?;
    let (class_index, name_and_type_index) = match entry {
        ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::Fieldref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected member ref entry"),
    };
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let (name_index, descriptor_index) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    let name = resolve_utf8(constant_pool, name_index).context("resolve member name")?;
    let descriptor =
        resolve_utf8(constant_pool, descriptor_index).context("resolve member descriptor")?;
    Ok(MemberRef {
        owner,
        name,
        descriptor,
    })
}

fn resolve_name_and_type(constant_pool: &[ConstantPool], index: u16) -> Result<(u16, u16)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing name and type entry")?;
    match entry {
        ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        } => Ok((*name_index, *descriptor_index)),
        _ => anyhow::bail!("unexpected name and type entry"),
    }
}

fn resolve_loadable_constant(
    constant_pool: &[ConstantPool],
    index: u16,
    opcode: u8,
) -> Result<InstructionKind> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing constant pool entry")?;
    let kind = match entry {
        ConstantPool::String { string_index } => {
            InstructionKind::ConstString(resolve_utf8(constant_pool, *string_index)?)
        }
        ConstantPool::Class { name_index } => {
            let raw = resolve_utf8(constant_pool, *name_index)?;
            match normalize_class_name(&raw) {
                Some(name) => InstructionKind::ConstClass(name),
                None => InstructionKind::Other(opcode),
            }
        }
        ConstantPool::Integer { value } => InstructionKind::ConstInt(*value),
        _ => InstructionKind::Other(opcode),
    };
    Ok(kind)
}

fn parse_class_bytes_minimal(data: &[u8], origin: &Origin) -> Result<ClassFile> {
    let mut offset = 0usize;
    let magic = read_u32_class(data, &mut offset)?;
    if magic != CLASS_MAGIC {
        anyhow::bail!("invalid class file magic");
    }
    let _minor = read_u16_class(data, &mut offset)?;
    let major = read_u16_class(data, &mut offset)?;
    let (cp_entries, class_entries) = parse_constant_pool_minimal(data, &mut offset)?;
    let access_flags = read_u16_class(data, &mut offset)?;
    let this_class = read_u16_class(data, &mut offset)?;
    let super_class = read_u16_class(data, &mut offset)?;

    let class_name = resolve_class_name_minimal(&cp_entries, &class_entries, this_class)
        .context("resolve class name")?;
    let super_name = if super_class == 0 {
        None
    } else {
        Some(
            resolve_class_name_minimal(&cp_entries, &class_entries, super_class)
                .context("resolve super class name")?,
        )
    };

    let count = read_u16_class(data, &mut offset)? as usize;
    let mut interfaces = Vec::with_capacity(count);
    for _ in 0..count {
        let index = read_u16_class(data, &mut offset)?;
        interfaces.push(resolve_class_name_minimal(&cp_entries, &class_entries, index)?);
    }

    let mut fields = Vec::new();
    for (access, name, descriptor) in read_members_minimal(data, &mut offset, &cp_entries)? {
        fields.push(FieldFile {
            owner: class_name.clone(),
            name,
            descriptor,
            modifiers: Modifiers::from_field_access(access),
            signature: None,
            annotations: BTreeSet::new(),
        });
    }
    let mut methods = Vec::new();
    for (access, name, descriptor) in read_members_minimal(data, &mut offset, &cp_entries)? {
        methods.push(MethodFile {
            owner: class_name.clone(),
            name,
            descriptor,
            modifiers: Modifiers::from_method_access(access),
            signature: None,
            annotations: BTreeSet::new(),
            bytecode: Vec::new(),
            instructions: Vec::new(),
            cfg: ControlFlowGraph::default(),
        });
    }
    skip_attributes(data, &mut offset)?;

    Ok(ClassFile {
        name: class_name,
        super_name,
        interfaces,
        modifiers: Modifiers::from_class_access(access_flags),
        methods,
        fields,
        annotations: BTreeSet::new(),
        signature: None,
        major_version: major,
        nesting: Nesting::Unrecorded,
        origin: origin.clone(),
    })
}

#[derive(Clone)]
enum CpEntryMin {
    Utf8(String),
    Other,
}

fn parse_constant_pool_minimal(
    data: &[u8],
    offset: &mut usize,
) -> Result<(Vec<CpEntryMin>, Vec<Option<u16>>)> {
    let count = read_u16_class(data, offset)?;
    let mut entries = Vec::with_capacity(count as usize);
    entries.push(CpEntryMin::Other);
    let mut class_entries = vec![None; count as usize];
    let mut index = 1u16;
    while index < count {
        let tag = read_u8_class(data, offset)?;
        match tag {
            1 => {
                let len = read_u16_class(data, offset)? as usize;
                let bytes = read_bytes_class(data, offset, len)?;
                entries.push(CpEntryMin::Utf8(String::from_utf8_lossy(bytes).to_string()));
            }
            7 => {
                let name_index = read_u16_class(data, offset)?;
                entries.push(CpEntryMin::Other);
                class_entries[index as usize] = Some(name_index);
            }
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                skip_class_bytes(data, offset, 4)?;
                entries.push(CpEntryMin::Other);
            }
            5 | 6 => {
                skip_class_bytes(data, offset, 8)?;
                entries.push(CpEntryMin::Other);
                entries.push(CpEntryMin::Other);
                index += 1;
            }
            8 | 16 | 19 | 20 => {
                skip_class_bytes(data, offset, 2)?;
                entries.push(CpEntryMin::Other);
            }
            15 => {
                skip_class_bytes(data, offset, 3)?;
                entries.push(CpEntryMin::Other);
            }
            _ => anyhow::bail!("unsupported constant pool tag: {}", tag),
        }
        index += 1;
    }
    Ok((entries, class_entries))
}

fn resolve_class_name_minimal(
    entries: &[CpEntryMin],
    class_entries: &[Option<u16>],
    class_index: u16,
) -> Result<String> {
    let entry = class_entries
        .get(class_index as usize)
        .context("missing class entry")?;
    let name_index = entry.context("missing class name index")?;
    resolve_utf8_minimal(entries, name_index).context("missing utf8 entry for class name")
}

fn resolve_utf8_minimal(entries: &[CpEntryMin], index: u16) -> Result<String> {
    match entries.get(index as usize) {
        Some(CpEntryMin::Utf8(value)) => Ok(value.clone()),
        _ => anyhow::bail!("missing utf8 entry {index}"),
    }
}

fn read_members_minimal(
    data: &[u8],
    offset: &mut usize,
    entries: &[CpEntryMin],
) -> Result<Vec<(u16, String, String)>> {
    let count = read_u16_class(data, offset)?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = read_u16_class(data, offset)?;
        let name = resolve_utf8_minimal(entries, read_u16_class(data, offset)?)?;
        let descriptor = resolve_utf8_minimal(entries, read_u16_class(data, offset)?)?;
        skip_attributes(data, offset)?;
        members.push((access, name, descriptor));
    }
    Ok(members)
}

fn skip_attributes(data: &[u8], offset: &mut usize) -> Result<()> {
    let count = read_u16_class(data, offset)?;
    for _ in 0..count {
        skip_class_bytes(data, offset, 2)?;
        let length = read_u32_class(data, offset)? as usize;
        skip_class_bytes(data, offset, length)?;
    }
    Ok(())
}

fn read_u8_class(data: &[u8], offset: &mut usize) -> Result<u8> {
    let byte = *data.get(*offset).context("class file out of bounds")?;
    *offset += 1;
    Ok(byte)
}

fn read_u16_class(data: &[u8], offset: &mut usize) -> Result<u16> {
    let bytes = read_bytes_class(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32_class(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = read_bytes_class(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes_class<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let start = *offset;
    let end = start.checked_add(len).context("class file out of bounds")?;
    let slice = data.get(start..end).context("class file out of bounds")?;
    *offset = end;
    Ok(slice)
}

fn skip_class_bytes(data: &[u8], offset: &mut usize, len: usize) -> Result<()> {
    read_bytes_class(data, offset, len)?;
    Ok(())
}

pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = *code.get(offset).context("bytecode offset out of bounds")?;
    let length = match opcode {
        0x00..=0x0f => 1,
        opcodes::BIPUSH => 2,
        opcodes::SIPUSH => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        opcodes::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        0xa9 => 2,
        0xaa => tableswitch_length(code, offset)?,
        0xab => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        0xb2..=0xb5 => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        opcodes::NEW => 3,
        0xbc => 2,
        opcodes::ANEWARRAY => 3,
        0xbe | opcodes::ATHROW => 1,
        opcodes::CHECKCAST | opcodes::INSTANCEOF => 3,
        0xc2 | 0xc3 => 1,
        opcodes::WIDE => wide_length(code, offset)?,
        opcodes::MULTIANEWARRAY => 4,
        0xc6 | 0xc7 => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        0xca => 1,
        0xfe | 0xff => 1,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    if count < 0 {
        anyhow::bail!("invalid tableswitch range");
    }
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        anyhow::bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == opcodes::IINC { Ok(6) } else { Ok(4) }
}

pub(crate) fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

pub(crate) fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

pub(crate) fn read_u32(code: &[u8], offset: usize) -> Result<u32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode u32 out of bounds")?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let value = read_u32(code, offset)?;
    Ok(i32::from_be_bytes(value.to_be_bytes()))
}
