use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::descriptor::{method_param_count, returns_void};
use crate::ir::{CallKind, CallSite, Instruction, InstructionKind, MethodFile};
use crate::opcodes;

/// Abstract value tracked on the operand stack and in locals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Unknown,
    Null,
    Int(i32),
    Str(String),
    /// A `java.lang.Class` object for the named class.
    Class(String),
}

/// Observes invocations together with the abstract values of their operands.
pub trait InvocationListener {
    /// Returns the abstract result of the call; it is pushed unless the method returns void.
    fn on_invoke(&mut self, call: &CallSite, receiver: Option<&Value>, args: &[Value]) -> Value;
}

#[derive(Default)]
struct Frame {
    stack: Vec<Value>,
    locals: HashMap<u16, Value>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Unknown)
    }

    fn load(&mut self, index: u16) {
        let value = self.locals.get(&index).cloned().unwrap_or(Value::Unknown);
        self.push(value);
    }

    fn store(&mut self, index: u16) {
        let value = self.pop();
        self.locals.insert(index, value);
    }

    fn forget(&mut self) {
        self.stack.clear();
    }
}

/// Propagates constants through each basic block of `method`, reporting every invocation to
/// `listener`.
///
/// Every block starts from an unknown stack and unknown locals. Opcodes outside the tracked set
/// discard the stack, and any opcode that may write a local discards all locals, so a reported
/// constant is always the value the bytecode actually passes.
pub fn interpret(method: &MethodFile, listener: &mut dyn InvocationListener) -> Result<()> {
    if method.bytecode.is_empty() {
        return Ok(());
    }
    if method.cfg.blocks.is_empty() {
        return interpret_block(&method.bytecode, &method.instructions, listener);
    }
    for block in &method.cfg.blocks {
        interpret_block(&method.bytecode, &block.instructions, listener)
            .with_context(|| format!("interpret block at {}", block.start_offset))?;
    }
    Ok(())
}

fn interpret_block(
    code: &[u8],
    instructions: &[Instruction],
    listener: &mut dyn InvocationListener,
) -> Result<()> {
    let mut frame = Frame::default();
    for instruction in instructions {
        let offset = instruction.offset as usize;
        let operand = |index: usize| -> Result<u8> {
            code.get(offset + index)
                .copied()
                .with_context(|| format!("operand of opcode 0x{:02x} at {offset}", instruction.opcode))
        };
        match instruction.opcode {
            opcodes::NOP => {}
            opcodes::ACONST_NULL => frame.push(Value::Null),
            opcode @ opcodes::ICONST_M1..=opcodes::ICONST_5 => {
                frame.push(Value::Int(i32::from(opcode) - i32::from(opcodes::ICONST_M1) - 1));
            }
            opcodes::BIPUSH => frame.push(Value::Int(i32::from(operand(1)? as i8))),
            opcodes::SIPUSH => {
                let value = i16::from_be_bytes([operand(1)?, operand(2)?]);
                frame.push(Value::Int(i32::from(value)));
            }
            opcodes::LDC | opcodes::LDC_W | opcodes::LDC2_W => {
                let value = match &instruction.kind {
                    InstructionKind::ConstString(value) => Value::Str(value.clone()),
                    InstructionKind::ConstClass(name) => Value::Class(name.clone()),
                    InstructionKind::ConstInt(value) => Value::Int(*value),
                    _ => Value::Unknown,
                };
                frame.push(value);
            }
            opcodes::ILOAD | opcodes::ALOAD => frame.load(u16::from(operand(1)?)),
            opcode @ opcodes::ILOAD_0..=opcodes::ILOAD_3 => {
                frame.load(u16::from(opcode - opcodes::ILOAD_0));
            }
            opcode @ opcodes::ALOAD_0..=opcodes::ALOAD_3 => {
                frame.load(u16::from(opcode - opcodes::ALOAD_0));
            }
            opcodes::ISTORE | opcodes::ASTORE => frame.store(u16::from(operand(1)?)),
            opcode @ opcodes::ISTORE_0..=opcodes::ISTORE_3 => {
                frame.store(u16::from(opcode - opcodes::ISTORE_0));
            }
            opcode @ opcodes::ASTORE_0..=opcodes::ASTORE_3 => {
                frame.store(u16::from(opcode - opcodes::ASTORE_0));
            }
            opcodes::POP => {
                frame.pop();
            }
            opcodes::DUP => {
                let top = frame.pop();
                frame.push(top.clone());
                frame.push(top);
            }
            opcodes::AASTORE => {
                frame.pop();
                frame.pop();
                frame.pop();
            }
            opcodes::NEW | opcodes::GETSTATIC => frame.push(Value::Unknown),
            opcodes::GETFIELD | opcodes::ANEWARRAY | opcodes::INSTANCEOF => {
                frame.pop();
                frame.push(Value::Unknown);
            }
            opcodes::CHECKCAST => {}
            opcodes::PUTSTATIC => {
                frame.pop();
            }
            opcodes::PUTFIELD => {
                frame.pop();
                frame.pop();
            }
            opcodes::INVOKEVIRTUAL
            | opcodes::INVOKESPECIAL
            | opcodes::INVOKESTATIC
            | opcodes::INVOKEINTERFACE => {
                let InstructionKind::Invoke(call) = &instruction.kind else {
                    frame.forget();
                    continue;
                };
                invoke(&mut frame, call, listener);
            }
            opcode => {
                frame.forget();
                if writes_local(opcode) {
                    frame.locals.clear();
                }
            }
        }
    }
    Ok(())
}

fn invoke(frame: &mut Frame, call: &CallSite, listener: &mut dyn InvocationListener) {
    let Ok(count) = method_param_count(&call.descriptor) else {
        frame.forget();
        return;
    };
    let mut args = vec![Value::Unknown; count];
    for slot in args.iter_mut().rev() {
        *slot = frame.pop();
    }
    let receiver = match call.kind {
        CallKind::Static => None,
        _ => Some(frame.pop()),
    };
    let result = listener.on_invoke(call, receiver.as_ref(), &args);
    if !returns_void(&call.descriptor) {
        frame.push(result);
    }
}

fn writes_local(opcode: u8) -> bool {
    matches!(opcode, opcodes::ISTORE..=opcodes::ASTORE_3 | opcodes::IINC | opcodes::WIDE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ClassFile;
    use crate::scan::parse_class_bytes;
    use crate::testing::{plugin_origin, ClassBytes, MethodBytes};

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(String, Option<Value>, Vec<Value>)>,
    }

    impl InvocationListener for Recorder {
        fn on_invoke(&mut self, call: &CallSite, receiver: Option<&Value>, args: &[Value]) -> Value {
            self.calls
                .push((call.name.clone(), receiver.cloned(), args.to_vec()));
            if call.name == "forName" {
                if let Some(Value::Str(name)) = args.first() {
                    return Value::Class(name.replace('.', "/"));
                }
            }
            Value::Unknown
        }
    }

    fn run(method: MethodBytes) -> Recorder {
        let bytes = ClassBytes::new("t/Main").method(method).build();
        let class: ClassFile = parse_class_bytes(&bytes, &plugin_origin()).expect("parse class");
        let mut recorder = Recorder::default();
        interpret(&class.methods[0], &mut recorder).expect("interpret");
        recorder
    }

    #[test]
    fn push_constants_decode_to_exact_signed_values() {
        let recorder = run(MethodBytes::new(0x0009, "main", "()V")
            .raw(&[opcodes::ICONST_M1, opcodes::BIPUSH, 0xfb, opcodes::SIPUSH, 0xfe, 0xd4])
            .invoke_static("t/T", "take", "(III)V")
            .op(opcodes::RETURN));

        assert_eq!(
            recorder.calls,
            vec![(
                "take".to_string(),
                None,
                vec![Value::Int(-1), Value::Int(-5), Value::Int(-300)]
            )]
        );
    }

    #[test]
    fn constants_flow_through_locals_and_call_results() {
        let recorder = run(MethodBytes::new(0x0009, "main", "()V")
            .ldc_string("a.b.Target")
            .op(opcodes::ASTORE_0)
            .op(opcodes::ALOAD_0)
            .invoke_static("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;")
            .ldc_string("run")
            .op(0x03)
            .anewarray("java/lang/Class")
            .invoke_virtual(
                "java/lang/Class",
                "getMethod",
                "(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;",
            )
            .op(opcodes::POP)
            .op(opcodes::RETURN));

        assert_eq!(recorder.calls.len(), 2);
        assert_eq!(recorder.calls[0].2, vec![Value::Str("a.b.Target".to_string())]);
        let (name, receiver, args) = &recorder.calls[1];
        assert_eq!(name, "getMethod");
        assert_eq!(receiver, &Some(Value::Class("a/b/Target".to_string())));
        assert_eq!(args, &vec![Value::Str("run".to_string()), Value::Unknown]);
    }

    #[test]
    fn class_literals_are_tracked() {
        let recorder = run(MethodBytes::new(0x0009, "main", "()V")
            .ldc_class("a/b/Target")
            .ldc_string("field")
            .invoke_virtual(
                "java/lang/Class",
                "getDeclaredField",
                "(Ljava/lang/String;)Ljava/lang/reflect/Field;",
            )
            .op(opcodes::POP)
            .op(opcodes::RETURN));

        assert_eq!(
            recorder.calls[0].1,
            Some(Value::Class("a/b/Target".to_string()))
        );
    }

    #[test]
    fn integer_constants_from_the_pool_are_tracked() {
        let recorder = run(MethodBytes::new(0x0009, "main", "()V")
            .ldc_int(70_000)
            .ldc_int(-40_000)
            .invoke_static("t/T", "take", "(II)V")
            .op(opcodes::RETURN));

        assert_eq!(
            recorder.calls[0].2,
            vec![Value::Int(70_000), Value::Int(-40_000)]
        );
    }

    #[test]
    fn untracked_opcodes_forget_the_stack() {
        // iconst_1, iconst_2, iadd
        let recorder = run(MethodBytes::new(0x0009, "main", "()V")
            .raw(&[0x04, 0x05, 0x60])
            .invoke_static("t/T", "take", "(I)V")
            .op(opcodes::RETURN));

        assert_eq!(recorder.calls[0].2, vec![Value::Unknown]);
    }

    #[test]
    fn methods_without_code_are_skipped() {
        let bytes = ClassBytes::new("t/Main")
            .method(MethodBytes::new(0x0401, "run", "()V"))
            .build();
        let class = parse_class_bytes(&bytes, &plugin_origin()).expect("parse class");
        let mut recorder = Recorder::default();

        interpret(&class.methods[0], &mut recorder).expect("interpret");

        assert!(recorder.calls.is_empty());
    }
}
