use std::collections::BTreeSet;

use anyhow::{Context, Result};

use crate::ir::{BasicBlock, ControlFlowGraph, EdgeKind, FlowEdge, Instruction};
use crate::opcodes;
use crate::scan::{opcode_length, padding, read_u32};

/// Protected bytecode range and the offset of its handler.
#[derive(Clone, Copy, Debug)]
pub(crate) struct HandlerRange {
    pub(crate) start_pc: u32,
    pub(crate) end_pc: u32,
    pub(crate) handler_pc: u32,
}

/// Build a control flow graph from bytecode instructions.
pub(crate) fn build_cfg(
    code: &[u8],
    instructions: &[Instruction],
    handlers: &[HandlerRange],
) -> Result<ControlFlowGraph> {
    let code_len = u32::try_from(code.len()).context("method code too large")?;
    let mut leaders = BTreeSet::new();
    leaders.insert(0u32);
    for handler in handlers {
        leaders.insert(handler.handler_pc);
        leaders.insert(handler.start_pc);
    }
    for inst in instructions {
        let next = inst.offset + opcode_length(code, inst.offset as usize)? as u32;
        if let Some(targets) = branch_targets(code, inst.offset as usize)? {
            leaders.extend(targets);
            leaders.insert(next);
        }
        if is_exit_opcode(inst.opcode) {
            leaders.insert(next);
        }
    }

    let leader_list: Vec<u32> = leaders
        .into_iter()
        .filter(|offset| *offset < code_len)
        .collect();

    let mut blocks = Vec::with_capacity(leader_list.len());
    for (index, start) in leader_list.iter().copied().enumerate() {
        let end = leader_list.get(index + 1).copied().unwrap_or(code_len);
        let block_instructions = instructions
            .iter()
            .filter(|inst| inst.offset >= start && inst.offset < end)
            .cloned()
            .collect();
        blocks.push(BasicBlock {
            start_offset: start,
            end_offset: end,
            instructions: block_instructions,
        });
    }

    let mut edges = Vec::new();
    for block in &blocks {
        for handler in handlers {
            if block.start_offset >= handler.start_pc && block.start_offset < handler.end_pc {
                edges.push(FlowEdge {
                    from: block.start_offset,
                    to: handler.handler_pc,
                    kind: EdgeKind::Exception,
                });
            }
        }
        let Some(last_inst) = block.instructions.last() else {
            continue;
        };
        if let Some(targets) = branch_targets(code, last_inst.offset as usize)? {
            for target in targets {
                edges.push(FlowEdge {
                    from: block.start_offset,
                    to: target,
                    kind: EdgeKind::Branch,
                });
            }
            if is_unconditional_branch(last_inst.opcode) {
                continue;
            }
        } else if is_exit_opcode(last_inst.opcode) {
            continue;
        }
        if block.end_offset < code_len {
            edges.push(FlowEdge {
                from: block.start_offset,
                to: block.end_offset,
                kind: EdgeKind::FallThrough,
            });
        }
    }

    Ok(ControlFlowGraph { blocks, edges })
}

fn is_exit_opcode(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::IRETURN
            | opcodes::LRETURN
            | opcodes::FRETURN
            | opcodes::DRETURN
            | opcodes::ARETURN
            | opcodes::RETURN
            | opcodes::ATHROW
    )
}

fn is_unconditional_branch(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::GOTO | opcodes::JSR | opcodes::GOTO_W | opcodes::JSR_W | 0xaa | 0xab
    )
}

fn branch_targets(code: &[u8], offset: usize) -> Result<Option<Vec<u32>>> {
    let opcode = *code.get(offset).context("branch offset out of bounds")?;
    let targets = match opcode {
        0x99..=0xa6 | opcodes::GOTO | opcodes::JSR | 0xc6 | 0xc7 => {
            let branch = read_i16(code, offset + 1)?;
            vec![jump_target(offset, branch as i32)?]
        }
        opcodes::GOTO_W | opcodes::JSR_W => {
            let branch = read_i32(code, offset + 1)?;
            vec![jump_target(offset, branch)?]
        }
        0xaa => tableswitch_targets(code, offset)?,
        0xab => lookupswitch_targets(code, offset)?,
        _ => return Ok(None),
    };
    Ok(Some(targets))
}

fn jump_target(offset: usize, delta: i32) -> Result<u32> {
    let target = (offset as i64) + (delta as i64);
    u32::try_from(target).with_context(|| format!("branch target {target} out of range"))
}

fn tableswitch_targets(code: &[u8], offset: usize) -> Result<Vec<u32>> {
    let base = offset + 1 + padding(offset);
    let default = read_i32(code, base)?;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    let mut targets = vec![jump_target(offset, default)?];
    let mut idx = base + 12;
    for _ in 0..count {
        targets.push(jump_target(offset, read_i32(code, idx)?)?);
        idx += 4;
    }
    Ok(targets)
}

fn lookupswitch_targets(code: &[u8], offset: usize) -> Result<Vec<u32>> {
    let base = offset + 1 + padding(offset);
    let default = read_i32(code, base)?;
    let npairs = read_i32(code, base + 4)?;
    let mut targets = vec![jump_target(offset, default)?];
    let mut idx = base + 8;
    for _ in 0..npairs {
        targets.push(jump_target(offset, read_i32(code, idx + 4)?)?);
        idx += 8;
    }
    Ok(targets)
}

fn read_i16(code: &[u8], offset: usize) -> Result<i16> {
    let value = crate::scan::read_u16(code, offset)?;
    Ok(i16::from_be_bytes(value.to_be_bytes()))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let value = read_u32(code, offset)?;
    Ok(i32::from_be_bytes(value.to_be_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::InstructionKind;

    fn instructions_of(code: &[u8]) -> Vec<Instruction> {
        let mut instructions = Vec::new();
        let mut offset = 0usize;
        while offset < code.len() {
            let opcode = code[offset];
            instructions.push(Instruction {
                offset: offset as u32,
                opcode,
                kind: InstructionKind::Other(opcode),
            });
            offset += opcode_length(code, offset).expect("opcode length");
        }
        instructions
    }

    #[test]
    fn conditional_branch_splits_blocks() {
        // iconst_0; ifeq +5; iconst_1; pop; return
        let code = [0x03, 0x99, 0x00, 0x05, 0x04, 0x57, 0xb1];
        let cfg = build_cfg(&code, &instructions_of(&code), &[]).expect("cfg");

        let starts: Vec<u32> = cfg.blocks.iter().map(|block| block.start_offset).collect();
        assert_eq!(starts, vec![0, 4, 6]);
        assert!(cfg
            .edges
            .iter()
            .any(|edge| edge.from == 0 && edge.to == 6 && edge.kind == EdgeKind::Branch));
        assert!(cfg
            .edges
            .iter()
            .any(|edge| edge.from == 0 && edge.to == 4 && edge.kind == EdgeKind::FallThrough));
    }

    #[test]
    fn handler_ranges_add_exception_edges() {
        // nop; return; astore_1; return
        let code = [0x00, 0xb1, 0x4c, 0xb1];
        let handlers = [HandlerRange {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 2,
        }];
        let cfg = build_cfg(&code, &instructions_of(&code), &handlers).expect("cfg");

        assert_eq!(cfg.blocks.len(), 2);
        assert!(cfg
            .edges
            .iter()
            .any(|edge| edge.kind == EdgeKind::Exception && edge.to == 2));
    }

    #[test]
    fn negative_branch_target_is_rejected() {
        // goto -10
        let code = [0xa7, 0xff, 0xf6];
        assert!(build_cfg(&code, &instructions_of(&code), &[]).is_err());
    }
}
