//! Structural verification of code items
//!
//! This is not a type verifier. It checks the properties the interpreter
//! relies on without re-checking them per instruction: every opcode is
//! assigned, every instruction fits, register operands are in range,
//! branch and switch targets land on instruction boundaries, payload
//! references point at payloads of the right kind, and execution cannot
//! fall off the end of the code.

use std::collections::HashSet;

use crate::error::DecodeError;
use crate::instruction::Instruction;
use crate::opcode::{Format, Opcode};
use crate::payload::{ArrayDataPayload, PackedSwitchPayload, SparseSwitchPayload};

/// Bytecode verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Unassigned opcode
    #[error("Invalid opcode {opcode:#x} at offset {offset}")]
    InvalidOpcode {
        /// Opcode byte
        opcode: u8,
        /// Offset of the instruction
        offset: u32,
    },

    /// Register operand outside the frame
    #[error("Register v{register} out of range (frame has {max}) at offset {offset}")]
    InvalidRegister {
        /// Register index
        register: u32,
        /// Frame size
        max: u16,
        /// Offset of the instruction
        offset: u32,
    },

    /// Branch target not on an instruction boundary
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// Absolute target
        target: i64,
        /// Offset of the branching instruction
        offset: u32,
    },

    /// 31t instruction that does not reference a payload of the right kind
    #[error("Bad payload reference from offset {offset}: {source}")]
    BadPayload {
        /// Offset of the referencing instruction
        offset: u32,
        /// Underlying decode failure
        #[source]
        source: DecodeError,
    },

    /// Execution falls off end
    #[error("Execution falls off end of code at offset {0}")]
    FallOffEnd(u32),

    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Verify a code item of `registers_size` registers
pub fn verify_code(code: &[u16], registers_size: u16) -> Result<(), VerifyError> {
    // Empty code items are allowed
    if code.is_empty() {
        return Ok(());
    }

    let instructions = parse_instructions(code)?;
    let boundaries: HashSet<u32> = instructions.iter().map(|i| i.dex_pc()).collect();

    let starts_payload = |pc: usize| instructions.iter().any(|i| i.dex_pc() as usize == pc && i.is_payload());

    let mut last_executable = None;
    for inst in &instructions {
        if inst.is_payload() {
            continue;
        }
        // Alignment padding in front of a payload is never executed.
        let end = inst.dex_pc() as usize + inst.size_in_code_units();
        let is_padding = inst.opcode() == Opcode::Nop && starts_payload(end);
        let op = inst.opcode();
        let offset = inst.dex_pc();
        if op.is_unused() {
            return Err(VerifyError::InvalidOpcode {
                opcode: op.to_u8(),
                offset,
            });
        }
        for register in register_operands(inst) {
            if register >= registers_size as u32 {
                return Err(VerifyError::InvalidRegister {
                    register,
                    max: registers_size,
                    offset,
                });
            }
        }
        for target in branch_targets(inst, code)? {
            if target < 0 || !boundaries.contains(&(target as u32)) {
                return Err(VerifyError::InvalidJumpTarget { target, offset });
            }
        }
        if !is_padding {
            last_executable = Some(*inst);
        }
    }

    if let Some(last) = last_executable {
        let end = last.dex_pc() as usize + last.size_in_code_units();
        let followed_by_code = instructions
            .iter()
            .any(|i| i.dex_pc() as usize == end && !i.is_payload());
        if last.opcode().can_continue() && !followed_by_code {
            return Err(VerifyError::FallOffEnd(last.dex_pc()));
        }
    }

    Ok(())
}

/// Split a code item into instructions
fn parse_instructions(code: &[u16]) -> Result<Vec<Instruction<'_>>, VerifyError> {
    let mut instructions = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let inst = Instruction::try_at(code, pc as u32)?;
        pc += inst.size_in_code_units();
        instructions.push(inst);
    }
    Ok(instructions)
}

/// Register operands of an instruction, per its format
fn register_operands(inst: &Instruction<'_>) -> Vec<u32> {
    match inst.format() {
        Format::F10x | Format::F10t | Format::F20t | Format::F30t => vec![],
        Format::F11n
        | Format::F11x
        | Format::F21t
        | Format::F21s
        | Format::F21h
        | Format::F21c
        | Format::F31t
        | Format::F31i
        | Format::F31c
        | Format::F51l => vec![inst.vreg_a()],
        Format::F12x | Format::F22x | Format::F32x | Format::F22b | Format::F22t | Format::F22s | Format::F22c => {
            vec![inst.vreg_a(), inst.vreg_b()]
        }
        Format::F23x => vec![inst.vreg_a(), inst.vreg_b(), inst.vreg_c()],
        Format::F35c | Format::F45cc | Format::F3rc | Format::F4rcc => inst.arg_registers(),
    }
}

/// Absolute targets an instruction may transfer control to
fn branch_targets(inst: &Instruction<'_>, code: &[u16]) -> Result<Vec<i64>, VerifyError> {
    let pc = inst.dex_pc() as i64;
    let op = inst.opcode();
    let targets = match op.format() {
        Format::F10t | Format::F20t | Format::F30t => vec![pc + inst.vreg_a() as i32 as i64],
        Format::F21t => vec![pc + inst.vreg_b() as i32 as i64],
        Format::F22t => vec![pc + inst.vreg_c() as i32 as i64],
        Format::F31t => {
            let payload = pc + inst.vreg_b() as i32 as i64;
            if payload < 0 || payload as usize >= code.len() {
                return Err(VerifyError::InvalidJumpTarget {
                    target: payload,
                    offset: inst.dex_pc(),
                });
            }
            let payload = payload as usize;
            let bad = |source| VerifyError::BadPayload {
                offset: inst.dex_pc(),
                source,
            };
            match op {
                Opcode::PackedSwitch => PackedSwitchPayload::parse(code, payload)
                    .map_err(bad)?
                    .targets()
                    .map(|t| pc + t as i64)
                    .collect(),
                Opcode::SparseSwitch => SparseSwitchPayload::parse(code, payload)
                    .map_err(bad)?
                    .targets()
                    .map(|t| pc + t as i64)
                    .collect(),
                _ => {
                    ArrayDataPayload::parse(code, payload).map_err(bad)?;
                    vec![]
                }
            }
        }
        _ => vec![],
    };
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::CodeWriter;

    #[test]
    fn test_valid_loop() {
        let mut w = CodeWriter::new();
        let top = w.new_label();
        let done = w.new_label();
        w.emit_11n(Opcode::Const4, 0, 3);
        w.bind(top);
        w.emit_21t(Opcode::IfEqz, 0, done);
        w.emit_22b(Opcode::AddIntLit8, 0, 0, -1);
        w.emit_10t(Opcode::Goto, top);
        w.bind(done);
        w.emit_11x(Opcode::Return, 0);
        assert!(verify_code(&w.finish(), 1).is_ok());
    }

    #[test]
    fn test_empty_code() {
        assert!(verify_code(&[], 0).is_ok());
    }

    #[test]
    fn test_unused_opcode() {
        let code = [0x003eu16, 0x000e];
        let err = verify_code(&code, 0).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidOpcode { opcode: 0x3e, offset: 0 }));
    }

    #[test]
    fn test_register_out_of_range() {
        let mut w = CodeWriter::new();
        w.emit_11x(Opcode::Return, 4);
        let err = verify_code(&w.finish(), 2).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidRegister { register: 4, max: 2, .. }));
    }

    #[test]
    fn test_jump_into_middle_of_instruction() {
        // goto +2 lands inside the const/16
        let code = [0x0228u16, 0x0013, 0x0005, 0x000e];
        let err = verify_code(&code, 1).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidJumpTarget { target: 2, offset: 0 }));
    }

    #[test]
    fn test_fall_off_end() {
        let mut w = CodeWriter::new();
        w.emit_11n(Opcode::Const4, 0, 1);
        let err = verify_code(&w.finish(), 1).unwrap_err();
        assert!(matches!(err, VerifyError::FallOffEnd(0)));
    }

    #[test]
    fn test_switch_must_reference_switch_payload() {
        let mut w = CodeWriter::new();
        let payload = w.new_label();
        w.emit_31t(Opcode::PackedSwitch, 0, payload);
        w.emit_10x(Opcode::ReturnVoid);
        w.emit_array_data(payload, 1, &[1, 2]);
        let err = verify_code(&w.finish(), 1).unwrap_err();
        assert!(matches!(err, VerifyError::BadPayload { offset: 0, .. }));
    }

    #[test]
    fn test_payload_padding_is_not_fall_through() {
        let mut w = CodeWriter::new();
        let payload = w.new_label();
        w.emit_31t(Opcode::FillArrayData, 0, payload);
        w.emit_10x(Opcode::ReturnVoid);
        w.emit_10x(Opcode::ReturnVoid);
        // Five units so far: the writer pads with a nop.
        w.emit_array_data(payload, 4, &[7]);
        let code = w.finish();
        assert_eq!(code[5], 0x0000);
        verify_code(&code, 1).unwrap();
    }

    #[test]
    fn test_truncated_instruction() {
        let code = [0x0014u16];
        assert!(matches!(verify_code(&code, 1), Err(VerifyError::Decode(_))));
    }
}
