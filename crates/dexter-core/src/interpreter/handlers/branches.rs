//! Unconditional, conditional and switch branches

use dexter_bytecode::{Opcode, PackedSwitchPayload, SparseSwitchPayload};

use crate::exception::Thrown;
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;

/// Width of `if-*` and `if-*z`, reported as the offset of a fall-through
const IF_WIDTH: i32 = 2;
/// Width of the switch instructions
const SWITCH_WIDTH: i32 = 3;

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_branch_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        match op {
            Opcode::Goto | Opcode::Goto16 | Opcode::Goto32 => {
                self.handle_async_exception()?;
                self.take_branch(self.inst.vreg_a() as i32)
            }
            Opcode::PackedSwitch => {
                let test = self.frame.get_vreg(self.a());
                let payload = PackedSwitchPayload::parse(self.inst.code(), self.payload_offset())
                    .map_err(|e| self.bad_payload(e))?;
                match payload.lookup(test) {
                    Some(offset) => self.take_branch(offset),
                    None => self.skip_branch(SWITCH_WIDTH),
                }
            }
            Opcode::SparseSwitch => {
                let test = self.frame.get_vreg(self.a());
                let payload = SparseSwitchPayload::parse(self.inst.code(), self.payload_offset())
                    .map_err(|e| self.bad_payload(e))?;
                match payload.lookup(test) {
                    Some(offset) => self.take_branch(offset),
                    None => self.skip_branch(SWITCH_WIDTH),
                }
            }
            _ => {
                let taken = self.condition(op);
                if taken {
                    let offset = match op {
                        Opcode::IfEq | Opcode::IfNe | Opcode::IfLt | Opcode::IfGe | Opcode::IfGt | Opcode::IfLe => {
                            self.inst.vreg_c() as i32
                        }
                        _ => self.inst.vreg_b() as i32,
                    };
                    self.take_branch(offset)
                } else {
                    self.skip_branch(IF_WIDTH)
                }
            }
        }
    }

    fn condition(&self, op: Opcode) -> bool {
        let lhs = self.frame.get_vreg(self.a());
        match op {
            Opcode::IfEq => lhs == self.frame.get_vreg(self.b()),
            Opcode::IfNe => lhs != self.frame.get_vreg(self.b()),
            Opcode::IfLt => lhs < self.frame.get_vreg(self.b()),
            Opcode::IfGe => lhs >= self.frame.get_vreg(self.b()),
            Opcode::IfGt => lhs > self.frame.get_vreg(self.b()),
            Opcode::IfLe => lhs <= self.frame.get_vreg(self.b()),
            Opcode::IfEqz => lhs == 0,
            Opcode::IfNez => lhs != 0,
            Opcode::IfLtz => lhs < 0,
            Opcode::IfGez => lhs >= 0,
            Opcode::IfGtz => lhs > 0,
            Opcode::IfLez => lhs <= 0,
            _ => self.unexpected_opcode(),
        }
    }
}
