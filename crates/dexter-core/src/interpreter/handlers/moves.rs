//! Register moves

use dexter_bytecode::Opcode;

use crate::exception::Thrown;
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_move_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        let dst = self.a();
        match op {
            Opcode::Move | Opcode::MoveFrom16 | Opcode::Move16 => {
                let value = self.frame.get_vreg(self.b());
                self.frame.set_vreg(dst, value);
            }
            Opcode::MoveWide | Opcode::MoveWideFrom16 | Opcode::MoveWide16 => {
                let value = self.frame.get_vreg_long(self.b());
                self.frame.set_vreg_long(dst, value);
            }
            Opcode::MoveObject | Opcode::MoveObjectFrom16 | Opcode::MoveObject16 => {
                let value = self.frame.get_vreg_reference(self.b());
                self.frame.set_vreg_reference(dst, value);
            }
            Opcode::MoveResult => self.frame.set_vreg(dst, self.ctx.result_register.get_i()),
            Opcode::MoveResultWide => self.frame.set_vreg_long(dst, self.ctx.result_register.get_j()),
            Opcode::MoveResultObject => self.frame.set_vreg_reference(dst, self.ctx.result_register.get_l()),
            Opcode::MoveException => {
                let exception = self.thread.take_exception();
                debug_assert!(exception.is_some(), "move-exception without a pending exception");
                self.frame.set_vreg_reference(dst, exception);
            }
            _ => self.unexpected_opcode(),
        }
        Ok(Flow::Continue)
    }
}
