//! Constant loads

use dexter_bytecode::Opcode;

use crate::exception::Thrown;
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_const_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        let dst = self.a();
        if op == Opcode::ConstWide {
            self.frame.set_vreg_long(dst, self.inst.wide_vreg_b() as i64);
            return Ok(Flow::Continue);
        }
        let literal = self.inst.vreg_b();
        let heap = self.heap();
        let linker = self.interp.linker;
        match op {
            // Narrow literals arrive sign-extended; a zero literal also nulls the reference view.
            Opcode::Const4 | Opcode::Const16 | Opcode::Const => self.frame.set_vreg(dst, literal as i32),
            Opcode::ConstHigh16 => self.frame.set_vreg(dst, (literal << 16) as i32),
            Opcode::ConstWide16 | Opcode::ConstWide32 => self.frame.set_vreg_long(dst, literal as i32 as i64),
            Opcode::ConstWideHigh16 => self.frame.set_vreg_long(dst, ((literal as u64) << 48) as i64),

            // Resolution failures leave the destination untouched.
            Opcode::ConstString | Opcode::ConstStringJumbo => {
                let string = linker.resolve_string(heap, literal)?;
                self.frame.set_vreg_reference(dst, Some(string));
            }
            Opcode::ConstClass => {
                let class = linker.resolve_class(heap, literal)?;
                self.frame.set_vreg_reference(dst, Some(heap.class_object(class)));
            }
            Opcode::ConstMethodHandle => {
                let handle = linker.resolve_method_handle(heap, literal)?;
                self.frame.set_vreg_reference(dst, Some(handle));
            }
            Opcode::ConstMethodType => {
                let method_type = linker.resolve_method_type(heap, literal)?;
                self.frame.set_vreg_reference(dst, Some(method_type));
            }
            _ => self.unexpected_opcode(),
        }
        Ok(Flow::Continue)
    }
}
