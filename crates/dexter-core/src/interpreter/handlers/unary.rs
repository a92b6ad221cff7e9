//! Negation, bitwise not and primitive conversions
//!
//! Float-to-integer conversions use `as`, which saturates and maps NaN to
//! zero, matching Java's narrowing rules.

use dexter_bytecode::Opcode;

use crate::exception::Thrown;
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_unary_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        use Opcode::*;
        let (dst, src) = (self.a(), self.b());
        let frame = &mut *self.frame;
        match op {
            NegInt => frame.set_vreg(dst, frame.get_vreg(src).wrapping_neg()),
            NotInt => frame.set_vreg(dst, !frame.get_vreg(src)),
            NegLong => frame.set_vreg_long(dst, frame.get_vreg_long(src).wrapping_neg()),
            NotLong => frame.set_vreg_long(dst, !frame.get_vreg_long(src)),
            NegFloat => frame.set_vreg_float(dst, -frame.get_vreg_float(src)),
            NegDouble => frame.set_vreg_double(dst, -frame.get_vreg_double(src)),

            IntToLong => frame.set_vreg_long(dst, frame.get_vreg(src) as i64),
            IntToFloat => frame.set_vreg_float(dst, frame.get_vreg(src) as f32),
            IntToDouble => frame.set_vreg_double(dst, frame.get_vreg(src) as f64),
            LongToInt => frame.set_vreg(dst, frame.get_vreg_long(src) as i32),
            LongToFloat => frame.set_vreg_float(dst, frame.get_vreg_long(src) as f32),
            LongToDouble => frame.set_vreg_double(dst, frame.get_vreg_long(src) as f64),
            FloatToInt => frame.set_vreg(dst, frame.get_vreg_float(src) as i32),
            FloatToLong => frame.set_vreg_long(dst, frame.get_vreg_float(src) as i64),
            FloatToDouble => frame.set_vreg_double(dst, frame.get_vreg_float(src) as f64),
            DoubleToInt => frame.set_vreg(dst, frame.get_vreg_double(src) as i32),
            DoubleToLong => frame.set_vreg_long(dst, frame.get_vreg_double(src) as i64),
            DoubleToFloat => frame.set_vreg_float(dst, frame.get_vreg_double(src) as f32),

            IntToByte => frame.set_vreg(dst, frame.get_vreg(src) as i8 as i32),
            IntToChar => frame.set_vreg(dst, frame.get_vreg(src) as u16 as i32),
            IntToShort => frame.set_vreg(dst, frame.get_vreg(src) as i16 as i32),
            _ => self.unexpected_opcode(),
        }
        Ok(Flow::Continue)
    }
}
