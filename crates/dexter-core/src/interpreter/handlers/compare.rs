//! Three-way comparisons

use std::cmp::Ordering;

use dexter_bytecode::Opcode;

use crate::exception::Thrown;
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;

/// `cmpl`: NaN compares as less
macro_rules! cmpl {
    ($x:expr, $y:expr) => {{
        let (x, y) = ($x, $y);
        if x > y {
            1
        } else if x == y {
            0
        } else {
            -1
        }
    }};
}

/// `cmpg`: NaN compares as greater
macro_rules! cmpg {
    ($x:expr, $y:expr) => {{
        let (x, y) = ($x, $y);
        if x < y {
            -1
        } else if x == y {
            0
        } else {
            1
        }
    }};
}

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_compare_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        let (b, c) = (self.b(), self.c());
        let result = match op {
            Opcode::CmplFloat => cmpl!(self.frame.get_vreg_float(b), self.frame.get_vreg_float(c)),
            Opcode::CmpgFloat => cmpg!(self.frame.get_vreg_float(b), self.frame.get_vreg_float(c)),
            Opcode::CmplDouble => cmpl!(self.frame.get_vreg_double(b), self.frame.get_vreg_double(c)),
            Opcode::CmpgDouble => cmpg!(self.frame.get_vreg_double(b), self.frame.get_vreg_double(c)),
            Opcode::CmpLong => match self.frame.get_vreg_long(b).cmp(&self.frame.get_vreg_long(c)) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            },
            _ => self.unexpected_opcode(),
        };
        self.frame.set_vreg(self.a(), result);
        Ok(Flow::Continue)
    }
}
