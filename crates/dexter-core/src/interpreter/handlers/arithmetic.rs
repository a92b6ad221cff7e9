//! Binary arithmetic in its three operand shapes
//!
//! - `binop vAA, vBB, vCC`
//! - `binop/2addr vA, vB`, where A is both source and destination
//! - `binop/lit16` and `binop/lit8`, with a sign-extended literal as C
//!
//! Integer arithmetic wraps. Integer division by zero raises
//! `ArithmeticException`; `MIN / -1` yields `MIN` and `MIN % -1` yields 0.

use dexter_bytecode::Opcode;

use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Int,
    Long,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    /// Reverse subtract: `rhs - lhs`
    Rsub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    ThreeReg,
    TwoAddr,
    Literal,
}

macro_rules! binop_table {
    ($op:expr; $( $opcode:ident => $ty:ident $bin:ident $shape:ident ),* $(,)?) => {
        match $op {
            $( Opcode::$opcode => Some((Ty::$ty, BinOp::$bin, Shape::$shape)), )*
            _ => None,
        }
    };
}

fn decode(op: Opcode) -> Option<(Ty, BinOp, Shape)> {
    binop_table! { op;
        AddInt => Int Add ThreeReg, SubInt => Int Sub ThreeReg, MulInt => Int Mul ThreeReg,
        DivInt => Int Div ThreeReg, RemInt => Int Rem ThreeReg, AndInt => Int And ThreeReg,
        OrInt => Int Or ThreeReg, XorInt => Int Xor ThreeReg, ShlInt => Int Shl ThreeReg,
        ShrInt => Int Shr ThreeReg, UshrInt => Int Ushr ThreeReg,
        AddLong => Long Add ThreeReg, SubLong => Long Sub ThreeReg, MulLong => Long Mul ThreeReg,
        DivLong => Long Div ThreeReg, RemLong => Long Rem ThreeReg, AndLong => Long And ThreeReg,
        OrLong => Long Or ThreeReg, XorLong => Long Xor ThreeReg, ShlLong => Long Shl ThreeReg,
        ShrLong => Long Shr ThreeReg, UshrLong => Long Ushr ThreeReg,
        AddFloat => Float Add ThreeReg, SubFloat => Float Sub ThreeReg, MulFloat => Float Mul ThreeReg,
        DivFloat => Float Div ThreeReg, RemFloat => Float Rem ThreeReg,
        AddDouble => Double Add ThreeReg, SubDouble => Double Sub ThreeReg, MulDouble => Double Mul ThreeReg,
        DivDouble => Double Div ThreeReg, RemDouble => Double Rem ThreeReg,

        AddInt2addr => Int Add TwoAddr, SubInt2addr => Int Sub TwoAddr, MulInt2addr => Int Mul TwoAddr,
        DivInt2addr => Int Div TwoAddr, RemInt2addr => Int Rem TwoAddr, AndInt2addr => Int And TwoAddr,
        OrInt2addr => Int Or TwoAddr, XorInt2addr => Int Xor TwoAddr, ShlInt2addr => Int Shl TwoAddr,
        ShrInt2addr => Int Shr TwoAddr, UshrInt2addr => Int Ushr TwoAddr,
        AddLong2addr => Long Add TwoAddr, SubLong2addr => Long Sub TwoAddr, MulLong2addr => Long Mul TwoAddr,
        DivLong2addr => Long Div TwoAddr, RemLong2addr => Long Rem TwoAddr, AndLong2addr => Long And TwoAddr,
        OrLong2addr => Long Or TwoAddr, XorLong2addr => Long Xor TwoAddr, ShlLong2addr => Long Shl TwoAddr,
        ShrLong2addr => Long Shr TwoAddr, UshrLong2addr => Long Ushr TwoAddr,
        AddFloat2addr => Float Add TwoAddr, SubFloat2addr => Float Sub TwoAddr, MulFloat2addr => Float Mul TwoAddr,
        DivFloat2addr => Float Div TwoAddr, RemFloat2addr => Float Rem TwoAddr,
        AddDouble2addr => Double Add TwoAddr, SubDouble2addr => Double Sub TwoAddr,
        MulDouble2addr => Double Mul TwoAddr, DivDouble2addr => Double Div TwoAddr,
        RemDouble2addr => Double Rem TwoAddr,

        AddIntLit16 => Int Add Literal, RsubInt => Int Rsub Literal, MulIntLit16 => Int Mul Literal,
        DivIntLit16 => Int Div Literal, RemIntLit16 => Int Rem Literal, AndIntLit16 => Int And Literal,
        OrIntLit16 => Int Or Literal, XorIntLit16 => Int Xor Literal,
        AddIntLit8 => Int Add Literal, RsubIntLit8 => Int Rsub Literal, MulIntLit8 => Int Mul Literal,
        DivIntLit8 => Int Div Literal, RemIntLit8 => Int Rem Literal, AndIntLit8 => Int And Literal,
        OrIntLit8 => Int Or Literal, XorIntLit8 => Int Xor Literal, ShlIntLit8 => Int Shl Literal,
        ShrIntLit8 => Int Shr Literal, UshrIntLit8 => Int Ushr Literal,
    }
}

/// `None` on integer division by zero
fn int_op(op: BinOp, x: i32, y: i32) -> Option<i32> {
    Some(match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Rsub => y.wrapping_sub(x),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Div if y == 0 => return None,
        BinOp::Div => x.wrapping_div(y),
        BinOp::Rem if y == 0 => return None,
        BinOp::Rem => x.wrapping_rem(y),
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        BinOp::Shl => x.wrapping_shl((y & 0x1f) as u32),
        BinOp::Shr => x >> (y & 0x1f),
        BinOp::Ushr => ((x as u32) >> (y & 0x1f)) as i32,
    })
}

/// Shift distances arrive as an int; `None` on division by zero
fn long_op(op: BinOp, x: i64, y: i64) -> Option<i64> {
    Some(match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Rsub => y.wrapping_sub(x),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Div if y == 0 => return None,
        BinOp::Div => x.wrapping_div(y),
        BinOp::Rem if y == 0 => return None,
        BinOp::Rem => x.wrapping_rem(y),
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        BinOp::Shl => x.wrapping_shl((y & 0x3f) as u32),
        BinOp::Shr => x >> (y & 0x3f),
        BinOp::Ushr => ((x as u64) >> (y & 0x3f)) as i64,
    })
}

macro_rules! float_op {
    ($op:expr, $x:expr, $y:expr) => {{
        let (x, y) = ($x, $y);
        match $op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Div => x / y,
            BinOp::Rem => x % y,
            other => unreachable!("{:?} on floating point", other),
        }
    }};
}

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_arithmetic_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        let Some((ty, bin, shape)) = decode(op) else {
            self.unexpected_opcode()
        };
        let (dst, lhs, rhs) = match shape {
            Shape::ThreeReg => (self.a(), self.b(), self.c()),
            Shape::TwoAddr => (self.a(), self.a(), self.b()),
            Shape::Literal => (self.a(), self.b(), 0),
        };
        match ty {
            Ty::Int => {
                let x = self.frame.get_vreg(lhs);
                let y = match shape {
                    Shape::Literal => self.inst.vreg_c() as i32,
                    _ => self.frame.get_vreg(rhs),
                };
                let result = int_op(bin, x, y).ok_or_else(|| self.divide_by_zero())?;
                self.frame.set_vreg(dst, result);
            }
            Ty::Long => {
                let x = self.frame.get_vreg_long(lhs);
                let y = match bin {
                    BinOp::Shl | BinOp::Shr | BinOp::Ushr => self.frame.get_vreg(rhs) as i64,
                    _ => self.frame.get_vreg_long(rhs),
                };
                let result = long_op(bin, x, y).ok_or_else(|| self.divide_by_zero())?;
                self.frame.set_vreg_long(dst, result);
            }
            Ty::Float => {
                let result = float_op!(bin, self.frame.get_vreg_float(lhs), self.frame.get_vreg_float(rhs));
                self.frame.set_vreg_float(dst, result);
            }
            Ty::Double => {
                let result = float_op!(bin, self.frame.get_vreg_double(lhs), self.frame.get_vreg_double(rhs));
                self.frame.set_vreg_double(dst, result);
            }
        }
        Ok(Flow::Continue)
    }

    fn divide_by_zero(&self) -> Thrown {
        self.throw(ThrowKind::ArithmeticException, "divide by zero")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_division_edge_cases() {
        assert_eq!(int_op(BinOp::Div, 7, 0), None);
        assert_eq!(int_op(BinOp::Rem, 7, 0), None);
        assert_eq!(int_op(BinOp::Div, i32::MIN, -1), Some(i32::MIN));
        assert_eq!(int_op(BinOp::Rem, i32::MIN, -1), Some(0));
        assert_eq!(int_op(BinOp::Div, -7, 2), Some(-3));
        assert_eq!(int_op(BinOp::Rem, -7, 2), Some(-1));
    }

    #[test]
    fn test_shifts_mask_distance() {
        assert_eq!(int_op(BinOp::Shl, 1, 33), Some(2));
        assert_eq!(int_op(BinOp::Ushr, -1, 28), Some(0xf));
        assert_eq!(int_op(BinOp::Shr, -16, 2), Some(-4));
        assert_eq!(long_op(BinOp::Shl, 1, 65), Some(2));
        assert_eq!(long_op(BinOp::Ushr, -1, 60), Some(0xf));
    }

    #[test]
    fn test_rsub_and_wrapping() {
        assert_eq!(int_op(BinOp::Rsub, 3, 10), Some(7));
        assert_eq!(int_op(BinOp::Add, i32::MAX, 1), Some(i32::MIN));
        assert_eq!(long_op(BinOp::Mul, i64::MAX, 2), Some(-2));
        assert_eq!(long_op(BinOp::Div, i64::MIN, -1), Some(i64::MIN));
    }

    #[test]
    fn test_float_remainder_is_truncating() {
        let r: f64 = float_op!(BinOp::Rem, -5.5f64, 2.0f64);
        assert_eq!(r, -1.5);
        let q: f32 = float_op!(BinOp::Div, 1.0f32, 0.0f32);
        assert!(q.is_infinite());
    }

    #[test]
    fn test_decode_shapes() {
        assert_eq!(decode(Opcode::AddInt), Some((Ty::Int, BinOp::Add, Shape::ThreeReg)));
        assert_eq!(decode(Opcode::UshrLong2addr), Some((Ty::Long, BinOp::Ushr, Shape::TwoAddr)));
        assert_eq!(decode(Opcode::RsubIntLit8), Some((Ty::Int, BinOp::Rsub, Shape::Literal)));
        assert_eq!(decode(Opcode::Nop), None);
    }
}
