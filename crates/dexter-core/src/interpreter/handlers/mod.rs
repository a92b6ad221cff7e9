//! Instruction handler families
//!
//! Each module implements one category of opcodes as a method on
//! [`InstructionHandler`] that matches on the opcode subset it owns.

mod arithmetic;
mod arrays;
mod branches;
mod compare;
mod constants;
mod fields;
mod invoke;
mod moves;
mod objects;
mod returns;
mod unary;

use dexter_bytecode::DecodeError;

use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::dispatch::InstructionHandler;
use crate::transaction::Transaction;
use crate::value::ObjRef;

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    /// Code offset of the payload referenced by operand B
    fn payload_offset(&self) -> usize {
        (self.dex_pc() as i64 + self.inst.vreg_b() as i32 as i64) as usize
    }

    fn bad_payload(&self, error: DecodeError) -> Thrown {
        tracing::error!(target: "dexter::interp", method = %self.method, dex_pc = self.dex_pc(), %error, "malformed payload");
        self.throw(ThrowKind::InternalError, &error.to_string())
    }

    /// Abort `transaction` if `object` may not be written
    fn check_write_constraint(&self, transaction: &Transaction, object: ObjRef) -> Result<(), Thrown> {
        if transaction.write_constraint(object) {
            let message = format!("Can't set fields of {}", self.describe_class(self.heap().class_of(object)));
            return Err(self.abort_transaction(transaction, message));
        }
        Ok(())
    }

    /// Abort `transaction` if storing a reference to `value` could escape it
    fn check_write_value_constraint(&self, transaction: &Transaction, value: ObjRef) -> Result<(), Thrown> {
        let heap = self.heap();
        if transaction.value_constraint(heap, value) {
            let message = match heap.mirrored_class(value) {
                Some(class) => format!("Can't store reference to class {}", self.describe_class(class)),
                None => format!(
                    "Can't store reference to instance of {}",
                    self.describe_class(heap.class_of(value))
                ),
            };
            return Err(self.abort_transaction(transaction, message));
        }
        Ok(())
    }
}
