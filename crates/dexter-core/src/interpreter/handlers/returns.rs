//! Method return

use std::sync::atomic::{fence, Ordering};

use dexter_bytecode::Opcode;

use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;
use crate::value::{JValue, ObjRef};

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_return_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        let reference_register = (op == Opcode::ReturnObject).then(|| self.a());
        let result = match op {
            Opcode::ReturnVoid => {
                // Publishes final fields written by a constructor.
                fence(Ordering::Release);
                JValue::default()
            }
            Opcode::ReturnVoidNoBarrier => JValue::default(),
            Opcode::Return => JValue::from_int(self.frame.get_vreg(self.a())),
            Opcode::ReturnWide => JValue::from_long(self.frame.get_vreg_long(self.a())),
            Opcode::ReturnObject => {
                let value = self.frame.get_vreg_reference(self.a());
                if ACCESS_CHECK {
                    self.check_return_type(value)?;
                }
                JValue::from_ref(value)
            }
            _ => self.unexpected_opcode(),
        };
        self.handle_return(result, reference_register)
    }

    fn check_return_type(&self, value: Option<ObjRef>) -> Result<(), Thrown> {
        let heap = self.heap();
        if let (Some(object), Some(return_type)) = (value, self.method.return_type()) {
            if !heap.instance_of(object, return_type) {
                let message = format!(
                    "Returning '{}' that is not instance of return type '{}'",
                    self.describe_class(heap.class_of(object)),
                    self.describe_class(return_type)
                );
                return Err(self.throw(ThrowKind::InternalError, &message));
            }
        }
        Ok(())
    }
}
