//! Array creation, access and bulk fill

use dexter_bytecode::{ArrayDataPayload, Opcode};

use crate::class::Primitive;
use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;
use crate::value::{JValue, ObjRef};

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_array_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        match op {
            Opcode::ArrayLength => {
                let array = self.array_operand(self.b(), "Attempt to get length of null array")?;
                let length = self.array_length(array)?;
                self.frame.set_vreg(self.a(), length as i32);
            }
            Opcode::NewArray => {
                let length = self.frame.get_vreg(self.b());
                let class = self.interp.linker.resolve_class(self.heap(), self.inst.vreg_c())?;
                let array = self.heap().alloc_array(class, length)?;
                self.frame.set_vreg_reference(self.a(), Some(array));
            }
            Opcode::FilledNewArray | Opcode::FilledNewArrayRange => self.filled_new_array()?,
            Opcode::FillArrayData => self.fill_array_data()?,

            Opcode::Aget
            | Opcode::AgetWide
            | Opcode::AgetObject
            | Opcode::AgetBoolean
            | Opcode::AgetByte
            | Opcode::AgetChar
            | Opcode::AgetShort => {
                let array = self.array_operand(self.b(), "Attempt to read from null array")?;
                let index = self.frame.get_vreg(self.c());
                let value = self.heap().array_get(array, index)?;
                let dst = self.a();
                match op {
                    Opcode::AgetWide => self.frame.set_vreg_long(dst, value.get_j()),
                    Opcode::AgetObject => self.frame.set_vreg_reference(dst, value.get_l()),
                    _ => self.frame.set_vreg(dst, value.get_i()),
                }
            }

            Opcode::Aput
            | Opcode::AputWide
            | Opcode::AputObject
            | Opcode::AputBoolean
            | Opcode::AputByte
            | Opcode::AputChar
            | Opcode::AputShort => {
                let array = self.array_operand(self.b(), "Attempt to write to null array")?;
                let index = self.frame.get_vreg(self.c());
                let src = self.a();
                let value = match op {
                    Opcode::AputWide => JValue::from_long(self.frame.get_vreg_long(src)),
                    Opcode::AputObject => JValue::from_ref(self.frame.get_vreg_reference(src)),
                    _ => JValue::from_int(self.frame.get_vreg(src)),
                };
                if let Some(transaction) = self.transaction() {
                    self.check_write_constraint(transaction, array)?;
                    if let Some(stored) = value.get_l() {
                        self.check_write_value_constraint(transaction, stored)?;
                    }
                    transaction.record_array_element(self.heap(), array, index);
                }
                self.heap().array_set(array, index, value)?;
            }
            _ => self.unexpected_opcode(),
        }
        Ok(Flow::Continue)
    }

    fn array_operand(&self, register: usize, null_message: &str) -> Result<ObjRef, Thrown> {
        self.frame
            .get_vreg_reference(register)
            .ok_or_else(|| self.null_pointer(null_message))
    }

    fn array_length(&self, array: ObjRef) -> Result<usize, Thrown> {
        self.heap().array_length(array).ok_or_else(|| {
            let message = format!("{} is not an array", self.describe_class(self.heap().class_of(array)));
            self.throw(ThrowKind::InternalError, &message)
        })
    }

    /// `filled-new-array{,/range}`: int or reference components only
    fn filled_new_array(&mut self) -> Result<(), Thrown> {
        let heap = self.heap();
        let array_class = self.interp.linker.resolve_class(heap, self.inst.vreg_b())?;
        let Some(component) = heap.class(array_class).component_type() else {
            let message = format!("{} is not an array class", self.describe_class(array_class));
            return Err(self.throw(ThrowKind::InternalError, &message));
        };
        let kind = heap.class(component).primitive();
        match kind {
            Primitive::Int | Primitive::Not => {}
            Primitive::Long | Primitive::Double => {
                let message = format!("Bad filled array request for type {}", self.describe_class(component));
                return Err(self.throw(ThrowKind::RuntimeException, &message));
            }
            _ => {
                let message = format!(
                    "Found type {}; filled-new-array not implemented for anything but 'int'",
                    self.describe_class(component)
                );
                return Err(self.throw(ThrowKind::InternalError, &message));
            }
        }

        let registers = self.inst.arg_registers();
        let array = heap.alloc_array(array_class, registers.len() as i32)?;
        let values: Vec<JValue> = registers
            .iter()
            .map(|&r| match kind {
                Primitive::Int => JValue::from_int(self.frame.get_vreg(r as usize)),
                _ => JValue::from_ref(self.frame.get_vreg_reference(r as usize)),
            })
            .collect();
        heap.with_array(array, |data| {
            for (index, value) in values.into_iter().enumerate() {
                data.set(index, value);
            }
        });
        self.ctx.result_register = JValue::from_ref(Some(array));
        Ok(())
    }

    /// `fill-array-data`: copy a payload into a primitive array
    fn fill_array_data(&mut self) -> Result<(), Thrown> {
        let heap = self.heap();
        let array = self.array_operand(self.a(), "null array in FILL_ARRAY_DATA instruction")?;
        let payload = ArrayDataPayload::parse(self.inst.code(), self.payload_offset()).map_err(|e| self.bad_payload(e))?;
        let length = self.array_length(array)?;
        let count = payload.element_count();
        if count > length {
            let message = format!("failed FILL_ARRAY_DATA; length={}, index={}", length, count);
            return Err(self.throw(ThrowKind::ArrayIndexOutOfBoundsException, &message));
        }
        let array_class = heap.class_of(array);
        let kind = heap
            .class(array_class)
            .component_type()
            .map_or(Primitive::Not, |component| heap.class(component).primitive());
        if kind == Primitive::Not || kind.component_size() != payload.element_width() {
            let message = format!(
                "fill-array-data of width {} into {}",
                payload.element_width(),
                self.describe_class(array_class)
            );
            return Err(self.throw(ThrowKind::InternalError, &message));
        }
        if let Some(transaction) = self.transaction() {
            self.check_write_constraint(transaction, array)?;
            for index in 0..count {
                transaction.record_array_element(heap, array, index as i32);
            }
        }
        heap.with_array(array, |data| {
            for index in 0..count {
                data.set_raw(index, payload.element(index));
            }
        });
        Ok(())
    }
}
