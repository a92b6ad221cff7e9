//! Instance and static field access, including the quickened forms

use std::sync::Arc;

use dexter_bytecode::Opcode;

use crate::class::{Field, Primitive};
use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;
use crate::value::{JValue, ObjRef};

/// Register view of a field access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// 32-bit: int or float
    Narrow,
    Wide,
    Object,
    Boolean,
    Byte,
    Char,
    Short,
}

impl Access {
    fn of(op: Opcode) -> Access {
        use Opcode::*;
        match op {
            IgetWide | IputWide | SgetWide | SputWide | IgetWideQuick | IputWideQuick => Access::Wide,
            IgetObject | IputObject | SgetObject | SputObject | IgetObjectQuick | IputObjectQuick => Access::Object,
            IgetBoolean | IputBoolean | SgetBoolean | SputBoolean | IgetBooleanQuick | IputBooleanQuick => {
                Access::Boolean
            }
            IgetByte | IputByte | SgetByte | SputByte | IgetByteQuick | IputByteQuick => Access::Byte,
            IgetChar | IputChar | SgetChar | SputChar | IgetCharQuick | IputCharQuick => Access::Char,
            IgetShort | IputShort | SgetShort | SputShort | IgetShortQuick | IputShortQuick => Access::Short,
            _ => Access::Narrow,
        }
    }

    fn accepts(self, kind: Primitive) -> bool {
        match self {
            Access::Narrow => matches!(kind, Primitive::Int | Primitive::Float),
            Access::Wide => kind.is_wide(),
            Access::Object => kind == Primitive::Not,
            Access::Boolean => kind == Primitive::Boolean,
            Access::Byte => kind == Primitive::Byte,
            Access::Char => kind == Primitive::Char,
            Access::Short => kind == Primitive::Short,
        }
    }
}

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_field_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        use Opcode::*;
        let access = Access::of(op);
        match op {
            Iget | IgetWide | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort => {
                self.field_get(access, false)?
            }
            Sget | SgetWide | SgetObject | SgetBoolean | SgetByte | SgetChar | SgetShort => {
                self.field_get(access, true)?
            }
            Iput | IputWide | IputObject | IputBoolean | IputByte | IputChar | IputShort => {
                self.field_put(access, false)?
            }
            Sput | SputWide | SputObject | SputBoolean | SputByte | SputChar | SputShort => {
                self.field_put(access, true)?
            }

            IgetQuick | IgetWideQuick | IgetObjectQuick | IgetBooleanQuick | IgetByteQuick | IgetCharQuick
            | IgetShortQuick => {
                let object = self.quick_object("Attempt to read from field on a null object reference")?;
                let value = self.heap().get_field(object, self.c());
                self.store_result(access, value);
            }
            IputQuick | IputWideQuick | IputObjectQuick | IputBooleanQuick | IputByteQuick | IputCharQuick
            | IputShortQuick => {
                let object = self.quick_object("Attempt to write to field on a null object reference")?;
                let value = self.load_operand(access);
                let slot = self.c();
                if let Some(transaction) = self.transaction() {
                    self.check_write_constraint(transaction, object)?;
                    if let Some(stored) = value.get_l() {
                        self.check_write_value_constraint(transaction, stored)?;
                    }
                    transaction.record_instance_field(self.heap(), object, slot);
                }
                self.heap().set_field(object, slot, value);
            }
            _ => self.unexpected_opcode(),
        }
        Ok(Flow::Continue)
    }

    fn quick_object(&self, null_message: &str) -> Result<ObjRef, Thrown> {
        self.frame
            .get_vreg_reference(self.b())
            .ok_or_else(|| self.null_pointer(null_message))
    }

    /// Resolve the field operand and check it against the access
    fn resolve_field(&self, access: Access, is_static: bool) -> Result<Arc<Field>, Thrown> {
        let index = if is_static { self.inst.vreg_b() } else { self.inst.vreg_c() };
        let heap = self.heap();
        let field = self.interp.linker.resolve_field(heap, index, is_static)?;
        if ACCESS_CHECK && !access.accepts(field.kind()) {
            let message = format!(
                "Attempted {:?} access to field '{}' of kind {:?} in {}",
                access,
                field.name(),
                field.kind(),
                self.describe_class(field.class())
            );
            return Err(self.throw(ThrowKind::NoSuchFieldError, &message));
        }
        if is_static {
            self.interp.linker.ensure_initialized(heap, self.thread, field.class())?;
        }
        Ok(field)
    }

    fn field_get(&mut self, access: Access, is_static: bool) -> Result<(), Thrown> {
        let heap = self.heap();
        let field = self.resolve_field(access, is_static)?;
        let value = if is_static {
            if let Some(transaction) = self.transaction() {
                if transaction.read_constraint(field.class()) {
                    let message = format!(
                        "Can't read static fields of {} since it does not belong to clinit's class.",
                        self.describe_class(field.class())
                    );
                    return Err(self.abort_transaction(transaction, message));
                }
            }
            heap.class(field.class()).get_static(field.slot())
        } else {
            let object = self.frame.get_vreg_reference(self.b()).ok_or_else(|| {
                let message = format!("Attempt to read from field '{}' on a null object reference", field.name());
                self.null_pointer(&message)
            })?;
            heap.get_field(object, field.slot())
        };
        self.store_result(access, value);
        Ok(())
    }

    fn field_put(&mut self, access: Access, is_static: bool) -> Result<(), Thrown> {
        let heap = self.heap();
        let field = self.resolve_field(access, is_static)?;
        let object = if is_static {
            None
        } else {
            let object = self.frame.get_vreg_reference(self.b()).ok_or_else(|| {
                let message = format!("Attempt to write to field '{}' on a null object reference", field.name());
                self.null_pointer(&message)
            })?;
            Some(object)
        };
        let value = self.load_operand(access);

        if let Some(transaction) = self.transaction() {
            match object {
                Some(object) => self.check_write_constraint(transaction, object)?,
                None => {
                    if transaction.write_static_constraint(heap, field.class()) {
                        let message = format!("Can't set fields of {}", self.describe_class(field.class()));
                        return Err(self.abort_transaction(transaction, message));
                    }
                }
            }
            if let Some(stored) = value.get_l() {
                self.check_write_value_constraint(transaction, stored)?;
            }
        }

        if ACCESS_CHECK {
            if let (Some(type_class), Some(stored)) = (field.type_class(), value.get_l()) {
                if !heap.instance_of(stored, type_class) {
                    let message = format!(
                        "Put '{}' that is not instance of field '{}' in '{}'",
                        self.describe_class(heap.class_of(stored)),
                        field.name(),
                        self.describe_class(field.class())
                    );
                    return Err(self.throw(ThrowKind::InternalError, &message));
                }
            }
        }

        match object {
            Some(object) => {
                if let Some(transaction) = self.transaction() {
                    transaction.record_instance_field(heap, object, field.slot());
                }
                heap.set_field(object, field.slot(), value);
            }
            None => {
                if let Some(transaction) = self.transaction() {
                    transaction.record_static_field(heap, field.class(), field.slot());
                }
                heap.class(field.class()).set_static(field.slot(), value);
            }
        }
        Ok(())
    }

    /// Read register A as the value of a field put
    fn load_operand(&self, access: Access) -> JValue {
        let src = self.a();
        match access {
            Access::Wide => JValue::from_long(self.frame.get_vreg_long(src)),
            Access::Object => JValue::from_ref(self.frame.get_vreg_reference(src)),
            Access::Boolean => JValue::from_int(self.frame.get_vreg(src) as u8 as i32),
            Access::Byte => JValue::from_int(self.frame.get_vreg(src) as i8 as i32),
            Access::Char => JValue::from_int(self.frame.get_vreg(src) as u16 as i32),
            Access::Short => JValue::from_int(self.frame.get_vreg(src) as i16 as i32),
            Access::Narrow => JValue::from_int(self.frame.get_vreg(src)),
        }
    }

    /// Write a field value read by a get to register A
    fn store_result(&mut self, access: Access, value: JValue) {
        let dst = self.a();
        match access {
            Access::Wide => self.frame.set_vreg_long(dst, value.get_j()),
            Access::Object => self.frame.set_vreg_reference(dst, value.get_l()),
            Access::Boolean => self.frame.set_vreg(dst, value.get_z() as i32),
            Access::Byte => self.frame.set_vreg(dst, value.get_b() as i32),
            Access::Char => self.frame.set_vreg(dst, value.get_c() as i32),
            Access::Short => self.frame.set_vreg(dst, value.get_s() as i32),
            Access::Narrow => self.frame.set_vreg(dst, value.get_i()),
        }
    }
}
