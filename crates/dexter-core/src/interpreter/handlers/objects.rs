//! Monitors, type checks, allocation and `throw`

use dexter_bytecode::Opcode;

use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_object_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        let heap = self.heap();
        match op {
            Opcode::MonitorEnter => {
                self.handle_async_exception()?;
                let object = self
                    .frame
                    .get_vreg_reference(self.a())
                    .ok_or_else(|| self.null_pointer("Attempt to lock a null object"))?;
                self.interp.monitors.enter(self.thread, object);
                self.frame.push_monitor(object);
            }
            Opcode::MonitorExit => {
                self.handle_async_exception()?;
                let object = self
                    .frame
                    .get_vreg_reference(self.a())
                    .ok_or_else(|| self.null_pointer("Attempt to unlock a null object"))?;
                if let Err(error) = self.interp.monitors.exit(self.thread, object) {
                    return Err(self.throw(ThrowKind::IllegalMonitorStateException, &error.to_string()));
                }
                let balanced = self.frame.pop_monitor(object);
                if ACCESS_CHECK && !balanced {
                    let message = format!(
                        "unlock of monitor on object of type '{}' not locked by this method",
                        self.describe_class(heap.class_of(object))
                    );
                    return Err(self.throw(ThrowKind::IllegalMonitorStateException, &message));
                }
            }
            Opcode::CheckCast => {
                let class = self.interp.linker.resolve_class(heap, self.inst.vreg_b())?;
                if let Some(object) = self.frame.get_vreg_reference(self.a()) {
                    if !heap.instance_of(object, class) {
                        let message = format!(
                            "{} cannot be cast to {}",
                            self.describe_class(heap.class_of(object)),
                            self.describe_class(class)
                        );
                        return Err(self.throw(ThrowKind::ClassCastException, &message));
                    }
                }
            }
            Opcode::InstanceOf => {
                let class = self.interp.linker.resolve_class(heap, self.inst.vreg_c())?;
                let is_instance = self
                    .frame
                    .get_vreg_reference(self.b())
                    .map_or(false, |object| heap.instance_of(object, class));
                self.frame.set_vreg(self.a(), is_instance as i32);
            }
            Opcode::NewInstance => {
                let class_id = self.interp.linker.resolve_class(heap, self.inst.vreg_b())?;
                let class = heap.class(class_id);
                if class.is_abstract() || class.is_interface() {
                    return Err(self.throw(ThrowKind::InstantiationError, class.descriptor()));
                }
                if let Some(transaction) = self.transaction() {
                    if class.is_finalizable() {
                        let message = format!("Allocating finalizable object in transaction: {}", class.descriptor());
                        return Err(self.abort_transaction(transaction, message));
                    }
                }
                self.interp.linker.ensure_initialized(heap, self.thread, class_id)?;
                let object = if class_id == heap.well_known().string {
                    heap.alloc_string("")?
                } else {
                    heap.alloc_instance(class_id)?
                };
                self.frame.set_vreg_reference(self.a(), Some(object));
            }
            Opcode::Throw => {
                self.handle_async_exception()?;
                let Some(exception) = self.frame.get_vreg_reference(self.a()) else {
                    return Err(self.null_pointer("throw with null exception"));
                };
                if ACCESS_CHECK && !heap.is_throwable(exception) {
                    let message = format!(
                        "Thrown exception not instance of Throwable: {}",
                        self.describe_class(heap.class_of(exception))
                    );
                    return Err(self.throw(ThrowKind::InternalError, &message));
                }
                return Err(Thrown(exception));
            }
            _ => self.unexpected_opcode(),
        }
        Ok(Flow::Continue)
    }
}
