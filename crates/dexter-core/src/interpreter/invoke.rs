//! Method invocation
//!
//! Target selection for the invoke family and the call itself: argument
//! registers are copied verbatim into the last `ins_size` registers of the
//! callee frame, or converted to [`JValue`]s for native code.

use std::sync::Arc;

use crate::class::Primitive;
use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::dispatch::InstructionHandler;
use crate::interpreter::Interpreter;
use crate::linker::InvokeKind;
use crate::method::{Method, NativeEnv, NativeFn};
use crate::shadow_frame::ShadowFrame;
use crate::thread::ManagedThread;
use crate::value::{JValue, ObjRef};

/// Both views of one argument register
pub(super) type RawSlot = (u32, Option<ObjRef>);

fn kind_name(kind: InvokeKind) -> &'static str {
    match kind {
        InvokeKind::Static => "static",
        InvokeKind::Direct => "direct",
        InvokeKind::Virtual => "virtual",
        InvokeKind::Super => "super",
        InvokeKind::Interface => "interface",
        InvokeKind::Polymorphic => "polymorphic",
        InvokeKind::Custom => "custom",
    }
}

fn push_value(slots: &mut Vec<RawSlot>, value: JValue, kind: Primitive) {
    match kind {
        Primitive::Not => slots.push((value.get_l().map_or(0, ObjRef::raw), value.get_l())),
        Primitive::Long | Primitive::Double => {
            let bits = value.raw_bits();
            slots.push((bits as u32, None));
            slots.push(((bits >> 32) as u32, None));
        }
        Primitive::Void => {}
        _ => slots.push((value.raw_bits() as u32, None)),
    }
}

impl<'a> Interpreter<'a> {
    pub(super) fn call_with_values(
        &self,
        thread: &ManagedThread,
        method: &Arc<Method>,
        values: &[JValue],
        kinds: &[Primitive],
    ) -> Result<JValue, Thrown> {
        let mut slots = Vec::with_capacity(values.len() * 2);
        for (&value, &kind) in values.iter().zip(kinds) {
            push_value(&mut slots, value, kind);
        }
        self.perform_call(thread, method, &slots)
    }

    /// Run `method` on raw argument registers, receiver first
    pub(super) fn perform_call(
        &self,
        thread: &ManagedThread,
        method: &Arc<Method>,
        args: &[RawSlot],
    ) -> Result<JValue, Thrown> {
        if !method.is_invokable() {
            let message = format!("abstract method \"{}\"", method);
            return Err(self.heap.throw_new(ThrowKind::AbstractMethodError, Some(&message)));
        }
        if thread.depth() >= self.options.max_stack_depth {
            tracing::debug!(target: "dexter::invoke", method = %method, depth = thread.depth(), "stack overflow");
            let message = format!("stack size {} exceeded", self.options.max_stack_depth);
            return Err(self.heap.throw_new(ThrowKind::StackOverflowError, Some(&message)));
        }
        if args.len() != method.num_input_vregs() {
            let message = format!(
                "{} takes {} argument registers, got {}",
                method,
                method.num_input_vregs(),
                args.len()
            );
            return Err(self.heap.throw_new(ThrowKind::InternalError, Some(&message)));
        }

        let depth = thread.enter_frame();
        tracing::trace!(target: "dexter::invoke", method = %method, depth, "call");
        let outcome = match method.native() {
            Some(native) => self.call_native(thread, method, native, args),
            None => self.call_interpreted(thread, method, args),
        };
        if let Err(thrown) = outcome {
            // Attributed to the callee, so the caller does not report it as its own.
            thread.set_exception(thrown.object());
        }
        thread.exit_frame();
        outcome
    }

    fn call_interpreted(&self, thread: &ManagedThread, method: &Arc<Method>, args: &[RawSlot]) -> Result<JValue, Thrown> {
        let Some(code) = method.code_item() else {
            let message = format!("abstract method \"{}\"", method);
            return Err(self.heap.throw_new(ThrowKind::AbstractMethodError, Some(&message)));
        };
        let registers = usize::from(code.registers_size);
        let ins = usize::from(code.ins_size);
        if ins != args.len() || ins > registers {
            let message = format!("{} declares {} incoming registers, got {} arguments", method, ins, args.len());
            return Err(self.heap.throw_new(ThrowKind::InternalError, Some(&message)));
        }
        let mut frame = ShadowFrame::new(method.clone(), registers);
        let first_in = registers - ins;
        for (offset, &slot) in args.iter().enumerate() {
            frame.set_raw(first_in + offset, slot);
        }
        self.execute(thread, &mut frame, JValue::default(), false)
    }

    fn call_native(
        &self,
        thread: &ManagedThread,
        method: &Method,
        native: &NativeFn,
        args: &[RawSlot],
    ) -> Result<JValue, Thrown> {
        let receiver = (!method.is_static()).then_some(Primitive::Not);
        let mut values = Vec::with_capacity(args.len());
        let mut index = 0;
        for kind in receiver.into_iter().chain(method.params()) {
            let (bits, reference) = args[index];
            let value = match kind {
                Primitive::Not => JValue::from_ref(reference),
                Primitive::Long | Primitive::Double => {
                    index += 1;
                    JValue::from_long((bits as u64 | (args[index].0 as u64) << 32) as i64)
                }
                Primitive::Float => JValue::from_float(f32::from_bits(bits)),
                _ => JValue::from_int(bits as i32),
            };
            index += 1;
            values.push(value);
        }
        let env = NativeEnv { heap: self.heap, thread };
        native(&env, &values)
    }
}

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    /// Resolve, select and call the target of the current invoke
    ///
    /// The callee's value lands in the result register. On failure the
    /// result register is cleared and a retry request from the callee or
    /// linker is recorded on the frame.
    pub(super) fn do_invoke(&mut self, kind: InvokeKind, is_quick: bool) -> Result<(), Thrown> {
        let registers = self.inst.arg_registers();
        let args: Vec<RawSlot> = registers.iter().map(|&r| self.frame.get_raw(r as usize)).collect();
        if let Some(jit) = self.interp.jit {
            jit.add_samples(self.thread, self.method, 1, false);
        }
        let outcome = match kind {
            InvokeKind::Polymorphic => self.invoke_polymorphic(&args),
            InvokeKind::Custom => self
                .interp
                .linker
                .resolve_call_site(self.heap(), self.thread, self.inst.vreg_b())
                .and_then(|target| self.interp.perform_call(self.thread, &target, &args)),
            _ => self
                .find_target(kind, is_quick, &args)
                .and_then(|target| self.interp.perform_call(self.thread, &target, &args)),
        };
        match outcome {
            Ok(value) => {
                self.ctx.result_register = value;
                Ok(())
            }
            Err(thrown) => {
                self.ctx.result_register = JValue::default();
                if self.thread.take_retry_request() {
                    self.frame.set_force_retry_instruction(true);
                }
                Err(thrown)
            }
        }
    }

    fn receiver(&self, args: &[RawSlot], kind: InvokeKind, method: Option<&Method>) -> Result<ObjRef, Thrown> {
        match args.first().and_then(|&(_, reference)| reference) {
            Some(receiver) => Ok(receiver),
            None => {
                let message = match method {
                    Some(method) => format!(
                        "Attempt to invoke {} method '{}' on a null object reference",
                        kind_name(kind),
                        method
                    ),
                    None => format!("Attempt to invoke {} method on a null object reference", kind_name(kind)),
                };
                Err(self.null_pointer(&message))
            }
        }
    }

    fn find_target(&self, kind: InvokeKind, is_quick: bool, args: &[RawSlot]) -> Result<Arc<Method>, Thrown> {
        let heap = self.heap();
        let index = self.inst.vreg_b();
        if is_quick {
            let receiver = self.receiver(args, kind, None)?;
            let class = heap.class(heap.class_of(receiver));
            return class.vtable_entry(index as u16).ok_or_else(|| {
                let message = format!("vtable index {} out of range for {}", index, class.descriptor());
                self.throw(ThrowKind::NoSuchMethodError, &message)
            });
        }

        let resolved = self.interp.linker.resolve_method(heap, index, kind)?;
        match kind {
            InvokeKind::Static => {
                self.interp.linker.ensure_initialized(heap, self.thread, resolved.class())?;
                Ok(resolved)
            }
            InvokeKind::Direct => {
                self.receiver(args, kind, Some(&*resolved))?;
                Ok(resolved)
            }
            InvokeKind::Virtual => {
                let receiver = self.receiver(args, kind, Some(&*resolved))?;
                let class = heap.class(heap.class_of(receiver));
                Ok(resolved
                    .vtable_index()
                    .and_then(|slot| class.vtable_entry(slot))
                    .unwrap_or(resolved))
            }
            InvokeKind::Super => {
                self.receiver(args, kind, Some(&*resolved))?;
                let caller = heap.class(self.method.class());
                let target = caller
                    .super_class()
                    .zip(resolved.vtable_index())
                    .and_then(|(super_class, slot)| heap.class(super_class).vtable_entry(slot));
                target.ok_or_else(|| {
                    let message = format!("super method {} not found from {}", resolved, caller.descriptor());
                    self.throw(ThrowKind::NoSuchMethodError, &message)
                })
            }
            InvokeKind::Interface => {
                let receiver = self.receiver(args, kind, Some(&*resolved))?;
                let class = heap.class(heap.class_of(receiver));
                class.find_virtual(resolved.name(), resolved.shorty()).ok_or_else(|| {
                    let message = format!(
                        "Class {} does not implement interface {}",
                        class.descriptor(),
                        self.describe_class(resolved.class())
                    );
                    self.throw(ThrowKind::IncompatibleClassChangeError, &message)
                })
            }
            InvokeKind::Polymorphic | InvokeKind::Custom => Ok(resolved),
        }
    }

    /// Call the target of the method handle in the first argument register
    fn invoke_polymorphic(&self, args: &[RawSlot]) -> Result<JValue, Thrown> {
        let heap = self.heap();
        let handle = args
            .first()
            .and_then(|&(_, reference)| reference)
            .ok_or_else(|| self.null_pointer("Attempt to invoke a null method handle"))?;
        let target = heap.method_handle_target(handle).ok_or_else(|| {
            let message = format!(
                "{} cannot be cast to {}",
                self.describe_class(heap.class_of(handle)),
                self.describe_class(heap.well_known().method_handle)
            );
            self.throw(ThrowKind::ClassCastException, &message)
        })?;
        let proto = self.interp.linker.resolve_proto(heap, self.inst.vreg_h())?;
        if proto != target.shorty() {
            let message = format!("expected ({}) but was ({})", target.shorty(), proto);
            return Err(self.throw(ThrowKind::WrongMethodTypeException, &message));
        }
        self.interp.perform_call(self.thread, &target, &args[1..])
    }
}
