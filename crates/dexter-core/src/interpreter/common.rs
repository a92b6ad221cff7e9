//! Control-flow helpers shared by the handler families
//!
//! Force-return checks, exception routing, branch instrumentation, monitor
//! balance and the return protocol.

use crate::exception::{ThrowKind, Thrown};
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;
use crate::value::{JValue, ObjRef};

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    /// Honour a non-standard return requested by a listener
    ///
    /// Returns `true` when the activation must exit; `ctx.result` then holds
    /// the forced value.
    pub(super) fn check_force_return(&mut self) -> bool {
        if !self.frame.is_return_forced() {
            return false;
        }
        if let Some(exception) = self.thread.take_exception() {
            tracing::warn!(
                target: "dexter::exception",
                method = %self.method,
                exception = %self.heap().describe(exception),
                "discarding pending exception for forced return"
            );
        }
        for object in self.frame.take_monitors() {
            if let Err(error) = self.interp.monitors.exit(self.thread, object) {
                tracing::warn!(target: "dexter::interp", method = %self.method, %error, "monitor release on forced return");
            }
        }
        let value = self.frame.take_forced_return();
        let instrumentation = self.interp.instrumentation;
        if instrumentation.has_method_exit_listeners() && !self.frame.skip_method_exit_events() {
            if let Err(thrown) = instrumentation.method_exited(self.thread, self.frame, &value) {
                tracing::warn!(
                    target: "dexter::exception",
                    method = %self.method,
                    exception = %self.heap().describe(thrown.object()),
                    "exit listener threw during forced return"
                );
            }
        }
        self.ctx.result = value;
        true
    }

    /// Code run before every instruction
    pub(super) fn preamble(&mut self) -> Result<Flow, Thrown> {
        if self.check_force_return() {
            return Ok(Flow::Exit);
        }
        let instrumentation = self.interp.instrumentation;
        if instrumentation.has_dex_pc_listeners() {
            let stashed = self.thread.take_exception();
            if let Err(thrown) = instrumentation.dex_pc_moved(self.thread, self.frame, self.dex_pc()) {
                // The listener's exception replaces the stashed one.
                self.thread.set_exception(thrown.object());
                self.frame.set_skip_next_exception_event(true);
                return Err(thrown);
            }
            if let Some(exception) = stashed {
                self.thread.set_exception(exception);
            }
            if self.check_force_return() {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Route `thrown` to a catch block of this activation
    ///
    /// `Ok(Continue)` resumes at the handler, `Ok(Exit)` is a forced return
    /// and `Err` unwinds the activation with the exception left pending.
    pub(super) fn handle_pending_exception(&mut self, thrown: Thrown) -> Result<Flow, Thrown> {
        self.thread.set_exception(thrown.object());
        self.thread.allow_thread_suspension();
        if self.check_force_return() {
            return Ok(Flow::Exit);
        }
        let notify = !self.frame.skip_next_exception_event();
        self.frame.set_skip_next_exception_event(false);
        match self.move_to_exception_handler(thrown.object(), notify) {
            Ok(Some(handler_pc)) => {
                if self.check_force_return() {
                    return Ok(Flow::Exit);
                }
                self.next = handler_pc;
                Ok(Flow::Continue)
            }
            Ok(None) => {
                self.check_force_return();
                Ok(Flow::Exit)
            }
            Err(uncaught) => {
                let escaping = self.do_monitor_check_on_exit().unwrap_or(uncaught);
                self.ctx.result = JValue::default();
                Err(escaping)
            }
        }
    }

    /// `Some(handler_pc)` when caught, `None` when a listener forced a pop
    fn move_to_exception_handler(&mut self, exception: ObjRef, notify: bool) -> Result<Option<u32>, Thrown> {
        let heap = self.heap();
        let instrumentation = self.interp.instrumentation;
        if notify
            && instrumentation.has_exception_thrown_listeners()
            && self.thread.is_exception_thrown_by_current_method()
        {
            instrumentation.exception_thrown(self.thread, self.frame, exception);
            if self.frame.force_pop_frame() {
                return Ok(None);
            }
        }

        let aborted = TRANSACTION && self.interp.transaction.map_or(false, |t| t.is_aborted());
        let found = if aborted {
            None
        } else {
            self.method.find_catch_block(heap, heap.class_of(exception), self.frame.dex_pc())
        };
        let Some((handler_pc, clear_exception)) = found else {
            if notify && instrumentation.has_method_unwind_listeners() {
                instrumentation.method_unwind(self.thread, self.frame, exception);
            }
            tracing::debug!(
                target: "dexter::exception",
                method = %self.method,
                dex_pc = self.frame.dex_pc(),
                exception = %heap.describe(exception),
                "unwinding"
            );
            if self.frame.force_pop_frame() {
                return Ok(None);
            }
            return Err(Thrown(exception));
        };

        tracing::debug!(
            target: "dexter::exception",
            method = %self.method,
            dex_pc = self.frame.dex_pc(),
            handler_pc,
            "caught"
        );
        self.frame.set_dex_pc(handler_pc);
        if notify && instrumentation.has_exception_handled_listeners() {
            self.thread.clear_exception();
            match instrumentation.exception_handled(self.thread, self.frame, handler_pc) {
                Err(replacement) => {
                    self.thread.set_exception(replacement.object());
                    return self.move_to_exception_handler(replacement.object(), notify);
                }
                Ok(()) if !clear_exception => self.thread.set_exception(exception),
                Ok(()) => {}
            }
        } else if clear_exception {
            self.thread.clear_exception();
        }
        Ok(Some(handler_pc))
    }

    /// Release monitors still held at exit and raise `IllegalMonitorStateException`
    pub(super) fn do_monitor_check_on_exit(&mut self) -> Option<Thrown> {
        if !ACCESS_CHECK || self.frame.held_monitors().is_empty() {
            return None;
        }
        let heap = self.heap();
        let held = self.frame.take_monitors();
        for &object in &held {
            // Monitors entered by this activation are owned by this thread.
            let _ = self.interp.monitors.exit(self.thread, object);
        }
        let class = heap.class(heap.class_of(held[0]));
        let message = format!("did not unlock monitor on object of type '{}'", class.descriptor());
        self.thread.clear_exception();
        let thrown = heap.throw_new(ThrowKind::IllegalMonitorStateException, Some(&message));
        self.thread.set_exception(thrown.object());
        Some(thrown)
    }

    /// Suspension check, monitor balance, exit events; then exit with `result`
    ///
    /// With `reference_register` set the value is a reference held in that
    /// register, and it is read again after each event that may rewrite it.
    pub(super) fn handle_return(&mut self, mut result: JValue, reference_register: Option<usize>) -> Result<Flow, Thrown> {
        self.thread.allow_thread_suspension();
        if let Some(thrown) = self.do_monitor_check_on_exit() {
            return Err(thrown);
        }
        if let Some(register) = reference_register {
            result = JValue::from_ref(self.frame.get_vreg_reference(register));
        }
        let instrumentation = self.interp.instrumentation;
        if instrumentation.has_method_exit_listeners() && !self.frame.skip_method_exit_events() {
            loop {
                self.frame.set_force_pop_frame(false);
                if let Err(thrown) = instrumentation.method_exited(self.thread, self.frame, &result) {
                    self.frame.set_skip_next_exception_event(true);
                    return Err(thrown);
                }
                if !self.frame.force_pop_frame() {
                    break;
                }
            }
            if let Some(register) = reference_register {
                result = JValue::from_ref(self.frame.get_vreg_reference(register));
            }
        }
        self.ctx.result = self.frame.take_forced_value().unwrap_or(result);
        Ok(Flow::Exit)
    }

    /// Branch listeners and OSR; `true` when compiled code finished the activation
    fn branch_instrumentation(&mut self, offset: i32) -> bool {
        let dex_pc = self.dex_pc();
        let instrumentation = self.interp.instrumentation;
        if instrumentation.has_branch_listeners() {
            instrumentation.branch(self.thread, self.frame, dex_pc, offset);
        }
        if let Some(jit) = self.interp.jit {
            if let Some(result) = jit.maybe_do_osr(self.thread, self.method, dex_pc, offset, self.frame) {
                self.ctx.result = result;
                return true;
            }
        }
        false
    }

    /// Move the cursor by `offset` code units
    pub(super) fn take_branch(&mut self, offset: i32) -> Result<Flow, Thrown> {
        if self.branch_instrumentation(offset) {
            return Ok(Flow::Exit);
        }
        self.next = (self.dex_pc() as i64 + offset as i64) as u32;
        if offset <= 0 {
            self.handle_backward_branch();
        }
        Ok(Flow::Continue)
    }

    /// Fall through a conditional branch; `width` is the instruction size
    pub(super) fn skip_branch(&mut self, width: i32) -> Result<Flow, Thrown> {
        if self.branch_instrumentation(width) {
            return Ok(Flow::Exit);
        }
        Ok(Flow::Continue)
    }

    fn handle_backward_branch(&mut self) {
        if let Some(jit) = self.interp.jit {
            jit.add_samples(self.thread, self.method, 1, true);
        }
        self.frame.set_dex_pc(self.next);
        self.thread.allow_thread_suspension();
    }

    /// Raise an exception injected by another thread
    pub(super) fn handle_async_exception(&mut self) -> Result<(), Thrown> {
        match self.thread.observe_async_exception() {
            Some(exception) => Err(Thrown(exception)),
            None => Ok(()),
        }
    }

    /// Re-issue the invoke if the callee asked for a retry, else propagate
    pub(super) fn possibly_handle_pending_exception_on_invoke(
        &mut self,
        outcome: Result<(), Thrown>,
    ) -> Result<Flow, Thrown> {
        if self.frame.force_retry_instruction() {
            self.frame.set_force_retry_instruction(false);
            if let Err(thrown) = outcome {
                let dex_pc = self.dex_pc();
                if self.frame.retried_at() == Some(dex_pc) {
                    return Err(thrown);
                }
                tracing::warn!(
                    target: "dexter::invoke",
                    method = %self.method,
                    dex_pc,
                    exception = %self.heap().describe(thrown.object()),
                    "suppressing exception for instruction retry"
                );
                self.thread.clear_exception();
                self.frame.set_retried_at(dex_pc);
            }
            self.next = self.dex_pc();
            return Ok(Flow::Continue);
        }
        outcome.map(|()| Flow::Continue)
    }
}
