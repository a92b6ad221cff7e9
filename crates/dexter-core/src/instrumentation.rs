//! Instrumentation hooks
//!
//! Debuggers and profilers observe execution through an [`Instrumentation`]
//! implementation. The interpreter asks the `has_*` queries first and only
//! builds events when a listener is present, so the no-op default costs one
//! virtual call per query.
//!
//! Listeners receive the frame mutably. Besides inspecting registers they
//! may request a non-standard return through
//! [`ShadowFrame::request_forced_return`] or
//! [`ShadowFrame::set_force_pop_frame`]; the interpreter honours the request
//! at its next force-return check. Events that return `Err` inject an
//! exception into the running method.

use crate::exception::Thrown;
use crate::shadow_frame::ShadowFrame;
use crate::thread::ManagedThread;
use crate::value::{JValue, ObjRef};

/// Execution event listeners
#[allow(unused_variables)]
pub trait Instrumentation: Send + Sync {
    /// Whether `dex_pc_moved` should be delivered
    fn has_dex_pc_listeners(&self) -> bool {
        false
    }

    /// Whether `branch` should be delivered
    fn has_branch_listeners(&self) -> bool {
        false
    }

    /// Whether `method_exited` should be delivered
    fn has_method_exit_listeners(&self) -> bool {
        false
    }

    /// Whether `exception_thrown` should be delivered
    fn has_exception_thrown_listeners(&self) -> bool {
        false
    }

    /// Whether `exception_handled` should be delivered
    fn has_exception_handled_listeners(&self) -> bool {
        false
    }

    /// Whether `method_unwind` should be delivered
    fn has_method_unwind_listeners(&self) -> bool {
        false
    }

    /// About to execute the instruction at `dex_pc`
    fn dex_pc_moved(&self, thread: &ManagedThread, frame: &mut ShadowFrame, dex_pc: u32) -> Result<(), Thrown> {
        Ok(())
    }

    /// A branch instruction at `dex_pc` moved the cursor by `offset` code units
    fn branch(&self, thread: &ManagedThread, frame: &ShadowFrame, dex_pc: u32, offset: i32) {}

    /// The method is returning `result`
    fn method_exited(&self, thread: &ManagedThread, frame: &mut ShadowFrame, result: &JValue) -> Result<(), Thrown> {
        Ok(())
    }

    /// `exception` was raised in the current method
    fn exception_thrown(&self, thread: &ManagedThread, frame: &ShadowFrame, exception: ObjRef) {}

    /// A handler at `handler_pc` caught the pending exception
    fn exception_handled(&self, thread: &ManagedThread, frame: &mut ShadowFrame, handler_pc: u32) -> Result<(), Thrown> {
        Ok(())
    }

    /// The frame is unwinding with `exception` pending
    fn method_unwind(&self, thread: &ManagedThread, frame: &ShadowFrame, exception: ObjRef) {}
}

/// Instrumentation with no listeners
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInstrumentation;

impl Instrumentation for NoInstrumentation {}
