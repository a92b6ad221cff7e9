//! Switch interpreter
//!
//! Executes one activation of an interpreted method over its [`ShadowFrame`].
//! The loop decodes the instruction at the cursor, runs the per-instruction
//! preamble and dispatches to a handler family. Every handler returns
//! `Result<Flow, Thrown>`; thrown exceptions are routed by the loop to a
//! catch block of the same activation or out of it.
//!
//! # Execution Model
//!
//! ```text
//!          ┌──────────┐
//!   ┌─────►│  FETCH   │ decode at dex pc, trace
//!   │      └────┬─────┘
//!   │      ┌────▼─────┐
//!   │      │ PREAMBLE │ forced return, dex-pc listeners
//!   │      └────┬─────┘
//!   │      ┌────▼─────┐   Err    ┌─────────────────┐  not caught
//!   │      │ EXECUTE  ├─────────►│ EXCEPTION_ROUTE ├────────────► DONE (Err)
//!   │      └────┬─────┘          └───────┬─────────┘
//!   │  Continue │ Exit                   │ caught
//!   └───────────┤                        │
//!   ◄───────────┼────────────────────────┘
//!               ▼
//!           DONE (Ok)
//! ```
//!
//! Two compile-time flags select the loop instantiation: `ACCESS_CHECK`
//! enables assignability and monitor-balance checks, `TRANSACTION` routes
//! heap writes through the active [`Transaction`].

mod common;
mod context;
mod dispatch;
mod handlers;
mod invoke;

use std::sync::Arc;

pub use context::{Flow, SwitchContext};

use crate::class::Primitive;
use crate::exception::{ThrowKind, Thrown};
use crate::gc::Heap;
use crate::instrumentation::{Instrumentation, NoInstrumentation};
use crate::jit::Jit;
use crate::linker::ClassLinker;
use crate::method::Method;
use crate::monitor::MonitorTable;
use crate::options::VmOptions;
use crate::shadow_frame::ShadowFrame;
use crate::thread::ManagedThread;
use crate::transaction::Transaction;
use crate::value::JValue;

static NO_INSTRUMENTATION: NoInstrumentation = NoInstrumentation;

/// The interpreter and the collaborators it calls into
#[derive(Clone, Copy)]
pub struct Interpreter<'a> {
    heap: &'a Heap,
    linker: &'a dyn ClassLinker,
    monitors: &'a MonitorTable,
    instrumentation: &'a dyn Instrumentation,
    jit: Option<&'a dyn Jit>,
    transaction: Option<&'a Transaction>,
    options: &'a VmOptions,
}

impl<'a> Interpreter<'a> {
    /// Interpreter without listeners, JIT or transaction
    pub fn new(heap: &'a Heap, linker: &'a dyn ClassLinker, monitors: &'a MonitorTable, options: &'a VmOptions) -> Self {
        Self {
            heap,
            linker,
            monitors,
            instrumentation: &NO_INSTRUMENTATION,
            jit: None,
            transaction: None,
            options,
        }
    }

    /// Deliver execution events to `instrumentation`
    pub fn with_instrumentation(mut self, instrumentation: &'a dyn Instrumentation) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Report hotness to and offer OSR through `jit`
    pub fn with_jit(mut self, jit: &'a dyn Jit) -> Self {
        self.jit = Some(jit);
        self
    }

    /// Record heap writes in `transaction`
    pub fn with_transaction(mut self, transaction: &'a Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// The heap
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    /// Options in effect
    pub fn options(&self) -> &'a VmOptions {
        self.options
    }

    /// Run the activation in `frame` from its current dex pc
    ///
    /// Returns the method's result, or the exception that escaped it; that
    /// exception is also left pending on `thread`. With
    /// `interpret_one_instruction` set, returns after one instruction with the
    /// frame's dex pc advanced and the result register as the value.
    pub fn execute(
        &self,
        thread: &ManagedThread,
        frame: &mut ShadowFrame,
        result_register: JValue,
        interpret_one_instruction: bool,
    ) -> Result<JValue, Thrown> {
        let mut ctx = SwitchContext::new(result_register, interpret_one_instruction);
        match (self.options.access_checks, self.transaction.is_some()) {
            (true, true) => dispatch::execute_switch_impl::<true, true>(self, thread, frame, &mut ctx),
            (true, false) => dispatch::execute_switch_impl::<true, false>(self, thread, frame, &mut ctx),
            (false, true) => dispatch::execute_switch_impl::<false, true>(self, thread, frame, &mut ctx),
            (false, false) => dispatch::execute_switch_impl::<false, false>(self, thread, frame, &mut ctx),
        }
    }

    /// Call `method` with `args`, one value per parameter, receiver first
    pub fn invoke(&self, thread: &ManagedThread, method: &Arc<Method>, args: &[JValue]) -> Result<JValue, Thrown> {
        let expected = usize::from(!method.is_static()) + method.params().count();
        if args.len() != expected {
            let message = format!("{} expects {} arguments, got {}", method, expected, args.len());
            return Err(self.heap.throw_new(ThrowKind::InternalError, Some(&message)));
        }
        let mut kinds = Vec::with_capacity(expected);
        if !method.is_static() {
            kinds.push(Primitive::Not);
        }
        kinds.extend(method.params());
        self.call_with_values(thread, method, args, &kinds)
    }
}
