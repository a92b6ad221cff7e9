//! Embedder facade
//!
//! A [`Vm`] owns the heap, the class linker, the monitor table, optional
//! listeners and JIT, and the safepoint coordinator its threads poll. It
//! verifies code before running it and converts escaping managed exceptions
//! into [`VmError::UncaughtException`].

use std::sync::Arc;

use dexter_bytecode::verify_code;

use crate::class::ClassId;
use crate::exception::Thrown;
use crate::gc::{GcStats, Heap};
use crate::instrumentation::Instrumentation;
use crate::interpreter::Interpreter;
use crate::jit::Jit;
use crate::linker::ClassLinker;
use crate::method::Method;
use crate::monitor::MonitorTable;
use crate::options::VmOptions;
use crate::safepoint::SafepointCoordinator;
use crate::shadow_frame::ShadowFrame;
use crate::thread::ManagedThread;
use crate::transaction::Transaction;
use crate::value::JValue;
use crate::{VmError, VmResult};

/// A configured interpreter instance
pub struct Vm {
    options: VmOptions,
    heap: Heap,
    linker: Box<dyn ClassLinker>,
    monitors: MonitorTable,
    instrumentation: Option<Box<dyn Instrumentation>>,
    jit: Option<Box<dyn Jit>>,
    safepoint: Arc<SafepointCoordinator>,
}

impl Vm {
    /// Create a VM resolving symbols through `linker`
    pub fn new(options: VmOptions, linker: impl ClassLinker + 'static) -> VmResult<Self> {
        options.validate()?;
        tracing::debug!(
            target: "dexter::interp",
            access_checks = options.access_checks,
            max_stack_depth = options.max_stack_depth,
            "creating vm"
        );
        Ok(Self {
            heap: Heap::with_limit(options.heap_limit),
            linker: Box::new(linker),
            monitors: MonitorTable::new(),
            instrumentation: None,
            jit: None,
            safepoint: Arc::new(SafepointCoordinator::default()),
            options,
        })
    }

    /// Deliver execution events to `instrumentation`
    pub fn with_instrumentation(mut self, instrumentation: impl Instrumentation + 'static) -> Self {
        self.instrumentation = Some(Box::new(instrumentation));
        self
    }

    /// Report hotness to `jit` and let it take over hot loops
    pub fn with_jit(mut self, jit: impl Jit + 'static) -> Self {
        self.jit = Some(Box::new(jit));
        self
    }

    /// The heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Options in effect
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// The monitor table
    pub fn monitors(&self) -> &MonitorTable {
        &self.monitors
    }

    /// Coordinator polled by this VM's threads
    pub fn safepoint(&self) -> &Arc<SafepointCoordinator> {
        &self.safepoint
    }

    /// Attach a new interpreter thread
    pub fn new_thread(&self) -> ManagedThread {
        ManagedThread::new(self.safepoint.clone())
    }

    /// An interpreter bound to this VM's collaborators
    pub fn interpreter(&self) -> Interpreter<'_> {
        let mut interpreter = Interpreter::new(&self.heap, self.linker.as_ref(), &self.monitors, &self.options);
        if let Some(instrumentation) = &self.instrumentation {
            interpreter = interpreter.with_instrumentation(instrumentation.as_ref());
        }
        if let Some(jit) = &self.jit {
            interpreter = interpreter.with_jit(jit.as_ref());
        }
        interpreter
    }

    /// Look up a method declared by the class with `descriptor`
    pub fn find_method(&self, descriptor: &str, name: &str) -> Option<Arc<Method>> {
        let class = self.heap.find_class(descriptor)?;
        self.heap.class(class).method(name)
    }

    /// Verify every method of `class`
    pub fn verify_class(&self, class: ClassId) -> VmResult<()> {
        for method in self.heap.class(class).methods() {
            self.verify_method(method)?;
        }
        Ok(())
    }

    fn verify_method(&self, method: &Method) -> VmResult<()> {
        if let Some(code) = method.code_item() {
            verify_code(&code.insns, code.registers_size)?;
        }
        Ok(())
    }

    /// Call `method` with one value per parameter, receiver first
    pub fn invoke(&self, thread: &ManagedThread, method: &Arc<Method>, args: &[JValue]) -> VmResult<JValue> {
        self.check_arguments(method, args)?;
        self.verify_method(method)?;
        let outcome = self.interpreter().invoke(thread, method, args);
        self.finish(thread, outcome)
    }

    /// Call `method` with heap writes recorded in `transaction`
    ///
    /// When the transaction aborts, every recorded write is rolled back
    /// before the `TransactionAbortError` is reported.
    pub fn invoke_in_transaction(
        &self,
        thread: &ManagedThread,
        transaction: &Transaction,
        method: &Arc<Method>,
        args: &[JValue],
    ) -> VmResult<JValue> {
        self.check_arguments(method, args)?;
        self.verify_method(method)?;
        let outcome = self
            .interpreter()
            .with_transaction(transaction)
            .invoke(thread, method, args);
        if transaction.is_aborted() {
            transaction.rollback(&self.heap);
        }
        self.finish(thread, outcome)
    }

    /// Run the activation in `frame` to completion
    pub fn execute(&self, thread: &ManagedThread, frame: &mut ShadowFrame) -> Result<JValue, Thrown> {
        self.interpreter().execute(thread, frame, JValue::default(), false)
    }

    /// Execute one instruction of `frame`
    ///
    /// `result_register` seeds the context, so a `move-result` stepped after
    /// an invoke sees the invoke's value. Returns the new result register.
    pub fn step(&self, thread: &ManagedThread, frame: &mut ShadowFrame, result_register: JValue) -> Result<JValue, Thrown> {
        self.interpreter().execute(thread, frame, result_register, true)
    }

    /// Collect garbage with the references held by `frames` as roots
    ///
    /// Objects with a held monitor are roots too. Interpreter threads other
    /// than the caller must be parked at a safepoint.
    pub fn collect_garbage(&self, frames: &[&ShadowFrame]) -> GcStats {
        let mut roots: Vec<_> = frames.iter().flat_map(|frame| frame.roots()).collect();
        roots.extend(self.monitors.owned_objects());
        let stats = self.heap.collect(&roots);
        self.monitors.retain(|object| self.heap.is_live(object));
        stats
    }

    fn check_arguments(&self, method: &Method, args: &[JValue]) -> VmResult<()> {
        let expected = usize::from(!method.is_static()) + method.params().count();
        if args.len() != expected {
            return Err(VmError::ArgumentMismatch {
                method: method.to_string(),
                expected,
                actual: args.len(),
            });
        }
        Ok(())
    }

    fn finish(&self, thread: &ManagedThread, outcome: Result<JValue, Thrown>) -> VmResult<JValue> {
        match outcome {
            Ok(value) => Ok(value),
            Err(thrown) => {
                thread.clear_exception();
                let exception = thrown.object();
                let class = self.heap.class(self.heap.class_of(exception)).descriptor().to_string();
                let message = self.heap.exception_message(exception);
                tracing::debug!(target: "dexter::exception", %class, ?message, "uncaught exception");
                Err(VmError::UncaughtException { class, message })
            }
        }
    }
}
