//! Dexter Core Runtime
//!
//! This crate provides the execution engine for Dalvik-style register
//! bytecode:
//! - Shadow frames holding the virtual register file of one activation
//! - The switch interpreter and its instruction handler families
//! - A non-moving mark-sweep heap with a class table
//! - Managed threads, object monitors and safepoint coordination
//! - Symbol resolution through the [`ClassLinker`] trait
//! - Instrumentation, JIT and transaction hooks
//!
//! [`Vm`] ties these together for embedders.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class;
pub mod exception;
pub mod gc;
pub mod instrumentation;
pub mod interpreter;
pub mod jit;
pub mod linker;
pub mod method;
pub mod monitor;
pub mod object;
pub mod options;
pub mod safepoint;
pub mod shadow_frame;
pub mod thread;
pub mod transaction;
pub mod value;
pub mod vm;

pub use class::{AccessFlags, Class, ClassBuilder, ClassId, ClassStatus, Field, FieldBuilder, Primitive};
pub use exception::{ThrowKind, Thrown};
pub use gc::{GcStats, Heap};
pub use instrumentation::{Instrumentation, NoInstrumentation};
pub use interpreter::{Flow, Interpreter, SwitchContext};
pub use jit::{HotnessCounter, Jit};
pub use linker::{ClassLinker, InvokeKind, TableLinker};
pub use method::{CodeItem, Method, MethodBuilder, MethodId, NativeEnv, TryItem};
pub use monitor::{MonitorError, MonitorTable};
pub use options::VmOptions;
pub use safepoint::{SafepointCoordinator, StopReason};
pub use shadow_frame::ShadowFrame;
pub use thread::ManagedThread;
pub use transaction::Transaction;
pub use value::{JValue, ObjRef};
pub use vm::Vm;

use dexter_bytecode::VerifyError;

/// Errors reported to embedders
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// A managed exception escaped the outermost activation
    #[error("Uncaught exception {class}: {}", .message.as_deref().unwrap_or("<no message>"))]
    UncaughtException {
        /// Descriptor of the exception class
        class: String,
        /// Detail message, if any
        message: Option<String>,
    },

    /// Bytecode failed verification
    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Wrong number of arguments for a call
    #[error("{method} expects {expected} arguments, got {actual}")]
    ArgumentMismatch {
        /// The method called
        method: String,
        /// Declared argument count, receiver included
        expected: usize,
        /// Arguments supplied
        actual: usize,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while loading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedder-facing result
pub type VmResult<T> = Result<T, VmError>;
