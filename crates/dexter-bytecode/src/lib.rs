//! Dexter Bytecode Definitions
//!
//! This crate provides the Dalvik instruction set as consumed by the
//! dexter interpreter:
//! - The 256-entry opcode table with mnemonics, formats and flags
//! - A zero-copy instruction decoder over 16-bit code units
//! - Switch and array-data payload views
//! - A small assembler for building code items by hand
//! - A structural verifier

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod instruction;
pub mod opcode;
pub mod payload;
pub mod verify;
pub mod writer;

pub use error::DecodeError;
pub use instruction::{Instruction, MAX_VAR_ARGS};
pub use opcode::{Format, Opcode, OpcodeFlags};
pub use payload::{ArrayDataPayload, PackedSwitchPayload, SparseSwitchPayload};
pub use verify::{verify_code, VerifyError};
pub use writer::{CodeWriter, Label};

/// Sentinel dex pc meaning "no instruction": the activation has finished.
pub const DEX_NO_INDEX: u32 = u32::MAX;
