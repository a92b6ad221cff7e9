//! State shared between the dispatch loop and its caller

use crate::value::JValue;

/// Outcome of one instruction handler
///
/// `Err(Thrown)` is the third outcome: an exception that the loop routes
/// to a catch block or out of the activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue at the handler-selected next instruction
    Continue,
    /// The activation is finished; `SwitchContext::result` holds its value
    Exit,
}

/// Inputs and outputs of one `execute` call
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchContext {
    /// Value of the most recent invoke or `filled-new-array`
    pub result_register: JValue,
    /// Value the activation returns
    pub result: JValue,
    /// Stop after one instruction
    pub interpret_one_instruction: bool,
}

impl SwitchContext {
    /// Context seeded with a caller-provided result register
    pub fn new(result_register: JValue, interpret_one_instruction: bool) -> Self {
        Self {
            result_register,
            result: JValue::default(),
            interpret_one_instruction,
        }
    }
}
