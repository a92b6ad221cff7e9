//! Decoding errors

/// Errors raised while decoding instructions or payloads
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Instruction extends past the end of the code item
    #[error("Truncated {opcode} at dex pc {dex_pc}: needs {needed} code units, {available} available")]
    Truncated {
        /// Mnemonic of the truncated instruction
        opcode: &'static str,
        /// Offset of the instruction
        dex_pc: u32,
        /// Width the format requires
        needed: usize,
        /// Code units left in the code item
        available: usize,
    },

    /// Dex pc outside the code item
    #[error("Dex pc {dex_pc} out of range (code size {code_size})")]
    PcOutOfRange {
        /// Requested offset
        dex_pc: u32,
        /// Code item size in code units
        code_size: usize,
    },

    /// Payload at the target offset does not carry the expected identifier
    #[error("Bad payload signature {found:#06x} at {offset} (expected {expected:#06x})")]
    BadPayloadSignature {
        /// Offset of the payload
        offset: usize,
        /// Identifier that was expected
        expected: u16,
        /// Identifier found
        found: u16,
    },

    /// Payload body extends past the end of the code item
    #[error("Truncated payload at {0}")]
    TruncatedPayload(usize),

    /// Array-data element width other than 1, 2, 4 or 8
    #[error("Invalid array-data element width {0}")]
    InvalidElementWidth(u16),
}
