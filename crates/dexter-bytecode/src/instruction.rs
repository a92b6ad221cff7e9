//! Instruction decoder
//!
//! An [`Instruction`] is a borrowed view of one instruction inside a code
//! item. Decoding is pure: accessors read the operand fields of the
//! instruction's format and never move the interpreter's cursor.
//!
//! # Operand layout
//!
//! ```text
//!  unit 0                    unit 1..
//! ┌────────┬────────┐       ┌──────────────────┐
//! │ B | A  │ opcode │  ...  │ index / literal  │
//! └────────┴────────┘       └──────────────────┘
//!   15  8    7    0
//! ```
//!
//! The opcode is always the low byte of the first unit. Register and literal
//! operands follow the per-format layout implemented by the accessors below.

use std::fmt;

use crate::error::DecodeError;
use crate::opcode::{Format, Opcode};
use crate::payload::{ARRAY_DATA_SIGNATURE, PACKED_SWITCH_SIGNATURE, SPARSE_SWITCH_SIGNATURE};

/// Maximum number of registers in a `35c`/`45cc` argument list
pub const MAX_VAR_ARGS: usize = 5;

/// Borrowed view of the instruction at one dex pc
#[derive(Clone, Copy)]
pub struct Instruction<'a> {
    code: &'a [u16],
    dex_pc: u32,
}

impl<'a> Instruction<'a> {
    /// View the instruction at `dex_pc`.
    ///
    /// Panics if `dex_pc` is outside `code`; the interpreter only decodes
    /// offsets that lie inside a verified code item.
    #[inline]
    pub fn at(code: &'a [u16], dex_pc: u32) -> Self {
        assert!((dex_pc as usize) < code.len(), "dex pc {} past end of code ({})", dex_pc, code.len());
        Self { code, dex_pc }
    }

    /// View the instruction at `dex_pc`, checking that it fits in `code`.
    pub fn try_at(code: &'a [u16], dex_pc: u32) -> Result<Self, DecodeError> {
        if dex_pc as usize >= code.len() {
            return Err(DecodeError::PcOutOfRange {
                dex_pc,
                code_size: code.len(),
            });
        }
        let inst = Self { code, dex_pc };
        let available = code.len() - dex_pc as usize;
        let needed = if inst.is_payload() {
            // Header first, so the size computation cannot read past the end.
            let header = match inst.code[dex_pc as usize] {
                ARRAY_DATA_SIGNATURE => 4,
                _ => 2,
            };
            if available < header {
                return Err(DecodeError::TruncatedPayload(dex_pc as usize));
            }
            inst.size_in_code_units()
        } else {
            inst.format().size_in_code_units()
        };
        if needed > available {
            return Err(DecodeError::Truncated {
                opcode: inst.opcode().name(),
                dex_pc,
                needed,
                available,
            });
        }
        Ok(inst)
    }

    /// Offset of this instruction in code units.
    #[inline]
    pub fn dex_pc(&self) -> u32 {
        self.dex_pc
    }

    /// The whole code item this instruction belongs to.
    #[inline]
    pub fn code(&self) -> &'a [u16] {
        self.code
    }

    #[inline]
    fn fetch16(&self, offset: usize) -> u16 {
        self.code[self.dex_pc as usize + offset]
    }

    #[inline]
    fn fetch32(&self, offset: usize) -> u32 {
        self.fetch16(offset) as u32 | ((self.fetch16(offset + 1) as u32) << 16)
    }

    /// First code unit: opcode in the low byte, operand nibbles in the high byte.
    #[inline]
    pub fn inst_data(&self) -> u16 {
        self.fetch16(0)
    }

    /// Decoded opcode.
    #[inline]
    pub fn opcode(&self) -> Opcode {
        Opcode::from_u8(self.inst_data() as u8)
    }

    /// Encoding format of the opcode.
    #[inline]
    pub fn format(&self) -> Format {
        self.opcode().format()
    }

    /// Whether this is a `nop` carrying switch or array-data payload.
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(
            self.inst_data(),
            PACKED_SWITCH_SIGNATURE | SPARSE_SWITCH_SIGNATURE | ARRAY_DATA_SIGNATURE
        )
    }

    /// Width in code units, including payload bodies.
    pub fn size_in_code_units(&self) -> usize {
        match self.inst_data() {
            PACKED_SWITCH_SIGNATURE => 4 + self.fetch16(1) as usize * 2,
            SPARSE_SWITCH_SIGNATURE => 2 + self.fetch16(1) as usize * 4,
            ARRAY_DATA_SIGNATURE => {
                let width = self.fetch16(1) as usize;
                let count = self.fetch32(2) as usize;
                4 + (width * count + 1) / 2
            }
            _ => self.format().size_in_code_units(),
        }
    }

    /// The instruction that follows this one.
    #[inline]
    pub fn next(&self) -> Instruction<'a> {
        self.relative_at(self.size_in_code_units() as i32)
    }

    /// The instruction `offset` code units away from this one.
    #[inline]
    pub fn relative_at(&self, offset: i32) -> Instruction<'a> {
        Instruction {
            code: self.code,
            dex_pc: (self.dex_pc as i64 + offset as i64) as u32,
        }
    }

    /// Operand A. Branch offsets and counts are returned in the same field.
    pub fn vreg_a(&self) -> u32 {
        let data = self.inst_data();
        match self.format() {
            Format::F12x | Format::F11n | Format::F22t | Format::F22s | Format::F22c => {
                ((data >> 8) & 0x0f) as u32
            }
            Format::F11x
            | Format::F22x
            | Format::F21t
            | Format::F21s
            | Format::F21h
            | Format::F21c
            | Format::F23x
            | Format::F22b
            | Format::F31t
            | Format::F31i
            | Format::F31c
            | Format::F3rc
            | Format::F4rcc
            | Format::F51l => (data >> 8) as u32,
            Format::F10t => (data >> 8) as u8 as i8 as i32 as u32,
            Format::F20t => self.fetch16(1) as i16 as i32 as u32,
            Format::F32x => self.fetch16(1) as u32,
            Format::F30t => self.fetch32(1),
            Format::F35c | Format::F45cc => (data >> 12) as u32,
            Format::F10x => panic!("{} has no operand A", self.opcode()),
        }
    }

    /// Operand B. Signed literals are sign-extended into the returned bits.
    pub fn vreg_b(&self) -> u32 {
        let data = self.inst_data();
        match self.format() {
            Format::F12x | Format::F22t | Format::F22s | Format::F22c => (data >> 12) as u32,
            Format::F11n => ((data as i16) >> 12) as i32 as u32,
            Format::F22x
            | Format::F21c
            | Format::F21h
            | Format::F35c
            | Format::F3rc
            | Format::F45cc
            | Format::F4rcc => self.fetch16(1) as u32,
            Format::F21t | Format::F21s => self.fetch16(1) as i16 as i32 as u32,
            Format::F23x | Format::F22b => (self.fetch16(1) & 0xff) as u32,
            Format::F32x => self.fetch16(2) as u32,
            Format::F31t | Format::F31i | Format::F31c => self.fetch32(1),
            format => panic!("{} ({}) has no narrow operand B", self.opcode(), format),
        }
    }

    /// Operand C.
    pub fn vreg_c(&self) -> u32 {
        match self.format() {
            Format::F23x => (self.fetch16(1) >> 8) as u32,
            Format::F22b => (self.fetch16(1) >> 8) as u8 as i8 as i32 as u32,
            Format::F22t | Format::F22s => self.fetch16(1) as i16 as i32 as u32,
            Format::F22c => self.fetch16(1) as u32,
            Format::F35c | Format::F45cc => (self.fetch16(2) & 0x0f) as u32,
            Format::F3rc | Format::F4rcc => self.fetch16(2) as u32,
            format => panic!("{} ({}) has no operand C", self.opcode(), format),
        }
    }

    /// Operand H: the prototype index of `invoke-polymorphic`.
    pub fn vreg_h(&self) -> u32 {
        match self.format() {
            Format::F45cc | Format::F4rcc => self.fetch16(3) as u32,
            format => panic!("{} ({}) has no operand H", self.opcode(), format),
        }
    }

    /// The 64-bit literal of `51l`.
    pub fn wide_vreg_b(&self) -> u64 {
        debug_assert_eq!(self.format(), Format::F51l);
        self.fetch32(1) as u64 | ((self.fetch32(3) as u64) << 32)
    }

    /// Argument registers of a `35c`/`45cc` instruction.
    ///
    /// Only the first `vreg_a()` entries are meaningful.
    pub fn var_args(&self) -> [u32; MAX_VAR_ARGS] {
        debug_assert!(self.format().has_var_args());
        let data = self.inst_data();
        let regs = self.fetch16(2);
        [
            (regs & 0x0f) as u32,
            ((regs >> 4) & 0x0f) as u32,
            ((regs >> 8) & 0x0f) as u32,
            ((regs >> 12) & 0x0f) as u32,
            ((data >> 8) & 0x0f) as u32,
        ]
    }

    /// Argument registers as a list, for either var-args or range formats.
    pub fn arg_registers(&self) -> Vec<u32> {
        let count = self.vreg_a() as usize;
        if self.format().has_range() {
            let first = self.vreg_c();
            (first..first + count as u32).collect()
        } else {
            self.var_args()[..count.min(MAX_VAR_ARGS)].to_vec()
        }
    }
}

impl fmt::Debug for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.dex_pc, self)
    }
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inst_data() {
            PACKED_SWITCH_SIGNATURE => return write!(f, "packed-switch-payload ({} entries)", self.fetch16(1)),
            SPARSE_SWITCH_SIGNATURE => return write!(f, "sparse-switch-payload ({} entries)", self.fetch16(1)),
            ARRAY_DATA_SIGNATURE => return write!(f, "array-data ({} elements)", self.fetch32(2)),
            _ => {}
        }
        let op = self.opcode();
        let name = op.name();
        match op.format() {
            Format::F10x => write!(f, "{}", name),
            Format::F12x => write!(f, "{} v{}, v{}", name, self.vreg_a(), self.vreg_b()),
            Format::F11n => write!(f, "{} v{}, #int {}", name, self.vreg_a(), self.vreg_b() as i32),
            Format::F11x => write!(f, "{} v{}", name, self.vreg_a()),
            Format::F10t | Format::F20t | Format::F30t => {
                write!(f, "{} {:+}", name, self.vreg_a() as i32)
            }
            Format::F22x | Format::F32x => write!(f, "{} v{}, v{}", name, self.vreg_a(), self.vreg_b()),
            Format::F21t | Format::F31t => {
                write!(f, "{} v{}, {:+}", name, self.vreg_a(), self.vreg_b() as i32)
            }
            Format::F21s | Format::F31i => {
                write!(f, "{} v{}, #int {}", name, self.vreg_a(), self.vreg_b() as i32)
            }
            Format::F21h => write!(f, "{} v{}, #{:#x} (high16)", name, self.vreg_a(), self.vreg_b()),
            Format::F21c | Format::F31c => write!(f, "{} v{}, @{}", name, self.vreg_a(), self.vreg_b()),
            Format::F23x => write!(f, "{} v{}, v{}, v{}", name, self.vreg_a(), self.vreg_b(), self.vreg_c()),
            Format::F22b | Format::F22s => write!(
                f,
                "{} v{}, v{}, #int {}",
                name,
                self.vreg_a(),
                self.vreg_b(),
                self.vreg_c() as i32
            ),
            Format::F22t => write!(
                f,
                "{} v{}, v{}, {:+}",
                name,
                self.vreg_a(),
                self.vreg_b(),
                self.vreg_c() as i32
            ),
            Format::F22c => write!(f, "{} v{}, v{}, @{}", name, self.vreg_a(), self.vreg_b(), self.vreg_c()),
            Format::F35c | Format::F45cc => {
                write!(f, "{} {{", name)?;
                for (i, reg) in self.arg_registers().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "v{}", reg)?;
                }
                write!(f, "}}, @{}", self.vreg_b())?;
                if op.format() == Format::F45cc {
                    write!(f, ", proto@{}", self.vreg_h())?;
                }
                Ok(())
            }
            Format::F3rc | Format::F4rcc => {
                let first = self.vreg_c();
                let count = self.vreg_a();
                if count == 0 {
                    write!(f, "{} {{}}, @{}", name, self.vreg_b())?;
                } else {
                    write!(f, "{} {{v{} .. v{}}}, @{}", name, first, first + count - 1, self.vreg_b())?;
                }
                if op.format() == Format::F4rcc {
                    write!(f, ", proto@{}", self.vreg_h())?;
                }
                Ok(())
            }
            Format::F51l => write!(f, "{} v{}, #long {}", name, self.vreg_a(), self.wide_vreg_b() as i64),
        }
    }
}
