//! Dex opcodes
//!
//! This module defines the complete Dalvik instruction set as seen by the
//! interpreter, including the runtime-private quickened forms.
//!
//! Every opcode is the low byte of the first code unit of an instruction.
//! The table below is the single source for mnemonics, encoding formats and
//! control-flow flags; everything else in the crate derives from it.
//!
//! Opcodes are organized into ranges:
//! - 0x00-0x0D: Moves
//! - 0x0E-0x11: Returns
//! - 0x12-0x1C: Constants
//! - 0x1D-0x27: Monitors, type checks, allocation, throw
//! - 0x28-0x3D: Branches, switches and comparisons
//! - 0x44-0x6D: Array, instance and static field access
//! - 0x6E-0x78: Invokes
//! - 0x7B-0xE2: Unary, conversion and binary arithmetic
//! - 0xE3-0xF2: Quickened field access and virtual invokes
//! - 0xFA-0xFF: Method handles, call sites and polymorphic invokes

use std::fmt;

/// Encoding format of an instruction.
///
/// The name follows the usual `<units><registers><kind>` convention: `22c`
/// is two code units, two registers and a constant-pool index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Format {
    F10x,
    F12x,
    F11n,
    F11x,
    F10t,
    F20t,
    F22x,
    F21t,
    F21s,
    F21h,
    F21c,
    F23x,
    F22b,
    F22t,
    F22s,
    F22c,
    F32x,
    F30t,
    F31t,
    F31i,
    F31c,
    F35c,
    F3rc,
    F45cc,
    F4rcc,
    F51l,
}

impl Format {
    /// Width of an instruction in this format, in 16-bit code units.
    #[inline]
    pub const fn size_in_code_units(self) -> usize {
        match self {
            Format::F10x | Format::F12x | Format::F11n | Format::F11x | Format::F10t => 1,
            Format::F20t
            | Format::F22x
            | Format::F21t
            | Format::F21s
            | Format::F21h
            | Format::F21c
            | Format::F23x
            | Format::F22b
            | Format::F22t
            | Format::F22s
            | Format::F22c => 2,
            Format::F32x
            | Format::F30t
            | Format::F31t
            | Format::F31i
            | Format::F31c
            | Format::F35c
            | Format::F3rc => 3,
            Format::F45cc | Format::F4rcc => 4,
            Format::F51l => 5,
        }
    }

    /// Format mnemonic, e.g. `"22c"`.
    pub const fn name(self) -> &'static str {
        match self {
            Format::F10x => "10x",
            Format::F12x => "12x",
            Format::F11n => "11n",
            Format::F11x => "11x",
            Format::F10t => "10t",
            Format::F20t => "20t",
            Format::F22x => "22x",
            Format::F21t => "21t",
            Format::F21s => "21s",
            Format::F21h => "21h",
            Format::F21c => "21c",
            Format::F23x => "23x",
            Format::F22b => "22b",
            Format::F22t => "22t",
            Format::F22s => "22s",
            Format::F22c => "22c",
            Format::F32x => "32x",
            Format::F30t => "30t",
            Format::F31t => "31t",
            Format::F31i => "31i",
            Format::F31c => "31c",
            Format::F35c => "35c",
            Format::F3rc => "3rc",
            Format::F45cc => "45cc",
            Format::F4rcc => "4rcc",
            Format::F51l => "51l",
        }
    }

    /// Whether operand A is a signed branch offset.
    #[inline]
    pub const fn has_branch_a(self) -> bool {
        matches!(self, Format::F10t | Format::F20t | Format::F30t)
    }

    /// Whether the format carries a variable-length argument list.
    #[inline]
    pub const fn has_var_args(self) -> bool {
        matches!(self, Format::F35c | Format::F45cc)
    }

    /// Whether the format carries a register range.
    #[inline]
    pub const fn has_range(self) -> bool {
        matches!(self, Format::F3rc | Format::F4rcc)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Control-flow and side-effect flags of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpcodeFlags(u16);

impl OpcodeFlags {
    /// No flags (unused opcodes).
    pub const NONE: OpcodeFlags = OpcodeFlags(0);
    /// Execution may fall through to the next instruction.
    pub const CONTINUE: OpcodeFlags = OpcodeFlags(1 << 0);
    /// The instruction may branch to a relative target.
    pub const BRANCH: OpcodeFlags = OpcodeFlags(1 << 1);
    /// The instruction is a switch that references a payload.
    pub const SWITCH: OpcodeFlags = OpcodeFlags(1 << 2);
    /// The instruction may throw.
    pub const THROW: OpcodeFlags = OpcodeFlags(1 << 3);
    /// The instruction leaves the method.
    pub const RETURN: OpcodeFlags = OpcodeFlags(1 << 4);
    /// The instruction invokes another method.
    pub const INVOKE: OpcodeFlags = OpcodeFlags(1 << 5);

    /// Raw flag bits.
    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every flag in `other` is set.
    #[inline]
    pub const fn contains(self, other: OpcodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpcodeFlags {
    type Output = OpcodeFlags;

    fn bitor(self, rhs: OpcodeFlags) -> OpcodeFlags {
        OpcodeFlags(self.0 | rhs.0)
    }
}

macro_rules! define_opcodes {
    ($( $value:literal => $variant:ident, $mnemonic:literal, $format:ident, $($flag:ident)|+ ; )*) => {
        /// Dex opcode enumeration
        ///
        /// The enumeration is total over `u8`: unassigned values map to the
        /// `Unused*` variants, which the interpreter treats as a fatal error.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $(
                #[doc = $mnemonic]
                $variant = $value,
            )*
        }

        impl Opcode {
            const TABLE: [Opcode; 256] = [$(Opcode::$variant,)*];

            /// Decode an opcode byte.
            #[inline]
            pub const fn from_u8(byte: u8) -> Opcode {
                Self::TABLE[byte as usize]
            }

            /// Dex mnemonic, e.g. `"move-result-wide"`.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            /// Encoding format.
            #[inline]
            pub const fn format(self) -> Format {
                match self {
                    $(Opcode::$variant => Format::$format,)*
                }
            }

            /// Control-flow flags.
            #[inline]
            pub const fn flags(self) -> OpcodeFlags {
                match self {
                    $(Opcode::$variant => OpcodeFlags(0 $(| OpcodeFlags::$flag.0)+),)*
                }
            }
        }
    };
}

define_opcodes! {
    0x00 => Nop, "nop", F10x, CONTINUE;
    0x01 => Move, "move", F12x, CONTINUE;
    0x02 => MoveFrom16, "move/from16", F22x, CONTINUE;
    0x03 => Move16, "move/16", F32x, CONTINUE;
    0x04 => MoveWide, "move-wide", F12x, CONTINUE;
    0x05 => MoveWideFrom16, "move-wide/from16", F22x, CONTINUE;
    0x06 => MoveWide16, "move-wide/16", F32x, CONTINUE;
    0x07 => MoveObject, "move-object", F12x, CONTINUE;
    0x08 => MoveObjectFrom16, "move-object/from16", F22x, CONTINUE;
    0x09 => MoveObject16, "move-object/16", F32x, CONTINUE;
    0x0a => MoveResult, "move-result", F11x, CONTINUE;
    0x0b => MoveResultWide, "move-result-wide", F11x, CONTINUE;
    0x0c => MoveResultObject, "move-result-object", F11x, CONTINUE;
    0x0d => MoveException, "move-exception", F11x, CONTINUE;
    0x0e => ReturnVoid, "return-void", F10x, RETURN;
    0x0f => Return, "return", F11x, RETURN;
    0x10 => ReturnWide, "return-wide", F11x, RETURN;
    0x11 => ReturnObject, "return-object", F11x, RETURN;
    0x12 => Const4, "const/4", F11n, CONTINUE;
    0x13 => Const16, "const/16", F21s, CONTINUE;
    0x14 => Const, "const", F31i, CONTINUE;
    0x15 => ConstHigh16, "const/high16", F21h, CONTINUE;
    0x16 => ConstWide16, "const-wide/16", F21s, CONTINUE;
    0x17 => ConstWide32, "const-wide/32", F31i, CONTINUE;
    0x18 => ConstWide, "const-wide", F51l, CONTINUE;
    0x19 => ConstWideHigh16, "const-wide/high16", F21h, CONTINUE;
    0x1a => ConstString, "const-string", F21c, CONTINUE | THROW;
    0x1b => ConstStringJumbo, "const-string/jumbo", F31c, CONTINUE | THROW;
    0x1c => ConstClass, "const-class", F21c, CONTINUE | THROW;
    0x1d => MonitorEnter, "monitor-enter", F11x, CONTINUE | THROW;
    0x1e => MonitorExit, "monitor-exit", F11x, CONTINUE | THROW;
    0x1f => CheckCast, "check-cast", F21c, CONTINUE | THROW;
    0x20 => InstanceOf, "instance-of", F22c, CONTINUE | THROW;
    0x21 => ArrayLength, "array-length", F12x, CONTINUE | THROW;
    0x22 => NewInstance, "new-instance", F21c, CONTINUE | THROW;
    0x23 => NewArray, "new-array", F22c, CONTINUE | THROW;
    0x24 => FilledNewArray, "filled-new-array", F35c, CONTINUE | THROW;
    0x25 => FilledNewArrayRange, "filled-new-array/range", F3rc, CONTINUE | THROW;
    0x26 => FillArrayData, "fill-array-data", F31t, CONTINUE | THROW;
    0x27 => Throw, "throw", F11x, THROW;
    0x28 => Goto, "goto", F10t, BRANCH;
    0x29 => Goto16, "goto/16", F20t, BRANCH;
    0x2a => Goto32, "goto/32", F30t, BRANCH;
    0x2b => PackedSwitch, "packed-switch", F31t, CONTINUE | SWITCH;
    0x2c => SparseSwitch, "sparse-switch", F31t, CONTINUE | SWITCH;
    0x2d => CmplFloat, "cmpl-float", F23x, CONTINUE;
    0x2e => CmpgFloat, "cmpg-float", F23x, CONTINUE;
    0x2f => CmplDouble, "cmpl-double", F23x, CONTINUE;
    0x30 => CmpgDouble, "cmpg-double", F23x, CONTINUE;
    0x31 => CmpLong, "cmp-long", F23x, CONTINUE;
    0x32 => IfEq, "if-eq", F22t, CONTINUE | BRANCH;
    0x33 => IfNe, "if-ne", F22t, CONTINUE | BRANCH;
    0x34 => IfLt, "if-lt", F22t, CONTINUE | BRANCH;
    0x35 => IfGe, "if-ge", F22t, CONTINUE | BRANCH;
    0x36 => IfGt, "if-gt", F22t, CONTINUE | BRANCH;
    0x37 => IfLe, "if-le", F22t, CONTINUE | BRANCH;
    0x38 => IfEqz, "if-eqz", F21t, CONTINUE | BRANCH;
    0x39 => IfNez, "if-nez", F21t, CONTINUE | BRANCH;
    0x3a => IfLtz, "if-ltz", F21t, CONTINUE | BRANCH;
    0x3b => IfGez, "if-gez", F21t, CONTINUE | BRANCH;
    0x3c => IfGtz, "if-gtz", F21t, CONTINUE | BRANCH;
    0x3d => IfLez, "if-lez", F21t, CONTINUE | BRANCH;
    0x3e => Unused3e, "unused-3e", F10x, NONE;
    0x3f => Unused3f, "unused-3f", F10x, NONE;
    0x40 => Unused40, "unused-40", F10x, NONE;
    0x41 => Unused41, "unused-41", F10x, NONE;
    0x42 => Unused42, "unused-42", F10x, NONE;
    0x43 => Unused43, "unused-43", F10x, NONE;
    0x44 => Aget, "aget", F23x, CONTINUE | THROW;
    0x45 => AgetWide, "aget-wide", F23x, CONTINUE | THROW;
    0x46 => AgetObject, "aget-object", F23x, CONTINUE | THROW;
    0x47 => AgetBoolean, "aget-boolean", F23x, CONTINUE | THROW;
    0x48 => AgetByte, "aget-byte", F23x, CONTINUE | THROW;
    0x49 => AgetChar, "aget-char", F23x, CONTINUE | THROW;
    0x4a => AgetShort, "aget-short", F23x, CONTINUE | THROW;
    0x4b => Aput, "aput", F23x, CONTINUE | THROW;
    0x4c => AputWide, "aput-wide", F23x, CONTINUE | THROW;
    0x4d => AputObject, "aput-object", F23x, CONTINUE | THROW;
    0x4e => AputBoolean, "aput-boolean", F23x, CONTINUE | THROW;
    0x4f => AputByte, "aput-byte", F23x, CONTINUE | THROW;
    0x50 => AputChar, "aput-char", F23x, CONTINUE | THROW;
    0x51 => AputShort, "aput-short", F23x, CONTINUE | THROW;
    0x52 => Iget, "iget", F22c, CONTINUE | THROW;
    0x53 => IgetWide, "iget-wide", F22c, CONTINUE | THROW;
    0x54 => IgetObject, "iget-object", F22c, CONTINUE | THROW;
    0x55 => IgetBoolean, "iget-boolean", F22c, CONTINUE | THROW;
    0x56 => IgetByte, "iget-byte", F22c, CONTINUE | THROW;
    0x57 => IgetChar, "iget-char", F22c, CONTINUE | THROW;
    0x58 => IgetShort, "iget-short", F22c, CONTINUE | THROW;
    0x59 => Iput, "iput", F22c, CONTINUE | THROW;
    0x5a => IputWide, "iput-wide", F22c, CONTINUE | THROW;
    0x5b => IputObject, "iput-object", F22c, CONTINUE | THROW;
    0x5c => IputBoolean, "iput-boolean", F22c, CONTINUE | THROW;
    0x5d => IputByte, "iput-byte", F22c, CONTINUE | THROW;
    0x5e => IputChar, "iput-char", F22c, CONTINUE | THROW;
    0x5f => IputShort, "iput-short", F22c, CONTINUE | THROW;
    0x60 => Sget, "sget", F21c, CONTINUE | THROW;
    0x61 => SgetWide, "sget-wide", F21c, CONTINUE | THROW;
    0x62 => SgetObject, "sget-object", F21c, CONTINUE | THROW;
    0x63 => SgetBoolean, "sget-boolean", F21c, CONTINUE | THROW;
    0x64 => SgetByte, "sget-byte", F21c, CONTINUE | THROW;
    0x65 => SgetChar, "sget-char", F21c, CONTINUE | THROW;
    0x66 => SgetShort, "sget-short", F21c, CONTINUE | THROW;
    0x67 => Sput, "sput", F21c, CONTINUE | THROW;
    0x68 => SputWide, "sput-wide", F21c, CONTINUE | THROW;
    0x69 => SputObject, "sput-object", F21c, CONTINUE | THROW;
    0x6a => SputBoolean, "sput-boolean", F21c, CONTINUE | THROW;
    0x6b => SputByte, "sput-byte", F21c, CONTINUE | THROW;
    0x6c => SputChar, "sput-char", F21c, CONTINUE | THROW;
    0x6d => SputShort, "sput-short", F21c, CONTINUE | THROW;
    0x6e => InvokeVirtual, "invoke-virtual", F35c, CONTINUE | THROW | INVOKE;
    0x6f => InvokeSuper, "invoke-super", F35c, CONTINUE | THROW | INVOKE;
    0x70 => InvokeDirect, "invoke-direct", F35c, CONTINUE | THROW | INVOKE;
    0x71 => InvokeStatic, "invoke-static", F35c, CONTINUE | THROW | INVOKE;
    0x72 => InvokeInterface, "invoke-interface", F35c, CONTINUE | THROW | INVOKE;
    0x73 => ReturnVoidNoBarrier, "return-void-no-barrier", F10x, RETURN;
    0x74 => InvokeVirtualRange, "invoke-virtual/range", F3rc, CONTINUE | THROW | INVOKE;
    0x75 => InvokeSuperRange, "invoke-super/range", F3rc, CONTINUE | THROW | INVOKE;
    0x76 => InvokeDirectRange, "invoke-direct/range", F3rc, CONTINUE | THROW | INVOKE;
    0x77 => InvokeStaticRange, "invoke-static/range", F3rc, CONTINUE | THROW | INVOKE;
    0x78 => InvokeInterfaceRange, "invoke-interface/range", F3rc, CONTINUE | THROW | INVOKE;
    0x79 => Unused79, "unused-79", F10x, NONE;
    0x7a => Unused7a, "unused-7a", F10x, NONE;
    0x7b => NegInt, "neg-int", F12x, CONTINUE;
    0x7c => NotInt, "not-int", F12x, CONTINUE;
    0x7d => NegLong, "neg-long", F12x, CONTINUE;
    0x7e => NotLong, "not-long", F12x, CONTINUE;
    0x7f => NegFloat, "neg-float", F12x, CONTINUE;
    0x80 => NegDouble, "neg-double", F12x, CONTINUE;
    0x81 => IntToLong, "int-to-long", F12x, CONTINUE;
    0x82 => IntToFloat, "int-to-float", F12x, CONTINUE;
    0x83 => IntToDouble, "int-to-double", F12x, CONTINUE;
    0x84 => LongToInt, "long-to-int", F12x, CONTINUE;
    0x85 => LongToFloat, "long-to-float", F12x, CONTINUE;
    0x86 => LongToDouble, "long-to-double", F12x, CONTINUE;
    0x87 => FloatToInt, "float-to-int", F12x, CONTINUE;
    0x88 => FloatToLong, "float-to-long", F12x, CONTINUE;
    0x89 => FloatToDouble, "float-to-double", F12x, CONTINUE;
    0x8a => DoubleToInt, "double-to-int", F12x, CONTINUE;
    0x8b => DoubleToLong, "double-to-long", F12x, CONTINUE;
    0x8c => DoubleToFloat, "double-to-float", F12x, CONTINUE;
    0x8d => IntToByte, "int-to-byte", F12x, CONTINUE;
    0x8e => IntToChar, "int-to-char", F12x, CONTINUE;
    0x8f => IntToShort, "int-to-short", F12x, CONTINUE;
    0x90 => AddInt, "add-int", F23x, CONTINUE;
    0x91 => SubInt, "sub-int", F23x, CONTINUE;
    0x92 => MulInt, "mul-int", F23x, CONTINUE;
    0x93 => DivInt, "div-int", F23x, CONTINUE | THROW;
    0x94 => RemInt, "rem-int", F23x, CONTINUE | THROW;
    0x95 => AndInt, "and-int", F23x, CONTINUE;
    0x96 => OrInt, "or-int", F23x, CONTINUE;
    0x97 => XorInt, "xor-int", F23x, CONTINUE;
    0x98 => ShlInt, "shl-int", F23x, CONTINUE;
    0x99 => ShrInt, "shr-int", F23x, CONTINUE;
    0x9a => UshrInt, "ushr-int", F23x, CONTINUE;
    0x9b => AddLong, "add-long", F23x, CONTINUE;
    0x9c => SubLong, "sub-long", F23x, CONTINUE;
    0x9d => MulLong, "mul-long", F23x, CONTINUE;
    0x9e => DivLong, "div-long", F23x, CONTINUE | THROW;
    0x9f => RemLong, "rem-long", F23x, CONTINUE | THROW;
    0xa0 => AndLong, "and-long", F23x, CONTINUE;
    0xa1 => OrLong, "or-long", F23x, CONTINUE;
    0xa2 => XorLong, "xor-long", F23x, CONTINUE;
    0xa3 => ShlLong, "shl-long", F23x, CONTINUE;
    0xa4 => ShrLong, "shr-long", F23x, CONTINUE;
    0xa5 => UshrLong, "ushr-long", F23x, CONTINUE;
    0xa6 => AddFloat, "add-float", F23x, CONTINUE;
    0xa7 => SubFloat, "sub-float", F23x, CONTINUE;
    0xa8 => MulFloat, "mul-float", F23x, CONTINUE;
    0xa9 => DivFloat, "div-float", F23x, CONTINUE;
    0xaa => RemFloat, "rem-float", F23x, CONTINUE;
    0xab => AddDouble, "add-double", F23x, CONTINUE;
    0xac => SubDouble, "sub-double", F23x, CONTINUE;
    0xad => MulDouble, "mul-double", F23x, CONTINUE;
    0xae => DivDouble, "div-double", F23x, CONTINUE;
    0xaf => RemDouble, "rem-double", F23x, CONTINUE;
    0xb0 => AddInt2addr, "add-int/2addr", F12x, CONTINUE;
    0xb1 => SubInt2addr, "sub-int/2addr", F12x, CONTINUE;
    0xb2 => MulInt2addr, "mul-int/2addr", F12x, CONTINUE;
    0xb3 => DivInt2addr, "div-int/2addr", F12x, CONTINUE | THROW;
    0xb4 => RemInt2addr, "rem-int/2addr", F12x, CONTINUE | THROW;
    0xb5 => AndInt2addr, "and-int/2addr", F12x, CONTINUE;
    0xb6 => OrInt2addr, "or-int/2addr", F12x, CONTINUE;
    0xb7 => XorInt2addr, "xor-int/2addr", F12x, CONTINUE;
    0xb8 => ShlInt2addr, "shl-int/2addr", F12x, CONTINUE;
    0xb9 => ShrInt2addr, "shr-int/2addr", F12x, CONTINUE;
    0xba => UshrInt2addr, "ushr-int/2addr", F12x, CONTINUE;
    0xbb => AddLong2addr, "add-long/2addr", F12x, CONTINUE;
    0xbc => SubLong2addr, "sub-long/2addr", F12x, CONTINUE;
    0xbd => MulLong2addr, "mul-long/2addr", F12x, CONTINUE;
    0xbe => DivLong2addr, "div-long/2addr", F12x, CONTINUE | THROW;
    0xbf => RemLong2addr, "rem-long/2addr", F12x, CONTINUE | THROW;
    0xc0 => AndLong2addr, "and-long/2addr", F12x, CONTINUE;
    0xc1 => OrLong2addr, "or-long/2addr", F12x, CONTINUE;
    0xc2 => XorLong2addr, "xor-long/2addr", F12x, CONTINUE;
    0xc3 => ShlLong2addr, "shl-long/2addr", F12x, CONTINUE;
    0xc4 => ShrLong2addr, "shr-long/2addr", F12x, CONTINUE;
    0xc5 => UshrLong2addr, "ushr-long/2addr", F12x, CONTINUE;
    0xc6 => AddFloat2addr, "add-float/2addr", F12x, CONTINUE;
    0xc7 => SubFloat2addr, "sub-float/2addr", F12x, CONTINUE;
    0xc8 => MulFloat2addr, "mul-float/2addr", F12x, CONTINUE;
    0xc9 => DivFloat2addr, "div-float/2addr", F12x, CONTINUE;
    0xca => RemFloat2addr, "rem-float/2addr", F12x, CONTINUE;
    0xcb => AddDouble2addr, "add-double/2addr", F12x, CONTINUE;
    0xcc => SubDouble2addr, "sub-double/2addr", F12x, CONTINUE;
    0xcd => MulDouble2addr, "mul-double/2addr", F12x, CONTINUE;
    0xce => DivDouble2addr, "div-double/2addr", F12x, CONTINUE;
    0xcf => RemDouble2addr, "rem-double/2addr", F12x, CONTINUE;
    0xd0 => AddIntLit16, "add-int/lit16", F22s, CONTINUE;
    0xd1 => RsubInt, "rsub-int", F22s, CONTINUE;
    0xd2 => MulIntLit16, "mul-int/lit16", F22s, CONTINUE;
    0xd3 => DivIntLit16, "div-int/lit16", F22s, CONTINUE | THROW;
    0xd4 => RemIntLit16, "rem-int/lit16", F22s, CONTINUE | THROW;
    0xd5 => AndIntLit16, "and-int/lit16", F22s, CONTINUE;
    0xd6 => OrIntLit16, "or-int/lit16", F22s, CONTINUE;
    0xd7 => XorIntLit16, "xor-int/lit16", F22s, CONTINUE;
    0xd8 => AddIntLit8, "add-int/lit8", F22b, CONTINUE;
    0xd9 => RsubIntLit8, "rsub-int/lit8", F22b, CONTINUE;
    0xda => MulIntLit8, "mul-int/lit8", F22b, CONTINUE;
    0xdb => DivIntLit8, "div-int/lit8", F22b, CONTINUE | THROW;
    0xdc => RemIntLit8, "rem-int/lit8", F22b, CONTINUE | THROW;
    0xdd => AndIntLit8, "and-int/lit8", F22b, CONTINUE;
    0xde => OrIntLit8, "or-int/lit8", F22b, CONTINUE;
    0xdf => XorIntLit8, "xor-int/lit8", F22b, CONTINUE;
    0xe0 => ShlIntLit8, "shl-int/lit8", F22b, CONTINUE;
    0xe1 => ShrIntLit8, "shr-int/lit8", F22b, CONTINUE;
    0xe2 => UshrIntLit8, "ushr-int/lit8", F22b, CONTINUE;
    0xe3 => IgetQuick, "iget-quick", F22c, CONTINUE | THROW;
    0xe4 => IgetWideQuick, "iget-wide-quick", F22c, CONTINUE | THROW;
    0xe5 => IgetObjectQuick, "iget-object-quick", F22c, CONTINUE | THROW;
    0xe6 => IputQuick, "iput-quick", F22c, CONTINUE | THROW;
    0xe7 => IputWideQuick, "iput-wide-quick", F22c, CONTINUE | THROW;
    0xe8 => IputObjectQuick, "iput-object-quick", F22c, CONTINUE | THROW;
    0xe9 => InvokeVirtualQuick, "invoke-virtual-quick", F35c, CONTINUE | THROW | INVOKE;
    0xea => InvokeVirtualRangeQuick, "invoke-virtual/range-quick", F3rc, CONTINUE | THROW | INVOKE;
    0xeb => IputBooleanQuick, "iput-boolean-quick", F22c, CONTINUE | THROW;
    0xec => IputByteQuick, "iput-byte-quick", F22c, CONTINUE | THROW;
    0xed => IputCharQuick, "iput-char-quick", F22c, CONTINUE | THROW;
    0xee => IputShortQuick, "iput-short-quick", F22c, CONTINUE | THROW;
    0xef => IgetBooleanQuick, "iget-boolean-quick", F22c, CONTINUE | THROW;
    0xf0 => IgetByteQuick, "iget-byte-quick", F22c, CONTINUE | THROW;
    0xf1 => IgetCharQuick, "iget-char-quick", F22c, CONTINUE | THROW;
    0xf2 => IgetShortQuick, "iget-short-quick", F22c, CONTINUE | THROW;
    0xf3 => UnusedF3, "unused-f3", F10x, NONE;
    0xf4 => UnusedF4, "unused-f4", F10x, NONE;
    0xf5 => UnusedF5, "unused-f5", F10x, NONE;
    0xf6 => UnusedF6, "unused-f6", F10x, NONE;
    0xf7 => UnusedF7, "unused-f7", F10x, NONE;
    0xf8 => UnusedF8, "unused-f8", F10x, NONE;
    0xf9 => UnusedF9, "unused-f9", F10x, NONE;
    0xfa => InvokePolymorphic, "invoke-polymorphic", F45cc, CONTINUE | THROW | INVOKE;
    0xfb => InvokePolymorphicRange, "invoke-polymorphic/range", F4rcc, CONTINUE | THROW | INVOKE;
    0xfc => InvokeCustom, "invoke-custom", F35c, CONTINUE | THROW | INVOKE;
    0xfd => InvokeCustomRange, "invoke-custom/range", F3rc, CONTINUE | THROW | INVOKE;
    0xfe => ConstMethodHandle, "const-method-handle", F21c, CONTINUE | THROW;
    0xff => ConstMethodType, "const-method-type", F21c, CONTINUE | THROW;
}

impl Opcode {
    /// Convert opcode to its byte value.
    #[inline]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether this opcode is an unassigned slot.
    pub const fn is_unused(self) -> bool {
        self.flags().bits() == 0
    }

    /// Whether execution may fall through to the next instruction.
    #[inline]
    pub const fn can_continue(self) -> bool {
        self.flags().contains(OpcodeFlags::CONTINUE)
    }

    /// Whether this opcode may throw.
    #[inline]
    pub const fn can_throw(self) -> bool {
        self.flags().contains(OpcodeFlags::THROW)
    }

    /// Check if this opcode is a branch (goto or if-*)
    #[inline]
    pub const fn is_branch(self) -> bool {
        self.flags().contains(OpcodeFlags::BRANCH)
    }

    /// Check if this opcode is a switch
    #[inline]
    pub const fn is_switch(self) -> bool {
        self.flags().contains(OpcodeFlags::SWITCH)
    }

    /// Check if this opcode is an invoke
    #[inline]
    pub const fn is_invoke(self) -> bool {
        self.flags().contains(OpcodeFlags::INVOKE)
    }

    /// Check if this opcode is a return
    #[inline]
    pub const fn is_return(self) -> bool {
        self.flags().contains(OpcodeFlags::RETURN)
    }

    /// Check if this opcode never falls through (return, throw, goto)
    pub const fn is_terminator(self) -> bool {
        !self.can_continue() && !self.is_unused()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
