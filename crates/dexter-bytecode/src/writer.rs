//! Code item assembler
//!
//! [`CodeWriter`] emits 16-bit code units one format at a time. Branches and
//! payload references use [`Label`]s that are resolved by [`CodeWriter::finish`].

use crate::opcode::{Format, Opcode};
use crate::payload::{ARRAY_DATA_SIGNATURE, PACKED_SWITCH_SIGNATURE, SPARSE_SWITCH_SIGNATURE};

/// Position in the code item that is bound later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum FixupKind {
    /// Signed byte in the high half of the unit at `slot`
    High8,
    /// Signed unit at `slot`
    Unit16,
    /// Two units at `slot`, low half first
    Unit32,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    label: Label,
    base: u32,
    slot: usize,
    kind: FixupKind,
}

/// Writer for dex code units (Vec<u16> instructions)
#[derive(Debug, Default)]
pub struct CodeWriter {
    code: Vec<u16>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

#[inline]
fn unit0(op: Opcode, high: u8) -> u16 {
    op.to_u8() as u16 | ((high as u16) << 8)
}

impl CodeWriter {
    /// Create a new writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position (dex pc of the next instruction)
    #[inline]
    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    /// Allocate an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position
    pub fn bind(&mut self, label: Label) {
        debug_assert!(self.labels[label.0].is_none(), "label bound twice");
        self.labels[label.0] = Some(self.position());
    }

    /// Emit a raw code unit
    #[inline]
    pub fn emit_raw(&mut self, unit: u16) {
        self.code.push(unit);
    }

    fn start(&mut self, op: Opcode, format: Format) -> u32 {
        debug_assert_eq!(op.format(), format, "{} is not {}", op, format);
        self.position()
    }

    /// `op` (10x)
    pub fn emit_10x(&mut self, op: Opcode) -> u32 {
        let pos = self.start(op, Format::F10x);
        self.code.push(unit0(op, 0));
        pos
    }

    /// `op vA, vB` (12x), 4-bit registers
    pub fn emit_12x(&mut self, op: Opcode, a: u8, b: u8) -> u32 {
        debug_assert!(a < 16 && b < 16);
        let pos = self.start(op, Format::F12x);
        self.code.push(unit0(op, (b << 4) | a));
        pos
    }

    /// `op vA, #lit4` (11n)
    pub fn emit_11n(&mut self, op: Opcode, a: u8, literal: i8) -> u32 {
        debug_assert!(a < 16 && (-8..8).contains(&literal));
        let pos = self.start(op, Format::F11n);
        self.code.push(unit0(op, ((literal as u8) << 4) | a));
        pos
    }

    /// `op vAA` (11x)
    pub fn emit_11x(&mut self, op: Opcode, a: u8) -> u32 {
        let pos = self.start(op, Format::F11x);
        self.code.push(unit0(op, a));
        pos
    }

    /// `op +AA` (10t)
    pub fn emit_10t(&mut self, op: Opcode, target: Label) -> u32 {
        let pos = self.start(op, Format::F10t);
        self.fixup(target, pos, pos as usize, FixupKind::High8);
        self.code.push(unit0(op, 0));
        pos
    }

    /// `op +AAAA` (20t)
    pub fn emit_20t(&mut self, op: Opcode, target: Label) -> u32 {
        let pos = self.start(op, Format::F20t);
        self.code.push(unit0(op, 0));
        self.fixup(target, pos, pos as usize + 1, FixupKind::Unit16);
        self.code.push(0);
        pos
    }

    /// `op +AAAAAAAA` (30t)
    pub fn emit_30t(&mut self, op: Opcode, target: Label) -> u32 {
        let pos = self.start(op, Format::F30t);
        self.code.push(unit0(op, 0));
        self.fixup(target, pos, pos as usize + 1, FixupKind::Unit32);
        self.code.extend_from_slice(&[0, 0]);
        pos
    }

    /// `op vAA, vBBBB` (22x)
    pub fn emit_22x(&mut self, op: Opcode, a: u8, b: u16) -> u32 {
        let pos = self.start(op, Format::F22x);
        self.code.extend_from_slice(&[unit0(op, a), b]);
        pos
    }

    /// `op vAA, +BBBB` (21t)
    pub fn emit_21t(&mut self, op: Opcode, a: u8, target: Label) -> u32 {
        let pos = self.start(op, Format::F21t);
        self.code.push(unit0(op, a));
        self.fixup(target, pos, pos as usize + 1, FixupKind::Unit16);
        self.code.push(0);
        pos
    }

    /// `op vAA, #+BBBB` (21s)
    pub fn emit_21s(&mut self, op: Opcode, a: u8, literal: i16) -> u32 {
        let pos = self.start(op, Format::F21s);
        self.code.extend_from_slice(&[unit0(op, a), literal as u16]);
        pos
    }

    /// `op vAA, #+BBBB0000` (21h); `high` is the top sixteen bits
    pub fn emit_21h(&mut self, op: Opcode, a: u8, high: u16) -> u32 {
        let pos = self.start(op, Format::F21h);
        self.code.extend_from_slice(&[unit0(op, a), high]);
        pos
    }

    /// `op vAA, kind@BBBB` (21c)
    pub fn emit_21c(&mut self, op: Opcode, a: u8, index: u16) -> u32 {
        let pos = self.start(op, Format::F21c);
        self.code.extend_from_slice(&[unit0(op, a), index]);
        pos
    }

    /// `op vAA, vBB, vCC` (23x)
    pub fn emit_23x(&mut self, op: Opcode, a: u8, b: u8, c: u8) -> u32 {
        let pos = self.start(op, Format::F23x);
        self.code
            .extend_from_slice(&[unit0(op, a), b as u16 | ((c as u16) << 8)]);
        pos
    }

    /// `op vAA, vBB, #+CC` (22b)
    pub fn emit_22b(&mut self, op: Opcode, a: u8, b: u8, literal: i8) -> u32 {
        let pos = self.start(op, Format::F22b);
        self.code
            .extend_from_slice(&[unit0(op, a), b as u16 | ((literal as u8 as u16) << 8)]);
        pos
    }

    /// `op vA, vB, +CCCC` (22t)
    pub fn emit_22t(&mut self, op: Opcode, a: u8, b: u8, target: Label) -> u32 {
        debug_assert!(a < 16 && b < 16);
        let pos = self.start(op, Format::F22t);
        self.code.push(unit0(op, (b << 4) | a));
        self.fixup(target, pos, pos as usize + 1, FixupKind::Unit16);
        self.code.push(0);
        pos
    }

    /// `op vA, vB, #+CCCC` (22s)
    pub fn emit_22s(&mut self, op: Opcode, a: u8, b: u8, literal: i16) -> u32 {
        debug_assert!(a < 16 && b < 16);
        let pos = self.start(op, Format::F22s);
        self.code
            .extend_from_slice(&[unit0(op, (b << 4) | a), literal as u16]);
        pos
    }

    /// `op vA, vB, kind@CCCC` (22c)
    pub fn emit_22c(&mut self, op: Opcode, a: u8, b: u8, index: u16) -> u32 {
        debug_assert!(a < 16 && b < 16);
        let pos = self.start(op, Format::F22c);
        self.code.extend_from_slice(&[unit0(op, (b << 4) | a), index]);
        pos
    }

    /// `op vAAAA, vBBBB` (32x)
    pub fn emit_32x(&mut self, op: Opcode, a: u16, b: u16) -> u32 {
        let pos = self.start(op, Format::F32x);
        self.code.extend_from_slice(&[unit0(op, 0), a, b]);
        pos
    }

    /// `op vAA, +BBBBBBBB` (31t); `payload` labels the payload
    pub fn emit_31t(&mut self, op: Opcode, a: u8, payload: Label) -> u32 {
        let pos = self.start(op, Format::F31t);
        self.code.push(unit0(op, a));
        self.fixup(payload, pos, pos as usize + 1, FixupKind::Unit32);
        self.code.extend_from_slice(&[0, 0]);
        pos
    }

    /// `op vAA, #+BBBBBBBB` (31i)
    pub fn emit_31i(&mut self, op: Opcode, a: u8, literal: i32) -> u32 {
        let pos = self.start(op, Format::F31i);
        let bits = literal as u32;
        self.code
            .extend_from_slice(&[unit0(op, a), bits as u16, (bits >> 16) as u16]);
        pos
    }

    /// `op vAA, kind@BBBBBBBB` (31c)
    pub fn emit_31c(&mut self, op: Opcode, a: u8, index: u32) -> u32 {
        let pos = self.start(op, Format::F31c);
        self.code
            .extend_from_slice(&[unit0(op, a), index as u16, (index >> 16) as u16]);
        pos
    }

    fn var_args_units(op: Opcode, index: u16, args: &[u8]) -> [u16; 3] {
        debug_assert!(args.len() <= 5 && args.iter().all(|&r| r < 16));
        let reg = |i: usize| args.get(i).copied().unwrap_or(0) as u16;
        [
            unit0(op, ((args.len() as u8) << 4) | reg(4) as u8),
            index,
            reg(0) | (reg(1) << 4) | (reg(2) << 8) | (reg(3) << 12),
        ]
    }

    /// `op {vC, vD, vE, vF, vG}, kind@BBBB` (35c)
    pub fn emit_35c(&mut self, op: Opcode, index: u16, args: &[u8]) -> u32 {
        let pos = self.start(op, Format::F35c);
        self.code
            .extend_from_slice(&Self::var_args_units(op, index, args));
        pos
    }

    /// `op {vCCCC .. vNNNN}, kind@BBBB` (3rc)
    pub fn emit_3rc(&mut self, op: Opcode, index: u16, first: u16, count: u8) -> u32 {
        let pos = self.start(op, Format::F3rc);
        self.code
            .extend_from_slice(&[unit0(op, count), index, first]);
        pos
    }

    /// `op {vC .. vG}, meth@BBBB, proto@HHHH` (45cc)
    pub fn emit_45cc(&mut self, op: Opcode, index: u16, args: &[u8], proto: u16) -> u32 {
        let pos = self.start(op, Format::F45cc);
        self.code
            .extend_from_slice(&Self::var_args_units(op, index, args));
        self.code.push(proto);
        pos
    }

    /// `op {vCCCC .. vNNNN}, meth@BBBB, proto@HHHH` (4rcc)
    pub fn emit_4rcc(&mut self, op: Opcode, index: u16, first: u16, count: u8, proto: u16) -> u32 {
        let pos = self.start(op, Format::F4rcc);
        self.code
            .extend_from_slice(&[unit0(op, count), index, first, proto]);
        pos
    }

    /// `op vAA, #+BBBBBBBBBBBBBBBB` (51l)
    pub fn emit_51l(&mut self, op: Opcode, a: u8, literal: i64) -> u32 {
        let pos = self.start(op, Format::F51l);
        let bits = literal as u64;
        self.code.extend_from_slice(&[
            unit0(op, a),
            bits as u16,
            (bits >> 16) as u16,
            (bits >> 32) as u16,
            (bits >> 48) as u16,
        ]);
        pos
    }

    /// Pad with a `nop` so the next unit sits on a 4-byte boundary
    fn align_payload(&mut self) {
        if self.code.len() % 2 != 0 {
            self.code.push(unit0(Opcode::Nop, 0));
        }
    }

    /// Emit a packed-switch payload for the switch at `switch_at`
    pub fn emit_packed_switch_payload(
        &mut self,
        payload: Label,
        switch_at: u32,
        first_key: i32,
        targets: &[Label],
    ) {
        self.align_payload();
        self.bind(payload);
        let key = first_key as u32;
        self.code.extend_from_slice(&[
            PACKED_SWITCH_SIGNATURE,
            targets.len() as u16,
            key as u16,
            (key >> 16) as u16,
        ]);
        for &target in targets {
            let slot = self.code.len();
            self.fixup(target, switch_at, slot, FixupKind::Unit32);
            self.code.extend_from_slice(&[0, 0]);
        }
    }

    /// Emit a sparse-switch payload; `cases` must be sorted by key
    pub fn emit_sparse_switch_payload(&mut self, payload: Label, switch_at: u32, cases: &[(i32, Label)]) {
        debug_assert!(cases.windows(2).all(|w| w[0].0 < w[1].0), "sparse keys must ascend");
        self.align_payload();
        self.bind(payload);
        self.code
            .extend_from_slice(&[SPARSE_SWITCH_SIGNATURE, cases.len() as u16]);
        for &(key, _) in cases {
            let key = key as u32;
            self.code.extend_from_slice(&[key as u16, (key >> 16) as u16]);
        }
        for &(_, target) in cases {
            let slot = self.code.len();
            self.fixup(target, switch_at, slot, FixupKind::Unit32);
            self.code.extend_from_slice(&[0, 0]);
        }
    }

    /// Emit a fill-array-data payload of `element_width`-byte elements
    pub fn emit_array_data(&mut self, payload: Label, element_width: u16, elements: &[u64]) {
        debug_assert!(matches!(element_width, 1 | 2 | 4 | 8));
        self.align_payload();
        self.bind(payload);
        let count = elements.len() as u32;
        self.code.extend_from_slice(&[
            ARRAY_DATA_SIGNATURE,
            element_width,
            count as u16,
            (count >> 16) as u16,
        ]);
        let bytes: Vec<u8> = elements
            .iter()
            .flat_map(|&e| e.to_le_bytes().into_iter().take(element_width as usize))
            .collect();
        for pair in bytes.chunks(2) {
            let lo = pair[0] as u16;
            let hi = pair.get(1).copied().unwrap_or(0) as u16;
            self.code.push(lo | (hi << 8));
        }
    }

    fn fixup(&mut self, label: Label, base: u32, slot: usize, kind: FixupKind) {
        self.fixups.push(Fixup {
            label,
            base,
            slot,
            kind,
        });
    }

    /// Resolve labels and return the code units
    ///
    /// Panics if a referenced label was never bound.
    pub fn finish(mut self) -> Vec<u16> {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = self.labels[fixup.label.0]
                .unwrap_or_else(|| panic!("label {:?} referenced but never bound", fixup.label));
            let offset = target as i64 - fixup.base as i64;
            match fixup.kind {
                FixupKind::High8 => {
                    debug_assert!(i8::try_from(offset).is_ok(), "branch offset {} out of range", offset);
                    let unit = &mut self.code[fixup.slot];
                    *unit = (*unit & 0x00ff) | (((offset as i8 as u8) as u16) << 8);
                }
                FixupKind::Unit16 => {
                    debug_assert!(i16::try_from(offset).is_ok(), "branch offset {} out of range", offset);
                    self.code[fixup.slot] = offset as i16 as u16;
                }
                FixupKind::Unit32 => {
                    let bits = offset as i32 as u32;
                    self.code[fixup.slot] = bits as u16;
                    self.code[fixup.slot + 1] = (bits >> 16) as u16;
                }
            }
        }
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::payload::{ArrayDataPayload, PackedSwitchPayload, SparseSwitchPayload};

    #[test]
    fn test_forward_and_backward_branches() {
        let mut w = CodeWriter::new();
        let top = w.new_label();
        let out = w.new_label();
        w.bind(top);
        w.emit_21t(Opcode::IfEqz, 0, out);
        w.emit_22b(Opcode::AddIntLit8, 0, 0, -1);
        w.emit_10t(Opcode::Goto, top);
        w.bind(out);
        w.emit_10x(Opcode::ReturnVoid);
        let code = w.finish();

        let branch = Instruction::at(&code, 0);
        assert_eq!(branch.vreg_b() as i32, 5);
        let back = Instruction::at(&code, 4);
        assert_eq!(back.opcode(), Opcode::Goto);
        assert_eq!(back.vreg_a() as i32, -4);
    }

    #[test]
    fn test_packed_switch_payload_alignment() {
        let mut w = CodeWriter::new();
        let payload = w.new_label();
        let case0 = w.new_label();
        w.emit_10x(Opcode::Nop);
        let switch_at = w.emit_31t(Opcode::PackedSwitch, 0, payload);
        w.emit_10x(Opcode::ReturnVoid);
        w.bind(case0);
        w.emit_10x(Opcode::ReturnVoid);
        w.emit_packed_switch_payload(payload, switch_at, 10, &[case0]);
        let code = w.finish();

        let switch = Instruction::at(&code, switch_at);
        let payload_at = (switch_at as i32 + switch.vreg_b() as i32) as usize;
        assert_eq!(payload_at % 2, 0);
        let table = PackedSwitchPayload::parse(&code, payload_at).unwrap();
        assert_eq!(table.lookup(10), Some(4));
    }

    #[test]
    fn test_sparse_switch_payload() {
        let mut w = CodeWriter::new();
        let payload = w.new_label();
        let a = w.new_label();
        let switch_at = w.emit_31t(Opcode::SparseSwitch, 1, payload);
        w.bind(a);
        w.emit_10x(Opcode::ReturnVoid);
        w.emit_sparse_switch_payload(payload, switch_at, &[(-3, a), (99, a)]);
        let code = w.finish();
        let payload_at = Instruction::at(&code, 0).vreg_b() as usize;
        let table = SparseSwitchPayload::parse(&code, payload_at).unwrap();
        assert_eq!(table.lookup(99), Some(3));
        assert_eq!(table.lookup(0), None);
    }

    #[test]
    fn test_array_data_round_trip() {
        let mut w = CodeWriter::new();
        let payload = w.new_label();
        w.emit_31t(Opcode::FillArrayData, 0, payload);
        w.emit_10x(Opcode::ReturnVoid);
        w.emit_array_data(payload, 4, &[1, 0xffff_ffff, 7]);
        let code = w.finish();
        let data = ArrayDataPayload::parse(&code, 4).unwrap();
        assert_eq!(data.element_count(), 3);
        assert_eq!(data.element(1), 0xffff_ffff);
        assert_eq!(Instruction::at(&code, 4).size_in_code_units(), 4 + 6);
    }

    #[test]
    fn test_51l_and_35c_encoding() {
        let mut w = CodeWriter::new();
        w.emit_51l(Opcode::ConstWide, 4, -2);
        w.emit_35c(Opcode::InvokeStatic, 9, &[4, 5]);
        let code = w.finish();
        assert_eq!(Instruction::at(&code, 0).wide_vreg_b() as i64, -2);
        let invoke = Instruction::at(&code, 5);
        assert_eq!(invoke.vreg_b(), 9);
        assert_eq!(invoke.arg_registers(), vec![4, 5]);
    }
}
