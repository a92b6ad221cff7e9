//! Interpreter activation frames
//!
//! A [`ShadowFrame`] holds the register file of one interpreted method
//! activation together with its dex pc and the control flags the dispatch
//! loop and its collaborators exchange.
//!
//! # Register Layout
//!
//! ```text
//! index:   0      1      2      3      4
//!        ┌──────┬──────┬──────┬──────┬──────┐
//! vregs  │ bits │ lo   │ hi   │ id   │ bits │   primitive view (u32)
//!        ├──────┼──────┼──────┼──────┼──────┤
//! refs   │ None │ None │ None │ @id  │ None │   reference shadow
//!        └──────┴──────┴──────┴──────┴──────┘
//!                 └─ wide ─┘         └── ins (last ins_size registers)
//! ```
//!
//! A primitive write clears the reference shadow of every slot it touches;
//! a reference write fills both views. The collector only ever looks at
//! the shadow, so stale primitive bits can never keep an object alive.

use std::sync::Arc;

use crate::method::Method;
use crate::value::{JValue, ObjRef};

/// Register file and control state of one activation
#[derive(Debug, Clone)]
pub struct ShadowFrame {
    method: Arc<Method>,
    vregs: Vec<u32>,
    refs: Vec<Option<ObjRef>>,
    dex_pc: u32,
    force_retry_instruction: bool,
    skip_next_exception_event: bool,
    force_pop_frame: bool,
    skip_method_exit_events: bool,
    forced_return: Option<JValue>,
    retried_at: Option<u32>,
    held_monitors: Vec<ObjRef>,
}

impl ShadowFrame {
    /// Frame with `registers_size` zeroed registers
    pub fn new(method: Arc<Method>, registers_size: usize) -> Self {
        Self {
            method,
            vregs: vec![0; registers_size],
            refs: vec![None; registers_size],
            dex_pc: 0,
            force_retry_instruction: false,
            skip_next_exception_event: false,
            force_pop_frame: false,
            skip_method_exit_events: false,
            forced_return: None,
            retried_at: None,
            held_monitors: Vec::new(),
        }
    }

    /// Frame sized from the method's code item, or its argument count for natives
    pub fn new_for_method(method: Arc<Method>) -> Self {
        let size = match method.code_item() {
            Some(code) => code.registers_size as usize,
            None => method.num_input_vregs(),
        };
        Self::new(method, size)
    }

    /// The executing method
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    /// Number of registers
    #[inline]
    pub fn registers_size(&self) -> usize {
        self.vregs.len()
    }

    /// Current dex pc
    #[inline]
    pub fn dex_pc(&self) -> u32 {
        self.dex_pc
    }

    /// Record the dex pc
    #[inline]
    pub fn set_dex_pc(&mut self, dex_pc: u32) {
        self.dex_pc = dex_pc;
    }

    #[inline]
    fn check(&self, index: usize) {
        debug_assert!(
            index < self.vregs.len(),
            "register v{} out of range for {} ({} registers)",
            index,
            self.method,
            self.vregs.len()
        );
    }

    /// Read a 32-bit int
    #[inline]
    pub fn get_vreg(&self, index: usize) -> i32 {
        self.check(index);
        self.vregs[index] as i32
    }

    /// Write a 32-bit int
    #[inline]
    pub fn set_vreg(&mut self, index: usize, value: i32) {
        self.check(index);
        self.vregs[index] = value as u32;
        self.refs[index] = None;
    }

    /// Read a 64-bit long from `index` and `index + 1`
    #[inline]
    pub fn get_vreg_long(&self, index: usize) -> i64 {
        self.check(index + 1);
        (self.vregs[index] as u64 | (self.vregs[index + 1] as u64) << 32) as i64
    }

    /// Write a 64-bit long into `index` and `index + 1`
    #[inline]
    pub fn set_vreg_long(&mut self, index: usize, value: i64) {
        self.check(index + 1);
        self.vregs[index] = value as u32;
        self.vregs[index + 1] = (value as u64 >> 32) as u32;
        self.refs[index] = None;
        self.refs[index + 1] = None;
    }

    /// Read a 32-bit float
    #[inline]
    pub fn get_vreg_float(&self, index: usize) -> f32 {
        f32::from_bits(self.get_vreg(index) as u32)
    }

    /// Write a 32-bit float
    #[inline]
    pub fn set_vreg_float(&mut self, index: usize, value: f32) {
        self.set_vreg(index, value.to_bits() as i32);
    }

    /// Read a 64-bit double
    #[inline]
    pub fn get_vreg_double(&self, index: usize) -> f64 {
        f64::from_bits(self.get_vreg_long(index) as u64)
    }

    /// Write a 64-bit double
    #[inline]
    pub fn set_vreg_double(&mut self, index: usize, value: f64) {
        self.set_vreg_long(index, value.to_bits() as i64);
    }

    /// Read a reference
    #[inline]
    pub fn get_vreg_reference(&self, index: usize) -> Option<ObjRef> {
        self.check(index);
        self.refs[index]
    }

    /// Write a reference
    #[inline]
    pub fn set_vreg_reference(&mut self, index: usize, value: Option<ObjRef>) {
        self.check(index);
        self.vregs[index] = value.map_or(0, ObjRef::raw);
        self.refs[index] = value;
    }

    /// Both views of one register, for argument copies
    #[inline]
    pub(crate) fn get_raw(&self, index: usize) -> (u32, Option<ObjRef>) {
        self.check(index);
        (self.vregs[index], self.refs[index])
    }

    #[inline]
    pub(crate) fn set_raw(&mut self, index: usize, (bits, reference): (u32, Option<ObjRef>)) {
        self.check(index);
        self.vregs[index] = bits;
        self.refs[index] = reference;
    }

    /// Store a [`JValue`] of kind `wide`/narrow/reference into `index`
    pub(crate) fn set_jvalue(&mut self, index: usize, value: JValue, kind: crate::class::Primitive) {
        use crate::class::Primitive;
        match kind {
            Primitive::Not => self.set_vreg_reference(index, value.get_l()),
            Primitive::Long | Primitive::Double => self.set_vreg_long(index, value.get_j()),
            Primitive::Void => {}
            _ => self.set_vreg(index, value.get_i()),
        }
    }

    /// The receiver of an instance method: the first incoming register
    pub fn this_object(&self, ins_size: usize) -> Option<ObjRef> {
        if self.method.is_static() || ins_size == 0 || ins_size > self.vregs.len() {
            return None;
        }
        self.refs[self.vregs.len() - ins_size]
    }

    /// Visit every reference held by the frame, allowing relocation
    pub fn visit_roots(&mut self, visitor: &mut impl FnMut(&mut ObjRef)) {
        for (bits, slot) in self.vregs.iter_mut().zip(self.refs.iter_mut()) {
            if let Some(reference) = slot {
                visitor(reference);
                *bits = reference.raw();
            }
        }
        for monitor in &mut self.held_monitors {
            visitor(monitor);
        }
    }

    /// References held by the frame
    pub fn roots(&self) -> Vec<ObjRef> {
        let mut roots: Vec<ObjRef> = self.refs.iter().flatten().copied().collect();
        roots.extend(self.held_monitors.iter().copied());
        roots.extend(self.forced_return.and_then(|v| v.get_l()));
        roots
    }

    /// Whether the current instruction must be re-executed
    pub fn force_retry_instruction(&self) -> bool {
        self.force_retry_instruction
    }

    /// Request re-execution of the current instruction
    pub fn set_force_retry_instruction(&mut self, value: bool) {
        self.force_retry_instruction = value;
    }

    /// Whether the next exception-thrown event is suppressed
    pub fn skip_next_exception_event(&self) -> bool {
        self.skip_next_exception_event
    }

    /// Suppress the next exception-thrown event
    pub fn set_skip_next_exception_event(&mut self, value: bool) {
        self.skip_next_exception_event = value;
    }

    /// Whether the frame has been asked to pop with a default result
    pub fn force_pop_frame(&self) -> bool {
        self.force_pop_frame
    }

    /// Ask the frame to pop at the next force-return check
    pub fn set_force_pop_frame(&mut self, value: bool) {
        self.force_pop_frame = value;
    }

    /// Whether method-exit events are suppressed for this activation
    pub fn skip_method_exit_events(&self) -> bool {
        self.skip_method_exit_events
    }

    /// Suppress method-exit events
    pub fn set_skip_method_exit_events(&mut self, value: bool) {
        self.skip_method_exit_events = value;
    }

    /// Make the activation return `value` at the next force-return check
    pub fn request_forced_return(&mut self, value: JValue) {
        self.forced_return = Some(value);
    }

    /// Whether a non-standard return is pending
    pub fn is_return_forced(&self) -> bool {
        self.force_pop_frame || self.forced_return.is_some()
    }

    pub(crate) fn take_forced_return(&mut self) -> JValue {
        self.force_pop_frame = false;
        self.forced_return.take().unwrap_or_default()
    }

    /// A forced return value requested during exit events
    pub(crate) fn take_forced_value(&mut self) -> Option<JValue> {
        self.forced_return.take()
    }

    pub(crate) fn retried_at(&self) -> Option<u32> {
        self.retried_at
    }

    pub(crate) fn set_retried_at(&mut self, dex_pc: u32) {
        self.retried_at = Some(dex_pc);
    }

    /// Monitors entered by this activation and not yet exited
    pub fn held_monitors(&self) -> &[ObjRef] {
        &self.held_monitors
    }

    pub(crate) fn push_monitor(&mut self, object: ObjRef) {
        self.held_monitors.push(object);
    }

    /// Forget the innermost entry of `object`; `false` if it was not held
    pub(crate) fn pop_monitor(&mut self, object: ObjRef) -> bool {
        match self.held_monitors.iter().rposition(|&m| m == object) {
            Some(index) => {
                self.held_monitors.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_monitors(&mut self) -> Vec<ObjRef> {
        std::mem::take(&mut self.held_monitors)
    }
}
