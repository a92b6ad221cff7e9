//! JIT interface
//!
//! The interpreter feeds hotness samples to a [`Jit`] on backward branches
//! and offers it every branch for on-stack replacement. An OSR hand-off
//! runs the rest of the activation in compiled code and returns its result;
//! the interpreter then exits the activation with that value.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::method::{Method, MethodId};
use crate::shadow_frame::ShadowFrame;
use crate::thread::ManagedThread;
use crate::value::JValue;

/// Compiler services used by the interpreter
pub trait Jit: Send + Sync {
    /// Record `count` executions of `method`
    fn add_samples(&self, thread: &ManagedThread, method: &Method, count: u32, with_backedges: bool);

    /// Try to continue the activation in compiled code at `dex_pc + offset`
    ///
    /// Returns the activation's result if compiled code ran it to completion.
    fn maybe_do_osr(
        &self,
        thread: &ManagedThread,
        method: &Method,
        dex_pc: u32,
        offset: i32,
        frame: &mut ShadowFrame,
    ) -> Option<JValue>;
}

/// Compiled continuation of a method from a fixed dex pc
pub type OsrEntry = Arc<dyn Fn(&ManagedThread, &mut ShadowFrame) -> JValue + Send + Sync>;

/// Sample counter with installable OSR entries
///
/// A method becomes hot once it has collected `threshold` samples. Hot
/// methods transfer to an installed entry when a branch targets its pc.
pub struct HotnessCounter {
    threshold: u32,
    counts: Mutex<FxHashMap<MethodId, u32>>,
    osr_entries: RwLock<FxHashMap<(MethodId, u32), OsrEntry>>,
    osr_transitions: AtomicUsize,
}

impl HotnessCounter {
    /// Create a counter with the given hotness threshold
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: Mutex::new(FxHashMap::default()),
            osr_entries: RwLock::new(FxHashMap::default()),
            osr_transitions: AtomicUsize::new(0),
        }
    }

    /// Samples collected for `method`
    pub fn hotness(&self, method: MethodId) -> u32 {
        self.counts.lock().get(&method).copied().unwrap_or(0)
    }

    /// Whether `method` has reached the threshold
    pub fn is_hot(&self, method: MethodId) -> bool {
        self.hotness(method) >= self.threshold
    }

    /// Install compiled code for `method` entered at `dex_pc`
    pub fn install_osr_entry(
        &self,
        method: MethodId,
        dex_pc: u32,
        entry: impl Fn(&ManagedThread, &mut ShadowFrame) -> JValue + Send + Sync + 'static,
    ) {
        self.osr_entries.write().insert((method, dex_pc), Arc::new(entry));
    }

    /// Number of completed OSR hand-offs
    pub fn osr_transitions(&self) -> usize {
        self.osr_transitions.load(Ordering::Relaxed)
    }
}

impl Jit for HotnessCounter {
    fn add_samples(&self, _thread: &ManagedThread, method: &Method, count: u32, with_backedges: bool) {
        let mut counts = self.counts.lock();
        let hotness = counts.entry(method.id()).or_insert(0);
        let before = *hotness;
        *hotness = hotness.saturating_add(count);
        if before < self.threshold && *hotness >= self.threshold {
            tracing::debug!(target: "dexter::jit", method = %method, with_backedges, "method became hot");
        }
    }

    fn maybe_do_osr(
        &self,
        thread: &ManagedThread,
        method: &Method,
        dex_pc: u32,
        offset: i32,
        frame: &mut ShadowFrame,
    ) -> Option<JValue> {
        if !self.is_hot(method.id()) {
            return None;
        }
        let target = (dex_pc as i64 + offset as i64) as u32;
        let entry = self.osr_entries.read().get(&(method.id(), target)).cloned()?;
        tracing::debug!(target: "dexter::jit", method = %method, dex_pc = target, "osr transition");
        frame.set_dex_pc(target);
        let result = entry(thread, frame);
        self.osr_transitions.fetch_add(1, Ordering::Relaxed);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassId;
    use crate::method::{CodeItem, MethodBuilder};

    fn method() -> Arc<Method> {
        Arc::new(Method::from_builder(
            MethodId(7),
            ClassId(0),
            MethodBuilder::new("loop", "I").static_method().code(CodeItem::new(1, 0, vec![0x000e])),
            None,
        ))
    }

    #[test]
    fn test_threshold() {
        let jit = HotnessCounter::new(3);
        let thread = ManagedThread::detached();
        let m = method();
        jit.add_samples(&thread, &m, 2, true);
        assert!(!jit.is_hot(m.id()));
        jit.add_samples(&thread, &m, 1, true);
        assert!(jit.is_hot(m.id()));
    }

    #[test]
    fn test_osr_only_when_hot_and_installed() {
        let jit = HotnessCounter::new(1);
        let thread = ManagedThread::detached();
        let m = method();
        let mut frame = ShadowFrame::new_for_method(m.clone());
        jit.install_osr_entry(m.id(), 0, |_, _| JValue::from_int(99));

        assert_eq!(jit.maybe_do_osr(&thread, &m, 4, -4, &mut frame), None);
        jit.add_samples(&thread, &m, 1, true);
        assert_eq!(jit.maybe_do_osr(&thread, &m, 4, -2, &mut frame), None);
        assert_eq!(jit.maybe_do_osr(&thread, &m, 4, -4, &mut frame), Some(JValue::from_int(99)));
        assert_eq!(jit.osr_transitions(), 1);
    }
}
