//! Safepoint coordination for stop-the-world pauses
//!
//! Interpreter threads poll at their suspension points: backward branches,
//! exception delivery, method returns and calls. A requester (the garbage
//! collector, a debugger) raises a pending flag and waits until every
//! registered worker has parked; it then does its work and calls
//! [`SafepointCoordinator::resume`].
//!
//! ## Poll locations
//!
//! - **Backward branches**: after the hotness sample, before jumping
//! - **Pending exceptions**: before the handler search
//! - **Returns**: before the monitor check
//!
//! The fast path is a single atomic load when no pause is pending.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Reasons for requesting a safepoint pause
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Garbage collection
    GarbageCollection,
    /// Thread suspension requested by the embedder
    Suspend,
    /// Debugger inspection
    Debug,
}

/// Statistics tracking for safepoint operations
#[derive(Debug, Default)]
pub struct SafepointStats {
    total_safepoints: AtomicUsize,
    total_pause_time_us: AtomicUsize,
    max_pause_time_us: AtomicUsize,
}

impl SafepointStats {
    fn record(&self, elapsed_us: usize) {
        self.total_pause_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
        self.total_safepoints.fetch_add(1, Ordering::Relaxed);
        self.max_pause_time_us.fetch_max(elapsed_us, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.total_safepoints.store(0, Ordering::Relaxed);
        self.total_pause_time_us.store(0, Ordering::Relaxed);
        self.max_pause_time_us.store(0, Ordering::Relaxed);
    }
}

/// Coordinates stop-the-world pauses across interpreter threads
pub struct SafepointCoordinator {
    worker_count: AtomicUsize,
    workers_at_safepoint: AtomicUsize,
    gc_pending: AtomicBool,
    suspend_pending: AtomicBool,
    debug_pending: AtomicBool,
    current_reason: Mutex<Option<StopReason>>,
    parked: Condvar,
    arrived: Condvar,
    stats: SafepointStats,
}

impl SafepointCoordinator {
    /// Create a coordinator expecting `worker_count` polling threads
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: AtomicUsize::new(worker_count),
            workers_at_safepoint: AtomicUsize::new(0),
            gc_pending: AtomicBool::new(false),
            suspend_pending: AtomicBool::new(false),
            debug_pending: AtomicBool::new(false),
            current_reason: Mutex::new(None),
            parked: Condvar::new(),
            arrived: Condvar::new(),
            stats: SafepointStats::default(),
        }
    }

    /// Fast inline check, called from every suspension point
    #[inline(always)]
    pub fn poll(&self) {
        if self.is_pause_pending() {
            self.enter_safepoint();
        }
    }

    /// Whether any pause is pending
    #[inline(always)]
    pub fn is_pause_pending(&self) -> bool {
        self.gc_pending.load(Ordering::Acquire)
            || self.suspend_pending.load(Ordering::Acquire)
            || self.debug_pending.load(Ordering::Acquire)
    }

    #[cold]
    #[inline(never)]
    fn enter_safepoint(&self) {
        let start = Instant::now();
        let mut reason = self.current_reason.lock();
        if reason.is_none() {
            return;
        }
        self.workers_at_safepoint.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(target: "dexter::safepoint", reason = ?*reason, "parked at safepoint");
        self.arrived.notify_all();
        while reason.is_some() {
            self.parked.wait(&mut reason);
        }
        self.workers_at_safepoint.fetch_sub(1, Ordering::AcqRel);
        drop(reason);
        self.stats.record(start.elapsed().as_micros() as usize);
    }

    /// Request a pause and block until every registered worker has parked
    ///
    /// Returns `false` if another pause is already active. The requesting
    /// thread must not itself be a registered worker.
    pub fn request_pause(&self, reason: StopReason) -> bool {
        self.request_pause_timeout(reason, None)
    }

    /// Like [`request_pause`](Self::request_pause), giving up after `timeout`
    ///
    /// On timeout the pause is withdrawn and `false` is returned.
    pub fn request_pause_timeout(&self, reason: StopReason, timeout: Option<Duration>) -> bool {
        let mut current = self.current_reason.lock();
        if current.is_some() {
            return false;
        }
        *current = Some(reason);
        self.flag(reason).store(true, Ordering::Release);
        tracing::debug!(target: "dexter::safepoint", ?reason, "pause requested");

        let deadline = timeout.map(|t| Instant::now() + t);
        while self.workers_at_safepoint.load(Ordering::Acquire) < self.worker_count.load(Ordering::Acquire) {
            match deadline {
                Some(deadline) => {
                    if self.arrived.wait_until(&mut current, deadline).timed_out() {
                        tracing::warn!(target: "dexter::safepoint", ?reason, "pause timed out");
                        drop(current);
                        self.resume();
                        return false;
                    }
                }
                None => self.arrived.wait(&mut current),
            }
        }
        true
    }

    fn flag(&self, reason: StopReason) -> &AtomicBool {
        match reason {
            StopReason::GarbageCollection => &self.gc_pending,
            StopReason::Suspend => &self.suspend_pending,
            StopReason::Debug => &self.debug_pending,
        }
    }

    /// End the current pause and release parked workers
    pub fn resume(&self) {
        let mut current = self.current_reason.lock();
        self.gc_pending.store(false, Ordering::Release);
        self.suspend_pending.store(false, Ordering::Release);
        self.debug_pending.store(false, Ordering::Release);
        *current = None;
        self.parked.notify_all();
        tracing::debug!(target: "dexter::safepoint", "resumed");
    }

    /// Register a new polling thread
    pub fn register_worker(&self) {
        self.worker_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Deregister a polling thread
    pub fn deregister_worker(&self) {
        self.worker_count.fetch_sub(1, Ordering::AcqRel);
        let _guard = self.current_reason.lock();
        self.arrived.notify_all();
    }

    /// Registered worker count
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    /// Workers currently parked
    pub fn workers_at_safepoint(&self) -> usize {
        self.workers_at_safepoint.load(Ordering::Acquire)
    }

    /// Reason of the active pause
    pub fn current_reason(&self) -> Option<StopReason> {
        *self.current_reason.lock()
    }

    /// Safepoint statistics: (total safepoints, total pause µs, max pause µs)
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.total_safepoints.load(Ordering::Relaxed),
            self.stats.total_pause_time_us.load(Ordering::Relaxed),
            self.stats.max_pause_time_us.load(Ordering::Relaxed),
        )
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl Default for SafepointCoordinator {
    fn default() -> Self {
        Self::new(0)
    }
}
