//! Managed threads
//!
//! A [`ManagedThread`] is the per-thread state the interpreter consults:
//! the pending exception, an asynchronously injected exception, the call
//! depth and the link to the safepoint coordinator. It is `Sync` so another
//! thread can inject an asynchronous exception while this one runs.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::safepoint::SafepointCoordinator;
use crate::value::ObjRef;

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

/// Exception state, kept together so the depth stays consistent with the object
#[derive(Debug, Default)]
struct PendingException {
    exception: Option<ObjRef>,
    /// Call depth at which the exception was raised
    depth: usize,
}

/// Interpreter-visible state of one thread
pub struct ManagedThread {
    id: u32,
    pending: Mutex<PendingException>,
    async_exception: Mutex<Option<ObjRef>>,
    async_pending: AtomicBool,
    retry_requested: AtomicBool,
    depth: AtomicUsize,
    suspend_checks: AtomicUsize,
    safepoint: Arc<SafepointCoordinator>,
}

impl ManagedThread {
    /// Create a thread polling `safepoint`, registering it as a worker
    pub fn new(safepoint: Arc<SafepointCoordinator>) -> Self {
        safepoint.register_worker();
        Self {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            pending: Mutex::new(PendingException::default()),
            async_exception: Mutex::new(None),
            async_pending: AtomicBool::new(false),
            retry_requested: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
            suspend_checks: AtomicUsize::new(0),
            safepoint,
        }
    }

    /// A thread with its own coordinator, for tests and single-threaded use
    pub fn detached() -> Self {
        Self::new(Arc::new(SafepointCoordinator::default()))
    }

    /// Thread id, unique within the process
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The pending exception
    pub fn exception(&self) -> Option<ObjRef> {
        self.pending.lock().exception
    }

    /// Whether an exception is pending
    pub fn is_exception_pending(&self) -> bool {
        self.pending.lock().exception.is_some()
    }

    /// Set the pending exception, replacing any previous one
    ///
    /// Storing the object that is already pending keeps its origin, so an
    /// exception propagating out of a callee is still attributed to it.
    pub fn set_exception(&self, exception: ObjRef) {
        let depth = self.depth();
        let mut pending = self.pending.lock();
        if pending.exception != Some(exception) {
            pending.exception = Some(exception);
            pending.depth = depth;
        }
    }

    /// Clear the pending exception
    pub fn clear_exception(&self) {
        self.pending.lock().exception = None;
    }

    /// Take and clear the pending exception
    pub fn take_exception(&self) -> Option<ObjRef> {
        self.pending.lock().exception.take()
    }

    /// Whether the pending exception was raised by the frame at the current depth
    ///
    /// Exceptions propagating out of a callee were raised deeper and have
    /// already been reported to exception-thrown listeners there.
    pub fn is_exception_thrown_by_current_method(&self) -> bool {
        let pending = self.pending.lock();
        pending.exception.is_some() && pending.depth == self.depth()
    }

    /// Inject an asynchronous exception, observed at the next check
    pub fn set_async_exception(&self, exception: ObjRef) {
        *self.async_exception.lock() = Some(exception);
        self.async_pending.store(true, Ordering::Release);
    }

    /// Move an injected asynchronous exception into the pending slot
    ///
    /// Returns the exception if one was observed.
    #[inline]
    pub fn observe_async_exception(&self) -> Option<ObjRef> {
        if !self.async_pending.load(Ordering::Acquire) {
            return None;
        }
        let exception = self.async_exception.lock().take();
        self.async_pending.store(false, Ordering::Release);
        if let Some(exception) = exception {
            tracing::debug!(target: "dexter::exception", thread = self.id, ?exception, "observed async exception");
            self.set_exception(exception);
        }
        exception
    }

    /// Ask the calling instruction to be re-executed once the exception
    /// about to be thrown has been discarded
    ///
    /// Natives and linkers use this for call-site cache misses.
    pub fn request_caller_retry(&self) {
        self.retry_requested.store(true, Ordering::Release);
    }

    /// Read and clear a retry request
    pub(crate) fn take_retry_request(&self) -> bool {
        self.retry_requested.swap(false, Ordering::AcqRel)
    }

    /// Suspension point: count it and poll the safepoint coordinator
    #[inline]
    pub fn allow_thread_suspension(&self) {
        self.suspend_checks.fetch_add(1, Ordering::Relaxed);
        self.safepoint.poll();
    }

    /// Number of suspension checks performed
    pub fn suspend_check_count(&self) -> usize {
        self.suspend_checks.load(Ordering::Relaxed)
    }

    /// Current call depth
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub(crate) fn enter_frame(&self) -> usize {
        self.depth.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn exit_frame(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// The coordinator this thread polls
    pub fn safepoint(&self) -> &Arc<SafepointCoordinator> {
        &self.safepoint
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        self.safepoint.deregister_worker();
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .field("exception", &self.exception())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_lifecycle() {
        let thread = ManagedThread::detached();
        let exception = ObjRef::from_index(3);
        assert!(!thread.is_exception_pending());
        thread.set_exception(exception);
        assert!(thread.is_exception_thrown_by_current_method());
        assert_eq!(thread.take_exception(), Some(exception));
        assert!(!thread.is_exception_pending());
    }

    #[test]
    fn test_exception_from_callee_is_not_current() {
        let thread = ManagedThread::detached();
        thread.enter_frame();
        thread.set_exception(ObjRef::from_index(0));
        thread.exit_frame();
        assert!(!thread.is_exception_thrown_by_current_method());
        thread.set_exception(ObjRef::from_index(0));
        assert!(!thread.is_exception_thrown_by_current_method());
        thread.set_exception(ObjRef::from_index(1));
        assert!(thread.is_exception_thrown_by_current_method());
    }

    #[test]
    fn test_async_exception_observed_once() {
        let thread = ManagedThread::detached();
        let exception = ObjRef::from_index(7);
        thread.set_async_exception(exception);
        assert_eq!(thread.observe_async_exception(), Some(exception));
        assert_eq!(thread.exception(), Some(exception));
        thread.clear_exception();
        assert_eq!(thread.observe_async_exception(), None);
    }

    #[test]
    fn test_registration_with_coordinator() {
        let coord = Arc::new(SafepointCoordinator::default());
        let thread = ManagedThread::new(coord.clone());
        assert_eq!(coord.worker_count(), 1);
        thread.allow_thread_suspension();
        assert_eq!(thread.suspend_check_count(), 1);
        drop(thread);
        assert_eq!(coord.worker_count(), 0);
    }
}
