//! Object monitors
//!
//! Re-entrant locks keyed by object, created on first use. The owner is
//! published through a [`crossbeam::atomic::AtomicCell`] so the owner check
//! on re-entry and exit is a single load; contended waiters block on a
//! `parking_lot` condvar and poll the safepoint while they wait.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

use crate::thread::ManagedThread;
use crate::value::ObjRef;

/// How long a blocked `enter` waits between suspension checks
const ENTER_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Monitor misuse
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// Exit by a thread that does not own the monitor
    #[error("thread {thread} does not own the monitor of {object:?}")]
    NotOwner {
        /// Thread attempting the exit
        thread: u32,
        /// Object whose monitor was targeted
        object: ObjRef,
    },
}

/// A re-entrant monitor
#[derive(Default)]
pub struct Monitor {
    /// Owning thread id, 0 when free
    owner: AtomicCell<u32>,
    /// Recursion count, guarded for condvar waits
    count: Mutex<u32>,
    released: Condvar,
}

impl Monitor {
    /// Acquire, blocking while another thread owns the monitor
    pub fn enter(&self, thread: &ManagedThread) {
        let me = thread.id();
        let mut count = self.count.lock();
        if self.owner.load() == me {
            *count += 1;
            return;
        }
        while self.owner.load() != 0 {
            if self.released.wait_for(&mut count, ENTER_POLL_INTERVAL).timed_out() {
                MutexGuard::unlocked(&mut count, || thread.allow_thread_suspension());
            }
        }
        self.owner.store(me);
        *count = 1;
    }

    /// Release one level of ownership
    pub fn exit(&self, thread: &ManagedThread, object: ObjRef) -> Result<(), MonitorError> {
        let me = thread.id();
        let mut count = self.count.lock();
        if self.owner.load() != me {
            return Err(MonitorError::NotOwner { thread: me, object });
        }
        *count -= 1;
        if *count == 0 {
            self.owner.store(0);
            self.released.notify_one();
        }
        Ok(())
    }

    /// Owning thread id
    pub fn owner(&self) -> Option<u32> {
        match self.owner.load() {
            0 => None,
            id => Some(id),
        }
    }
}

/// All monitors of a VM
#[derive(Default)]
pub struct MonitorTable {
    monitors: DashMap<ObjRef, Arc<Monitor>>,
}

impl MonitorTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn monitor(&self, object: ObjRef) -> Arc<Monitor> {
        self.monitors.entry(object).or_default().value().clone()
    }

    /// Enter the monitor of `object`
    pub fn enter(&self, thread: &ManagedThread, object: ObjRef) {
        let monitor = self.monitor(object);
        monitor.enter(thread);
        tracing::trace!(target: "dexter::interp", thread = thread.id(), ?object, "monitor entered");
    }

    /// Exit the monitor of `object`
    pub fn exit(&self, thread: &ManagedThread, object: ObjRef) -> Result<(), MonitorError> {
        match self.monitors.get(&object).map(|m| m.value().clone()) {
            Some(monitor) => monitor.exit(thread, object),
            None => Err(MonitorError::NotOwner {
                thread: thread.id(),
                object,
            }),
        }
    }

    /// Whether `thread` owns the monitor of `object`
    pub fn is_held_by(&self, thread: &ManagedThread, object: ObjRef) -> bool {
        self.monitors
            .get(&object)
            .map_or(false, |m| m.owner() == Some(thread.id()))
    }

    /// Objects whose monitor some thread currently holds
    pub fn owned_objects(&self) -> Vec<ObjRef> {
        self.monitors
            .iter()
            .filter(|entry| entry.value().owner().is_some())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Drop monitors of objects freed by a collection
    pub fn retain(&self, mut is_live: impl FnMut(ObjRef) -> bool) {
        self.monitors.retain(|object, _| is_live(*object));
    }

    /// Number of inflated monitors
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Whether no monitor has been inflated
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_reentrant_enter_exit() {
        let table = MonitorTable::new();
        let thread = ManagedThread::detached();
        let object = ObjRef::from_index(0);

        table.enter(&thread, object);
        table.enter(&thread, object);
        assert!(table.is_held_by(&thread, object));
        table.exit(&thread, object).unwrap();
        assert!(table.is_held_by(&thread, object));
        table.exit(&thread, object).unwrap();
        assert!(!table.is_held_by(&thread, object));
    }

    #[test]
    fn test_owned_objects_lists_held_monitors() {
        let table = MonitorTable::new();
        let thread = ManagedThread::detached();
        let (held, released) = (ObjRef::from_index(3), ObjRef::from_index(4));
        table.enter(&thread, held);
        table.enter(&thread, released);
        table.exit(&thread, released).unwrap();
        assert_eq!(table.owned_objects(), vec![held]);
    }

    #[test]
    fn test_exit_without_ownership_fails() {
        let table = MonitorTable::new();
        let thread = ManagedThread::detached();
        let object = ObjRef::from_index(1);
        assert_eq!(
            table.exit(&thread, object),
            Err(MonitorError::NotOwner {
                thread: thread.id(),
                object
            })
        );
    }

    #[test]
    fn test_contended_enter_blocks_until_exit() {
        let table = Arc::new(MonitorTable::new());
        let object = ObjRef::from_index(2);
        let owner = ManagedThread::detached();
        table.enter(&owner, object);

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let table = table.clone();
            let acquired = acquired.clone();
            std::thread::spawn(move || {
                let thread = ManagedThread::detached();
                table.enter(&thread, object);
                acquired.store(true, Ordering::Release);
                table.exit(&thread, object).unwrap();
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::Acquire));
        table.exit(&owner, object).unwrap();
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::Acquire));
    }
}
