//! Transactions for ahead-of-time class initialization
//!
//! While a class initializer runs under a [`Transaction`], every heap write
//! the interpreter performs is recorded in an undo log together with the
//! value it overwrote. Writes that would escape the transaction (to
//! immutable objects, or of references to uninitialized classes) abort it
//! instead; [`Transaction::rollback`] restores the heap.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::class::{ClassId, ClassStatus};
use crate::exception::{ThrowKind, Thrown};
use crate::gc::Heap;
use crate::value::{JValue, ObjRef};

#[derive(Debug, Clone, Copy)]
enum UndoRecord {
    InstanceField { object: ObjRef, slot: usize, old: JValue },
    StaticField { class: ClassId, slot: usize, old: JValue },
    ArrayElement { array: ObjRef, index: usize, old: JValue },
}

/// Undo log and constraints of one class-initialization transaction
#[derive(Debug, Default)]
pub struct Transaction {
    root_class: Option<ClassId>,
    strict: bool,
    log: Mutex<Vec<UndoRecord>>,
    immutable: Mutex<FxHashSet<ObjRef>>,
    abort_message: Mutex<Option<String>>,
}

impl Transaction {
    /// A transaction initializing `root_class`
    pub fn new(root_class: Option<ClassId>) -> Self {
        Self {
            root_class,
            ..Self::default()
        }
    }

    /// Forbid access to statics of classes other than the root class
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Class being initialized
    pub fn root_class(&self) -> Option<ClassId> {
        self.root_class
    }

    /// Forbid writes to `object` for the rest of the transaction
    pub fn mark_immutable(&self, object: ObjRef) {
        self.immutable.lock().insert(object);
    }

    fn is_foreign_class(&self, class: ClassId) -> bool {
        self.strict && Some(class) != self.root_class
    }

    /// Whether writing to `object` must abort the transaction
    pub fn write_constraint(&self, object: ObjRef) -> bool {
        self.immutable.lock().contains(&object)
    }

    /// Whether writing a static field of `class` must abort the transaction
    pub fn write_static_constraint(&self, heap: &Heap, class: ClassId) -> bool {
        self.is_foreign_class(class) || self.write_constraint(heap.class_object(class))
    }

    /// Whether reading a static field of `class` must abort the transaction
    pub fn read_constraint(&self, class: ClassId) -> bool {
        self.is_foreign_class(class)
    }

    /// Whether storing `value` must abort the transaction
    ///
    /// References to classes that are not yet initialized, or to their
    /// instances, could observe state the transaction cannot undo.
    pub fn value_constraint(&self, heap: &Heap, value: ObjRef) -> bool {
        let class = heap.mirrored_class(value).unwrap_or_else(|| heap.class_of(value));
        Some(class) != self.root_class && heap.class(class).status() != ClassStatus::Initialized
    }

    /// Record the current value of an instance field before overwriting it
    pub fn record_instance_field(&self, heap: &Heap, object: ObjRef, slot: usize) {
        let old = heap.get_field(object, slot);
        self.log.lock().push(UndoRecord::InstanceField { object, slot, old });
    }

    /// Record the current value of a static field before overwriting it
    pub fn record_static_field(&self, heap: &Heap, class: ClassId, slot: usize) {
        let old = heap.class(class).get_static(slot);
        self.log.lock().push(UndoRecord::StaticField { class, slot, old });
    }

    /// Record the current value of an array element before overwriting it
    ///
    /// Out-of-range indices are not recorded; the write itself will fail.
    pub fn record_array_element(&self, heap: &Heap, array: ObjRef, index: i32) {
        if let Ok(old) = heap.array_get(array, index) {
            self.log.lock().push(UndoRecord::ArrayElement {
                array,
                index: index as usize,
                old,
            });
        }
    }

    /// Abort the transaction, returning the `TransactionAbortError` to throw
    pub fn abort(&self, heap: &Heap, message: String) -> Thrown {
        tracing::warn!(target: "dexter::transaction", %message, "transaction aborted");
        let thrown = heap.throw_new(ThrowKind::TransactionAbortError, Some(&message));
        let mut abort_message = self.abort_message.lock();
        if abort_message.is_none() {
            *abort_message = Some(message);
        }
        thrown
    }

    /// Whether the transaction has been aborted
    pub fn is_aborted(&self) -> bool {
        self.abort_message.lock().is_some()
    }

    /// Message of the first abort
    pub fn abort_message(&self) -> Option<String> {
        self.abort_message.lock().clone()
    }

    /// Number of recorded writes
    pub fn undo_log_len(&self) -> usize {
        self.log.lock().len()
    }

    /// Undo every recorded write, newest first
    pub fn rollback(&self, heap: &Heap) {
        let log = std::mem::take(&mut *self.log.lock());
        tracing::debug!(target: "dexter::transaction", records = log.len(), "rolling back");
        for record in log.into_iter().rev() {
            match record {
                UndoRecord::InstanceField { object, slot, old } => heap.set_field(object, slot, old),
                UndoRecord::StaticField { class, slot, old } => heap.class(class).set_static(slot, old),
                UndoRecord::ArrayElement { array, index, old } => {
                    heap.with_array(array, |data| data.set(index, old));
                }
            }
        }
    }
}
