//! Mark-sweep garbage collector
//!
//! Collection is stop-the-world: the caller brings every interpreter thread
//! to a safepoint and passes the references held in their frames. Classes,
//! their statics, interned strings and the preallocated out-of-memory error
//! are always roots.

use std::time::{Duration, Instant};

use super::heap::Heap;
use crate::value::ObjRef;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Objects still live after the last collection
    pub live_objects: usize,

    /// Total pause time
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,
}

impl Heap {
    /// Run a full collection with `roots` as the thread roots
    pub fn collect(&self, roots: &[ObjRef]) -> GcStats {
        let start = Instant::now();

        let mut gray = roots.to_vec();
        for class in self.classes_snapshot() {
            gray.extend(class.class_object());
            gray.extend(class.static_references());
        }
        gray.extend(self.interned.lock().values().copied());
        gray.extend(self.out_of_memory);

        let mut space = self.space.write();

        // Mark phase
        while let Some(obj) = gray.pop() {
            if let Some(Some(object)) = space.slots.get_mut(obj.index()) {
                if object.marked {
                    continue;
                }
                object.marked = true;
                gray.extend(object.references());
            }
        }

        // Sweep phase
        let mut freed = 0;
        for index in 0..space.slots.len() {
            let live = match &mut space.slots[index] {
                Some(object) if object.marked => {
                    object.marked = false;
                    true
                }
                Some(_) => false,
                None => continue,
            };
            if !live {
                space.slots[index] = None;
                space.free.push(index);
                freed += 1;
            }
        }
        space.live -= freed;
        let live_objects = space.live;
        drop(space);

        let duration = start.elapsed();
        let mut stats = self.stats.lock();
        stats.collections += 1;
        stats.objects_freed += freed;
        stats.live_objects = live_objects;
        stats.last_pause_time = duration;
        stats.total_pause_time += duration;

        tracing::debug!(
            target: "dexter::gc",
            freed,
            live = live_objects,
            pause_us = duration.as_micros() as u64,
            "collection finished"
        );
        stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::class::{ClassBuilder, FieldBuilder};
    use crate::gc::Heap;
    use crate::value::JValue;

    #[test]
    fn test_unreachable_objects_are_freed() {
        let heap = Heap::new();
        let object = heap.well_known().object;
        let before = heap.object_count();
        let kept = heap.alloc_instance(object).unwrap();
        heap.alloc_instance(object).unwrap();

        let stats = heap.collect(&[kept]);
        assert_eq!(stats.objects_freed, 1);
        assert_eq!(heap.object_count(), before + 1);
    }

    #[test]
    fn test_statics_and_fields_are_traced() {
        let heap = Heap::new();
        let node = heap.define_class(
            ClassBuilder::new("LNode;")
                .field(FieldBuilder::reference("next", None))
                .field(FieldBuilder::reference("head", None).static_field()),
        );
        let head = heap.alloc_instance(node).unwrap();
        let tail = heap.alloc_instance(node).unwrap();
        heap.set_field(head, 0, JValue::from_ref(Some(tail)));
        heap.class(node).set_static(0, JValue::from_ref(Some(head)));

        let before = heap.object_count();
        let stats = heap.collect(&[]);
        assert_eq!(stats.objects_freed, 0);
        assert_eq!(heap.object_count(), before);
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let heap = Heap::new();
        let object = heap.well_known().object;
        let garbage = heap.alloc_instance(object).unwrap();
        heap.collect(&[]);
        let reused = heap.alloc_instance(object).unwrap();
        assert_eq!(garbage, reused);
    }
}
