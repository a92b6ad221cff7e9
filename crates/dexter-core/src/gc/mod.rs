//! Garbage-collected heap
//!
//! # Architecture
//!
//! - **Heap**: slot-vector object storage plus the class table
//! - **collector**: stop-the-world mark-sweep over the heap
//!
//! ```text
//! ObjRef(n) ──► slots[n - 1] ──► HeapObject { class, kind, marked }
//!                                             │
//!                     Instance / Array / String / Class / MethodHandle / MethodType
//! ```

mod collector;
mod heap;

pub use collector::GcStats;
pub use heap::{Heap, WellKnown};
