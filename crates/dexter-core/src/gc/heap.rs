//! Object heap and class table
//!
//! The heap owns every managed object plus the class table. Objects live in
//! a slot vector indexed by [`ObjRef`]; freed slots are recycled through a
//! free list. All methods take `&self` so a heap can be shared between
//! interpreter threads behind an `Arc`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::collector::GcStats;
use crate::class::{Class, ClassBuilder, ClassId, FieldBuilder, Primitive};
use crate::exception::{ThrowKind, Thrown};
use crate::method::{Method, MethodId};
use crate::object::{ArrayData, HeapObject, ObjectKind};
use crate::value::{JValue, ObjRef};

pub(crate) const OBJECT_DESCRIPTOR: &str = "Ljava/lang/Object;";
const CLASS_DESCRIPTOR: &str = "Ljava/lang/Class;";
const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";
const METHOD_HANDLE_DESCRIPTOR: &str = "Ljava/lang/invoke/MethodHandle;";
const METHOD_TYPE_DESCRIPTOR: &str = "Ljava/lang/invoke/MethodType;";

/// Instance slot of `Throwable.detailMessage`
const DETAIL_MESSAGE_SLOT: usize = 0;

/// Slot storage
#[derive(Default)]
pub(crate) struct ObjectSpace {
    pub(crate) slots: Vec<Option<HeapObject>>,
    pub(crate) free: Vec<usize>,
    pub(crate) live: usize,
}

impl ObjectSpace {
    fn get(&self, obj: ObjRef) -> &HeapObject {
        match self.slots.get(obj.index()) {
            Some(Some(object)) => object,
            _ => panic!("dangling object reference {:?}", obj),
        }
    }

    fn get_mut(&mut self, obj: ObjRef) -> &mut HeapObject {
        match self.slots.get_mut(obj.index()) {
            Some(Some(object)) => object,
            _ => panic!("dangling object reference {:?}", obj),
        }
    }
}

/// Classes the runtime refers to directly
#[derive(Debug, Clone)]
pub struct WellKnown {
    /// `java.lang.Object`
    pub object: ClassId,
    /// `java.lang.Class`
    pub class: ClassId,
    /// `java.lang.String`
    pub string: ClassId,
    /// `java.lang.invoke.MethodHandle`
    pub method_handle: ClassId,
    /// `java.lang.invoke.MethodType`
    pub method_type: ClassId,
    throwables: FxHashMap<ThrowKind, ClassId>,
    primitives: FxHashMap<Primitive, ClassId>,
}

impl WellKnown {
    fn empty() -> Self {
        Self {
            object: ClassId(0),
            class: ClassId(0),
            string: ClassId(0),
            method_handle: ClassId(0),
            method_type: ClassId(0),
            throwables: FxHashMap::default(),
            primitives: FxHashMap::default(),
        }
    }

    /// Class raised for `kind`
    pub fn throwable(&self, kind: ThrowKind) -> ClassId {
        self.throwables[&kind]
    }

    /// Class of primitive `kind`; `None` for references
    pub fn primitive(&self, kind: Primitive) -> Option<ClassId> {
        self.primitives.get(&kind).copied()
    }
}

/// Managed heap
pub struct Heap {
    pub(crate) space: RwLock<ObjectSpace>,
    classes: RwLock<Vec<Arc<Class>>>,
    descriptors: RwLock<FxHashMap<String, ClassId>>,
    array_classes: Mutex<FxHashMap<ClassId, ClassId>>,
    pub(crate) interned: Mutex<FxHashMap<String, ObjRef>>,
    next_method_id: AtomicU32,
    limit: Option<usize>,
    baseline: usize,
    well_known: WellKnown,
    pub(crate) out_of_memory: Option<ObjRef>,
    pub(crate) stats: Mutex<GcStats>,
}

impl Heap {
    /// Create a heap with the core library classes defined
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a heap that holds at most `limit` live objects besides the
    /// ones created while bootstrapping the core classes
    ///
    /// Allocation beyond the limit raises the preallocated
    /// `OutOfMemoryError`.
    pub fn with_limit(limit: Option<usize>) -> Self {
        let mut heap = Heap {
            space: RwLock::new(ObjectSpace::default()),
            classes: RwLock::new(Vec::new()),
            descriptors: RwLock::new(FxHashMap::default()),
            array_classes: Mutex::new(FxHashMap::default()),
            interned: Mutex::new(FxHashMap::default()),
            next_method_id: AtomicU32::new(0),
            limit: None,
            baseline: 0,
            well_known: WellKnown::empty(),
            out_of_memory: None,
            stats: Mutex::new(GcStats::default()),
        };

        let mut well_known = WellKnown::empty();
        well_known.object = heap.install(ClassBuilder::new(OBJECT_DESCRIPTOR), None);
        let object = Some(well_known.object);
        well_known.class = heap.install(ClassBuilder::new(CLASS_DESCRIPTOR), object);
        well_known.string = heap.install(ClassBuilder::new(STRING_DESCRIPTOR), object);
        well_known.method_handle = heap.install(ClassBuilder::new(METHOD_HANDLE_DESCRIPTOR).abstract_class(), object);
        well_known.method_type = heap.install(ClassBuilder::new(METHOD_TYPE_DESCRIPTOR), object);

        for &kind in ThrowKind::ALL {
            let parent = kind.parent().map_or(well_known.object, |p| well_known.throwables[&p]);
            let mut builder = ClassBuilder::new(kind.descriptor());
            if kind == ThrowKind::Throwable {
                builder = builder.field(FieldBuilder::reference("detailMessage", Some(well_known.string)));
            }
            let id = heap.install(builder, Some(parent));
            well_known.throwables.insert(kind, id);
        }

        for kind in Primitive::PRIMITIVES {
            let descriptor = kind.descriptor().unwrap_or_default().to_string();
            let id = heap.push_class(|id| Class::synthetic(id, descriptor, None, kind, None));
            well_known.primitives.insert(kind, id);
        }

        heap.well_known = well_known;
        let class_count = heap.classes.read().len();
        for index in 0..class_count {
            heap.attach_class_object(ClassId(index as u32));
        }

        let oome_class = heap.well_known.throwable(ThrowKind::OutOfMemoryError);
        let fields = vec![JValue::default(); heap.class(oome_class).instance_field_count()];
        heap.out_of_memory = Some(heap.store(HeapObject::new(oome_class, ObjectKind::Instance(fields))));
        heap.limit = limit;
        heap.baseline = heap.space.read().live;
        heap
    }

    fn push_class(&self, make: impl FnOnce(ClassId) -> Class) -> ClassId {
        let mut classes = self.classes.write();
        let id = ClassId(classes.len() as u32);
        let class = make(id);
        self.descriptors.write().insert(class.descriptor().to_string(), id);
        classes.push(Arc::new(class));
        id
    }

    fn install(&self, builder: ClassBuilder, super_class: Option<ClassId>) -> ClassId {
        let mut builder = builder;
        builder.super_class = super_class;
        let parent = super_class.map(|id| self.class(id));
        self.push_class(|id| {
            Class::build(id, builder, parent.as_deref(), || {
                MethodId(self.next_method_id.fetch_add(1, Ordering::Relaxed))
            })
        })
    }

    fn attach_class_object(&self, id: ClassId) -> ObjRef {
        let class = self.class(id);
        *class
            .class_object
            .get_or_init(|| self.store(HeapObject::new(self.well_known.class, ObjectKind::Class(id))))
    }

    /// Define a class; classes without an explicit superclass extend `Object`
    pub fn define_class(&self, builder: ClassBuilder) -> ClassId {
        let super_class = builder.super_class.or(Some(self.well_known.object));
        let id = self.install(builder, super_class);
        self.attach_class_object(id);
        tracing::debug!(target: "dexter::heap", class = %self.class(id).descriptor(), "defined class");
        id
    }

    /// Class by id
    ///
    /// Panics if `id` was not produced by this heap.
    pub fn class(&self, id: ClassId) -> Arc<Class> {
        self.classes.read()[id.index()].clone()
    }

    /// Look up a class by descriptor, creating array classes on demand
    pub fn find_class(&self, descriptor: &str) -> Option<ClassId> {
        if let Some(&id) = self.descriptors.read().get(descriptor) {
            return Some(id);
        }
        let component = descriptor.strip_prefix('[')?;
        let component = self.find_class(component)?;
        Some(self.array_class_of(component))
    }

    /// Runtime-known classes
    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    /// Array class whose elements are `component`
    pub fn array_class_of(&self, component: ClassId) -> ClassId {
        if let Some(&id) = self.array_classes.lock().get(&component) {
            return id;
        }
        let descriptor = format!("[{}", self.class(component).descriptor());
        let object = self.well_known.object;
        let id = self.push_class(|id| Class::synthetic(id, descriptor, Some(object), Primitive::Not, Some(component)));
        self.attach_class_object(id);
        *self.array_classes.lock().entry(component).or_insert(id)
    }

    /// Whether a value of class `from` can be stored where `to` is expected
    pub fn is_assignable(&self, to: ClassId, from: ClassId) -> bool {
        if to == from {
            return true;
        }
        let from_class = self.class(from);
        if from_class.is_primitive() {
            return false;
        }
        if to == self.well_known.object {
            return true;
        }
        let to_class = self.class(to);
        if let (Some(to_component), Some(from_component)) = (to_class.component_type(), from_class.component_type()) {
            let from_component_class = self.class(from_component);
            return if from_component_class.is_primitive() {
                to_component == from_component
            } else {
                self.is_assignable(to_component, from_component)
            };
        }
        if to_class.is_interface() {
            return self.implements(from, to);
        }
        let mut current = from_class.super_class();
        while let Some(id) = current {
            if id == to {
                return true;
            }
            current = self.class(id).super_class();
        }
        false
    }

    fn implements(&self, class: ClassId, interface: ClassId) -> bool {
        let class = self.class(class);
        class
            .interfaces()
            .iter()
            .any(|&i| i == interface || self.implements(i, interface))
            || class.super_class().map_or(false, |s| self.implements(s, interface))
    }

    /// Class of `obj`
    pub fn class_of(&self, obj: ObjRef) -> ClassId {
        self.space.read().get(obj).class
    }

    /// Whether `obj` is an instance of `class`
    pub fn instance_of(&self, obj: ObjRef, class: ClassId) -> bool {
        self.is_assignable(class, self.class_of(obj))
    }

    /// The `java.lang.Class` mirror of `class`
    pub fn class_object(&self, class: ClassId) -> ObjRef {
        self.attach_class_object(class)
    }

    /// Class mirrored by a `java.lang.Class` object
    pub fn mirrored_class(&self, obj: ObjRef) -> Option<ClassId> {
        match self.space.read().get(obj).kind {
            ObjectKind::Class(id) => Some(id),
            _ => None,
        }
    }

    fn store(&self, object: HeapObject) -> ObjRef {
        let mut space = self.space.write();
        space.live += 1;
        match space.free.pop() {
            Some(index) => {
                space.slots[index] = Some(object);
                ObjRef::from_index(index)
            }
            None => {
                space.slots.push(Some(object));
                ObjRef::from_index(space.slots.len() - 1)
            }
        }
    }

    fn alloc(&self, object: HeapObject) -> Result<ObjRef, Thrown> {
        if let Some(limit) = self.limit {
            if self.space.read().live >= self.baseline + limit {
                tracing::warn!(target: "dexter::heap", limit, "heap limit reached");
                return Err(self.out_of_memory_error());
            }
        }
        Ok(self.store(object))
    }

    fn out_of_memory_error(&self) -> Thrown {
        match self.out_of_memory {
            Some(oome) => Thrown(oome),
            None => unreachable!("out-of-memory error is preallocated by Heap::with_limit"),
        }
    }

    /// Allocate an instance of `class` with zeroed fields
    pub fn alloc_instance(&self, class: ClassId) -> Result<ObjRef, Thrown> {
        let fields = vec![JValue::default(); self.class(class).instance_field_count()];
        self.alloc(HeapObject::new(class, ObjectKind::Instance(fields)))
    }

    /// Allocate an array of `array_class` with `length` elements
    ///
    /// A negative length raises `NegativeArraySizeException`.
    pub fn alloc_array(&self, array_class: ClassId, length: i32) -> Result<ObjRef, Thrown> {
        if length < 0 {
            return Err(self.throw_new(ThrowKind::NegativeArraySizeException, Some(&length.to_string())));
        }
        let component = match self.class(array_class).component_type() {
            Some(component) => component,
            None => {
                let message = format!("{} is not an array class", self.class(array_class).descriptor());
                return Err(self.throw_new(ThrowKind::InternalError, Some(&message)));
            }
        };
        let kind = self.class(component).primitive();
        self.alloc(HeapObject::new(array_class, ObjectKind::Array(ArrayData::new(kind, length as usize))))
    }

    /// Allocate a new string
    pub fn alloc_string(&self, value: &str) -> Result<ObjRef, Thrown> {
        self.alloc(HeapObject::new(self.well_known.string, ObjectKind::String(value.to_string())))
    }

    /// The canonical string object for `value`
    pub fn intern_string(&self, value: &str) -> Result<ObjRef, Thrown> {
        if let Some(&existing) = self.interned.lock().get(value) {
            return Ok(existing);
        }
        let obj = self.alloc_string(value)?;
        Ok(*self.interned.lock().entry(value.to_string()).or_insert(obj))
    }

    /// Allocate a method handle bound to `target`
    pub fn alloc_method_handle(&self, target: Arc<Method>) -> Result<ObjRef, Thrown> {
        self.alloc(HeapObject::new(self.well_known.method_handle, ObjectKind::MethodHandle(target)))
    }

    /// Allocate a method type described by `shorty`
    pub fn alloc_method_type(&self, shorty: &str) -> Result<ObjRef, Thrown> {
        self.alloc(HeapObject::new(self.well_known.method_type, ObjectKind::MethodType(shorty.to_string())))
    }

    /// Contents of a string object
    pub fn string_value(&self, obj: ObjRef) -> Option<String> {
        match &self.space.read().get(obj).kind {
            ObjectKind::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Target of a method handle object
    pub fn method_handle_target(&self, obj: ObjRef) -> Option<Arc<Method>> {
        match &self.space.read().get(obj).kind {
            ObjectKind::MethodHandle(m) => Some(m.clone()),
            _ => None,
        }
    }

    /// Shorty of a method type object
    pub fn method_type_shorty(&self, obj: ObjRef) -> Option<String> {
        match &self.space.read().get(obj).kind {
            ObjectKind::MethodType(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Instance field slot `slot` of `obj`
    pub fn get_field(&self, obj: ObjRef, slot: usize) -> JValue {
        match &self.space.read().get(obj).kind {
            ObjectKind::Instance(fields) => fields[slot],
            kind => panic!("field read on non-instance {:?}", kind),
        }
    }

    /// Store instance field slot `slot` of `obj`
    pub fn set_field(&self, obj: ObjRef, slot: usize, value: JValue) {
        match &mut self.space.write().get_mut(obj).kind {
            ObjectKind::Instance(fields) => fields[slot] = value,
            kind => panic!("field write on non-instance {:?}", kind),
        }
    }

    /// Length of an array object; `None` if `obj` is not an array
    pub fn array_length(&self, obj: ObjRef) -> Option<usize> {
        match &self.space.read().get(obj).kind {
            ObjectKind::Array(data) => Some(data.len()),
            _ => None,
        }
    }

    fn index_error(&self, length: usize, index: i32) -> Thrown {
        let message = format!("length={}; index={}", length, index);
        self.throw_new(ThrowKind::ArrayIndexOutOfBoundsException, Some(&message))
    }

    /// Element `index` of `array`, raising `ArrayIndexOutOfBoundsException`
    pub fn array_get(&self, array: ObjRef, index: i32) -> Result<JValue, Thrown> {
        let outcome = match &self.space.read().get(array).kind {
            ObjectKind::Array(data) if index >= 0 && (index as usize) < data.len() => Ok(data.get(index as usize)),
            ObjectKind::Array(data) => Err(data.len()),
            kind => panic!("array read on non-array {:?}", kind),
        };
        outcome.map_err(|length| self.index_error(length, index))
    }

    /// Store element `index` of `array`
    ///
    /// Raises `ArrayIndexOutOfBoundsException`, then `ArrayStoreException`
    /// when a reference is not assignable to the component type.
    pub fn array_set(&self, array: ObjRef, index: i32, value: JValue) -> Result<(), Thrown> {
        let length = match self.array_length(array) {
            Some(length) => length,
            None => panic!("array write on non-array {:?}", array),
        };
        if index < 0 || index as usize >= length {
            return Err(self.index_error(length, index));
        }
        let array_class = self.class_of(array);
        if let (Some(component), Some(stored)) = (self.class(array_class).component_type(), value.get_l()) {
            let stored_class = self.class_of(stored);
            if !self.is_assignable(component, stored_class) {
                let message = format!(
                    "{} cannot be stored in an array of type {}",
                    self.class(stored_class).descriptor(),
                    self.class(array_class).descriptor()
                );
                return Err(self.throw_new(ThrowKind::ArrayStoreException, Some(&message)));
            }
        }
        self.with_array(array, |data| data.set(index as usize, value));
        Ok(())
    }

    /// Run `f` on the elements of `array`; `None` if `obj` is not an array
    pub fn with_array<R>(&self, array: ObjRef, f: impl FnOnce(&mut ArrayData) -> R) -> Option<R> {
        match &mut self.space.write().get_mut(array).kind {
            ObjectKind::Array(data) => Some(f(data)),
            _ => None,
        }
    }

    /// Allocate and return an exception of `kind`
    pub fn throw_new(&self, kind: ThrowKind, message: Option<&str>) -> Thrown {
        self.throw_new_class(self.well_known.throwable(kind), message)
    }

    /// Allocate and return an exception of an arbitrary throwable class
    pub fn throw_new_class(&self, class: ClassId, message: Option<&str>) -> Thrown {
        let exception = match self.alloc_instance(class) {
            Ok(obj) => obj,
            Err(oome) => return oome,
        };
        if let Some(message) = message {
            match self.alloc_string(message) {
                Ok(text) => self.set_field(exception, DETAIL_MESSAGE_SLOT, JValue::from_ref(Some(text))),
                Err(oome) => return oome,
            }
        }
        tracing::trace!(
            target: "dexter::exception",
            class = %self.class(class).descriptor(),
            message = message.unwrap_or(""),
            "allocated exception"
        );
        Thrown(exception)
    }

    /// Whether `obj` is a `Throwable`
    pub fn is_throwable(&self, obj: ObjRef) -> bool {
        self.instance_of(obj, self.well_known.throwable(ThrowKind::Throwable))
    }

    /// Detail message of a throwable
    pub fn exception_message(&self, exception: ObjRef) -> Option<String> {
        if !self.is_throwable(exception) {
            return None;
        }
        let text = self.get_field(exception, DETAIL_MESSAGE_SLOT).get_l()?;
        self.string_value(text)
    }

    /// Human-readable summary of an exception, e.g. `Ljava/lang/ArithmeticException;: divide by zero`
    pub fn describe(&self, exception: ObjRef) -> String {
        let class = self.class(self.class_of(exception));
        match self.exception_message(exception) {
            Some(message) => format!("{}: {}", class.descriptor(), message),
            None => class.descriptor().to_string(),
        }
    }

    /// Whether `obj` still names an allocated object
    pub fn is_live(&self, obj: ObjRef) -> bool {
        matches!(self.space.read().slots.get(obj.index()), Some(Some(_)))
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.space.read().live
    }

    /// Cumulative collection statistics
    pub fn stats(&self) -> GcStats {
        self.stats.lock().clone()
    }

    pub(crate) fn classes_snapshot(&self) -> Vec<Arc<Class>> {
        self.classes.read().clone()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_classes() {
        let heap = Heap::new();
        let wk = heap.well_known();
        let npe = wk.throwable(ThrowKind::NullPointerException);
        assert!(heap.is_assignable(wk.throwable(ThrowKind::RuntimeException), npe));
        assert!(heap.is_assignable(wk.object, npe));
        assert!(!heap.is_assignable(npe, wk.throwable(ThrowKind::Exception)));
        assert_eq!(heap.find_class("Ljava/lang/String;"), Some(wk.string));
    }

    #[test]
    fn test_array_classes() {
        let heap = Heap::new();
        let int = heap.well_known().primitive(Primitive::Int).unwrap();
        let int_array = heap.array_class_of(int);
        assert_eq!(heap.class(int_array).descriptor(), "[I");
        assert_eq!(heap.find_class("[I"), Some(int_array));
        assert_eq!(heap.array_class_of(int), int_array);

        let strings = heap.find_class("[Ljava/lang/String;").unwrap();
        let objects = heap.find_class("[Ljava/lang/Object;").unwrap();
        assert!(heap.is_assignable(objects, strings));
        assert!(!heap.is_assignable(strings, objects));
        assert!(!heap.is_assignable(objects, int_array));
    }

    #[test]
    fn test_array_bounds() {
        let heap = Heap::new();
        let int_array = heap.find_class("[I").unwrap();
        let array = heap.alloc_array(int_array, 2).unwrap();
        heap.array_set(array, 1, JValue::from_int(7)).unwrap();
        assert_eq!(heap.array_get(array, 1).unwrap().get_i(), 7);

        let err = heap.array_get(array, 2).unwrap_err();
        assert_eq!(heap.describe(err.object()), "Ljava/lang/ArrayIndexOutOfBoundsException;: length=2; index=2");

        let err = heap.alloc_array(int_array, -1).unwrap_err();
        assert_eq!(heap.exception_message(err.object()).as_deref(), Some("-1"));
    }

    #[test]
    fn test_array_store_check() {
        let heap = Heap::new();
        let strings = heap.find_class("[Ljava/lang/String;").unwrap();
        let array = heap.alloc_array(strings, 1).unwrap();
        let not_a_string = heap.alloc_instance(heap.well_known().object).unwrap();
        let err = heap.array_set(array, 0, JValue::from_ref(Some(not_a_string))).unwrap_err();
        assert!(heap.instance_of(err.object(), heap.well_known().throwable(ThrowKind::ArrayStoreException)));
    }

    #[test]
    fn test_heap_limit_raises_preallocated_error() {
        let heap = Heap::with_limit(Some(0));
        let err = heap.alloc_instance(heap.well_known().object).unwrap_err();
        assert_eq!(Some(err.object()), heap.out_of_memory);
    }

    #[test]
    fn test_interned_strings_are_shared() {
        let heap = Heap::new();
        let a = heap.intern_string("hello").unwrap();
        let b = heap.intern_string("hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(heap.string_value(a).as_deref(), Some("hello"));
    }
}
