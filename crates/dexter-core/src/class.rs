//! Classes, fields and primitive kinds
//!
//! Classes are defined through [`ClassBuilder`] and registered with the
//! [`Heap`](crate::gc::Heap), which assigns ids, lays out fields and builds
//! the vtable. A defined class is immutable apart from its static field
//! storage and initialization status.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::method::{Method, MethodBuilder};
use crate::value::{JValue, ObjRef};

/// Identity of a class within one heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Position in the class table
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dex access flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u32);

impl AccessFlags {
    /// `public`
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    /// `private`
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    /// `static`
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    /// `final`
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    /// `native`
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    /// `interface`
    pub const INTERFACE: AccessFlags = AccessFlags(0x0200);
    /// `abstract`
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);
    /// Instance or class initializer
    pub const CONSTRUCTOR: AccessFlags = AccessFlags(0x1_0000);
    /// Class overrides `finalize()`
    pub const FINALIZABLE: AccessFlags = AccessFlags(0x8000_0000);

    /// Whether every flag in `other` is set
    #[inline]
    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

/// Value kinds: the primitive types plus `Not` for references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Reference
    Not,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `void`, only as a return kind
    Void,
}

impl Primitive {
    /// Every primitive type, in descriptor order
    pub const PRIMITIVES: [Primitive; 9] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Char,
        Primitive::Short,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
        Primitive::Void,
    ];

    /// Kind of a shorty character; `L` and `[` are references
    pub fn from_shorty(c: char) -> Primitive {
        match c {
            'Z' => Primitive::Boolean,
            'B' => Primitive::Byte,
            'C' => Primitive::Char,
            'S' => Primitive::Short,
            'I' => Primitive::Int,
            'J' => Primitive::Long,
            'F' => Primitive::Float,
            'D' => Primitive::Double,
            'V' => Primitive::Void,
            _ => Primitive::Not,
        }
    }

    /// Type descriptor of a primitive, `None` for references
    pub fn descriptor(self) -> Option<&'static str> {
        Some(match self {
            Primitive::Boolean => "Z",
            Primitive::Byte => "B",
            Primitive::Char => "C",
            Primitive::Short => "S",
            Primitive::Int => "I",
            Primitive::Long => "J",
            Primitive::Float => "F",
            Primitive::Double => "D",
            Primitive::Void => "V",
            Primitive::Not => return None,
        })
    }

    /// Whether values occupy a register pair
    #[inline]
    pub fn is_wide(self) -> bool {
        matches!(self, Primitive::Long | Primitive::Double)
    }

    /// Size of an array element of this kind in bytes
    pub fn component_size(self) -> usize {
        match self {
            Primitive::Boolean | Primitive::Byte => 1,
            Primitive::Char | Primitive::Short => 2,
            Primitive::Int | Primitive::Float | Primitive::Not => 4,
            Primitive::Long | Primitive::Double => 8,
            Primitive::Void => 0,
        }
    }
}

/// Class initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassStatus {
    /// Static initializer has not run
    NotInitialized,
    /// Ready for use
    Initialized,
    /// Initialization failed; uses raise `NoClassDefFoundError`
    Erroneous,
}

/// A resolved instance or static field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    class: ClassId,
    slot: usize,
    kind: Primitive,
    is_static: bool,
    type_class: Option<ClassId>,
}

impl Field {
    /// Simple name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring class
    #[inline]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Storage slot: an instance field index or a static field index
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Value kind
    #[inline]
    pub fn kind(&self) -> Primitive {
        self.kind
    }

    /// Whether the field is static
    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Declared class of a reference field, if checked
    pub fn type_class(&self) -> Option<ClassId> {
        self.type_class
    }
}

/// Declaration of a field, consumed by [`ClassBuilder`]
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: String,
    kind: Primitive,
    is_static: bool,
    type_class: Option<ClassId>,
}

impl FieldBuilder {
    /// An instance field of primitive kind
    pub fn new(name: impl Into<String>, kind: Primitive) -> Self {
        Self {
            name: name.into(),
            kind,
            is_static: false,
            type_class: None,
        }
    }

    /// An instance reference field, optionally typed
    pub fn reference(name: impl Into<String>, type_class: Option<ClassId>) -> Self {
        Self {
            name: name.into(),
            kind: Primitive::Not,
            is_static: false,
            type_class,
        }
    }

    /// Make the field static
    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Declaration of a class
pub struct ClassBuilder {
    pub(crate) descriptor: String,
    pub(crate) super_class: Option<ClassId>,
    pub(crate) interfaces: Vec<ClassId>,
    pub(crate) access: AccessFlags,
    pub(crate) fields: Vec<FieldBuilder>,
    pub(crate) methods: Vec<MethodBuilder>,
    pub(crate) status: ClassStatus,
}

impl ClassBuilder {
    /// A public class extending `java.lang.Object`
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            super_class: None,
            interfaces: Vec::new(),
            access: AccessFlags::PUBLIC,
            fields: Vec::new(),
            methods: Vec::new(),
            status: ClassStatus::Initialized,
        }
    }

    /// Set the superclass
    pub fn extends(mut self, super_class: ClassId) -> Self {
        self.super_class = Some(super_class);
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, interface: ClassId) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Declare as an interface
    pub fn interface(mut self) -> Self {
        self.access = self.access | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        self
    }

    /// Declare abstract
    pub fn abstract_class(mut self) -> Self {
        self.access = self.access | AccessFlags::ABSTRACT;
        self
    }

    /// Mark as overriding `finalize()`
    pub fn finalizable(mut self) -> Self {
        self.access = self.access | AccessFlags::FINALIZABLE;
        self
    }

    /// Leave the class uninitialized until first active use
    pub fn uninitialized(mut self) -> Self {
        self.status = ClassStatus::NotInitialized;
        self
    }

    /// Mark the class as having failed initialization
    pub fn erroneous(mut self) -> Self {
        self.status = ClassStatus::Erroneous;
        self
    }

    /// Add a field
    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }
}

/// A defined class
pub struct Class {
    pub(crate) id: ClassId,
    pub(crate) descriptor: String,
    pub(crate) super_class: Option<ClassId>,
    pub(crate) interfaces: Vec<ClassId>,
    pub(crate) access: AccessFlags,
    pub(crate) primitive: Primitive,
    pub(crate) component: Option<ClassId>,
    pub(crate) instance_field_count: usize,
    pub(crate) fields: Vec<Arc<Field>>,
    pub(crate) methods: Vec<Arc<Method>>,
    pub(crate) vtable: Vec<Arc<Method>>,
    pub(crate) statics: RwLock<Vec<JValue>>,
    pub(crate) status: Mutex<ClassStatus>,
    pub(crate) class_object: OnceCell<ObjRef>,
}

impl Class {
    /// Lay out fields and build the vtable on top of `parent`'s
    pub(crate) fn build(
        id: ClassId,
        builder: ClassBuilder,
        parent: Option<&Class>,
        mut next_method_id: impl FnMut() -> crate::method::MethodId,
    ) -> Class {
        let mut instance_slot = parent.map_or(0, |p| p.instance_field_count);
        let mut static_slot = 0;
        let fields: Vec<Arc<Field>> = builder
            .fields
            .into_iter()
            .map(|f| {
                let slot = if f.is_static {
                    static_slot += 1;
                    static_slot - 1
                } else {
                    instance_slot += 1;
                    instance_slot - 1
                };
                Arc::new(Field {
                    name: f.name,
                    class: id,
                    slot,
                    kind: f.kind,
                    is_static: f.is_static,
                    type_class: f.type_class,
                })
            })
            .collect();

        let mut vtable: Vec<Arc<Method>> = parent.map_or_else(Vec::new, |p| p.vtable.clone());
        let mut methods = Vec::with_capacity(builder.methods.len());
        for mb in builder.methods {
            let method_id = next_method_id();
            if mb.is_direct() {
                methods.push(Arc::new(Method::from_builder(method_id, id, mb, None)));
                continue;
            }
            let overridden = vtable
                .iter()
                .position(|m| m.name() == mb.name && m.shorty() == mb.shorty);
            let index = overridden.unwrap_or(vtable.len());
            let method = Arc::new(Method::from_builder(method_id, id, mb, Some(index as u16)));
            if index == vtable.len() {
                vtable.push(method.clone());
            } else {
                vtable[index] = method.clone();
            }
            methods.push(method);
        }

        let statics = vec![JValue::default(); static_slot];
        Class {
            id,
            descriptor: builder.descriptor,
            super_class: builder.super_class,
            interfaces: builder.interfaces,
            access: builder.access,
            primitive: Primitive::Not,
            component: None,
            instance_field_count: instance_slot,
            fields,
            methods,
            vtable,
            statics: RwLock::new(statics),
            status: Mutex::new(builder.status),
            class_object: OnceCell::new(),
        }
    }

    /// A synthetic class: primitive or array
    pub(crate) fn synthetic(
        id: ClassId,
        descriptor: String,
        super_class: Option<ClassId>,
        primitive: Primitive,
        component: Option<ClassId>,
    ) -> Class {
        Class {
            id,
            descriptor,
            super_class,
            interfaces: Vec::new(),
            access: AccessFlags::PUBLIC | AccessFlags::FINAL,
            primitive,
            component,
            instance_field_count: 0,
            fields: Vec::new(),
            methods: Vec::new(),
            vtable: Vec::new(),
            statics: RwLock::new(Vec::new()),
            status: Mutex::new(ClassStatus::Initialized),
            class_object: OnceCell::new(),
        }
    }

    /// Class id
    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Type descriptor, e.g. `Ljava/lang/String;` or `[I`
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Superclass; `None` only for `java.lang.Object` and primitives
    pub fn super_class(&self) -> Option<ClassId> {
        self.super_class
    }

    /// Directly implemented interfaces
    pub fn interfaces(&self) -> &[ClassId] {
        &self.interfaces
    }

    /// Access flags
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    /// Whether instances cannot be created directly
    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    /// Whether instances need finalization
    pub fn is_finalizable(&self) -> bool {
        self.access.contains(AccessFlags::FINALIZABLE)
    }

    /// Whether this is a primitive type class
    pub fn is_primitive(&self) -> bool {
        self.primitive != Primitive::Not
    }

    /// Primitive kind, `Not` for reference classes
    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Whether this is an array class
    pub fn is_array(&self) -> bool {
        self.component.is_some()
    }

    /// Element class of an array class
    pub fn component_type(&self) -> Option<ClassId> {
        self.component
    }

    /// Number of instance field slots, inherited ones included
    pub fn instance_field_count(&self) -> usize {
        self.instance_field_count
    }

    /// Declared fields
    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// Declared field by name
    pub fn field(&self, name: &str) -> Option<Arc<Field>> {
        self.fields.iter().find(|f| f.name() == name).cloned()
    }

    /// Declared methods
    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    /// Declared method by name
    pub fn method(&self, name: &str) -> Option<Arc<Method>> {
        self.methods.iter().find(|m| m.name() == name).cloned()
    }

    /// Virtual method table
    pub fn vtable(&self) -> &[Arc<Method>] {
        &self.vtable
    }

    /// Vtable slot `index`
    pub fn vtable_entry(&self, index: u16) -> Option<Arc<Method>> {
        self.vtable.get(index as usize).cloned()
    }

    /// Virtual method matching `name` and `shorty`, for interface dispatch
    pub fn find_virtual(&self, name: &str, shorty: &str) -> Option<Arc<Method>> {
        self.vtable
            .iter()
            .find(|m| m.name() == name && m.shorty() == shorty)
            .cloned()
    }

    /// Read static slot `slot`
    pub fn get_static(&self, slot: usize) -> JValue {
        self.statics.read()[slot]
    }

    /// Write static slot `slot`
    pub fn set_static(&self, slot: usize, value: JValue) {
        self.statics.write()[slot] = value;
    }

    /// Initialization state
    pub fn status(&self) -> ClassStatus {
        *self.status.lock()
    }

    /// Update the initialization state
    pub fn set_status(&self, status: ClassStatus) {
        *self.status.lock() = status;
    }

    /// The `java.lang.Class` instance for this class
    pub fn class_object(&self) -> Option<ObjRef> {
        self.class_object.get().copied()
    }

    /// References held in static fields
    pub(crate) fn static_references(&self) -> Vec<ObjRef> {
        self.statics.read().iter().filter_map(|v| v.get_l()).collect()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorty_kinds() {
        assert_eq!(Primitive::from_shorty('J'), Primitive::Long);
        assert_eq!(Primitive::from_shorty('L'), Primitive::Not);
        assert!(Primitive::Double.is_wide());
        assert!(!Primitive::Float.is_wide());
        assert_eq!(Primitive::Char.component_size(), 2);
        assert_eq!(Primitive::Int.descriptor(), Some("I"));
        assert_eq!(Primitive::Not.descriptor(), None);
    }

    #[test]
    fn test_access_flags() {
        let flags = AccessFlags::PUBLIC | AccessFlags::STATIC;
        assert!(flags.contains(AccessFlags::STATIC));
        assert!(!flags.contains(AccessFlags::ABSTRACT));
    }
}
