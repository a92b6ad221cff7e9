//! Symbol resolution
//!
//! Instructions refer to strings, types, fields, methods, method handles,
//! prototypes and call sites by index. The interpreter resolves those
//! indices through a [`ClassLinker`]; [`TableLinker`] is an in-memory
//! implementation backed by per-kind tables, used by embedders that build
//! code programmatically and by the test suite.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::class::{ClassId, ClassStatus, Field};
use crate::exception::{ThrowKind, Thrown};
use crate::gc::Heap;
use crate::method::Method;
use crate::thread::ManagedThread;
use crate::value::ObjRef;

/// How a method is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// `invoke-static`
    Static,
    /// `invoke-direct`: constructors and private methods
    Direct,
    /// `invoke-virtual`
    Virtual,
    /// `invoke-super`
    Super,
    /// `invoke-interface`
    Interface,
    /// `invoke-polymorphic`
    Polymorphic,
    /// `invoke-custom`
    Custom,
}

impl InvokeKind {
    /// Whether the call passes a receiver
    pub fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static | InvokeKind::Custom)
    }
}

/// Resolution services used by the interpreter
///
/// Every method may raise a managed exception. A resolver may also call
/// [`ManagedThread::request_caller_retry`] before failing, asking the
/// interpreter to discard the exception and re-execute the instruction.
pub trait ClassLinker: Send + Sync {
    /// String constant `index`
    fn resolve_string(&self, heap: &Heap, index: u32) -> Result<ObjRef, Thrown>;

    /// Type `index`
    fn resolve_class(&self, heap: &Heap, index: u32) -> Result<ClassId, Thrown>;

    /// Field `index`, which must be static iff `is_static`
    fn resolve_field(&self, heap: &Heap, index: u32, is_static: bool) -> Result<Arc<Field>, Thrown>;

    /// Method `index` as referenced by an invoke of `kind`
    fn resolve_method(&self, heap: &Heap, index: u32, kind: InvokeKind) -> Result<Arc<Method>, Thrown>;

    /// Method handle constant `index`
    fn resolve_method_handle(&self, heap: &Heap, index: u32) -> Result<ObjRef, Thrown>;

    /// Method type constant `index`
    fn resolve_method_type(&self, heap: &Heap, index: u32) -> Result<ObjRef, Thrown>;

    /// Shorty of prototype `index`
    fn resolve_proto(&self, heap: &Heap, index: u32) -> Result<String, Thrown>;

    /// Target of call site `index`
    fn resolve_call_site(&self, heap: &Heap, thread: &ManagedThread, index: u32) -> Result<Arc<Method>, Thrown>;

    /// Make `class` ready for static access and instantiation
    fn ensure_initialized(&self, heap: &Heap, thread: &ManagedThread, class: ClassId) -> Result<(), Thrown>;
}

#[derive(Debug, Clone)]
struct FieldRef {
    class: String,
    name: String,
}

#[derive(Debug, Clone)]
struct MethodRef {
    class: String,
    name: String,
    shorty: String,
}

/// A [`ClassLinker`] over in-memory tables
///
/// Table entries name classes by descriptor; lookups go through the heap's
/// class table and results are cached per index.
#[derive(Default)]
pub struct TableLinker {
    strings: Vec<String>,
    types: Vec<String>,
    fields: Vec<FieldRef>,
    methods: Vec<MethodRef>,
    method_handles: Vec<u32>,
    protos: Vec<String>,
    call_sites: Vec<u32>,
    field_cache: RwLock<FxHashMap<u32, Arc<Field>>>,
    method_cache: RwLock<FxHashMap<u32, Arc<Method>>>,
}

fn push<T>(table: &mut Vec<T>, entry: T) -> u32 {
    table.push(entry);
    (table.len() - 1) as u32
}

impl TableLinker {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string constant, returning its index
    pub fn add_string(&mut self, value: impl Into<String>) -> u32 {
        push(&mut self.strings, value.into())
    }

    /// Add a type reference by descriptor
    pub fn add_type(&mut self, descriptor: impl Into<String>) -> u32 {
        push(&mut self.types, descriptor.into())
    }

    /// Add a field reference
    pub fn add_field(&mut self, class: impl Into<String>, name: impl Into<String>) -> u32 {
        push(
            &mut self.fields,
            FieldRef {
                class: class.into(),
                name: name.into(),
            },
        )
    }

    /// Add a method reference
    pub fn add_method(&mut self, class: impl Into<String>, name: impl Into<String>, shorty: impl Into<String>) -> u32 {
        push(
            &mut self.methods,
            MethodRef {
                class: class.into(),
                name: name.into(),
                shorty: shorty.into(),
            },
        )
    }

    /// Add a method handle constant targeting method reference `method`
    pub fn add_method_handle(&mut self, method: u32) -> u32 {
        push(&mut self.method_handles, method)
    }

    /// Add a prototype by shorty
    pub fn add_proto(&mut self, shorty: impl Into<String>) -> u32 {
        push(&mut self.protos, shorty.into())
    }

    /// Add a call site bound to method reference `method`
    pub fn add_call_site(&mut self, method: u32) -> u32 {
        push(&mut self.call_sites, method)
    }

    fn find_class(&self, heap: &Heap, descriptor: &str) -> Result<ClassId, Thrown> {
        heap.find_class(descriptor)
            .ok_or_else(|| heap.throw_new(ThrowKind::NoClassDefFoundError, Some(descriptor)))
    }

    fn entry<'t, T>(&self, heap: &Heap, table: &'t [T], index: u32, what: &str) -> Result<&'t T, Thrown> {
        table.get(index as usize).ok_or_else(|| {
            let message = format!("{} index {} out of range", what, index);
            heap.throw_new(ThrowKind::InternalError, Some(&message))
        })
    }

    fn lookup_method(&self, heap: &Heap, index: u32) -> Result<Arc<Method>, Thrown> {
        if let Some(method) = self.method_cache.read().get(&index) {
            return Ok(method.clone());
        }
        let reference = self.entry(heap, &self.methods, index, "method")?;
        let class = self.find_class(heap, &reference.class)?;
        let method = self
            .search_method(heap, class, &reference.name, &reference.shorty)
            .ok_or_else(|| {
                let message = format!("{}.{}({})", reference.class, reference.name, reference.shorty);
                heap.throw_new(ThrowKind::NoSuchMethodError, Some(&message))
            })?;
        self.method_cache.write().insert(index, method.clone());
        Ok(method)
    }

    fn search_method(&self, heap: &Heap, class: ClassId, name: &str, shorty: &str) -> Option<Arc<Method>> {
        let declaring = heap.class(class);
        if let Some(found) = declaring
            .methods()
            .iter()
            .find(|m| m.name() == name && m.shorty() == shorty)
        {
            return Some(found.clone());
        }
        declaring
            .super_class()
            .and_then(|s| self.search_method(heap, s, name, shorty))
            .or_else(|| {
                declaring
                    .interfaces()
                    .iter()
                    .find_map(|&i| self.search_method(heap, i, name, shorty))
            })
    }
}

impl ClassLinker for TableLinker {
    fn resolve_string(&self, heap: &Heap, index: u32) -> Result<ObjRef, Thrown> {
        let value = self.entry(heap, &self.strings, index, "string")?;
        heap.intern_string(value)
    }

    fn resolve_class(&self, heap: &Heap, index: u32) -> Result<ClassId, Thrown> {
        let descriptor = self.entry(heap, &self.types, index, "type")?;
        self.find_class(heap, descriptor)
    }

    fn resolve_field(&self, heap: &Heap, index: u32, is_static: bool) -> Result<Arc<Field>, Thrown> {
        let cached = self.field_cache.read().get(&index).cloned();
        let field = match cached {
            Some(field) => field,
            None => {
                let reference = self.entry(heap, &self.fields, index, "field")?;
                let mut current = Some(self.find_class(heap, &reference.class)?);
                let mut found = None;
                while let Some(id) = current {
                    let class = heap.class(id);
                    found = class.field(&reference.name);
                    if found.is_some() {
                        break;
                    }
                    current = class.super_class();
                }
                let field = found.ok_or_else(|| {
                    let message = format!("{}.{}", reference.class, reference.name);
                    heap.throw_new(ThrowKind::NoSuchFieldError, Some(&message))
                })?;
                self.field_cache.write().insert(index, field.clone());
                field
            }
        };
        if field.is_static() != is_static {
            let message = format!(
                "expected {} field {}",
                if is_static { "static" } else { "instance" },
                field.name()
            );
            return Err(heap.throw_new(ThrowKind::IncompatibleClassChangeError, Some(&message)));
        }
        Ok(field)
    }

    fn resolve_method(&self, heap: &Heap, index: u32, kind: InvokeKind) -> Result<Arc<Method>, Thrown> {
        let method = self.lookup_method(heap, index)?;
        let expects_static = kind == InvokeKind::Static;
        if method.is_static() != expects_static {
            let message = format!(
                "expected {} method {}",
                if expects_static { "static" } else { "instance" },
                method
            );
            return Err(heap.throw_new(ThrowKind::IncompatibleClassChangeError, Some(&message)));
        }
        Ok(method)
    }

    fn resolve_method_handle(&self, heap: &Heap, index: u32) -> Result<ObjRef, Thrown> {
        let method = *self.entry(heap, &self.method_handles, index, "method handle")?;
        let target = self.lookup_method(heap, method)?;
        heap.alloc_method_handle(target)
    }

    fn resolve_method_type(&self, heap: &Heap, index: u32) -> Result<ObjRef, Thrown> {
        let shorty = self.resolve_proto(heap, index)?;
        heap.alloc_method_type(&shorty)
    }

    fn resolve_proto(&self, heap: &Heap, index: u32) -> Result<String, Thrown> {
        self.entry(heap, &self.protos, index, "proto").cloned()
    }

    fn resolve_call_site(&self, heap: &Heap, _thread: &ManagedThread, index: u32) -> Result<Arc<Method>, Thrown> {
        let method = *self.entry(heap, &self.call_sites, index, "call site")?;
        let target = self.lookup_method(heap, method)?;
        if !target.is_static() {
            let message = format!("call site target {} is not static", target);
            return Err(heap.throw_new(ThrowKind::IncompatibleClassChangeError, Some(&message)));
        }
        Ok(target)
    }

    fn ensure_initialized(&self, heap: &Heap, _thread: &ManagedThread, class: ClassId) -> Result<(), Thrown> {
        let class = heap.class(class);
        match class.status() {
            ClassStatus::Initialized => Ok(()),
            ClassStatus::NotInitialized => {
                class.set_status(ClassStatus::Initialized);
                tracing::debug!(target: "dexter::interp", class = %class.descriptor(), "initialized class");
                Ok(())
            }
            ClassStatus::Erroneous => Err(heap.throw_new(ThrowKind::NoClassDefFoundError, Some(class.descriptor()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassBuilder, FieldBuilder, Primitive};
    use crate::method::{CodeItem, MethodBuilder};

    fn setup() -> (Heap, TableLinker) {
        let heap = Heap::new();
        let base = heap.define_class(
            ClassBuilder::new("LBase;")
                .field(FieldBuilder::new("count", Primitive::Int))
                .method(MethodBuilder::new("run", "V").code(CodeItem::new(1, 1, vec![0x000e]))),
        );
        heap.define_class(
            ClassBuilder::new("LDerived;")
                .extends(base)
                .field(FieldBuilder::new("total", Primitive::Long).static_field())
                .uninitialized(),
        );
        (heap, TableLinker::new())
    }

    fn describe(heap: &Heap, thrown: Thrown) -> String {
        heap.describe(thrown.object())
    }

    #[test]
    fn test_inherited_members_resolve() {
        let (heap, mut linker) = setup();
        let field = linker.add_field("LDerived;", "count");
        let method = linker.add_method("LDerived;", "run", "V");
        assert_eq!(linker.resolve_field(&heap, field, false).unwrap().slot(), 0);
        assert_eq!(linker.resolve_method(&heap, method, InvokeKind::Virtual).unwrap().name(), "run");
    }

    #[test]
    fn test_resolution_failures() {
        let (heap, mut linker) = setup();
        let missing_class = linker.add_type("LMissing;");
        let missing_field = linker.add_field("LBase;", "nope");
        let static_field = linker.add_field("LDerived;", "total");
        let method = linker.add_method("LBase;", "run", "V");

        let err = linker.resolve_class(&heap, missing_class).unwrap_err();
        assert_eq!(describe(&heap, err), "Ljava/lang/NoClassDefFoundError;: LMissing;");
        let err = linker.resolve_field(&heap, missing_field, false).unwrap_err();
        assert_eq!(describe(&heap, err), "Ljava/lang/NoSuchFieldError;: LBase;.nope");
        let err = linker.resolve_field(&heap, static_field, false).unwrap_err();
        assert!(describe(&heap, err).starts_with("Ljava/lang/IncompatibleClassChangeError;"));
        let err = linker.resolve_method(&heap, method, InvokeKind::Static).unwrap_err();
        assert!(describe(&heap, err).starts_with("Ljava/lang/IncompatibleClassChangeError;"));
    }

    #[test]
    fn test_ensure_initialized_flips_status() {
        let (heap, linker) = setup();
        let thread = ManagedThread::detached();
        let derived = heap.find_class("LDerived;").unwrap();
        assert_eq!(heap.class(derived).status(), ClassStatus::NotInitialized);
        linker.ensure_initialized(&heap, &thread, derived).unwrap();
        assert_eq!(heap.class(derived).status(), ClassStatus::Initialized);
    }

    #[test]
    fn test_strings_are_interned() {
        let (heap, mut linker) = setup();
        let a = linker.add_string("dex");
        let b = linker.add_string("dex");
        assert_eq!(linker.resolve_string(&heap, a).unwrap(), linker.resolve_string(&heap, b).unwrap());
    }
}
