//! Methods and code items
//!
//! A [`Method`] is immutable once its class is defined. Interpreted methods
//! carry a [`CodeItem`]; native methods carry a [`NativeFn`] invoked with
//! the argument values laid out by the method's shorty descriptor.

use std::fmt;
use std::sync::Arc;

use dexter_bytecode::{Instruction, Opcode};

use crate::class::{AccessFlags, ClassId, Primitive};
use crate::exception::Thrown;
use crate::gc::Heap;
use crate::thread::ManagedThread;
use crate::value::JValue;

/// Identity of a method within one heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

/// Services available to native code
pub struct NativeEnv<'a> {
    /// The heap, for allocation and throwing
    pub heap: &'a Heap,
    /// The calling thread
    pub thread: &'a ManagedThread,
}

/// Host implementation of a native method
pub type NativeFn = Arc<dyn Fn(&NativeEnv<'_>, &[JValue]) -> Result<JValue, Thrown> + Send + Sync>;

/// One catch clause of a try block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchHandler {
    /// Exception class caught; `None` catches everything
    pub exception_type: Option<ClassId>,
    /// Handler address in code units
    pub address: u32,
}

/// A guarded range of instructions and its handlers, tried in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    /// First guarded code unit
    pub start_addr: u32,
    /// Number of guarded code units
    pub insn_count: u32,
    /// Handlers in declaration order; a catch-all comes last
    pub handlers: Vec<CatchHandler>,
}

impl TryItem {
    /// Guard `[start_addr, start_addr + insn_count)`
    pub fn new(start_addr: u32, insn_count: u32) -> Self {
        Self {
            start_addr,
            insn_count,
            handlers: Vec::new(),
        }
    }

    /// Add a typed handler
    pub fn catch(mut self, exception_type: ClassId, address: u32) -> Self {
        self.handlers.push(CatchHandler {
            exception_type: Some(exception_type),
            address,
        });
        self
    }

    /// Add the catch-all handler
    pub fn catch_all(mut self, address: u32) -> Self {
        self.handlers.push(CatchHandler {
            exception_type: None,
            address,
        });
        self
    }

    #[inline]
    fn covers(&self, dex_pc: u32) -> bool {
        dex_pc >= self.start_addr && dex_pc < self.start_addr + self.insn_count
    }
}

/// Bytecode and frame layout of an interpreted method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeItem {
    /// Registers in the frame
    pub registers_size: u16,
    /// Incoming argument registers, the last `ins_size` of the frame
    pub ins_size: u16,
    /// Instructions
    pub insns: Vec<u16>,
    /// Try blocks, sorted and non-overlapping
    pub tries: Vec<TryItem>,
}

impl CodeItem {
    /// Create a code item with no try blocks
    pub fn new(registers_size: u16, ins_size: u16, insns: Vec<u16>) -> Self {
        Self {
            registers_size,
            ins_size,
            insns,
            tries: Vec::new(),
        }
    }

    /// Add a try block
    pub fn with_try(mut self, try_item: TryItem) -> Self {
        self.tries.push(try_item);
        self
    }
}

/// Declaration of a method, consumed by `ClassBuilder`
pub struct MethodBuilder {
    pub(crate) name: String,
    pub(crate) shorty: String,
    pub(crate) access: AccessFlags,
    pub(crate) code: Option<CodeItem>,
    pub(crate) native: Option<NativeFn>,
    pub(crate) return_type: Option<ClassId>,
}

impl MethodBuilder {
    /// A public instance method with the given shorty (`"VIJ"`: returns void, takes int and long)
    pub fn new(name: impl Into<String>, shorty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shorty: shorty.into(),
            access: AccessFlags::PUBLIC,
            code: None,
            native: None,
            return_type: None,
        }
    }

    /// Attach bytecode
    pub fn code(mut self, code: CodeItem) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a native implementation
    pub fn native<F>(mut self, f: F) -> Self
    where
        F: Fn(&NativeEnv<'_>, &[JValue]) -> Result<JValue, Thrown> + Send + Sync + 'static,
    {
        self.access = self.access | AccessFlags::NATIVE;
        self.native = Some(Arc::new(f));
        self
    }

    /// Mark static
    pub fn static_method(mut self) -> Self {
        self.access = self.access | AccessFlags::STATIC;
        self
    }

    /// Mark abstract
    pub fn abstract_method(mut self) -> Self {
        self.access = self.access | AccessFlags::ABSTRACT;
        self
    }

    /// Mark private (direct dispatch)
    pub fn private(mut self) -> Self {
        self.access = AccessFlags((self.access.0 & !AccessFlags::PUBLIC.0) | AccessFlags::PRIVATE.0);
        self
    }

    /// Mark as an instance initializer (direct dispatch)
    pub fn constructor(mut self) -> Self {
        self.access = self.access | AccessFlags::CONSTRUCTOR;
        self
    }

    /// Declared reference return type, checked by `return-object`
    pub fn returns(mut self, class: ClassId) -> Self {
        self.return_type = Some(class);
        self
    }

    pub(crate) fn is_direct(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
            || self.access.contains(AccessFlags::PRIVATE)
            || self.access.contains(AccessFlags::CONSTRUCTOR)
    }
}

/// A defined method
pub struct Method {
    id: MethodId,
    class: ClassId,
    name: String,
    shorty: String,
    access: AccessFlags,
    code: Option<CodeItem>,
    native: Option<NativeFn>,
    return_type: Option<ClassId>,
    vtable_index: Option<u16>,
}

impl Method {
    pub(crate) fn from_builder(
        id: MethodId,
        class: ClassId,
        builder: MethodBuilder,
        vtable_index: Option<u16>,
    ) -> Self {
        Self {
            id,
            class,
            name: builder.name,
            shorty: builder.shorty,
            access: builder.access,
            code: builder.code,
            native: builder.native,
            return_type: builder.return_type,
            vtable_index,
        }
    }

    /// Method identity
    #[inline]
    pub fn id(&self) -> MethodId {
        self.id
    }

    /// Declaring class
    #[inline]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shorty descriptor: return type followed by parameter types
    pub fn shorty(&self) -> &str {
        &self.shorty
    }

    /// Access flags
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// Whether the method has no receiver
    #[inline]
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    /// Whether the method runs host code
    #[inline]
    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    /// Whether the method has no implementation
    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    /// Whether the method can be called at all
    pub fn is_invokable(&self) -> bool {
        !self.is_abstract() && (self.code.is_some() || self.native.is_some())
    }

    /// Bytecode, if interpreted
    pub fn code_item(&self) -> Option<&CodeItem> {
        self.code.as_ref()
    }

    /// Instructions, empty for native or abstract methods
    pub fn insns(&self) -> &[u16] {
        self.code.as_ref().map_or(&[], |c| c.insns.as_slice())
    }

    /// Native implementation
    pub fn native(&self) -> Option<&NativeFn> {
        self.native.as_ref()
    }

    /// Declared reference return type
    pub fn return_type(&self) -> Option<ClassId> {
        self.return_type
    }

    /// Kind of the returned value
    pub fn return_primitive(&self) -> Primitive {
        self.shorty
            .chars()
            .next()
            .map_or(Primitive::Void, Primitive::from_shorty)
    }

    /// Parameter kinds, excluding the receiver
    pub fn params(&self) -> impl Iterator<Item = Primitive> + '_ {
        self.shorty.chars().skip(1).map(Primitive::from_shorty)
    }

    /// Virtual dispatch slot
    pub fn vtable_index(&self) -> Option<u16> {
        self.vtable_index
    }

    /// Number of argument registers, counting the receiver and wide pairs
    pub fn num_input_vregs(&self) -> usize {
        let receiver = usize::from(!self.is_static());
        receiver + self.params().map(|p| if p.is_wide() { 2 } else { 1 }).sum::<usize>()
    }

    /// Find the handler for an exception of `exception_class` thrown at `dex_pc`
    ///
    /// Returns the handler address and whether the pending exception should be
    /// cleared, which is the case when the handler does not begin with
    /// `move-exception`.
    pub fn find_catch_block(&self, heap: &Heap, exception_class: ClassId, dex_pc: u32) -> Option<(u32, bool)> {
        let code = self.code.as_ref()?;
        let try_item = code.tries.iter().find(|t| t.covers(dex_pc))?;
        let handler = try_item.handlers.iter().find(|h| match h.exception_type {
            None => true,
            Some(caught) => heap.is_assignable(caught, exception_class),
        })?;
        let clear_exception = match Instruction::try_at(&code.insns, handler.address) {
            Ok(first) => first.opcode() != Opcode::MoveException,
            Err(_) => true,
        };
        Some((handler.address, clear_exception))
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("name", &self.name)
            .field("shorty", &self.shorty)
            .finish()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.shorty)
    }
}
