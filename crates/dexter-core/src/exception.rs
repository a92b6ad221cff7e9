//! Managed exceptions
//!
//! A [`Thrown`] carries the exception object a handler wants routed. Only
//! the dispatch loop decides whether it is caught locally or propagates; see
//! `interpreter::dispatch`.

use crate::value::ObjRef;

/// An exception object in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Thrown(pub ObjRef);

impl Thrown {
    /// The exception object
    #[inline]
    pub fn object(self) -> ObjRef {
        self.0
    }
}

macro_rules! throw_kinds {
    ($( $kind:ident => $descriptor:literal, $parent:expr; )*) => {
        /// Exception classes the runtime itself raises
        ///
        /// Declared parent-first so the heap can define them in order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(missing_docs)]
        pub enum ThrowKind {
            $($kind,)*
        }

        impl ThrowKind {
            /// Every kind, parents before children
            pub const ALL: &'static [ThrowKind] = &[$(ThrowKind::$kind,)*];

            /// Class descriptor, e.g. `Ljava/lang/NullPointerException;`
            pub const fn descriptor(self) -> &'static str {
                match self {
                    $(ThrowKind::$kind => $descriptor,)*
                }
            }

            /// Superclass, `None` for `Throwable`
            pub const fn parent(self) -> Option<ThrowKind> {
                match self {
                    $(ThrowKind::$kind => $parent,)*
                }
            }
        }
    };
}

throw_kinds! {
    Throwable => "Ljava/lang/Throwable;", None;
    Exception => "Ljava/lang/Exception;", Some(ThrowKind::Throwable);
    Error => "Ljava/lang/Error;", Some(ThrowKind::Throwable);
    RuntimeException => "Ljava/lang/RuntimeException;", Some(ThrowKind::Exception);
    ArithmeticException => "Ljava/lang/ArithmeticException;", Some(ThrowKind::RuntimeException);
    ArrayIndexOutOfBoundsException => "Ljava/lang/ArrayIndexOutOfBoundsException;", Some(ThrowKind::RuntimeException);
    ArrayStoreException => "Ljava/lang/ArrayStoreException;", Some(ThrowKind::RuntimeException);
    ClassCastException => "Ljava/lang/ClassCastException;", Some(ThrowKind::RuntimeException);
    NegativeArraySizeException => "Ljava/lang/NegativeArraySizeException;", Some(ThrowKind::RuntimeException);
    NullPointerException => "Ljava/lang/NullPointerException;", Some(ThrowKind::RuntimeException);
    IllegalMonitorStateException => "Ljava/lang/IllegalMonitorStateException;", Some(ThrowKind::RuntimeException);
    WrongMethodTypeException => "Ljava/lang/invoke/WrongMethodTypeException;", Some(ThrowKind::RuntimeException);
    InternalError => "Ljava/lang/InternalError;", Some(ThrowKind::Error);
    StackOverflowError => "Ljava/lang/StackOverflowError;", Some(ThrowKind::Error);
    OutOfMemoryError => "Ljava/lang/OutOfMemoryError;", Some(ThrowKind::Error);
    LinkageError => "Ljava/lang/LinkageError;", Some(ThrowKind::Error);
    NoClassDefFoundError => "Ljava/lang/NoClassDefFoundError;", Some(ThrowKind::LinkageError);
    IncompatibleClassChangeError => "Ljava/lang/IncompatibleClassChangeError;", Some(ThrowKind::LinkageError);
    AbstractMethodError => "Ljava/lang/AbstractMethodError;", Some(ThrowKind::IncompatibleClassChangeError);
    NoSuchFieldError => "Ljava/lang/NoSuchFieldError;", Some(ThrowKind::IncompatibleClassChangeError);
    NoSuchMethodError => "Ljava/lang/NoSuchMethodError;", Some(ThrowKind::IncompatibleClassChangeError);
    InstantiationError => "Ljava/lang/InstantiationError;", Some(ThrowKind::IncompatibleClassChangeError);
    TransactionAbortError => "Ldalvik/system/TransactionAbortError;", Some(ThrowKind::InternalError);
}
