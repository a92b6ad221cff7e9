//! Register values and method results
//!
//! [`ObjRef`] is a non-null handle to a heap object; absent references are
//! spelled `Option<ObjRef>` everywhere. [`JValue`] is the untyped result slot
//! used for return values, the result register and field/array transfers.

use std::fmt;
use std::num::NonZeroU32;

/// Handle to a heap object
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(NonZeroU32);

impl ObjRef {
    /// Handle for heap slot `index`
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index + 1).unwrap_or(u32::MAX);
        match NonZeroU32::new(raw) {
            Some(raw) => ObjRef(raw),
            None => unreachable!("index + 1 is never zero"),
        }
    }

    /// Heap slot index
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// Raw bits as stored in a primitive register slot
    #[inline]
    pub fn raw(self) -> u32 {
        self.0.get()
    }

    /// Rebuild a handle from its raw bits; zero is null
    #[inline]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(ObjRef)
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Untyped 64-bit value plus an optional reference
///
/// The reader states the kind it expects, exactly as with register slots.
/// `JValue::default()` is zero / null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JValue {
    bits: u64,
    reference: Option<ObjRef>,
}

impl JValue {
    /// 32-bit int (also used for boolean, byte, char and short)
    #[inline]
    pub fn from_int(value: i32) -> Self {
        Self {
            bits: value as i64 as u64,
            reference: None,
        }
    }

    /// 64-bit long
    #[inline]
    pub fn from_long(value: i64) -> Self {
        Self {
            bits: value as u64,
            reference: None,
        }
    }

    /// 32-bit float
    #[inline]
    pub fn from_float(value: f32) -> Self {
        Self {
            bits: value.to_bits() as u64,
            reference: None,
        }
    }

    /// 64-bit double
    #[inline]
    pub fn from_double(value: f64) -> Self {
        Self {
            bits: value.to_bits(),
            reference: None,
        }
    }

    /// Object reference (or null)
    #[inline]
    pub fn from_ref(value: Option<ObjRef>) -> Self {
        Self {
            bits: value.map_or(0, |r| r.raw() as u64),
            reference: value,
        }
    }

    /// Read as int
    #[inline]
    pub fn get_i(&self) -> i32 {
        self.bits as i32
    }

    /// Read as long
    #[inline]
    pub fn get_j(&self) -> i64 {
        self.bits as i64
    }

    /// Read as float
    #[inline]
    pub fn get_f(&self) -> f32 {
        f32::from_bits(self.bits as u32)
    }

    /// Read as double
    #[inline]
    pub fn get_d(&self) -> f64 {
        f64::from_bits(self.bits)
    }

    /// Read as boolean
    #[inline]
    pub fn get_z(&self) -> bool {
        self.bits as u8 != 0
    }

    /// Read as byte
    #[inline]
    pub fn get_b(&self) -> i8 {
        self.bits as i8
    }

    /// Read as char
    #[inline]
    pub fn get_c(&self) -> u16 {
        self.bits as u16
    }

    /// Read as short
    #[inline]
    pub fn get_s(&self) -> i16 {
        self.bits as i16
    }

    /// Read as reference
    #[inline]
    pub fn get_l(&self) -> Option<ObjRef> {
        self.reference
    }

    /// Raw primitive bits
    #[inline]
    pub fn raw_bits(&self) -> u64 {
        self.bits
    }
}
