//! Heap object layout
//!
//! Every heap slot holds a [`HeapObject`]: its class plus one of a handful
//! of payload shapes. Arrays keep their elements in a typed vector so that
//! element reads and writes never need to reinterpret bytes.

use std::sync::Arc;

use crate::class::{ClassId, Primitive};
use crate::method::Method;
use crate::value::{JValue, ObjRef};

/// Elements of an array, stored by component kind
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// `boolean[]`
    Boolean(Vec<u8>),
    /// `byte[]`
    Byte(Vec<i8>),
    /// `char[]`
    Char(Vec<u16>),
    /// `short[]`
    Short(Vec<i16>),
    /// `int[]`
    Int(Vec<i32>),
    /// `long[]`
    Long(Vec<i64>),
    /// `float[]`
    Float(Vec<f32>),
    /// `double[]`
    Double(Vec<f64>),
    /// Reference arrays
    Object(Vec<Option<ObjRef>>),
}

impl ArrayData {
    /// A zero-filled array of `len` elements of `kind`
    pub fn new(kind: Primitive, len: usize) -> Self {
        match kind {
            Primitive::Boolean => ArrayData::Boolean(vec![0; len]),
            Primitive::Byte => ArrayData::Byte(vec![0; len]),
            Primitive::Char => ArrayData::Char(vec![0; len]),
            Primitive::Short => ArrayData::Short(vec![0; len]),
            Primitive::Int => ArrayData::Int(vec![0; len]),
            Primitive::Long => ArrayData::Long(vec![0; len]),
            Primitive::Float => ArrayData::Float(vec![0.0; len]),
            Primitive::Double => ArrayData::Double(vec![0.0; len]),
            Primitive::Not | Primitive::Void => ArrayData::Object(vec![None; len]),
        }
    }

    /// Component kind
    pub fn kind(&self) -> Primitive {
        match self {
            ArrayData::Boolean(_) => Primitive::Boolean,
            ArrayData::Byte(_) => Primitive::Byte,
            ArrayData::Char(_) => Primitive::Char,
            ArrayData::Short(_) => Primitive::Short,
            ArrayData::Int(_) => Primitive::Int,
            ArrayData::Long(_) => Primitive::Long,
            ArrayData::Float(_) => Primitive::Float,
            ArrayData::Double(_) => Primitive::Double,
            ArrayData::Object(_) => Primitive::Not,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Boolean(v) => v.len(),
            ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Object(v) => v.len(),
        }
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index`, widened the way `aget` variants widen it
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> JValue {
        match self {
            ArrayData::Boolean(v) => JValue::from_int(v[index] as i32),
            ArrayData::Byte(v) => JValue::from_int(v[index] as i32),
            ArrayData::Char(v) => JValue::from_int(v[index] as i32),
            ArrayData::Short(v) => JValue::from_int(v[index] as i32),
            ArrayData::Int(v) => JValue::from_int(v[index]),
            ArrayData::Long(v) => JValue::from_long(v[index]),
            ArrayData::Float(v) => JValue::from_float(v[index]),
            ArrayData::Double(v) => JValue::from_double(v[index]),
            ArrayData::Object(v) => JValue::from_ref(v[index]),
        }
    }

    /// Store `value` at `index`, narrowing to the component kind
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: JValue) {
        match self {
            ArrayData::Boolean(v) => v[index] = value.get_z() as u8,
            ArrayData::Byte(v) => v[index] = value.get_b(),
            ArrayData::Char(v) => v[index] = value.get_c(),
            ArrayData::Short(v) => v[index] = value.get_s(),
            ArrayData::Int(v) => v[index] = value.get_i(),
            ArrayData::Long(v) => v[index] = value.get_j(),
            ArrayData::Float(v) => v[index] = value.get_f(),
            ArrayData::Double(v) => v[index] = value.get_d(),
            ArrayData::Object(v) => v[index] = value.get_l(),
        }
    }

    /// Store raw little-endian element bits, as found in an array-data payload
    ///
    /// Returns `false` for reference arrays, which cannot be filled from data.
    pub fn set_raw(&mut self, index: usize, bits: u64) -> bool {
        match self {
            ArrayData::Boolean(v) => v[index] = bits as u8,
            ArrayData::Byte(v) => v[index] = bits as u8 as i8,
            ArrayData::Char(v) => v[index] = bits as u16,
            ArrayData::Short(v) => v[index] = bits as u16 as i16,
            ArrayData::Int(v) => v[index] = bits as u32 as i32,
            ArrayData::Long(v) => v[index] = bits as i64,
            ArrayData::Float(v) => v[index] = f32::from_bits(bits as u32),
            ArrayData::Double(v) => v[index] = f64::from_bits(bits),
            ArrayData::Object(_) => return false,
        }
        true
    }

    /// Non-null elements of a reference array
    pub fn references(&self) -> impl Iterator<Item = ObjRef> + '_ {
        let refs: &[Option<ObjRef>] = match self {
            ArrayData::Object(v) => v,
            _ => &[],
        };
        refs.iter().flatten().copied()
    }
}

/// Payload of a heap object
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// Plain instance with one value per instance field slot
    Instance(Vec<JValue>),
    /// Array
    Array(ArrayData),
    /// `java.lang.String`
    String(String),
    /// `java.lang.Class` mirror of a class
    Class(ClassId),
    /// `java.lang.invoke.MethodHandle` bound to a method
    MethodHandle(Arc<Method>),
    /// `java.lang.invoke.MethodType` described by a shorty
    MethodType(String),
}

/// A heap slot's contents
#[derive(Debug, Clone)]
pub struct HeapObject {
    pub(crate) class: ClassId,
    pub(crate) kind: ObjectKind,
    pub(crate) marked: bool,
}

impl HeapObject {
    pub(crate) fn new(class: ClassId, kind: ObjectKind) -> Self {
        Self {
            class,
            kind,
            marked: false,
        }
    }

    /// Class of the object
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Payload
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// References this object holds, for tracing
    pub(crate) fn references(&self) -> Vec<ObjRef> {
        match &self.kind {
            ObjectKind::Instance(fields) => fields.iter().filter_map(|v| v.get_l()).collect(),
            ObjectKind::Array(data) => data.references().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrowing_stores() {
        let mut bytes = ArrayData::new(Primitive::Byte, 2);
        bytes.set(0, JValue::from_int(0x1ff));
        assert_eq!(bytes.get(0).get_i(), -1);

        let mut chars = ArrayData::new(Primitive::Char, 1);
        chars.set(0, JValue::from_int(-1));
        assert_eq!(chars.get(0).get_i(), 0xffff);
    }

    #[test]
    fn test_raw_fill() {
        let mut ints = ArrayData::new(Primitive::Int, 2);
        assert!(ints.set_raw(1, 0xffff_fffe));
        assert_eq!(ints.get(1).get_i(), -2);

        let mut objects = ArrayData::new(Primitive::Not, 1);
        assert!(!objects.set_raw(0, 1));
        assert_eq!(objects.references().count(), 0);
    }
}
