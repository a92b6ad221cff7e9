//! Switch and array-data payloads
//!
//! Payloads are pseudo-instructions embedded in the code item and referenced
//! by a relative 32-bit offset from `packed-switch`, `sparse-switch` and
//! `fill-array-data`. They start with a `nop` whose high byte identifies the
//! payload kind.

use crate::error::DecodeError;

/// Identifier of a packed-switch payload
pub const PACKED_SWITCH_SIGNATURE: u16 = 0x0100;
/// Identifier of a sparse-switch payload
pub const SPARSE_SWITCH_SIGNATURE: u16 = 0x0200;
/// Identifier of a fill-array-data payload
pub const ARRAY_DATA_SIGNATURE: u16 = 0x0300;

fn check_signature(code: &[u16], offset: usize, expected: u16) -> Result<(), DecodeError> {
    match code.get(offset) {
        Some(&found) if found == expected => Ok(()),
        Some(&found) => Err(DecodeError::BadPayloadSignature {
            offset,
            expected,
            found,
        }),
        None => Err(DecodeError::TruncatedPayload(offset)),
    }
}

fn read_i32(units: &[u16], index: usize) -> i32 {
    (units[index] as u32 | ((units[index + 1] as u32) << 16)) as i32
}

/// Dense jump table: keys `first_key .. first_key + size`
#[derive(Debug, Clone, Copy)]
pub struct PackedSwitchPayload<'a> {
    first_key: i32,
    targets: &'a [u16],
}

impl<'a> PackedSwitchPayload<'a> {
    /// Parse the payload starting at `offset`.
    pub fn parse(code: &'a [u16], offset: usize) -> Result<Self, DecodeError> {
        check_signature(code, offset, PACKED_SWITCH_SIGNATURE)?;
        let header = code
            .get(offset..offset + 4)
            .ok_or(DecodeError::TruncatedPayload(offset))?;
        let size = header[1] as usize;
        let first_key = read_i32(header, 2);
        let targets = code
            .get(offset + 4..offset + 4 + size * 2)
            .ok_or(DecodeError::TruncatedPayload(offset))?;
        Ok(Self { first_key, targets })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.targets.len() / 2
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Lowest key.
    pub fn first_key(&self) -> i32 {
        self.first_key
    }

    /// Target of entry `index`, relative to the switch instruction.
    pub fn target(&self, index: usize) -> i32 {
        read_i32(self.targets, index * 2)
    }

    /// Relative branch target for `value`, or `None` on a miss.
    pub fn lookup(&self, value: i32) -> Option<i32> {
        let index = (value as i64) - (self.first_key as i64);
        if index < 0 || index >= self.len() as i64 {
            return None;
        }
        Some(self.target(index as usize))
    }

    /// Iterate over every relative target.
    pub fn targets(&self) -> impl Iterator<Item = i32> + '_ {
        (0..self.len()).map(move |i| self.target(i))
    }
}

/// Sorted key/target table searched by binary search
#[derive(Debug, Clone, Copy)]
pub struct SparseSwitchPayload<'a> {
    keys: &'a [u16],
    targets: &'a [u16],
}

impl<'a> SparseSwitchPayload<'a> {
    /// Parse the payload starting at `offset`.
    pub fn parse(code: &'a [u16], offset: usize) -> Result<Self, DecodeError> {
        check_signature(code, offset, SPARSE_SWITCH_SIGNATURE)?;
        let size = *code
            .get(offset + 1)
            .ok_or(DecodeError::TruncatedPayload(offset))? as usize;
        let keys = code
            .get(offset + 2..offset + 2 + size * 2)
            .ok_or(DecodeError::TruncatedPayload(offset))?;
        let targets = code
            .get(offset + 2 + size * 2..offset + 2 + size * 4)
            .ok_or(DecodeError::TruncatedPayload(offset))?;
        Ok(Self { keys, targets })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.keys.len() / 2
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key of entry `index`.
    pub fn key(&self, index: usize) -> i32 {
        read_i32(self.keys, index * 2)
    }

    /// Target of entry `index`, relative to the switch instruction.
    pub fn target(&self, index: usize) -> i32 {
        read_i32(self.targets, index * 2)
    }

    /// Relative branch target for `value`, or `None` on a miss.
    pub fn lookup(&self, value: i32) -> Option<i32> {
        let (mut lo, mut hi) = (0usize, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let key = self.key(mid);
            if value < key {
                hi = mid;
            } else if value > key {
                lo = mid + 1;
            } else {
                return Some(self.target(mid));
            }
        }
        None
    }

    /// Iterate over every relative target.
    pub fn targets(&self) -> impl Iterator<Item = i32> + '_ {
        (0..self.len()).map(move |i| self.target(i))
    }
}

/// Raw element data for `fill-array-data`
#[derive(Debug, Clone, Copy)]
pub struct ArrayDataPayload<'a> {
    element_width: u16,
    element_count: u32,
    data: &'a [u16],
}

impl<'a> ArrayDataPayload<'a> {
    /// Parse the payload starting at `offset`.
    pub fn parse(code: &'a [u16], offset: usize) -> Result<Self, DecodeError> {
        check_signature(code, offset, ARRAY_DATA_SIGNATURE)?;
        let header = code
            .get(offset..offset + 4)
            .ok_or(DecodeError::TruncatedPayload(offset))?;
        let element_width = header[1];
        if !matches!(element_width, 1 | 2 | 4 | 8) {
            return Err(DecodeError::InvalidElementWidth(element_width));
        }
        let element_count = read_i32(header, 2) as u32;
        let units = (element_width as usize * element_count as usize + 1) / 2;
        let data = code
            .get(offset + 4..offset + 4 + units)
            .ok_or(DecodeError::TruncatedPayload(offset))?;
        Ok(Self {
            element_width,
            element_count,
            data,
        })
    }

    /// Width of one element in bytes.
    pub fn element_width(&self) -> usize {
        self.element_width as usize
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.element_count as usize
    }

    /// Little-endian element bytes, without the trailing pad byte.
    pub fn bytes(&self) -> Vec<u8> {
        let len = self.element_width() * self.element_count();
        self.data
            .iter()
            .flat_map(|unit| unit.to_le_bytes())
            .take(len)
            .collect()
    }

    /// Element `index` zero-extended to 64 bits.
    pub fn element(&self, index: usize) -> u64 {
        let width = self.element_width();
        let start = index * width;
        let mut value = 0u64;
        for i in 0..width {
            let byte_index = start + i;
            let unit = self.data[byte_index / 2];
            let byte = if byte_index % 2 == 0 { unit & 0xff } else { unit >> 8 };
            value |= (byte as u64) << (8 * i);
        }
        value
    }
}
