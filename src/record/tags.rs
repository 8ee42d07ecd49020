//! Auxiliary tag table walking and the per-record lazy tag index.
//!
//! The tag region is a packed sequence of entries: a 2-byte name, a 1-byte
//! type code, then a type-dependent value. The index is built by a single
//! linear walk the first time any tag is requested and answers all later
//! lookups in O(1).

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, TagError};

/// A decoded auxiliary tag value borrowing from the record bytes.
///
/// Array variants carry the raw little-endian element bytes together with
/// the element count; use the `decode_*` helpers for an owned vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TagValue<'a> {
    /// `A`: a single printable character
    Char(u8),
    /// `c`
    I8(i8),
    /// `C`
    U8(u8),
    /// `s`
    I16(i16),
    /// `S`
    U16(u16),
    /// `i`
    I32(i32),
    /// `I`
    U32(u32),
    /// `f`
    Float(f32),
    /// `Z`: NUL-terminated string, without the NUL
    String(&'a [u8]),
    /// `H`: NUL-terminated hex string, without the NUL
    Hex(&'a [u8]),
    /// `B,c`
    ArrayI8(&'a [u8], usize),
    /// `B,C`
    ArrayU8(&'a [u8], usize),
    /// `B,s`
    ArrayI16(&'a [u8], usize),
    /// `B,S`
    ArrayU16(&'a [u8], usize),
    /// `B,i`
    ArrayI32(&'a [u8], usize),
    /// `B,I`
    ArrayU32(&'a [u8], usize),
    /// `B,f`
    ArrayF32(&'a [u8], usize),
}

impl TagValue<'_> {
    /// The SAM type character for the stored value (`B` for all arrays).
    #[must_use]
    pub fn type_char(&self) -> char {
        match self {
            Self::Char(_) => 'A',
            Self::I8(_) => 'c',
            Self::U8(_) => 'C',
            Self::I16(_) => 's',
            Self::U16(_) => 'S',
            Self::I32(_) => 'i',
            Self::U32(_) => 'I',
            Self::Float(_) => 'f',
            Self::String(_) => 'Z',
            Self::Hex(_) => 'H',
            Self::ArrayI8(..)
            | Self::ArrayU8(..)
            | Self::ArrayI16(..)
            | Self::ArrayU16(..)
            | Self::ArrayI32(..)
            | Self::ArrayU32(..)
            | Self::ArrayF32(..) => 'B',
        }
    }

    /// Any integer variant widened to `i64`, `None` for non-integers.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(i64::from(v)),
            Self::U8(v) => Some(i64::from(v)),
            Self::I16(v) => Some(i64::from(v)),
            Self::U16(v) => Some(i64::from(v)),
            Self::I32(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    /// Decode a `B,I` array into an owned vector.
    #[must_use]
    pub fn decode_u32_array(&self) -> Option<Vec<u32>> {
        match *self {
            Self::ArrayU32(bytes, count) => Some(
                (0..count)
                    .map(|i| LittleEndian::read_u32(&bytes[4 * i..]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Decode a `B,i` array into an owned vector.
    #[must_use]
    pub fn decode_i32_array(&self) -> Option<Vec<i32>> {
        match *self {
            Self::ArrayI32(bytes, count) => Some(
                (0..count)
                    .map(|i| LittleEndian::read_i32(&bytes[4 * i..]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Decode a `B,f` array into an owned vector.
    #[must_use]
    pub fn decode_f32_array(&self) -> Option<Vec<f32>> {
        match *self {
            Self::ArrayF32(bytes, count) => Some(
                (0..count)
                    .map(|i| LittleEndian::read_f32(&bytes[4 * i..]))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Location of one tag within the record bytes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TagEntry {
    /// SAM type code byte
    type_byte: u8,
    /// Array element type, 0 for non-arrays
    subtype: u8,
    /// Offset of the value payload within the record body
    payload: usize,
    /// Payload length in bytes for scalars and strings, element count for
    /// arrays
    count: usize,
}

impl TagEntry {
    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<TagValue<'a>> {
        let bytes = &data[self.payload..];
        let value = match self.type_byte {
            b'A' => TagValue::Char(bytes[0]),
            b'c' => TagValue::I8(bytes[0] as i8),
            b'C' => TagValue::U8(bytes[0]),
            b's' => TagValue::I16(LittleEndian::read_i16(bytes)),
            b'S' => TagValue::U16(LittleEndian::read_u16(bytes)),
            b'i' => TagValue::I32(LittleEndian::read_i32(bytes)),
            b'I' => TagValue::U32(LittleEndian::read_u32(bytes)),
            b'f' => TagValue::Float(LittleEndian::read_f32(bytes)),
            b'Z' => TagValue::String(&bytes[..self.count]),
            b'H' => TagValue::Hex(&bytes[..self.count]),
            b'B' => {
                let elems = &bytes[..self.count * element_size(self.subtype)?];
                match self.subtype {
                    b'c' => TagValue::ArrayI8(elems, self.count),
                    b'C' => TagValue::ArrayU8(elems, self.count),
                    b's' => TagValue::ArrayI16(elems, self.count),
                    b'S' => TagValue::ArrayU16(elems, self.count),
                    b'i' => TagValue::ArrayI32(elems, self.count),
                    b'I' => TagValue::ArrayU32(elems, self.count),
                    b'f' => TagValue::ArrayF32(elems, self.count),
                    other => return Err(TagError::UnknownType(other).into()),
                }
            }
            other => return Err(TagError::UnknownType(other).into()),
        };
        Ok(value)
    }
}

/// Map from 2-byte tag name to the location of its value, built once per
/// record on first tag access.
#[derive(Clone, Debug)]
pub(crate) struct TagIndex {
    entries: HashMap<[u8; 2], TagEntry>,
    /// Names in file order, for enumeration.
    order: Vec<[u8; 2]>,
}

impl TagIndex {
    /// Walk the tag region `[start, data.len())` and index every entry.
    pub fn build(data: &[u8], start: usize) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut order = Vec::new();
        let mut pos = start;

        while pos < data.len() {
            if pos + 3 > data.len() {
                return Err(truncated(data, pos));
            }
            let name = [data[pos], data[pos + 1]];
            let type_byte = data[pos + 2];
            let payload = pos + 3;

            let (count, advance) = match type_byte {
                b'A' | b'c' | b'C' => (1, 1),
                b's' | b'S' => (2, 2),
                b'i' | b'I' | b'f' => (4, 4),
                b'Z' | b'H' => {
                    let len = data[payload..]
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or_else(|| truncated_tag(name))?;
                    (len, len + 1)
                }
                b'B' => {
                    if payload + 5 > data.len() {
                        return Err(truncated_tag(name));
                    }
                    let subtype = data[payload];
                    let count = LittleEndian::read_u32(&data[payload + 1..]) as usize;
                    let elem = element_size(subtype)?;
                    (count, 5 + count * elem)
                }
                other => return Err(TagError::UnknownType(other).into()),
            };

            if payload + advance > data.len() {
                return Err(truncated_tag(name));
            }
            let subtype = if type_byte == b'B' { data[payload] } else { 0 };
            let entry = TagEntry {
                type_byte,
                subtype,
                // array values start past the subtype and count prefix
                payload: if type_byte == b'B' { payload + 5 } else { payload },
                count,
            };
            if entries.insert(name, entry).is_none() {
                order.push(name);
            }
            pos = payload + advance;
        }

        Ok(Self { entries, order })
    }

    pub fn get(&self, name: [u8; 2]) -> Option<&TagEntry> {
        self.entries.get(&name)
    }

    pub fn names(&self) -> Vec<[u8; 2]> {
        self.order.clone()
    }
}

fn element_size(subtype: u8) -> Result<usize> {
    match subtype {
        b'c' | b'C' => Ok(1),
        b's' | b'S' => Ok(2),
        b'i' | b'I' | b'f' => Ok(4),
        other => Err(TagError::UnknownType(other).into()),
    }
}

fn truncated(data: &[u8], pos: usize) -> crate::Error {
    let name = if pos + 2 <= data.len() {
        [data[pos], data[pos + 1]]
    } else {
        [b'?', b'?']
    };
    truncated_tag(name)
}

fn truncated_tag(name: [u8; 2]) -> crate::Error {
    TagError::Truncated(String::from_utf8_lossy(&name).into_owned()).into()
}
