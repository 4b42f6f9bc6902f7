//! Growable byte buffer with the primitives used by every succinct record.
//!
//! Integers use the "nByte" scheme: little-endian groups of 7 bits where the
//! final group carries the high bit. Codes stay below 2^28 so a value always
//! fits in 1 to 4 bytes. Strings are counted: one length byte then UTF-8.

use crate::error::{ImportError, StructuralError};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Number of bytes `push_nbyte` writes for `value`
pub fn nbyte_length(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteArray {
    bytes: Vec<u8>,
}

impl ByteArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Shrink the backing storage to the used length
    pub fn trim(&mut self) {
        self.bytes.shrink_to_fit();
    }

    pub fn push_byte(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn push_bytes(&mut self, values: &[u8]) {
        self.bytes.extend_from_slice(values);
    }

    pub fn set_byte(&mut self, pos: usize, value: u8) -> Result<(), StructuralError> {
        match self.bytes.get_mut(pos) {
            Some(b) => {
                *b = value;
                Ok(())
            }
            None => Err(out_of_range(pos)),
        }
    }

    pub fn byte(&self, pos: usize) -> Result<u8, StructuralError> {
        self.bytes.get(pos).copied().ok_or_else(|| out_of_range(pos))
    }

    /// Append a variable-width unsigned integer
    pub fn push_nbyte(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.bytes.push((value & 0x7f) as u8);
            value >>= 7;
        }
        self.bytes.push(value as u8 | 0x80);
    }

    pub fn push_nbytes(&mut self, values: &[u32]) {
        for &v in values {
            self.push_nbyte(v);
        }
    }

    /// Decode the integer at `pos`, returning (value, bytes consumed)
    pub fn nbyte_at(&self, pos: usize) -> Result<(u32, usize), StructuralError> {
        let mut result: u32 = 0;
        let mut shift = 0;
        let mut cursor = pos;
        loop {
            if shift >= 32 {
                return Err(StructuralError::CorruptBytes {
                    pos,
                    reason: "nByte overflow".to_string(),
                });
            }
            let b = self.byte(cursor)?;
            result |= ((b & 0x7f) as u32) << shift;
            cursor += 1;
            if b & 0x80 != 0 {
                return Ok((result, cursor - pos));
            }
            shift += 7;
        }
    }

    pub fn nbyte(&self, pos: usize) -> Result<u32, StructuralError> {
        self.nbyte_at(pos).map(|(v, _)| v)
    }

    /// Decode `count` consecutive integers starting at `pos`
    pub fn nbytes(&self, pos: usize, count: usize) -> Result<Vec<u32>, StructuralError> {
        let mut values = Vec::with_capacity(count);
        let mut cursor = pos;
        for _ in 0..count {
            let (v, used) = self.nbyte_at(cursor)?;
            values.push(v);
            cursor += used;
        }
        Ok(values)
    }

    pub fn push_counted_string(&mut self, s: &str) -> Result<(), ImportError> {
        let len = s.len();
        if len > u8::MAX as usize {
            return Err(ImportError::StringTooLong(len));
        }
        self.bytes.push(len as u8);
        self.bytes.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Borrow the counted string at `pos`
    pub fn counted_str(&self, pos: usize) -> Result<&str, StructuralError> {
        let len = self.byte(pos)? as usize;
        let bytes = self
            .bytes
            .get(pos + 1..pos + 1 + len)
            .ok_or_else(|| out_of_range(pos + len))?;
        std::str::from_utf8(bytes).map_err(|e| StructuralError::CorruptBytes {
            pos,
            reason: e.to_string(),
        })
    }

    pub fn counted_string(&self, pos: usize) -> Result<String, StructuralError> {
        self.counted_str(pos).map(str::to_string)
    }

    /// Encode as standard base64 for persistence
    pub fn to_portable_string(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn from_portable_string(s: &str) -> Result<Self, StructuralError> {
        BASE64
            .decode(s)
            .map(Self::from_bytes)
            .map_err(|e| StructuralError::Portable(e.to_string()))
    }
}

fn out_of_range(pos: usize) -> StructuralError {
    StructuralError::CorruptBytes {
        pos,
        reason: "read past end of buffer".to_string(),
    }
}

impl fmt::Debug for ByteArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteArray[")?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        write!(f, "]")
    }
}

impl Serialize for ByteArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_portable_string())
    }
}

impl<'de> Deserialize<'de> for ByteArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ByteArray::from_portable_string(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nbyte_boundaries() {
        let values = [
            0, 1, 127, 128, 16383, 16384, 2_097_151, 2_097_152, 268_435_455,
        ];
        for value in values {
            let mut ba = ByteArray::new();
            ba.push_nbyte(value);
            assert_eq!(ba.len(), nbyte_length(value));
            assert_eq!(ba.nbyte_at(0).unwrap(), (value, nbyte_length(value)));
        }
    }

    #[test]
    fn test_nbyte_widths() {
        assert_eq!(nbyte_length(127), 1);
        assert_eq!(nbyte_length(128), 2);
        assert_eq!(nbyte_length(16383), 2);
        assert_eq!(nbyte_length(16384), 3);
        assert_eq!(nbyte_length(268_435_455), 4);
    }

    #[test]
    fn test_terminal_byte_has_high_bit() {
        let mut ba = ByteArray::new();
        ba.push_nbyte(5);
        assert_eq!(ba.as_slice(), &[0x85]);
        ba.clear();
        ba.push_nbyte(128);
        assert_eq!(ba.as_slice(), &[0x00, 0x81]);
    }

    #[test]
    fn test_nbytes_sequence() {
        let mut ba = ByteArray::new();
        ba.push_nbytes(&[3, 300, 70000, 0]);
        assert_eq!(ba.nbytes(0, 4).unwrap(), vec![3, 300, 70000, 0]);
    }

    #[test]
    fn test_counted_string() {
        let mut ba = ByteArray::new();
        ba.push_counted_string("in").unwrap();
        ba.push_counted_string("ἀρχῇ").unwrap();
        assert_eq!(ba.counted_str(0).unwrap(), "in");
        assert_eq!(ba.counted_str(3).unwrap(), "ἀρχῇ");
    }

    #[test]
    fn test_counted_string_too_long() {
        let mut ba = ByteArray::new();
        let long = "x".repeat(300);
        assert!(ba.push_counted_string(&long).is_err());
        assert!(ba.is_empty());
    }

    #[test]
    fn test_read_past_end() {
        let mut ba = ByteArray::new();
        ba.push_byte(0x01);
        assert!(ba.nbyte(0).is_err());
        assert!(ba.byte(4).is_err());
    }

    #[test]
    fn test_portable_string() {
        let mut ba = ByteArray::new();
        ba.push_nbytes(&[0, 127, 128, 16384]);
        ba.push_counted_string("word").unwrap();
        let s = ba.to_portable_string();
        assert_eq!(ByteArray::from_portable_string(&s).unwrap(), ba);
        assert!(ByteArray::from_portable_string("!!").is_err());
    }
}
