// Weft - weft-format
// Module: binary constants and LEB128 codecs
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Binary format constants plus the byte-level [`Reader`] and [`Writer`]
//! used by the decoder and the module writer.
//!
//! The reader enforces the format's LEB128 rules exactly: encodings may be
//! padded but never longer than `ceil(N/7)` bytes, and the unused bits of
//! the final byte must be zero (unsigned) or a correct sign extension
//! (signed). Adversarial inputs routinely probe these edges.

use weft_error::{codes, Error, ErrorCategory, Result};

/// WebAssembly magic bytes.
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
/// Supported binary format version.
pub const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Section ids.
pub const CUSTOM_SECTION_ID: u8 = 0x00;
pub const TYPE_SECTION_ID: u8 = 0x01;
pub const IMPORT_SECTION_ID: u8 = 0x02;
pub const FUNCTION_SECTION_ID: u8 = 0x03;
pub const TABLE_SECTION_ID: u8 = 0x04;
pub const MEMORY_SECTION_ID: u8 = 0x05;
pub const GLOBAL_SECTION_ID: u8 = 0x06;
pub const EXPORT_SECTION_ID: u8 = 0x07;
pub const START_SECTION_ID: u8 = 0x08;
pub const ELEMENT_SECTION_ID: u8 = 0x09;
pub const CODE_SECTION_ID: u8 = 0x0A;
pub const DATA_SECTION_ID: u8 = 0x0B;
pub const DATA_COUNT_SECTION_ID: u8 = 0x0C;

/// The `func` type constructor byte in the type section.
pub const FUNC_TYPE_TAG: u8 = 0x60;

/// Import/export kind bytes.
pub const EXTERNAL_KIND_FUNC: u8 = 0x00;
pub const EXTERNAL_KIND_TABLE: u8 = 0x01;
pub const EXTERNAL_KIND_MEMORY: u8 = 0x02;
pub const EXTERNAL_KIND_GLOBAL: u8 = 0x03;

/// Memories are capped at 65536 pages (4GiB) by the 32-bit address space.
pub const MAX_MEMORY_PAGES: u32 = 0x10000;

/// Cursor over a byte range with the format's primitive codecs.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

fn eof(what: &str) -> Error {
    Error::new(
        ErrorCategory::Parse,
        codes::UNEXPECTED_EOF,
        format!("unexpected end of input while reading {what}"),
    )
}

fn bad_leb(what: &str) -> Error {
    Error::new(
        ErrorCategory::Parse,
        codes::INVALID_LEB128,
        format!("malformed LEB128 encoding for {what}"),
    )
}

impl<'a> Reader<'a> {
    /// Creates a reader over the given bytes.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current offset from the start of the range.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// True when every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> Result<u8> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| eof("byte"))?;
        self.pos += 1;
        Ok(b)
    }

    /// Peeks at the next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8> {
        self.bytes.get(self.pos).copied().ok_or_else(|| eof("byte"))
    }

    /// Reads `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| eof("bytes"))?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| eof("bytes"))?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads an unsigned LEB128 u32.
    pub fn leb_u32(&mut self) -> Result<u32> {
        let v = self.leb_unsigned(32, "u32")?;
        Ok(v as u32)
    }

    /// Reads an unsigned LEB128 u64.
    pub fn leb_u64(&mut self) -> Result<u64> {
        self.leb_unsigned(64, "u64")
    }

    fn leb_unsigned(&mut self, bits: u32, what: &str) -> Result<u64> {
        let max_bytes = (bits as usize + 6) / 7;
        let mut result: u64 = 0;
        let mut shift = 0u32;
        for i in 0.. {
            if i >= max_bytes {
                return Err(bad_leb(what));
            }
            let byte = self.u8().map_err(|_| eof(what))?;
            let low = u64::from(byte & 0x7F);
            // Bits that do not fit into the target width must be zero.
            if shift + 7 > bits && (low >> (bits - shift)) != 0 {
                return Err(bad_leb(what));
            }
            result |= low << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        unreachable!()
    }

    /// Reads a signed LEB128 i32.
    pub fn leb_i32(&mut self) -> Result<i32> {
        let v = self.leb_signed(32, "i32")?;
        Ok(v as i32)
    }

    /// Reads a signed LEB128 i64.
    pub fn leb_i64(&mut self) -> Result<i64> {
        self.leb_signed(64, "i64")
    }

    /// Reads the 33-bit signed quantity used by block types.
    pub fn leb_s33(&mut self) -> Result<i64> {
        self.leb_signed(33, "s33")
    }

    fn leb_signed(&mut self, bits: u32, what: &str) -> Result<i64> {
        let max_bytes = (bits as usize + 6) / 7;
        let mut result: i64 = 0;
        let mut shift = 0u32;
        for i in 0..max_bytes {
            let byte = self.u8().map_err(|_| eof(what))?;
            let payload = byte & 0x7F;
            if i + 1 == max_bytes {
                if byte & 0x80 != 0 {
                    return Err(bad_leb(what));
                }
                // The payload bits beyond the target width must be a
                // correct sign extension of the value's top bit.
                let useful = bits - shift;
                if useful < 7 {
                    let sign = (payload >> (useful - 1)) & 1;
                    let unused = payload >> useful;
                    let expect = if sign == 1 { 0x7F >> useful } else { 0 };
                    if unused != expect {
                        return Err(bad_leb(what));
                    }
                }
            }
            result |= i64::from(payload) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && (payload & 0x40) != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
        Err(bad_leb(what))
    }

    /// Reads a little-endian f32 bit pattern.
    pub fn f32_bits(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian f64 bit pattern.
    pub fn f64_bits(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a length-prefixed UTF-8 name.
    pub fn name(&mut self) -> Result<String> {
        let len = self.leb_u32()? as usize;
        let bytes = self.bytes(len).map_err(|_| eof("name"))?;
        core::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| {
                Error::new(
                    ErrorCategory::Parse,
                    codes::INVALID_UTF8,
                    "name is not valid UTF-8",
                )
            })
    }

    /// Splits off a sub-reader over the next `len` bytes.
    pub fn sub_reader(&mut self, len: usize, what: &str) -> Result<Reader<'a>> {
        let slice = self.bytes(len).map_err(|_| eof(what))?;
        Ok(Reader::new(slice))
    }
}

/// Byte sink with the format's primitive encoders.
#[derive(Debug, Default)]
pub struct Writer {
    out: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer, yielding the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    /// Current length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Writes one byte.
    pub fn u8(&mut self, b: u8) {
        self.out.push(b);
    }

    /// Writes raw bytes.
    pub fn bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    /// Writes an unsigned LEB128 u32.
    pub fn leb_u32(&mut self, mut v: u32) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.out.push(byte);
                return;
            }
            self.out.push(byte | 0x80);
        }
    }

    /// Writes a signed LEB128 i32.
    pub fn leb_i32(&mut self, v: i32) {
        self.leb_i64(i64::from(v));
    }

    /// Writes a signed LEB128 i64.
    pub fn leb_i64(&mut self, mut v: i64) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
            if done {
                self.out.push(byte);
                return;
            }
            self.out.push(byte | 0x80);
        }
    }

    /// Writes a length-prefixed UTF-8 name.
    pub fn name(&mut self, s: &str) {
        self.leb_u32(s.len() as u32);
        self.bytes(s.as_bytes());
    }

    /// Writes a section: id byte, LEB size, then the payload.
    pub fn section(&mut self, id: u8, payload: &Writer) {
        self.u8(id);
        self.leb_u32(payload.out.len() as u32);
        self.bytes(&payload.out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_u32(v: u32) {
        let mut w = Writer::new();
        w.leb_u32(v);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.leb_u32().unwrap(), v);
        assert!(r.is_empty());
    }

    fn roundtrip_i64(v: i64) {
        let mut w = Writer::new();
        w.leb_i64(v);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.leb_i64().unwrap(), v);
        assert!(r.is_empty());
    }

    #[test]
    fn leb_round_trips() {
        for v in [0, 1, 127, 128, 624485, u32::MAX] {
            roundtrip_u32(v);
        }
        for v in [0, -1, 63, 64, -64, -65, i64::MIN, i64::MAX] {
            roundtrip_i64(v);
        }
    }

    #[test]
    fn leb_padded_but_valid() {
        // 0 encoded in two bytes: 0x80 0x00 is legal padding.
        let mut r = Reader::new(&[0x80, 0x00]);
        assert_eq!(r.leb_u32().unwrap(), 0);
    }

    #[test]
    fn leb_overlong_rejected() {
        // Six bytes for a u32 is always malformed.
        let mut r = Reader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]);
        assert!(r.leb_u32().is_err());
        // Five bytes whose last byte sets bits beyond 32.
        let mut r = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert!(r.leb_u32().is_err());
    }

    #[test]
    fn leb_signed_unused_bits_checked() {
        // -1 as i32: 0x7F minimal; a padded form must sign-extend correctly.
        let mut r = Reader::new(&[0x7F]);
        assert_eq!(r.leb_i32().unwrap(), -1);
        let mut r = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(r.leb_i32().unwrap(), -1);
        // Same shape but with wrong trailing bits: out of i32 range.
        let mut r = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert!(r.leb_i32().is_err());
    }

    #[test]
    fn name_utf8_enforced() {
        let mut w = Writer::new();
        w.leb_u32(2);
        w.bytes(&[0xC3, 0x28]); // invalid UTF-8
        let bytes = w.into_bytes();
        assert!(Reader::new(&bytes).name().is_err());
    }

    #[test]
    fn truncated_reads_fail() {
        let mut r = Reader::new(&[0x01, 0x02]);
        assert!(r.bytes(3).is_err());
        let mut r = Reader::new(&[0x80]);
        assert!(r.leb_u32().is_err());
    }
}
