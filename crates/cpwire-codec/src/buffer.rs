//! Positioned write/read buffers shared by every codec layer.
//!
//! Both buffers count positions from the start of the message. Alignment
//! padding is computed against that origin, so a nested field is never
//! aligned relative to itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// Size prefix values below this fit in one byte.
const SIZE_U8_LIMIT: usize = 254;
/// Marker byte for a two-byte size prefix.
const SIZE_U16_MARKER: u8 = 254;
/// Marker byte for a four-byte size prefix.
const SIZE_U32_MARKER: u8 = 255;

const INITIAL_CAPACITY: usize = 256;

/// Append-only message buffer. All integers are little-endian.
#[derive(Debug)]
pub struct MessageWriter {
    buf: BytesMut,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Bytes written since the start of the message.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything written after `position`.
    pub fn truncate(&mut self, position: usize) {
        self.buf.truncate(position);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64_le(v);
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    /// Write a variable-length size prefix.
    ///
    /// ```text
    /// size < 254        -> [size]
    /// size <= 0xFFFF    -> [254, u16 LE]
    /// size <= u32::MAX  -> [255, u32 LE]
    /// ```
    pub fn put_size(&mut self, size: usize) -> Result<()> {
        if size < SIZE_U8_LIMIT {
            self.buf.put_u8(size as u8);
        } else if size <= usize::from(u16::MAX) {
            self.buf.put_u8(SIZE_U16_MARKER);
            self.buf.put_u16_le(size as u16);
        } else {
            let size = u32::try_from(size).map_err(|_| {
                CodecError::unsupported(format!("length {size} exceeds the 32-bit size prefix"))
            })?;
            self.buf.put_u8(SIZE_U32_MARKER);
            self.buf.put_u32_le(size);
        }
        Ok(())
    }

    /// Size prefix followed by the raw bytes.
    pub fn put_sized(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_size(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Pad with zero bytes until the message length is a multiple of `alignment`.
    pub fn put_alignment(&mut self, alignment: usize) {
        let rem = self.buf.len() % alignment;
        if rem != 0 {
            self.buf.put_bytes(0, alignment - rem);
        }
    }

    /// Freeze the message.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for MessageWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over a received message.
///
/// Every read checks the remaining length first; running short is reported
/// as [`CodecError::Corrupted`] instead of panicking.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
    len: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8], max_depth: usize) -> Self {
        Self {
            buf,
            len: buf.len(),
            depth: 0,
            max_depth,
        }
    }

    /// Bytes consumed since the start of the message.
    pub fn position(&self) -> usize {
        self.len - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    fn require(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(CodecError::corrupted(format!(
                "truncated {what} at offset {} (need {n} bytes, have {})",
                self.position(),
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.require(1, "byte")?;
        Ok(self.buf.get_u8())
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        self.require(4, "int32")?;
        Ok(self.buf.get_i32_le())
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.require(8, "int64")?;
        Ok(self.buf.get_i64_le())
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        self.require(8, "float64")?;
        Ok(self.buf.get_f64_le())
    }

    /// Read a variable-length size prefix.
    pub fn get_size(&mut self) -> Result<usize> {
        match self.get_u8()? {
            SIZE_U16_MARKER => {
                self.require(2, "size")?;
                Ok(usize::from(self.buf.get_u16_le()))
            }
            SIZE_U32_MARKER => {
                self.require(4, "size")?;
                Ok(self.buf.get_u32_le() as usize)
            }
            small => Ok(usize::from(small)),
        }
    }

    /// Borrow the next `n` bytes.
    pub fn get_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        self.require(n, "byte sequence")?;
        let buf: &'a [u8] = self.buf;
        let (head, tail) = buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Size prefix followed by that many bytes.
    pub fn get_sized(&mut self) -> Result<&'a [u8]> {
        let n = self.get_size()?;
        self.get_slice(n)
    }

    /// Size-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String> {
        let offset = self.position();
        let bytes = self.get_sized()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|err| CodecError::corrupted(format!("invalid UTF-8 at offset {offset}: {err}")))
    }

    /// Skip padding so the position is a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let rem = self.position() % alignment;
        if rem != 0 {
            let pad = alignment - rem;
            if self.buf.remaining() < pad {
                return Err(CodecError::corrupted(format!(
                    "alignment underrun at offset {}",
                    self.position()
                )));
            }
            self.buf.advance(pad);
        }
        Ok(())
    }

    /// Check that `count` elements of `width` bytes can still be present.
    ///
    /// Guards allocations sized from untrusted prefixes.
    pub fn require_elements(&self, count: usize, width: usize, what: &str) -> Result<()> {
        let needed = count.checked_mul(width).ok_or_else(|| {
            CodecError::corrupted(format!("{what} length {count} overflows"))
        })?;
        self.require(needed, what)
    }

    pub(crate) fn descend(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(CodecError::corrupted(format!(
                "nesting deeper than {} levels",
                self.max_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}
