use crate::{AmlError, AmlResult};
use byteorder::{ByteOrder, LittleEndian};
use core::fmt;

/// A forward-only cursor over a buffer of AML. The parser works with a stack of these: entering an object that
/// carries a PkgLength produces a sub-stream bounded by that length, which is then consumed before the outer
/// stream continues.
#[derive(Clone, Copy)]
pub struct AmlStream<'a> {
    data: &'a [u8],
    pos: usize,
    /// Offset of `data[0]` in the buffer the stream was originally created from, used for diagnostics.
    base: usize,
}

impl<'a> AmlStream<'a> {
    pub fn new(data: &'a [u8]) -> AmlStream<'a> {
        AmlStream { data, pos: 0, base: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The offset of the cursor in the original buffer.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn peek(&self) -> AmlResult<u8> {
        self.data.get(self.pos).copied().ok_or(AmlError::UnexpectedEndOfStream)
    }

    pub fn peek_at(&self, ahead: usize) -> AmlResult<u8> {
        self.data.get(self.pos + ahead).copied().ok_or(AmlError::UnexpectedEndOfStream)
    }

    pub fn next(&mut self) -> AmlResult<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn next_u16(&mut self) -> AmlResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn next_u32(&mut self) -> AmlResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn next_u64(&mut self) -> AmlResult<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Consume the next `n` bytes, returning them. On failure, the stream is left where it was.
    pub fn take(&mut self, n: usize) -> AmlResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(AmlError::UnexpectedEndOfStream);
        }

        let bytes = &self.data[self.pos..(self.pos + n)];
        self.pos += n;
        Ok(bytes)
    }

    /// Consume bytes up to and including the next `0x00`, returning them (including the null terminator).
    pub fn take_null_terminated(&mut self) -> AmlResult<&'a [u8]> {
        let length = self.data[self.pos..].iter().position(|&b| b == 0x00).ok_or(AmlError::UnexpectedEndOfStream)?;
        self.take(length + 1)
    }

    pub fn take_rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.pos..];
        self.pos = self.data.len();
        bytes
    }

    /// Split off a stream over the next `length` bytes, advancing this stream past them.
    pub fn sub_stream(&mut self, length: usize) -> AmlResult<AmlStream<'a>> {
        let base = self.offset();
        let data = self.take(length).map_err(|_| AmlError::InvalidPkgLength)?;
        Ok(AmlStream { data, pos: 0, base })
    }

    /// The bytes between `start` (a value previously returned by `offset`) and the current position.
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        let start = start.saturating_sub(self.base).min(self.pos);
        &self.data[start..self.pos]
    }
}

impl fmt::Debug for AmlStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PRINT_SUMMARY_LEN: usize = 8;

        let rest = &self.data[self.pos..];
        write!(f, "[")?;
        for b in rest.iter().take(PRINT_SUMMARY_LEN) {
            write!(f, "{:02X},", b)?;
        }
        if rest.len() > PRINT_SUMMARY_LEN {
            write!(f, "..], len={:#X}, ", rest.len())?;
        } else {
            write!(f, "], ")?;
        }
        write!(f, "offset={:#X}", self.offset())
    }
}
