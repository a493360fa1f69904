//! Streaming image checksum.
//!
//! Image integrity is a single byte: the XOR of every section byte, seeded
//! with `CHECKSUM_INIT`.  Sections can be far larger than anything we want on
//! the stack, so they are fed through a small buffer in bounded chunks.

use storage::ReadFlash;

use crate::Result;

/// Seed of every checksum, both for images and for the boot configuration.
pub const CHECKSUM_INIT: u8 = 0xef;

/// Size of the staging buffer used when streaming from flash.
pub const STREAM_CHUNK: usize = 256;

/// Running XOR over a sequence of bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct XorChecksum {
    value: u8,
}

impl Default for XorChecksum {
    fn default() -> Self {
        XorChecksum::new()
    }
}

impl XorChecksum {
    pub fn new() -> XorChecksum {
        XorChecksum { value: CHECKSUM_INIT }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.value = data.iter().fold(self.value, |acc, b| acc ^ b);
    }

    pub fn value(&self) -> u8 {
        self.value
    }
}

/// Checksum of an in-memory block.
pub fn checksum_of(data: &[u8]) -> u8 {
    let mut sum = XorChecksum::new();
    sum.update(data);
    sum.value()
}

/// Feed `len` bytes of flash, starting at `pos`, into `sum`.  Returns the
/// position just past the streamed range.
pub fn stream<F: ReadFlash>(
    flash: &mut F,
    pos: usize,
    len: usize,
    sum: &mut XorChecksum,
) -> Result<usize> {
    let mut buffer = [0u8; STREAM_CHUNK];
    let mut pos = pos;
    let mut remaining = len;
    while remaining > 0 {
        let todo = remaining.min(buffer.len());
        let buf = &mut buffer[..todo];
        flash.read(pos, buf)?;
        sum.update(buf);
        pos = pos.checked_add(todo).ok_or(crate::Error::InvalidImage)?;
        remaining -= todo;
    }
    Ok(pos)
}
