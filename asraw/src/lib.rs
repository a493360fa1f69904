//! AsRaw provides a safe way to move fixed-layout structures to and from their
//! on-flash bytes.  Nothing here reinterprets memory: every field is decoded
//! explicitly, in little-endian order, from a slice whose length is checked
//! against the declared size of the structure.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use byteorder::{ByteOrder, LittleEndian};

/// A structure that can be decoded from exactly `SIZE` bytes.
pub trait FromRaw: Sized {
    /// Encoded size, in bytes.
    const SIZE: usize;

    /// Decode from the start of `bytes`.  Returns None if `bytes` is shorter
    /// than `SIZE`.
    fn from_raw(bytes: &[u8]) -> Option<Self>;
}

/// A structure that can be encoded into `SIZE` bytes.
pub trait AsRaw {
    const SIZE: usize;

    /// Encode into the start of `bytes`.  Returns None if `bytes` is shorter
    /// than `SIZE`.
    fn to_raw(&self, bytes: &mut [u8]) -> Option<()>;
}

/// Sequential little-endian reader over a byte slice.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.take(2).map(LittleEndian::read_u16)
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.take(4).map(LittleEndian::read_u32)
    }

    pub fn skip(&mut self, len: usize) -> Option<()> {
        self.take(len).map(|_| ())
    }
}

/// Largest structure `read_raw` will stage on the stack.
pub const MAX_RAW: usize = 64;

/// Fill a stack buffer of `T::SIZE` bytes with `fill`, and decode it.  The
/// closure's error is passed through; a decode failure is reported as
/// `Ok(None)`.
pub fn read_raw<T, E, F>(fill: F) -> Result<Option<T>, E>
where
    T: FromRaw,
    F: FnOnce(&mut [u8]) -> Result<(), E>,
{
    let mut buf = [0u8; MAX_RAW];
    let Some(buf) = buf.get_mut(..T::SIZE) else {
        return Ok(None);
    };
    fill(buf)?;
    Ok(T::from_raw(buf))
}
