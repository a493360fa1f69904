//! Simulated flash
//!
//! The SPI NOR parts these boards boot from read at any alignment, write in
//! small units, and erase in 4k sectors.  A write may only land on erased
//! bytes.  The simulator enforces that, keeps a log of every access so tests
//! can check what the code under test touched, and can be told to fail.

use std::ops::Range;

use anyhow::{anyhow, Result};
use storage::{Error, Flash, ReadFlash};

pub mod gen;
pub mod styles;

/// A single access to the simulated device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Access {
    Read { offset: usize, len: usize },
    Write { offset: usize, len: usize },
    Erase { from: usize, to: usize },
}

pub struct SimFlash {
    read_size: usize,
    write_size: usize,
    erase_size: usize,
    data: Vec<u8>,
    log: Vec<Access>,
    /// Reads touching this range fail.
    bad_read: Option<Range<usize>>,
    fail_erase: bool,
    fail_write: bool,
}

impl SimFlash {
    /// Build an erased device of `sectors` sectors.
    pub fn new(
        read_size: usize,
        write_size: usize,
        erase_size: usize,
        sectors: usize,
    ) -> Result<SimFlash> {
        for size in [read_size, write_size, erase_size] {
            if !size.is_power_of_two() {
                return Err(anyhow!("Size {} is not a power of two", size));
            }
        }
        if erase_size % write_size != 0 {
            return Err(anyhow!("Erase size must be a multiple of the write size"));
        }
        let capacity = erase_size
            .checked_mul(sectors)
            .ok_or_else(|| anyhow!("Device too large"))?;
        Ok(SimFlash {
            read_size,
            write_size,
            erase_size,
            data: vec![0xff; capacity],
            log: Vec::new(),
            bad_read: None,
            fail_erase: false,
            fail_write: false,
        })
    }

    /// Place `image` at `offset`, regardless of alignment or erase state.  This
    /// is not logged.
    pub fn install(&mut self, image: &[u8], offset: usize) -> Result<()> {
        let end = offset
            .checked_add(image.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| anyhow!("Image does not fit at 0x{:x}", offset))?;
        self.data[offset..end].copy_from_slice(image);
        Ok(())
    }

    /// Direct view of the contents.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Flip bits of a single byte, as a corruption would.
    pub fn corrupt(&mut self, offset: usize, mask: u8) {
        self.data[offset] ^= mask;
    }

    pub fn log(&self) -> &[Access] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Every read, as (offset, len).
    pub fn reads(&self) -> Vec<(usize, usize)> {
        self.log
            .iter()
            .filter_map(|a| match *a {
                Access::Read { offset, len } => Some((offset, len)),
                _ => None,
            })
            .collect()
    }

    /// Every erase, as a byte range.
    pub fn erases(&self) -> Vec<Range<usize>> {
        self.log
            .iter()
            .filter_map(|a| match *a {
                Access::Erase { from, to } => Some(from..to),
                _ => None,
            })
            .collect()
    }

    /// Whether any read touched `range`.
    pub fn was_read(&self, range: Range<usize>) -> bool {
        self.reads()
            .iter()
            .any(|&(offset, len)| offset < range.end && range.start < offset + len)
    }

    pub fn fail_reads(&mut self, range: Option<Range<usize>>) {
        self.bad_read = range;
    }

    pub fn fail_erase(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    pub fn fail_write(&mut self, fail: bool) {
        self.fail_write = fail;
    }
}

impl ReadFlash for SimFlash {
    fn read_size(&self) -> usize {
        self.read_size
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> storage::Result<()> {
        storage::check_read(self, offset, bytes.len())?;
        self.log.push(Access::Read { offset, len: bytes.len() });
        if let Some(bad) = &self.bad_read {
            if offset < bad.end && bad.start < offset + bytes.len() {
                return Err(Error::Device);
            }
        }
        bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Flash for SimFlash {
    fn write_size(&self) -> usize {
        self.write_size
    }

    fn erase_size(&self) -> usize {
        self.erase_size
    }

    fn erase(&mut self, from: usize, to: usize) -> storage::Result<()> {
        storage::check_erase(self, from, to)?;
        self.log.push(Access::Erase { from, to });
        if self.fail_erase {
            return Err(Error::Device);
        }
        self.data[from..to].fill(0xff);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> storage::Result<()> {
        storage::check_write(self, offset, bytes.len())?;
        self.log.push(Access::Write { offset, len: bytes.len() });
        if self.fail_write {
            return Err(Error::Device);
        }
        let dest = &mut self.data[offset..offset + bytes.len()];
        if dest.iter().any(|&b| b != 0xff) {
            return Err(Error::NotErased);
        }
        dest.copy_from_slice(bytes);
        Ok(())
    }
}
