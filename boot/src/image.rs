//! Boot image support
//!
//! An image starts with one of two headers.  The plain header (format A)
//! holds a magic value and a count of the sections that follow.  The
//! container header (format B) wraps a block of `len` bytes that is not loaded
//! at boot; a plain header follows that block, and it is the plain header that
//! drives validation.
//!
//! ```text
//! format A                       format B
//! +----------------------+       +--------------------------+
//! | magic 0xe9, count    |       | magic 0xea, marker 0x04  |
//! | entry                |       | entry, reserved, len     |
//! +----------------------+       +--------------------------+
//! | addr, len | data ... |       | len bytes, skipped       |
//! | addr, len | data ... |       +--------------------------+
//! | ..pad.. | checksum   |       | format A image ...       |
//! +----------------------+       +--------------------------+
//! ```
//!
//! The checksum is the last byte of the 16-byte block holding the end of the
//! final section.

use core::cell::RefCell;

use asraw::{read_raw, FromRaw, Reader};
use storage::ReadFlash;

use crate::checksum::{self, XorChecksum};
use crate::{Error, Result};

/// Magic of a plain image header.
pub const ROM_MAGIC: u8 = 0xe9;

/// Magic of a container header.
pub const CONTAINER_MAGIC: u8 = 0xea;

/// A container header carries this in place of the section count.
pub const CONTAINER_MARKER: u8 = 0x04;

/// The checksum trailer lives at `end | TRAILER_MASK`.
const TRAILER_MASK: usize = 0x0f;

/// Plain image header.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct RomHeader {
    pub magic: u8,
    /// Number of sections following the header.
    pub count: u8,
    /// SPI mode of the flash.  Only meaningful in the header at offset 0.
    pub flags1: u8,
    /// Flash size (high nibble) and speed (low nibble).
    pub flags2: u8,
    /// CPU entry point of this image.
    pub entry: u32,
}

impl FromRaw for RomHeader {
    const SIZE: usize = 8;

    fn from_raw(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        Some(RomHeader {
            magic: r.u8()?,
            count: r.u8()?,
            flags1: r.u8()?,
            flags2: r.u8()?,
            entry: r.u32()?,
        })
    }
}

/// Container header, placed before a skipped block and a plain header.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ContainerHeader {
    pub magic: u8,
    pub marker: u8,
    pub flags1: u8,
    pub flags2: u8,
    pub entry: u32,
    pub reserved: u32,
    /// Bytes between the end of this header and the plain header.
    pub len: u32,
}

impl FromRaw for ContainerHeader {
    const SIZE: usize = 16;

    fn from_raw(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        Some(ContainerHeader {
            magic: r.u8()?,
            marker: r.u8()?,
            flags1: r.u8()?,
            flags2: r.u8()?,
            entry: r.u32()?,
            reserved: r.u32()?,
            len: r.u32()?,
        })
    }
}

/// The header found at the start of a slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Header {
    FormatA(RomHeader),
    FormatB(ContainerHeader),
}

impl Header {
    /// Largest header that has to be read to decide the format.
    pub const PROBE_SIZE: usize = ContainerHeader::SIZE;

    /// Determine the format from the first bytes of a slot.
    pub fn parse(bytes: &[u8]) -> Result<Header> {
        match bytes {
            [ROM_MAGIC, ..] => RomHeader::from_raw(bytes)
                .map(Header::FormatA)
                .ok_or(Error::InvalidImage),
            [CONTAINER_MAGIC, CONTAINER_MARKER, ..] => ContainerHeader::from_raw(bytes)
                .map(Header::FormatB)
                .ok_or(Error::InvalidImage),
            _ => Err(Error::InvalidImage),
        }
    }
}

/// Each section is preceded by this header.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
struct SectionHeader {
    address: u32,
    length: u32,
}

impl FromRaw for SectionHeader {
    const SIZE: usize = 8;

    fn from_raw(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        Some(SectionHeader {
            address: r.u32()?,
            length: r.u32()?,
        })
    }
}

/// Read and decode a `T` at `pos`.
fn read_at<T: FromRaw, F: ReadFlash>(flash: &RefCell<F>, pos: usize) -> Result<T> {
    read_raw::<T, Error, _>(|buf| Ok(flash.borrow_mut().read(pos, buf)?))?.ok_or(Error::InvalidImage)
}

/// An image residing in flash, whose header has been found to be sane.  This
/// does not indicate the image itself is valid, see `validate`.
/// This holds on to a RefCell to the flash to bind the data to a particular flash.
pub struct Image<'f, F> {
    flash: &'f RefCell<F>,
    /// The plain header that describes the sections.
    pub header: RomHeader,
    /// The container header, for format B images.
    pub container: Option<ContainerHeader>,
    base: usize,
    sections: usize,
}

impl<'f, F: ReadFlash> Image<'f, F> {
    /// Locate the image at `offset`.  Offsets of zero, and of erased flash, are
    /// never images, and are refused before flash is touched.
    pub fn from_flash(flash: &'f RefCell<F>, offset: u32) -> Result<Image<'f, F>> {
        if offset == 0 || offset == u32::MAX {
            return Err(Error::InvalidImage);
        }
        let offset = offset as usize;

        let mut probe = [0u8; Header::PROBE_SIZE];
        flash.borrow_mut().read(offset, &mut probe)?;

        let (base, header, container) = match Header::parse(&probe)? {
            Header::FormatA(header) => (offset, header, None),
            Header::FormatB(container) => {
                let base = offset
                    .checked_add(ContainerHeader::SIZE)
                    .and_then(|p| p.checked_add(container.len as usize))
                    .ok_or(Error::InvalidImage)?;
                let header: RomHeader = read_at(flash, base)?;
                (base, header, Some(container))
            }
        };

        let sections = base.checked_add(RomHeader::SIZE).ok_or(Error::InvalidImage)?;

        Ok(Image {
            flash,
            header,
            container,
            base,
            sections,
        })
    }

    /// Iterate over the section headers.
    pub fn sections<'a>(&'a self) -> SectionIter<'a, 'f, F> {
        SectionIter {
            image: self,
            pos: self.sections,
            remaining: self.header.count,
        }
    }

    /// Validate this image: stream every section, in order, through the
    /// checksum, and compare against the trailer.
    pub fn validate(&self) -> Result<()> {
        let mut sum = XorChecksum::new();
        let mut iter = self.sections();
        for section in &mut iter {
            let section = section?;
            checksum::stream(
                &mut *self.flash.borrow_mut(),
                section.pos,
                section.len as usize,
                &mut sum,
            )?;
        }

        let trailer = iter.end() | TRAILER_MASK;
        let mut stored = [0u8; 1];
        self.flash.borrow_mut().read(trailer, &mut stored)?;

        if stored[0] != sum.value() {
            warn!("Checksum mismatch: stored 0x{:x}, calculated 0x{:x}", stored[0], sum.value());
            return Err(Error::BadChecksum);
        }
        Ok(())
    }
}

impl<'f, F> Image<'f, F> {
    /// Address the image is booted from.  For a container image, this is the
    /// plain header following the skipped block.
    pub fn base(&self) -> u32 {
        self.base as u32
    }
}

/// Locate and fully validate the image at `offset`.  On success, returns the
/// address to boot from.
pub fn validate<F: ReadFlash>(flash: &RefCell<F>, offset: u32) -> Result<u32> {
    let image = Image::from_flash(flash, offset)?;
    image.validate()?;
    Ok(image.base())
}

/// A single loadable section.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Section {
    /// Address this section is loaded to.
    pub dest: u32,
    /// Size of the section data.
    pub len: u32,
    /// Flash position of the section data.
    pub pos: usize,
}

pub struct SectionIter<'a, 'f, F> {
    image: &'a Image<'f, F>,
    pos: usize,
    remaining: u8,
}

impl<'a, 'f, F> SectionIter<'a, 'f, F> {
    /// Flash position following everything iterated so far.
    pub fn end(&self) -> usize {
        self.pos
    }
}

/// Helper like '?' for iterator operations, where errors should return
/// Some(Err(e)) instead of just the error.  This macro contains a return.
macro_rules! iter_try {
    ($e:expr) => {
        match $e {
            Ok(r) => r,
            Err(e) => return Some(Err(e.into())),
        }
    };
}

impl<'a, 'f, F: ReadFlash> Iterator for SectionIter<'a, 'f, F> {
    type Item = Result<Section>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.remaining;
        if remaining == 0 {
            return None;
        }
        // Any error ends the iteration.
        self.remaining = 0;

        let header: SectionHeader = iter_try!(read_at(self.image.flash, self.pos));
        let data = iter_try!(self
            .pos
            .checked_add(SectionHeader::SIZE)
            .ok_or(Error::InvalidImage));
        let next = iter_try!(data
            .checked_add(header.length as usize)
            .ok_or(Error::InvalidImage));

        self.pos = next;
        self.remaining = remaining - 1;
        Some(Ok(Section {
            dest: header.address,
            len: header.length,
            pos: data,
        }))
    }
}
