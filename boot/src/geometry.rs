//! Flash geometry.
//!
//! The only thing the selector needs to know about the flash part is its
//! size, which positions the second default slot.  On these parts the size
//! is recorded in the header of the image at offset 0, alongside the SPI mode
//! and clock, which are decoded here for the console banner.

use core::cell::RefCell;

use asraw::FromRaw;
use storage::ReadFlash;

use crate::image::RomHeader;

/// Source of the flash size.
pub trait FlashGeometry {
    fn flash_size(&mut self) -> FlashSize;
}

/// Size class of the flash part.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlashSize {
    Mbit2,
    Mbit4,
    Mbit8,
    Mbit16,
    Mbit32,
    Unknown,
}

impl FlashSize {
    /// Decode the high nibble of the size/speed header byte.
    pub fn from_code(code: u8) -> FlashSize {
        match code {
            0 => FlashSize::Mbit4,
            1 => FlashSize::Mbit2,
            2 => FlashSize::Mbit8,
            3 => FlashSize::Mbit16,
            4 => FlashSize::Mbit32,
            _ => FlashSize::Unknown,
        }
    }

    /// Usable size, in bytes.  Without `big-flash`, anything over 8 Mbit is
    /// limited to 8 Mbit.  Unknown parts are assumed to be at least 4 Mbit.
    pub fn bytes(self) -> u32 {
        match self {
            FlashSize::Mbit2 => 0x40000,
            FlashSize::Mbit4 | FlashSize::Unknown => 0x80000,
            FlashSize::Mbit8 => 0x100000,
            #[cfg(feature = "big-flash")]
            FlashSize::Mbit16 => 0x200000,
            #[cfg(feature = "big-flash")]
            FlashSize::Mbit32 => 0x400000,
            #[cfg(not(feature = "big-flash"))]
            FlashSize::Mbit16 | FlashSize::Mbit32 => 0x100000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FlashSize::Mbit2 => "2 Mbit",
            FlashSize::Mbit4 => "4 Mbit",
            FlashSize::Mbit8 => "8 Mbit",
            FlashSize::Mbit16 => "16 Mbit",
            FlashSize::Mbit32 => "32 Mbit",
            FlashSize::Unknown => "unknown",
        }
    }
}

/// SPI mode of the flash part.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlashMode {
    Qio,
    Qout,
    Dio,
    Dout,
    Unknown,
}

impl FlashMode {
    pub fn from_code(code: u8) -> FlashMode {
        match code {
            0 => FlashMode::Qio,
            1 => FlashMode::Qout,
            2 => FlashMode::Dio,
            3 => FlashMode::Dout,
            _ => FlashMode::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FlashMode::Qio => "QIO",
            FlashMode::Qout => "QOUT",
            FlashMode::Dio => "DIO",
            FlashMode::Dout => "DOUT",
            FlashMode::Unknown => "unknown",
        }
    }
}

/// SPI clock of the flash part.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlashSpeed {
    Mhz40,
    Mhz26,
    Mhz20,
    Mhz80,
    Unknown,
}

impl FlashSpeed {
    /// Decode the low nibble of the size/speed header byte.
    pub fn from_code(code: u8) -> FlashSpeed {
        match code {
            0x0 => FlashSpeed::Mhz40,
            0x1 => FlashSpeed::Mhz26,
            0x2 => FlashSpeed::Mhz20,
            0xf => FlashSpeed::Mhz80,
            _ => FlashSpeed::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FlashSpeed::Mhz40 => "40 MHz",
            FlashSpeed::Mhz26 => "26.7 MHz",
            FlashSpeed::Mhz20 => "20 MHz",
            FlashSpeed::Mhz80 => "80 MHz",
            FlashSpeed::Unknown => "unknown",
        }
    }
}

/// Everything the boot header says about the part.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FlashInfo {
    pub size: FlashSize,
    pub mode: FlashMode,
    pub speed: FlashSpeed,
}

impl FlashInfo {
    pub fn from_header(header: &RomHeader) -> FlashInfo {
        FlashInfo {
            size: FlashSize::from_code(header.flags2 >> 4),
            mode: FlashMode::from_code(header.flags1),
            speed: FlashSpeed::from_code(header.flags2 & 0x0f),
        }
    }
}

impl Default for FlashInfo {
    fn default() -> Self {
        FlashInfo {
            size: FlashSize::Unknown,
            mode: FlashMode::Unknown,
            speed: FlashSpeed::Unknown,
        }
    }
}

/// Reads the geometry from the header at flash offset 0.
pub struct HeaderGeometry<'f, F> {
    flash: &'f RefCell<F>,
}

impl<'f, F: ReadFlash> HeaderGeometry<'f, F> {
    pub fn new(flash: &'f RefCell<F>) -> Self {
        HeaderGeometry { flash }
    }

    /// Decode the boot header.  If the flash cannot be read, everything is
    /// unknown.
    pub fn info(&self) -> FlashInfo {
        let mut buf = [0u8; RomHeader::SIZE];
        if self.flash.borrow_mut().read(0, &mut buf).is_err() {
            warn!("Unable to read flash header");
            return FlashInfo::default();
        }
        RomHeader::from_raw(&buf)
            .map(|h| FlashInfo::from_header(&h))
            .unwrap_or_default()
    }
}

impl<'f, F: ReadFlash> FlashGeometry for HeaderGeometry<'f, F> {
    fn flash_size(&mut self) -> FlashSize {
        self.info().size
    }
}

/// A part of known size.
#[derive(Debug, Copy, Clone)]
pub struct FixedGeometry(pub FlashSize);

impl FlashGeometry for FixedGeometry {
    fn flash_size(&mut self) -> FlashSize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simflash::SimFlash;

    #[test]
    fn decode_header() {
        let mut flash = SimFlash::new(1, 4, 0x1000, 4).unwrap();
        // QIO, 8 Mbit at 80 MHz.
        flash.install(&[0xe9, 0x03, 0x00, 0x2f, 0, 0, 0, 0], 0).unwrap();
        let flash = RefCell::new(flash);
        let info = HeaderGeometry::new(&flash).info();
        assert_eq!(info.size, FlashSize::Mbit8);
        assert_eq!(info.mode, FlashMode::Qio);
        assert_eq!(info.speed, FlashSpeed::Mhz80);
        assert_eq!(HeaderGeometry::new(&flash).flash_size().bytes(), 0x100000);
    }

    #[test]
    fn sizes() {
        assert_eq!(FlashSize::from_code(1).bytes(), 0x40000);
        assert_eq!(FlashSize::from_code(0).bytes(), 0x80000);
        assert_eq!(FlashSize::from_code(9), FlashSize::Unknown);
        assert_eq!(FlashSize::Unknown.bytes(), 0x80000);
        #[cfg(not(feature = "big-flash"))]
        {
            assert_eq!(FlashSize::Mbit16.bytes(), 0x100000);
            assert_eq!(FlashSize::Mbit32.bytes(), 0x100000);
        }
        #[cfg(feature = "big-flash")]
        {
            assert_eq!(FlashSize::Mbit16.bytes(), 0x200000);
            assert_eq!(FlashSize::Mbit32.bytes(), 0x400000);
        }
    }

    #[test]
    fn unreadable_header() {
        // Too small to hold even a header.
        let flash = RefCell::new(SimFlash::new(1, 4, 4, 1).unwrap());
        assert_eq!(HeaderGeometry::new(&flash).info(), FlashInfo::default());
        assert_eq!(FixedGeometry(FlashSize::Mbit2).flash_size(), FlashSize::Mbit2);
    }
}
