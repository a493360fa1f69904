//! Boot configuration
//!
//! A small fixed record, kept at the start of a dedicated flash sector, says
//! where each slot is and which slot to boot.  The record is only trusted if
//! the magic and version match (and, with `config-checksum`, the trailing
//! checksum).  Anything else is treated as a fresh device, and a default
//! record is written in its place.
//!
//! ```text
//! 0       magic
//! 1       version
//! 2       mode flags
//! 3       current rom
//! 4       rom count
//! 5       gpio rom
//! 6..8    reserved
//! 8..24   slot offsets, MAX_ROMS little-endian u32
//! 24      checksum (config-checksum only)
//! ```

use core::cell::RefCell;

use asraw::{AsRaw, FromRaw, Reader};
use byteorder::{ByteOrder, LittleEndian};
use storage::Flash;

use crate::checksum::checksum_of;
use crate::geometry::FlashGeometry;
use crate::{Error, Result};

/// Sector size of the layout.  Slot offsets are placed relative to this, and
/// the flash must erase in units of exactly this size.
pub const SECTOR_SIZE: usize = 0x1000;

/// Sector index holding the boot configuration.
pub const CONFIG_SECTOR: usize = 1;

pub const CONFIG_MAGIC: u8 = 0xe1;
pub const CONFIG_VERSION: u8 = 0x01;

/// Most slots a configuration can describe.
pub const MAX_ROMS: usize = 4;

/// Offset of the first slot, and of the second slot from the middle of flash.
pub const DEFAULT_ROM_OFFSET: u32 = (SECTOR_SIZE * 2) as u32;

/// Position of the checksum byte, which covers everything before it.
const CHECKSUM_POS: usize = 8 + 4 * MAX_ROMS;

#[cfg(feature = "config-checksum")]
const RECORD_SIZE: usize = CHECKSUM_POS + 1;
#[cfg(not(feature = "config-checksum"))]
const RECORD_SIZE: usize = CHECKSUM_POS;

/// The record, padded to a word.
const STORED_BYTES: usize = (RECORD_SIZE + 3) & !3;

/// Mode flags of the configuration.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Mode(u8);

impl Mode {
    /// Boot `gpio_rom` when the strap pin is pulled low.
    pub const GPIO_ROM: Mode = Mode(0x01);

    pub const fn empty() -> Mode {
        Mode(0)
    }

    pub const fn from_bits(bits: u8) -> Mode {
        Mode(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Mode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Mode, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

/// The persisted boot configuration record.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootConfig {
    pub magic: u8,
    pub version: u8,
    pub mode: Mode,
    /// Slot last booted, and the first one tried.
    pub current_rom: u8,
    /// Number of entries of `roms` in use.
    pub count: u8,
    /// Slot forced by the strap pin in GPIO mode.
    pub gpio_rom: u8,
    /// Flash offsets of each slot.
    pub roms: [u32; MAX_ROMS],
    /// Only stored with `config-checksum`.
    pub chksum: u8,
}

impl BootConfig {
    /// Bytes written to flash: the record, padded to a word.
    pub const STORED_SIZE: usize = STORED_BYTES;

    /// The standard two slot setup.  The first slot is near the start of
    /// flash, the second the same distance past the middle.
    pub fn default_for(flash_size: u32) -> BootConfig {
        let mut roms = [0u32; MAX_ROMS];
        roms[0] = DEFAULT_ROM_OFFSET;
        roms[1] = flash_size / 2 + DEFAULT_ROM_OFFSET;
        let mut config = BootConfig {
            magic: CONFIG_MAGIC,
            version: CONFIG_VERSION,
            mode: Mode::empty(),
            current_rom: 0,
            count: 2,
            gpio_rom: 0,
            roms,
            chksum: 0,
        };
        config.seal();
        config
    }

    /// The configured slots.
    pub fn roms(&self) -> &[u32] {
        &self.roms[..(self.count as usize).min(MAX_ROMS)]
    }

    /// Decode a record read from flash, returning it only if it can be
    /// trusted.
    pub fn decode(raw: &[u8]) -> Option<BootConfig> {
        let config = <BootConfig as FromRaw>::from_raw(raw)?;
        if config.magic != CONFIG_MAGIC || config.version != CONFIG_VERSION {
            return None;
        }
        #[cfg(feature = "config-checksum")]
        if config.chksum != checksum_of(&raw[..CHECKSUM_POS]) {
            return None;
        }
        // A count that addresses no slot, or more than exist, cannot be used.
        if config.count == 0 || config.count as usize > MAX_ROMS {
            return None;
        }
        Some(config)
    }

    /// Bring the checksum up to date with the fields.  Without
    /// `config-checksum` there is no checksum, and it stays zero.
    pub fn seal(&mut self) {
        if cfg!(feature = "config-checksum") {
            self.chksum = self.calc_chksum();
        }
    }

    /// Checksum over the encoded bytes preceding the checksum field.
    pub fn calc_chksum(&self) -> u8 {
        checksum_of(&self.encode()[..CHECKSUM_POS])
    }

    /// The bytes written to flash, padding included.
    pub fn encode(&self) -> [u8; STORED_BYTES] {
        let mut raw = [0u8; STORED_BYTES];
        raw[0] = self.magic;
        raw[1] = self.version;
        raw[2] = self.mode.bits();
        raw[3] = self.current_rom;
        raw[4] = self.count;
        raw[5] = self.gpio_rom;
        for (slot, rom) in raw[8..CHECKSUM_POS].chunks_exact_mut(4).zip(self.roms) {
            LittleEndian::write_u32(slot, rom);
        }
        #[cfg(feature = "config-checksum")]
        {
            raw[CHECKSUM_POS] = self.chksum;
        }
        raw
    }
}

impl FromRaw for BootConfig {
    const SIZE: usize = RECORD_SIZE;

    fn from_raw(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes.get(..<Self as FromRaw>::SIZE)?);
        let magic = r.u8()?;
        let version = r.u8()?;
        let mode = Mode::from_bits(r.u8()?);
        let current_rom = r.u8()?;
        let count = r.u8()?;
        let gpio_rom = r.u8()?;
        r.skip(2)?;
        let mut roms = [0u32; MAX_ROMS];
        for rom in roms.iter_mut() {
            *rom = r.u32()?;
        }
        #[cfg(feature = "config-checksum")]
        let chksum = r.u8()?;
        #[cfg(not(feature = "config-checksum"))]
        let chksum = 0;
        Some(BootConfig {
            magic,
            version,
            mode,
            current_rom,
            count,
            gpio_rom,
            roms,
            chksum,
        })
    }
}

impl AsRaw for BootConfig {
    const SIZE: usize = RECORD_SIZE;

    fn to_raw(&self, bytes: &mut [u8]) -> Option<()> {
        bytes
            .get_mut(..RECORD_SIZE)?
            .copy_from_slice(&self.encode()[..RECORD_SIZE]);
        Some(())
    }
}

/// Loads and stores the boot configuration in its sector.
pub struct ConfigStore<'f, F> {
    flash: &'f RefCell<F>,
}

impl<'f, F: Flash> ConfigStore<'f, F> {
    pub fn new(flash: &'f RefCell<F>) -> Self {
        ConfigStore { flash }
    }

    /// Offset of the config sector.  A device that does not erase in
    /// `SECTOR_SIZE` units would put the sector somewhere other than the
    /// layout expects, possibly over a slot, so it is refused.
    fn sector_base(&self) -> Result<usize> {
        if self.flash.borrow().erase_size() != SECTOR_SIZE {
            return Err(Error::Flash(storage::Error::NotAligned));
        }
        Ok(CONFIG_SECTOR * SECTOR_SIZE)
    }

    /// Read the stored configuration, if there is a trustworthy one.
    pub fn read(&self) -> Result<Option<BootConfig>> {
        let mut raw = [0u8; BootConfig::STORED_SIZE];
        let base = self.sector_base()?;
        self.flash.borrow_mut().read(base, &mut raw)?;
        Ok(BootConfig::decode(&raw))
    }

    /// Return the stored configuration.  If it is missing or corrupt, a
    /// default is generated from the flash size and written out first.  This
    /// never fails: a default that cannot be written is still returned.
    pub fn load<G: FlashGeometry>(&self, geometry: &mut G) -> BootConfig {
        match self.read() {
            Ok(Some(config)) => return config,
            Ok(None) => (),
            Err(_) => warn!("Unable to read boot config"),
        }

        info!("Writing default boot config.");
        let mut config = BootConfig::default_for(geometry.flash_size().bytes());
        if self.persist(&mut config).is_err() {
            error!("Unable to write default boot config");
        }
        config
    }

    /// Erase the config sector and write `config` to it.  The checksum is
    /// recomputed first.
    pub fn persist(&self, config: &mut BootConfig) -> Result<()> {
        config.seal();

        let raw = config.encode();

        let base = self.sector_base()?;
        let mut flash = self.flash.borrow_mut();
        flash.erase_sector(CONFIG_SECTOR)?;
        flash.write(base, &raw)?;
        Ok(())
    }

    /// Select the slot to try first on the next boot.
    pub fn set_current_rom(&self, config: &mut BootConfig, rom: u8) -> Result<()> {
        if rom >= config.count {
            return Err(Error::InvalidRom);
        }
        config.current_rom = rom;
        self.persist(config)
    }

    /// Configure the slot forced by the strap pin, and whether the strap is
    /// honored at all.
    pub fn set_gpio_rom(&self, config: &mut BootConfig, rom: u8, enable: bool) -> Result<()> {
        if rom >= config.count {
            return Err(Error::InvalidRom);
        }
        config.gpio_rom = rom;
        config.mode.set(Mode::GPIO_ROM, enable);
        self.persist(config)
    }
}
