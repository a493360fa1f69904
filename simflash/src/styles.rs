//! Flash styles
//!
//! The part sizes found on the boards these images run on.  All of them read
//! at any alignment, write in words, and erase 4k sectors.  Each device
//! is built with a boot header at offset 0 describing its size, the way the
//! first-stage image records it.

use crate::Result;
use crate::SimFlash;

/// The configuration of a flash device.
pub struct AreaLayout {
    pub read_size: usize,
    pub write_size: usize,
    pub erase_size: usize,
    pub sectors: usize,
    /// Size code stored in the high nibble of the header size/speed byte.
    pub size_code: u8,
}

impl AreaLayout {
    pub fn build(&self) -> Result<SimFlash> {
        let mut flash = SimFlash::new(
            self.read_size,
            self.write_size,
            self.erase_size,
            self.sectors,
        )?;
        // QIO at 40 MHz, no sections.
        flash.install(&[0xe9, 0x00, 0x00, self.size_code << 4, 0, 0, 0, 0], 0)?;
        Ok(flash)
    }

    pub fn capacity(&self) -> usize {
        self.erase_size * self.sectors
    }
}

/// 2 Mbit, the smallest modules.
pub static SPI_256K: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 4,
    erase_size: 4 * 1024,
    sectors: 64,
    size_code: 1,
};

/// 4 Mbit, as on the original ESP-01.
pub static SPI_512K: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 4,
    erase_size: 4 * 1024,
    sectors: 128,
    size_code: 0,
};

/// 8 Mbit.
pub static SPI_1M: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 4,
    erase_size: 4 * 1024,
    sectors: 256,
    size_code: 2,
};

/// 32 Mbit, as on ESP-12 modules.  Only the first 8 Mbit is used unless
/// built for big flash.
pub static SPI_4M: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 4,
    erase_size: 4 * 1024,
    sectors: 1024,
    size_code: 4,
};

/// All of the flash devices.
pub static ALL_FLASHES: [&'static AreaLayout; 4] = [&SPI_256K, &SPI_512K, &SPI_1M, &SPI_4M];

/// An iterator that builds each of the devices in turn.
pub fn all_flashes() -> impl Iterator<Item = Result<SimFlash>> {
    ALL_FLASHES.iter().map(|layout| layout.build())
}
