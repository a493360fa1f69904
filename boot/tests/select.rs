// Slot selection testing.

use std::cell::RefCell;

use boot::config::{BootConfig, ConfigStore};
use boot::{BootSelector, BootSource, ConfigUpdate, Error, HeaderGeometry, Mode};
use embedded_hal_mock::pin::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
use simflash::gen::{Format, GenBuilder};
use simflash::{styles, Access, SimFlash};

const SLOTS: [u32; 4] = [0x2000, 0x40000, 0x80000, 0xc0000];

fn install(flash: &RefCell<SimFlash>, offset: u32, seed: usize) {
    let img = GenBuilder::default().seed(seed).build().unwrap();
    flash.borrow_mut().install(&img.data, offset as usize).unwrap();
}

/// Store a configuration describing the first `count` of `SLOTS`.
fn configure(flash: &RefCell<SimFlash>, count: u8, current: u8) -> BootConfig {
    let mut config = BootConfig::default_for(0x100000);
    config.count = count;
    config.current_rom = current;
    config.roms = SLOTS;
    ConfigStore::new(flash).persist(&mut config).unwrap();
    flash.borrow_mut().clear_log();
    config
}

fn stored(flash: &RefCell<SimFlash>) -> BootConfig {
    ConfigStore::new(flash).read().unwrap().unwrap()
}

fn no_strap() -> PinMock {
    let none: [PinTransaction; 0] = [];
    PinMock::new(&none)
}

fn config_writes(flash: &RefCell<SimFlash>) -> usize {
    flash
        .borrow()
        .log()
        .iter()
        .filter(|a| matches!(a, Access::Write { .. } | Access::Erase { .. }))
        .count()
}

#[test]
fn fresh_device() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    install(&flash, 0x2000, 1);
    install(&flash, 0x82000, 2);

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    sel.banner();
    let target = sel.select().unwrap();
    assert_eq!(target.rom, 0);
    assert_eq!(target.entry, 0x2000);
    assert_eq!(target.source, BootSource::Config);
    assert_eq!(target.config, ConfigUpdate::Unchanged);
    assert_eq!(sel.attempts(), &[0]);

    // The default config was written, sized from the header at offset 0.
    let config = stored(&flash);
    assert_eq!(config.roms(), &[0x2000, 0x82000]);
    assert_eq!(flash.borrow().erases(), vec![0x1000..0x2000]);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn current_rom_kept() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 3, 2);
    for (i, slot) in SLOTS[..3].iter().enumerate() {
        install(&flash, *slot, i);
    }

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    let target = sel.select().unwrap();
    assert_eq!(target.rom, 2);
    assert_eq!(target.entry, SLOTS[2]);
    assert_eq!(target.config, ConfigUpdate::Unchanged);
    assert_eq!(config_writes(&flash), 0);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn out_of_range_current() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 2, 7);
    install(&flash, SLOTS[0], 1);
    install(&flash, SLOTS[1], 2);

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    let target = sel.select().unwrap();
    assert_eq!(target.rom, 0);
    assert_eq!(target.source, BootSource::Repaired);
    assert_eq!(sel.attempts(), &[0]);
    assert_eq!(stored(&flash).current_rom, 0);

    // Written once, for the repair.
    assert_eq!(flash.borrow().erases().len(), 1);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn repair_kept_when_nothing_boots() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 2, 2);

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    assert_eq!(sel.select(), Err(Error::NoImage));
    assert_eq!(sel.attempts(), &[0, 1]);
    assert_eq!(stored(&flash).current_rom, 0);
    assert_eq!(flash.borrow().erases().len(), 1);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn fallback_to_previous() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 3, 0);
    install(&flash, SLOTS[1], 4);
    // Slot 2 holds a damaged image.
    install(&flash, SLOTS[2], 5);
    flash.borrow_mut().corrupt(SLOTS[2] as usize + 100, 0x40);

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    let target = sel.select().unwrap();
    assert_eq!(sel.attempts(), &[0, 2, 1]);
    assert_eq!(target.rom, 1);
    assert_eq!(target.entry, SLOTS[1]);
    assert_eq!(target.source, BootSource::Fallback);
    assert_eq!(target.config, ConfigUpdate::Written);
    assert_eq!(stored(&flash).current_rom, 1);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn every_slot_once() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 4, 2);

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    assert_eq!(sel.select(), Err(Error::NoImage));
    assert_eq!(sel.attempts(), &[2, 1, 0, 3]);
    // A failed search leaves the configuration alone.
    assert_eq!(config_writes(&flash), 0);
    assert_eq!(stored(&flash).current_rom, 2);

    for slot in SLOTS {
        let slot = slot as usize;
        assert!(flash.borrow().was_read(slot..slot + 1));
    }

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn single_slot() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 1, 0);

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    assert_eq!(sel.select(), Err(Error::NoImage));
    assert_eq!(sel.attempts(), &[0]);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn gpio_selected() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    let mut config = configure(&flash, 3, 0);
    ConfigStore::new(&flash).set_gpio_rom(&mut config, 2, true).unwrap();
    flash.borrow_mut().clear_log();
    install(&flash, SLOTS[0], 1);
    install(&flash, SLOTS[2], 3);

    let strap = PinMock::new(&[PinTransaction::get(PinState::Low)]);
    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), strap);
    let target = sel.select().unwrap();
    assert_eq!(target.rom, 2);
    assert_eq!(target.source, BootSource::Gpio);
    assert_eq!(target.config, ConfigUpdate::Written);
    assert_eq!(sel.attempts(), &[2]);
    assert_eq!(stored(&flash).current_rom, 2);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn gpio_failure_no_fallback() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    let mut config = configure(&flash, 3, 0);
    ConfigStore::new(&flash).set_gpio_rom(&mut config, 1, true).unwrap();
    flash.borrow_mut().clear_log();
    // Good images everywhere but the forced slot.
    install(&flash, SLOTS[0], 1);
    install(&flash, SLOTS[2], 3);

    let strap = PinMock::new(&[PinTransaction::get(PinState::Low)]);
    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), strap);
    assert_eq!(sel.select(), Err(Error::GpioBootFailed));
    assert_eq!(sel.attempts(), &[1]);
    assert_eq!(config_writes(&flash), 0);
    assert!(!flash.borrow().was_read(SLOTS[0] as usize..SLOTS[0] as usize + 1));
    assert!(!flash.borrow().was_read(SLOTS[2] as usize..SLOTS[2] as usize + 1));

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn gpio_strap_released() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    let mut config = configure(&flash, 2, 0);
    ConfigStore::new(&flash).set_gpio_rom(&mut config, 1, true).unwrap();
    install(&flash, SLOTS[0], 1);

    let strap = PinMock::new(&[PinTransaction::get(PinState::High)]);
    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), strap);
    let target = sel.select().unwrap();
    assert_eq!(target.rom, 0);
    assert_eq!(target.source, BootSource::Config);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn gpio_mode_off_ignores_strap() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    let mut config = configure(&flash, 2, 0);
    config.gpio_rom = 1;
    assert!(!config.mode.contains(Mode::GPIO_ROM));
    ConfigStore::new(&flash).persist(&mut config).unwrap();
    install(&flash, SLOTS[0], 1);
    install(&flash, SLOTS[1], 2);

    // Any read of the pin would fail `done`.
    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    assert_eq!(sel.select().unwrap().rom, 0);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn gpio_rom_unconfigured() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    let mut config = configure(&flash, 2, 0);
    config.gpio_rom = 3;
    config.mode = Mode::GPIO_ROM;
    ConfigStore::new(&flash).persist(&mut config).unwrap();
    install(&flash, SLOTS[0], 1);

    let strap = PinMock::new(&[PinTransaction::get(PinState::Low)]);
    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), strap);
    assert_eq!(sel.select(), Err(Error::GpioBootFailed));
    assert!(sel.attempts().is_empty());

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn persist_failure_still_boots() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 2, 0);
    install(&flash, SLOTS[1], 2);
    flash.borrow_mut().fail_write(true);

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    let target = sel.select().unwrap();
    assert_eq!(target.rom, 1);
    assert_eq!(target.config, ConfigUpdate::Failed);

    let (_, mut strap) = sel.release();
    strap.done();
}

#[test]
fn container_image_entry() {
    let flash = RefCell::new(styles::SPI_1M.build().unwrap());
    configure(&flash, 2, 1);
    let img = GenBuilder::default()
        .format(Format::Container)
        .container_len(0x7f0)
        .build()
        .unwrap();
    flash.borrow_mut().install(&img.data, SLOTS[1] as usize).unwrap();

    let mut sel = BootSelector::new(&flash, HeaderGeometry::new(&flash), no_strap());
    let target = sel.select().unwrap();
    assert_eq!(target.rom, 1);
    assert_eq!(target.entry, SLOTS[1] + 0x800);

    let (_, mut strap) = sel.release();
    strap.done();
}
