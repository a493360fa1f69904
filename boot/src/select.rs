//! Boot slot selection.
//!
//! The selector runs once, at power on.  It walks a small state machine:
//!
//! - Init: load the configuration.  A strap pin held low in GPIO mode forces
//!   `gpio_rom`, with no fallback.  An out of range `current_rom` is reset to
//!   slot 0, and this repair is written out immediately.
//! - Probe: validate the image in the candidate slot.
//! - Advance: step back to the previous slot (wrapping), until every slot has
//!   been tried once.
//! - Persist: record the winner as `current_rom` if it changed, or the
//!   configuration is otherwise stale.
//!
//! The configuration is never written while images are being validated.

use core::cell::RefCell;

use embedded_hal::digital::v2::InputPin;
use storage::Flash;

use crate::config::{BootConfig, ConfigStore, Mode, MAX_ROMS};
use crate::geometry::{FlashGeometry, HeaderGeometry};
use crate::image;
use crate::{Error, Result};

/// How the winning slot was arrived at.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootSource {
    /// The slot named by `current_rom`.
    Config,
    /// `current_rom` was out of range, and slot 0 was used instead.
    Repaired,
    /// An earlier candidate was bad, and this is a previous slot.
    Fallback,
    /// Forced by the strap pin.
    Gpio,
}

/// What happened to the stored configuration after the winner was found.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConfigUpdate {
    Unchanged,
    Written,
    /// The write was attempted, and failed.  The boot goes ahead anyway.
    Failed,
}

/// The result of a successful selection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootTarget {
    /// Index of the winning slot.
    pub rom: u8,
    /// Address to transfer control to.
    pub entry: u32,
    pub source: BootSource,
    pub config: ConfigUpdate,
}

enum State {
    Init,
    Probe(u8),
    Advance(u8),
    Persist { rom: u8, entry: u32 },
    Fail(Error),
}

pub struct BootSelector<'f, F, G, P> {
    flash: &'f RefCell<F>,
    geometry: G,
    strap: P,
    attempts: heapless::Vec<u8, MAX_ROMS>,
}

impl<'f, F, G, P> BootSelector<'f, F, G, P>
where
    F: Flash,
    G: FlashGeometry,
    P: InputPin,
{
    pub fn new(flash: &'f RefCell<F>, geometry: G, strap: P) -> Self {
        BootSelector {
            flash,
            geometry,
            strap,
            attempts: heapless::Vec::new(),
        }
    }

    /// Give back the geometry and strap pin.
    pub fn release(self) -> (G, P) {
        (self.geometry, self.strap)
    }

    /// Slots probed by the last `select`, in order.
    pub fn attempts(&self) -> &[u8] {
        &self.attempts
    }

    /// Print what is known about this device.
    pub fn banner(&mut self) {
        let info = HeaderGeometry::new(self.flash).info();
        info!("Boot selector v{}", crate::VERSION);
        info!("Flash Size:   {}", self.geometry.flash_size().name());
        info!("Flash Mode:   {}", info.mode.name());
        info!("Flash Speed:  {}", info.speed.name());
        #[cfg(feature = "big-flash")]
        info!("Option: Big flash");
        #[cfg(feature = "config-checksum")]
        info!("Option: Config chksum");
    }

    /// The strap selects when pulled low.  A pin that cannot be read does not
    /// select.
    fn strap_selected(&mut self) -> bool {
        match self.strap.is_low() {
            Ok(low) => low,
            Err(_) => {
                warn!("Unable to read boot strap");
                false
            }
        }
    }

    /// Find a bootable slot.  On success, the configuration has been updated
    /// to record it.  Errors are `GpioBootFailed` when the forced slot is bad,
    /// and `NoImage` once every slot has been tried.
    pub fn select(&mut self) -> Result<BootTarget> {
        self.attempts.clear();

        let store = ConfigStore::new(self.flash);
        let mut config: BootConfig = store.load(&mut self.geometry);

        let mut gpio = false;
        let mut repaired = false;
        // The stored record no longer matches `config`.
        let mut dirty = false;
        let mut visited = 0usize;

        let mut state = State::Init;
        loop {
            state = match state {
                State::Init => {
                    if config.mode.contains(Mode::GPIO_ROM) && self.strap_selected() {
                        info!("Booting GPIO-selected.");
                        gpio = true;
                        if config.gpio_rom < config.count {
                            State::Probe(config.gpio_rom)
                        } else {
                            error!("GPIO rom {} is not configured.", config.gpio_rom);
                            State::Fail(Error::GpioBootFailed)
                        }
                    } else if config.current_rom >= config.count {
                        warn!("Invalid rom selected, defaulting.");
                        config.current_rom = 0;
                        repaired = true;
                        // Valid on its own, whatever the search finds.
                        if store.persist(&mut config).is_err() {
                            error!("Unable to write boot config");
                            dirty = true;
                        }
                        State::Probe(0)
                    } else {
                        State::Probe(config.current_rom)
                    }
                }
                State::Probe(rom) => {
                    visited += 1;
                    let _ = self.attempts.push(rom);
                    // Candidates are below `count`, which a loaded config
                    // keeps within MAX_ROMS.
                    let offset = config.roms[rom as usize];
                    match image::validate(self.flash, offset) {
                        Ok(entry) => State::Persist { rom, entry },
                        Err(_) => {
                            warn!("Rom {} is bad.", rom);
                            if gpio {
                                error!("GPIO boot failed.");
                                State::Fail(Error::GpioBootFailed)
                            } else {
                                dirty = true;
                                State::Advance(rom)
                            }
                        }
                    }
                }
                State::Advance(rom) => {
                    let count = config.count as usize;
                    if visited >= count {
                        error!("No good rom available.");
                        State::Fail(Error::NoImage)
                    } else {
                        State::Probe(((rom as usize + count - 1) % count) as u8)
                    }
                }
                State::Persist { rom, entry } => {
                    let update = if dirty || rom != config.current_rom {
                        config.current_rom = rom;
                        match store.persist(&mut config) {
                            Ok(()) => ConfigUpdate::Written,
                            Err(_) => {
                                error!("Unable to write boot config");
                                ConfigUpdate::Failed
                            }
                        }
                    } else {
                        ConfigUpdate::Unchanged
                    };

                    let source = if gpio {
                        BootSource::Gpio
                    } else if visited > 1 {
                        BootSource::Fallback
                    } else if repaired {
                        BootSource::Repaired
                    } else {
                        BootSource::Config
                    };

                    info!("Booting rom {}.", rom);
                    return Ok(BootTarget {
                        rom,
                        entry,
                        source,
                        config: update,
                    });
                }
                State::Fail(e) => return Err(e),
            };
        }
    }
}
