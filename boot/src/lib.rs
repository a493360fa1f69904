//! This is a basic boot selector built for embedded rust.
//!
//! Several firmware images live in raw flash, each in its own slot.  At power
//! on, the selector reads the persisted boot configuration, picks a slot
//! (possibly forced by a strap pin), verifies the image there, and falls back
//! to the previous slots when it is bad.  The winning entry address is handed
//! back to the caller, which is responsible for transferring control to it.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[macro_use]
mod log;

pub mod checksum;
pub mod config;
pub mod geometry;
pub mod image;
pub mod select;

pub use config::{BootConfig, ConfigStore, Mode};
pub use geometry::{FixedGeometry, FlashGeometry, FlashSize, HeaderGeometry};
pub use image::{validate, Image};
pub use select::{BootSelector, BootSource, BootTarget, ConfigUpdate};

pub type Result<T> = core::result::Result<T, Error>;

// Use the error kind to avoid this depending on the particular flash.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    Flash(storage::Error),
    /// Header magic unrecognized, or a header field that cannot be right.
    InvalidImage,
    /// Image content does not match its checksum trailer.
    BadChecksum,
    /// A slot index that is not part of the configuration.
    InvalidRom,
    /// Every configured slot was tried, and none was valid.
    NoImage,
    /// The slot forced by the strap pin was not valid.
    GpioBootFailed,
}

/// Convert the flash error into our error type.
impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Flash(e)
    }
}

/// Version reported in the console banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
