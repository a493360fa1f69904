//! Image generation.
//!
//! Builds images in either header format, filled with reproducible random
//! data, so tests can install them in a simulated flash.

use std::ops::Range;

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

use anyhow::{anyhow, Result};

const ROM_MAGIC: u8 = 0xe9;
const CONTAINER_MAGIC: u8 = 0xea;
const CONTAINER_MARKER: u8 = 0x04;
const CHECKSUM_INIT: u8 = 0xef;

/// Load address of the first section.  Later sections follow.
const SECTION_BASE: u32 = 0x4010_0000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Format {
    /// A plain header, followed by the sections.
    Plain,
    /// A container header and a skipped block ahead of the plain image.
    Container,
}

pub struct GeneratedImage {
    pub data: Vec<u8>,
    /// Offset, from the start of `data`, of the address the image boots from.
    pub entry_offset: usize,
    /// Where each section's data lies within `data`.
    pub sections: Vec<Range<usize>>,
    /// Offset of the checksum trailer within `data`.
    pub trailer: usize,
}

pub struct GenBuilder {
    format: Format,
    /// Size of each section, in order.
    sections: Vec<usize>,
    /// Size of the block skipped by a container header.
    container_len: usize,
    /// Seed for the PRNG
    seed: usize,
    /// Entry point written into the header.
    entry: u32,
}

impl Default for GenBuilder {
    fn default() -> Self {
        GenBuilder {
            format: Format::Plain,
            sections: vec![1_372, 7_153, 261],
            container_len: 0x1000,
            seed: 1,
            entry: 0x4010_0004,
        }
    }
}

impl GenBuilder {
    pub fn format(&mut self, format: Format) -> &mut Self {
        self.format = format;
        self
    }

    pub fn sections(&mut self, sections: &[usize]) -> &mut Self {
        self.sections = sections.to_vec();
        self
    }

    pub fn container_len(&mut self, len: usize) -> &mut Self {
        self.container_len = len;
        self
    }

    pub fn seed(&mut self, seed: usize) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> Result<GeneratedImage> {
        let count = u8::try_from(self.sections.len())
            .map_err(|_| anyhow!("Too many sections: {}", self.sections.len()))?;
        let container_len = u32::try_from(self.container_len)
            .map_err(|_| anyhow!("Container too large"))?;

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed as u64);
        let mut data = Vec::new();

        if self.format == Format::Container {
            data.extend_from_slice(&[CONTAINER_MAGIC, CONTAINER_MARKER, 0, 0]);
            data.extend_from_slice(&self.entry.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&container_len.to_le_bytes());
            let mut block = vec![0u8; self.container_len];
            rng.fill_bytes(&mut block);
            data.extend_from_slice(&block);
        }
        let entry_offset = data.len();

        data.extend_from_slice(&[ROM_MAGIC, count, 0, 0]);
        data.extend_from_slice(&self.entry.to_le_bytes());

        let mut sum = CHECKSUM_INIT;
        let mut sections = Vec::new();
        let mut dest = SECTION_BASE;
        for &len in &self.sections {
            let len32 = u32::try_from(len).map_err(|_| anyhow!("Section too large"))?;
            data.extend_from_slice(&dest.to_le_bytes());
            data.extend_from_slice(&len32.to_le_bytes());

            let mut payload = vec![0u8; len];
            rng.fill_bytes(&mut payload);
            sum = payload.iter().fold(sum, |acc, b| acc ^ b);

            let start = data.len();
            data.extend_from_slice(&payload);
            sections.push(start..data.len());
            dest = dest.wrapping_add(len32.next_multiple_of(0x1000));
        }

        // Pad out the block, the last byte of it is the checksum.
        let trailer = data.len() | 0x0f;
        data.resize(trailer, 0);
        data.push(sum);

        Ok(GeneratedImage {
            data,
            entry_offset,
            sections,
            trailer,
        })
    }
}
