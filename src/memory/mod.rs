//! Memory structure

pub mod cache;
pub mod exclusive;
pub mod hierarchy;
pub mod inclusive;
pub mod mmu;

use serde::Deserialize;

/// Uncached byte storage that sits below the last cache level
pub trait BackingStore {
    /// Check if the page holding the given address is allocated
    fn page_exists(&self, address: u32) -> bool;

    /// Make sure the page holding the given address exists, zero-filled.
    /// Returns true iff a new page was allocated
    fn allocate_page(&mut self, address: u32) -> bool;

    fn read_byte_uncached(&self, address: u32) -> u8;

    fn write_byte_uncached(&mut self, address: u32, value: u8);

    /// Read `len` consecutive bytes starting at `begin`
    fn read_block_uncached(&self, begin: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.read_byte_uncached(begin.wrapping_add(i as u32)))
            .collect()
    }

    /// Write a whole block starting at `begin`
    fn write_block_uncached(&mut self, begin: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.write_byte_uncached(begin.wrapping_add(i as u32), *byte);
        }
    }
}

/// Reference: <https://inst.eecs.berkeley.edu/~cs61c/su20/pdfs/lectures/lec15.pdf>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteHitPolicy {
    WriteBack,
    WriteThrough,
}

impl Default for WriteHitPolicy {
    fn default() -> Self {
        WriteHitPolicy::WriteBack
    }
}

/// Reference: <https://inst.eecs.berkeley.edu/~cs61c/su20/pdfs/lectures/lec15.pdf>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMissPolicy {
    WriteAllocate,
    WriteNoAllocate,
}

impl Default for WriteMissPolicy {
    fn default() -> Self {
        WriteMissPolicy::WriteAllocate
    }
}

/// Whether a level keeps a copy of everything cached above it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InclusionPolicy {
    #[default]
    Inclusive,
    Exclusive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
}
