//! Backing store implemented
//! with a two-level page table

use super::BackingStore;
use crate::error::MemoryError;

const WORD_WIDTH: usize = 32;
const FIRST_LEVEL_WIDTH: usize = 10;
const SECOND_LEVEL_WIDTH: usize = 10;
const PAGE_WIDTH: usize = 12;

const FIRST_LEVEL_SIZE: usize = 1 << FIRST_LEVEL_WIDTH;
const SECOND_LEVEL_SIZE: usize = 1 << SECOND_LEVEL_WIDTH;
pub const PAGE_SIZE: usize = 1 << PAGE_WIDTH;

// Defines page type
type PageType = Box<[u8; PAGE_SIZE]>;

/// Memory management unit
pub struct MMU {
    // data[x][y][z] stores the byte at (x << 22) | (y << 12) | z
    // Allocate stuff lazily
    data: Vec<Option<Vec<Option<PageType>>>>,
    num_pages: usize,
}

impl Default for MMU {
    fn default() -> Self {
        Self::make()
    }
}

impl MMU {
    /// Make a new MMU with no page allocated
    pub fn make() -> Self {
        Self { data: vec![None; FIRST_LEVEL_SIZE], num_pages: 0 }
    }

    /// The first-level index of the address
    pub fn get_first_level_index(address: u32) -> usize {
        (address >> (WORD_WIDTH - FIRST_LEVEL_WIDTH)) as usize
    }
    /// The second-level index of the address
    pub fn get_second_level_index(address: u32) -> usize {
        ((address >> (WORD_WIDTH - FIRST_LEVEL_WIDTH - SECOND_LEVEL_WIDTH))
            & ((SECOND_LEVEL_SIZE - 1) as u32)) as usize
    }
    /// The page offset
    pub fn get_page_offset(address: u32) -> usize {
        (address & ((PAGE_SIZE - 1) as u32)) as usize
    }

    /// Number of pages allocated so far
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    fn page(&self, address: u32) -> Option<&PageType> {
        let (i, j) = (
            Self::get_first_level_index(address),
            Self::get_second_level_index(address),
        );
        self.data[i].as_ref().and_then(|second_level| second_level[j].as_ref())
    }

    fn page_mut(&mut self, address: u32) -> Option<&mut PageType> {
        let (i, j) = (
            Self::get_first_level_index(address),
            Self::get_second_level_index(address),
        );
        self.data[i]
            .as_mut()
            .and_then(|second_level| second_level[j].as_mut())
    }

    /// Set the byte at the given address
    pub fn set8(&mut self, address: u32, byte: u8) -> Result<(), MemoryError> {
        let page = self
            .page_mut(address)
            .ok_or(MemoryError::PageNotAllocated(address))?;
        page[Self::get_page_offset(address)] = byte;
        Ok(())
    }

    /// Get the byte at the given address
    pub fn get8(&self, address: u32) -> Result<u8, MemoryError> {
        let page =
            self.page(address).ok_or(MemoryError::PageNotAllocated(address))?;
        Ok(page[Self::get_page_offset(address)])
    }
}

impl BackingStore for MMU {
    fn page_exists(&self, address: u32) -> bool {
        self.page(address).is_some()
    }

    fn allocate_page(&mut self, address: u32) -> bool {
        let (i, j) = (
            Self::get_first_level_index(address),
            Self::get_second_level_index(address),
        );

        // Allocate the second level if it doesn't exist
        let second_level =
            self.data[i].get_or_insert_with(|| vec![None; SECOND_LEVEL_SIZE]);

        // Allocate the page if it doesn't exist
        if second_level[j].is_none() {
            second_level[j] = Some(Box::new([0; PAGE_SIZE]));
            self.num_pages += 1;
            true
        } else {
            false
        }
    }

    /// Unmapped bytes read as zero; allocating pages is the driver's job
    fn read_byte_uncached(&self, address: u32) -> u8 {
        self.get8(address).unwrap_or_else(|e| {
            log::warn!("uncached read: {}", e);
            0
        })
    }

    fn write_byte_uncached(&mut self, address: u32, value: u8) {
        if let Err(e) = self.set8(address, value) {
            log::warn!("uncached write dropped: {}", e);
        }
    }
}
