//! Inclusive cache protocol
//!
//! An inclusive level holds a copy of every block cached above it.
//! Blocks are fetched and written back byte by byte through the regular
//! access path of the level below, and evicting a block back-invalidates
//! it from the levels above.

use super::cache::Block;
use super::hierarchy::{CacheHierarchy, CacheId};
use super::BackingStore;
use crate::error::MemoryError;
use crate::error::SimulatorResult;

impl<S: BackingStore> CacheHierarchy<S> {
    /// Fetch the block holding `address` from the next level,
    /// or from the backing store if `id` is the last level
    pub(super) fn fetch_block_inclusive(
        &mut self,
        id: CacheId,
        address: u32,
        track: bool,
    ) -> Block {
        let cache = self.cache(id);
        let begin = cache.block_begin(address);
        let block_size = cache.get_block_size();
        let lower = cache.lower;

        let data = match lower {
            Some(lower) => (0..block_size)
                .map(|i| self.get_byte(lower, begin + i as u32, track))
                .collect(),
            None => self.store.read_block_uncached(begin, block_size),
        };

        let cache = self.cache(id);
        cache.make_block(address, data, cache.history.num_access)
    }

    /// Store every byte of a block into the next level
    pub(super) fn write_block_bytes(
        &mut self,
        id: CacheId,
        block: &Block,
        track: bool,
    ) {
        let cache = self.cache(id);
        let begin = cache.get_address(block);
        let lower = cache.lower;

        match lower {
            Some(lower) => {
                for (i, byte) in block.data.iter().enumerate() {
                    self.set_byte(lower, begin + i as u32, *byte, track);
                }
            }
            None => self.store.write_block_uncached(begin, &block.data),
        }
    }

    /// Remove the block at `address` of `id` from every level above
    /// that holds part of it. Higher levels may use narrower blocks,
    /// so each of them drops every block inside that range.
    /// Dirty data in those levels is dropped, not written down
    pub(super) fn back_invalidate(&mut self, id: CacheId, address: u32) {
        let range = self.cache(id).get_block_size();
        let mut current = self.cache(id).higher;
        while let Some(level) = current {
            let cache = self.cache_mut(level);
            let mut found = false;
            for offset in (0..range).step_by(cache.get_block_size()) {
                let sub_address = address.wrapping_add(offset as u32);
                if let Some(i) = cache.lookup(sub_address) {
                    log::debug!(
                        "back-invalidate {:#010x} from cache {}{}",
                        sub_address,
                        level.index(),
                        if cache.blocks[i].dirty { " (dirty)" } else { "" }
                    );
                    cache.reset_block(i);
                    found = true;
                }
            }
            // Levels further up only cache what this one holds
            if !found {
                break;
            }
            current = cache.higher;
        }
    }

    /// Check that every block cached at some level of the chain
    /// starting at `top` is also cached at every level below it
    pub fn verify_inclusiveness(&self, top: CacheId) -> SimulatorResult<()> {
        let levels = self.levels(top);
        for (k, &level) in levels.iter().enumerate() {
            for address in self.cache(level).valid_addresses() {
                for (k2, &lower) in levels.iter().enumerate().skip(k + 1) {
                    if !self.cache(lower).is_in_cache(address) {
                        return Err(MemoryError::CacheInconsistency(
                            k2,
                            format!(
                                "Cache level {} does not contain address {:#010x} found in level {}",
                                k2, address, k
                            ),
                        )
                        .into());
                    }
                }
            }
        }
        Ok(())
    }
}
