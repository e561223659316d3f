//! Exclusive cache protocol
//!
//! A block lives in at most one level at a time:
//! a miss moves the block up from wherever it is found,
//! and an eviction moves it one level down, possibly
//! pushing a displaced block further down the chain.

use super::cache::Block;
use super::hierarchy::{CacheHierarchy, CacheId};
use super::BackingStore;
use crate::error::MemoryError;
use crate::error::SimulatorResult;

impl<S: BackingStore> CacheHierarchy<S> {
    /// Essentially we're moving the block
    /// all the way up to the top
    pub(super) fn fetch_block_exclusive(
        &mut self,
        id: CacheId,
        address: u32,
        track: bool,
    ) -> Block {
        let mut found = None;
        let mut current = self.cache(id).lower;
        while let Some(level) = current {
            let hit_latency = self.cache(level).policy.hit_latency;
            self.cache_mut(id).charge_cycles(track, hit_latency);

            let cache = self.cache_mut(level);
            cache.record_access(false);
            if let Some(hit_index) = cache.lookup(address) {
                cache.record_hit();
                // Clear up the block in the lower level
                found = Some(cache.blocks[hit_index].clone());
                cache.reset_block(hit_index);
                log::debug!(
                    "move {:#010x} up from cache {} to cache {}",
                    address,
                    level.index(),
                    id.index()
                );
                break;
            }
            cache.record_miss();
            current = cache.lower;
        }

        let cache = self.cache(id);
        let stamp = cache.history.num_access;
        match found {
            Some(moved) => {
                let mut block = cache.transformed_block(&moved, address);
                block.last_access = stamp;
                block
            }
            None => {
                let begin = cache.block_begin(address);
                let data = self.store.read_block_uncached(begin, cache.get_block_size());
                cache.make_block(address, data, stamp)
            }
        }
    }

    /// Install an evicted block one level down.
    /// A valid block displaced there keeps moving down
    /// until a free slot or the backing store is reached
    pub(super) fn move_block_down(&mut self, id: CacheId, block: Block, track: bool) {
        let mut from = id;
        let mut address = self.cache(id).get_address(&block);
        let mut carried = block;

        loop {
            let Some(lower) = self.cache(from).lower else {
                // Only modified data needs to reach memory
                if carried.dirty {
                    self.store.write_block_uncached(address, &carried.data);
                }
                break;
            };

            let slot = self.find_replaced_block(lower, address);
            let cache = self.cache_mut(lower);
            cache.record_access(false);
            let mut incoming = cache.transformed_block(&carried, address);
            incoming.valid = true;
            incoming.last_access = cache.history.num_access;
            let displaced = std::mem::replace(&mut cache.blocks[slot], incoming);
            if !displaced.valid {
                break;
            }

            address = cache.get_address(&displaced);
            log::debug!(
                "move {:#010x} down from cache {} to cache {}",
                address,
                lower.index(),
                cache.lower.map_or("memory".to_string(), |l| l.index().to_string())
            );
            self.cache_mut(from).charge_miss(track);
            carried = displaced;
            from = lower;
        }
    }

    /// Check that no block is cached at two levels
    /// of the chain starting at `top`
    pub fn verify_exclusiveness(&self, top: CacheId) -> SimulatorResult<()> {
        let levels = self.levels(top);
        for (k, &level) in levels.iter().enumerate() {
            for address in self.cache(level).valid_addresses() {
                for (k2, &lower) in levels.iter().enumerate().skip(k + 1) {
                    if self.cache(lower).is_in_cache(address) {
                        return Err(MemoryError::CacheInconsistency(
                            k2,
                            format!(
                                "Address {:#010x} is cached in both level {} and level {}",
                                address, k, k2
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
