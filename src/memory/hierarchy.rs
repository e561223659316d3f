//! Multi-level cache hierarchy
//!
//! Every cache level (victim buffers included) lives in one arena
//! owned by [`CacheHierarchy`], together with the backing store.
//! Levels refer to each other through [`CacheId`] handles:
//! a level's `lower` neighbour serves its misses,
//! its `higher` neighbour is back-invalidated on inclusive evictions.

use super::cache::{Block, Cache, CachePolicy};
use super::{BackingStore, WriteHitPolicy, WriteMissPolicy};
use crate::error::ConfigError;

/// Handle of a cache level inside a [`CacheHierarchy`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(usize);

impl CacheId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Arena of cache levels sharing one backing store
pub struct CacheHierarchy<S: BackingStore> {
    caches: Vec<Cache>,
    pub store: S,
}

impl<S: BackingStore> CacheHierarchy<S> {
    pub fn new(store: S) -> Self {
        Self { caches: Vec::new(), store }
    }

    /// Create a new, unlinked cache level
    pub fn add_cache(
        &mut self,
        policy: CachePolicy,
    ) -> Result<CacheId, ConfigError> {
        let cache = Cache::make(policy)?;
        self.caches.push(cache);
        Ok(CacheId(self.caches.len() - 1))
    }

    pub fn cache(&self, id: CacheId) -> &Cache {
        &self.caches[id.0]
    }

    pub(crate) fn cache_mut(&mut self, id: CacheId) -> &mut Cache {
        &mut self.caches[id.0]
    }

    /// Make `lower` serve the misses of `upper`.
    /// `upper` inherits its miss latency from the hit latency of `lower`
    pub fn set_lower_cache(
        &mut self,
        upper: CacheId,
        lower: CacheId,
    ) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            ConfigError::InvalidLink(lower.0, upper.0, reason.to_string())
        };
        if upper == lower || self.levels(lower).contains(&upper) {
            return Err(invalid("the chain would contain a cycle"));
        }
        if self.is_victim(upper) || self.is_victim(lower) {
            return Err(invalid("victim buffers cannot be chained"));
        }
        let (upper_cache, lower_cache) = (self.cache(upper), self.cache(lower));
        if upper_cache.lower.is_some() {
            return Err(invalid("the upper level already has a lower level"));
        }
        if lower_cache.higher.is_some_and(|higher| higher != upper) {
            return Err(invalid("the lower level already serves another level"));
        }
        if (upper_cache.is_exclusive() || lower_cache.is_exclusive())
            && upper_cache.get_block_size() != lower_cache.get_block_size()
        {
            return Err(invalid("exclusive levels must share one block size"));
        }
        // A wider block would be fetched across several lower blocks,
        // which the lower level may evict while the fetch is running
        if upper_cache.get_block_size() > lower_cache.get_block_size() {
            return Err(invalid("blocks cannot be wider than the lower level's"));
        }

        let hit_latency = lower_cache.policy.hit_latency;
        let upper_cache = self.cache_mut(upper);
        upper_cache.lower = Some(lower);
        upper_cache.miss_latency = hit_latency;
        self.cache_mut(lower).higher = Some(upper);
        Ok(())
    }

    /// Attach a fully-associative victim buffer to `id`
    pub fn set_victim(
        &mut self,
        id: CacheId,
        victim: CacheId,
    ) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            ConfigError::InvalidVictim(victim.0, id.0, reason.to_string())
        };
        let (cache, victim_cache) = (self.cache(id), self.cache(victim));
        if id == victim
            || victim_cache.lower.is_some()
            || victim_cache.higher.is_some()
            || victim_cache.victim.is_some()
        {
            return Err(invalid("it is already part of a hierarchy"));
        }
        if victim_cache.policy.num_sets() != 1 {
            return Err(invalid("it is not fully associative"));
        }
        if victim_cache.get_block_size() != cache.get_block_size() {
            return Err(invalid("block sizes differ"));
        }
        self.cache_mut(id).victim = Some(victim);
        Ok(())
    }

    fn is_victim(&self, id: CacheId) -> bool {
        self.caches.iter().any(|cache| cache.victim == Some(id))
    }

    /// The chain of levels starting at `top`, from highest to lowest
    pub fn levels(&self, top: CacheId) -> Vec<CacheId> {
        let mut levels = vec![top];
        let mut current = self.cache(top).lower;
        while let Some(level) = current {
            levels.push(level);
            current = self.cache(level).lower;
        }
        levels
    }

    /// Read a byte through the level `id`.
    /// Passing `Some` turns on cycle accounting,
    /// and the cycles this access costs are added to it
    pub fn read_byte(
        &mut self,
        id: CacheId,
        address: u32,
        cycles: &mut Option<u64>,
    ) -> u8 {
        let before = self.get_total_cycles(id);
        let value = self.get_byte(id, address, cycles.is_some());
        if let Some(cycles) = cycles {
            *cycles += self.get_total_cycles(id) - before;
        }
        value
    }

    /// Write a byte through the level `id`.
    /// See [`Self::read_byte`] for `cycles`
    pub fn write_byte(
        &mut self,
        id: CacheId,
        address: u32,
        value: u8,
        cycles: &mut Option<u64>,
    ) {
        let before = self.get_total_cycles(id);
        self.set_byte(id, address, value, cycles.is_some());
        if let Some(cycles) = cycles {
            *cycles += self.get_total_cycles(id) - before;
        }
    }

    /// Cycles spent by the hierarchy rooted at `id`:
    /// its own base and miss cycles,
    /// plus the miss cycles of every level below
    pub fn get_total_cycles(&self, id: CacheId) -> u64 {
        let history = &self.cache(id).history;
        let mut result = history.base_cycles + history.miss_cycles;
        let mut current = self.cache(id).lower;
        while let Some(level) = current {
            result += self.cache(level).history.miss_cycles;
            current = self.cache(level).lower;
        }
        result
    }

    /// Average memory access time of the hierarchy rooted at `top`
    pub fn get_amat(&self, top: CacheId) -> f64 {
        let levels = self.levels(top);
        let Some(&bottom) = levels.last() else {
            return 0.;
        };
        let mut result = self.cache(bottom).miss_latency as f64;
        for &level in levels.iter().rev() {
            let cache = self.cache(level);
            // The victim buffer is only consulted on a miss
            if let Some(victim) = cache.victim {
                let vc = self.cache(victim);
                result =
                    vc.policy.hit_latency as f64 + vc.get_miss_rate() * result;
            }
            result =
                cache.policy.hit_latency as f64 + cache.get_miss_rate() * result;
        }
        result
    }

    pub(crate) fn get_byte(&mut self, id: CacheId, address: u32, track: bool) -> u8 {
        let cache = self.cache_mut(id);
        cache.record_access(track);
        let offset = cache.get_offset(address);

        if let Some(hit_index) = cache.lookup(address) {
            cache.record_hit();
            let stamp = cache.history.num_access;
            let block = &mut cache.blocks[hit_index];
            block.last_access = stamp;
            return block.data[offset];
        }
        cache.record_miss();

        // Served by the victim buffer, which keeps the block
        if let Some(value) = self.read_from_victim(id, address) {
            return value;
        }

        let block = self.fetch_block(id, address, track);
        self.cache_mut(id).charge_miss(track);
        let value = block.data[offset];
        self.replace_block(id, address, block, track);
        value
    }

    pub(crate) fn set_byte(
        &mut self,
        id: CacheId,
        address: u32,
        value: u8,
        track: bool,
    ) {
        let cache = self.cache_mut(id);
        cache.record_access(track);
        let offset = cache.get_offset(address);

        if let Some(hit_index) = cache.lookup(address) {
            cache.record_hit();
            let stamp = cache.history.num_access;
            let block = &mut cache.blocks[hit_index];
            block.last_access = stamp;
            block.dirty = true;
            block.data[offset] = value;

            if cache.policy.write_hit_policy == WriteHitPolicy::WriteThrough {
                let block = cache.blocks[hit_index].clone();
                self.write_through(id, &block, track);
            }
            return;
        }
        cache.record_miss();

        // Whatever the victim buffer holds is about to become stale
        self.invalidate_in_victim(id, address);

        if self.cache(id).policy.write_miss_policy
            == WriteMissPolicy::WriteAllocate
        {
            let mut block = self.fetch_block(id, address, track);
            self.cache_mut(id).charge_miss(track);
            block.data[offset] = value;
            block.dirty = true;
            self.replace_block(id, address, block, track);
        } else {
            self.cache_mut(id).charge_miss(track);
            match self.cache(id).lower {
                Some(lower) => self.set_byte(lower, address, value, track),
                None => self.store.write_byte_uncached(address, value),
            }
        }
    }

    /// Bring the block holding `address` in from below
    fn fetch_block(&mut self, id: CacheId, address: u32, track: bool) -> Block {
        if self.cache(id).is_exclusive() {
            self.fetch_block_exclusive(id, address, track)
        } else {
            self.fetch_block_inclusive(id, address, track)
        }
    }

    /// Write an evicted block to the level below
    fn write_to_next_level(&mut self, id: CacheId, block: Block, track: bool) {
        if self.cache(id).is_exclusive() {
            self.move_block_down(id, block, track);
        } else {
            self.write_block_bytes(id, &block, track);
        }
    }

    /// Propagate a block after a write hit on a write-through level.
    /// An exclusive level writes to the backing store directly,
    /// so it is charged the latency of the bottom level's miss
    /// rather than its own miss latency
    fn write_through(&mut self, id: CacheId, block: &Block, track: bool) {
        let cache = self.cache(id);
        if cache.is_exclusive() {
            // Installing a copy below would break exclusiveness
            let begin = cache.get_address(block);
            let latency = self.memory_latency(id);
            self.store.write_block_uncached(begin, &block.data);
            self.cache_mut(id).charge_cycles(track, latency);
        } else {
            self.write_block_bytes(id, block, track);
            self.cache_mut(id).charge_miss(track);
        }
    }

    /// Miss latency of the last level below `id`, the cost of a store access
    fn memory_latency(&self, id: CacheId) -> u64 {
        let bottom = self.levels(id).last().copied().unwrap_or(id);
        self.cache(bottom).miss_latency
    }

    /// Pick the slot for `address`; inclusive levels back-invalidate
    /// the evicted block from the levels above first
    pub(crate) fn find_replaced_block(&mut self, id: CacheId, address: u32) -> usize {
        let cache = self.cache(id);
        let slot = cache.get_index_to_replace(cache.get_index(address));
        if !cache.is_exclusive() && cache.blocks[slot].valid {
            let evicted = cache.get_address(&cache.blocks[slot]);
            self.back_invalidate(id, evicted);
        }
        slot
    }

    /// Install a fetched block, evicting whatever occupies its slot
    fn replace_block(
        &mut self,
        id: CacheId,
        address: u32,
        block: Block,
        track: bool,
    ) {
        let slot = self.find_replaced_block(id, address);
        let replaced = std::mem::replace(&mut self.cache_mut(id).blocks[slot], block);
        if !replaced.valid {
            return;
        }

        let cache = self.cache(id);
        let replaced_address = cache.get_address(&replaced);
        // Exclusive levels always hand the block down,
        // inclusive ones only when it was modified
        let write_back = cache.is_exclusive() || replaced.dirty;
        log::trace!(
            "cache {}: {:#010x} evicts {:#010x}",
            id.0,
            address,
            replaced_address
        );

        self.insert_to_victim(id, &replaced, replaced_address);

        if write_back {
            self.write_to_next_level(id, replaced, track);
            self.cache_mut(id).charge_miss(track);
        }
    }

    /// Look `address` up in the victim buffer of `id`
    fn read_from_victim(&mut self, id: CacheId, address: u32) -> Option<u8> {
        let cache = self.cache(id);
        let victim = cache.victim?;
        let stamp = cache.history.num_access;

        let vc = self.cache_mut(victim);
        vc.record_access(false);
        match vc.lookup(address) {
            Some(hit_index) => {
                vc.record_hit();
                log::trace!("victim {}: hit {:#010x}", victim.0, address);
                let offset = vc.get_offset(address);
                let block = &mut vc.blocks[hit_index];
                block.last_access = stamp;
                Some(block.data[offset])
            }
            None => {
                vc.record_miss();
                None
            }
        }
    }

    /// Copy a block evicted from `id` into its victim buffer
    fn insert_to_victim(&mut self, id: CacheId, block: &Block, address: u32) {
        let cache = self.cache(id);
        let Some(victim) = cache.victim else {
            return;
        };
        let stamp = cache.history.num_access;

        let vc = self.cache_mut(victim);
        // The buffer is a single set
        let slot = vc
            .lookup(address)
            .unwrap_or_else(|| vc.get_index_to_replace(0));
        let mut entry = vc.transformed_block(block, address);
        entry.valid = true;
        entry.dirty = false;
        entry.last_access = stamp;
        vc.blocks[slot] = entry;
    }

    fn invalidate_in_victim(&mut self, id: CacheId, address: u32) {
        let Some(victim) = self.cache(id).victim else {
            return;
        };
        let vc = self.cache_mut(victim);
        if let Some(i) = vc.lookup(address) {
            vc.reset_block(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mmu::MMU;
    use crate::memory::InclusionPolicy;

    const BLOCK: usize = 16;

    /// Direct-mapped, 4 blocks of 16 bytes
    fn tiny_policy() -> CachePolicy {
        CachePolicy::make(4 * BLOCK, BLOCK, 1, 1)
    }

    fn single_level(policy: CachePolicy) -> (CacheHierarchy<MMU>, CacheId) {
        let mut hierarchy = CacheHierarchy::new(MMU::make());
        let top = hierarchy.add_cache(policy).unwrap();
        hierarchy.store.allocate_page(0);
        (hierarchy, top)
    }

    /// Build a chain from the given policies, the first one on top
    fn chain(policies: &[CachePolicy]) -> (CacheHierarchy<MMU>, Vec<CacheId>) {
        let mut hierarchy = CacheHierarchy::new(MMU::make());
        let ids: Vec<_> = policies
            .iter()
            .map(|policy| hierarchy.add_cache(*policy).unwrap())
            .collect();
        for pair in ids.windows(2) {
            hierarchy.set_lower_cache(pair[0], pair[1]).unwrap();
        }
        for page in 0..4 {
            hierarchy.store.allocate_page(page * 0x1000);
        }
        (hierarchy, ids)
    }

    #[test]
    fn test_read_write_direct_mapped() {
        // Scenario: read 0x00, write 7 to 0x10, read 0x00 again
        let (mut hierarchy, top) = single_level(tiny_policy());
        hierarchy.store.write_byte_uncached(0x00, 0xab);

        assert_eq!(hierarchy.read_byte(top, 0x00, &mut None), 0xab);
        assert_eq!(hierarchy.cache(top).history.num_miss, 1);

        hierarchy.write_byte(top, 0x10, 7, &mut None);
        let cache = hierarchy.cache(top);
        assert_eq!(cache.history.num_miss, 2);
        let slot = cache.lookup(0x10).unwrap();
        assert_eq!(slot, 1);
        assert!(cache.blocks[slot].dirty);
        // Write-back: memory is untouched for now
        assert_eq!(hierarchy.store.read_byte_uncached(0x10), 0);

        assert_eq!(hierarchy.read_byte(top, 0x00, &mut None), 0xab);
        let history = hierarchy.cache(top).history;
        assert_eq!(history.num_hit, 1);
        assert_eq!(history.num_miss, 2);
        assert_eq!(history.num_access, 3);
    }

    #[test]
    fn test_write_through_no_allocate() {
        let policy = tiny_policy()
            .with_write_hit_policy(WriteHitPolicy::WriteThrough)
            .with_write_miss_policy(WriteMissPolicy::WriteNoAllocate);
        let (mut hierarchy, top) = single_level(policy);

        hierarchy.write_byte(top, 0x30, 5, &mut None);
        assert_eq!(hierarchy.store.read_byte_uncached(0x30), 5);
        let cache = hierarchy.cache(top);
        assert_eq!(cache.history.num_miss, 1);
        // Nothing was allocated in set 3
        assert!(!cache.blocks[3].valid);
        assert_eq!(cache.valid_addresses().count(), 0);
    }

    #[test]
    fn test_write_through_hit_updates_memory() {
        let policy =
            tiny_policy().with_write_hit_policy(WriteHitPolicy::WriteThrough);
        let (mut hierarchy, top) = single_level(policy);

        hierarchy.read_byte(top, 0x24, &mut None);
        hierarchy.write_byte(top, 0x24, 9, &mut None);
        assert_eq!(hierarchy.cache(top).history.num_hit, 1);
        assert_eq!(hierarchy.store.read_byte_uncached(0x24), 9);
    }

    #[test]
    fn test_write_back_on_eviction() {
        let (mut hierarchy, top) = single_level(tiny_policy());

        hierarchy.write_byte(top, 0x05, 42, &mut None);
        assert_eq!(hierarchy.store.read_byte_uncached(0x05), 0);

        // 0x40 maps to the same set as 0x00
        hierarchy.read_byte(top, 0x40, &mut None);
        assert_eq!(hierarchy.store.read_byte_uncached(0x05), 42);
        assert!(!hierarchy.cache(top).is_in_cache(0x05));
        assert_eq!(hierarchy.read_byte(top, 0x05, &mut None), 42);
    }

    #[test]
    fn test_write_read_consistency() {
        let hit_policies = [WriteHitPolicy::WriteBack, WriteHitPolicy::WriteThrough];
        let miss_policies =
            [WriteMissPolicy::WriteAllocate, WriteMissPolicy::WriteNoAllocate];
        for write_hit_policy in hit_policies {
            for write_miss_policy in miss_policies {
                let policy = CachePolicy::make(128, BLOCK, 2, 1)
                    .with_write_hit_policy(write_hit_policy)
                    .with_write_miss_policy(write_miss_policy);
                let (mut hierarchy, top) = single_level(policy);
                for i in 0..200u32 {
                    let address = (i * 37) % 0x400;
                    let value = (i % 251) as u8;
                    hierarchy.write_byte(top, address, value, &mut None);
                    assert_eq!(
                        hierarchy.read_byte(top, address, &mut None),
                        value,
                        "{:?}/{:?} at {:#x}",
                        write_hit_policy,
                        write_miss_policy,
                        address
                    );
                }
            }
        }
    }

    #[test]
    fn test_repeated_read_hits() {
        let (mut hierarchy, top) = single_level(tiny_policy());
        hierarchy.read_byte(top, 0x2c, &mut None);
        hierarchy.read_byte(top, 0x2c, &mut None);
        hierarchy.read_byte(top, 0x20, &mut None);
        let history = hierarchy.cache(top).history;
        assert_eq!(history.num_miss, 1);
        assert_eq!(history.num_hit, 2);
    }

    #[test]
    fn test_lru_eviction() {
        // One set of 4 blocks
        let policy = CachePolicy::fully_associative(4, BLOCK, 1);
        let (mut hierarchy, top) = single_level(policy);

        for address in [0x00, 0x10, 0x20, 0x30] {
            hierarchy.read_byte(top, address, &mut None);
        }
        for address in [0x00, 0x10, 0x30] {
            hierarchy.read_byte(top, address, &mut None);
        }
        hierarchy.read_byte(top, 0x40, &mut None);

        let cache = hierarchy.cache(top);
        assert!(!cache.is_in_cache(0x20));
        for address in [0x00, 0x10, 0x30, 0x40] {
            assert!(cache.is_in_cache(address), "{:#x}", address);
        }
        assert_eq!(cache.lookup(0x40), Some(2));
    }

    #[test]
    fn test_cycle_accounting_single_level() {
        let (mut hierarchy, top) = single_level(tiny_policy());

        let mut cycles = Some(0);
        hierarchy.read_byte(top, 0x00, &mut cycles);
        // Cold miss
        assert_eq!(cycles, Some(101));
        hierarchy.read_byte(top, 0x01, &mut cycles);
        // Hit
        assert_eq!(cycles, Some(102));

        // Dirty block, then a conflicting read: fetch + write-back
        hierarchy.write_byte(top, 0x02, 1, &mut None);
        let mut cycles = Some(0);
        hierarchy.read_byte(top, 0x40, &mut cycles);
        assert_eq!(cycles, Some(201));

        let history = hierarchy.cache(top).history;
        assert_eq!(history.base_cycles, 3);
        assert_eq!(history.miss_cycles, 300);
        assert_eq!(hierarchy.get_total_cycles(top), 303);
    }

    #[test]
    fn test_untracked_accesses_cost_nothing() {
        let (mut hierarchy, ids) = chain(&[tiny_policy(), CachePolicy::make(256, BLOCK, 4, 8)]);
        for address in (0..0x200).step_by(8) {
            hierarchy.read_byte(ids[0], address, &mut None);
        }
        assert_eq!(hierarchy.get_total_cycles(ids[0]), 0);
        assert!(hierarchy.cache(ids[0]).history.num_access > 0);
    }

    #[test]
    fn test_set_lower_cache() {
        let (hierarchy, ids) = chain(&[
            tiny_policy(),
            CachePolicy::make(256, BLOCK, 4, 8),
            CachePolicy::make(1024, BLOCK, 4, 20),
        ]);
        assert_eq!(hierarchy.cache(ids[0]).miss_latency, 8);
        assert_eq!(hierarchy.cache(ids[1]).miss_latency, 20);
        assert_eq!(hierarchy.cache(ids[2]).miss_latency, 100);
        assert_eq!(hierarchy.cache(ids[1]).higher, Some(ids[0]));
        assert_eq!(hierarchy.cache(ids[1]).lower, Some(ids[2]));
        assert_eq!(hierarchy.levels(ids[0]), ids);
        assert_eq!(hierarchy.levels(ids[1]), &ids[1..]);
    }

    #[test]
    fn test_invalid_links() {
        let (mut hierarchy, ids) = chain(&[tiny_policy(), tiny_policy()]);
        assert!(matches!(
            hierarchy.set_lower_cache(ids[0], ids[0]),
            Err(ConfigError::InvalidLink(..))
        ));
        assert!(matches!(
            hierarchy.set_lower_cache(ids[1], ids[0]),
            Err(ConfigError::InvalidLink(..))
        ));

        let exclusive = hierarchy
            .add_cache(
                CachePolicy::make(256, 32, 2, 4)
                    .with_inclusion_policy(InclusionPolicy::Exclusive),
            )
            .unwrap();
        assert!(hierarchy.set_lower_cache(ids[1], exclusive).is_err());

        // Victim buffers must be single-set with the same block size
        let set_assoc = hierarchy.add_cache(CachePolicy::make(64, BLOCK, 2, 1)).unwrap();
        assert!(matches!(
            hierarchy.set_victim(ids[0], set_assoc),
            Err(ConfigError::InvalidVictim(..))
        ));
        let wide = hierarchy
            .add_cache(CachePolicy::fully_associative(2, 2 * BLOCK, 1))
            .unwrap();
        assert!(hierarchy.set_victim(ids[0], wide).is_err());
        assert!(hierarchy.set_victim(ids[0], ids[1]).is_err());

        let victim = hierarchy
            .add_cache(CachePolicy::fully_associative(2, BLOCK, 1))
            .unwrap();
        assert!(hierarchy.set_victim(ids[0], victim).is_ok());
        assert!(hierarchy.set_lower_cache(victim, ids[1]).is_err());
    }

    #[test]
    fn test_links_cannot_be_rewired() {
        let (mut hierarchy, ids) =
            chain(&[tiny_policy(), CachePolicy::make(256, BLOCK, 4, 8)]);
        let (l1, l2) = (ids[0], ids[1]);
        let other = hierarchy.add_cache(tiny_policy()).unwrap();
        let spare = hierarchy.add_cache(CachePolicy::make(256, BLOCK, 4, 8)).unwrap();

        // l2 already serves l1
        assert!(matches!(
            hierarchy.set_lower_cache(other, l2),
            Err(ConfigError::InvalidLink(..))
        ));
        // l1 already has l2 below it
        assert!(matches!(
            hierarchy.set_lower_cache(l1, spare),
            Err(ConfigError::InvalidLink(..))
        ));
        assert_eq!(hierarchy.cache(l2).higher, Some(l1));
        assert_eq!(hierarchy.cache(l1).lower, Some(l2));
        assert_eq!(hierarchy.cache(spare).higher, None);

        // Back-invalidation still reaches l1
        for address in (0..0x400).step_by(BLOCK) {
            hierarchy.read_byte(l1, address, &mut None);
            hierarchy.verify_inclusiveness(l1).unwrap();
        }
    }

    #[test]
    fn test_wider_upper_blocks_are_rejected() {
        let mut hierarchy = CacheHierarchy::new(MMU::make());
        let l1 = hierarchy.add_cache(CachePolicy::make(64, 2 * BLOCK, 1, 1)).unwrap();
        let l2 = hierarchy
            .add_cache(CachePolicy::fully_associative(1, BLOCK, 8))
            .unwrap();
        assert!(matches!(
            hierarchy.set_lower_cache(l1, l2),
            Err(ConfigError::InvalidLink(..))
        ));
        assert_eq!(hierarchy.cache(l1).lower, None);
        assert_eq!(hierarchy.cache(l2).higher, None);
    }

    #[test]
    fn test_write_through_charges_lower_level() {
        let policy =
            tiny_policy().with_write_hit_policy(WriteHitPolicy::WriteThrough);
        let (mut hierarchy, ids) =
            chain(&[policy, CachePolicy::make(256, BLOCK, 4, 8)]);
        hierarchy.read_byte(ids[0], 0x04, &mut None);

        let mut cycles = Some(0);
        hierarchy.write_byte(ids[0], 0x04, 1, &mut cycles);
        // L1 hit, then its miss latency for the propagated block,
        // which hits in L2
        assert_eq!(cycles, Some(1 + 8));
    }

    #[test]
    fn test_victim_buffer_serves_conflict_miss() {
        let (mut hierarchy, ids) =
            chain(&[tiny_policy(), CachePolicy::make(256, BLOCK, 4, 8)]);
        let (l1, l2) = (ids[0], ids[1]);
        let victim = hierarchy
            .add_cache(CachePolicy::fully_associative(2, BLOCK, 2))
            .unwrap();
        hierarchy.set_victim(l1, victim).unwrap();
        hierarchy.store.write_byte_uncached(0x03, 0x5a);

        hierarchy.read_byte(l1, 0x03, &mut None);
        // Same L1 set: 0x00 goes to the victim buffer
        hierarchy.read_byte(l1, 0x43, &mut None);
        assert!(hierarchy.cache(victim).is_in_cache(0x00));
        let l2_accesses = hierarchy.cache(l2).history.num_access;

        let mut cycles = Some(0);
        assert_eq!(hierarchy.read_byte(l1, 0x03, &mut cycles), 0x5a);
        // Only the L1 hit latency, nothing from below
        assert_eq!(cycles, Some(1));
        assert_eq!(hierarchy.cache(l1).history.num_miss, 3);
        assert_eq!(hierarchy.cache(l2).history.num_access, l2_accesses);
        assert_eq!(hierarchy.cache(victim).history.num_hit, 1);
    }

    #[test]
    fn test_victim_hit_does_not_promote() {
        let (mut hierarchy, top) = single_level(tiny_policy());
        let victim = hierarchy
            .add_cache(CachePolicy::fully_associative(2, BLOCK, 2))
            .unwrap();
        hierarchy.set_victim(top, victim).unwrap();

        hierarchy.read_byte(top, 0x00, &mut None);
        hierarchy.read_byte(top, 0x40, &mut None);
        for _ in 0..3 {
            hierarchy.read_byte(top, 0x00, &mut None);
        }

        // The block stays in the victim buffer, L1 keeps 0x40
        let cache = hierarchy.cache(top);
        assert!(!cache.is_in_cache(0x00));
        assert!(cache.is_in_cache(0x40));
        assert_eq!(cache.history.num_miss, 5);
        assert!(hierarchy.cache(victim).is_in_cache(0x00));
        assert_eq!(hierarchy.cache(victim).history.num_hit, 3);
    }

    #[test]
    fn test_victim_buffer_lru() {
        let (mut hierarchy, top) = single_level(tiny_policy());
        let victim = hierarchy
            .add_cache(CachePolicy::fully_associative(2, BLOCK, 2))
            .unwrap();
        hierarchy.set_victim(top, victim).unwrap();

        // Evict 0x00, then 0x40, then 0x80 from set 0
        for address in [0x00, 0x40, 0x80, 0xc0] {
            hierarchy.read_byte(top, address, &mut None);
        }
        let vc = hierarchy.cache(victim);
        assert!(!vc.is_in_cache(0x00));
        assert!(vc.is_in_cache(0x40));
        assert!(vc.is_in_cache(0x80));
        assert!(vc.blocks.iter().all(|block| block.index == 0 && !block.dirty));
    }

    #[test]
    fn test_write_miss_drops_victim_copy() {
        let policy =
            tiny_policy().with_write_miss_policy(WriteMissPolicy::WriteNoAllocate);
        let (mut hierarchy, top) = single_level(policy);
        let victim = hierarchy
            .add_cache(CachePolicy::fully_associative(2, BLOCK, 2))
            .unwrap();
        hierarchy.set_victim(top, victim).unwrap();

        hierarchy.read_byte(top, 0x00, &mut None);
        hierarchy.read_byte(top, 0x40, &mut None);
        assert!(hierarchy.cache(victim).is_in_cache(0x00));

        hierarchy.write_byte(top, 0x00, 3, &mut None);
        assert!(!hierarchy.cache(victim).is_in_cache(0x00));
        assert_eq!(hierarchy.read_byte(top, 0x00, &mut None), 3);
    }

    #[test]
    fn test_total_cycles_sum_levels() {
        let (mut hierarchy, ids) = chain(&[
            tiny_policy(),
            CachePolicy::make(256, BLOCK, 4, 8),
            CachePolicy::make(1024, BLOCK, 4, 20),
        ]);
        let mut cycles = Some(0);
        for i in 0..300u32 {
            let address = (i * 52) % 0x800;
            if i % 3 == 0 {
                hierarchy.write_byte(ids[0], address, i as u8, &mut cycles);
            } else {
                hierarchy.read_byte(ids[0], address, &mut cycles);
            }
        }

        let top = hierarchy.cache(ids[0]).history;
        let expected = top.base_cycles
            + top.miss_cycles
            + hierarchy.cache(ids[1]).history.miss_cycles
            + hierarchy.cache(ids[2]).history.miss_cycles;
        assert_eq!(hierarchy.get_total_cycles(ids[0]), expected);
        assert_eq!(cycles, Some(expected));
    }

    #[test]
    fn test_miss_cycles_grow_with_depth() {
        let policies = [
            CachePolicy::make(4 * BLOCK, BLOCK, 1, 1),
            CachePolicy::make(16 * BLOCK, BLOCK, 4, 8),
            CachePolicy::make(64 * BLOCK, BLOCK, 8, 20),
        ];
        let mut previous = 0;
        for depth in 1..=policies.len() {
            let (mut hierarchy, ids) = chain(&policies[..depth]);
            // Every access touches a new block: misses everywhere
            for i in 0..32u32 {
                hierarchy.read_byte(ids[0], i * BLOCK as u32, &mut Some(0));
            }
            let top = hierarchy.cache(ids[0]).history;
            assert_eq!(top.num_miss, 32);
            let miss_cycles = hierarchy.get_total_cycles(ids[0]) - top.base_cycles;
            assert!(miss_cycles > previous, "depth {}", depth);
            previous = miss_cycles;
        }
    }

    #[test]
    fn test_amat() {
        let (mut hierarchy, top) = single_level(tiny_policy());
        assert_eq!(hierarchy.get_amat(top), 1.);
        hierarchy.read_byte(top, 0x00, &mut None);
        hierarchy.read_byte(top, 0x00, &mut None);
        // 1 + 0.5 * 100
        assert_eq!(hierarchy.get_amat(top), 51.);
    }
}
