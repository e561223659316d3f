//! Cache implementation

use super::hierarchy::CacheId;
use super::{InclusionPolicy, WriteHitPolicy, WriteMissPolicy};
use crate::error::ConfigError;

/// Cycles charged per miss by a level
/// that only has the backing store below it
pub const DEFAULT_MISS_LATENCY: u64 = 100;

const ADDRESS_WIDTH: usize = 32;

pub fn get_log_2(value: u32) -> usize {
    assert!(value > 0);
    31 - value.leading_zeros() as usize
}

pub fn is_pow_2(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

pub fn get_mask(bits: usize) -> u32 {
    if bits >= ADDRESS_WIDTH {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

/// A single cache level.
/// Links to neighbouring levels are handles
/// into the owning [`CacheHierarchy`](super::hierarchy::CacheHierarchy)
pub struct Cache {
    pub policy: CachePolicy,

    pub history: CacheHistory,

    /// Cycles added on each miss; follows the lower level's hit latency
    pub miss_latency: u64,

    pub lower: Option<CacheId>,
    pub higher: Option<CacheId>,
    pub victim: Option<CacheId>,

    // Constants
    offset_bits: usize,
    index_bits: usize,

    pub offset_mask: u32,
    pub index_mask: u32,
    pub tag_mask: u32,

    pub blocks: Vec<Block>,
}

// Assume that address is 32-bit
// and looks like this:
// | tag | index | offset |
impl Cache {
    pub fn make(policy: CachePolicy) -> Result<Self, ConfigError> {
        policy.validate()?;

        let offset_bits = get_log_2(policy.block_size as u32);
        let index_bits = get_log_2(policy.num_sets() as u32);
        let offset_mask = get_mask(offset_bits);
        let index_mask = get_mask(index_bits);
        let tag_mask = get_mask(ADDRESS_WIDTH - offset_bits - index_bits);

        // Initialize blocks
        let blocks = (0..policy.block_num)
            .map(|i| Block {
                index: i / policy.associativity,
                data: vec![0; policy.block_size],
                ..Block::default()
            })
            .collect();

        Ok(Self {
            policy,
            history: CacheHistory::default(),
            miss_latency: policy.miss_latency,
            lower: None,
            higher: None,
            victim: None,
            offset_bits,
            index_bits,
            offset_mask,
            index_mask,
            tag_mask,
            blocks,
        })
    }

    /// Make a new block with the given address,
    /// usually used when loading a block with specified data
    pub fn make_block(&self, address: u32, data: Vec<u8>, stamp: u64) -> Block {
        debug_assert_eq!(data.len(), self.policy.block_size);
        Block {
            valid: true,
            dirty: false,
            tag: self.get_tag(address),
            index: self.get_index(address),
            last_access: stamp,
            data,
        }
    }

    /// Invalidate the i-th block; its payload is left stale
    pub fn reset_block(&mut self, i: usize) {
        let block = &mut self.blocks[i];
        block.valid = false;
        block.dirty = false;
        block.tag = 0;
        block.index = i / self.policy.associativity;
        block.last_access = 0;
    }

    /// Computes the current miss rate of the cache
    pub fn get_miss_rate(&self) -> f64 {
        let lookups = self.history.num_hit + self.history.num_miss;
        if lookups == 0 {
            0.
        } else {
            self.history.num_miss as f64 / lookups as f64
        }
    }

    /// Given a block that is not necessarily
    /// from this cache, transform it so that it follows the
    /// format of this cache
    pub fn transformed_block(&self, block: &Block, address: u32) -> Block {
        let mut transformed_block = block.clone();
        // Must update tag and index
        transformed_block.tag = self.get_tag(address);
        transformed_block.index = self.get_index(address);
        transformed_block
    }

    pub fn get_offset(&self, address: u32) -> usize {
        (address & self.offset_mask) as usize
    }

    pub fn get_index(&self, address: u32) -> usize {
        (address.checked_shr(self.offset_bits as u32).unwrap_or(0)
            & self.index_mask) as usize
    }

    pub fn get_tag(&self, address: u32) -> u32 {
        address
            .checked_shr((self.offset_bits + self.index_bits) as u32)
            .unwrap_or(0)
            & self.tag_mask
    }

    /// Address of the first byte of the block holding `address`
    pub fn block_begin(&self, address: u32) -> u32 {
        address & !self.offset_mask
    }

    /// Rebuild the block address from a block's tag and set index
    pub fn get_address(&self, block: &Block) -> u32 {
        block
            .tag
            .checked_shl((self.offset_bits + self.index_bits) as u32)
            .unwrap_or(0)
            | ((block.index as u32) << self.offset_bits)
    }

    pub fn is_in_cache(&self, address: u32) -> bool {
        self.lookup(address).is_some()
    }

    pub fn lookup(&self, address: u32) -> Option<usize> {
        let tag = self.get_tag(address);
        let index = self.get_index(address);
        let begin = index * self.policy.associativity;
        let end = begin + self.policy.associativity;
        (begin..end).find(|&i| {
            let block = &self.blocks[i];
            // Ensure block index consistency
            debug_assert_eq!(index, block.index);
            block.valid && block.tag == tag
        })
    }

    /// Count an access and charge the hit latency if cycles are tracked
    pub fn record_access(&mut self, track: bool) {
        self.history.num_access += 1;
        if track {
            self.history.base_cycles += self.policy.hit_latency;
        }
    }

    pub fn record_hit(&mut self) {
        self.history.num_hit += 1;
    }

    pub fn record_miss(&mut self) {
        self.history.num_miss += 1;
    }

    /// Charge this level's miss latency
    pub fn charge_miss(&mut self, track: bool) {
        self.charge_cycles(track, self.miss_latency);
    }

    pub fn charge_cycles(&mut self, track: bool, cycles: u64) {
        if track {
            self.history.miss_cycles += cycles;
        }
    }

    /// Pick the slot to fill in the given set:
    /// the first invalid one, otherwise the least recently used
    pub fn get_index_to_replace(&self, index: usize) -> usize {
        let begin = index * self.policy.associativity;
        let end = begin + self.policy.associativity;
        assert!(begin < end);
        let mut result = begin;
        let mut min_ref = self.blocks[begin].last_access;
        for i in begin..end {
            let block = &self.blocks[i];
            // If it's not valid, replace it immediately
            if !block.valid {
                return i;
            }
            // Otherwise, check if it's the least recent reference
            if block.last_access < min_ref {
                min_ref = block.last_access;
                result = i;
            }
        }
        result
    }

    /// Return the common block size of this cache
    pub fn get_block_size(&self) -> usize {
        self.policy.block_size
    }

    pub fn is_exclusive(&self) -> bool {
        self.policy.inclusion_policy == InclusionPolicy::Exclusive
    }

    /// Addresses of every valid block
    pub fn valid_addresses(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks
            .iter()
            .filter(|block| block.valid)
            .map(|block| self.get_address(block))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub valid: bool,
    pub dirty: bool,

    pub tag: u32,
    pub index: usize,

    /// Access sequence number of the last reference, for LRU
    pub last_access: u64,

    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct CacheHistory {
    pub num_access: u64,
    pub num_hit: u64,
    pub num_miss: u64,

    pub base_cycles: u64,
    pub miss_cycles: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachePolicy {
    pub cache_size: usize,
    pub block_size: usize,
    pub block_num: usize,
    pub associativity: usize,

    pub hit_latency: u64,
    pub miss_latency: u64,

    pub write_hit_policy: WriteHitPolicy,
    pub write_miss_policy: WriteMissPolicy,
    pub inclusion_policy: InclusionPolicy,
}

impl Default for CachePolicy {
    /// 16 KiB direct-mapped cache with 64-byte blocks
    fn default() -> Self {
        Self::make(16 * 1024, 64, 1, 1)
    }
}

impl CachePolicy {
    pub fn make(
        cache_size: usize,
        block_size: usize,
        associativity: usize,
        hit_latency: u64,
    ) -> Self {
        Self {
            cache_size,
            block_size,
            block_num: cache_size.checked_div(block_size).unwrap_or(0),
            associativity,
            hit_latency,
            miss_latency: DEFAULT_MISS_LATENCY,
            write_hit_policy: WriteHitPolicy::default(),
            write_miss_policy: WriteMissPolicy::default(),
            inclusion_policy: InclusionPolicy::default(),
        }
    }

    /// A fully-associative buffer of `block_num` blocks
    pub fn fully_associative(
        block_num: usize,
        block_size: usize,
        hit_latency: u64,
    ) -> Self {
        Self::make(block_num * block_size, block_size, block_num, hit_latency)
    }

    pub fn with_write_hit_policy(mut self, policy: WriteHitPolicy) -> Self {
        self.write_hit_policy = policy;
        self
    }

    pub fn with_write_miss_policy(mut self, policy: WriteMissPolicy) -> Self {
        self.write_miss_policy = policy;
        self
    }

    pub fn with_inclusion_policy(mut self, policy: InclusionPolicy) -> Self {
        self.inclusion_policy = policy;
        self
    }

    pub fn with_miss_latency(mut self, miss_latency: u64) -> Self {
        self.miss_latency = miss_latency;
        self
    }

    pub fn num_sets(&self) -> usize {
        self.block_num.checked_div(self.associativity).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Cache size must be a power of 2
        if !is_pow_2(self.cache_size) {
            return Err(ConfigError::NotPowerOfTwo {
                what: "cache size",
                value: self.cache_size,
            });
        }
        // Block size must be a power of 2
        if !is_pow_2(self.block_size) {
            return Err(ConfigError::NotPowerOfTwo {
                what: "block size",
                value: self.block_size,
            });
        }
        // cache_size = block_size * block_num
        if self.cache_size % self.block_size != 0
            || self.cache_size != self.block_size * self.block_num
        {
            return Err(ConfigError::NotDivisible {
                cache_size: self.cache_size,
                block_size: self.block_size,
            });
        }
        // Block number must be a multiple of associativity
        if self.associativity == 0 || self.block_num % self.associativity != 0 {
            return Err(ConfigError::InvalidAssociativity {
                associativity: self.associativity,
                block_num: self.block_num,
            });
        }
        if !is_pow_2(self.num_sets()) {
            return Err(ConfigError::NotPowerOfTwo {
                what: "set count",
                value: self.num_sets(),
            });
        }
        let offset_bits = self.block_size.trailing_zeros() as usize;
        let index_bits = self.num_sets().trailing_zeros() as usize;
        let bits = offset_bits + index_bits;
        // Each part must also fit in a u32 on its own
        if bits > ADDRESS_WIDTH
            || offset_bits >= ADDRESS_WIDTH
            || index_bits >= ADDRESS_WIDTH
        {
            return Err(ConfigError::AddressTooWide(bits));
        }
        Ok(())
    }
}
