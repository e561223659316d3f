//! Hierarchy configuration
//!
//! A hierarchy is described top-down as a list of levels,
//! optionally with a victim buffer attached to the first one.
//! Configurations can be written in YAML:
//!
//! ```yaml
//! memory_latency: 100
//! levels:
//!   - { size: 16384, block_size: 64, associativity: 1, hit_latency: 1 }
//!   - { size: 131072, block_size: 64, associativity: 8, hit_latency: 8 }
//! victim: { blocks: 8, hit_latency: 2 }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, SimulatorResult};
use crate::memory::cache::{CachePolicy, DEFAULT_MISS_LATENCY};
use crate::memory::hierarchy::{CacheHierarchy, CacheId};
use crate::memory::mmu::MMU;
use crate::memory::{InclusionPolicy, WriteHitPolicy, WriteMissPolicy};

fn default_memory_latency() -> u64 {
    DEFAULT_MISS_LATENCY
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelConfig {
    pub size: usize,
    pub block_size: usize,
    pub associativity: usize,
    pub hit_latency: u64,
    #[serde(default)]
    pub write_hit: WriteHitPolicy,
    #[serde(default)]
    pub write_miss: WriteMissPolicy,
    #[serde(default)]
    pub inclusion: InclusionPolicy,
}

impl LevelConfig {
    pub fn make(
        size: usize,
        block_size: usize,
        associativity: usize,
        hit_latency: u64,
    ) -> Self {
        Self {
            size,
            block_size,
            associativity,
            hit_latency,
            write_hit: WriteHitPolicy::default(),
            write_miss: WriteMissPolicy::default(),
            inclusion: InclusionPolicy::default(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        CachePolicy::make(
            self.size,
            self.block_size,
            self.associativity,
            self.hit_latency,
        )
        .with_write_hit_policy(self.write_hit)
        .with_write_miss_policy(self.write_miss)
        .with_inclusion_policy(self.inclusion)
    }
}

/// Victim buffer attached to the top level.
/// It shares the block size of that level
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VictimConfig {
    pub blocks: usize,
    pub hit_latency: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchyConfig {
    pub levels: Vec<LevelConfig>,
    #[serde(default)]
    pub victim: Option<VictimConfig>,
    /// Miss latency of the last level
    #[serde(default = "default_memory_latency")]
    pub memory_latency: u64,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self::inclusive()
    }
}

impl HierarchyConfig {
    /// 16 KiB direct-mapped cache
    pub fn single_level() -> Self {
        Self {
            levels: vec![LevelConfig::make(16 * 1024, 64, 1, 1)],
            victim: None,
            memory_latency: DEFAULT_MISS_LATENCY,
        }
    }

    /// Make a 3-level inclusive cache
    pub fn inclusive() -> Self {
        Self {
            levels: vec![
                LevelConfig::make(16 * 1024, 64, 1, 1),
                LevelConfig::make(128 * 1024, 64, 8, 8),
                LevelConfig::make(2 * 1024 * 1024, 64, 16, 20),
            ],
            victim: None,
            memory_latency: DEFAULT_MISS_LATENCY,
        }
    }

    /// Make a 3-level exclusive cache
    pub fn exclusive() -> Self {
        let mut config = Self::inclusive();
        for level in config.levels.iter_mut() {
            level.inclusion = InclusionPolicy::Exclusive;
        }
        config
    }

    /// The 3-level inclusive cache with an 8-block victim buffer
    pub fn inclusive_with_victim() -> Self {
        Self {
            victim: Some(VictimConfig { blocks: 8, hit_latency: 2 }),
            ..Self::inclusive()
        }
    }

    pub fn from_yaml(yaml: &str) -> SimulatorResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: &Path) -> SimulatorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Assemble the hierarchy over a fresh backing store.
    /// Returns the hierarchy and its top level
    pub fn build(&self) -> Result<(CacheHierarchy<MMU>, CacheId), ConfigError> {
        let mut hierarchy = CacheHierarchy::new(MMU::make());

        let mut ids = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            let policy = level.policy().with_miss_latency(self.memory_latency);
            ids.push(hierarchy.add_cache(policy)?);
        }
        for pair in ids.windows(2) {
            hierarchy.set_lower_cache(pair[0], pair[1])?;
        }
        let top = *ids.first().ok_or(ConfigError::EmptyHierarchy)?;

        if let Some(victim) = &self.victim {
            let block_size = hierarchy.cache(top).get_block_size();
            let victim = hierarchy.add_cache(CachePolicy::fully_associative(
                victim.blocks,
                block_size,
                victim.hit_latency,
            ))?;
            hierarchy.set_victim(top, victim)?;
        }

        log::info!(
            "built {}-level hierarchy{}",
            ids.len(),
            if self.victim.is_some() { " with victim buffer" } else { "" }
        );
        Ok((hierarchy, top))
    }
}
