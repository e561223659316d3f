//! Statistics collected after a trace replay

use std::fmt;
use std::io;

use serde::Serialize;

use crate::error::SimulatorResult;
use crate::memory::hierarchy::{CacheHierarchy, CacheId};
use crate::memory::BackingStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReport {
    /// `L1`, `L2`... or `VC` for the victim buffer of the top level
    pub name: String,
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub miss_rate: f64,
    pub base_cycles: u64,
    pub miss_cycles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceReport {
    pub records: usize,
    pub miss_rate: f64,
    pub total_cycles: u64,
    pub cycles_per_access: f64,
    pub amat: f64,
    pub levels: Vec<LevelReport>,
}

impl LevelReport {
    fn collect<S: BackingStore>(
        hierarchy: &CacheHierarchy<S>,
        id: CacheId,
        name: String,
    ) -> Self {
        let cache = hierarchy.cache(id);
        let history = cache.history;
        Self {
            name,
            accesses: history.num_access,
            hits: history.num_hit,
            misses: history.num_miss,
            miss_rate: cache.get_miss_rate(),
            base_cycles: history.base_cycles,
            miss_cycles: history.miss_cycles,
        }
    }
}

impl TraceReport {
    /// Gather the statistics of the hierarchy rooted at `top`
    /// after `records` trace records were replayed on it
    pub fn collect<S: BackingStore>(
        hierarchy: &CacheHierarchy<S>,
        top: CacheId,
        records: usize,
    ) -> Self {
        let mut levels: Vec<_> = hierarchy
            .levels(top)
            .into_iter()
            .enumerate()
            .map(|(k, id)| LevelReport::collect(hierarchy, id, format!("L{}", k + 1)))
            .collect();
        if let Some(victim) = hierarchy.cache(top).victim {
            levels.push(LevelReport::collect(hierarchy, victim, "VC".to_string()));
        }

        let total_cycles = hierarchy.get_total_cycles(top);
        let cycles_per_access = if records == 0 {
            0.
        } else {
            total_cycles as f64 / records as f64
        };
        Self {
            records,
            miss_rate: hierarchy.cache(top).get_miss_rate(),
            total_cycles,
            cycles_per_access,
            amat: hierarchy.get_amat(top),
            levels,
        }
    }

    /// One CSV row per level
    pub fn write_csv<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> SimulatorResult<()> {
        for level in &self.levels {
            writer.serialize(level)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for TraceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records           {}", self.records)?;
        writeln!(f, "miss rate         {:.4}", self.miss_rate)?;
        writeln!(f, "total cycles      {}", self.total_cycles)?;
        writeln!(f, "cycles per access {:.3}", self.cycles_per_access)?;
        writeln!(f, "AMAT              {:.3}", self.amat)?;
        for level in &self.levels {
            writeln!(
                f,
                "  {:<3} accesses={} hits={} misses={} miss_rate={:.4} cycles={}+{}",
                level.name,
                level.accesses,
                level.hits,
                level.misses,
                level.miss_rate,
                level.base_cycles,
                level.miss_cycles
            )?;
        }
        Ok(())
    }
}
