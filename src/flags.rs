use std::path::PathBuf;
use std::str::FromStr;

use crate::config::HierarchyConfig;

xflags::xflags! {
    /// Trace-driven multi-level cache simulator.
    cmd CacheSimArgs {
        /// Path to the memory access trace to replay.
        required trace_file: PathBuf

        /// YAML file describing the cache hierarchy.
        /// Takes precedence over --preset.
        optional -c, --config config: PathBuf

        /// Selects a built-in hierarchy.
        /// S: Single-level
        /// I: 3-level inclusive (default)
        /// E: 3-level exclusive
        /// IV: 3-level inclusive with victim buffer
        optional -p, --preset preset: PresetArg

        /// Checks the inclusion property of the hierarchy after the replay.
        optional --verify

        /// Writes per-level statistics to the given CSV file.
        optional --csv output: PathBuf

        /// Enables verbose mode, logging cache traffic at debug level.
        optional -v, --verbose
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetArg {
    SingleLevel,
    Inclusive,
    Exclusive,
    InclusiveWithVictim,
}

impl FromStr for PresetArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "S" => Ok(PresetArg::SingleLevel),
            "I" => Ok(PresetArg::Inclusive),
            "E" => Ok(PresetArg::Exclusive),
            "IV" => Ok(PresetArg::InclusiveWithVictim),
            _ => Err(format!(
                "Invalid preset: '{}'. Expected 'S', 'I', 'E' or 'IV'.",
                s
            )),
        }
    }
}

impl From<PresetArg> for HierarchyConfig {
    fn from(val: PresetArg) -> Self {
        match val {
            PresetArg::SingleLevel => HierarchyConfig::single_level(),
            PresetArg::Inclusive => HierarchyConfig::inclusive(),
            PresetArg::Exclusive => HierarchyConfig::exclusive(),
            PresetArg::InclusiveWithVictim => {
                HierarchyConfig::inclusive_with_victim()
            }
        }
    }
}
