use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Invalid cache configuration: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Failed to load configuration file: {0}")]
    ConfigFileError(#[from] serde_yaml::Error),

    #[error("Failed to load trace: {0}")]
    TraceError(#[from] TraceError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while assembling a cache hierarchy
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{what} must be a power of two, got {value}")]
    NotPowerOfTwo { what: &'static str, value: usize },

    #[error("cache size {cache_size} is not a multiple of block size {block_size}")]
    NotDivisible { cache_size: usize, block_size: usize },

    #[error("associativity {associativity} does not divide block count {block_num}")]
    InvalidAssociativity { associativity: usize, block_num: usize },

    #[error("offset and index need {0} bits, more than a 32-bit address holds")]
    AddressTooWide(usize),

    #[error("cannot link cache {0} below cache {1}: {2}")]
    InvalidLink(usize, usize, String),

    #[error("cache {0} cannot be the victim buffer of cache {1}: {2}")]
    InvalidVictim(usize, usize, String),

    #[error("a hierarchy needs at least one cache level")]
    EmptyHierarchy,
}

/// Errors related to trace files
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read trace file '{0}': {1}")]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse trace file '{0}': {1}")]
    ParseError(PathBuf, String),
}

/// Errors related to memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Page not allocated: {0:#010x}")]
    PageNotAllocated(u32),

    #[error("Cache inconsistency detected at level {0}: {1}")]
    CacheInconsistency(usize, String),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
