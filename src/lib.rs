pub mod config;
pub mod error;
pub mod flags;
pub mod memory;
pub mod report;
pub mod run_wrapper;
