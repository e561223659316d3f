//! Trace replay wrapper

use std::path::Path;

use crate::error::{SimulatorResult, TraceError};
use crate::memory::hierarchy::{CacheHierarchy, CacheId};
use crate::memory::{AccessType, BackingStore};
use crate::report::TraceReport;

/// Value stored by every write record
pub const TRACE_WRITE_VALUE: u8 = 6;

/// Parse trace records of the form `<r|w> <hex address>`.
/// The address may carry a `0x` prefix, blank lines are skipped
pub fn parse_operations(
    content: &str,
    trace_path: &Path,
) -> SimulatorResult<Vec<(AccessType, u32)>> {
    let mut operations = Vec::new();
    let error = |line_num: usize, message: String| {
        TraceError::ParseError(
            trace_path.to_path_buf(),
            format!("{} at line {}", message, line_num + 1),
        )
    };

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let &[op, address_str] = parts.as_slice() else {
            return Err(error(
                line_num,
                "Invalid format: expected 'op address'".to_string(),
            )
            .into());
        };

        let op = match op {
            "r" => AccessType::Read,
            "w" => AccessType::Write,
            _ => {
                return Err(error(
                    line_num,
                    format!("Invalid operation '{}': expected 'r' or 'w'", op),
                )
                .into())
            }
        };

        let digits = address_str
            .strip_prefix("0x")
            .or_else(|| address_str.strip_prefix("0X"))
            .unwrap_or(address_str);
        let address = u32::from_str_radix(digits, 16).map_err(|_| {
            error(
                line_num,
                format!("Invalid hexadecimal address '{}'", address_str),
            )
        })?;

        operations.push((op, address));
    }

    Ok(operations)
}

/// Fetch operations from the trace file
pub fn fetch_operations(
    trace_path: &Path,
) -> SimulatorResult<Vec<(AccessType, u32)>> {
    let content = std::fs::read_to_string(trace_path)
        .map_err(|e| TraceError::FileReadError(trace_path.to_path_buf(), e))?;
    parse_operations(&content, trace_path)
}

/// Replay `operations` against the hierarchy rooted at `top`
/// with cycle accounting on, and report the statistics
pub fn run_trace<S: BackingStore>(
    hierarchy: &mut CacheHierarchy<S>,
    top: CacheId,
    operations: &[(AccessType, u32)],
) -> TraceReport {
    let mut cycles = Some(0);
    for (op, address) in operations {
        // Allocate pages on demand
        if hierarchy.store.allocate_page(*address) {
            log::trace!("allocated page for {:#010x}", address);
        }
        match op {
            AccessType::Read => {
                hierarchy.read_byte(top, *address, &mut cycles);
            }
            AccessType::Write => {
                hierarchy.write_byte(top, *address, TRACE_WRITE_VALUE, &mut cycles);
            }
        }
    }

    let report = TraceReport::collect(hierarchy, top, operations.len());
    log::info!(
        "replayed {} records in {} cycles",
        operations.len(),
        cycles.unwrap_or_default()
    );
    report
}

/// Check the inclusion property matching the top level's policy
pub fn verify<S: BackingStore>(
    hierarchy: &CacheHierarchy<S>,
    top: CacheId,
) -> SimulatorResult<()> {
    if hierarchy.cache(top).is_exclusive() {
        hierarchy.verify_exclusiveness(top)
    } else {
        hierarchy.verify_inclusiveness(top)
    }
}
