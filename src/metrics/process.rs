//! Process counts from the /proc directory listing and /proc/stat.

use std::path::PathBuf;

use serde::Serialize;

use super::{parse_u64, ParseError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    /// Processes that exist (numeric /proc entries)
    pub count: u64,
    /// Runnable tasks (`procs_running`)
    pub running: u64,
    /// Tasks blocked on I/O (`procs_blocked`)
    pub blocked: u64,
}

/// Extracts `(procs_running, procs_blocked)` from /proc/stat.
pub fn parse_proc_counts(content: &str) -> Result<(u64, u64), ParseError> {
    let mut running = None;
    let mut blocked = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let slot = match parts.next() {
            Some("procs_running") => &mut running,
            Some("procs_blocked") => &mut blocked,
            _ => continue,
        };
        let value = parts
            .next()
            .ok_or_else(|| ParseError::new(format!("truncated line {:?}", line)))?;
        *slot = Some(parse_u64(value, "procs")?);
    }

    Ok((
        running.ok_or_else(|| ParseError::new("missing procs_running"))?,
        blocked.ok_or_else(|| ParseError::new("missing procs_blocked"))?,
    ))
}

/// Counts entries whose file name is a PID.
pub fn count_pid_entries(entries: &[PathBuf]) -> u64 {
    entries
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .filter(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
        .count() as u64
}
