//! Memory totals from /proc/meminfo.

use serde::Serialize;

use super::{parse_u64, ParseError};

/// Memory totals in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    pub total: u64,
    pub free: u64,
    /// `MemAvailable`, absent on kernels older than 3.14.
    pub available: Option<u64>,
}

impl MemorySnapshot {
    /// Memory a new workload could use: `MemAvailable`, else `MemFree`.
    /// Never exceeds `total`.
    pub fn free_bytes(&self) -> u64 {
        self.available.unwrap_or(self.free).min(self.total)
    }

    /// `total - free_bytes()`, so `used + free == total` always holds.
    pub fn used_bytes(&self) -> u64 {
        self.total - self.free_bytes()
    }

    pub fn usage_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.used_bytes() as f64 / self.total as f64
    }
}

/// Parses /proc/meminfo. `MemTotal` and `MemFree` are required.
pub fn parse_meminfo(content: &str) -> Result<MemorySnapshot, ParseError> {
    let mut total = None;
    let mut free = None;
    let mut available = None;

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let (key, raw, unit) = match parts.as_slice() {
            [key, raw] => (*key, *raw, None),
            [key, raw, unit] => (*key, *raw, Some(*unit)),
            _ => return Err(ParseError::new(format!("malformed meminfo line {:?}", line))),
        };

        let slot = match key {
            "MemTotal:" => &mut total,
            "MemFree:" => &mut free,
            "MemAvailable:" => &mut available,
            _ => continue,
        };

        let value = parse_u64(raw, key.trim_end_matches(':'))?;
        *slot = Some(match unit {
            Some("kB") => value.checked_mul(1024).ok_or_else(|| {
                ParseError::new(format!("{} value {} kB overflows bytes", key, value))
            })?,
            None => value,
            Some(other) => {
                return Err(ParseError::new(format!("unknown unit {:?} for {}", other, key)))
            }
        });
    }

    Ok(MemorySnapshot {
        total: total.ok_or_else(|| ParseError::new("missing MemTotal"))?,
        free: free.ok_or_else(|| ParseError::new("missing MemFree"))?,
        available,
    })
}
