//! CPU time breakdown from the aggregate line of /proc/stat.

use serde::Serialize;

use super::{parse_u64, ParseError};

/// Raw CPU time values from /proc/stat, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// All ticks. Guest time is already accounted in `user`/`nice`.
    pub fn total(&self) -> u64 {
        [
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(self.user, |acc, v| acc.saturating_add(*v))
    }

    /// Ticks the CPU spent not working (idle or waiting on I/O).
    pub fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }

    /// Busy percentage over the interval since `prev`, in `[0, 100]`.
    ///
    /// Returns 0 when no ticks elapsed or the counters went backwards.
    pub fn usage_since(&self, prev: &CpuTimes) -> f64 {
        let total_delta = self.total().saturating_sub(prev.total());
        if total_delta == 0 {
            return 0.0;
        }

        let idle_delta = self.idle_total().saturating_sub(prev.idle_total());
        let busy_delta = total_delta.saturating_sub(idle_delta);

        (100.0 * busy_delta as f64 / total_delta as f64).clamp(0.0, 100.0)
    }
}

/// Parses the aggregate `cpu ` line of /proc/stat.
///
/// Old kernels report only the first four columns; missing trailing columns
/// are zero. Fewer than four columns, or any non-numeric column, is an error.
pub fn parse_cpu_times(content: &str) -> Result<CpuTimes, ParseError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| ParseError::new("missing aggregate cpu line"))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|s| parse_u64(s, "cpu"))
        .collect::<Result<Vec<u64>, _>>()?;

    if fields.len() < 4 {
        return Err(ParseError::new(format!(
            "aggregate cpu line has {} columns, expected at least 4",
            fields.len()
        )));
    }

    let get = |idx: usize| fields.get(idx).copied().unwrap_or(0);

    Ok(CpuTimes {
        user: get(0),
        nice: get(1),
        system: get(2),
        idle: get(3),
        iowait: get(4),
        irq: get(5),
        softirq: get(6),
        steal: get(7),
    })
}
