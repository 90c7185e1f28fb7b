//! Raw Counter Snapshots and the parsers that produce them.
//!
//! Parsers are pure functions over file content. Anything that does not look
//! like a complete kernel record is rejected with [`ParseError`] instead of
//! being defaulted, so a file rewritten mid-read never reaches the registry.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;
pub mod process;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::error::SourceError;
use crate::source::{CounterSource, Domain};

pub use cpu::CpuTimes;
pub use disk::{DiskSnapshot, DiskStats};
pub use memory::MemorySnapshot;
pub use network::{InterfaceStats, NetworkSnapshot};
pub use process::ProcessSnapshot;

/// Malformed or truncated counter file content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub(crate) fn parse_u64(token: &str, field: &str) -> Result<u64, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {} value {:?}", field, token)))
}

/// Every domain read at one instant, for the `--once` diagnostic dump.
///
/// A domain whose source failed is `None` and serializes as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct HostSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub cpu: Option<CpuTimes>,
    pub memory: Option<MemorySnapshot>,
    pub disks: Option<DiskSnapshot>,
    pub network: Option<NetworkSnapshot>,
    pub processes: Option<ProcessSnapshot>,
}

impl HostSample {
    /// Reads all domains. CPU usage is computed against `prev_cpu` when given.
    ///
    /// A failed domain is logged and left out. Fails only when no domain
    /// could be read, returning the last error.
    pub fn collect<S: CounterSource + ?Sized>(
        source: &S,
        prev_cpu: Option<&CpuTimes>,
    ) -> Result<Self, SourceError> {
        let mut last_err = None;

        let cpu = keep_or_warn(Domain::Cpu, source.read_cpu(), &mut last_err);
        let memory = keep_or_warn(Domain::Memory, source.read_memory(), &mut last_err);
        let disks = keep_or_warn(Domain::Disk, source.read_disks(), &mut last_err);
        let network = keep_or_warn(Domain::Network, source.read_network(), &mut last_err);
        let processes = keep_or_warn(Domain::Process, source.read_processes(), &mut last_err);

        if cpu.is_none()
            && memory.is_none()
            && disks.is_none()
            && network.is_none()
            && processes.is_none()
        {
            if let Some(err) = last_err {
                return Err(err);
            }
        }

        let cpu_usage_percent = match (&cpu, prev_cpu) {
            (Some(cpu), Some(prev)) => cpu.usage_since(prev),
            _ => 0.0,
        };

        Ok(Self {
            timestamp: Utc::now(),
            cpu_usage_percent,
            cpu,
            memory,
            disks,
            network,
            processes,
        })
    }
}

fn keep_or_warn<T>(
    domain: Domain,
    read: Result<T, SourceError>,
    last_err: &mut Option<SourceError>,
) -> Option<T> {
    match read {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%domain, error = %e, "Leaving domain out of the sample");
            *last_err = Some(e);
            None
        }
    }
}
