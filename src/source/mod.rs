//! Counter sources: where Raw Counter Snapshots come from.
//!
//! ```text
//!   Sampler ──► CounterSource (trait)
//!                    │
//!               ProcSource<F>
//!                    │
//!               FileSystem (trait)
//!              ┌─────┴─────┐
//!           RealFs       MockFs
//! ```
//!
//! Every read opens the pseudo-file fresh; nothing is kept open across ticks.

pub mod mock;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SourceError;
use crate::metrics::cpu::{self, CpuTimes};
use crate::metrics::disk::{self, DiskSnapshot};
use crate::metrics::memory::{self, MemorySnapshot};
use crate::metrics::network::{self, NetworkSnapshot};
use crate::metrics::process::{self, ProcessSnapshot};
use crate::metrics::ParseError;

pub use mock::MockFs;

/// Logical metric domain, one per kernel counter source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Cpu,
    Memory,
    Disk,
    Network,
    Process,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Cpu,
        Domain::Memory,
        Domain::Disk,
        Domain::Network,
        Domain::Process,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Cpu => "cpu",
            Domain::Memory => "memory",
            Domain::Disk => "disk",
            Domain::Network => "network",
            Domain::Process => "process",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstraction for filesystem operations, so collectors can run against a
/// mock tree in tests.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Lists the entries of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

impl<F: FileSystem + ?Sized> FileSystem for Arc<F> {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        (**self).read_dir(path)
    }
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

/// Produces one Raw Counter Snapshot per domain.
///
/// Implementations must not cache: each call reflects the source as of that
/// call.
pub trait CounterSource: Send {
    fn read_cpu(&self) -> Result<CpuTimes, SourceError>;
    fn read_memory(&self) -> Result<MemorySnapshot, SourceError>;
    fn read_disks(&self) -> Result<DiskSnapshot, SourceError>;
    fn read_network(&self) -> Result<NetworkSnapshot, SourceError>;
    fn read_processes(&self) -> Result<ProcessSnapshot, SourceError>;
}

/// Counter source backed by a `/proc`-shaped tree.
pub struct ProcSource<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> ProcSource<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_parsed<T>(
        &self,
        relative: &str,
        parse: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<T, SourceError> {
        let path = self.root.join(relative);
        let content = self
            .fs
            .read_to_string(&path)
            .map_err(|e| SourceError::unavailable(&path, e))?;
        parse(&content).map_err(|e| SourceError::parse(&path, e.to_string()))
    }
}

impl<F: FileSystem> CounterSource for ProcSource<F> {
    fn read_cpu(&self) -> Result<CpuTimes, SourceError> {
        self.read_parsed("stat", cpu::parse_cpu_times)
    }

    fn read_memory(&self) -> Result<MemorySnapshot, SourceError> {
        self.read_parsed("meminfo", memory::parse_meminfo)
    }

    fn read_disks(&self) -> Result<DiskSnapshot, SourceError> {
        self.read_parsed("diskstats", disk::parse_diskstats)
            .map(DiskSnapshot::from_devices)
    }

    fn read_network(&self) -> Result<NetworkSnapshot, SourceError> {
        self.read_parsed("net/dev", network::parse_net_dev)
    }

    fn read_processes(&self) -> Result<ProcessSnapshot, SourceError> {
        let (running, blocked) = self.read_parsed("stat", process::parse_proc_counts)?;
        let entries = self
            .fs
            .read_dir(&self.root)
            .map_err(|e| SourceError::unavailable(&self.root, e))?;
        let count = process::count_pid_entries(&entries);

        Ok(ProcessSnapshot {
            count,
            running,
            blocked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typical() -> ProcSource<MockFs> {
        ProcSource::new(MockFs::typical_system(), "/proc")
    }

    #[test]
    fn test_reads_every_domain_from_typical_system() {
        let source = typical();

        let cpu = source.read_cpu().unwrap();
        assert_eq!(cpu.user, 10000);

        let mem = source.read_memory().unwrap();
        assert_eq!(mem.total, 16384000 * 1024);

        let disks = source.read_disks().unwrap();
        assert_eq!(disks.physical.len(), 2);
        assert_eq!(disks.loops.len(), 1);

        let net = source.read_network().unwrap();
        assert_eq!(net.interfaces.len(), 2);

        let procs = source.read_processes().unwrap();
        assert_eq!(procs.count, 3);
        assert_eq!(procs.running, 2);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let fs = MockFs::typical_system();
        fs.remove_file("/proc/diskstats");
        let source = ProcSource::new(fs, "/proc");

        match source.read_disks() {
            Err(SourceError::Unavailable { path, .. }) => {
                assert_eq!(path, PathBuf::from("/proc/diskstats"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_file_is_parse_error() {
        let fs = MockFs::typical_system();
        fs.add_file("/proc/net/dev", "Inter-|   Receive\n face |bytes\n  eth0: 123 4");
        let source = ProcSource::new(fs, "/proc");

        assert!(matches!(
            source.read_network(),
            Err(SourceError::Parse { .. })
        ));
    }

    #[test]
    fn test_custom_root() {
        let fs = MockFs::new();
        fs.add_file("/host/proc/stat", "cpu  1 2 3 4 5 6 7 8 0 0\n");
        let source = ProcSource::new(fs, "/host/proc");

        assert_eq!(source.root(), Path::new("/host/proc"));
        assert_eq!(source.read_cpu().unwrap().idle, 4);
    }

    #[test]
    fn test_domain_names() {
        let names: Vec<&str> = Domain::ALL.iter().map(|d| d.as_str()).collect();
        assert_eq!(names, ["cpu", "memory", "disk", "network", "process"]);
    }
}
