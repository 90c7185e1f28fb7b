//! Block device I/O counters from /proc/diskstats.
//!
//! Devices are split into two groups that are never mixed: physical disks
//! and loop devices. Partitions and other virtual block devices are dropped
//! so that no I/O is counted twice.

use serde::Serialize;

use super::{parse_u64, ParseError};

/// Minimum number of columns on a /proc/diskstats line (kernel 2.6+).
const DISKSTATS_MIN_FIELDS: usize = 14;

/// Device name prefixes of virtual block devices that are not reported.
const IGNORED_PREFIXES: &[&str] = &["ram", "zram", "dm-", "md", "nbd", "sr", "fd"];

/// Cumulative counters of one block device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskStats {
    /// Device name (e.g., "sda", "nvme0n1", "loop0")
    pub device: String,
    pub sectors_read: u64,
    pub sectors_written: u64,
    /// Time spent reading (ms)
    pub read_time_ms: u64,
    /// Time spent writing (ms)
    pub write_time_ms: u64,
    /// I/Os currently in flight
    pub io_in_progress: u64,
    /// Time spent doing I/Os (ms)
    pub io_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Physical,
    Loop,
    Ignored,
}

/// Classifies a block device by name.
pub fn classify_device(name: &str) -> DeviceClass {
    if name.starts_with("loop") {
        return DeviceClass::Loop;
    }
    if IGNORED_PREFIXES.iter().any(|p| name.starts_with(p)) || is_partition(name) {
        return DeviceClass::Ignored;
    }
    DeviceClass::Physical
}

fn is_partition(name: &str) -> bool {
    // eMMC boot and RPMB areas are sub-areas of the same device.
    if name.starts_with("mmcblk") && (name.contains("boot") || name.ends_with("rpmb")) {
        return true;
    }
    // nvme0n1p2 and mmcblk0p1 mark partitions with a 'p' between two digits;
    // the whole device itself ends in a digit.
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return match name.rfind('p') {
            Some(idx) => {
                let (head, tail) = name.split_at(idx);
                let digits = &tail[1..];
                !digits.is_empty()
                    && digits.chars().all(|c| c.is_ascii_digit())
                    && head.ends_with(|c: char| c.is_ascii_digit())
            }
            None => false,
        };
    }
    name.ends_with(|c: char| c.is_ascii_digit())
}

/// Block devices of one /proc/diskstats read, already grouped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskSnapshot {
    pub physical: Vec<DiskStats>,
    pub loops: Vec<DiskStats>,
}

impl DiskSnapshot {
    pub fn from_devices(devices: Vec<DiskStats>) -> Self {
        let mut snapshot = Self::default();
        for dev in devices {
            match classify_device(&dev.device) {
                DeviceClass::Physical => snapshot.physical.push(dev),
                DeviceClass::Loop => snapshot.loops.push(dev),
                DeviceClass::Ignored => {}
            }
        }
        snapshot
    }
}

/// Parses /proc/diskstats. An empty file (no block devices, as in some
/// containers) yields an empty list.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged
/// w_sectors w_time io_pending io_time w_io_time [discard and flush columns]
pub fn parse_diskstats(content: &str) -> Result<Vec<DiskStats>, ParseError> {
    let mut disks = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < DISKSTATS_MIN_FIELDS {
            return Err(ParseError::new(format!(
                "diskstats line has {} columns, expected at least {}",
                parts.len(),
                DISKSTATS_MIN_FIELDS
            )));
        }

        let device = parts[2];
        let get = |idx: usize, field: &str| parse_u64(parts[idx], field);

        disks.push(DiskStats {
            device: device.to_string(),
            sectors_read: get(5, "sectors_read")?,
            read_time_ms: get(6, "read_time")?,
            sectors_written: get(9, "sectors_written")?,
            write_time_ms: get(10, "write_time")?,
            io_in_progress: get(11, "io_in_progress")?,
            io_time_ms: get(12, "io_time")?,
        });
    }

    Ok(disks)
}
