//! End-to-end sampling tests against synthetic counter sources.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hostprom::metrics::{
    CpuTimes, DiskSnapshot, DiskStats, MemorySnapshot, NetworkSnapshot, ProcessSnapshot,
};
use hostprom::{CounterSource, Domain, MetricsContext, MockFs, ProcSource, Sampler, SourceError};

fn stat(user: u64, system: u64, idle: u64, iowait: u64) -> String {
    format!(
        "cpu  {} 0 {} {} {} 0 0 0 0 0\nprocs_running 1\nprocs_blocked 0\n",
        user, system, idle, iowait
    )
}

fn synthetic_host() -> Arc<MockFs> {
    let fs = Arc::new(MockFs::new());
    fs.add_file("/proc/stat", stat(100, 50, 850, 0));
    fs.add_file("/proc/meminfo", "MemTotal: 2000 kB\nMemFree: 500 kB\nMemAvailable: 800 kB\n");
    fs.add_file(
        "/proc/diskstats",
        "\
   8       0 sda 10 0 2048 5 20 0 4096 9 1 14 14 0 0 0 0
   7       0 loop0 3 0 64 1 0 0 0 0 0 1 1 0 0 0 0
",
    );
    fs.add_file(
        "/proc/net/dev",
        "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
  eth0: 1000 10 0 0 0 0 0 0 2000 20 1 0 0 0 0 0
",
    );
    fs.add_file("/proc/1/stat", "");
    fs
}

/// Value of one exact series in rendered exposition text.
fn sample(text: &str, series: &str) -> Option<f64> {
    text.lines()
        .find_map(|l| l.strip_prefix(series)?.strip_prefix(' '))
        .and_then(|v| v.parse().ok())
}

#[test]
fn cpu_usage_and_device_groups_end_to_end() {
    let fs = synthetic_host();
    let ctx = Arc::new(MetricsContext::new().unwrap());
    let mut sampler = Sampler::new(ProcSource::new(Arc::clone(&fs), "/proc"), Arc::clone(&ctx));

    sampler.publish_total_memory().unwrap();
    assert!(sampler.tick().is_empty());
    let t0 = ctx.render().unwrap();
    assert_eq!(sample(&t0, "cpu_usage_percentage"), Some(0.0));

    // 150 ticks elapse, 15 of them busy.
    fs.add_file("/proc/stat", stat(110, 55, 935, 50));
    assert!(sampler.tick().is_empty());
    let t1 = ctx.render().unwrap();

    let usage = sample(&t1, "cpu_usage_percentage").unwrap();
    assert!((usage - 10.0).abs() < 1e-9, "usage was {}", usage);

    assert_eq!(sample(&t1, "disk_sectors_read_total{device=\"sda\"}"), Some(2048.0));
    assert_eq!(sample(&t1, "disk_sectors_written_total{device=\"sda\"}"), Some(4096.0));
    assert_eq!(sample(&t1, "loop_sectors_read_total{device=\"loop0\"}"), Some(64.0));
    assert_eq!(sample(&t1, "loop_sectors_read_total{device=\"sda\"}"), None);

    for line in t1.lines().filter(|l| !l.starts_with('#')) {
        if line.starts_with("disk_") {
            assert!(!line.contains("loop0"), "loop device in disk metric: {}", line);
        }
        if line.starts_with("loop_") {
            assert!(!line.contains("sda"), "physical disk in loop metric: {}", line);
        }
    }

    assert_eq!(sample(&t1, "memory_total_bytes"), Some(2000.0 * 1024.0));
    assert_eq!(sample(&t1, "memory_free_bytes"), Some(800.0 * 1024.0));
    assert_eq!(sample(&t1, "memory_used_bytes"), Some(1200.0 * 1024.0));
    assert_eq!(sample(&t1, "network_sent_errors_total{interface=\"eth0\"}"), Some(1.0));
    assert_eq!(sample(&t1, "processes_count"), Some(1.0));
}

#[test]
fn every_metric_is_non_negative_after_each_tick() {
    let fs = synthetic_host();
    let ctx = Arc::new(MetricsContext::new().unwrap());
    let mut sampler = Sampler::new(ProcSource::new(Arc::clone(&fs), "/proc"), Arc::clone(&ctx));

    for i in 0..5u64 {
        fs.add_file("/proc/stat", stat(100 + i * 7, 50 + i, 850 + i * 90, i));
        sampler.tick();

        let text = ctx.render().unwrap();
        let mut samples = 0;
        for line in text.lines().filter(|l| !l.starts_with('#')) {
            let value: f64 = line.rsplit(' ').next().unwrap().parse().unwrap();
            assert!(value >= 0.0, "negative sample: {}", line);
            samples += 1;
        }
        assert!(samples > 20);

        let usage = sample(&text, "cpu_usage_percentage").unwrap();
        assert!((0.0..=100.0).contains(&usage));
    }
}

#[test]
fn unreadable_source_only_affects_its_domain() {
    let fs = synthetic_host();
    let ctx = Arc::new(MetricsContext::new().unwrap());
    let mut sampler = Sampler::new(ProcSource::new(Arc::clone(&fs), "/proc"), Arc::clone(&ctx));
    sampler.tick();
    let before = ctx.render().unwrap();

    fs.remove_file("/proc/net/dev");
    fs.add_file("/proc/meminfo", "MemTotal: 2000 kB\nMemFree: 100 kB\n");
    assert_eq!(sampler.tick(), vec![Domain::Network]);
    let after = ctx.render().unwrap();

    let rx = "network_received_bytes_total{interface=\"eth0\"}";
    assert_eq!(sample(&before, rx), sample(&after, rx));
    assert_eq!(sample(&after, "memory_free_bytes"), Some(100.0 * 1024.0));
}

/// Alternates between two memory states on every read.
struct FlappingMemory {
    reads: AtomicU64,
}

impl CounterSource for FlappingMemory {
    fn read_cpu(&self) -> Result<CpuTimes, SourceError> {
        Ok(CpuTimes::default())
    }

    fn read_memory(&self) -> Result<MemorySnapshot, SourceError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        let free = if n % 2 == 0 { 1_000 } else { 9_000 };
        Ok(MemorySnapshot {
            total: 10_000,
            free,
            available: None,
        })
    }

    fn read_disks(&self) -> Result<DiskSnapshot, SourceError> {
        Ok(DiskSnapshot {
            physical: vec![DiskStats {
                device: "sda".to_string(),
                ..Default::default()
            }],
            loops: Vec::new(),
        })
    }

    fn read_network(&self) -> Result<NetworkSnapshot, SourceError> {
        Ok(NetworkSnapshot::default())
    }

    fn read_processes(&self) -> Result<ProcessSnapshot, SourceError> {
        Ok(ProcessSnapshot::default())
    }
}

#[test]
fn concurrent_scrapes_never_see_half_updated_memory() {
    let ctx = Arc::new(MetricsContext::new().unwrap());
    let source = FlappingMemory {
        reads: AtomicU64::new(0),
    };
    let mut sampler = Sampler::new(source, Arc::clone(&ctx));
    sampler.publish_total_memory().unwrap();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = std::thread::spawn(move || {
        sampler.run(&flag, Duration::ZERO);
        sampler.ticks()
    });

    let mut seen_free = std::collections::HashSet::new();
    for _ in 0..500 {
        let text = ctx.render().unwrap();
        let total = sample(&text, "memory_total_bytes").unwrap();
        let used = sample(&text, "memory_used_bytes").unwrap();
        let free = sample(&text, "memory_free_bytes").unwrap();
        if used + free == 0.0 {
            // before the first tick
            continue;
        }
        assert_eq!(used + free, total);
        assert!(free == 1_000.0 || free == 9_000.0, "torn value {}", free);
        seen_free.insert(free as u64);
    }

    shutdown.store(true, Ordering::SeqCst);
    let ticks = handle.join().unwrap();
    assert!(ticks > 0);
    assert!(!seen_free.is_empty());
}

/// Reports a disk whose read counter drops back on every other read, as after
/// a device reset.
struct ResettingDisk {
    reads: AtomicU64,
}

impl CounterSource for ResettingDisk {
    fn read_cpu(&self) -> Result<CpuTimes, SourceError> {
        Ok(CpuTimes::default())
    }

    fn read_memory(&self) -> Result<MemorySnapshot, SourceError> {
        Ok(MemorySnapshot {
            total: 10_000,
            free: 4_000,
            available: None,
        })
    }

    fn read_disks(&self) -> Result<DiskSnapshot, SourceError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        let sectors_read = if n % 2 == 0 { 5_000 } else { 100 };
        Ok(DiskSnapshot {
            physical: vec![DiskStats {
                device: "sda".to_string(),
                sectors_read,
                ..Default::default()
            }],
            loops: Vec::new(),
        })
    }

    fn read_network(&self) -> Result<NetworkSnapshot, SourceError> {
        Ok(NetworkSnapshot::default())
    }

    fn read_processes(&self) -> Result<ProcessSnapshot, SourceError> {
        Ok(ProcessSnapshot::default())
    }
}

#[test]
fn concurrent_scrapes_never_see_a_counter_mid_reset() {
    let ctx = Arc::new(MetricsContext::new().unwrap());
    let source = ResettingDisk {
        reads: AtomicU64::new(0),
    };
    let mut sampler = Sampler::new(source, Arc::clone(&ctx));

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = std::thread::spawn(move || {
        sampler.run(&flag, Duration::ZERO);
        sampler.ticks()
    });

    let mut seen = std::collections::HashSet::new();
    for _ in 0..500 {
        let text = ctx.render().unwrap();
        let Some(value) = sample(&text, "disk_sectors_read_total{device=\"sda\"}") else {
            // before the first tick
            continue;
        };
        assert!(value == 5_000.0 || value == 100.0, "torn counter {}", value);
        seen.insert(value as u64);
    }

    shutdown.store(true, Ordering::SeqCst);
    let ticks = handle.join().unwrap();
    assert!(ticks > 0);
    assert!(!seen.is_empty());
}
