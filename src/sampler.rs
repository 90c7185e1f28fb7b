//! The Sample-and-Publish Cycle.
//!
//! One tick reads every domain from the [`CounterSource`] and publishes each
//! domain in its own critical section. Reads always happen before the lock
//! is taken. A domain that fails to read is skipped for the tick, so its
//! previously published values stay in place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::error::SourceError;
use crate::metrics::{CpuTimes, DiskSnapshot, MemorySnapshot, NetworkSnapshot, ProcessSnapshot};
use crate::registry::{set_counter, set_gauge, MetricsContext};
use crate::source::{CounterSource, Domain};

/// Time between two sampling ticks.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive successful reads a labelled series may be absent from before
/// it is removed from the registry.
pub const DEVICE_EVICTION_TICKS: u32 = 5;

/// Granularity at which a sleeping sampler notices the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Tracks label values (devices, interfaces) across ticks for eviction.
#[derive(Debug, Default)]
struct SeriesTracker {
    missed: HashMap<String, u32>,
}

impl SeriesTracker {
    /// Records the names present in a successful read and returns the ones
    /// that have now been missing for [`DEVICE_EVICTION_TICKS`] reads.
    fn observe<'a>(&mut self, present: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        for count in self.missed.values_mut() {
            *count += 1;
        }
        for name in present {
            self.missed.insert(name.to_string(), 0);
        }

        let evicted: Vec<String> = self
            .missed
            .iter()
            .filter(|(_, count)| **count >= DEVICE_EVICTION_TICKS)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &evicted {
            self.missed.remove(name);
        }
        evicted
    }
}

/// Periodic sampler owning the previous-tick state.
pub struct Sampler<S: CounterSource> {
    source: S,
    ctx: Arc<MetricsContext>,
    prev_cpu: Option<CpuTimes>,
    total_memory_published: bool,
    disks: SeriesTracker,
    loops: SeriesTracker,
    interfaces: SeriesTracker,
    ticks: u64,
}

impl<S: CounterSource> Sampler<S> {
    pub fn new(source: S, ctx: Arc<MetricsContext>) -> Self {
        Self {
            source,
            ctx,
            prev_cpu: None,
            total_memory_published: false,
            disks: SeriesTracker::default(),
            loops: SeriesTracker::default(),
            interfaces: SeriesTracker::default(),
            ticks: 0,
        }
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Publishes `memory_total_bytes`. Called once at startup; if it fails the
    /// memory domain retries on every tick until it succeeds.
    pub fn publish_total_memory(&mut self) -> Result<(), SourceError> {
        let mem = self.source.read_memory()?;
        self.ctx.publish(|m| set_gauge(&m.memory_total, mem.total));
        self.total_memory_published = true;
        info!(total_bytes = mem.total, "Total memory published");
        Ok(())
    }

    /// Runs one sampling tick across all domains and returns the domains
    /// that could not be updated.
    pub fn tick(&mut self) -> Vec<Domain> {
        let mut failed = Vec::new();

        for domain in Domain::ALL {
            let result = match domain {
                Domain::Cpu => self.source.read_cpu().map(|s| self.publish_cpu(s)),
                Domain::Memory => self.source.read_memory().map(|s| self.publish_memory(s)),
                Domain::Disk => self.source.read_disks().map(|s| self.publish_disks(s)),
                Domain::Network => self.source.read_network().map(|s| self.publish_network(s)),
                Domain::Process => self.source.read_processes().map(|s| self.publish_processes(s)),
            };

            if let Err(e) = result {
                warn!(%domain, error = %e, "Skipping domain for this tick");
                failed.push(domain);
            }
        }

        self.ticks += 1;
        trace!(tick = self.ticks, failed = failed.len(), "Tick complete");
        failed
    }

    /// Ticks every `interval` until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool, interval: Duration) {
        info!(interval_ms = interval.as_millis() as u64, "Starting sampling loop");

        while !shutdown.load(Ordering::SeqCst) {
            self.tick();

            let wake_at = Instant::now() + interval;
            while !shutdown.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= wake_at {
                    break;
                }
                std::thread::sleep((wake_at - now).min(SHUTDOWN_POLL));
            }
        }

        info!(ticks = self.ticks, "Sampling loop stopped");
    }

    fn publish_cpu(&mut self, cpu: CpuTimes) {
        // First tick after startup has nothing to diff against.
        let usage = self.prev_cpu.map_or(0.0, |prev| cpu.usage_since(&prev));
        self.prev_cpu = Some(cpu);

        self.ctx.publish(|m| {
            m.cpu_usage.set(usage);
            set_counter(&m.cpu_user_ticks, cpu.user);
            set_counter(&m.cpu_kernel_ticks, cpu.system);
            set_counter(&m.cpu_idle_ticks, cpu.idle);
            set_counter(&m.cpu_iowait_ticks, cpu.iowait);
        });
    }

    fn publish_memory(&mut self, mem: MemorySnapshot) {
        let publish_total = !self.total_memory_published;

        self.ctx.publish(|m| {
            if publish_total {
                set_gauge(&m.memory_total, mem.total);
            }
            set_gauge(&m.memory_used, mem.used_bytes());
            set_gauge(&m.memory_free, mem.free_bytes());
            m.memory_usage.set(mem.usage_percent());
        });

        if publish_total {
            self.total_memory_published = true;
            debug!(total_bytes = mem.total, "Total memory published on retry");
        }
    }

    fn publish_disks(&mut self, disks: DiskSnapshot) {
        let evicted_disks = self.disks.observe(disks.physical.iter().map(|d| d.device.as_str()));
        let evicted_loops = self.loops.observe(disks.loops.iter().map(|d| d.device.as_str()));

        self.ctx.publish(|m| {
            for d in &disks.physical {
                let dev = [d.device.as_str()];
                set_counter(&m.disk_sectors_read.with_label_values(&dev), d.sectors_read);
                set_counter(&m.disk_sectors_written.with_label_values(&dev), d.sectors_written);
                set_counter(&m.disk_read_time.with_label_values(&dev), d.read_time_ms);
                set_counter(&m.disk_write_time.with_label_values(&dev), d.write_time_ms);
                set_gauge(&m.disk_io_in_progress.with_label_values(&dev), d.io_in_progress);
                set_counter(&m.disk_io_time.with_label_values(&dev), d.io_time_ms);
            }
            for d in &disks.loops {
                let dev = [d.device.as_str()];
                set_counter(&m.loop_sectors_read.with_label_values(&dev), d.sectors_read);
                set_counter(&m.loop_sectors_written.with_label_values(&dev), d.sectors_written);
            }
            for device in &evicted_disks {
                m.remove_disk(device);
            }
            for device in &evicted_loops {
                m.remove_loop(device);
            }
        });

        for device in evicted_disks.iter().chain(&evicted_loops) {
            info!(device = %device, "Evicted block device after {} missed reads", DEVICE_EVICTION_TICKS);
        }
    }

    fn publish_network(&mut self, net: NetworkSnapshot) {
        let evicted = self
            .interfaces
            .observe(net.interfaces.iter().map(|i| i.interface.as_str()));

        self.ctx.publish(|m| {
            for i in &net.interfaces {
                let name = [i.interface.as_str()];
                set_counter(&m.net_rx_bytes.with_label_values(&name), i.rx_bytes);
                set_counter(&m.net_tx_bytes.with_label_values(&name), i.tx_bytes);
                set_counter(&m.net_rx_packets.with_label_values(&name), i.rx_packets);
                set_counter(&m.net_tx_packets.with_label_values(&name), i.tx_packets);
                set_counter(&m.net_rx_errors.with_label_values(&name), i.rx_errors);
                set_counter(&m.net_tx_errors.with_label_values(&name), i.tx_errors);
            }
            for interface in &evicted {
                m.remove_interface(interface);
            }
        });

        for interface in &evicted {
            info!(interface = %interface, "Evicted interface after {} missed reads", DEVICE_EVICTION_TICKS);
        }
    }

    fn publish_processes(&mut self, procs: ProcessSnapshot) {
        self.ctx.publish(|m| {
            set_gauge(&m.processes_count, procs.count);
            set_gauge(&m.processes_running, procs.running);
            set_gauge(&m.processes_blocked, procs.blocked);
        });
    }
}
