//! Metric Registry plus the Synchronization Layer that guards it.
//!
//! All metric handles live behind one mutex. Publishing goes through
//! [`MetricsContext::publish`], which hands out the handles only while the
//! lock is held; rendering takes the same lock around `gather()`. A scrape
//! therefore never sees a domain halfway through an update, although two
//! domains in one response may come from different ticks.

use std::sync::{Mutex, MutexGuard, PoisonError};

use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::error::ExporterError;

/// Every metric the exporter publishes.
pub struct HostMetrics {
    pub cpu_usage: Gauge,
    pub cpu_user_ticks: IntCounter,
    pub cpu_kernel_ticks: IntCounter,
    pub cpu_idle_ticks: IntCounter,
    pub cpu_iowait_ticks: IntCounter,

    pub memory_total: IntGauge,
    pub memory_used: IntGauge,
    pub memory_free: IntGauge,
    pub memory_usage: Gauge,

    pub disk_sectors_read: IntCounterVec,
    pub disk_sectors_written: IntCounterVec,
    pub loop_sectors_read: IntCounterVec,
    pub loop_sectors_written: IntCounterVec,
    pub disk_read_time: IntCounterVec,
    pub disk_write_time: IntCounterVec,
    pub disk_io_in_progress: IntGaugeVec,
    pub disk_io_time: IntCounterVec,

    pub processes_count: IntGauge,
    pub processes_running: IntGauge,
    pub processes_blocked: IntGauge,

    pub net_rx_bytes: IntCounterVec,
    pub net_tx_bytes: IntCounterVec,
    pub net_rx_packets: IntCounterVec,
    pub net_tx_packets: IntCounterVec,
    pub net_rx_errors: IntCounterVec,
    pub net_tx_errors: IntCounterVec,
}

struct Builder<'a> {
    registry: &'a Registry,
}

impl Builder<'_> {
    fn gauge(&self, name: &str, help: &str) -> prometheus::Result<Gauge> {
        let gauge = Gauge::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    fn int_gauge(&self, name: &str, help: &str) -> prometheus::Result<IntGauge> {
        let gauge = IntGauge::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    fn int_gauge_vec(&self, name: &str, help: &str, label: &str) -> prometheus::Result<IntGaugeVec> {
        let gauge_vec = IntGaugeVec::new(Opts::new(name, help), &[label])?;
        self.registry.register(Box::new(gauge_vec.clone()))?;
        Ok(gauge_vec)
    }

    fn counter(&self, name: &str, help: &str) -> prometheus::Result<IntCounter> {
        let counter = IntCounter::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(counter.clone()))?;
        Ok(counter)
    }

    fn counter_vec(&self, name: &str, help: &str, label: &str) -> prometheus::Result<IntCounterVec> {
        let counter_vec = IntCounterVec::new(Opts::new(name, help), &[label])?;
        self.registry.register(Box::new(counter_vec.clone()))?;
        Ok(counter_vec)
    }
}

impl HostMetrics {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let b = Builder { registry };
        Ok(Self {
            cpu_usage: b.gauge("cpu_usage_percentage", "CPU busy time over the last interval (%)")?,
            cpu_user_ticks: b.counter("cpu_user_time_ticks_total", "CPU time spent in user mode")?,
            cpu_kernel_ticks: b.counter("cpu_kernel_time_ticks_total", "CPU time spent in kernel mode")?,
            cpu_idle_ticks: b.counter("cpu_idle_time_ticks_total", "CPU time spent idle")?,
            cpu_iowait_ticks: b.counter("cpu_iowait_time_ticks_total", "CPU time spent waiting for I/O")?,

            memory_total: b.int_gauge("memory_total_bytes", "Total physical memory")?,
            memory_used: b.int_gauge("memory_used_bytes", "Memory in use")?,
            memory_free: b.int_gauge("memory_free_bytes", "Memory available for new workloads")?,
            memory_usage: b.gauge("memory_usage_percentage", "Memory in use (%)")?,

            disk_sectors_read: b.counter_vec("disk_sectors_read_total", "Sectors read from physical disks", "device")?,
            disk_sectors_written: b.counter_vec("disk_sectors_written_total", "Sectors written to physical disks", "device")?,
            loop_sectors_read: b.counter_vec("loop_sectors_read_total", "Sectors read from loop devices", "device")?,
            loop_sectors_written: b.counter_vec("loop_sectors_written_total", "Sectors written to loop devices", "device")?,
            disk_read_time: b.counter_vec("disk_read_time_ms_total", "Time spent reading (ms)", "device")?,
            disk_write_time: b.counter_vec("disk_write_time_ms_total", "Time spent writing (ms)", "device")?,
            disk_io_in_progress: b.int_gauge_vec("disk_io_in_progress", "I/Os currently in flight", "device")?,
            disk_io_time: b.counter_vec("disk_io_time_ms_total", "Time spent doing I/Os (ms)", "device")?,

            processes_count: b.int_gauge("processes_count", "Number of processes")?,
            processes_running: b.int_gauge("processes_running", "Runnable tasks")?,
            processes_blocked: b.int_gauge("processes_blocked", "Tasks blocked on I/O")?,

            net_rx_bytes: b.counter_vec("network_received_bytes_total", "Bytes received", "interface")?,
            net_tx_bytes: b.counter_vec("network_sent_bytes_total", "Bytes sent", "interface")?,
            net_rx_packets: b.counter_vec("network_received_packets_total", "Packets received", "interface")?,
            net_tx_packets: b.counter_vec("network_sent_packets_total", "Packets sent", "interface")?,
            net_rx_errors: b.counter_vec("network_received_errors_total", "Receive errors", "interface")?,
            net_tx_errors: b.counter_vec("network_sent_errors_total", "Transmit errors", "interface")?,
        })
    }

    /// Families keyed by the `device` label of physical disks.
    pub fn physical_disk_families(&self) -> [&IntCounterVec; 5] {
        [
            &self.disk_sectors_read,
            &self.disk_sectors_written,
            &self.disk_read_time,
            &self.disk_write_time,
            &self.disk_io_time,
        ]
    }

    pub fn loop_families(&self) -> [&IntCounterVec; 2] {
        [&self.loop_sectors_read, &self.loop_sectors_written]
    }

    pub fn interface_families(&self) -> [&IntCounterVec; 6] {
        [
            &self.net_rx_bytes,
            &self.net_tx_bytes,
            &self.net_rx_packets,
            &self.net_tx_packets,
            &self.net_rx_errors,
            &self.net_tx_errors,
        ]
    }

    /// Drops every series of a physical disk.
    pub fn remove_disk(&self, device: &str) {
        for family in self.physical_disk_families() {
            let _ = family.remove_label_values(&[device]);
        }
        let _ = self.disk_io_in_progress.remove_label_values(&[device]);
    }

    pub fn remove_loop(&self, device: &str) {
        for family in self.loop_families() {
            let _ = family.remove_label_values(&[device]);
        }
    }

    pub fn remove_interface(&self, interface: &str) {
        for family in self.interface_families() {
            let _ = family.remove_label_values(&[interface]);
        }
    }
}

/// Moves a counter to a raw kernel value.
///
/// Counters only go up; a kernel value that went backwards (device
/// re-created, wrap) resets the counter first.
pub fn set_counter(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value < current {
        counter.reset();
        counter.inc_by(value);
    } else {
        counter.inc_by(value - current);
    }
}

/// Sets an integer gauge from an unsigned kernel value.
pub fn set_gauge(gauge: &IntGauge, value: u64) {
    gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
}

/// The registry and its lock, shared by the sampler and the HTTP handler.
pub struct MetricsContext {
    registry: Registry,
    metrics: Mutex<HostMetrics>,
}

impl MetricsContext {
    /// Creates the registry and registers every metric.
    pub fn new() -> Result<Self, ExporterError> {
        let registry = Registry::new();
        let metrics = HostMetrics::register(&registry)?;
        Ok(Self {
            registry,
            metrics: Mutex::new(metrics),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HostMetrics> {
        // Writers compute every value before locking, so a panic while
        // holding the guard cannot leave a half-written metric behind.
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `update` as one critical section.
    ///
    /// `update` must not do I/O: read counter sources first, then publish.
    pub fn publish<R>(&self, update: impl FnOnce(&HostMetrics) -> R) -> R {
        let metrics = self.lock();
        update(&metrics)
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let families = {
            let _guard = self.lock();
            self.registry.gather()
        };

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}
