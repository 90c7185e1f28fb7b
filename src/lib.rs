//! hostprom - Linux host metrics exporter.
//!
//! A sampler thread reads kernel counters (CPU, memory, block devices,
//! network interfaces, processes) every [`sampler::SAMPLE_INTERVAL`] and
//! publishes them into a Prometheus registry. An HTTP server renders the same
//! registry on each scrape. Both sides go through one lock held by
//! [`registry::MetricsContext`].

pub mod error;
pub mod metrics;
pub mod registry;
pub mod sampler;
pub mod server;
pub mod source;

pub use error::{ExporterError, SourceError};
pub use registry::MetricsContext;
pub use sampler::Sampler;
pub use source::{CounterSource, Domain, FileSystem, MockFs, ProcSource, RealFs};
