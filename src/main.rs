//! hostprom - exposes Linux host metrics for Prometheus.
//!
//! Samples /proc once per second and serves the latest values on
//! `http://<listen>/metrics`.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use hostprom::metrics::HostSample;
use hostprom::sampler::SAMPLE_INTERVAL;
use hostprom::server::{self, DEFAULT_PORT};
use hostprom::{MetricsContext, ProcSource, RealFs, Sampler};

/// Prometheus exporter for host CPU, memory, disk, network and process metrics
#[derive(Parser, Debug)]
#[command(name = "hostprom")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to serve /metrics on
    #[arg(short, long, default_value_t = SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)))]
    listen: SocketAddr,

    /// Root of the proc filesystem to read counters from
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Print one JSON sample to stdout and exit instead of serving
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("hostprom={}", level)
            .parse()
            .context("Invalid log directive")?,
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

/// Takes two samples one interval apart so CPU usage is meaningful.
fn print_once(source: &ProcSource<RealFs>) -> Result<()> {
    let first = HostSample::collect(source, None).context("Failed to read counters")?;
    std::thread::sleep(SAMPLE_INTERVAL);
    let sample =
        HostSample::collect(source, first.cpu.as_ref()).context("Failed to read counters")?;

    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet)?;

    let source = ProcSource::new(RealFs::new(), &args.proc_path);

    if args.once {
        return print_once(&source);
    }

    info!("hostprom {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        listen = %args.listen,
        proc = %args.proc_path.display(),
        interval_ms = SAMPLE_INTERVAL.as_millis() as u64,
        "Config"
    );

    let ctx = Arc::new(MetricsContext::new().context("Failed to register metrics")?);
    let listener = server::bind(args.listen).await?;

    let mut sampler = Sampler::new(source, Arc::clone(&ctx));
    if let Err(e) = sampler.publish_total_memory() {
        warn!(error = %e, "Total memory unavailable at startup, retrying every tick");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let sampler_shutdown = Arc::clone(&shutdown);
    let sampler_handle = std::thread::Builder::new()
        .name("sampler".to_string())
        .spawn(move || sampler.run(&sampler_shutdown, SAMPLE_INTERVAL))
        .context("Failed to spawn sampler thread")?;

    let signal_shutdown = Arc::clone(&shutdown);
    let served = server::serve(listener, ctx, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
        signal_shutdown.store(true, Ordering::SeqCst);
    })
    .await;

    shutdown.store(true, Ordering::SeqCst);
    sampler_handle
        .join()
        .map_err(|_| anyhow!("Sampler thread panicked"))?;

    served.context("Exposition server failed")?;
    info!("Shutdown complete");
    Ok(())
}
