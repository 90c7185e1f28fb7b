//! Error taxonomy for the exporter.
//!
//! Source errors are recovered per tick by skipping the affected domain.
//! Exporter errors only happen at startup and abort the process.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain a Raw Counter Snapshot for one domain.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The counter file is missing or cannot be read.
    #[error("source {path} unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The counter file was read but its content is malformed or truncated.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl SourceError {
    pub fn unavailable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Unavailable {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to start exposition server on {addr}: {source}")]
    ServerStart {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}
