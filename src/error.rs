//! Error types for meshstat.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::analysis::types::SourceFailure;

/// A log source that could not be read.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed for {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    pub fn path(&self) -> &PathBuf {
        match self {
            SourceError::Open { path, .. } | SourceError::Read { path, .. } => path,
        }
    }

    /// Summary kept alongside successful results
    pub fn into_failure(self) -> SourceFailure {
        let reason = match &self {
            SourceError::Open { source, .. } => format!("cannot open: {}", source),
            SourceError::Read { source, .. } => format!("read failed: {}", source),
        };
        SourceFailure {
            path: self.path().clone(),
            reason,
        }
    }
}

/// Fatal outcomes of a batch analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No paths were supplied at all.
    #[error("no input files given")]
    NoInput,

    /// Every supplied path failed to open or read.
    #[error("none of the {} input files could be read", .failures.len())]
    NoReadableInput { failures: Vec<SourceFailure> },
}

/// Live session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("live feed read error: {0}")]
    Read(#[source] io::Error),

    #[error("command write error: {0}")]
    Write(#[source] io::Error),

    /// The consumer stopped before the session was shut down.
    #[error("live session closed")]
    Closed,

    #[error("live session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
