//! Error types for tuner control and the capture pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Endpoint, FrontendType};

/// Errors raised by [`TunerResource`](crate::tuner::TunerResource).
#[derive(Error, Debug)]
pub enum TunerError {
    /// Discovery probed every adapter without finding a terrestrial frontend.
    #[error("No terrestrial (OFDM) adapter found")]
    NoMatchingAdapter,

    /// Enumeration failed at the first adapter or while reading its info.
    #[error("Error probing adapter {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// One of the three device endpoints could not be opened.
    #[error("Error opening {endpoint} {path}: {source}")]
    Open {
        endpoint: Endpoint,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The explicitly requested device is not a terrestrial frontend.
    #[error("Device {path} is not a DVB-T/ISDB-T frontend (reported {found})")]
    TypeMismatch { path: PathBuf, found: FrontendType },

    /// The property transaction or the demux filter setup was rejected.
    #[error("Configuration failed while {stage}: {source}")]
    Configuration {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// A status or metric read failed.
    #[error("Error reading {what}: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// The operation needs an open resource.
    #[error("Tuner resource is not open")]
    NotOpen,

    /// `open` was called on a resource that already holds handles.
    #[error("Tuner resource is already open")]
    AlreadyOpen,
}

impl TunerError {
    /// OS-level status code of the failure, or -1 when there is none.
    pub fn code(&self) -> i32 {
        match self {
            TunerError::Discovery { source, .. }
            | TunerError::Open { source, .. }
            | TunerError::Configuration { source, .. }
            | TunerError::Query { source, .. } => source.raw_os_error().unwrap_or(-1),
            _ => -1,
        }
    }

    /// Returns true for the transient status/metric read failures.
    pub fn is_query(&self) -> bool {
        matches!(self, TunerError::Query { .. })
    }
}

/// The last failure observed on a tuner resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub message: String,
    pub code: i32,
}

impl From<&TunerError> for LastError {
    fn from(e: &TunerError) -> Self {
        Self {
            message: e.to_string(),
            code: e.code(),
        }
    }
}

/// Errors raised while creating a [`CircularByteBuffer`](crate::ring_buffer::CircularByteBuffer).
#[derive(Error, Debug)]
pub enum BufferError {
    /// Capacity must be a non-zero power of two.
    #[error("Invalid ring buffer capacity: {0} bytes (must be a non-zero power of two)")]
    InvalidCapacity(usize),

    /// The mirrored mapping could not be established.
    #[error("Failed to map ring buffer: {0}")]
    Map(#[source] io::Error),
}

/// A drain write that did not complete. Never fatal to the pipeline.
#[derive(Error, Debug)]
pub enum SinkWriteError {
    #[error("Short write on sink {sink}: {written} of {expected} bytes")]
    ShortWrite {
        sink: String,
        written: usize,
        expected: usize,
    },

    #[error("Write error on sink {sink}: {source}")]
    Io {
        sink: String,
        #[source]
        source: io::Error,
    },
}

/// Errors raised by [`CapturePipeline`](crate::pipeline::CapturePipeline).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Capture pipeline is already running")]
    AlreadyRunning,

    #[error("Capture pipeline is not running")]
    NotRunning,

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("Failed to spawn producer thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Producer thread panicked")]
    ProducerPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_os_error() {
        let err = TunerError::Query {
            what: "status",
            source: io::Error::from_raw_os_error(5),
        };
        assert_eq!(err.code(), 5);
        assert!(err.is_query());

        let last = LastError::from(&err);
        assert_eq!(last.code, 5);
        assert!(last.message.starts_with("Error reading status"));
    }

    #[test]
    fn test_code_without_os_error() {
        assert_eq!(TunerError::NoMatchingAdapter.code(), -1);
        let err = TunerError::TypeMismatch {
            path: PathBuf::from("/dev/dvb/adapter1"),
            found: FrontendType::Qpsk,
        };
        assert_eq!(err.code(), -1);
        assert!(err.to_string().contains("adapter1"));
    }
}
