use std::io;
use thiserror::Error;

/// The primary error type for the `tnsflow` library.
///
/// Per-packet trouble (unclassifiable frames, ordering violations,
/// truncated payloads) is not an error: ingestion warns and counts it,
/// then moves on. Only capture access, configuration and the early-stop
/// threshold surface as `Err`.
#[derive(Error, Debug)]
pub enum TnsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed frame limit of {limit} exceeded, ingestion stopped early")]
    MalformedLimitExceeded { limit: u64 },
}
