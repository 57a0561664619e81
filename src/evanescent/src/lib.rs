//! Self-rotating log file sink.
//!
//! A [`RotatingWriter`] owns a single log file and accepts raw byte writes.
//! On every write it:
//!
//! - **Purges** compressed rotated files older than the retention period
//! - **Rotates** the live file aside when the hourly or daily window changes
//! - **Compresses** rotated files with gzip on a background thread
//!
//! Only the final open and write step can fail the call. Purge, rotation and
//! compression failures are logged through `tracing` and absorbed, so a
//! process that logs through this sink keeps running under filesystem
//! contention.
//!
//! # On-disk layout
//!
//! ```text
//! app.log                  live file
//! app.log.2024061510       rotated, waiting for compression (hourly)
//! app.log.2024061509.gz    rotated and compressed
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use evanescent::{RotatingWriter, RotationPolicy};
//! use std::time::Duration;
//!
//! let writer = RotatingWriter::new(
//!     "/var/log/myapp/app.log",
//!     RotationPolicy::Daily,
//!     Duration::from_secs(7 * 24 * 60 * 60),
//! )
//! .expect("invalid log path");
//!
//! writer.write(b"service started\n").expect("write failed");
//! writer.close().expect("close failed");
//! writer.wait_for_compression();
//! ```

pub mod clock;
pub mod compressor;
pub mod config;
pub mod purger;
pub mod rotator;
pub mod window;
pub mod writer;

pub use clock::{Clock, SystemClock};
#[doc(hidden)]
pub use clock::ManualClock;
pub use compressor::{CompressionJob, CompressionStats};
pub use config::WriterConfig;
pub use purger::PurgeReport;
pub use rotator::RotationOutcome;
pub use window::RotationPolicy;
pub use writer::RotatingWriter;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvanescentError {
    #[error("Invalid log path: {0}")]
    InvalidPath(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid scan pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EvanescentError>;

impl From<EvanescentError> for std::io::Error {
    fn from(err: EvanescentError) -> Self {
        match err {
            EvanescentError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}
