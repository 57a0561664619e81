//! Background gzip compression of rotated files.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::UNIX_EPOCH;

use flate2::{Compression, GzBuilder};
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::window::{self, GZ_EXTENSION, RotationPolicy};

/// Name of the thread each compression job runs on.
pub const COMPRESSION_THREAD_NAME: &str = "evanescent-compress";

/// Stats from one compression job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionStats {
    /// Rotated files turned into `.gz`.
    pub compressed: usize,
    /// Sources that were compressed but could not be deleted afterwards.
    pub stale_sources: usize,
}

/// Suffix of the file an archive is written to before it is renamed into place.
const STAGING_EXTENSION: &str = ".tmp";

/// Compresses `source` into `<source>.gz`, keeping its base name and
/// modification time in the gzip header. The source is left untouched.
///
/// The archive is written under a staging name and renamed over the target
/// only once complete, so a failure never leaves a truncated `.gz` behind.
pub fn gzip_file(source: &Path) -> io::Result<PathBuf> {
    let target = archive_path(source);
    let mut staging = target.as_os_str().to_owned();
    staging.push(STAGING_EXTENSION);
    let staging = PathBuf::from(staging);

    match write_archive(source, &staging).and_then(|()| fs::rename(&staging, &target)) {
        Ok(()) => Ok(target),
        Err(e) => {
            discard_staging(&staging);
            Err(e)
        }
    }
}

fn archive_path(source: &Path) -> PathBuf {
    let mut target = source.as_os_str().to_owned();
    target.push(GZ_EXTENSION);
    PathBuf::from(target)
}

fn write_archive(source: &Path, staging: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let mtime = input
        .metadata()?
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| u32::try_from(d.as_secs()).ok())
        .unwrap_or(0);
    let name = source
        .file_name()
        .map(|n| n.as_encoded_bytes().to_vec())
        .unwrap_or_default();

    let output = File::create(staging)?;
    let mut encoder = GzBuilder::new()
        .filename(name)
        .mtime(mtime)
        .write(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()
}

fn discard_staging(staging: &Path) {
    match fs::remove_file(staging) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %staging.display(), error = %e, "Failed to remove partial archive"),
    }
}

/// Compresses every uncompressed rotated file of the scanned path.
///
/// A source whose `.gz` already exists was compressed by an earlier job that
/// could not delete it; the archive stands and only the deletion is retried.
/// The first file that fails to compress aborts the job with its source kept
/// for the next one. A source that cannot be deleted is logged and counted,
/// not treated as failure.
pub fn compress_rotated(escaped: &str, policy: RotationPolicy) -> Result<CompressionStats> {
    let mut stats = CompressionStats::default();
    let pattern = window::uncompressed_pattern(escaped, policy);

    let mut candidates = Vec::new();
    for entry in glob::glob(&pattern)? {
        candidates.push(entry.map_err(glob::GlobError::into_error)?);
    }

    for source in candidates {
        let existing = archive_path(&source);
        let target = if existing.is_file() {
            debug!(path = %existing.display(), "Archive already present, removing source only");
            existing
        } else {
            let target = gzip_file(&source)?;
            stats.compressed += 1;
            target
        };

        match fs::remove_file(&source) {
            Ok(()) => {
                info!(path = %target.display(), "Compressed rotated log file");
            }
            Err(e) => {
                warn!(
                    path = %source.display(),
                    error = %e,
                    "Failed to remove compressed log file source"
                );
                stats.stale_sources += 1;
            }
        }
    }

    Ok(stats)
}

/// Handle to a compression job running in the background.
///
/// The job never panics on I/O errors; its outcome surfaces only through
/// [`CompressionJob::wait`], which logs failures instead of returning them.
pub struct CompressionJob {
    handle: JoinHandle<Result<CompressionStats>>,
}

impl CompressionJob {
    /// Starts compressing the rotated files matched by `escaped`.
    pub fn spawn(escaped: String, policy: RotationPolicy) -> io::Result<Self> {
        let handle = std::thread::Builder::new()
            .name(COMPRESSION_THREAD_NAME.to_string())
            .spawn(move || compress_rotated(&escaped, policy))?;
        Ok(Self { handle })
    }

    /// Check if the job has completed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the job finishes. A failed or panicked job is logged
    /// once and yields `None`.
    pub fn wait(self) -> Option<CompressionStats> {
        match self.handle.join() {
            Ok(Ok(stats)) => {
                debug!(
                    compressed = stats.compressed,
                    stale_sources = stats.stale_sources,
                    "Compression job completed"
                );
                Some(stats)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Compression job failed");
                None
            }
            Err(_) => {
                error!("Compression job panicked");
                None
            }
        }
    }
}

impl std::fmt::Debug for CompressionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionJob")
            .field("finished", &self.is_finished())
            .finish()
    }
}
