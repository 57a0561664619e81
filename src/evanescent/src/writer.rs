//! The rotating byte sink.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::compressor::CompressionJob;
use crate::purger;
use crate::rotator::{self, LiveFile, RotationOutcome};
use crate::window::RotationPolicy;
use crate::{EvanescentError, Result};

/// A log file that rotates, compresses and purges itself as it is written.
///
/// Every [`write`](Self::write) runs, under one lock:
/// 1. purge of expired `.gz` files
/// 2. rotation check
/// 3. dispatch of a background compression job
/// 4. lazy open of the live file, then the write itself
///
/// Steps 1-3 log and absorb their failures. Only step 4 can fail the call.
///
/// Compression jobs are serialized: dispatching one first waits for the
/// previous job. [`close`](Self::close) does not wait for a running job;
/// call [`wait_for_compression`](Self::wait_for_compression) for that.
pub struct RotatingWriter {
    path: PathBuf,
    escaped: String,
    policy: RotationPolicy,
    keep: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<LiveFile>,
    pending: Mutex<Option<CompressionJob>>,
}

impl RotatingWriter {
    /// Create a writer for `path` using the system clock.
    ///
    /// Nothing is opened until the first write.
    pub fn new(path: impl AsRef<Path>, policy: RotationPolicy, keep: Duration) -> Result<Self> {
        Self::with_clock(path, policy, keep, Arc::new(SystemClock))
    }

    /// Create a writer that takes its notion of "now" from `clock`.
    pub fn with_clock(
        path: impl AsRef<Path>,
        policy: RotationPolicy,
        keep: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.file_name().is_none() {
            return Err(EvanescentError::InvalidPath(format!(
                "{} has no file name",
                path.display()
            )));
        }
        let escaped = path
            .to_str()
            .map(glob::Pattern::escape)
            .ok_or_else(|| {
                EvanescentError::InvalidPath(format!("{} is not valid UTF-8", path.display()))
            })?;

        let current_suffix = policy.suffix(&clock.now());
        Ok(Self {
            path,
            escaped,
            policy,
            keep,
            clock,
            state: Mutex::new(LiveFile {
                file: None,
                current_suffix,
            }),
            pending: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn keep(&self) -> Duration {
        self.keep
    }

    /// Whether the live file is currently held open.
    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    /// Suffix of the window the live file is being written in.
    pub fn current_suffix(&self) -> String {
        self.state.lock().current_suffix.clone()
    }

    /// Appends `bytes` to the live file, returning the number written.
    ///
    /// Fails only when the live file cannot be opened or written.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        self.purge(now);
        if let RotationOutcome::Rotated { to, renamed } =
            rotator::rotate(&self.path, self.policy, &mut state, now)
        {
            debug!(to = %to.display(), renamed, "Rotation check moved live file");
        }
        self.dispatch_compression();

        let file = self.ensure_open(&mut state, now)?;
        file.write_all(bytes)?;
        Ok(bytes.len())
    }

    /// Releases the live file. A pending compression job keeps running.
    ///
    /// The handle is dropped even if flushing it to disk fails.
    pub fn close(&self) -> Result<()> {
        let file = self.state.lock().file.take();
        if let Some(file) = file {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Blocks until the most recently dispatched compression job finishes.
    ///
    /// Returns immediately when nothing is pending. A failed job is logged.
    pub fn wait_for_compression(&self) {
        let mut pending = self.pending.lock();
        if let Some(job) = pending.take() {
            job.wait();
        }
    }

    fn purge(&self, now: DateTime<Local>) {
        if let Err(e) = purger::purge(&self.path, &self.escaped, self.policy, self.keep, now) {
            warn!(path = %self.path.display(), error = %e, "Failed to purge expired log files");
        }
    }

    fn dispatch_compression(&self) {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.wait();
        }
        match CompressionJob::spawn(self.escaped.clone(), self.policy) {
            Ok(job) => *pending = Some(job),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to start compression job");
            }
        }
    }

    fn ensure_open<'a>(
        &self,
        state: &'a mut LiveFile,
        now: DateTime<Local>,
    ) -> Result<&'a mut File> {
        let file = match state.file.take() {
            Some(file) => file,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                state.current_suffix = self.policy.suffix(&now);
                file
            }
        };
        Ok(state.file.insert(file))
    }
}

impl std::fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("keep", &self.keep)
            .finish_non_exhaustive()
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RotatingWriter::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RotatingWriter::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::window;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    fn manual_writer(policy: RotationPolicy) -> (TempDir, Arc<ManualClock>, RotatingWriter) {
        let temp_dir = TempDir::new().unwrap();
        let start = Local.with_ymd_and_hms(2024, 6, 15, 10, 15, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let writer = RotatingWriter::with_clock(
            temp_dir.path().join("app.log"),
            policy,
            Duration::from_secs(3600),
            clock.clone(),
        )
        .unwrap();
        (temp_dir, clock, writer)
    }

    #[test]
    fn test_rejects_path_without_file_name() {
        let result = RotatingWriter::new("/", RotationPolicy::Daily, Duration::from_secs(60));
        assert!(matches!(result, Err(EvanescentError::InvalidPath(_))));
    }

    #[test]
    fn test_does_not_open_until_first_write() {
        let (_temp, _clock, writer) = manual_writer(RotationPolicy::Hourly);
        assert!(!writer.is_open());
        assert!(!writer.path().exists());

        assert_eq!(writer.write(b"hello").unwrap(), 5);
        assert!(writer.is_open());
        assert_eq!(fs::read(writer.path()).unwrap(), b"hello");
    }

    #[test]
    fn test_writes_in_one_window_append_in_order() {
        let (_temp, clock, writer) = manual_writer(RotationPolicy::Hourly);
        for chunk in ["one ", "two ", "three"] {
            writer.write(chunk.as_bytes()).unwrap();
            clock.advance(chrono::Duration::minutes(10));
        }
        writer.wait_for_compression();

        assert_eq!(fs::read_to_string(writer.path()).unwrap(), "one two three");
        assert_eq!(writer.current_suffix(), "2024061510");
    }

    #[test]
    fn test_close_then_write_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let writer = RotatingWriter::new(
            temp_dir.path().join("app.log"),
            RotationPolicy::Daily,
            Duration::from_secs(60),
        )
        .unwrap();

        writer.write(b"a").unwrap();
        writer.close().unwrap();
        assert!(!writer.is_open());
        writer.close().unwrap();

        writer.write(b"b").unwrap();
        writer.wait_for_compression();
        assert!(writer.is_open());
        assert_eq!(fs::read(writer.path()).unwrap(), b"ab");
    }

    #[test]
    fn test_write_fails_when_directory_missing() {
        let temp_dir = TempDir::new().unwrap();
        let writer = RotatingWriter::new(
            temp_dir.path().join("missing").join("app.log"),
            RotationPolicy::Daily,
            Duration::from_secs(60),
        )
        .unwrap();

        let err = writer.write(b"lost").unwrap_err();
        assert!(matches!(err, EvanescentError::Io(_)));
        assert!(!writer.is_open());
        writer.wait_for_compression();
    }

    #[test]
    fn test_wait_for_compression_is_idempotent() {
        let (_temp, _clock, writer) = manual_writer(RotationPolicy::Hourly);
        writer.wait_for_compression();
        writer.write(b"x").unwrap();
        writer.wait_for_compression();
        writer.wait_for_compression();
        assert!(writer.pending.lock().is_none());
    }

    #[test]
    fn test_next_dispatch_waits_for_running_job() {
        let temp_dir = TempDir::new().unwrap();
        let start = Local.with_ymd_and_hms(2024, 6, 15, 10, 15, 0).unwrap();
        let writer = RotatingWriter::with_clock(
            temp_dir.path().join("app.log"),
            RotationPolicy::Hourly,
            Duration::from_secs(86400),
            Arc::new(ManualClock::new(start)),
        )
        .unwrap();

        let suffixes = ["2024061506", "2024061507", "2024061508", "2024061509"];
        let payload = "0123456789abcdef\n".repeat(64 * 1024);
        for suffix in suffixes {
            fs::write(window::rotated_path(writer.path(), suffix), &payload).unwrap();
        }

        // The second write has to join the job the first one started.
        writer.write(b"first\n").unwrap();
        writer.write(b"second\n").unwrap();

        for suffix in suffixes {
            assert!(!window::rotated_path(writer.path(), suffix).exists());
            let mut content = String::new();
            flate2::read::GzDecoder::new(
                fs::File::open(window::compressed_path(writer.path(), suffix)).unwrap(),
            )
            .read_to_string(&mut content)
            .unwrap();
            assert_eq!(content.len(), payload.len());
        }
        writer.wait_for_compression();
    }

    #[test]
    fn test_io_write_impl_for_shared_reference() {
        let (temp, _clock, writer) = manual_writer(RotationPolicy::Daily);
        let writer = Arc::new(writer);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || {
                    let mut sink = &*writer;
                    sink.write_all(format!("line {i}\n").as_bytes()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        writer.wait_for_compression();

        let content = fs::read_to_string(temp.path().join("app.log")).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(!window::rotated_path(writer.path(), "20240615").exists());
    }
}
