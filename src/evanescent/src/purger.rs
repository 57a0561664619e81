//! Age-based deletion of compressed rotated files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::Result;
use crate::window::{self, GZ_EXTENSION, RotationPolicy};

/// Result of a purge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Files removed, in scan order.
    pub deleted: Vec<PathBuf>,
    /// Expired files that could not be removed.
    pub failed: usize,
}

/// Deletes every `<path>.<suffix>.gz` whose window start is more than `keep`
/// before `now`.
///
/// A listing failure aborts the pass. A failed deletion is logged and the
/// remaining candidates are still processed.
pub fn purge(
    path: &Path,
    escaped: &str,
    policy: RotationPolicy,
    keep: Duration,
    now: DateTime<Local>,
) -> Result<PurgeReport> {
    let mut report = PurgeReport::default();
    let pattern = window::compressed_pattern(escaped, policy);

    let mut candidates = Vec::new();
    for entry in glob::glob(&pattern)? {
        candidates.push(entry.map_err(glob::GlobError::into_error)?);
    }

    for candidate in candidates {
        let Some(suffix) = embedded_suffix(path, &candidate) else {
            continue;
        };
        let Some(created) = policy.parse_suffix(suffix) else {
            debug!(path = %candidate.display(), "Skipping file with unparseable suffix");
            continue;
        };

        if !is_expired(now.signed_duration_since(created), keep) {
            continue;
        }

        match fs::remove_file(&candidate) {
            Ok(()) => {
                info!(path = %candidate.display(), "Purged expired log file");
                report.deleted.push(candidate);
            }
            Err(e) => {
                warn!(
                    path = %candidate.display(),
                    error = %e,
                    "Failed to purge expired log file"
                );
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Strict comparison: a file exactly `keep` old is still retained.
fn is_expired(age: chrono::Duration, keep: Duration) -> bool {
    age.to_std().is_ok_and(|age| age > keep)
}

/// Extracts `<suffix>` from `<path>.<suffix>.gz`.
fn embedded_suffix<'a>(path: &Path, candidate: &'a Path) -> Option<&'a str> {
    let base = path.file_name()?.to_str()?;
    candidate
        .file_name()?
        .to_str()?
        .strip_prefix(base)?
        .strip_prefix('.')?
        .strip_suffix(GZ_EXTENSION)
}
