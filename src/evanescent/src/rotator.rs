//! Decides when the live file is set aside and performs the rename.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::window::{self, RotationPolicy};

/// Mutable per-file state guarded by the writer's lock.
#[derive(Debug)]
pub(crate) struct LiveFile {
    /// Present iff the live file is open for append.
    pub file: Option<File>,
    /// Window the open file is being written in.
    pub current_suffix: String,
}

/// What a rotation check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The live file stays where it is.
    Unchanged,
    /// The live file was set aside to `to`. `renamed` is false when the
    /// rename failed; the in-memory window has advanced regardless.
    Rotated { to: PathBuf, renamed: bool },
}

impl RotationOutcome {
    pub fn is_rotated(&self) -> bool {
        matches!(self, Self::Rotated { .. })
    }
}

/// Runs one rotation check. Never fails: every filesystem error is logged
/// and the writer carries on against a fresh `path`.
pub(crate) fn rotate(
    path: &Path,
    policy: RotationPolicy,
    state: &mut LiveFile,
    now: DateTime<Local>,
) -> RotationOutcome {
    if state.file.is_some() {
        rotate_open(path, policy, state, now)
    } else {
        rotate_resumed(path, policy, now)
    }
}

fn rotate_open(
    path: &Path,
    policy: RotationPolicy,
    state: &mut LiveFile,
    now: DateTime<Local>,
) -> RotationOutcome {
    let suffix = policy.suffix(&now);
    if suffix == state.current_suffix {
        return RotationOutcome::Unchanged;
    }

    if let Some(file) = state.file.take() {
        if let Err(e) = file.sync_all() {
            warn!(path = %path.display(), error = %e, "Failed to close log file before rotation");
        }
    }

    let to = window::rotated_path(path, &state.current_suffix);
    let renamed = move_aside(path, &to);
    state.current_suffix = suffix;
    RotationOutcome::Rotated { to, renamed }
}

/// Handles a file left at `path` by an earlier run. Only its modification
/// time says which window it belongs to, so both it and `now` are projected
/// one stride forward and compared.
///
/// A file that has to move is named for the window it was written in,
/// `suffix(mtime)`, not the projected `suffix(mtime + stride)`, which for a
/// file one window old would equal the live window's suffix and be reused
/// by the next in-session rotation.
fn rotate_resumed(path: &Path, policy: RotationPolicy, now: DateTime<Local>) -> RotationOutcome {
    let mtime = match modified_at(path) {
        Ok(Some(mtime)) => mtime,
        Ok(None) => return RotationOutcome::Unchanged,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to stat existing log file");
            return RotationOutcome::Unchanged;
        }
    };

    let stride = policy.stride();
    if policy.suffix(&(now + stride)) == policy.suffix(&(mtime + stride)) {
        debug!(path = %path.display(), "Existing log file is still in the current window");
        return RotationOutcome::Unchanged;
    }

    let to = window::rotated_path(path, &policy.suffix(&mtime));
    let renamed = move_aside(path, &to);
    RotationOutcome::Rotated { to, renamed }
}

fn modified_at(path: &Path) -> io::Result<Option<DateTime<Local>>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(DateTime::<Local>::from(metadata.modified()?))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn move_aside(from: &Path, to: &Path) -> bool {
    match fs::rename(from, to) {
        Ok(()) => {
            info!(from = %from.display(), to = %to.display(), "Rotated log file");
            true
        }
        Err(e) => {
            warn!(
                from = %from.display(),
                to = %to.display(),
                error = %e,
                "Failed to rotate log file"
            );
            false
        }
    }
}
