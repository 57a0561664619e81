//! Configuration for a rotating log file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::window::RotationPolicy;
use crate::writer::RotatingWriter;
use crate::{EvanescentError, Result};

/// Default retention period in seconds (7 days).
pub const DEFAULT_KEEP_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for a [`RotatingWriter`].
///
/// ```toml
/// path = "/var/log/myapp/app.log"
/// rotation = "hourly"
/// keep_secs = 86400
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Live log file.
    pub path: PathBuf,

    /// Rotation window.
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// How long compressed files are kept, in seconds.
    #[serde(default = "default_keep_secs")]
    pub keep_secs: u64,
}

fn default_keep_secs() -> u64 {
    DEFAULT_KEEP_SECS
}

impl WriterConfig {
    pub fn new(path: impl Into<PathBuf>, rotation: RotationPolicy, keep: Duration) -> Self {
        Self {
            path: path.into(),
            rotation,
            keep_secs: keep.as_secs(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| EvanescentError::Config(e.to_string()))
    }

    pub fn keep(&self) -> Duration {
        Duration::from_secs(self.keep_secs)
    }

    /// Build the writer this configuration describes.
    pub fn open(self) -> Result<RotatingWriter> {
        RotatingWriter::new(&self.path, self.rotation, self.keep())
    }
}
