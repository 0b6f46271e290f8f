use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a traced parse run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Where the archive is published; must not exist yet
    pub archive_path: PathBuf,

    /// Layout of the trace table
    #[serde(default)]
    pub format: TraceFormat,

    /// Compression for archive entries
    #[serde(default)]
    pub compression: ArchiveCompression,

    /// Directory for the writer's staging file (defaults to the archive's
    /// directory). The archive itself is always assembled beside its target.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Upper bound on the staged trace table; the run fails once it is exceeded
    #[serde(default)]
    pub max_staging_bytes: Option<u64>,
}

impl TracerConfig {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            format: TraceFormat::default(),
            compression: ArchiveCompression::default(),
            staging_dir: None,
            max_staging_bytes: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: TraceFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: ArchiveCompression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_max_staging_bytes(mut self, limit: u64) -> Self {
        self.max_staging_bytes = Some(limit);
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| TraceError::invalid_config(format!("failed to parse config: {err}")))?;
        config.validate().map_err(TraceError::InvalidConfig)?;
        Ok(config)
    }

    /// Directory that receives the writer's staging file
    #[must_use]
    pub fn resolved_staging_dir(&self) -> PathBuf {
        match &self.staging_dir {
            Some(dir) => dir.clone(),
            None => self.archive_dir(),
        }
    }

    /// Directory holding the archive; its temp file must live here so the
    /// final rename stays on one filesystem
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        match self.archive_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.archive_path.file_name().is_none() {
            return Err(format!(
                "archive_path ({}) must name a file",
                self.archive_path.display()
            ));
        }

        if let Some(dir) = &self.staging_dir {
            if dir.as_os_str().is_empty() {
                return Err("staging_dir must not be empty".to_string());
            }
        }

        if self.max_staging_bytes == Some(0) {
            return Err("max_staging_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }
}

/// Layout of the archive's trace table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// `nodes.csv`: one row per finished invocation
    #[default]
    Nodes,
    /// `events.json`: every ENTER / SUCCESS / FAILURE event
    Events,
}

impl TraceFormat {
    /// Archive entry holding the trace table
    #[must_use]
    pub const fn entry_name(self) -> &'static str {
        match self {
            Self::Nodes => "nodes.csv",
            Self::Events => "events.json",
        }
    }

    pub(crate) const fn staging_suffix(self) -> &'static str {
        match self {
            Self::Nodes => ".nodes.part",
            Self::Events => ".events.part",
        }
    }
}

impl std::str::FromStr for TraceFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "nodes" => Ok(Self::Nodes),
            "events" => Ok(Self::Events),
            other => Err(format!("unknown trace format: {other} (expected nodes|events)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}
