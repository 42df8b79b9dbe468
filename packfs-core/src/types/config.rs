//! Configuration types for packfs.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Default number of nested overlay rewrites followed for one lookup.
pub const DEFAULT_MAX_OVERLAY_DEPTH: usize = 16;

/// Default chunk size for whole-file loads.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Largest accepted chunk size.
pub const MAX_READ_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Log level for packfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only log errors
    Error,
    /// Log errors and warnings
    Warn,
    /// Log errors, warnings, and informational messages
    Info,
    /// Log errors, warnings, info, and debug messages
    Debug,
    /// Log everything including per-record scanning
    Trace,
}

impl LogLevel {
    /// Returns the string representation of the log level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Configuration for a [`Vfs`](crate::Vfs) instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Root for relative real-filesystem paths (process CWD if None)
    pub base_dir: Option<PathBuf>,

    /// How many overlay rewrites deep a single lookup may go
    pub max_overlay_depth: usize,

    /// Chunk size used when loading whole files
    pub read_chunk_size: usize,

    /// Omit dot-files from real directory listings
    pub skip_hidden: bool,

    /// Logging level
    pub log_level: LogLevel,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            max_overlay_depth: DEFAULT_MAX_OVERLAY_DEPTH,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            skip_hidden: true,
            log_level: LogLevel::Info,
        }
    }
}

impl VfsConfig {
    /// Creates a new VfsConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config suitable for development/testing.
    pub fn development() -> Self {
        Self {
            log_level: LogLevel::Debug,
            skip_hidden: false,
            ..Self::default()
        }
    }

    /// Sets the directory relative real paths resolve against.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Sets the overlay recursion limit.
    pub fn max_overlay_depth(mut self, depth: usize) -> Self {
        self.max_overlay_depth = depth;
        self
    }

    /// Sets the chunk size for whole-file loads.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Sets whether dot-files are hidden from real directory listings.
    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.read_chunk_size == 0 {
            errors.push("read_chunk_size must be greater than zero".to_string());
        } else if self.read_chunk_size > MAX_READ_CHUNK_SIZE {
            errors.push(format!(
                "read_chunk_size {} exceeds the maximum of {}",
                self.read_chunk_size, MAX_READ_CHUNK_SIZE
            ));
        }

        if self.max_overlay_depth == 0 {
            errors.push("max_overlay_depth must be at least 1".to_string());
        }

        if let Some(base) = &self.base_dir {
            if !base.is_dir() {
                errors.push(format!("Base directory does not exist: {:?}", base));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
