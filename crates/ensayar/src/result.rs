//! Result and error types for Ensayar.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Ensayar operations
pub type EnsayarResult<T> = Result<T, EnsayarError>;

/// Errors that can occur in Ensayar
#[derive(Debug, Error)]
pub enum EnsayarError {
    /// start() called on a session that is already recording
    #[error("A recording session is already running for this recorder")]
    AlreadyRecording,

    /// stop() called on a session that is not recording
    #[error("There is no recording session to stop")]
    NotRecording,

    /// The captured surface refused the screenshot (secure view)
    #[error("Capture refused by the device surface: {message}")]
    CaptureDenied {
        /// Error message from the driver
        message: String,
    },

    /// A frame did not match the open segment's locked dimensions
    #[error("Frame is {actual_width}x{actual_height}, segment expects {expected_width}x{expected_height}")]
    DimensionMismatch {
        /// Width the segment was locked to
        expected_width: u32,
        /// Height the segment was locked to
        expected_height: u32,
        /// Width of the rejected frame
        actual_width: u32,
        /// Height of the rejected frame
        actual_height: u32,
    },

    /// Frame encoding failed
    #[error("Frame encoding failed: {message}")]
    FrameEncoding {
        /// Error message
        message: String,
    },

    /// Capability map error
    #[error("Capability error: {message}")]
    Capability {
        /// Error message
        message: String,
    },

    /// Capability profile file does not exist
    #[error("Capability profile not found: {path}")]
    ProfileNotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// Screenshot capture failed
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Device or emulator management failed
    #[error("Device error: {message}")]
    Device {
        /// Error message
        message: String,
    },

    /// Schedule file could not be understood
    #[error("Schedule error: {message}")]
    Schedule {
        /// Error message
        message: String,
    },

    /// A scheduled suite name is not registered
    #[error("Test suite not registered: {name}")]
    SuiteNotFound {
        /// Suite name from the schedule
        name: String,
    },

    /// Selector file error
    #[error("Selector error: {message}")]
    Selector {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl EnsayarError {
    /// True for the capture refusals the recorder and screenshot utilities
    /// tolerate and skip rather than propagate.
    #[must_use]
    pub const fn is_capture_denied(&self) -> bool {
        matches!(self, Self::CaptureDenied { .. })
    }
}
