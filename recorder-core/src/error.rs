//! # Error Module
//!
//! Error taxonomy for the recorder core. Every fallible core operation returns
//! one of these as a value; nothing in the core aborts the process.
//!
//! Silence is not an error: an all-zero buffer is reported through
//! `has_signal` flags and handled by value in the analyzer and the exporter.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecorderError {
    /// The capture configuration cannot describe a session (zero rate, zero length).
    #[error("invalid capture configuration: {0}")]
    InvalidConfig(String),

    /// The input device is missing or cannot satisfy the requested format.
    #[error("failed to open audio input: {0}")]
    DeviceOpen(String),

    /// A fault reported by the driver while streaming. Never returned from a
    /// call; the session keeps the latest one in `SessionStats::last_fault`.
    #[error("audio stream fault: {0}")]
    DeviceRuntime(String),

    #[error("failed to read or write config file: {0}")]
    Config(String),

    #[error("failed to export audio: {0}")]
    ExportIo(String),

    /// The request never produced an HTTP response (connect, timeout, IO).
    #[error("upload failed: {0}")]
    UploadTransport(String),

    /// The server answered with a non-success status.
    #[error("upload rejected with status {status}: {body}")]
    UploadRejected { status: u16, body: String },
}

impl From<hound::Error> for RecorderError {
    fn from(err: hound::Error) -> Self {
        RecorderError::ExportIo(err.to_string())
    }
}

impl From<serde_json::Error> for RecorderError {
    fn from(err: serde_json::Error) -> Self {
        RecorderError::Config(err.to_string())
    }
}
