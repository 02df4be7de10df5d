//! Error types for the audio uplink application

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV sink error: {0}")]
    SinkError(String),
}

/// Network transport errors
///
/// These never escape the discovery or health-check boundaries; callers
/// there receive `Option`/`bool` results instead.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection refused")]
    Refused,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Unexpected status: {0}")]
    BadStatus(u16),
}

/// Artifact validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Recording too short: {actual_ms}ms (minimum {min_ms}ms)")]
    TooShort { actual_ms: u64, min_ms: u64 },

    #[error("Artifact too small: {actual} bytes (minimum {min} bytes)")]
    TooSmall { actual: u64, min: u64 },

    #[error("No artifact produced")]
    NoArtifact,
}

/// Recording session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A recording session is already active")]
    AlreadyActive,

    #[error("Capture source error: {0}")]
    CaptureFailed(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
