//! Error types for the receptor and emitter

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Header too short: {0} bytes")]
    HeaderTooShort(usize),

    #[error("Invalid magic: {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedRate(u32),

    #[error("Unsupported sample rate code: {0}")]
    UnsupportedRateCode(u8),

    #[error("Not a service packet")]
    NotService,

    #[error("Service payload too short: {0} bytes")]
    ServiceTooShort(usize),

    #[error("Message too long: {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },
}

/// Audio backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open output: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("cpal error: {0}")]
    CpalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket setup failed: {0}")]
    SetupFailed(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
