//! Error types for the palpation engine.

use thiserror::Error;

use crate::types::{SessionId, SessionStatus};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Device not supported: {model} ({reason})")]
    DeviceNotSupported { model: String, reason: String },

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Session {session} is {status}; cannot {operation}")]
    SessionState {
        session: SessionId,
        status: SessionStatus,
        operation: String,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Insufficient data for {context}: need {required}, have {available}")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("Analysis dependency missing: {0}")]
    AnalysisDependencyMissing(String),

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Signal processing error: {0}")]
    Signal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Short machine-readable tag, used when errors are attached to sessions
    /// or batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DeviceNotSupported { .. } => "device_not_supported",
            Error::InvalidCalibration(_) => "invalid_calibration",
            Error::SessionState { .. } => "session_state",
            Error::SessionNotFound(_) => "session_not_found",
            Error::InsufficientData { .. } => "insufficient_data",
            Error::AnalysisDependencyMissing(_) => "analysis_dependency_missing",
            Error::InvalidPacket(_) => "invalid_packet",
            Error::Signal(_) => "signal",
            Error::Cancelled => "cancelled",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::InvalidInput(_) => "invalid_input",
        }
    }
}
