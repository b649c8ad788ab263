//! Error handling for Audio Expert
//!
//! Errors never cross the context boundary as `Err`: the processor folds them
//! into a `{success, error}` response envelope using [`AudioExpertError::error_code`].

use thiserror::Error;

/// Result type alias for Audio Expert operations
pub type Result<T> = std::result::Result<T, AudioExpertError>;

/// Main error type for Audio Expert operations
#[derive(Error, Debug)]
pub enum AudioExpertError {
    // Initialization Errors
    #[error("No media element available to attach as the chain source")]
    NoMediaElement,

    #[error("Audio engine context failed to start: {reason}")]
    EngineStart { reason: String },

    #[error("Audio engine operation failed: {reason}")]
    Engine { reason: String },

    // Lifecycle Errors
    #[error("Audio chain is not ready")]
    NotReady,

    #[error("Audio chain has been disposed")]
    Disposed,

    // Module Errors
    #[error("Unknown module: {id}")]
    UnknownModule { id: String },

    #[error("Unknown parameter '{param}' for module '{module}'")]
    UnknownParam { module: String, param: String },

    #[error("Invalid value {value} for {module}.{param}")]
    InvalidValue {
        module: String,
        param: String,
        value: f32,
    },

    #[error("Engine limitation: {module}.{param} cannot be changed after construction")]
    EngineLimitation { module: String, param: String },

    // Communication Errors
    #[error("Receiving context unreachable: {reason}")]
    CommunicationFailure { reason: String },

    // State Errors
    #[error("Malformed stored state for '{module}': {reason}")]
    StateParse { module: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AudioExpertError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AudioExpertError::NoMediaElement => "NO_MEDIA_ELEMENT",
            AudioExpertError::EngineStart { .. } => "ENGINE_START_FAILED",
            AudioExpertError::Engine { .. } => "ENGINE_ERROR",
            AudioExpertError::NotReady => "NOT_READY",
            AudioExpertError::Disposed => "DISPOSED",
            AudioExpertError::UnknownModule { .. } => "UNKNOWN_MODULE",
            AudioExpertError::UnknownParam { .. } => "UNKNOWN_PARAM",
            AudioExpertError::InvalidValue { .. } => "INVALID_VALUE",
            AudioExpertError::EngineLimitation { .. } => "ENGINE_LIMITATION",
            AudioExpertError::CommunicationFailure { .. } => "COMMUNICATION_FAILURE",
            AudioExpertError::StateParse { .. } => "STATE_PARSE_FAILURE",
            AudioExpertError::InvalidConfig { .. } => "INVALID_CONFIG",
            AudioExpertError::Io(_) => "IO_ERROR",
            AudioExpertError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the caller may retry the operation later
    ///
    /// Initialization failures are retryable once a media element shows up
    /// or the engine context is allowed to resume.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AudioExpertError::NoMediaElement
                | AudioExpertError::EngineStart { .. }
                | AudioExpertError::NotReady
                | AudioExpertError::CommunicationFailure { .. }
                | AudioExpertError::StateParse { .. }
        )
    }

    /// Render as `CODE: message` for response envelopes
    pub fn to_envelope_message(&self) -> String {
        format!("{}: {}", self.error_code(), self)
    }
}
