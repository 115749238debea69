//! Error types for livetx
//!
//! Fatal start-up and configuration failures are surfaced through
//! [`TranscodeError`]. Transient bitstream and session trouble is handled
//! inside the stages and never reaches this type.

use crate::media::{CodecId, MediaType};
use thiserror::Error;

/// Main error type for transform stage operations
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// Stage has no active engine or session
    #[error("Not initialized: {component}")]
    NotInitialized {
        /// Component that is not usable
        component: String,
    },

    /// Media type cannot be routed to a transform engine
    #[error("Unsupported media type: {media_type}")]
    UnsupportedMediaType {
        /// Offending media type
        media_type: MediaType,
    },

    /// No codec factory registered for the codec
    #[error("Codec not found: {codec}")]
    CodecNotFound {
        /// Requested codec
        codec: CodecId,
    },

    /// Codec session could not be opened
    #[error("Codec initialization failed: {codec} - {reason}")]
    CodecInitializationFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Bitstream parser could not be created
    #[error("Parser not available for codec {codec}")]
    ParserUnavailable {
        /// Codec name
        codec: String,
    },

    /// Transform engine could not be configured
    #[error("Engine creation failed: {engine} - {reason}")]
    EngineCreationFailed {
        /// Engine name
        engine: String,
        /// Failure reason
        reason: String,
    },

    /// Transform engine refused to start
    #[error("Engine failed to start: {engine}")]
    EngineStartFailed {
        /// Engine name
        engine: String,
    },

    /// Transform engine did not accept a frame
    #[error("Engine rejected frame: {engine}")]
    EngineRejected {
        /// Engine name
        engine: String,
    },

    /// Queue was closed while an operation was pending
    #[error("Queue closed: {queue}")]
    QueueClosed {
        /// Queue name
        queue: String,
    },

    /// Frame payload does not match its geometry
    #[error("Invalid frame: {reason}")]
    InvalidFrame {
        /// Reason the frame is invalid
        reason: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Dedicated worker thread could not be spawned
    #[error("Failed to spawn worker {worker}: {source}")]
    WorkerSpawn {
        /// Worker name
        worker: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Worker thread panicked
    #[error("Worker panicked: {worker}")]
    WorkerPanicked {
        /// Worker name
        worker: String,
    },
}

/// Result type alias for transform stage operations
pub type TranscodeResult<T> = Result<T, TranscodeError>;

impl TranscodeError {
    /// Check if the pipeline owner may keep the track alive after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            TranscodeError::EngineRejected { .. } => true,
            TranscodeError::InvalidFrame { .. } => true,
            TranscodeError::EngineCreationFailed { .. } => true,
            TranscodeError::EngineStartFailed { .. } => true,
            TranscodeError::NotInitialized { .. } => false,
            TranscodeError::UnsupportedMediaType { .. } => false,
            TranscodeError::CodecNotFound { .. } => false,
            TranscodeError::CodecInitializationFailed { .. } => false,
            TranscodeError::ParserUnavailable { .. } => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranscodeError::NotInitialized { .. } => ErrorCategory::State,
            TranscodeError::UnsupportedMediaType { .. } => ErrorCategory::Configuration,
            TranscodeError::CodecNotFound { .. } => ErrorCategory::Codec,
            TranscodeError::CodecInitializationFailed { .. } => ErrorCategory::Codec,
            TranscodeError::ParserUnavailable { .. } => ErrorCategory::Codec,
            TranscodeError::EngineCreationFailed { .. } => ErrorCategory::Engine,
            TranscodeError::EngineStartFailed { .. } => ErrorCategory::Engine,
            TranscodeError::EngineRejected { .. } => ErrorCategory::Engine,
            TranscodeError::QueueClosed { .. } => ErrorCategory::State,
            TranscodeError::InvalidFrame { .. } => ErrorCategory::Data,
            TranscodeError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            TranscodeError::WorkerSpawn { .. } => ErrorCategory::System,
            TranscodeError::WorkerPanicked { .. } => ErrorCategory::System,
        }
    }

    /// Shorthand for [`TranscodeError::NotInitialized`]
    pub fn not_initialized(component: impl Into<String>) -> Self {
        TranscodeError::NotInitialized {
            component: component.into(),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Operating system errors (threads, I/O)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Codec session or parser errors
    Codec,
    /// Transform engine errors
    Engine,
    /// Payload validation errors
    Data,
    /// Lifecycle errors
    State,
}
