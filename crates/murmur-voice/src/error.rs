//! Error types for the murmur voice pipeline

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in the turn-taking pipeline.
///
/// Capture and channel errors abort the current turn and surface to the
/// caller. Remote-generation failures never appear here: the
/// `ResponseGenerator` absorbs them into a local fallback reply.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("Recording stopped before any audio was captured")]
    NoAudioCaptured,

    #[error("{stage} initialization failed: {reason}")]
    InitializationFailed { stage: &'static str, reason: String },

    #[error("{stage} channel failed: {reason}")]
    ChannelFailed { stage: &'static str, reason: String },

    #[error("{stage} request timed out after {timeout_ms}ms")]
    RequestTimeout { stage: &'static str, timeout_ms: u64 },

    #[error("Invalid state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
