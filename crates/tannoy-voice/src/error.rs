use thiserror::Error;

/// Errors from speech synthesis.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// The backend engine is unreachable, crashed, or timed out. The
    /// announcement attempt is aborted; callers retry on their next cycle.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Filesystem error around scratch or cache directories.
    #[error("voice io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the audio playback engine.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Another playback is still in flight. Transient: callers back off
    /// briefly and retry, and never surface this to users.
    #[error("playback already in progress")]
    Busy,

    /// The player binary is missing, failed to start, or crashed.
    #[error("playback engine error: {0}")]
    Engine(String),
}
