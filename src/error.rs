use thiserror::Error;

/// Errors raised by the playback controller, either synchronously from a
/// control call or asynchronously through the error channel.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("invalid playback speed {0}: must be between 0.5 and 2.0")]
    InvalidSpeed(f32),

    #[error("no audio buffer is loaded")]
    NoActiveBuffer,

    #[error("audio output failure: {0}")]
    SinkWriteFailure(#[from] SinkError),

    #[error("speech synthesis failed: {0}")]
    SynthesisFailure(#[from] SynthesisError),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("failed to start delivery thread: {0}")]
    Worker(#[from] std::io::Error),
}

/// Device-level failures reported by an audio output.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no output device available")]
    NoDevice,

    #[error("failed to open output stream: {0}")]
    Open(String),

    #[error("write to output device failed: {0}")]
    Write(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("text cannot be empty")]
    EmptyText,

    #[error("no voice loaded (available voices: {})", .available.join(", "))]
    NoVoiceLoaded { available: Vec<String> },

    #[error("voice '{name}' not found (available voices: {})", .available.join(", "))]
    VoiceNotFound { name: String, available: Vec<String> },

    #[error("failed to load voice: {0}")]
    VoiceLoad(String),

    #[error("synthesizer process failed: {0}")]
    Process(String),
}
