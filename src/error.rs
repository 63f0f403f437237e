// src/error.rs

/// Result alias that carries the crate error type.
pub type Result<T> = std::result::Result<T, CadenzaError>;

/// Errors that can cross the public API boundary.
///
/// Everything else in the pipeline is handled internally: path misses fall
/// back to fixed values, stale sessions return silently, and observer
/// failures are caught and logged.
#[derive(Debug, thiserror::Error)]
pub enum CadenzaError {
    /// A sample byte buffer could not be decoded. The previously loaded
    /// sample, if any, is left intact.
    #[error("sample decode failed: {0}")]
    Decode(String),
    /// No output device was available when playback tried to start.
    #[error("no audio output device available")]
    NoOutputDevice,
    /// The output stream could not be built or started.
    #[error("audio stream error: {0}")]
    Stream(String),
}
