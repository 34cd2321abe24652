use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk size must be at least 2 samples, got {0}")]
    ChunkSize(usize),

    #[error("at least {required} bands are required, got {got}")]
    TooFewBands { required: usize, got: usize },

    #[error("band edges must be strictly increasing and above the scan lower bound")]
    UnorderedBands,

    #[error("scan range {lower}..{upper} is empty")]
    EmptyScanRange { lower: usize, upper: usize },

    #[error("fuzz factor must be non-zero")]
    ZeroFuzzFactor,

    #[error("unsupported bit depth: {0}")]
    BitDepth(u16),

    #[error("channel count must be non-zero")]
    ZeroChannels,

    #[error("sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("capture duration of {0} seconds is out of range")]
    Duration(String),

    #[error("config file {path}: {reason}")]
    File { path: PathBuf, reason: String },
}

/// Everything that can abort an add or match run.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture failed mid-stream: {0}")]
    CaptureIo(String),

    #[error("repository {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("audio input: {0}")]
    Audio(String),

    #[error("engine is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

impl FingerprintError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FingerprintError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<hound::Error> for FingerprintError {
    fn from(err: hound::Error) -> Self {
        FingerprintError::Audio(err.to_string())
    }
}
