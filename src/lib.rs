//! Landmark audio fingerprinting: index song fragments by their dominant
//! spectral peaks and identify new fragments by offset-histogram voting.

pub mod audio;
pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod matcher;
pub mod models;
pub mod spectrum;
pub mod storage;
pub mod telemetry;

pub use audio::{AudioLoader, PcmFormat, RawPcmSource, WavFileSource};
pub use capture::{Captured, MicrophoneSource, SampleSource, StopTrigger};
pub use config::EngineConfig;
pub use crate::core::{EngineState, Recognizer};
pub use error::{ConfigError, FingerprintError};
pub use fingerprint::PeakHasher;
pub use index::FingerprintIndex;
pub use matcher::{MatchAccumulator, Matcher};
pub use models::{Fingerprint, KeyPoint, MatchOutcome, Mode, RunOutcome};
pub use spectrum::SpectrumAnalyzer;
pub use storage::RepositoryStore;
