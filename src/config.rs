use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FingerprintError};

/// Number of band peaks combined into one hash.
pub const HASHED_BANDS: usize = 4;

/// Analysis window applied to each chunk before the FFT.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    #[default]
    Rectangular,
    Hamming,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Samples per chunk; also the FFT length.
    pub chunk_size: usize,
    pub window: WindowFunction,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            chunk_size: 4096,
            window: WindowFunction::Rectangular,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < 2 {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        Ok(())
    }
}

/// Peak selection and hash packing parameters.
///
/// Band 0 spans `scan_lower..band_edges[0]`, band `i` spans
/// `band_edges[i - 1]..band_edges[i]`. Bins outside `scan_lower..scan_upper`
/// are never examined, which keeps DC offset and ultrasonic noise out of the hash.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HasherConfig {
    pub band_edges: Vec<usize>,
    pub scan_lower: usize,
    pub scan_upper: usize,
    /// Peak bins are divided by this before packing. Raising it lets more
    /// fragments share a hash: better recall, more unrelated collisions.
    pub fuzz_factor: usize,
}

impl Default for HasherConfig {
    fn default() -> Self {
        HasherConfig {
            band_edges: vec![80, 120, 180, 300],
            scan_lower: 40,
            scan_upper: 300,
            fuzz_factor: 2,
        }
    }
}

impl HasherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.band_edges.len() < HASHED_BANDS {
            return Err(ConfigError::TooFewBands {
                required: HASHED_BANDS,
                got: self.band_edges.len(),
            });
        }
        if self.scan_lower >= self.scan_upper {
            return Err(ConfigError::EmptyScanRange {
                lower: self.scan_lower,
                upper: self.scan_upper,
            });
        }
        let mut previous = self.scan_lower;
        for &edge in &self.band_edges {
            if edge <= previous {
                return Err(ConfigError::UnorderedBands);
            }
            previous = edge;
        }
        if self.fuzz_factor == 0 {
            return Err(ConfigError::ZeroFuzzFactor);
        }
        Ok(())
    }
}

/// Capture format. The defaults mirror a mono 8-bit big-endian line at 44.1 kHz.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub signed: bool,
    pub big_endian: bool,
    /// Read granularity hint in frames.
    pub buffer_size: u32,
    /// Stop after this many seconds instead of waiting for ENTER.
    pub duration_secs: Option<f32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            sample_rate: 44_100,
            bits_per_sample: 8,
            channels: 1,
            signed: true,
            big_endian: true,
            buffer_size: 1024,
            duration_secs: None,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if !matches!(self.bits_per_sample, 8 | 16) {
            return Err(ConfigError::BitDepth(self.bits_per_sample));
        }
        if let Some(secs) = self.duration_secs {
            if secs > 0.0 && Duration::try_from_secs_f32(secs).is_err() {
                return Err(ConfigError::Duration(secs.to_string()));
            }
        }
        Ok(())
    }

    /// Fixed listening time, or `None` to wait for ENTER.
    ///
    /// Zero, negative, NaN and values too large for a [`Duration`] all yield `None`.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f32(secs).ok())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub repository: PathBuf,
    /// Start from an empty index when the repository file does not exist yet.
    pub allow_missing_repository: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            repository: PathBuf::from("songs.json"),
            allow_missing_repository: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub analyzer: AnalyzerConfig,
    pub hasher: HasherConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Reads a JSON config file. Missing sections fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self, FingerprintError> {
        let file_error = |reason: String| ConfigError::File {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        let config: EngineConfig =
            serde_json::from_str(&text).map_err(|e| file_error(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analyzer.validate()?;
        self.hasher.validate()?;
        self.capture.validate()
    }
}
