use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::capture::{Captured, SampleSource};
use crate::config::CaptureConfig;
use crate::error::{ConfigError, FingerprintError};

/// Layout of raw interleaved PCM bytes. Only built from a validated
/// [`CaptureConfig`], so the bit depth is always 8 or 16 and channels non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    bits_per_sample: u16,
    channels: u16,
    signed: bool,
    big_endian: bool,
}

impl PcmFormat {
    /// # Returns
    /// * `Err` if the capture config has a zero rate or channel count, or a
    ///   bit depth other than 8 or 16
    pub fn from_capture(config: &CaptureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(PcmFormat {
            bits_per_sample: config.bits_per_sample,
            channels: config.channels,
            signed: config.signed,
            big_endian: config.big_endian,
        })
    }

    fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Decodes interleaved bytes into mono samples in `[-1.0, 1.0)`.
    /// An incomplete trailing frame is ignored.
    pub fn decode(&self, bytes: &[u8]) -> Vec<f32> {
        let width = self.bytes_per_sample();
        let channels = usize::from(self.channels);
        bytes
            .chunks_exact(self.frame_bytes())
            .map(|frame| {
                let sum: f32 = frame.chunks_exact(width).map(|s| self.sample(s)).sum();
                sum / channels as f32
            })
            .collect()
    }

    fn sample(&self, bytes: &[u8]) -> f32 {
        match (self.bits_per_sample, self.signed) {
            (8, true) => bytes[0] as i8 as f32 / 128.0,
            (8, false) => (bytes[0] as f32 - 128.0) / 128.0,
            (_, signed) => {
                let pair = [bytes[0], bytes[1]];
                let raw = if self.big_endian {
                    u16::from_be_bytes(pair)
                } else {
                    u16::from_le_bytes(pair)
                };
                if signed {
                    raw as i16 as f32 / 32_768.0
                } else {
                    (raw as f32 - 32_768.0) / 32_768.0
                }
            }
        }
    }
}

/// Mixes interleaved frames down to one channel by averaging.
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Loads audio files into normalized mono samples.
pub struct AudioLoader;

impl AudioLoader {
    /// Loads a WAV file and converts it to normalized mono samples
    ///
    /// # Arguments
    /// * `path` - Path to the WAV file
    ///
    /// # Returns
    /// * Samples in `[-1.0, 1.0]` averaged across channels, and the file's sample rate
    pub fn load_from_wav(path: &Path) -> Result<(Vec<f32>, u32), FingerprintError> {
        debug!(path = %path.display(), "loading wav");

        let mut reader = hound::WavReader::open(path)
            .map_err(|e| FingerprintError::Audio(format!("failed to open {}: {e}", path.display())))?;

        let spec = reader.spec();
        debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            "wav spec"
        );

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => match spec.bits_per_sample {
                8 => reader
                    .samples::<i8>()
                    .map(|s| s.map(|s| s as f32 / 128.0))
                    .collect::<Result<_, _>>()?,
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
                    .collect::<Result<_, _>>()?,
                24 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / (1 << 23) as f32))
                    .collect::<Result<_, _>>()?,
                32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / i32::MAX as f32))
                    .collect::<Result<_, _>>()?,
                bits => {
                    return Err(FingerprintError::Audio(format!("unsupported bit depth: {bits}")));
                }
            },
        };

        let mono = downmix(&samples, usize::from(spec.channels));

        info!(
            samples = mono.len(),
            seconds = format_args!("{:.2}", mono.len() as f32 / spec.sample_rate as f32),
            "loaded wav"
        );

        Ok((mono, spec.sample_rate))
    }

    /// Reads a headerless PCM dump in the given layout.
    pub fn load_raw(path: &Path, format: PcmFormat) -> Result<Vec<f32>, FingerprintError> {
        let bytes = std::fs::read(path)
            .map_err(|e| FingerprintError::Audio(format!("failed to read {}: {e}", path.display())))?;
        Ok(format.decode(&bytes))
    }
}

/// A WAV file used in place of the microphone.
pub struct WavFileSource {
    path: PathBuf,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WavFileSource { path: path.into() }
    }
}

impl SampleSource for WavFileSource {
    fn capture(&mut self) -> Result<Captured, FingerprintError> {
        let (samples, sample_rate) = AudioLoader::load_from_wav(&self.path)?;
        Ok(Captured {
            samples,
            sample_rate,
        })
    }
}

/// A raw PCM dump laid out like the configured capture line.
pub struct RawPcmSource {
    path: PathBuf,
    format: PcmFormat,
    sample_rate: u32,
}

impl RawPcmSource {
    pub fn new(path: impl Into<PathBuf>, config: &CaptureConfig) -> Result<Self, ConfigError> {
        Ok(RawPcmSource {
            path: path.into(),
            format: PcmFormat::from_capture(config)?,
            sample_rate: config.sample_rate,
        })
    }
}

impl SampleSource for RawPcmSource {
    fn capture(&mut self) -> Result<Captured, FingerprintError> {
        let samples = AudioLoader::load_raw(&self.path, self.format)?;
        debug!(path = %self.path.display(), samples = samples.len(), "loaded raw pcm");
        Ok(Captured {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}
