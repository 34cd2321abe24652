use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::{AnalyzerConfig, WindowFunction};
use crate::error::ConfigError;
use crate::models::Chunk;

/// Splits a sample buffer into non-overlapping chunks and turns each one into
/// a log-magnitude spectrum.
///
/// A trailing window shorter than `chunk_size` is dropped, so a fragment
/// shorter than one chunk yields no chunks at all.
pub struct SpectrumAnalyzer {
    chunk_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrumAnalyzer {
    /// Validates `config` and plans the FFT once for every later chunk.
    ///
    /// # Arguments
    /// * `config` - chunk size (also the FFT length) and window function
    ///
    /// # Returns
    /// * `Err(ConfigError::ChunkSize)` if the chunk is shorter than 2 samples
    pub fn new(config: &AnalyzerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let chunk_size = config.chunk_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(chunk_size);

        Ok(SpectrumAnalyzer {
            chunk_size,
            window: make_window(config.window, chunk_size),
            fft,
        })
    }

    /// Number of bins in every produced chunk.
    pub fn bins(&self) -> usize {
        self.chunk_size / 2
    }

    /// Converts samples into a sequence of spectra
    ///
    /// # Process
    /// 1. Split `samples` into consecutive windows of `chunk_size`, dropping the remainder
    /// 2. Apply the window function and run the forward FFT
    /// 3. Keep `ln(|X| + 1)` of the first `chunk_size / 2` bins
    ///
    /// # Arguments
    /// * `samples` - Mono samples, nominally in `[-1.0, 1.0]`
    ///
    /// # Returns
    /// * One [`Chunk`] per full window, in time order
    pub fn analyze(&self, samples: &[f32]) -> Vec<Chunk> {
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.chunk_size];
        samples
            .chunks_exact(self.chunk_size)
            .map(|window| self.compute_spectrum(window, &mut buffer))
            .collect()
    }

    /// Magnitude of the positive-frequency half, compressed with `ln(|X| + 1)`.
    fn compute_spectrum(&self, window: &[f32], buffer: &mut [Complex<f32>]) -> Chunk {
        for ((slot, &sample), &weight) in buffer.iter_mut().zip(window).zip(&self.window) {
            *slot = Complex::new(sample * weight, 0.0);
        }

        self.fft.process(buffer);

        buffer
            .iter()
            .take(self.bins())
            .map(|c| (c.norm() + 1.0).ln())
            .collect()
    }
}

fn make_window(kind: WindowFunction, n: usize) -> Vec<f32> {
    match kind {
        WindowFunction::Rectangular => vec![1.0; n],
        WindowFunction::Hamming => {
            let denom = (n.max(2) - 1) as f32;
            (0..n)
                .map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(chunk_size: usize) -> SpectrumAnalyzer {
        SpectrumAnalyzer::new(&AnalyzerConfig {
            chunk_size,
            window: WindowFunction::Rectangular,
        })
        .unwrap()
    }

    fn sine(bin: usize, chunk_size: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / chunk_size as f32).sin()
            })
            .collect()
    }

    #[test]
    fn exact_multiple_yields_one_chunk_per_window() {
        let a = analyzer(256);
        let chunks = a.analyze(&vec![0.25; 256 * 3]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 128));
    }

    #[test]
    fn trailing_partial_window_is_dropped() {
        let a = analyzer(256);
        assert_eq!(a.analyze(&vec![0.25; 256 * 3 + 255]).len(), 3);
    }

    #[test]
    fn fragment_shorter_than_one_chunk_yields_nothing() {
        let a = analyzer(256);
        assert!(a.analyze(&vec![0.5; 255]).is_empty());
        assert!(a.analyze(&[]).is_empty());
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let a = analyzer(512);
        let chunks = a.analyze(&sine(37, 512, 512));
        let peak = chunks[0]
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.total_cmp(y.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(37));
    }

    #[test]
    fn silence_has_zero_magnitude() {
        let a = analyzer(64);
        let chunks = a.analyze(&[0.0; 64]);
        assert!(chunks[0].iter().all(|&m| m == 0.0));
    }

    #[test]
    fn analysis_is_deterministic() {
        let hamming = SpectrumAnalyzer::new(&AnalyzerConfig {
            chunk_size: 128,
            window: WindowFunction::Hamming,
        })
        .unwrap();
        let samples = sine(9, 128, 128 * 4);
        let first = hamming.analyze(&samples);
        let second = hamming.analyze(&samples);
        assert_eq!(first, second);
    }

    #[test]
    fn degenerate_chunk_size_is_refused() {
        for chunk_size in [0, 1] {
            let result = SpectrumAnalyzer::new(&AnalyzerConfig {
                chunk_size,
                window: WindowFunction::Hamming,
            });
            assert!(matches!(result, Err(ConfigError::ChunkSize(n)) if n == chunk_size));
        }
    }
}
