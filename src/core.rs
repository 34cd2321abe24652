use std::fmt;

use tracing::{debug, info};

use crate::capture::SampleSource;
use crate::config::EngineConfig;
use crate::error::FingerprintError;
use crate::fingerprint::PeakHasher;
use crate::index::FingerprintIndex;
use crate::matcher::Matcher;
use crate::models::{Fingerprint, KeyPoint, MatchOutcome, Mode, RunOutcome};
use crate::spectrum::SpectrumAnalyzer;

/// Lifecycle of one engine: Idle → Capturing → Processing → Idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Capturing,
    Processing,
}

impl EngineState {
    fn name(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Capturing => "capturing",
            EngineState::Processing => "processing",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Turns samples into one fingerprint per chunk.
pub fn generate_fingerprints(
    analyzer: &SpectrumAnalyzer,
    hasher: &PeakHasher,
    samples: &[f32],
) -> Vec<Fingerprint> {
    analyzer
        .analyze(samples)
        .iter()
        .enumerate()
        .map(|(chunk_index, chunk)| Fingerprint {
            hash: hasher.hash(chunk),
            chunk_index: chunk_index as u32,
        })
        .collect()
}

/// Owns the repository for one run and drives add/match over captured audio.
pub struct Recognizer {
    analyzer: SpectrumAnalyzer,
    hasher: PeakHasher,
    index: FingerprintIndex,
    state: EngineState,
}

impl Recognizer {
    /// Builds an idle engine around an already loaded repository
    ///
    /// # Arguments
    /// * `config` - full engine config; validated before anything is built
    /// * `index` - the repository this run reads and, in add mode, extends
    pub fn new(config: &EngineConfig, index: FingerprintIndex) -> Result<Self, FingerprintError> {
        config.validate()?;
        Ok(Recognizer {
            analyzer: SpectrumAnalyzer::new(&config.analyzer)?,
            hasher: PeakHasher::new(config.hasher.clone())?,
            index,
            state: EngineState::Idle,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn index(&self) -> &FingerprintIndex {
        &self.index
    }

    pub fn fingerprint(&self, samples: &[f32]) -> Vec<Fingerprint> {
        generate_fingerprints(&self.analyzer, &self.hasher, samples)
    }

    fn transition(&mut self, from: EngineState, to: EngineState) -> Result<(), FingerprintError> {
        if self.state != from {
            return Err(FingerprintError::InvalidState {
                expected: from.name(),
                actual: self.state.name(),
            });
        }
        debug!(%from, %to, "engine state");
        self.state = to;
        Ok(())
    }

    /// Captures a fragment from `source` and processes it
    ///
    /// # Process
    /// 1. Idle → Capturing: pull the whole fragment from `source`
    /// 2. Capturing → Processing: fingerprint it, then add or match per `mode`
    /// 3. Processing → Idle
    ///
    /// # Returns
    /// * `RunOutcome::Added` with the number of keypoints appended
    /// * `RunOutcome::Matched` with the best cell, or `None` if nothing voted
    /// * `Err` from the source; the engine is idle again and the index untouched
    pub fn run(
        &mut self,
        mode: &Mode,
        source: &mut dyn SampleSource,
    ) -> Result<RunOutcome, FingerprintError> {
        self.transition(EngineState::Idle, EngineState::Capturing)?;
        let captured = match source.capture() {
            Ok(captured) => captured,
            Err(e) => {
                self.state = EngineState::Idle;
                return Err(e);
            }
        };
        debug!(
            samples = captured.samples.len(),
            sample_rate = captured.sample_rate,
            "fragment captured"
        );
        self.transition(EngineState::Capturing, EngineState::Processing)?;

        let outcome = match mode {
            Mode::Add { song_id } => {
                let keypoints = self.add_samples(song_id, &captured.samples);
                RunOutcome::Added {
                    song_id: song_id.clone(),
                    keypoints,
                }
            }
            Mode::Match => RunOutcome::Matched(self.match_samples(&captured.samples)),
        };

        self.transition(EngineState::Processing, EngineState::Idle)?;
        Ok(outcome)
    }

    /// Indexes every chunk of `samples` under `song_id`. Returns the number of keypoints added.
    pub fn add_samples(&mut self, song_id: &str, samples: &[f32]) -> usize {
        let fingerprints = self.fingerprint(samples);
        self.add_fingerprints(song_id, &fingerprints)
    }

    pub fn add_fingerprints(&mut self, song_id: &str, fingerprints: &[Fingerprint]) -> usize {
        for fp in fingerprints {
            self.index
                .insert(fp.hash, KeyPoint::new(song_id, fp.chunk_index));
        }
        info!(
            song = song_id,
            keypoints = fingerprints.len(),
            total = self.index.keypoint_count(),
            "song added"
        );
        fingerprints.len()
    }

    pub fn match_samples(&self, samples: &[f32]) -> Option<MatchOutcome> {
        let fingerprints = self.fingerprint(samples);
        self.match_fingerprints(&fingerprints)
    }

    pub fn match_fingerprints(&self, fingerprints: &[Fingerprint]) -> Option<MatchOutcome> {
        let best = Matcher::new(&self.index).best_match(fingerprints);
        match &best {
            Some(m) => info!(song = %m.song_id, offset = m.offset, votes = m.votes, "best match"),
            None => info!(chunks = fingerprints.len(), "no match"),
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Captured;
    use crate::config::AnalyzerConfig;

    struct FixedSource(Vec<f32>);

    impl SampleSource for FixedSource {
        fn capture(&mut self) -> Result<Captured, FingerprintError> {
            Ok(Captured {
                samples: self.0.clone(),
                sample_rate: 44_100,
            })
        }
    }

    struct BrokenSource;

    impl SampleSource for BrokenSource {
        fn capture(&mut self) -> Result<Captured, FingerprintError> {
            Err(FingerprintError::CaptureIo("read failed".into()))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            analyzer: AnalyzerConfig {
                chunk_size: 1024,
                ..AnalyzerConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    /// One tone per chunk, hopping between bins so each chunk hashes differently.
    fn melody(bins: &[usize], chunk_size: usize) -> Vec<f32> {
        bins.iter()
            .flat_map(|&bin| {
                (0..chunk_size).map(move |i| {
                    let phase = 2.0 * std::f32::consts::PI * i as f32 / chunk_size as f32;
                    (phase * bin as f32).sin()
                        + 0.6 * (phase * (bin + 45) as f32).sin()
                        + 0.4 * (phase * (bin + 95) as f32).sin()
                        + 0.3 * (phase * (bin + 160) as f32).sin()
                })
            })
            .collect()
    }

    #[test]
    fn add_then_match_same_audio() {
        let mut engine = Recognizer::new(&config(), FingerprintIndex::new()).unwrap();
        let song = melody(&[50, 60, 70, 55, 65], 1024);
        assert_eq!(engine.add_samples("tune", &song), 5);

        let best = engine.match_samples(&song).unwrap();
        assert_eq!(best.song_id, "tune");
        assert_eq!(best.offset, 0);
    }

    #[test]
    fn run_cycles_back_to_idle() {
        let mut engine = Recognizer::new(&config(), FingerprintIndex::new()).unwrap();
        let mut source = FixedSource(melody(&[50, 60], 1024));
        let outcome = engine
            .run(&Mode::Add { song_id: "x".into() }, &mut source)
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Added {
                song_id: "x".into(),
                keypoints: 2
            }
        );
        assert_eq!(engine.state(), EngineState::Idle);

        let outcome = engine.run(&Mode::Match, &mut source).unwrap();
        assert!(matches!(outcome, RunOutcome::Matched(Some(ref m)) if m.song_id == "x"));
    }

    #[test]
    fn failed_capture_leaves_index_untouched() {
        let mut engine = Recognizer::new(&config(), FingerprintIndex::new()).unwrap();
        let err = engine
            .run(&Mode::Add { song_id: "x".into() }, &mut BrokenSource)
            .unwrap_err();
        assert!(matches!(err, FingerprintError::CaptureIo(_)));
        assert!(engine.index().is_empty());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn fragment_shorter_than_a_chunk_never_matches() {
        let mut engine = Recognizer::new(&config(), FingerprintIndex::new()).unwrap();
        engine.add_samples("x", &melody(&[50, 60], 1024));
        assert!(engine.fingerprint(&vec![0.5; 1023]).is_empty());
        assert_eq!(engine.match_samples(&vec![0.5; 1023]), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config();
        bad.hasher.fuzz_factor = 0;
        assert!(matches!(
            Recognizer::new(&bad, FingerprintIndex::new()),
            Err(FingerprintError::Config(_))
        ));
    }
}
