use std::fmt;

use serde::{Deserialize, Serialize};

/// One magnitude spectrum, indexed by frequency bin.
pub type Chunk = Vec<f32>;

/// Records that a song produced some hash at chunk `timestamp`.
/// Stored under that hash in the [`FingerprintIndex`](crate::index::FingerprintIndex).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPoint {
    pub song_id: String,
    pub timestamp: u32,
}

impl KeyPoint {
    pub fn new(song_id: impl Into<String>, timestamp: u32) -> Self {
        KeyPoint {
            song_id: song_id.into(),
            timestamp,
        }
    }
}

/// Hash of a single chunk together with its position in the fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: u64,
    pub chunk_index: u32,
}

/// The winning accumulator cell of a match run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchOutcome {
    pub song_id: String,
    pub offset: u32,
    pub votes: u32,
}

/// What a run should do with the captured fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Add { song_id: String },
    Match,
}

/// Result of one completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Added { song_id: String, keypoints: usize },
    Matched(Option<MatchOutcome>),
}

impl fmt::Display for RunOutcome {
    /// The one line a run reports on stdout. Titles are quoted so no song
    /// name can be mistaken for the no-match line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Added { song_id, keypoints } => {
                write!(f, "Added \"{song_id}\" ({keypoints} keypoints)")
            }
            RunOutcome::Matched(Some(best)) => write!(f, "Best song: \"{}\"", best.song_id),
            RunOutcome::Matched(None) => f.write_str("No match found"),
        }
    }
}
