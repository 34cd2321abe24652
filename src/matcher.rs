use std::collections::BTreeMap;

use tracing::debug;

use crate::index::FingerprintIndex;
use crate::models::{Fingerprint, MatchOutcome};

/// Votes per song per time offset.
///
/// Both levels are ordered maps so the winner scan visits songs in ascending
/// id order and, within a song, offsets in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchAccumulator {
    votes: BTreeMap<String, BTreeMap<u32, u32>>,
}

impl MatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one vote; a cell seen for the first time starts at 1.
    pub fn vote(&mut self, song_id: &str, offset: u32) {
        *self
            .votes
            .entry(song_id.to_owned())
            .or_default()
            .entry(offset)
            .or_insert(0) += 1;
    }

    pub fn count(&self, song_id: &str, offset: u32) -> u32 {
        self.votes
            .get(song_id)
            .and_then(|offsets| offsets.get(&offset))
            .copied()
            .unwrap_or(0)
    }

    pub fn offsets(&self, song_id: &str) -> Option<&BTreeMap<u32, u32>> {
        self.votes.get(song_id)
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// The single cell with the highest count. A song's weaker offsets do not
    /// add to its score. On equal counts the first cell in traversal order wins.
    pub fn best(&self) -> Option<MatchOutcome> {
        let mut best: Option<MatchOutcome> = None;
        for (song_id, offsets) in &self.votes {
            for (&offset, &votes) in offsets {
                if best.as_ref().map_or(true, |b| votes > b.votes) {
                    best = Some(MatchOutcome {
                        song_id: song_id.clone(),
                        offset,
                        votes,
                    });
                }
            }
        }
        best
    }
}

/// Offset-histogram voting against a read-only index.
pub struct Matcher<'a> {
    index: &'a FingerprintIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a FingerprintIndex) -> Self {
        Matcher { index }
    }

    /// Looks up every query chunk in the index and tallies `|t - c|` per song.
    pub fn accumulate(&self, query: &[Fingerprint]) -> MatchAccumulator {
        let mut accumulator = MatchAccumulator::new();
        for fp in query {
            for kp in self.index.lookup(fp.hash) {
                accumulator.vote(&kp.song_id, kp.timestamp.abs_diff(fp.chunk_index));
            }
        }
        accumulator
    }

    /// Finds the song a query fragment most likely comes from
    ///
    /// # Arguments
    /// * `query` - fingerprints of the fragment, one per chunk
    ///
    /// # Returns
    /// * The strongest `(song, offset)` cell, or `None` when no query hash is in the index
    pub fn best_match(&self, query: &[Fingerprint]) -> Option<MatchOutcome> {
        let accumulator = self.accumulate(query);
        let best = accumulator.best();
        debug!(
            chunks = query.len(),
            candidates = accumulator.votes.len(),
            best = ?best,
            "matching finished"
        );
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyPoint;

    const H1: u64 = 0x11;
    const H2: u64 = 0x22;
    const H3: u64 = 0x33;

    fn query(hashes: &[u64]) -> Vec<Fingerprint> {
        hashes
            .iter()
            .enumerate()
            .map(|(i, &hash)| Fingerprint {
                hash,
                chunk_index: i as u32,
            })
            .collect()
    }

    fn alignment_index() -> FingerprintIndex {
        let mut index = FingerprintIndex::new();
        index.insert(H1, KeyPoint::new("SongA", 0));
        index.insert(H2, KeyPoint::new("SongA", 1));
        index.insert(H3, KeyPoint::new("SongA", 2));
        index.insert(H1, KeyPoint::new("SongB", 5));
        index
    }

    #[test]
    fn aligned_song_collects_votes_at_one_offset() {
        let index = alignment_index();
        let matcher = Matcher::new(&index);
        let acc = matcher.accumulate(&query(&[H1, H2, H3]));

        assert_eq!(acc.offsets("SongA"), Some(&BTreeMap::from([(0, 3)])));
        assert_eq!(acc.offsets("SongB"), Some(&BTreeMap::from([(5, 1)])));
        assert_eq!(
            matcher.best_match(&query(&[H1, H2, H3])),
            Some(MatchOutcome {
                song_id: "SongA".into(),
                offset: 0,
                votes: 3
            })
        );
    }

    #[test]
    fn unknown_hashes_give_no_match() {
        let index = alignment_index();
        let matcher = Matcher::new(&index);
        assert!(matcher.accumulate(&query(&[0x99, 0x98])).is_empty());
        assert_eq!(matcher.best_match(&query(&[0x99, 0x98])), None);
    }

    #[test]
    fn empty_query_gives_no_match() {
        let index = alignment_index();
        assert_eq!(Matcher::new(&index).best_match(&[]), None);
    }

    #[test]
    fn offset_is_absolute_difference() {
        let mut index = FingerprintIndex::new();
        index.insert(H1, KeyPoint::new("s", 2));
        let acc = Matcher::new(&index).accumulate(&[Fingerprint {
            hash: H1,
            chunk_index: 7,
        }]);
        assert_eq!(acc.count("s", 5), 1);
    }

    #[test]
    fn vote_creates_then_increments() {
        let mut acc = MatchAccumulator::new();
        acc.vote("x", 4);
        assert_eq!(acc.count("x", 4), 1);
        acc.vote("x", 4);
        acc.vote("x", 1);
        assert_eq!(acc.count("x", 4), 2);
        assert_eq!(acc.count("x", 1), 1);
        assert_eq!(acc.count("y", 4), 0);
    }

    #[test]
    fn strongest_cell_beats_larger_total() {
        let mut acc = MatchAccumulator::new();
        // spread: 4 votes total, max cell 2
        for offset in [1, 1, 2, 3] {
            acc.vote("spread", offset);
        }
        // focused: 3 votes total, all in one cell
        for _ in 0..3 {
            acc.vote("focused", 9);
        }
        assert_eq!(acc.best().map(|b| b.song_id), Some("focused".to_string()));
    }

    #[test]
    fn ties_go_to_lowest_song_then_lowest_offset() {
        let mut acc = MatchAccumulator::new();
        acc.vote("beta", 0);
        acc.vote("alpha", 7);
        acc.vote("alpha", 3);
        let best = acc.best().unwrap();
        assert_eq!((best.song_id.as_str(), best.offset), ("alpha", 3));
    }
}
