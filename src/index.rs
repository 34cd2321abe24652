use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::KeyPoint;

/// Hash → keypoints repository.
///
/// Buckets keep insertion order and duplicates; nothing is ever removed.
/// Adding the same song twice doubles its keypoints, which biases later
/// matches toward it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct FingerprintIndex {
    buckets: BTreeMap<u64, Vec<KeyPoint>>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `keypoint` to the bucket for `hash`
    ///
    /// # Arguments
    /// * `hash` - chunk hash produced by the [`PeakHasher`](crate::fingerprint::PeakHasher)
    /// * `keypoint` - song and chunk index that produced it; duplicates are kept
    pub fn insert(&mut self, hash: u64, keypoint: KeyPoint) {
        self.buckets.entry(hash).or_default().push(keypoint);
    }

    /// Keypoints stored under `hash`, oldest first. Empty if the hash is unknown.
    pub fn lookup(&self, hash: u64) -> &[KeyPoint] {
        self.buckets.get(&hash).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn keypoint_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Distinct songs that own at least one keypoint.
    pub fn song_ids(&self) -> BTreeSet<&str> {
        self.buckets
            .values()
            .flatten()
            .map(|kp| kp.song_id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_insertion_order_with_duplicates() {
        let mut index = FingerprintIndex::new();
        let inserted = [
            KeyPoint::new("b", 3),
            KeyPoint::new("a", 1),
            KeyPoint::new("b", 3),
            KeyPoint::new("a", 0),
        ];
        for kp in inserted.iter().cloned() {
            index.insert(7, kp);
        }
        index.insert(8, KeyPoint::new("c", 9));

        assert_eq!(index.lookup(7), &inserted[..]);
        assert_eq!(index.lookup(8), &[KeyPoint::new("c", 9)]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.keypoint_count(), 5);
    }

    #[test]
    fn unknown_hash_is_empty() {
        let index = FingerprintIndex::new();
        assert!(index.lookup(42).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn song_ids_are_distinct_and_sorted() {
        let mut index = FingerprintIndex::new();
        index.insert(1, KeyPoint::new("zeta", 0));
        index.insert(2, KeyPoint::new("alpha", 0));
        index.insert(3, KeyPoint::new("zeta", 1));
        assert_eq!(index.song_ids().into_iter().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }
}
