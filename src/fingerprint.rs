use crate::config::{HasherConfig, HASHED_BANDS};
use crate::error::ConfigError;

/// Width of each packed peak field in the hash.
const FIELD_BITS: u32 = 16;
const FIELD_MASK: u64 = (1 << FIELD_BITS) - 1;

/// Reduces one chunk's spectrum to a single 64-bit hash.
///
/// The hash is built from the loudest bin of each of the first four bands:
/// 1. Every bin in `scan_lower..scan_upper` is assigned to its band
/// 2. The highest magnitude per band wins; ties keep the lowest bin
/// 3. The four winners are divided by the fuzz factor and packed into
///    disjoint 16-bit fields, band 0 in the lowest bits
#[derive(Clone, Debug)]
pub struct PeakHasher {
    config: HasherConfig,
}

impl PeakHasher {
    /// Creates a hasher for the given band layout
    ///
    /// # Arguments
    /// * `config` - band edges, scan range and fuzz factor
    ///
    /// # Returns
    /// * `Err` if there are fewer than four bands, the edges are not strictly
    ///   increasing above `scan_lower`, the scan range is empty, or the fuzz factor is 0
    pub fn new(config: HasherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(PeakHasher { config })
    }

    /// Band the bin belongs to, or `None` if it is outside every band.
    fn band_of(&self, bin: usize) -> Option<usize> {
        if bin < self.config.scan_lower {
            return None;
        }
        self.config.band_edges.iter().position(|&edge| bin < edge)
    }

    /// Peak bin per band. A band with no scanned bin in the chunk reports 0.
    pub fn extract_peaks(&self, chunk: &[f32]) -> Vec<usize> {
        let bands = self.config.band_edges.len();
        let mut peaks: Vec<Option<(usize, f32)>> = vec![None; bands];

        let upper = self.config.scan_upper.min(chunk.len());
        for bin in self.config.scan_lower..upper {
            let Some(band) = self.band_of(bin) else {
                continue;
            };
            let magnitude = chunk[bin];
            match peaks[band] {
                Some((_, best)) if magnitude <= best => {}
                _ => peaks[band] = Some((bin, magnitude)),
            }
        }

        peaks
            .into_iter()
            .map(|peak| peak.map_or(0, |(bin, _)| bin))
            .collect()
    }

    /// Hashes one spectrum
    ///
    /// # Arguments
    /// * `chunk` - log-magnitude spectrum indexed by bin
    ///
    /// # Returns
    /// * The packed peaks of the first four bands; bands past the fourth never
    ///   affect it
    pub fn hash(&self, chunk: &[f32]) -> u64 {
        let peaks = self.extract_peaks(chunk);
        self.combine(&peaks[..HASHED_BANDS])
    }

    /// Packs quantized peak bins into the hash.
    pub fn combine(&self, peaks: &[usize]) -> u64 {
        let fuzz = self.config.fuzz_factor as u64;
        peaks
            .iter()
            .take(HASHED_BANDS)
            .enumerate()
            .fold(0u64, |hash, (band, &bin)| {
                let field = (bin as u64 / fuzz) & FIELD_MASK;
                hash | (field << (band as u32 * FIELD_BITS))
            })
    }
}
