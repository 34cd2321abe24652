use std::borrow::Cow;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::FingerprintError;
use crate::index::FingerprintIndex;

const FORMAT_VERSION: u32 = 1;

/// On-disk envelope around the index.
#[derive(Serialize, Deserialize)]
struct RepositoryFile<'a> {
    version: u32,
    index: Cow<'a, FingerprintIndex>,
}

/// Loads and saves the song repository as a single JSON file.
///
/// # Storage Structure
/// - `version` guards against reading files written by an incompatible layout
/// - `index` maps each hash (as a decimal string key) to its keypoint list,
///   in ascending hash order, preserving bucket order and duplicates
///
/// Saves go to a sibling temporary file which is then renamed over the
/// repository, so a failed save leaves the previous file untouched.
pub struct RepositoryStore {
    path: PathBuf,
    allow_missing: bool,
}

impl RepositoryStore {
    pub fn new(path: impl Into<PathBuf>, allow_missing: bool) -> Self {
        RepositoryStore {
            path: path.into(),
            allow_missing,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the repository from disk
    ///
    /// # Returns
    /// * The stored index, or an empty one if the file is missing and that is allowed
    /// * `Err(FingerprintError::Persistence)` for a missing file otherwise, unreadable
    ///   or corrupt JSON, or an unknown format version
    pub fn load(&self) -> Result<FingerprintIndex, FingerprintError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.allow_missing => {
                warn!(path = %self.path.display(), "repository not found, starting empty");
                return Ok(FingerprintIndex::new());
            }
            Err(e) => return Err(FingerprintError::persistence(&self.path, e)),
        };

        let file: RepositoryFile<'static> = serde_json::from_str(&text)
            .map_err(|e| FingerprintError::persistence(&self.path, e))?;
        if file.version != FORMAT_VERSION {
            return Err(FingerprintError::persistence(
                &self.path,
                format!("unsupported format version {}", file.version),
            ));
        }

        let index = file.index.into_owned();
        info!(
            path = %self.path.display(),
            songs = index.song_ids().len(),
            hashes = index.len(),
            keypoints = index.keypoint_count(),
            "repository loaded"
        );
        Ok(index)
    }

    /// Replaces the repository file with `index`
    ///
    /// # Process
    /// 1. Serialize the envelope into `<repository>.tmp` and sync it
    /// 2. Rename the temporary file over the repository
    ///
    /// On any failure the temporary file is removed and the old repository is left as it was.
    pub fn save(&self, index: &FingerprintIndex) -> Result<(), FingerprintError> {
        let tmp = self.temp_path();
        let result = self.write_to(&tmp, index).and_then(|()| {
            fs::rename(&tmp, &self.path).map_err(|e| FingerprintError::persistence(&self.path, e))
        });

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
            return result;
        }

        info!(
            path = %self.path.display(),
            hashes = index.len(),
            keypoints = index.keypoint_count(),
            "repository saved"
        );
        Ok(())
    }

    fn write_to(&self, tmp: &Path, index: &FingerprintIndex) -> Result<(), FingerprintError> {
        let file = fs::File::create(tmp).map_err(|e| FingerprintError::persistence(tmp, e))?;
        let mut writer = BufWriter::new(file);
        let envelope = RepositoryFile {
            version: FORMAT_VERSION,
            index: Cow::Borrowed(index),
        };
        serde_json::to_writer(&mut writer, &envelope)
            .map_err(|e| FingerprintError::persistence(tmp, e))?;
        writer
            .flush()
            .and_then(|()| writer.get_ref().sync_all())
            .map_err(|e| FingerprintError::persistence(tmp, e))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "repository".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
