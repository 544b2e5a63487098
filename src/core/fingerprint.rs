use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Width of a perceptual hash in bits. Also the largest possible distance.
pub const HASH_BITS: u32 = 64;

/// Number of differing bits between two hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// A 64-bit perceptual hash together with the file it was computed from.
///
/// The hash never changes. The path is reassigned once, when the image is
/// copied and the fingerprint is inserted under its destination path.
/// `taken_at` is the capture time the image was filed under, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    hash: u64,
    path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    taken_at: Option<NaiveDateTime>,
}

impl Fingerprint {
    pub fn new(hash: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            hash,
            path: path.into(),
            taken_at: None,
        }
    }

    pub fn with_taken_at(mut self, taken_at: Option<NaiveDateTime>) -> Self {
        self.taken_at = taken_at;
        self
    }

    pub fn taken_at(&self) -> Option<NaiveDateTime> {
        self.taken_at
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-tag this fingerprint with the location its image was copied to.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn distance(&self, other: &Fingerprint) -> u32 {
        hamming_distance(self.hash, other.hash)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {:016x}", self.path.display(), self.hash)
    }
}
