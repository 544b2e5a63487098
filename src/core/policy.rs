use crate::core::bktree::{FingerprintIndex, Match};
use crate::core::fingerprint::{Fingerprint, HASH_BITS};
use chrono::NaiveDateTime;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_THRESHOLD: f64 = 0.9;

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("unknown duplicate detection mode: {0}")]
    InvalidMode(u8),

    #[error("similarity threshold must be between 0 and 1, got {0}")]
    InvalidThreshold(f64),
}

/// What to do with images that match something already in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateMode {
    /// Copy everything, only index afterwards.
    #[default]
    Ignore,
    /// Drop near and exact duplicates.
    Skip,
    /// Drop exact duplicates, copy near duplicates under a marked name.
    Mark,
}

impl TryFrom<u8> for DuplicateMode {
    type Error = PolicyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DuplicateMode::Ignore),
            1 => Ok(DuplicateMode::Skip),
            2 => Ok(DuplicateMode::Mark),
            other => Err(PolicyError::InvalidMode(other)),
        }
    }
}

impl fmt::Display for DuplicateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateMode::Ignore => write!(f, "ignore"),
            DuplicateMode::Skip => write!(f, "skip"),
            DuplicateMode::Mark => write!(f, "mark"),
        }
    }
}

/// Convert a similarity in `[0, 1]` into a Hamming search radius:
/// `ceil((1 - t) * 64)`.
pub fn radius_for_threshold(threshold: f64) -> Result<u32, PolicyError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(PolicyError::InvalidThreshold(threshold));
    }
    let radius = ((1.0 - threshold) * HASH_BITS as f64).ceil();
    Ok((radius as u32).min(HASH_BITS))
}

/// Closest candidate. Equal distances go to the earliest-inserted
/// fingerprint, so an exact match always wins and the choice does not depend
/// on traversal order.
pub fn best_match<'a>(candidates: &[Match<'a>]) -> Option<Match<'a>> {
    let mut best: Option<Match<'a>> = None;
    for candidate in candidates {
        log::debug!(
            "MATCHED: {} distance: {}",
            candidate.fingerprint,
            candidate.distance
        );
        best = match best {
            Some(current)
                if (current.distance, current.sequence)
                    <= (candidate.distance, candidate.sequence) =>
            {
                Some(current)
            }
            _ => Some(*candidate),
        };
    }
    best
}

/// Outcome of checking one image against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Not a duplicate, or duplicates are not checked.
    Copy,
    /// Duplicate of `original`; do not copy.
    Skip { original: PathBuf, distance: u32 },
    /// Near duplicate of `original`; copy under a marked name. `taken_at` is
    /// the capture time the original was filed under, when the index knows it.
    Mark {
        original: PathBuf,
        taken_at: Option<NaiveDateTime>,
        distance: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicatePolicy {
    mode: DuplicateMode,
    radius: u32,
}

impl DuplicatePolicy {
    pub fn new(mode: DuplicateMode, threshold: f64) -> Result<Self, PolicyError> {
        let radius = radius_for_threshold(threshold)?;
        log::debug!("Threshold: {} -> radius {}", threshold, radius);
        Ok(Self { mode, radius })
    }

    pub fn mode(&self) -> DuplicateMode {
        self.mode
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn decide(&self, index: &FingerprintIndex, fingerprint: &Fingerprint) -> Decision {
        if self.mode == DuplicateMode::Ignore {
            return Decision::Copy;
        }

        let candidates = index.query(fingerprint, self.radius);
        let Some(found) = best_match(&candidates) else {
            log::debug!("NOT A DUPE: {}", fingerprint);
            return Decision::Copy;
        };
        let original = found.fingerprint.path().to_path_buf();
        let distance = found.distance;
        log::debug!("BEST MATCH: {} distance: {}", found.fingerprint, distance);

        match self.mode {
            DuplicateMode::Mark if distance > 0 => Decision::Mark {
                original,
                taken_at: found.fingerprint.taken_at(),
                distance,
            },
            _ => Decision::Skip { original, distance },
        }
    }
}
