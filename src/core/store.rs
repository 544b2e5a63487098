use crate::core::bktree::{FingerprintIndex, RestoreError};
use crate::core::fingerprint::Fingerprint;
use crate::core::hash::Fingerprinter;
use crate::core::naming::filed_time;
use crate::core::scanner::{is_image, walk_files};
use chrono::NaiveDateTime;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the persisted index inside the destination directory.
pub const STORE_FILE_NAME: &str = "fingerprints.json";

/// Bumped whenever the on-disk layout changes.
pub const STORE_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed fingerprint store: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported fingerprint store version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("Node {slot} has a parent but no edge")]
    MissingEdge { slot: usize },

    #[error("Inconsistent tree: {0}")]
    Corrupt(#[from] RestoreError),
}

impl StoreError {
    fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(err) if err.kind() == ErrorKind::NotFound)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIndex {
    version: u32,
    nodes: Vec<StoredNode>,
}

/// One tree node. `path` is relative to the destination directory. `parent`
/// is the slot of an earlier node, `edge` the distance to that node's pivot;
/// both are absent for the root.
#[derive(Debug, Serialize, Deserialize)]
struct StoredNode {
    hash: u64,
    path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    taken_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edge: Option<u32>,
}

pub fn store_path(dir: &Path) -> PathBuf {
    dir.join(STORE_FILE_NAME)
}

/// The fingerprint index of a destination directory plus its persistence.
#[derive(Debug, Default)]
pub struct FingerprintStore {
    index: FingerprintIndex,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> &FingerprintIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn insert(&mut self, fingerprint: Fingerprint) {
        log::debug!("Fingerprint add -> {}", fingerprint);
        self.index.insert(fingerprint);
    }

    /// Restore the index persisted in `dir`.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let raw = fs::read(store_path(dir))?;
        let stored: StoredIndex = serde_json::from_slice(&raw)?;
        if stored.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: stored.version,
            });
        }

        let mut index = FingerprintIndex::new();
        for (slot, node) in stored.nodes.into_iter().enumerate() {
            let link = match (node.parent, node.edge) {
                (None, _) => None,
                (Some(parent), Some(edge)) => Some((parent, edge)),
                (Some(_), None) => return Err(StoreError::MissingEdge { slot }),
            };
            let fingerprint =
                Fingerprint::new(node.hash, dir.join(node.path)).with_taken_at(node.taken_at);
            index.restore(link, fingerprint)?;
        }

        Ok(Self { index })
    }

    /// Fingerprint every image already under `dir`, leaving out `exclude`.
    ///
    /// Hashing runs in parallel; insertion follows traversal order. Capture
    /// times are recovered from the dated directory layout.
    pub fn rebuild(
        dir: &Path,
        exclude: Option<&Path>,
        fingerprinter: &dyn Fingerprinter,
        progress: &ProgressBar,
    ) -> Self {
        let images: Vec<PathBuf> = walk_files(dir, exclude)
            .filter(|path| {
                let image = is_image(path);
                if !image {
                    log::debug!("FINGERPRINTING: skipping {}", path.display());
                }
                image
            })
            .collect();

        progress.set_message(format!("Fingerprinting {} existing images…", images.len()));
        let hashed: Vec<(PathBuf, Option<u64>)> = images
            .into_par_iter()
            .map(|path| {
                let hash = match fingerprinter.fingerprint(&path) {
                    Ok(hash) => Some(hash),
                    Err(err) => {
                        log::warn!("Could not fingerprint {}: {}", path.display(), err);
                        None
                    }
                };
                progress.tick();
                (path, hash)
            })
            .collect();

        let mut store = Self::new();
        for (path, hash) in hashed {
            if let Some(hash) = hash {
                log::debug!("FINGERPRINTING: {}", path.display());
                let taken_at = filed_time(dir, &path);
                store.insert(Fingerprint::new(hash, path).with_taken_at(taken_at));
            }
        }
        store
    }

    /// Load the persisted index, or rebuild it by scanning `dir` and persist
    /// the result right away.
    pub fn load_or_rebuild(
        dir: &Path,
        exclude: Option<&Path>,
        fingerprinter: &dyn Fingerprinter,
        progress: &ProgressBar,
    ) -> Self {
        match Self::load(dir) {
            Ok(store) => {
                log::info!(
                    "Loaded {} fingerprints from {}",
                    store.len(),
                    store_path(dir).display()
                );
                return store;
            }
            Err(err) if err.is_not_found() => {
                log::info!(
                    "No {} found. Scanning images in {}",
                    STORE_FILE_NAME,
                    dir.display()
                );
            }
            Err(err) => {
                log::warn!(
                    "Ignoring unreadable {}: {}. Rescanning {}",
                    store_path(dir).display(),
                    err,
                    dir.display()
                );
            }
        }

        let store = Self::rebuild(dir, exclude, fingerprinter, progress);
        if let Err(err) = store.store(dir) {
            log::warn!("Could not save rebuilt fingerprints: {}", err);
        }
        store
    }

    /// Persist the index to `dir`, replacing any earlier copy.
    pub fn store(&self, dir: &Path) -> Result<(), StoreError> {
        let nodes = self
            .index
            .links()
            .map(|(fingerprint, link)| StoredNode {
                hash: fingerprint.hash(),
                path: fingerprint
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(fingerprint.path())
                    .to_path_buf(),
                taken_at: fingerprint.taken_at(),
                parent: link.map(|(parent, _)| parent),
                edge: link.map(|(_, edge)| edge),
            })
            .collect();
        let stored = StoredIndex {
            version: STORE_VERSION,
            nodes,
        };

        let target = store_path(dir);
        let staging = dir.join(format!("{}.tmp", STORE_FILE_NAME));
        fs::write(&staging, serde_json::to_vec(&stored)?)?;
        fs::rename(&staging, &target)?;
        log::debug!("Saved {} fingerprints to {}", self.len(), target.display());
        Ok(())
    }
}
