use crate::config::{Config, ConfigError};
use crate::core::exif::{CaptureClock, ExifError};
use crate::core::fingerprint::Fingerprint;
use crate::core::hash::Fingerprinter;
use crate::core::naming::{DestinationNamer, duplicate_marker};
use crate::core::policy::{Decision, DuplicatePolicy};
use crate::core::scanner::{is_image, walk_files};
use crate::core::store::{FingerprintStore, StoreError};
use indicatif::{ProgressBar, ProgressStyle};
use chrono::NaiveDateTime;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not save fingerprints: {0}")]
    Store(#[from] StoreError),
}

/// Failures that abandon a single file; the batch carries on.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Could not read capture time: {0}")]
    Timestamp(#[from] ExifError),

    #[error("Failed to copy {from:?} → {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Copied(PathBuf),
    Marked(PathBuf),
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub copied: usize,
    pub marked: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Copied(_) => self.copied += 1,
            Outcome::Marked(_) => self.marked += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} copied, {} marked as duplicates, {} skipped, {} failed",
            self.copied, self.marked, self.skipped, self.failed
        )
    }
}

/// Where to walk for sources, and what each walk must leave out.
struct Roots {
    input: PathBuf,
    source_exclude: Option<PathBuf>,
    library_exclude: Option<PathBuf>,
}

/// Drives one batch: load the destination's fingerprints, then copy every
/// source file into place.
pub struct Organizer<'a> {
    config: Config,
    policy: DuplicatePolicy,
    namer: DestinationNamer,
    fingerprinter: &'a dyn Fingerprinter,
    clock: &'a dyn CaptureClock,
}

impl<'a> Organizer<'a> {
    pub fn new(
        config: Config,
        fingerprinter: &'a dyn Fingerprinter,
        clock: &'a dyn CaptureClock,
    ) -> Result<Self, ConfigError> {
        let policy = DuplicatePolicy::new(config.mode, config.threshold)?;
        let namer = DestinationNamer::new(&config.output_dir);
        Ok(Self {
            config,
            policy,
            namer,
            fingerprinter,
            clock,
        })
    }

    pub fn run(&self) -> Result<RunSummary, OrganizeError> {
        self.config.prepare()?;
        let output_dir = &self.config.output_dir;
        log::info!(
            "Mode: {}, threshold: {} (radius {})",
            self.policy.mode(),
            self.config.threshold,
            self.policy.radius()
        );

        let roots = self.roots();
        let progress = self.spinner();
        progress.set_message("Loading fingerprints…");
        let mut store = FingerprintStore::load_or_rebuild(
            output_dir,
            roots.library_exclude.as_deref(),
            self.fingerprinter,
            &progress,
        );
        if log::log_enabled!(log::Level::Debug) {
            if let Ok(dump) = serde_json::to_string(&store.index().dump()) {
                log::debug!("Fingerprint tree: {}", dump);
            }
        }

        let mut summary = RunSummary::default();
        for source in walk_files(&roots.input, roots.source_exclude.as_deref()) {
            progress.set_message(format!("Processing {}", source.display()));
            match self.process(&mut store, &source) {
                Ok(outcome) => summary.record(&outcome),
                Err(err) => {
                    log::warn!("Skipping {}: {}", source.display(), err);
                    summary.failed += 1;
                }
            }
            progress.tick();
        }

        store.store(output_dir)?;
        progress.finish_with_message(format!("Done: {}", summary));
        Ok(summary)
    }

    /// Handle one source file end to end.
    pub fn process(
        &self,
        store: &mut FingerprintStore,
        source: &Path,
    ) -> Result<Outcome, FileError> {
        if !is_image(source) {
            let dest = self.namer.resolve(source, None, None);
            copy_file(source, &dest)?;
            return Ok(Outcome::Copied(dest));
        }

        let taken_at = self.clock.capture_time(source)?;
        let hash = match self.fingerprinter.fingerprint(source) {
            Ok(hash) => Some(hash),
            Err(err) => {
                log::warn!(
                    "Could not fingerprint {}, copying without duplicate check: {}",
                    source.display(),
                    err
                );
                None
            }
        };

        let decision = match hash {
            Some(hash) => self
                .policy
                .decide(store.index(), &Fingerprint::new(hash, source)),
            None => Decision::Copy,
        };

        let marker = match decision {
            Decision::Skip { original, distance } => {
                log::info!(
                    "SKIPPING {}: duplicate of {} (distance {})",
                    source.display(),
                    original.display(),
                    distance
                );
                return Ok(Outcome::Skipped);
            }
            Decision::Mark {
                original,
                taken_at: original_taken_at,
                distance,
            } => {
                log::info!(
                    "MARKING {}: near duplicate of {} (distance {})",
                    source.display(),
                    original.display(),
                    distance
                );
                self.original_taken_at(&original, original_taken_at)
                    .map(|original_taken_at| duplicate_marker(&original_taken_at))
            }
            Decision::Copy => None,
        };

        let dest = self
            .namer
            .resolve(source, Some(&taken_at), marker.as_deref());
        copy_file(source, &dest)?;

        if let Some(hash) = hash {
            store.insert(Fingerprint::new(hash, &dest).with_taken_at(Some(taken_at)));
        }

        Ok(match marker {
            Some(_) => Outcome::Marked(dest),
            None => Outcome::Copied(dest),
        })
    }

    /// Capture time the matched original was filed under. Entries indexed
    /// without one fall back to reading the original file; if that fails too
    /// the image is copied without a marker.
    fn original_taken_at(
        &self,
        original: &Path,
        known: Option<NaiveDateTime>,
    ) -> Option<NaiveDateTime> {
        if known.is_some() {
            return known;
        }
        match self.clock.capture_time(original) {
            Ok(taken_at) => Some(taken_at),
            Err(err) => {
                log::warn!(
                    "Original {} is unreadable ({}), copying without duplicate marker",
                    original.display(),
                    err
                );
                None
            }
        }
    }

    /// Keeps the library and the source tree apart when one is nested in
    /// the other.
    fn roots(&self) -> Roots {
        let input = fs::canonicalize(&self.config.input_dir)
            .unwrap_or_else(|_| self.config.input_dir.clone());
        let output = fs::canonicalize(&self.config.output_dir)
            .unwrap_or_else(|_| self.config.output_dir.clone());

        // Rebuild walks `output_dir` as configured, so the excluded input is
        // expressed under that same prefix.
        let library_exclude = input
            .strip_prefix(&output)
            .ok()
            .map(|nested| self.config.output_dir.join(nested));
        let source_exclude = output.starts_with(&input).then_some(output);
        Roots {
            input,
            source_exclude,
            library_exclude,
        }
    }

    fn spinner(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<(), FileError> {
    let copy_error = |err| FileError::Copy {
        from: source.to_path_buf(),
        to: dest.to_path_buf(),
        source: err,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(copy_error)?;
    }
    log::info!("COPYING: {} to {}", source.display(), dest.display());
    fs::copy(source, dest).map_err(copy_error)?;
    Ok(())
}
