use crate::core::policy::{DEFAULT_THRESHOLD, DuplicateMode, PolicyError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Input directory {path:?} does not exist")]
    MissingInput { path: PathBuf },

    #[error("Input path {path:?} is not a directory")]
    InputNotDirectory { path: PathBuf },

    #[error("Could not create output directory {path:?}: {source}")]
    CreateOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Options for one organizing run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub mode: DuplicateMode,
    /// Similarity in `[0, 1]` at which two photos count as duplicates.
    pub threshold: f64,
    pub show_progress: bool,
}

impl Config {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            mode: DuplicateMode::default(),
            threshold: DEFAULT_THRESHOLD,
            show_progress: false,
        }
    }

    pub fn with_mode(mut self, mode: DuplicateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Check the input directory and make sure the output directory exists.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        if !self.input_dir.exists() {
            return Err(ConfigError::MissingInput {
                path: self.input_dir.clone(),
            });
        }
        if !self.input_dir.is_dir() {
            return Err(ConfigError::InputNotDirectory {
                path: self.input_dir.clone(),
            });
        }
        std::fs::create_dir_all(&self.output_dir).map_err(|source| ConfigError::CreateOutput {
            path: self.output_dir.clone(),
            source,
        })?;
        Ok(())
    }
}
