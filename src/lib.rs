pub mod cli;
pub mod config;
pub mod core;
pub mod organizer;

pub use config::Config;
pub use crate::core::exif::{CaptureClock, ExifClock};
pub use crate::core::hash::{Fingerprinter, PerceptualHasher};
pub use crate::core::policy::DuplicateMode;
pub use organizer::{Organizer, RunSummary};
