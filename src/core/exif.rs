use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),
}

/// Resolves when a photo was taken.
pub trait CaptureClock {
    fn capture_time(&self, file_path: &Path) -> Result<NaiveDateTime, ExifError>;
}

/// Reads the EXIF capture date, falling back to the filesystem timestamps.
pub struct ExifClock;

impl ExifClock {
    pub fn new() -> Self {
        Self
    }

    /// EXIF `DateTimeOriginal`, then `DateTime`. `Ok(None)` when the file has
    /// no usable EXIF date.
    pub fn exif_time(&self, file_path: &Path) -> Result<Option<NaiveDateTime>, ExifError> {
        let file = File::open(file_path)?;
        let mut buf_reader = BufReader::new(file);

        let exif_reader = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(reader) => reader,
            Err(_) => return Ok(None), // No EXIF data or unsupported format
        };

        for tag in [Tag::DateTimeOriginal, Tag::DateTime] {
            if let Some(field) = exif_reader.get_field(tag, In::PRIMARY) {
                if let Some(taken_at) = field_to_string(&field.value)
                    .as_deref()
                    .and_then(parse_exif_datetime)
                {
                    return Ok(Some(taken_at));
                }
            }
        }
        Ok(None)
    }

    /// Creation time where the platform records it, modification time otherwise.
    pub fn filesystem_time(&self, file_path: &Path) -> Result<NaiveDateTime, ExifError> {
        let metadata = fs::metadata(file_path)?;
        let system_time = metadata.created().or_else(|_| metadata.modified())?;
        Ok(DateTime::<Local>::from(system_time).naive_local())
    }
}

impl Default for ExifClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureClock for ExifClock {
    fn capture_time(&self, file_path: &Path) -> Result<NaiveDateTime, ExifError> {
        match self.exif_time(file_path)? {
            Some(taken_at) => Ok(taken_at),
            None => {
                log::debug!("no EXIF date in {}, using file time", file_path.display());
                self.filesystem_time(file_path)
            }
        }
    }
}

fn field_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec.first().map(|ascii_val| {
            String::from_utf8_lossy(ascii_val)
                .trim_end_matches('\0')
                .to_string()
        }),
        _ => None,
    }
}

/// EXIF datetime format: "YYYY:MM:DD HH:MM:SS"
fn parse_exif_datetime(datetime_str: &str) -> Option<NaiveDateTime> {
    let trimmed = datetime_str.trim();
    match NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S") {
        Ok(dt) => Some(dt),
        Err(_) => {
            log::warn!("Failed to parse EXIF datetime: {}", datetime_str);
            None
        }
    }
}
