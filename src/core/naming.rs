use crate::core::scanner::lowercase_extension;
use chrono::{Datelike, NaiveDateTime};
use std::path::{Path, PathBuf};

/// Directory for files that are not photos.
pub const OTHER_DIR: &str = "Other";

/// A capture time broken into the pieces used for directory and file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampParts {
    pub year: i32,
    /// "Dec"
    pub month: String,
    /// "25"
    pub day: String,
    /// "Mon"
    pub weekday: String,
    /// "02-30-45-PM"
    pub time: String,
}

impl From<&NaiveDateTime> for TimestampParts {
    fn from(taken_at: &NaiveDateTime) -> Self {
        Self {
            year: taken_at.year(),
            month: taken_at.format("%b").to_string(),
            day: taken_at.format("%d").to_string(),
            weekday: taken_at.format("%a").to_string(),
            time: taken_at.format("%I-%M-%S-%p").to_string(),
        }
    }
}

/// `-DUPLICATE_OF-2023-Dec-25-02-30-45-PM`, naming the original's capture time.
pub fn duplicate_marker(original_taken_at: &NaiveDateTime) -> String {
    let parts = TimestampParts::from(original_taken_at);
    format!(
        "-DUPLICATE_OF-{}-{}-{}-{}",
        parts.year, parts.month, parts.day, parts.time
    )
}

/// Capture time encoded in a dated destination path under `root`, e.g.
/// `root/2023/Dec/25-Mon/02-30-45-PM-COPY_1.jpg`. `None` for anything else.
pub fn filed_time(root: &Path, path: &Path) -> Option<NaiveDateTime> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .iter()
        .map(|part| part.to_str())
        .collect::<Option<_>>()?;
    let [year, month, day_dir, file_name] = parts.as_slice() else {
        return None;
    };
    let day = day_dir.split('-').next()?;
    let time = file_name.get(..11)?;
    let stamp = format!("{} {} {} {}", year, month, day, time);
    NaiveDateTime::parse_from_str(&stamp, "%Y %b %d %I-%M-%S-%p").ok()
}

/// First path from `build` that `exists` rejects, trying `suffix`, then
/// `suffix-COPY_1`, `suffix-COPY_2`, ...
pub fn resolve_collision<B, E>(suffix: &str, build: B, exists: E) -> PathBuf
where
    B: Fn(&str) -> PathBuf,
    E: Fn(&Path) -> bool,
{
    let mut path = build(suffix);
    let mut count = 1u64;
    while exists(&path) {
        log::trace!("{} exists, incrementing", path.display());
        path = build(&format!("{}-COPY_{}", suffix, count));
        count += 1;
    }
    path
}

/// Computes where a file lands inside the destination tree.
#[derive(Debug, Clone)]
pub struct DestinationNamer {
    root: PathBuf,
}

impl DestinationNamer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path without extension: `root/2023/Dec/25-Mon/02-30-45-PM` for a
    /// dated photo, `root/Other/<original stem>` when `taken_at` is `None`.
    fn base_path(&self, source: &Path, taken_at: Option<&NaiveDateTime>) -> PathBuf {
        match taken_at {
            Some(taken_at) => {
                let parts = TimestampParts::from(taken_at);
                self.root
                    .join(parts.year.to_string())
                    .join(&parts.month)
                    .join(format!("{}-{}", parts.day, parts.weekday))
                    .join(&parts.time)
            }
            None => {
                let stem = source.file_stem().unwrap_or(source.as_os_str());
                self.root.join(OTHER_DIR).join(stem)
            }
        }
    }

    /// Destination for `source` with `suffix` appended to the file stem.
    pub fn candidate(
        &self,
        source: &Path,
        taken_at: Option<&NaiveDateTime>,
        suffix: &str,
    ) -> PathBuf {
        let mut name = self.base_path(source, taken_at).into_os_string();
        name.push(suffix);
        if let Some(ext) = lowercase_extension(source) {
            name.push(".");
            name.push(ext);
        }
        PathBuf::from(name)
    }

    /// Collision-free destination on the real filesystem. `marker` goes in
    /// front of any `-COPY_N` counter.
    pub fn resolve(
        &self,
        source: &Path,
        taken_at: Option<&NaiveDateTime>,
        marker: Option<&str>,
    ) -> PathBuf {
        resolve_collision(
            marker.unwrap_or(""),
            |suffix| self.candidate(source, taken_at, suffix),
            |path| path.exists(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn christmas() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 12, 25)
            .unwrap()
            .and_hms_opt(14, 30, 45)
            .unwrap()
    }

    #[test]
    fn test_timestamp_parts() {
        let parts = TimestampParts::from(&christmas());
        assert_eq!(parts.year, 2023);
        assert_eq!(parts.month, "Dec");
        assert_eq!(parts.day, "25");
        assert_eq!(parts.weekday, "Mon");
        assert_eq!(parts.time, "02-30-45-PM");
    }

    #[test]
    fn test_photo_candidate() {
        let namer = DestinationNamer::new("/out");
        let path = namer.candidate(Path::new("/in/IMG_0001.JPG"), Some(&christmas()), "");
        assert_eq!(path, PathBuf::from("/out/2023/Dec/25-Mon/02-30-45-PM.jpg"));
    }

    #[test]
    fn test_morning_and_single_digit_day() {
        let morning = NaiveDate::from_ymd_opt(2021, 7, 4)
            .unwrap()
            .and_hms_opt(9, 5, 3)
            .unwrap();
        let namer = DestinationNamer::new("/out");
        let path = namer.candidate(Path::new("a.jpeg"), Some(&morning), "");
        assert_eq!(path, PathBuf::from("/out/2021/Jul/04-Sun/09-05-03-AM.jpeg"));
    }

    #[test]
    fn test_other_candidate() {
        let namer = DestinationNamer::new("/out");
        assert_eq!(
            namer.candidate(Path::new("/in/docs/Notes.TXT"), None, ""),
            PathBuf::from("/out/Other/Notes.txt")
        );
        assert_eq!(
            namer.candidate(Path::new("/in/Makefile"), None, "-COPY_1"),
            PathBuf::from("/out/Other/Makefile-COPY_1")
        );
    }

    #[test]
    fn test_duplicate_marker() {
        assert_eq!(duplicate_marker(&christmas()), "-DUPLICATE_OF-2023-Dec-25-02-30-45-PM");

        let namer = DestinationNamer::new("/out");
        let marker = duplicate_marker(&christmas());
        let path = namer.candidate(Path::new("b.jpg"), Some(&christmas()), &marker);
        let expected = "/out/2023/Dec/25-Mon/02-30-45-PM-DUPLICATE_OF-2023-Dec-25-02-30-45-PM.jpg";
        assert_eq!(path, PathBuf::from(expected));
    }

    #[test]
    fn test_filed_time_reads_dated_paths() {
        let namer = DestinationNamer::new("/out");
        let marker = duplicate_marker(&christmas());
        for suffix in ["", "-COPY_3", marker.as_str()] {
            let path = namer.candidate(Path::new("IMG.JPG"), Some(&christmas()), suffix);
            assert_eq!(filed_time(Path::new("/out"), &path), Some(christmas()));
        }

        let other = namer.candidate(Path::new("notes.txt"), None, "");
        assert_eq!(filed_time(Path::new("/out"), &other), None);
        assert_eq!(filed_time(Path::new("/out"), Path::new("/out/2023/Dec/misc.jpg")), None);

        let dated = namer.candidate(Path::new("IMG.jpg"), Some(&christmas()), "");
        assert_eq!(filed_time(Path::new("/elsewhere"), &dated), None);
    }

    #[test]
    fn test_resolve_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let namer = DestinationNamer::new(temp_dir.path());
        let source = Path::new("IMG.jpg");

        let first = namer.resolve(source, Some(&christmas()), None);
        assert!(first.ends_with("2023/Dec/25-Mon/02-30-45-PM.jpg"));
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::write(&first, b"1").unwrap();

        let second = namer.resolve(source, Some(&christmas()), None);
        assert_eq!(second.file_name().unwrap(), "02-30-45-PM-COPY_1.jpg");
        fs::write(&second, b"2").unwrap();

        let third = namer.resolve(source, Some(&christmas()), None);
        assert_eq!(third.file_name().unwrap(), "02-30-45-PM-COPY_2.jpg");
    }

    #[test]
    fn test_marker_precedes_counter() {
        let temp_dir = TempDir::new().unwrap();
        let namer = DestinationNamer::new(temp_dir.path());
        let marker = duplicate_marker(&christmas());

        let first = namer.resolve(Path::new("b.jpg"), Some(&christmas()), Some(&marker));
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::write(&first, b"1").unwrap();

        let second = namer.resolve(Path::new("b.jpg"), Some(&christmas()), Some(&marker));
        assert_eq!(
            second.file_name().unwrap(),
            "02-30-45-PM-DUPLICATE_OF-2023-Dec-25-02-30-45-PM-COPY_1.jpg"
        );
    }

    #[test]
    fn test_counter_strictly_increments_past_a_thousand() {
        let namer = DestinationNamer::new("/out");
        let source = Path::new("IMG.jpg");
        let taken_at = christmas();
        let build = |suffix: &str| namer.candidate(source, Some(&taken_at), suffix);

        let mut taken: HashSet<PathBuf> = HashSet::new();
        taken.insert(build(""));
        for n in 1..=1000 {
            let next = resolve_collision("", build, |p| taken.contains(p));
            assert_eq!(
                next.file_name().unwrap().to_str().unwrap(),
                format!("02-30-45-PM-COPY_{}.jpg", n)
            );
            taken.insert(next);
        }
        assert_eq!(taken.len(), 1001);
    }
}
