use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions (lowercase) handled as photos.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff"];

/// Lowercased extension of `path`, if any. Invalid UTF-8 is replaced lossily.
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
}

pub fn is_image(path: &Path) -> bool {
    lowercase_extension(path)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Lazily yield every regular file beneath `root`.
///
/// Entries under `exclude` are not descended into. Unreadable entries are
/// logged and skipped.
pub fn walk_files<'a>(
    root: &'a Path,
    exclude: Option<&'a Path>,
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(move |entry| match exclude {
            Some(excluded) => entry.depth() == 0 || !entry.path().starts_with(excluded),
            None => true,
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
}
