use image::ImageReader;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Hash computation failed: {message}")]
    ComputationFailed { message: String },
}

/// Computes the 64-bit perceptual hash of an image file.
pub trait Fingerprinter: Sync {
    fn fingerprint(&self, file_path: &Path) -> Result<u64, HashError>;
}

/// DCT-preprocessed mean hash over an 8x8 grid, giving exactly 64 bits.
pub struct PerceptualHasher {
    hasher: Hasher,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        Self { hasher }
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter for PerceptualHasher {
    fn fingerprint(&self, file_path: &Path) -> Result<u64, HashError> {
        let img = ImageReader::open(file_path)?
            .with_guessed_format()?
            .decode()?;
        let hash = self.hasher.hash_image(&img);

        let bytes: [u8; 8] = hash.as_bytes().try_into().map_err(|_| HashError::ComputationFailed {
            message: format!("expected 8 hash bytes, got {}", hash.as_bytes().len()),
        })?;
        Ok(u64::from_be_bytes(bytes))
    }
}
