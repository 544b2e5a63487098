pub mod bktree;
pub mod exif;
pub mod fingerprint;
pub mod hash;
pub mod naming;
pub mod policy;
pub mod scanner;
pub mod store;
