//! Content sources backed by real storage.

pub mod filesystem;

pub use filesystem::FsContentSource;
