//! Readers for the partition index and partition summary files of sstables.

pub mod error;
pub mod index;
pub mod report;
pub mod scan;
pub mod stream;
pub mod summary;

pub use error::{DecodeError, ScanError};

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;
