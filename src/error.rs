use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding a single file buffer. Every variant is fatal for the file
/// being decoded: no partially decoded record is ever handed out alongside one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to read `{ty}` at offset {offset}: {needed} bytes needed, {remaining} remaining")]
    Underrun {
        ty: &'static str,
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unmapped enum discriminant {value} at offset {offset}")]
    UnmappedEnum { value: u32, offset: usize },

    #[error("invalid length {length} for `{ty}` at offset {offset}")]
    InvalidLength {
        ty: &'static str,
        length: i64,
        offset: usize,
    },

    #[error("tagged union member {tag} at offset {offset} declared {declared} bytes but read {consumed}")]
    MemberOverrun {
        tag: u64,
        offset: usize,
        declared: usize,
        consumed: usize,
    },

    #[error("promoted index at offset {offset} declared {declared} bytes but read {consumed}")]
    PromotedOverrun {
        offset: usize,
        declared: usize,
        consumed: usize,
    },

    #[error("summary entry {index} has invalid span [{start}, {end})")]
    InvalidSpan { index: usize, start: i64, end: i64 },
}

/// Errors of a whole-file pass: opening and reading the file, decoding it, or writing the report.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("could not read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("could not decode {path}: {source}")]
    Decode { path: PathBuf, source: DecodeError },

    #[error("could not write report: {0}")]
    Report(#[from] io::Error),
}
