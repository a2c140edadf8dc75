//! The errors that may occur when building, parsing or manipulating sequencing samples.

use std::path::PathBuf;

use thiserror::Error;

/// The broad family an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A file name template was malformed or could not be filled.
    Configuration,
    /// A file name did not conform to a template.
    Parse,
    /// An argument or on-disk state was invalid.
    Value,
    /// The format of a file could not be determined.
    Runtime,
    /// An I/O error bubbled up from the file system or a codec.
    Io,
}

/// The error that may occur when working with [`crate::sequence_file::SequenceFile`]s and the
/// collections built from them.
#[derive(Error, Debug)]
pub enum SequenceDataError {
    #[error("Io error occurred")]
    Io(#[from] std::io::Error),

    #[error("Invalid file name template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Could not fill file name template '{template}': {reason}")]
    UnresolvedTemplate { template: String, reason: String },

    #[error("Could not parse the file name template '{template}' with the given file name '{file_name}'")]
    TemplateMismatch { template: String, file_name: String },

    #[error("No files specified to create a sample")]
    NoFiles,

    #[error("Expected {expected} file(s) for a {layout} sample, found {actual}")]
    WrongCardinality { layout: &'static str, expected: usize, actual: usize },

    #[error("Some of the specified files are the same: {path}")]
    DuplicatePath { path: PathBuf },

    #[error("A file that was specified does not exist: {path}")]
    MissingFile { path: PathBuf },

    #[error("Could not create {path}, the file already exists")]
    FileExists { path: PathBuf },

    #[error("The {property} must be the same for all files in a sample, got: {values:?}")]
    InconsistentProperty { property: &'static str, values: Vec<String> },

    #[error("The orientation must be {expected} unique tag(s), got: {values:?}")]
    InvalidOrientation { expected: usize, values: Vec<String> },

    #[error("The files of a sample have different compression formats: {formats:?}")]
    InconsistentCompression { formats: Vec<String> },

    #[error("Could not determine the compression format of {path} because the file is empty and the suffix is not recognized")]
    EmptyUnknownFormat { path: PathBuf },

    #[error("Could not open {path}, unknown format")]
    UnknownFormat { path: PathBuf },

    #[error("Expected {expected} file name(s), the template produced {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("The files of {sample} contain different numbers of lines: {lines:?}")]
    UnevenLineCounts { sample: String, lines: Vec<usize> },

    #[error("The number of pieces to split into must be at least 1")]
    ZeroPieces,

    #[error("{path} is already compressed")]
    AlreadyCompressed { path: PathBuf },

    #[error("{path} is already decompressed")]
    AlreadyDecompressed { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("No sequence files found in {path}")]
    NoSequenceFiles { path: PathBuf },

    #[error("Cannot {action} a {mode} stream")]
    UnsupportedStreamOperation { action: &'static str, mode: &'static str },
}

impl SequenceDataError {
    /// The [`ErrorCategory`] of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTemplate { .. } | Self::UnresolvedTemplate { .. } => {
                ErrorCategory::Configuration
            }
            Self::TemplateMismatch { .. } => ErrorCategory::Parse,
            Self::UnknownFormat { .. } => ErrorCategory::Runtime,
            Self::Io(_) => ErrorCategory::Io,
            _ => ErrorCategory::Value,
        }
    }
}

/// Shorthand for results carrying a [`SequenceDataError`].
pub type Result<T, E = SequenceDataError> = std::result::Result<T, E>;
