use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while merging, pruning, or moving phylogeny tables on and off disk.
#[derive(Debug, Error)]
pub enum AggError {
    #[error("input error: {0}")]
    Input(String),
    #[error("cutoff must be non-negative, got {0}")]
    Cutoff(i64),
    #[error("no file names matched pattern '{0}'")]
    NoFilesMatched(String),
    #[error("could not extract a time step from '{path}': {reason}")]
    TimeLabel { path: PathBuf, reason: String },
    #[error("invalid time regex: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid file pattern: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("failed to read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AggError>;
