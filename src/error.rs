use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort a contact run.
///
/// None of these are retried: a contact run is a one-shot batch job and any
/// error ends it before the averaged matrix is written.
#[derive(Error, Debug)]
pub enum ContactError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid selection `{expression}`: {reason}")]
    InvalidSelection { expression: String, reason: String },
    #[error("invalid cutoff {0}: must be a finite, positive distance")]
    InvalidCutoff(f64),
    #[error("{path}: line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("trajectory {0} contains no frames")]
    EmptyTrajectory(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ContactError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        ContactError::Parse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContactError>;
