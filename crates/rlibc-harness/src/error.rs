//! Harness error type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no executor for function `{0}`")]
    UnknownFunction(String),
    #[error("bad inputs for `{function}`: {source}")]
    BadInputs {
        function: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no fixture files found in {0}")]
    NoFixtures(PathBuf),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
