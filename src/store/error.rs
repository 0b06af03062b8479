use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures of the key and dependency stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The input was rejected; `problems` lists every violation found.
    #[error("validation failed:\n  - {}", .problems.join("\n  - "))]
    Invalid { problems: Vec<String> },

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn invalid(problems: Vec<String>) -> Self {
        Self::Invalid { problems }
    }

    /// Validation problems, empty for I/O and parse failures.
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Invalid { problems } => problems,
            _ => &[],
        }
    }
}
