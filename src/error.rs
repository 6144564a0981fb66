//! Error types for fsbforge

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error during {phase} on {path}: {source}")]
    IoAt {
        path: PathBuf,
        phase: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("No FSB chunk at offset {offset:#x} in {}", path.display())]
    NotAnFsb { path: PathBuf, offset: u64 },

    #[error("Decoder error: {0}")]
    Decoder(#[source] anyhow::Error),

    #[error("Encoder failed (exit status {status:?}): {output}")]
    Encoder {
        status: Option<i32>,
        output: String,
    },

    #[error("Rebuilt chunk is {new_size} bytes but the original chunk is {original_size}")]
    Oversize { original_size: u64, new_size: u64 },

    #[error("No quality fits within {chunk_length} bytes")]
    NoQualityFits { chunk_length: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Source and destination must be different files: {0}")]
    SamePath(PathBuf),

    #[error("Manifest error: {0}")]
    ManifestJson(#[from] serde_json::Error),

    #[error("Workspace missing expected file: {0}")]
    WorkspaceIncomplete(PathBuf),

    #[error("Walk directory error: {0}")]
    WalkDirError(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

// Add conversion from walkdir::Error
impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDirError(err.to_string())
    }
}

impl Error {
    /// Attach path/phase context to a bare IO error.
    pub(crate) fn io_at(path: impl Into<PathBuf>, phase: &'static str, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            phase,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
