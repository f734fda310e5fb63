use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading, writing or validating atlas files.
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid atlas manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("failed to encode sheet {index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("manifest grid {found_cell}px x {found_per_row} does not match {expected_cell}px x {expected_per_row}")]
    LayoutMismatch {
        expected_cell: u32,
        expected_per_row: u32,
        found_cell: u32,
        found_per_row: u32,
    },
}

/// Failures while fetching or decoding a single thumbnail.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request for {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request for {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("no source can serve {0}")]
    Unsupported(String),

    #[error("thumbnail could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("{len} bytes do not hold {width}x{height} RGBA pixels")]
    Malformed { width: u32, height: u32, len: usize },
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            FetchError::Unsupported(_) | FetchError::Decode(_) | FetchError::Malformed { .. } => false,
        }
    }
}

/// Positional lookup reads against the wrong array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("lookup built for generation {built} read with generation {requested}")]
    GenerationMismatch { built: u64, requested: u64 },
}
