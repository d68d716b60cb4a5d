use std::path::PathBuf;
use thiserror::Error;

/// Failures while opening or decoding a source document.
///
/// These are the only errors the pipeline surfaces: every heuristic stage
/// after the source adapter resolves its ambiguities locally.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to open EPUB {path:?}: {message}")]
    Epub { path: PathBuf, message: String },

    #[error("text file {path:?} is not valid UTF-8")]
    Encoding { path: PathBuf },

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// A user supplied footer rule that could not be compiled.
#[derive(Debug, Error)]
pub enum FooterPatternError {
    #[error("invalid footer pattern {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Footer(#[from] FooterPatternError),
}

pub type Result<T, E = SourceError> = std::result::Result<T, E>;
