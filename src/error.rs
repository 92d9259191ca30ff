use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = DatasetError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("failed to parse manifest {} line {line}: {content:?} has {fields} field(s)", .path.display())]
    ManifestLine {
        path: PathBuf,
        line: usize,
        content: String,
        fields: usize,
    },

    #[error("manifest {} line {line}: label {label:?} is not an integer", .path.display())]
    ManifestLabel {
        path: PathBuf,
        line: usize,
        label: String,
    },

    #[error("manifest {} yielded no entries for split '{mode}'", .path.display())]
    EmptyManifest { path: PathBuf, mode: String },

    #[error("split '{0}' is not supported (expected train, val or test)")]
    UnsupportedMode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open video container {}: {reason}", .path.display())]
    Container { path: PathBuf, reason: String },

    #[error("failed to decode video {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("index {index} out of range for dataset of {len} videos")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("frame transform failed: {0}")]
    Transform(String),

    #[error("bounding box annotations unavailable: {0}")]
    Annotation(String),

    #[error("failed to fetch video idx {index} from {} after {attempts} trials", .path.display())]
    RetriesExhausted {
        index: usize,
        path: PathBuf,
        attempts: usize,
    },
}

impl DatasetError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors the fetch loop absorbs and retries instead of surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Container { .. } | Self::Decode { .. })
    }
}
