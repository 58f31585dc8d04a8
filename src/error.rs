use crate::shape::Shape;

/// Failures of storing a single submitted drawing.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown shape label: {0:?}")]
    UnknownLabel(String),
    #[error("Could not decode the submitted image: {0}")]
    DecodeFailure(String),
    #[error("Expected a {}x{} drawing but got {}x{}", expected.0, expected.1, found.0, found.1)]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("Could not write the drawing to disk: {0}")]
    IOFailure(#[from] std::io::Error),
}

/// Failures of consolidating the buckets into the dataset arrays.
/// Any of these aborts the whole build; no array file is touched.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No images were found to prepare the dataset")]
    EmptyDataset,
    #[error("Could not decode {filename} in bucket {label}: {reason}")]
    DecodeFailure {
        label: Shape,
        filename: String,
        reason: String,
    },
    #[error("{filename} in bucket {label} has {channels} channels and no alpha channel")]
    UnsupportedChannels {
        label: Shape,
        filename: String,
        channels: u8,
    },
    #[error("{filename} in bucket {label} is {}x{} but the dataset is {}x{}", found.1, found.0, expected.1, expected.0)]
    ShapeMismatch {
        label: Shape,
        filename: String,
        /// (height, width)
        expected: (usize, usize),
        /// (height, width)
        found: (usize, usize),
    },
    #[error("Could not read the buckets: {0}")]
    IOFailure(#[from] std::io::Error),
    #[error("Could not write the dataset arrays: {0}")]
    Persist(String),
}

impl BuildError {
    /// True when the failure is caused by the stored samples themselves
    /// rather than by the filesystem.
    pub fn is_bad_sample(&self) -> bool {
        matches!(
            self,
            BuildError::DecodeFailure { .. }
                | BuildError::UnsupportedChannels { .. }
                | BuildError::ShapeMismatch { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("Malformed request: {0}")]
    BadRequest(String),
    #[error("Invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}
