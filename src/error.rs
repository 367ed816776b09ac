use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
pub enum MetricIndexError {
    /// The caller handed us something unusable: a malformed coordinate
    /// buffer, non-finite values, or query arguments that make no sense.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A serialized index buffer failed validation on load.
    #[error("Corrupt index buffer: {0}")]
    CorruptState(String),
}

pub type Result<T> = std::result::Result<T, MetricIndexError>;
