use thiserror::Error;

/// Errors that can occur during link analysis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    /// Coordinates, frequency or antenna heights out of range.
    #[error("Invalid link input: {0}")]
    InvalidInput(String),
}
