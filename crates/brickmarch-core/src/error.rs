//! Error types for the host-side model.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Every brick slot in the atlas is occupied.
    #[error("Brick atlas exhausted: all {capacity} slots are occupied")]
    AllocationExhausted {
        /// Total number of brick slots.
        capacity: u32,
    },

    /// Out of bounds access
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
