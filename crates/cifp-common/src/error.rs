//! Error types for CIFP

use thiserror::Error;

/// Result type alias for CIFP operations
pub type Result<T> = std::result::Result<T, CifpError>;

/// Main error type shared by the CIFP crates
#[derive(Error, Debug)]
pub enum CifpError {
    #[error("Invalid edition date {value:?}: expected MM/DD/YYYY")]
    InvalidEditionDate { value: String },
}
