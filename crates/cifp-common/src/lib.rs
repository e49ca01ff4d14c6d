//! CIFP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, naming rules, and error handling for the CIFP workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `CifpError` and the `Result` alias
//! - **Naming**: Object names derived from an edition date
//! - **Types**: The `Cycle` record persisted for every processed edition
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```
//! use cifp_common::naming::ObjectNames;
//!
//! let names = ObjectNames::new("FAACIFP18", "06/18/2020");
//! assert_eq!(names.original, "original/FAACIFP18_original_06-18-2020.zip");
//! assert_eq!(names.processed, "processed/FAACIFP18_processed_06-18-2020");
//! ```

pub mod error;
pub mod logging;
pub mod naming;
pub mod types;

// Re-export commonly used types
pub use error::{CifpError, Result};
pub use types::Cycle;
