//! CIFP Server Library
//!
//! Fetches the FAA Coded Instrument Flight Procedures (CIFP) edition,
//! archives the original zip and an enhanced copy of its data file, and
//! records every processed edition as a cycle.
//!
//! # Overview
//!
//! - **auth**: Identity verification and the authorization gate
//! - **db**: Cycle store trait and its PostgreSQL implementation
//! - **storage**: Object sink trait and its S3 implementation
//! - **process**: The fetch / dedup / archive / transform / record pipeline
//! - **features**: Axum routes
//!
//! Collaborators are passed to [`process::ProcessPipeline`] as trait objects,
//! so the pipeline never depends on a particular cloud SDK.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod process;
pub mod storage;

pub use config::Config;
pub use error::{ApiError, PipelineError};
