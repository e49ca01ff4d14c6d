//! Durable object storage
//!
//! Objects are written through an [`ObjectWriter`] and only become visible
//! once the writer is closed. A writer that is aborted, or dropped without
//! being closed, leaves nothing behind.

use anyhow::Result;
use async_trait::async_trait;

pub mod config;
pub mod s3;

pub use s3::{S3ObjectSink, S3ObjectWriter};

/// Opens write streams for named objects.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn open_writer(&self, bucket: &str, name: &str) -> Result<Box<dyn ObjectWriter>>;

    /// Locator recorded in cycle metadata for a committed object.
    fn locator(&self, bucket: &str, name: &str) -> String;
}

/// Appendable write stream; nothing is committed before [`ObjectWriter::close`].
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Commit everything written so far.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> Result<()>;
}
