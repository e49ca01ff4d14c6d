//! Fan-out copy of the archive download
//!
//! Every chunk read from the source is written to the durable sink and the
//! local scratch file before the next chunk is read, so at most one buffer
//! of data is in flight.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::storage::ObjectWriter;

#[derive(Error, Debug)]
pub enum TeeError {
    #[error("Reading source failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("Writing durable copy failed: {0:#}")]
    Sink(anyhow::Error),

    #[error("Writing scratch copy failed: {0}")]
    Scratch(#[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeeSummary {
    pub bytes: u64,
    /// Lowercase hex SHA-256 of everything copied
    pub sha256: String,
}

/// Copy `source` to both `sink` and `scratch` using a buffer of
/// `buffer_bytes`. The first failure stops the copy; closing or aborting the
/// destinations is left to the caller.
pub async fn tee_copy<R, W>(
    source: &mut R,
    sink: &mut dyn ObjectWriter,
    scratch: &mut W,
    buffer_bytes: usize,
) -> Result<TeeSummary, TeeError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut buffer = vec![0u8; buffer_bytes.max(1)];
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;

    loop {
        let n = source.read(&mut buffer).await.map_err(TeeError::Read)?;
        if n == 0 {
            break;
        }

        let chunk = &buffer[..n];
        let (sink_result, scratch_result) = tokio::join!(sink.write(chunk), scratch.write_all(chunk));
        sink_result.map_err(TeeError::Sink)?;
        scratch_result.map_err(TeeError::Scratch)?;

        hasher.update(chunk);
        bytes += n as u64;
    }

    scratch.flush().await.map_err(TeeError::Scratch)?;

    Ok(TeeSummary {
        bytes,
        sha256: hex::encode(hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    #[derive(Default)]
    struct Collect {
        data: Vec<u8>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl ObjectWriter for Collect {
        async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
            if let Some(limit) = self.fail_after {
                if self.data.len() + chunk.len() > limit {
                    anyhow::bail!("quota exceeded");
                }
            }
            self.data.extend_from_slice(chunk);
            Ok(())
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn abort(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn payload() -> Vec<u8> {
        (0..100_000u32).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_both_copies_identical_for_any_buffer_size() {
        let data = payload();
        let expected = hex::encode(Sha256::digest(&data));

        for buffer_bytes in [1, 7, 4096, 65536, 1 << 20] {
            let mut sink = Collect::default();
            let mut scratch = Vec::new();
            let mut source = &data[..];

            let summary = tee_copy(&mut source, &mut sink, &mut scratch, buffer_bytes)
                .await
                .unwrap();

            assert_eq!(sink.data, data, "buffer {}", buffer_bytes);
            assert_eq!(scratch, data, "buffer {}", buffer_bytes);
            assert_eq!(summary.bytes, data.len() as u64);
            assert_eq!(summary.sha256, expected);
        }
    }

    #[tokio::test]
    async fn test_empty_source() {
        let mut sink = Collect::default();
        let mut scratch = Vec::new();
        let mut source: &[u8] = &[];

        let summary = tee_copy(&mut source, &mut sink, &mut scratch, 16).await.unwrap();
        assert_eq!(summary.bytes, 0);
        assert_eq!(
            summary.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_sink_failure_surfaces() {
        let data = payload();
        let mut sink = Collect {
            data: Vec::new(),
            fail_after: Some(1000),
        };
        let mut scratch = Vec::new();
        let mut source = &data[..];

        let err = tee_copy(&mut source, &mut sink, &mut scratch, 512).await.unwrap_err();
        assert!(matches!(err, TeeError::Sink(_)));
    }

    /// Scratch destination that runs out of space after `capacity` bytes.
    struct FullDisk {
        written: usize,
        capacity: usize,
    }

    impl AsyncWrite for FullDisk {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if self.written + buf.len() > self.capacity {
                return Poll::Ready(Err(std::io::Error::other("no space left on device")));
            }
            self.written += buf.len();
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_scratch_failure_surfaces() {
        let data = payload();
        let mut sink = Collect::default();
        let mut scratch = FullDisk {
            written: 0,
            capacity: 2048,
        };
        let mut source = &data[..];

        let err = tee_copy(&mut source, &mut sink, &mut scratch, 512).await.unwrap_err();

        assert!(matches!(err, TeeError::Scratch(_)));
        assert!(sink.data.len() < data.len());
    }
}
