//! Runs the enhancement engine against the extracted member and streams its
//! output into a durable writer.
//!
//! The engine is synchronous, so it runs on the blocking pool and hands
//! output chunks over a bounded channel to the async side.

use std::fs::File;
use std::io::{self, BufReader, Write};

use cifp_enhance::{EnhanceError, Options, Stats};
use tokio::sync::mpsc;

use crate::{error::PipelineError, storage::ObjectWriter};

/// Chunks in flight between the engine and the writer.
const CHANNEL_DEPTH: usize = 4;

/// `std::io::Write` adaptor that forwards full chunks over a channel.
pub struct ChannelWriter {
    tx: mpsc::Sender<Vec<u8>>,
    buffer: Vec<u8>,
    chunk_size: usize,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<Vec<u8>>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.tx
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "output writer closed"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.chunk_size - self.buffer.len();
        let n = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() >= self.chunk_size {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Transform `input` into `writer`. Engine failures surface as
/// `Transform`, writer failures as `ArchiveWrite`.
pub async fn transform_into(
    input: File,
    writer: &mut dyn ObjectWriter,
    options: Options,
    chunk_size: usize,
) -> Result<Stats, PipelineError> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);

    let engine = tokio::task::spawn_blocking(move || {
        let output = ChannelWriter::new(tx, chunk_size);
        cifp_enhance::process(BufReader::new(input), output, &options)
    });

    let mut write_error = None;
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = writer.write(&chunk).await {
            write_error = Some(e);
            break;
        }
    }
    // Unblocks the engine if it is still sending.
    drop(rx);

    let engine_result = engine.await;

    if let Some(e) = write_error {
        return Err(PipelineError::ArchiveWrite(format!("{:#}", e)));
    }

    match engine_result {
        Ok(result) => result.map_err(PipelineError::Transform),
        Err(join_error) => Err(PipelineError::Transform(EnhanceError::Io(io::Error::other(
            join_error.to_string(),
        )))),
    }
}
