//! Process pipeline
//!
//! One run fetches the current CIFP edition, skips it if it was already
//! processed, and otherwise archives the original zip and the enhanced data
//! file before recording the cycle:
//!
//! ```text
//! Authorizing -> FetchingMetadata -> CheckingDedup -> FetchingArchive
//!   -> ArchivingOriginal -> ExtractingMember
//!   -> TransformingAndArchivingProcessed -> RecordingCycle -> Done
//! ```
//!
//! Both durable writers stay uncommitted until the processed output has been
//! produced, and the cycle record is the last write of a run. Any failure
//! before the commits aborts both writers. Scratch files are removed when
//! they go out of scope, whatever the outcome.

use std::fmt;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use cifp_common::{naming::ObjectNames, Cycle};
use cifp_enhance::{Options, Stats};
use futures::TryStreamExt;
use tempfile::NamedTempFile;
use tokio_util::io::StreamReader;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    auth::AuthGate,
    config::ProcessSettings,
    db::CycleStore,
    error::PipelineError,
    storage::{ObjectSink, ObjectWriter},
};

pub mod archive;
pub mod feed;
pub mod tee;
pub mod transform;

use archive::{ArchiveError, ArchiveReader};
use feed::CurrentEdition;
use tee::{TeeError, TeeSummary};

/// Pipeline states, used to attribute failures in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authorizing,
    FetchingMetadata,
    CheckingDedup,
    FetchingArchive,
    ArchivingOriginal,
    ExtractingMember,
    TransformingAndArchivingProcessed,
    RecordingCycle,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Authorizing => "authorizing",
            Stage::FetchingMetadata => "fetching_metadata",
            Stage::CheckingDedup => "checking_dedup",
            Stage::FetchingArchive => "fetching_archive",
            Stage::ArchivingOriginal => "archiving_original",
            Stage::ExtractingMember => "extracting_member",
            Stage::TransformingAndArchivingProcessed => "transforming_and_archiving_processed",
            Stage::RecordingCycle => "recording_cycle",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed {
        cycle: Cycle,
        original_bytes: u64,
        original_sha256: String,
        stats: Stats,
    },
    AlreadyProcessed {
        name: String,
    },
}

/// Writers opened by a run and not yet committed.
#[derive(Default)]
struct PendingWriters {
    original: Option<Box<dyn ObjectWriter>>,
    processed: Option<Box<dyn ObjectWriter>>,
}

impl PendingWriters {
    async fn abort(&mut self) {
        for writer in [self.original.take(), self.processed.take()].into_iter().flatten() {
            if let Err(e) = writer.abort().await {
                warn!(error = %format!("{:#}", e), "Failed to abort object writer");
            }
        }
    }

    /// Commit the original, then the processed output.
    async fn commit(mut self) -> Result<(), PipelineError> {
        if let Some(original) = self.original.take() {
            if let Err(e) = original.close().await {
                self.abort().await;
                return Err(PipelineError::ArchiveWrite(format!("{:#}", e)));
            }
        }

        if let Some(processed) = self.processed.take() {
            processed.close().await.map_err(|e| {
                warn!("Original archive committed without its processed output");
                PipelineError::ArchiveWrite(format!("{:#}", e))
            })?;
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct ProcessPipeline {
    settings: ProcessSettings,
    bucket: String,
    gate: AuthGate,
    cycles: Arc<dyn CycleStore>,
    sink: Arc<dyn ObjectSink>,
    http: reqwest::Client,
}

impl ProcessPipeline {
    pub fn new(
        settings: ProcessSettings,
        bucket: impl Into<String>,
        gate: AuthGate,
        cycles: Arc<dyn CycleStore>,
        sink: Arc<dyn ObjectSink>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            bucket: bucket.into(),
            gate,
            cycles,
            sink,
            http,
        }
    }

    pub fn settings(&self) -> &ProcessSettings {
        &self.settings
    }

    /// Run, giving up with `Timeout` once `deadline` has elapsed. Giving up
    /// drops the run, which removes its scratch files and schedules aborts
    /// of its open writers.
    pub async fn run_with_deadline(
        &self,
        credential: Option<&str>,
        deadline: Duration,
    ) -> Result<ProcessOutcome, PipelineError> {
        match tokio::time::timeout(deadline, self.run(credential)).await {
            Ok(result) => result,
            Err(_) => {
                error!(?deadline, "Process run timed out");
                Err(PipelineError::Timeout(deadline))
            },
        }
    }

    /// Execute one run for the holder of `credential` (the raw
    /// `Authorization` header value).
    pub async fn run(&self, credential: Option<&str>) -> Result<ProcessOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("process_run", %run_id);

        let mut stage = Stage::Authorizing;
        let result = self.execute(credential, &mut stage).instrument(span.clone()).await;

        if let Err(e) = &result {
            span.in_scope(|| error!(stage = %stage, error = %e, "Process run failed"));
        }

        result
    }

    async fn execute(
        &self,
        credential: Option<&str>,
        stage: &mut Stage,
    ) -> Result<ProcessOutcome, PipelineError> {
        *stage = Stage::Authorizing;
        let authorization = self.gate.authorize(credential).await?;
        info!(principal = authorization.principal(), "Process run authorized");

        *stage = Stage::FetchingMetadata;
        let edition = feed::fetch_current_edition(&self.http, &self.settings.feed_url).await?;
        info!(edition = %edition.name, "Current edition");

        *stage = Stage::CheckingDedup;
        let existing = self
            .cycles
            .get(&edition.name)
            .await
            .map_err(PipelineError::MetadataStore)?;
        if existing.is_some() {
            info!(edition = %edition.name, "Edition already processed, skipping");
            return Ok(ProcessOutcome::AlreadyProcessed { name: edition.name });
        }

        let names = ObjectNames::new(&self.settings.base_filename, &edition.name);

        let mut writers = PendingWriters::default();
        let (summary, stats) = match self.produce(&edition, &names, &mut writers, stage).await {
            Ok(produced) => produced,
            Err(e) => {
                writers.abort().await;
                return Err(e);
            },
        };
        writers.commit().await?;

        *stage = Stage::RecordingCycle;
        let cycle = Cycle::new(
            edition.name,
            edition.date,
            self.sink.locator(&self.bucket, &names.original),
            self.sink.locator(&self.bucket, &names.processed),
        );
        self.cycles
            .add(&cycle)
            .await
            .map_err(PipelineError::MetadataStore)?;

        info!(
            edition = %cycle.name,
            original = %cycle.original_location,
            processed = %cycle.processed_location,
            records_written = stats.records_written,
            duplicates_removed = stats.duplicates_removed,
            "Edition processed"
        );

        Ok(ProcessOutcome::Processed {
            cycle,
            original_bytes: summary.bytes,
            original_sha256: summary.sha256,
            stats,
        })
    }

    /// Everything between the dedup check and the commits. Writers opened
    /// here are left in `writers` for the caller to commit or abort.
    async fn produce(
        &self,
        edition: &CurrentEdition,
        names: &ObjectNames,
        writers: &mut PendingWriters,
        stage: &mut Stage,
    ) -> Result<(TeeSummary, Stats), PipelineError> {
        *stage = Stage::FetchingArchive;
        let response = self
            .http
            .get(&edition.archive_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::UpstreamUnavailable(e.to_string()))?;

        *stage = Stage::ArchivingOriginal;
        let original = writers.original.insert(
            self.sink
                .open_writer(&self.bucket, &names.original)
                .await
                .map_err(|e| PipelineError::ArchiveWrite(format!("{:#}", e)))?,
        );

        let archive_scratch = self.scratch_file()?;
        let mut scratch_writer = tokio::fs::File::from_std(
            archive_scratch.reopen().map_err(PipelineError::Scratch)?,
        );
        let body = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        tokio::pin!(body);

        let summary = tee::tee_copy(
            &mut body,
            original.as_mut(),
            &mut scratch_writer,
            self.settings.copy_buffer_bytes,
        )
        .await
        .map_err(|e| match e {
            TeeError::Read(e) => PipelineError::UpstreamUnavailable(e.to_string()),
            other => PipelineError::ArchiveWrite(other.to_string()),
        })?;
        drop(scratch_writer);

        info!(bytes = summary.bytes, sha256 = %summary.sha256, "Original archive streamed");

        *stage = Stage::ExtractingMember;
        let member_scratch = self.scratch_file()?;
        let member_file = member_scratch.reopen().map_err(PipelineError::Scratch)?;
        let member_name = self.settings.member_name.clone();
        let archive_len = summary.bytes;

        let (entry, member_bytes) = tokio::task::spawn_blocking(move || {
            let source = archive_scratch.reopen()?;
            let mut reader = ArchiveReader::new(source, archive_len)?;
            let mut out = BufWriter::new(member_file);
            let copied = reader.copy_member(&member_name, &mut out)?;
            out.flush()?;
            Ok::<_, ArchiveError>(copied)
        })
        .await
        .map_err(|e| PipelineError::ArchiveCorrupt(e.to_string()))?
        .map_err(|e| match e {
            ArchiveError::Corrupt(detail) => PipelineError::ArchiveCorrupt(detail),
            ArchiveError::MemberNotFound { member } => PipelineError::MemberNotFound { member },
            ArchiveError::Io(e) => PipelineError::Scratch(e),
        })?;

        info!(entry = %entry, bytes = member_bytes, "Member extracted");

        *stage = Stage::TransformingAndArchivingProcessed;
        let processed = writers.processed.insert(
            self.sink
                .open_writer(&self.bucket, &names.processed)
                .await
                .map_err(|e| PipelineError::ArchiveWrite(format!("{:#}", e)))?,
        );

        let input = member_scratch.reopen().map_err(PipelineError::Scratch)?;
        let options = Options::new()
            .remove_duplicate_localizers(self.settings.remove_duplicate_localizers);
        let stats = transform::transform_into(
            input,
            processed.as_mut(),
            options,
            self.settings.copy_buffer_bytes,
        )
        .await?;

        Ok((summary, stats))
    }

    fn scratch_file(&self) -> Result<NamedTempFile, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cifp-");

        match &self.settings.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(PipelineError::Scratch)
    }
}
