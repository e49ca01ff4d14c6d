//! Test helpers for CIFP server integration tests
//!
//! This module provides:
//! - In-memory cycle store with injectable failures
//! - In-memory object sink that records opens, commits and aborts
//! - A scripted identity verifier that counts calls
//! - Zip and feed fixture builders
//! - A pipeline wired against a wiremock upstream

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use cifp_common::Cycle;
use cifp_server::{
    auth::{AuthGate, AuthPolicy, IdentityVerifier, VerifyError},
    config::ProcessSettings,
    db::{CycleStore, StoreError, StoreResult},
    process::ProcessPipeline,
    storage::{ObjectSink, ObjectWriter},
};
use serde_json::{json, Value};
use zip::write::SimpleFileOptions;

pub const BUCKET: &str = "faa-cifp-data";
pub const ALLOWED_PRINCIPAL: &str = "cifp-trigger@example.iam.gserviceaccount.com";
pub const EDITION_DATE: &str = "06/18/2020";
pub const FEED_PATH: &str = "/apra/cifp/chart";
pub const ARCHIVE_PATH: &str = "/Upload_313-d/cifp/cifp_202006.zip";

pub const HEADER: &str = "HDR01FAACIFP18      001P013203946709  06-JUN-2020 10:07:06 U.S.A. DOT FAA";
pub const LOCALIZER: &str =
    "SUSAP KSFOK2IISFO    0110950ILS                  N37362978W122213100          ";
pub const WAYPOINT: &str =
    "SUSAP KSFOK2CAAAMY K20    W     N37403389W122270817                       E0140";

// ============================================================================
// Cycle store
// ============================================================================

#[derive(Default)]
pub struct MemoryCycleStore {
    cycles: Mutex<Vec<Cycle>>,
    pub fail_get: AtomicBool,
    pub fail_add: AtomicBool,
    pub fail_list: AtomicBool,
    pub gets: AtomicUsize,
}

impl MemoryCycleStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_cycles(cycles: Vec<Cycle>) -> Arc<Self> {
        let store = Self::default();
        *store.cycles.lock().unwrap() = cycles;
        Arc::new(store)
    }

    pub fn cycles(&self) -> Vec<Cycle> {
        self.cycles.lock().unwrap().clone()
    }
}

#[async_trait]
impl CycleStore for MemoryCycleStore {
    async fn add(&self, cycle: &Cycle) -> StoreResult<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        let mut cycles = self.cycles.lock().unwrap();
        if cycles.iter().any(|c| c.name == cycle.name) {
            return Err(StoreError::Duplicate(cycle.name.clone()));
        }
        cycles.push(cycle.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> StoreResult<Option<Cycle>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(self.cycles.lock().unwrap().iter().find(|c| c.name == name).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Cycle>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(self.cycles.lock().unwrap().clone())
    }
}

pub fn cycle(name: &str, date: NaiveDate) -> Cycle {
    Cycle::new(
        name,
        date,
        format!("s3://{}/original/{}", BUCKET, name),
        format!("s3://{}/processed/{}", BUCKET, name),
    )
}

// ============================================================================
// Object sink
// ============================================================================

#[derive(Default)]
struct SinkState {
    opened: Vec<String>,
    committed: HashMap<String, Vec<u8>>,
    aborted: Vec<String>,
}

/// Objects only appear in `committed` once their writer is closed.
#[derive(Default)]
pub struct MemoryObjectSink {
    state: Arc<Mutex<SinkState>>,
    /// Writers for names with this prefix fail on write
    pub fail_write_prefix: Mutex<Option<String>>,
    /// Writers for names with this prefix fail on close
    pub fail_close_prefix: Mutex<Option<String>>,
}

impl MemoryObjectSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes_to(&self, prefix: &str) {
        *self.fail_write_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn fail_closes_of(&self, prefix: &str) {
        *self.fail_close_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }

    pub fn committed(&self, name: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(&format!("{}/{}", BUCKET, name))
            .cloned()
    }

    pub fn committed_count(&self) -> usize {
        self.state.lock().unwrap().committed.len()
    }
}

fn matches_prefix(prefix: &Mutex<Option<String>>, name: &str) -> bool {
    prefix
        .lock()
        .unwrap()
        .as_deref()
        .is_some_and(|p| name.starts_with(p))
}

#[async_trait]
impl ObjectSink for MemoryObjectSink {
    async fn open_writer(&self, bucket: &str, name: &str) -> anyhow::Result<Box<dyn ObjectWriter>> {
        let key = format!("{}/{}", bucket, name);
        self.state.lock().unwrap().opened.push(name.to_string());
        Ok(Box::new(MemoryWriter {
            key,
            name: name.to_string(),
            data: Vec::new(),
            fail_write: matches_prefix(&self.fail_write_prefix, name),
            fail_close: matches_prefix(&self.fail_close_prefix, name),
            state: self.state.clone(),
        }))
    }

    fn locator(&self, bucket: &str, name: &str) -> String {
        format!("s3://{}/{}", bucket, name)
    }
}

struct MemoryWriter {
    key: String,
    name: String,
    data: Vec<u8>,
    fail_write: bool,
    fail_close: bool,
    state: Arc<Mutex<SinkState>>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        if self.fail_write {
            anyhow::bail!("write to {} refused", self.key);
        }
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        if self.fail_close {
            anyhow::bail!("commit of {} refused", self.key);
        }
        let this = *self;
        this.state.lock().unwrap().committed.insert(this.key, this.data);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> anyhow::Result<()> {
        self.state.lock().unwrap().aborted.push(self.name.clone());
        Ok(())
    }
}

// ============================================================================
// Identity verifier
// ============================================================================

pub struct ScriptedVerifier {
    result: Result<String, VerifyError>,
    pub calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn returning(result: Result<String, VerifyError>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn allowed() -> Arc<Self> {
        Self::returning(Ok(ALLOWED_PRINCIPAL.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for ScriptedVerifier {
    async fn verify(&self, _token: &str) -> Result<String, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

pub fn gate(verifier: Arc<ScriptedVerifier>) -> AuthGate {
    AuthGate::new(verifier, AuthPolicy::RequirePrincipal(ALLOWED_PRINCIPAL.to_string()))
}

// ============================================================================
// Fixtures
// ============================================================================

/// Build a zip with the given entries, in order.
pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Raw CIFP data with one duplicated localizer and CRLF line endings.
pub fn cifp_data() -> String {
    [HEADER, LOCALIZER, WAYPOINT, LOCALIZER]
        .iter()
        .map(|line| format!("{}\r\n", line))
        .collect()
}

/// What the engine makes of [`cifp_data`] with duplicate removal on.
pub fn enhanced_data() -> String {
    [HEADER, LOCALIZER, WAYPOINT]
        .iter()
        .map(|line| format!("{}\n", line))
        .collect()
}

pub fn cifp_archive() -> Vec<u8> {
    zip_with(&[
        ("README.txt", &b"Coded Instrument Flight Procedures"[..]),
        ("FAACIFP18", cifp_data().as_bytes()),
    ])
}

pub fn feed_json(edition_date: &str, archive_url: &str) -> Value {
    json!({
        "edition": [{
            "editionName": "CURRENT",
            "format": "ZIP",
            "editionDate": edition_date,
            "editionNumber": 1,
            "product": {
                "productName": "CIFP",
                "url": archive_url
            }
        }]
    })
}

pub fn settings(upstream: &str, scratch_dir: &Path) -> ProcessSettings {
    ProcessSettings {
        feed_url: format!("{}{}", upstream, FEED_PATH),
        scratch_dir: Some(scratch_dir.to_path_buf()),
        copy_buffer_bytes: 1024,
        ..ProcessSettings::default()
    }
}

pub fn pipeline(
    settings: ProcessSettings,
    gate: AuthGate,
    store: Arc<MemoryCycleStore>,
    sink: Arc<MemoryObjectSink>,
) -> ProcessPipeline {
    ProcessPipeline::new(settings, BUCKET, gate, store, sink, reqwest::Client::new())
}

pub fn bearer() -> Option<&'static str> {
    Some("Bearer test-identity-token")
}

/// Number of entries left in a scratch directory.
pub fn scratch_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
