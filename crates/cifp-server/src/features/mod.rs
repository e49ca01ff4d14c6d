//! HTTP surface
//!
//! - `GET|POST /process` triggers a process run
//! - `GET /cycles` lists the most recent processed cycles
//! - `GET /health` reports liveness

pub mod cycles;
pub mod process;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{db::CycleStore, middleware, process::ProcessPipeline};

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ProcessPipeline,
    pub cycles: Arc<dyn CycleStore>,
    /// Deadline for one process run
    pub process_timeout: Duration,
    /// Deadline for the cycle listing
    pub list_timeout: Duration,
}

impl AppState {
    /// State using the deadlines from the pipeline's settings.
    pub fn new(pipeline: ProcessPipeline, cycles: Arc<dyn CycleStore>) -> Self {
        let process_timeout = pipeline.settings().process_timeout();
        let list_timeout = pipeline.settings().list_timeout();
        Self {
            pipeline,
            cycles,
            process_timeout,
            list_timeout,
        }
    }
}

/// Creates the application router with all routes and middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process", get(process::trigger).post(process::trigger))
        .route("/cycles", get(cycles::list_cycles))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(middleware::tracing_layer())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
