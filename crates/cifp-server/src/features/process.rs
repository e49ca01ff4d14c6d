use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
};

use super::AppState;
use crate::{error::PipelineError, process::ProcessOutcome};

/// Trigger one process run. Responds 200 with an empty body whether the
/// current edition was processed now or had been processed before.
pub async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, PipelineError> {
    let credential = headers
        .get(AUTHORIZATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    let outcome = state
        .pipeline
        .run_with_deadline(credential.as_deref(), state.process_timeout)
        .await?;

    if let ProcessOutcome::Processed { original_bytes, .. } = &outcome {
        tracing::debug!(original_bytes, "Process request completed");
    }

    Ok(StatusCode::OK)
}
