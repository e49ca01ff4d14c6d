use axum::{extract::State, Json};
use cifp_common::{types::most_recent, Cycle};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct CyclesResponse {
    pub cycles: Vec<Cycle>,
}

/// Most recent processed cycles, newest first.
pub async fn list_cycles(State(state): State<AppState>) -> Result<Json<CyclesResponse>, ApiError> {
    let cycles = tokio::time::timeout(state.list_timeout, state.cycles.list())
        .await
        .map_err(|_| ApiError::Timeout(state.list_timeout))??;

    Ok(Json(CyclesResponse {
        cycles: most_recent(cycles),
    }))
}
