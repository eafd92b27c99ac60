use axum::{Json, extract::State};

use companion_types::api::HealthResponse;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    blocking(move || Ok(state.db.ping()?)).await?;
    Ok(Json(HealthResponse {
        status: "ok",
        database: "ok",
    }))
}
