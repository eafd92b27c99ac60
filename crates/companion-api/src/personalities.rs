use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use companion_db::models::NewPersonality;
use companion_types::api::{CreatePersonalityRequest, PersonalityResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, convert};

pub async fn list_personalities(
    State(state): State<AppState>,
) -> Result<Json<Vec<PersonalityResponse>>, ApiError> {
    let rows = blocking(move || Ok(state.db.list_personalities()?)).await?;
    Ok(Json(rows.into_iter().map(convert::personality).collect()))
}

pub async fn get_personality(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PersonalityResponse>, ApiError> {
    let row = blocking(move || {
        state
            .db
            .get_personality(&id)?
            .ok_or_else(|| ApiError::not_found("Personality not found"))
    })
    .await?;
    Ok(Json(convert::personality(row)))
}

pub async fn create_personality(
    State(state): State<AppState>,
    body: Result<Json<CreatePersonalityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let (Some(name), Some(kind), Some(description), Some(image_url), Some(greeting)) = (
        field(req.name),
        field(req.kind),
        field(req.description),
        field(req.image_url),
        field(req.greeting),
    ) else {
        return Err(ApiError::missing_fields());
    };

    let row = blocking(move || {
        Ok(state.db.create_personality(
            &NewPersonality {
                name: &name,
                kind: &kind,
                description: &description,
                image_url: &image_url,
                greeting: &greeting,
            },
            Utc::now(),
        )?)
    })
    .await?;
    info!(personality_id = %row.id, kind = %row.kind, "personality created");

    Ok((StatusCode::CREATED, Json(convert::personality(row))))
}

fn field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
