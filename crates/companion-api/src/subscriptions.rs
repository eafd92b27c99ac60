use axum::{
    Extension, Json,
    extract::{Query, State, rejection::JsonRejection},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use companion_types::api::{
    Claims, PatchSubscriptionRequest, SubscriptionQuery, SubscriptionResponse,
    UpsertSubscriptionRequest,
};
use companion_types::models::Plan;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, convert};

const NOT_FOUND: &str = "Subscription not found";

/// Only the caller's own subscription is visible; anything else reads as missing.
fn ensure_caller(claims: &Claims, user_id: &str) -> Result<(), ApiError> {
    if user_id.parse::<Uuid>().ok() == Some(claims.sub) {
        Ok(())
    } else {
        Err(ApiError::not_found(NOT_FOUND))
    }
}

fn parse_plan(raw: &str) -> Result<Plan, ApiError> {
    raw.parse::<Plan>()
        .map_err(|_| ApiError::Validation(format!("Unknown plan '{}'", raw)))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("User ID is required"))?;
    ensure_caller(&claims, &user_id)?;

    let row = blocking(move || {
        state
            .db
            .get_subscription(&user_id)?
            .ok_or_else(|| ApiError::not_found(NOT_FOUND))
    })
    .await?;
    Ok(Json(convert::subscription(row)))
}

/// Create the subscription, or move an existing one to the new plan and reactivate it.
pub async fn upsert_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<UpsertSubscriptionRequest>, JsonRejection>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let Json(req) = body?;
    let (Some(user_id), Some(plan)) = (
        req.user_id.filter(|v| !v.is_empty()),
        req.plan.filter(|v| !v.is_empty()),
    ) else {
        return Err(ApiError::validation("User ID and plan are required"));
    };
    let plan = parse_plan(&plan)?;
    ensure_caller(&claims, &user_id)?;

    let row = blocking(move || Ok(state.db.upsert_subscription(&user_id, plan, Utc::now())?)).await?;
    info!(user_id = %row.user_id, %plan, "subscription set");

    Ok(Json(convert::subscription(row)))
}

pub async fn patch_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<PatchSubscriptionRequest>, JsonRejection>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let Json(req) = body?;
    let user_id = req
        .user_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation("User ID is required"))?;
    let plan = req
        .plan
        .filter(|v| !v.is_empty())
        .map(|raw| parse_plan(&raw))
        .transpose()?;
    ensure_caller(&claims, &user_id)?;

    let active = req.active;
    let row = blocking(move || {
        state
            .db
            .patch_subscription(&user_id, active, plan, Utc::now())?
            .ok_or_else(|| ApiError::not_found(NOT_FOUND))
    })
    .await?;
    if active == Some(false) {
        info!(user_id = %row.user_id, "subscription deactivated");
    }

    Ok(Json(convert::subscription(row)))
}
