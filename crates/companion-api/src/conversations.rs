use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::debug;

use companion_db::queries;
use companion_types::api::{Claims, ConversationResponse, CreateConversationRequest};
use companion_types::models::Sender;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, convert};

/// How many messages each entry of the conversation list carries.
const PREVIEW_MESSAGES: u32 = 10;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let conversations = blocking(move || {
        let rows = state.db.list_conversations(&claims.sub.to_string())?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let personality = state.db.get_personality(&row.personality_id)?;
            let messages = state.db.get_messages(&row.id, Some(PREVIEW_MESSAGES))?;
            out.push(convert::conversation(row, personality, messages));
        }
        Ok(out)
    })
    .await?;

    Ok(Json(conversations))
}

/// Full history of one owned conversation.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = blocking(move || {
        let row = state
            .db
            .get_owned_conversation(&conversation_id, &claims.sub.to_string())?
            .ok_or_else(|| {
                ApiError::denied(state.settings.deny_conversations, "Conversation not found or access denied")
            })?;
        let personality = state.db.get_personality(&row.personality_id)?;
        let messages = state.db.get_messages(&row.id, None)?;
        Ok(convert::conversation(row, personality, messages))
    })
    .await?;

    Ok(Json(conversation))
}

/// Returns the caller's conversation with a personality, creating it if needed.
/// A new conversation starts with a greeting from the rotation.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let personality_id = req
        .girlfriend_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Girlfriend ID is required"))?;

    let (created, conversation) = blocking(move || {
        let personality = state
            .db
            .get_personality(&personality_id)?
            .ok_or_else(|| ApiError::not_found("Personality not found"))?;

        let user_id = claims.sub.to_string();
        let now = Utc::now();
        let (row, created, greeting) = state.db.with_tx(|conn| {
            let (row, created) = queries::find_or_create_conversation(conn, &user_id, &personality.id, now)?;
            let greeting = match created.then(|| state.openers.next(&user_id)).flatten() {
                Some(text) => Some(queries::insert_message(conn, &row.id, Sender::Ai, text, now)?),
                None => None,
            };
            Ok((row, created, greeting))
        })?;
        if created {
            debug!(conversation_id = %row.id, "conversation opened");
        }

        Ok((created, convert::conversation(row, Some(personality), greeting.into_iter().collect())))
    })
    .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(conversation)))
}
