use axum::{
    Extension, Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use companion_db::models::{MemoryRow, NewMemory};
use companion_types::api::{
    Claims, ConversationQuery, CreateConversationMemoryRequest, CreateMemoryRequest, MemoryEnvelope,
    MemoryIdQuery, MemoryList, MemoryQuery, MemoryResponse, UpdateMemoryRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, convert};

const NOT_FOUND: &str = "Memory not found";
const CONVERSATION_NOT_OWNED: &str = "Conversation not found or access denied";

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `userId` in a request must name the caller.
fn ensure_caller(state: &AppState, claims: &Claims, user_id: &str) -> Result<(), ApiError> {
    if user_id.parse::<Uuid>().ok() == Some(claims.sub) {
        Ok(())
    } else {
        Err(ApiError::denied(state.settings.deny_memories, NOT_FOUND))
    }
}

/// Load a memory the caller owns. Missing is always 404; someone else's
/// follows the configured denial status.
fn owned_memory(state: &AppState, claims: &Claims, id: &str) -> Result<MemoryRow, ApiError> {
    let row = state
        .db
        .get_memory(id)?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    ensure_caller(state, claims, &row.user_id)?;
    Ok(row)
}

/// `GET /memory?userId=&characterId=`
pub async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<MemoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MemoryList>, ApiError> {
    let (Some(user_id), Some(character_id)) = (non_empty(query.user_id), non_empty(query.character_id))
    else {
        return Err(ApiError::validation("Missing required parameters"));
    };
    ensure_caller(&state, &claims, &user_id)?;

    let rows = blocking(move || Ok(state.db.memories_for_character(&user_id, &character_id)?)).await?;
    Ok(Json(MemoryList {
        memories: rows.into_iter().map(convert::memory).collect(),
    }))
}

/// `GET /memories?conversationId=`
pub async fn list_conversation_memories(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MemoryResponse>>, ApiError> {
    let conversation_id = non_empty(query.conversation_id)
        .ok_or_else(|| ApiError::validation("Conversation ID is required"))?;

    let rows = blocking(move || {
        state
            .db
            .get_owned_conversation(&conversation_id, &claims.sub.to_string())?
            .ok_or_else(|| ApiError::denied(state.settings.deny_memories, CONVERSATION_NOT_OWNED))?;
        Ok(state.db.memories_for_conversation(&conversation_id)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::memory).collect()))
}

/// `POST /memories`: attach a memory to one of the caller's conversations.
/// The character is taken from the conversation.
pub async fn create_conversation_memory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateConversationMemoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let (Some(content), Some(conversation_id)) = (non_empty(req.content), non_empty(req.conversation_id))
    else {
        return Err(ApiError::validation("Content and Conversation ID are required"));
    };
    let importance = req.importance.unwrap_or(1);

    let row = blocking(move || {
        let user_id = claims.sub.to_string();
        let conversation = state
            .db
            .get_owned_conversation(&conversation_id, &user_id)?
            .ok_or_else(|| ApiError::denied(state.settings.deny_memories, CONVERSATION_NOT_OWNED))?;

        Ok(state.db.insert_memory(
            &NewMemory {
                user_id: &user_id,
                conversation_id: Some(&conversation.id),
                personality_id: Some(&conversation.personality_id),
                source_message_id: None,
                content: &content,
                importance,
            },
            Utc::now(),
        )?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::memory(row))))
}

pub async fn create_memory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateMemoryRequest>, JsonRejection>,
) -> Result<Json<MemoryEnvelope>, ApiError> {
    let Json(req) = body?;
    let (Some(user_id), Some(character_id), Some(content)) = (
        non_empty(req.user_id),
        non_empty(req.character_id),
        non_empty(req.content),
    ) else {
        return Err(ApiError::missing_fields());
    };
    ensure_caller(&state, &claims, &user_id)?;
    let importance = req.importance.unwrap_or(1);

    let row = blocking(move || {
        if state.db.get_personality(&character_id)?.is_none() {
            return Err(ApiError::not_found("Character not found"));
        }

        Ok(state.db.insert_memory(
            &NewMemory {
                user_id: &user_id,
                conversation_id: None,
                personality_id: Some(&character_id),
                source_message_id: None,
                content: &content,
                importance,
            },
            Utc::now(),
        )?)
    })
    .await?;

    Ok(Json(MemoryEnvelope {
        memory: convert::memory(row),
    }))
}

pub async fn update_memory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<UpdateMemoryRequest>, JsonRejection>,
) -> Result<Json<MemoryEnvelope>, ApiError> {
    let Json(req) = body?;
    let id = non_empty(req.id).ok_or_else(|| ApiError::validation("Missing memory ID"))?;

    let row = blocking(move || {
        owned_memory(&state, &claims, &id)?;
        state
            .db
            .update_memory(&id, req.content.as_deref(), req.importance, Utc::now())?
            .ok_or_else(|| ApiError::not_found(NOT_FOUND))
    })
    .await?;

    Ok(Json(MemoryEnvelope {
        memory: convert::memory(row),
    }))
}

pub async fn delete_memory(
    State(state): State<AppState>,
    Query(query): Query<MemoryIdQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    let id = non_empty(query.id).ok_or_else(|| ApiError::validation("Missing memory ID"))?;

    blocking(move || {
        owned_memory(&state, &claims, &id)?;
        if !state.db.delete_memory(&id)? {
            return Err(ApiError::not_found(NOT_FOUND));
        }
        Ok(())
    })
    .await?;

    Ok(Json(json!({ "success": true })))
}
