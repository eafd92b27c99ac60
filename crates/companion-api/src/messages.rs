use axum::{
    Extension, Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Local, Utc};
use tracing::debug;

use companion_core::extractor::{self, DEFAULT_IMPORTANCE};
use companion_core::policy;
use companion_db::models::NewMemory;
use companion_types::api::{Claims, ConversationQuery, LimitReached, MessageResponse, SendMessageRequest};
use companion_types::models::{MemoryPolicy, Sender};

use crate::auth::AppState;
use crate::chat::{Admission, admit_user_message};
use crate::error::ApiError;
use crate::{blocking, convert};

const NOT_OWNED: &str = "Conversation not found or access denied";

/// A validated `POST /messages` body.
struct NewMessage {
    content: String,
    from_user: bool,
    conversation_id: String,
}

impl TryFrom<SendMessageRequest> for NewMessage {
    type Error = ApiError;

    fn try_from(req: SendMessageRequest) -> Result<Self, Self::Error> {
        let present = |field: Option<String>| field.filter(|v| !v.trim().is_empty());
        match (present(req.content), present(req.girlfriend_id), present(req.conversation_id)) {
            (Some(content), Some(_girlfriend_id), Some(conversation_id)) => Ok(Self {
                content,
                // Omitting the flag counts against the quota.
                from_user: req.is_user_message.unwrap_or(true),
                conversation_id,
            }),
            _ => Err(ApiError::missing_fields()),
        }
    }
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let conversation_id = query
        .conversation_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("Conversation ID is required"))?;

    // Run blocking DB queries off the async runtime
    let rows = blocking(move || {
        state
            .db
            .get_owned_conversation(&conversation_id, &claims.sub.to_string())?
            .ok_or_else(|| ApiError::denied(state.settings.deny_messages, NOT_OWNED))?;
        Ok(state.db.get_messages(&conversation_id, None)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::message).collect()))
}

/// Append a message to an owned conversation without generating a reply.
/// User messages are quota-checked and scanned for memory keywords.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let new = NewMessage::try_from(req)?;
    let user_id = claims.sub.to_string();

    blocking(move || {
        let conversation = state
            .db
            .get_owned_conversation(&new.conversation_id, &user_id)?
            .ok_or_else(|| ApiError::denied(state.settings.deny_messages, NOT_OWNED))?;

        let now = Local::now();
        let stamp = now.with_timezone(&Utc);

        let row = if new.from_user {
            let day_start = policy::start_of_day(&now);
            let admission = state.db.with_tx(|conn| {
                admit_user_message(conn, &user_id, &conversation.id, &new.content, day_start, stamp)
            })?;
            match admission {
                Admission::Exhausted { count, limit } => {
                    debug!(%user_id, count, "message refused, daily limit reached");
                    return Ok(Json(LimitReached {
                        limit_reached: true,
                        message_count: count,
                        message_limit: limit,
                    })
                    .into_response());
                }
                Admission::Admitted { message, .. } => message,
            }
        } else {
            state.db.insert_message(&conversation.id, Sender::Ai, &new.content, stamp)?
        };

        if new.from_user {
            if let Some(draft) = extractor::extract(MemoryPolicy::Keywords, &row.content, DEFAULT_IMPORTANCE) {
                state.db.insert_memory(
                    &NewMemory {
                        user_id: &user_id,
                        conversation_id: Some(&conversation.id),
                        personality_id: Some(&conversation.personality_id),
                        source_message_id: Some(&row.id),
                        content: &draft.content,
                        importance: draft.importance,
                    },
                    stamp,
                )?;
            }
        }

        Ok((StatusCode::CREATED, Json(convert::message(row))).into_response())
    })
    .await
}
