//! One chat turn: quota check, user message, memory extraction, canned reply.
//!
//! Quota accounting and the user-message insert share a transaction, so two
//! concurrent turns from the same user cannot both slip under the limit. The
//! steps after that are committed individually; a failure there leaves the
//! user's message in place without a reply.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{DateTime, Local, TimeZone, Utc};
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use companion_core::extractor::{self, DEFAULT_IMPORTANCE};
use companion_core::policy::{self, SubscriptionTerms};
use companion_core::responder::{self, REFERENCE_POOL};
use companion_db::models::{ConversationRow, MessageRow, NewMemory, PersonalityRow};
use companion_db::{Connection, Database, queries};
use companion_types::api::{ChatReply, ChatRequest, ChatResponse, Claims, LimitReached};
use companion_types::models::{MemoryPolicy, Plan, Sender};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, convert};

/// A validated `POST /chat` body.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub user_id: String,
    pub personality_id: String,
    pub message: String,
}

impl TryFrom<ChatRequest> for ChatTurn {
    type Error = ApiError;

    fn try_from(req: ChatRequest) -> Result<Self, Self::Error> {
        let present = |field: Option<String>| field.filter(|v| !v.trim().is_empty());
        match (present(req.user_id), present(req.personality_id), present(req.message)) {
            (Some(user_id), Some(personality_id), Some(message)) => Ok(Self {
                user_id,
                personality_id,
                message,
            }),
            _ => Err(ApiError::missing_fields()),
        }
    }
}

/// Outcome of trying to record a user message against the daily quota.
pub(crate) enum Admission {
    Exhausted { count: u32, limit: Option<u32> },
    Admitted { message: MessageRow, count: u32, limit: Option<u32> },
}

/// Count today's user messages for `user_id`, compare against their plan and,
/// if there is room, insert the message. Must run inside a transaction.
pub(crate) fn admit_user_message(
    conn: &Connection,
    user_id: &str,
    conversation_id: &str,
    content: &str,
    day_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<Admission> {
    let terms = queries::query_subscription(conn, user_id)?
        .map(|row| -> anyhow::Result<SubscriptionTerms> {
            Ok(SubscriptionTerms {
                plan: row.plan.parse::<Plan>()?,
                active: row.active,
            })
        })
        .transpose()?;
    let limit = policy::daily_quota(terms.as_ref());
    let count = queries::count_user_messages_since(conn, user_id, day_start)?;

    if policy::is_limit_reached(count, limit) {
        return Ok(Admission::Exhausted { count, limit });
    }

    let message = queries::insert_message(conn, conversation_id, Sender::User, content, now)?;
    Ok(Admission::Admitted { message, count, limit })
}

enum Opening {
    UnknownUser,
    UnknownPersonality,
    Exhausted { count: u32, limit: Option<u32> },
    Admitted {
        conversation: ConversationRow,
        personality: PersonalityRow,
        message: MessageRow,
        count: u32,
        limit: Option<u32>,
    },
}

/// Run a full chat turn. `now` supplies both the message timestamps and the
/// timezone whose midnight resets the daily count.
pub fn run_turn<Tz, R>(
    db: &Database,
    memory_policy: MemoryPolicy,
    turn: &ChatTurn,
    now: DateTime<Tz>,
    rng: &mut R,
) -> Result<ChatResponse, ApiError>
where
    Tz: TimeZone,
    R: Rng + ?Sized,
{
    let day_start = policy::start_of_day(&now);
    let stamp = now.with_timezone(&Utc);

    let opening = db.with_tx(|conn| {
        if queries::query_user_by_id(conn, &turn.user_id)?.is_none() {
            return Ok(Opening::UnknownUser);
        }
        let Some(personality) = queries::query_personality(conn, &turn.personality_id)? else {
            return Ok(Opening::UnknownPersonality);
        };
        let (conversation, created) =
            queries::find_or_create_conversation(conn, &turn.user_id, &personality.id, stamp)?;
        if created {
            debug!(conversation_id = %conversation.id, "conversation started");
        }

        Ok(
            match admit_user_message(conn, &turn.user_id, &conversation.id, &turn.message, day_start, stamp)? {
                Admission::Exhausted { count, limit } => Opening::Exhausted { count, limit },
                Admission::Admitted { message, count, limit } => Opening::Admitted {
                    conversation,
                    personality,
                    message,
                    count,
                    limit,
                },
            },
        )
    })?;

    let (conversation, personality, user_message, count, limit) = match opening {
        Opening::UnknownUser => return Err(ApiError::not_found("User not found")),
        Opening::UnknownPersonality => return Err(ApiError::not_found("Personality not found")),
        Opening::Exhausted { count, limit } => {
            info!(user_id = %turn.user_id, count, ?limit, "daily message limit reached");
            return Ok(ChatResponse::LimitReached(LimitReached {
                limit_reached: true,
                message_count: count,
                message_limit: limit,
            }));
        }
        Opening::Admitted {
            conversation,
            personality,
            message,
            count,
            limit,
        } => (conversation, personality, message, count, limit),
    };

    if let Some(draft) = extractor::extract(memory_policy, &user_message.content, DEFAULT_IMPORTANCE) {
        db.insert_memory(
            &NewMemory {
                user_id: &turn.user_id,
                conversation_id: Some(&conversation.id),
                personality_id: Some(&personality.id),
                source_message_id: Some(&user_message.id),
                content: &draft.content,
                importance: draft.importance,
            },
            stamp,
        )?;
    }

    let memories = db.top_memories(&turn.user_id, REFERENCE_POOL as u32)?;
    let ranked: Vec<&str> = memories.iter().map(|m| m.content.as_str()).collect();
    let reply = responder::compose_reply(rng, &personality.kind, &ranked);
    let ai_message = db.insert_message(&conversation.id, Sender::Ai, &reply, stamp)?;

    Ok(ChatResponse::Reply(ChatReply {
        user_message: convert::message(user_message),
        ai_message: convert::message(ai_message),
        message_count: count + 1,
        message_limit: limit,
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = body?;
    let turn = ChatTurn::try_from(req)?;

    // Chatting on someone else's behalf looks the same as an unknown user.
    if turn.user_id.parse::<Uuid>().ok() != Some(claims.sub) {
        return Err(ApiError::not_found("User not found"));
    }

    let response = blocking(move || {
        let mut rng = rand::rng();
        run_turn(&state.db, state.settings.chat_memory_policy, &turn, Local::now(), &mut rng)
    })
    .await?;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use companion_core::responder::SUPPORTIVE_REPLY;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const SUPPORTIVE: &str = "00000000-0000-0000-0000-000000000001";

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let user = db.register_user("Sam", "sam@example.com", "hash", noon()).unwrap();
        (db, user.id)
    }

    fn turn(user_id: &str, message: &str) -> ChatTurn {
        ChatTurn {
            user_id: user_id.to_string(),
            personality_id: SUPPORTIVE.to_string(),
            message: message.to_string(),
        }
    }

    fn send(db: &Database, user_id: &str, message: &str, at: DateTime<Utc>) -> ChatResponse {
        let mut rng = StdRng::seed_from_u64(3);
        run_turn(db, MemoryPolicy::Keywords, &turn(user_id, message), at, &mut rng).unwrap()
    }

    #[test]
    fn validation_rejects_blank_fields() {
        let req = ChatRequest {
            user_id: Some("u".into()),
            personality_id: Some("p".into()),
            message: Some("   ".into()),
        };
        assert!(matches!(ChatTurn::try_from(req), Err(ApiError::Validation(_))));
        assert!(ChatTurn::try_from(ChatRequest::default()).is_err());
    }

    #[test]
    fn turn_persists_both_messages_in_one_conversation() {
        let (db, user_id) = setup();

        let ChatResponse::Reply(reply) = send(&db, &user_id, "hello", noon()) else {
            panic!("expected a reply");
        };

        assert_eq!(reply.user_message.conversation_id, reply.ai_message.conversation_id);
        assert_eq!(reply.user_message.sender, Sender::User);
        assert_eq!(reply.ai_message.sender, Sender::Ai);
        assert_eq!(reply.ai_message.content, SUPPORTIVE_REPLY);
        assert_eq!(reply.message_count, 1);
        assert_eq!(reply.message_limit, Some(15));

        let stored = db.get_messages(&reply.ai_message.conversation_id, None).unwrap();
        let ids: Vec<&str> = stored.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, [reply.user_message.id.as_str(), reply.ai_message.id.as_str()]);
    }

    #[test]
    fn keyword_message_creates_exactly_one_memory() {
        let (db, user_id) = setup();

        let ChatResponse::Reply(reply) = send(&db, &user_id, "I love jazz and I hate rain", noon()) else {
            panic!("expected a reply");
        };
        send(&db, &user_id, "ok", noon());

        let memories = db.memories_for_character(&user_id, SUPPORTIVE).unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].importance, DEFAULT_IMPORTANCE);
        assert_eq!(memories[0].source_message_id.as_deref(), Some(reply.user_message.id.as_str()));
        assert_eq!(memories[0].conversation_id.as_deref(), Some(reply.user_message.conversation_id.as_str()));
    }

    #[test]
    fn sixteenth_free_message_is_refused_without_writing() {
        let (db, user_id) = setup();
        for i in 0..14 {
            send(&db, &user_id, &format!("message {i}"), noon());
        }

        let ChatResponse::Reply(fifteenth) = send(&db, &user_id, "one more", noon()) else {
            panic!("the 15th message of the day should still be allowed");
        };
        assert_eq!(fifteenth.message_count, 15);
        let conversation_id = fifteenth.user_message.conversation_id.clone();

        let ChatResponse::LimitReached(limit) = send(&db, &user_id, "too many", noon()) else {
            panic!("expected the limit to be reached");
        };
        assert!(limit.limit_reached);
        assert_eq!(limit.message_count, 15);
        assert_eq!(limit.message_limit, Some(15));
        assert_eq!(db.get_messages(&conversation_id, None).unwrap().len(), 30);
    }

    #[test]
    fn quota_resets_at_midnight() {
        let (db, user_id) = setup();
        let yesterday = noon() - Duration::days(1);
        for _ in 0..15 {
            send(&db, &user_id, "hi", yesterday);
        }
        assert!(matches!(send(&db, &user_id, "hi", yesterday), ChatResponse::LimitReached(_)));
        assert!(matches!(send(&db, &user_id, "hi", noon()), ChatResponse::Reply(_)));
    }

    #[test]
    fn basic_plan_allows_one_hundred_fifty() {
        let (db, user_id) = setup();
        db.upsert_subscription(&user_id, Plan::Basic, noon()).unwrap();
        for _ in 0..150 {
            assert!(matches!(send(&db, &user_id, "hi", noon()), ChatResponse::Reply(_)));
        }
        let ChatResponse::LimitReached(limit) = send(&db, &user_id, "hi", noon()) else {
            panic!("expected the basic limit to apply");
        };
        assert_eq!(limit.message_limit, Some(150));
    }

    #[test]
    fn premium_plan_is_unbounded() {
        let (db, user_id) = setup();
        db.upsert_subscription(&user_id, Plan::Premium, noon()).unwrap();
        for _ in 0..200 {
            let ChatResponse::Reply(reply) = send(&db, &user_id, "hi", noon()) else {
                panic!("premium should never hit a limit");
            };
            assert_eq!(reply.message_limit, None);
        }
    }

    #[test]
    fn unknown_personality_is_not_found_and_writes_nothing() {
        let (db, user_id) = setup();
        let mut bad = turn(&user_id, "hello");
        bad.personality_id = "missing".into();
        let mut rng = StdRng::seed_from_u64(1);

        let err = run_turn(&db, MemoryPolicy::Heuristic, &bad, noon(), &mut rng).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(db.list_conversations(&user_id).unwrap().is_empty());
    }

    #[test]
    fn unknown_user_is_not_found() {
        let (db, _) = setup();
        let mut rng = StdRng::seed_from_u64(1);
        let err = run_turn(&db, MemoryPolicy::Heuristic, &turn("ghost", "hi"), noon(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
