//! Row → wire conversions. Stored values that fail to parse are logged and
//! replaced with defaults rather than failing the whole response.

use chrono::{DateTime, Utc};
use tracing::warn;

use companion_db::decode_timestamp;
use companion_db::models::{ConversationRow, MemoryRow, MessageRow, PersonalityRow, SubscriptionRow};
use companion_types::api::{
    ConversationResponse, MemoryResponse, MessageResponse, PersonalityResponse, SubscriptionResponse,
};
use companion_types::models::{Plan, Sender};

fn timestamp(raw: &str, field: &str, id: &str) -> DateTime<Utc> {
    decode_timestamp(raw).unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on '{}': {}", field, raw, id, e);
        DateTime::default()
    })
}

pub fn message(row: MessageRow) -> MessageResponse {
    let sender = row.sender.parse::<Sender>().unwrap_or_else(|e| {
        warn!("Corrupt sender on message '{}': {}", row.id, e);
        Sender::Ai
    });
    MessageResponse {
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        id: row.id,
        conversation_id: row.conversation_id,
        is_user_message: sender == Sender::User,
        sender,
        content: row.content,
    }
}

pub fn personality(row: PersonalityRow) -> PersonalityResponse {
    PersonalityResponse {
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        id: row.id,
        name: row.name,
        kind: row.kind,
        description: row.description,
        image_url: row.image_url,
        greeting: row.greeting,
    }
}

pub fn conversation(
    row: ConversationRow,
    personality: Option<PersonalityRow>,
    messages: Vec<MessageRow>,
) -> ConversationResponse {
    ConversationResponse {
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        id: row.id,
        user_id: row.user_id,
        personality_id: row.personality_id,
        personality: personality.map(self::personality),
        messages: messages.into_iter().map(message).collect(),
    }
}

pub fn memory(row: MemoryRow) -> MemoryResponse {
    MemoryResponse {
        created_at: timestamp(&row.created_at, "created_at", &row.id),
        updated_at: timestamp(&row.updated_at, "updated_at", &row.id),
        id: row.id,
        user_id: row.user_id,
        conversation_id: row.conversation_id,
        character_id: row.personality_id,
        source_message_id: row.source_message_id,
        content: row.content,
        importance: row.importance,
    }
}

pub fn subscription(row: SubscriptionRow) -> SubscriptionResponse {
    let plan = row.plan.parse::<Plan>().unwrap_or_else(|e| {
        warn!("Corrupt plan on subscription '{}': {}", row.id, e);
        Plan::Free
    });
    SubscriptionResponse {
        start_date: timestamp(&row.start_date, "start_date", &row.id),
        end_date: row
            .end_date
            .as_deref()
            .map(|raw| timestamp(raw, "end_date", &row.id)),
        updated_at: timestamp(&row.updated_at, "updated_at", &row.id),
        id: row.id,
        user_id: row.user_id,
        plan,
        message_limit: row.message_limit.and_then(|limit| u32::try_from(limit).ok()),
        active: row.active,
    }
}
