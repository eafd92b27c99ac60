//! Row types as read from SQLite. Timestamps stay in their stored text form;
//! `companion-api` turns them into wire types.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct SubscriptionRow {
    pub id: String,
    pub user_id: String,
    pub plan: String,
    pub message_limit: Option<i64>,
    pub active: bool,
    pub start_date: String,
    pub end_date: Option<String>,
    pub updated_at: String,
}

pub struct PersonalityRow {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub image_url: String,
    pub greeting: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub personality_id: String,
    pub created_at: String,
}

#[derive(Clone, PartialEq, Debug)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct MemoryRow {
    pub id: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub personality_id: Option<String>,
    pub source_message_id: Option<String>,
    pub content: String,
    pub importance: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload for `memories`; ids and timestamps are filled in by the query.
pub struct NewMemory<'a> {
    pub user_id: &'a str,
    pub conversation_id: Option<&'a str>,
    pub personality_id: Option<&'a str>,
    pub source_message_id: Option<&'a str>,
    pub content: &'a str,
    pub importance: i64,
}

pub struct NewPersonality<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub description: &'a str,
    pub image_url: &'a str,
    pub greeting: &'a str,
}
