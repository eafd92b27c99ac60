use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Plan, Sender};

// -- JWT Claims --

/// Bearer token claims. `sub` is the user id; tokens may come from the hosted
/// identity provider or from the local `/auth` routes, both signed with the
/// shared secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: String,
    pub exp: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub subscription: Option<SubscriptionResponse>,
}

// -- Chat --

/// Body of `POST /chat`. Every field is optional on the wire so that a missing
/// field is reported as a validation error rather than a parse failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub personality_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Reply(ChatReply),
    LimitReached(LimitReached),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub user_message: MessageResponse,
    pub ai_message: MessageResponse,
    pub message_count: u32,
    pub message_limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitReached {
    pub limit_reached: bool,
    pub message_count: u32,
    pub message_limit: Option<u32>,
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub is_user_message: Option<bool>,
    pub girlfriend_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender: Sender,
    pub is_user_message: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// -- Conversations --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub girlfriend_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: String,
    pub user_id: String,
    pub personality_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<PersonalityResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageResponse>,
}

// -- Personalities --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonalityRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub greeting: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub image_url: String,
    pub greeting: String,
    pub created_at: DateTime<Utc>,
}

// -- Memories --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryQuery {
    pub user_id: Option<String>,
    pub character_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryIdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemoryRequest {
    pub user_id: Option<String>,
    pub character_id: Option<String>,
    pub content: Option<String>,
    pub importance: Option<i64>,
}

/// Body of `POST /memories`: a memory pinned to one conversation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationMemoryRequest {
    pub content: Option<String>,
    pub importance: Option<i64>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemoryRequest {
    pub id: Option<String>,
    pub content: Option<String>,
    pub importance: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryResponse {
    pub id: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub character_id: Option<String>,
    pub source_message_id: Option<String>,
    pub content: String,
    pub importance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MemoryList {
    pub memories: Vec<MemoryResponse>,
}

#[derive(Debug, Serialize)]
pub struct MemoryEnvelope {
    pub memory: MemoryResponse,
}

// -- Subscriptions --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSubscriptionRequest {
    pub user_id: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSubscriptionRequest {
    pub user_id: Option<String>,
    pub active: Option<bool>,
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub user_id: String,
    pub plan: Plan,
    pub message_limit: Option<u32>,
    pub active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// -- Health --

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}
