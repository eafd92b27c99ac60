pub mod auth;
pub mod chat;
pub mod conversations;
pub mod convert;
pub mod error;
pub mod health;
pub mod memories;
pub mod messages;
pub mod middleware;
pub mod personalities;
pub mod subscriptions;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tracing::error;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::require_auth;

/// Every route the service exposes. Transport layers (CORS, tracing) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    let auth_layer = axum_middleware::from_fn_with_state(state.clone(), require_auth);

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route(
            "/personalities",
            get(personalities::list_personalities)
                .merge(post(personalities::create_personality).route_layer(auth_layer.clone())),
        )
        .route("/personalities/{id}", get(personalities::get_personality))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(auth::me))
        .route("/chat", post(chat::chat))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/messages", get(messages::get_messages).post(messages::send_message))
        .route(
            "/memory",
            get(memories::list_memories)
                .post(memories::create_memory)
                .put(memories::update_memory)
                .delete(memories::delete_memory),
        )
        .route(
            "/memories",
            get(memories::list_conversation_memories).post(memories::create_conversation_memory),
        )
        .route(
            "/subscription",
            get(subscriptions::get_subscription)
                .post(subscriptions::upsert_subscription)
                .put(subscriptions::upsert_subscription)
                .patch(subscriptions::patch_subscription),
        )
        .route_layer(auth_layer)
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })?
}
