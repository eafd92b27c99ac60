use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use companion_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer JWT, then expose its claims to handlers.
/// A missing header, another scheme or an unparsable value are all 401.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|rejection| {
        debug!("rejected authorization header: {}", rejection);
        ApiError::Unauthorized
    })?;
    let claims = verify_token(&state.jwt_secret, bearer.token())?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    // Hosted identity providers stamp their own audience; the signature is what we trust.
    validation.validate_aud = false;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!("rejected bearer token: {}", e);
        ApiError::Unauthorized
    })?;

    Ok(token_data.claims)
}
