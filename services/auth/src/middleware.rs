//! Middleware for JWT token validation and authentication

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::{AppState, jwt::TokenType, routes::AuthError};

/// Token part of a `Bearer` authorization header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Validate the access token and put the user id into request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| AuthError::Unauthorized("Missing bearer token".to_string()))?
        .to_string();

    let claims = state
        .jwt_service
        .validate_token(&token)
        .map_err(|_| AuthError::Unauthorized("Invalid token".to_string()))?;

    if claims.token_type != TokenType::Access {
        return Err(AuthError::Unauthorized("Invalid token".to_string()));
    }

    let is_blacklisted = state
        .jwt_service
        .is_token_blacklisted(state.sessions.redis(), &token)
        .await
        .map_err(|e| {
            error!("Failed to check if token is blacklisted: {}", e);
            AuthError::InternalServerError
        })?;

    if is_blacklisted {
        return Err(AuthError::Unauthorized("Token revoked".to_string()));
    }

    req.extensions_mut().insert(claims.sub);

    Ok(next.run(req).await)
}
