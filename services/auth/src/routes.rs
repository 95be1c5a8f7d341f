//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    AppState,
    jwt::{Claims, TokenType},
    middleware::{auth_middleware, bearer_token},
    models::{
        LoginRequest, RefreshTokenRequest, RegisterRequest, TokenResponse, User, normalize_email,
    },
    validation::{validate_email, validate_name, validate_password},
};

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .merge(protected)
        .with_state(state)
}

/// Check every registration field, reporting the first problem
pub fn validate_registration(request: &RegisterRequest) -> Result<(), AuthError> {
    validate_name(&request.name)
        .and_then(|_| validate_email(&normalize_email(&request.email)))
        .and_then(|_| validate_password(&request.password))
        .map_err(AuthError::BadRequest)
}

fn internal(context: &'static str) -> impl Fn(anyhow::Error) -> AuthError {
    move |e| {
        error!("{}: {}", context, e);
        AuthError::InternalServerError
    }
}

fn invalid_credentials() -> AuthError {
    AuthError::Unauthorized("Invalid email or password".to_string())
}

fn invalid_refresh_token() -> AuthError {
    AuthError::Unauthorized("Invalid refresh token".to_string())
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);
    let redis = state.sessions.health_check().await.unwrap_or(false);

    let status = if database && redis {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "service": "auth-service",
            "database": database,
            "redis": redis,
        })),
    )
}

/// Register a client account; it stays unusable until an admin approves it
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate_registration(&payload)?;

    let user = state
        .user_repository
        .create(&payload)
        .await
        .map_err(internal("Failed to create user"))?
        .ok_or_else(|| AuthError::Conflict("Email already registered".to_string()))?;

    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Registration successful, awaiting approval",
            "user": user,
        })),
    ))
}

async fn issue_tokens(state: &AppState, user: User) -> Result<TokenResponse, AuthError> {
    let access_token = state
        .jwt_service
        .generate_access_token(&user)
        .map_err(internal("Failed to generate access token"))?;

    let refresh_token = state
        .jwt_service
        .generate_refresh_token(&user)
        .map_err(internal("Failed to generate refresh token"))?;

    state
        .sessions
        .store(user.id, &refresh_token)
        .await
        .map_err(internal("Failed to store session in Redis"))?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
        user,
    })
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = normalize_email(&payload.email);
    info!("Login attempt for: {}", email);

    if !state.rate_limiter.check(&email).await {
        return Err(AuthError::TooManyRequests(
            "Too many failed login attempts, try again later".to_string(),
        ));
    }

    let user = state
        .user_repository
        .find_by_email(&email)
        .await
        .map_err(internal("Failed to look up user"))?;

    let Some(user) = user else {
        state.rate_limiter.record_failure(&email).await;
        return Err(invalid_credentials());
    };

    let matches = state
        .user_repository
        .verify_password(&user, &payload.password)
        .map_err(internal("Failed to verify password"))?;

    if !matches {
        state.rate_limiter.record_failure(&email).await;
        return Err(invalid_credentials());
    }

    state.rate_limiter.reset(&email).await;

    if !user.approved {
        return Err(AuthError::Forbidden(
            "Account pending admin approval".to_string(),
        ));
    }

    let response = issue_tokens(&state, user).await?;

    Ok((StatusCode::OK, Json(response)))
}

async fn refresh_claims(state: &AppState, token: &str) -> Result<Claims, AuthError> {
    let claims = state
        .jwt_service
        .validate_token(token)
        .map_err(|_| invalid_refresh_token())?;

    if claims.token_type != TokenType::Refresh {
        return Err(invalid_refresh_token());
    }

    let is_blacklisted = state
        .jwt_service
        .is_token_blacklisted(state.sessions.redis(), token)
        .await
        .map_err(internal("Failed to check if token is blacklisted"))?;

    if is_blacklisted {
        return Err(invalid_refresh_token());
    }

    Ok(claims)
}

/// Exchange a refresh token for a new token pair
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = refresh_claims(&state, &payload.refresh_token).await?;

    let current = state
        .sessions
        .is_current(claims.sub, &payload.refresh_token)
        .await
        .map_err(internal("Failed to read session"))?;

    if !current {
        warn!("Stale refresh token presented for user {}", claims.sub);
        return Err(invalid_refresh_token());
    }

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await
        .map_err(internal("Failed to look up user"))?
        .ok_or_else(invalid_refresh_token)?;

    if !user.approved {
        return Err(AuthError::Forbidden(
            "Account pending admin approval".to_string(),
        ));
    }

    let access_token = state
        .jwt_service
        .generate_access_token(&user)
        .map_err(internal("Failed to generate access token"))?;

    let refresh_token = state
        .jwt_service
        .rotate_refresh_token(state.sessions.redis(), &user, &payload.refresh_token)
        .await
        .map_err(internal("Failed to rotate refresh token"))?;

    state
        .sessions
        .store(user.id, &refresh_token)
        .await
        .map_err(internal("Failed to update session in Redis"))?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: state.jwt_service.access_token_expiry(),
            user,
        }),
    ))
}

/// Revoke the refresh token, and the access token when one is presented
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = refresh_claims(&state, &payload.refresh_token).await?;

    state
        .jwt_service
        .revoke(state.sessions.redis(), &payload.refresh_token, &claims)
        .await
        .map_err(internal("Failed to blacklist token"))?;

    let access_token = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(bearer_token);

    if let Some(token) = access_token {
        if let Ok(access_claims) = state.jwt_service.validate_token(token) {
            if access_claims.sub == claims.sub {
                state
                    .jwt_service
                    .revoke(state.sessions.redis(), token, &access_claims)
                    .await
                    .map_err(internal("Failed to blacklist token"))?;
            }
        }
    }

    state
        .sessions
        .delete(claims.sub)
        .await
        .map_err(internal("Failed to remove session from Redis"))?;

    info!("User {} logged out", claims.sub);

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Logged out successfully"})),
    ))
}

/// Profile of the signed-in user
pub async fn me(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state
        .user_repository
        .find_by_id(user_id)
        .await
        .map_err(internal("Failed to look up user"))?
        .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Custom error type for authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("Internal server error")]
    InternalServerError,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_registration_validation() {
        assert!(
            validate_registration(&registration("Ana", "Ana@Example.com", "Stretch123")).is_ok()
        );

        let err = validate_registration(&registration("A", "ana@example.com", "Stretch123"))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        assert!(validate_registration(&registration("Ana", "nope", "Stretch123")).is_err());
        assert!(validate_registration(&registration("Ana", "ana@example.com", "weak")).is_err());
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            AuthError::Conflict("taken".to_string()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::Forbidden("pending".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::TooManyRequests("slow down".to_string()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::InternalServerError.to_string(),
            "Internal server error"
        );
    }
}
