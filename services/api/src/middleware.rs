//! Authentication middleware for JWT token validation

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::cache::{RedisPool, revoked_token_key};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::{env, sync::Arc};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{engine::Actor, error::ApiError};

/// Role claim that unlocks the admin routes
pub const ADMIN_ROLE: &str = "admin";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// User roles
    pub roles: Vec<String>,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ADMIN_ROLE)
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            is_admin: self.is_admin(),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Public key for verifying tokens
    pub public_key: String,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// `JWT_PUBLIC_KEY` holds either the PEM itself or a path to it.
    pub fn from_env() -> Result<Self, String> {
        let public_key = env::var("JWT_PUBLIC_KEY")
            .map_err(|_| "JWT_PUBLIC_KEY environment variable not set".to_string())?;

        // If the public key looks like a file path, read from file (try CWD, then project root)
        let public_key = if public_key.starts_with("-----BEGIN") {
            public_key
        } else {
            std::fs::read_to_string(&public_key)
                .or_else(|_| {
                    let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
                    path.push(&public_key);
                    std::fs::read_to_string(path)
                })
                .map_err(|e| format!("Failed to read public key file: {}", e))?
                .trim()
                .to_string()
        };

        Ok(JwtConfig { public_key })
    }
}

/// Verifies access tokens issued by the auth service
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
    revocations: Option<RedisPool>,
}

impl JwtVerifier {
    pub fn new(config: &JwtConfig) -> Result<Self, jsonwebtoken::errors::Error> {
        let decoding_key = DecodingKey::from_rsa_pem(config.public_key.as_bytes())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        Ok(Self {
            decoding_key: Arc::new(decoding_key),
            validation,
            revocations: None,
        })
    }

    /// Also reject tokens the auth service revoked at logout
    pub fn with_revocations(mut self, redis: RedisPool) -> Self {
        self.revocations = Some(redis);
        self
    }

    /// Whether `token` was revoked; always `false` without a revocation store
    pub async fn is_revoked(&self, token: &str) -> Result<bool, ApiError> {
        let Some(redis) = &self.revocations else {
            return Ok(false);
        };

        let revoked = redis.get(&revoked_token_key(token)).await.map_err(|e| {
            error!("Failed to check token revocation: {}", e);
            ApiError::InternalServerError
        })?;

        Ok(revoked.is_some())
    }

    /// Decode an access token into the user it was issued for
    pub fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Rejected token: {}", e);
                ApiError::Unauthorized
            })?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized);
        }

        Ok(AuthUser {
            id: token_data.claims.sub,
            roles: token_data.claims.roles,
        })
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(verifier): State<JwtVerifier>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;

    let user = verifier.verify(bearer.token())?;

    if verifier.is_revoked(bearer.token()).await? {
        debug!("Rejected revoked token for user {}", user.id);
        return Err(ApiError::Unauthorized);
    }

    // Insert the user into the request extensions
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Reject requests whose user is not an admin; runs after `auth_middleware`
pub async fn require_admin(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user = req.extensions().get::<AuthUser>().ok_or_else(|| {
        error!("Admin check ran without an authenticated user");
        ApiError::Unauthorized
    })?;

    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}
