//! JWT service for token generation, validation, and management
//!
//! Tokens are signed with RS256. The access token carries the account role,
//! which the booking API reads to tell admins from clients. Refresh tokens are
//! rotated on use and the old one is blacklisted in Redis until it would have
//! expired anyway.

use anyhow::Result;
use common::cache::{RedisPool, revoked_token_key};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::models::User;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Private key for signing tokens
    pub private_key: String,
    /// Public key for verifying tokens
    pub public_key: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PRIVATE_KEY`: PEM private key, or path to a PEM file
    /// - `JWT_PUBLIC_KEY`: PEM public key, or path to a PEM file
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    pub fn from_env() -> Result<Self> {
        let private_key = read_key("JWT_PRIVATE_KEY")?;
        let public_key = read_key("JWT_PUBLIC_KEY")?;

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(900);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(604_800);

        Ok(JwtConfig {
            private_key,
            public_key,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

fn read_key(var: &str) -> Result<String> {
    let value =
        std::env::var(var).map_err(|_| anyhow::anyhow!("{} environment variable not set", var))?;

    if value.starts_with("-----BEGIN") {
        return Ok(value);
    }

    let contents = std::fs::read_to_string(&value)
        .map_err(|e| anyhow::anyhow!("Failed to read key file {}: {}", value, e))?;
    Ok(contents.trim().to_string())
}

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
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

fn now_seconds() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())?;
        let decoding_key = DecodingKey::from_rsa_pem(config.public_key.as_bytes())?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        Ok(JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        })
    }

    fn sign(&self, user_id: Uuid, roles: Vec<String>, token_type: TokenType) -> Result<String> {
        let now = now_seconds()?;
        let ttl = match token_type {
            TokenType::Access => self.config.access_token_expiry,
            TokenType::Refresh => self.config.refresh_token_expiry,
        };

        let claims = Claims {
            sub: user_id,
            roles,
            iat: now,
            exp: now + ttl,
            token_type,
        };

        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Generate an access token carrying the user's role
    pub fn generate_access_token(&self, user: &User) -> Result<String> {
        self.sign(user.id, vec![user.role.clone()], TokenType::Access)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user: &User) -> Result<String> {
        self.sign(user.id, vec![], TokenType::Refresh)
    }

    /// Validate a token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Check if a token is blacklisted in Redis
    pub async fn is_token_blacklisted(&self, redis_pool: &RedisPool, token: &str) -> Result<bool> {
        let key = revoked_token_key(token);
        Ok(redis_pool.get(&key).await?.is_some())
    }

    /// Blacklist a token in Redis for `expiry` seconds
    pub async fn blacklist_token(
        &self,
        redis_pool: &RedisPool,
        token: &str,
        expiry: u64,
    ) -> Result<()> {
        let key = revoked_token_key(token);
        redis_pool.set(&key, "1", Some(expiry.max(1))).await
    }

    /// Blacklist a token until its own expiry
    pub async fn revoke(&self, redis_pool: &RedisPool, token: &str, claims: &Claims) -> Result<()> {
        let remaining = claims.exp.saturating_sub(now_seconds()?);
        self.blacklist_token(redis_pool, token, remaining).await
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    /// Get the refresh token expiry time
    pub fn refresh_token_expiry(&self) -> u64 {
        self.config.refresh_token_expiry
    }

    /// Rotate a refresh token
    ///
    /// Blacklists the old refresh token and generates a new one
    pub async fn rotate_refresh_token(
        &self,
        redis_pool: &RedisPool,
        user: &User,
        old_refresh_token: &str,
    ) -> Result<String> {
        let claims = self.validate_token(old_refresh_token)?;

        if claims.token_type != TokenType::Refresh {
            return Err(anyhow::anyhow!("Token is not a refresh token"));
        }

        if claims.sub != user.id {
            return Err(anyhow::anyhow!("Token does not belong to user"));
        }

        self.revoke(redis_pool, old_refresh_token, &claims).await?;

        self.generate_refresh_token(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const PRIVATE_KEY: &str = include_str!("../../../fixtures/jwt/test_private.pem");
    const PUBLIC_KEY: &str = include_str!("../../../fixtures/jwt/test_public.pem");

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            private_key: PRIVATE_KEY.to_string(),
            public_key: PUBLIC_KEY.to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 3600,
        })
        .unwrap()
    }

    fn user(role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            approved: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_token_carries_role() {
        let service = service();
        let admin = user("admin");

        let token = service.generate_access_token(&admin).unwrap();
        let claims = service.validate_token(&token).unwrap();

        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.roles, vec!["admin".to_string()]);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_refresh_token_has_no_roles() {
        let service = service();
        let token = service.generate_refresh_token(&user("user")).unwrap();
        let claims = service.validate_token(&token).unwrap();

        assert!(claims.roles.is_empty());
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let service = service();
        let token = service.generate_access_token(&user("user")).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');

        assert!(service.validate_token(&tampered).is_err());
        assert!(service.validate_token("not-a-token").is_err());
    }
}
