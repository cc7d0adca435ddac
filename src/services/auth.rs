//! Authentication: password hashing, access tokens and revocation
//!
//! Provides:
//! - Password hashing with bcrypt
//! - HS256 JWT issue and validation
//! - Token revocation by hashed `jti`
//! - Resolution of a bearer token into an [Actor]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{Database, MembershipType, Role, UserRecord};

use super::{Actor, ServiceError, ServiceResult};

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,
    /// Username
    pub username: String,
    /// User role (admin, member)
    pub role: String,
    /// Membership tier at issue time
    pub membership: String,
    /// Unique token ID (for revocation)
    pub jti: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// A signed token and when it stops being valid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Auth service configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub token_lifetime_secs: i64,
    /// Bcrypt cost factor
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            token_lifetime_secs: config.token_lifetime_secs,
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    /// Cheap hashing for tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            jwt_secret: "test-secret".to_string(),
            token_lifetime_secs: 3600,
            bcrypt_cost: 4,
        }
    }
}

/// Random URL-safe secret, used when no `JWT_SECRET` is configured
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// ============================================================================
// Auth Service
// ============================================================================

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: Database, config: AuthConfig) -> Self {
        Self { db, config }
    }

    /// Hash a password with bcrypt
    pub fn hash_password(&self, password: &str) -> ServiceResult<String> {
        hash(password, self.config.bcrypt_cost)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))
    }

    /// Verify a password against a hash
    pub fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        verify(password, password_hash).unwrap_or(false)
    }

    /// Sign an access token for the user
    pub fn issue_token(&self, user: &UserRecord) -> ServiceResult<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.token_lifetime_secs);

        let claims = AccessTokenClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role.as_str().to_string(),
            membership: user.membership_type.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to create access token: {}", e)))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Check signature and expiry; does not consult the revocation list
    pub fn decode_token(&self, token: &str) -> ServiceResult<AccessTokenClaims> {
        let data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| ServiceError::unauthorized(format!("Invalid token: {}", e)))?;

        Ok(data.claims)
    }

    /// Resolve a bearer token into the acting user
    pub async fn authenticate(&self, token: &str) -> ServiceResult<Actor> {
        let claims = self.decode_token(token)?;

        let users = self.db.users();
        if users.is_token_revoked(&hash_jti(&claims.jti)).await? {
            return Err(ServiceError::unauthorized("Token has been revoked"));
        }

        let user = users
            .get_by_id(&claims.sub)
            .await?
            .ok_or_else(|| ServiceError::unauthorized("User no longer exists"))?;

        if !user.is_active {
            return Err(ServiceError::forbidden("Account is not active"));
        }

        self.actor_for(&user).await
    }

    /// Build the actor for a loaded user
    pub async fn actor_for(&self, user: &UserRecord) -> ServiceResult<Actor> {
        let in_staff_group = self
            .db
            .users()
            .is_in_group(&user.id, MembershipType::Staff.group_name())
            .await?;

        Ok(Actor {
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            membership_type: user.membership_type,
            is_staff: user.role == Role::Admin || (user.is_active && in_staff_group),
        })
    }

    /// Revoke a token until its natural expiry. Returns the owning user id.
    pub async fn revoke(&self, token: &str) -> ServiceResult<String> {
        let claims = self.decode_token(token)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now);

        self.db
            .users()
            .revoke_token(&hash_jti(&claims.jti), &claims.sub, expires_at)
            .await?;

        tracing::info!(user_id = %claims.sub, "Access token revoked");
        Ok(claims.sub)
    }

    /// Drop revocation rows for tokens that have expired anyway
    pub async fn cleanup_revoked(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        Ok(self.db.users().cleanup_revoked_tokens(now).await?)
    }
}

/// Hash a token id for storage (using SHA-256)
fn hash_jti(jti: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(jti.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CreateUser;
    use assert_matches::assert_matches;

    async fn setup() -> (AuthService, UserRecord) {
        let db = Database::connect_in_memory().await.unwrap();
        let auth = AuthService::new(db.clone(), AuthConfig::for_tests());
        let user = db
            .users()
            .create(CreateUser {
                username: "ada".into(),
                email: "ada@uni.edu".into(),
                password_hash: auth.hash_password("correct horse").unwrap(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                membership_type: MembershipType::Student,
                department: "Maths".into(),
                student_id: Some("S-1".into()),
                faculty_id: None,
                staff_id: None,
                phone: String::new(),
                role: Role::Member,
                is_staff_approved: false,
                email_verified: false,
                is_active: true,
            })
            .await
            .unwrap();
        (auth, user)
    }

    #[test]
    fn test_generated_secrets_differ() {
        let a = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_secret());
    }

    #[tokio::test]
    async fn test_password_round_trip() {
        let (auth, user) = setup().await;
        assert!(auth.verify_password("correct horse", &user.password_hash));
        assert!(!auth.verify_password("wrong", &user.password_hash));
    }

    #[tokio::test]
    async fn test_token_authenticates_until_revoked() {
        let (auth, user) = setup().await;
        let issued = auth.issue_token(&user).unwrap();

        let actor = auth.authenticate(&issued.token).await.unwrap();
        assert_eq!(actor.user_id, user.id);
        assert!(!actor.is_staff);

        auth.revoke(&issued.token).await.unwrap();
        assert_matches!(
            auth.authenticate(&issued.token).await,
            Err(ServiceError::Unauthorized(_))
        );

        // A fresh token for the same user still works
        let fresh = auth.issue_token(&user).unwrap();
        assert!(auth.authenticate(&fresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_is_rejected() {
        let (auth, user) = setup().await;
        let other = AuthService::new(
            auth.db.clone(),
            AuthConfig {
                jwt_secret: "another".into(),
                ..AuthConfig::for_tests()
            },
        );
        let token = other.issue_token(&user).unwrap().token;
        assert_matches!(auth.decode_token(&token), Err(ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_authenticate() {
        let (auth, user) = setup().await;
        let token = auth.issue_token(&user).unwrap().token;
        auth.db.users().set_active(&user.id, false).await.unwrap();
        assert_matches!(
            auth.authenticate(&token).await,
            Err(ServiceError::Forbidden(_))
        );
    }
}
