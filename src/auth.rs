//! Bearer-token authentication and role checks.
//!
//! Tokens are HS256 JWTs carrying the user id and role. Every mutating
//! content route names an [`Operation`]; the operation's entry in the policy
//! table decides which roles may perform it.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::db::models::Role;
use crate::db::Database;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No token provided")]
    Unauthenticated,
    #[error("{0}")]
    InvalidCredential(&'static str),
    #[error("Access denied: insufficient role")]
    Forbidden,
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Password task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

/// The caller behind a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub role: Role,
}

/// Protected content operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateFaq,
    UpdateFaq,
    DeleteFaq,
    CreateNotice,
    UpdateNotice,
    DeleteNotice,
    CreateTimetable,
    UpdateTimetable,
    DeleteTimetable,
}

const INVALID_LOGIN: &str = "Invalid username or password";
const INVALID_TOKEN: &str = "Invalid or expired token";

/// Stands in for the stored hash of an unknown user. Default argon2id
/// parameters, so every failed login costs one derivation.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0ZHVtbXlzYWx0$xpDC+RB/aGKSq5MXm2Y/qrFUeRRNN+vFHSGL4RaUw04";

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const STAFF: &[Role] = &[Role::Admin, Role::Faculty];

impl Operation {
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Operation::CreateFaq | Operation::UpdateFaq | Operation::DeleteFaq => ADMIN_ONLY,
            Operation::CreateNotice | Operation::UpdateNotice => STAFF,
            Operation::CreateTimetable | Operation::UpdateTimetable => STAFF,
            Operation::DeleteNotice | Operation::DeleteTimetable => ADMIN_ONLY,
        }
    }
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, subject_id: &str, role: Role) -> Result<String, AuthError> {
        let iat = unix_now();
        let claims = Claims {
            sub: subject_id.to_string(),
            role,
            iat,
            exp: iat + self.ttl.as_secs(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
            debug!("Token rejected: {e}");
            AuthError::InvalidCredential(INVALID_TOKEN)
        })?;
        Ok(Identity {
            subject_id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

pub fn authorize(identity: &Identity, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        warn!(
            subject = %identity.subject_id,
            role = %identity.role,
            "Rejected request with insufficient role"
        );
        Err(AuthError::Forbidden)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {e}");
            false
        }
    }
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub role: Role,
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

pub async fn login(
    db: &Database,
    keys: &TokenKeys,
    username: &str,
    password: &str,
) -> Result<Session, AppError> {
    let lookup = username.to_string();
    let user = db.call(move |db| db.find_user(&lookup)).await?;

    let stored_hash = user
        .as_ref()
        .map_or_else(|| DUMMY_HASH.to_string(), |user| user.password_hash.clone());
    let password = password.to_string();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(AuthError::from)?;

    let user = match user {
        Some(user) if verified => user,
        _ => return Err(AuthError::InvalidCredential(INVALID_LOGIN).into()),
    };
    let token = keys.issue(&user.id, user.role)?;
    Ok(Session {
        token,
        username: user.username,
        role: user.role,
    })
}

/// Extractor that authenticates the `Authorization: Bearer` header.
pub struct AuthUser(pub Identity);

impl AuthUser {
    pub fn require(&self, operation: Operation) -> Result<&Identity, AuthError> {
        authorize(&self.0, operation.allowed_roles())?;
        Ok(&self.0)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        Ok(AuthUser(state.tokens.authenticate(token)?))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn test_issue_and_authenticate_round_trip() {
        let keys = keys();
        let token = keys.issue("user-1", Role::Faculty).unwrap();
        let identity = keys.authenticate(Some(&token)).unwrap();
        assert_eq!(
            identity,
            Identity {
                subject_id: "user-1".into(),
                role: Role::Faculty
            }
        );
    }

    #[test]
    fn test_missing_token_is_unauthenticated() {
        assert!(matches!(
            keys().authenticate(None),
            Err(AuthError::Unauthenticated)
        ));
        assert!(matches!(
            keys().authenticate(Some("  ")),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let other = TokenKeys::new("another-secret", Duration::from_secs(3600));
        let token = other.issue("user-1", Role::Admin).unwrap();
        assert!(matches!(
            keys().authenticate(Some(&token)),
            Err(AuthError::InvalidCredential(INVALID_TOKEN))
        ));
        assert!(matches!(
            keys().authenticate(Some("not.a.jwt")),
            Err(AuthError::InvalidCredential(INVALID_TOKEN))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = keys();
        let claims = Claims {
            sub: "user-1".into(),
            role: Role::Admin,
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(matches!(
            keys.authenticate(Some(&token)),
            Err(AuthError::InvalidCredential(INVALID_TOKEN))
        ));
    }

    #[test]
    fn test_policy_table() {
        let faculty = Identity {
            subject_id: "f".into(),
            role: Role::Faculty,
        };
        let student = Identity {
            subject_id: "s".into(),
            role: Role::Student,
        };
        let admin = Identity {
            subject_id: "a".into(),
            role: Role::Admin,
        };

        assert!(authorize(&faculty, Operation::CreateNotice.allowed_roles()).is_ok());
        assert!(authorize(&faculty, Operation::UpdateTimetable.allowed_roles()).is_ok());
        assert!(matches!(
            authorize(&faculty, Operation::DeleteNotice.allowed_roles()),
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(
            authorize(&faculty, Operation::CreateFaq.allowed_roles()),
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(
            authorize(&student, Operation::CreateTimetable.allowed_roles()),
            Err(AuthError::Forbidden)
        ));
        for op in [
            Operation::CreateFaq,
            Operation::DeleteFaq,
            Operation::DeleteNotice,
            Operation::DeleteTimetable,
        ] {
            assert!(authorize(&admin, op.allowed_roles()).is_ok());
        }
    }

    #[test]
    fn test_password_hash_verification() {
        let hash = hash_password("s3cret!").unwrap();
        assert_ne!(hash, "s3cret!");
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret!", "not-a-phc-string"));
    }

    #[test]
    fn test_dummy_hash_is_well_formed() {
        let parsed = PasswordHash::new(DUMMY_HASH).unwrap();
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert!(!verify_password("pw", DUMMY_HASH));
    }

    #[tokio::test]
    async fn test_hash_password_blocking() {
        let hash = hash_password_blocking("s3cret!".into()).await.unwrap();
        assert!(verify_password("s3cret!", &hash));
    }

    #[tokio::test]
    async fn test_login_checks_username_and_password() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("dean", &hash_password("pw").unwrap(), Role::Admin)
            .unwrap();
        let keys = keys();

        let session = login(&db, &keys, "dean", "pw").await.unwrap();
        assert_eq!(session.role, Role::Admin);
        assert_eq!(keys.authenticate(Some(&session.token)).unwrap().role, Role::Admin);

        assert!(matches!(
            login(&db, &keys, "dean", "nope").await,
            Err(AppError::Auth(AuthError::InvalidCredential(INVALID_LOGIN)))
        ));
        assert!(matches!(
            login(&db, &keys, "ghost", "pw").await,
            Err(AppError::Auth(AuthError::InvalidCredential(INVALID_LOGIN)))
        ));
    }
}
