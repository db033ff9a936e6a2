use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::future::{ready, Ready};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::Id;

pub const SESSION_COOKIE: &str = "session";
const SESSION_TTL_HOURS: i64 = 24;

/// Hash a password with a fresh random salt (argon2id).
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Constant-time verification against a stored PHC hash string.
/// A corrupt stored hash counts as a mismatch, not an error.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Server-side record binding a request to a user identity and role.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Id,
    pub username: String,
    pub is_admin: bool,
    pub expires_at: DateTime<Utc>,
}

/// In-process session table keyed by opaque token. The token is the only
/// thing clients ever hold (via an HttpOnly cookie); identity and role live
/// here on the server.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::hours(SESSION_TTL_HOURS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Id, username: &str, is_admin: bool) -> Session {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            token: token.clone(),
            user_id,
            username: username.to_string(),
            is_admin,
            expires_at: Utc::now() + self.ttl,
        };
        self.inner.insert(token, session.clone());
        session
    }

    /// Look up a live session; expired entries are dropped on access.
    pub fn get(&self, token: &str) -> Option<Session> {
        let expired = match self.inner.get(token) {
            Some(entry) if entry.expires_at > Utc::now() => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.remove(token);
        }
        None
    }

    pub fn revoke(&self, token: &str) {
        self.inner.remove(token);
    }

    /// Drop every live session belonging to a user (ban / delete).
    pub fn revoke_user(&self, user_id: Id) {
        self.inner.retain(|_, s| s.user_id != user_id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Extractor yielding the caller's validated `Session`.
/// Use `Option<Auth>` on routes that degrade to an anonymous view.
pub struct Auth(pub Session);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        if let Some(store) = req.app_data::<web::Data<SessionStore>>() {
            if let Some(cookie) = req.cookie(SESSION_COOKIE) {
                if let Some(session) = store.get(cookie.value()) {
                    return ready(Ok(Auth(session)));
                }
            }
        }
        ready(Err(ApiError::Unauthenticated.into()))
    }
}

/// Helper macro guarding admin-only handlers.
#[macro_export]
macro_rules! require_admin {
    ($auth:expr) => {
        if !$auth.0.is_admin {
            return Err($crate::error::ApiError::Unauthorized);
        }
    };
}
