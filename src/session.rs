use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::models::{Id, Role};

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sid";

const DEFAULT_TTL_SECS: i64 = 86_400;

/// Per-request view of an authenticated session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user_id: Id,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Server-held session store (pod local), keyed by an opaque UUIDv4 token.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn from_env() -> Self {
        let secs = std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TTL_SECS);
        Self::new(Duration::seconds(secs))
    }

    /// Establish a session and return its token.
    pub fn create(&self, user_id: Id, email: &str, role: Role) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.inner.insert(
            token.clone(),
            Session {
                user_id,
                email: email.to_string(),
                role,
                expires_at: Utc::now() + self.ttl,
            },
        );
        token
    }

    /// Resolve a token; expired entries are removed on access.
    pub fn get(&self, token: &str) -> Option<Session> {
        let expired = match self.inner.get(token) {
            Some(entry) => entry.expires_at <= Utc::now(),
            None => return None,
        };
        if expired {
            self.inner.remove(token);
            return None;
        }
        self.inner.get(token).map(|e| e.clone())
    }

    pub fn remove(&self, token: &str) {
        self.inner.remove(token);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
