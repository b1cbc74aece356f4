use async_trait::async_trait;
use moka::future::Cache;
use rand::Rng;
use shared::Result;
use std::time::Duration;
use taleshelf::domain::AuthUser;
use taleshelf::ports::SessionVerifier;

/// Bearer token -> user sessions held in a moka cache.
pub struct MokaSessionStore {
    sessions: Cache<String, AuthUser>,
}

impl MokaSessionStore {
    pub fn new(max_sessions: Option<u64>, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().name("sessions");

        if let Some(capacity) = max_sessions {
            builder = builder.max_capacity(capacity);
        }

        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            sessions: builder.build(),
        }
    }

    /// Unbounded, 1 hour TTL.
    pub fn with_defaults() -> Self {
        Self::new(None, Some(Duration::from_secs(3600)))
    }

    /// Start a session for `user` under a fresh random token.
    pub async fn create_session(&self, user: AuthUser) -> String {
        let token = generate_session_token();
        self.sessions.insert(token.clone(), user).await;
        token
    }

    /// Bind a known token, e.g. the configured moderator token.
    pub async fn insert_session(&self, token: impl Into<String>, user: AuthUser) {
        self.sessions.insert(token.into(), user).await;
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).await.is_some()
    }
}

/// 32 random bytes, hex encoded.
fn generate_session_token() -> String {
    let mut rng = rand::rng();
    (0..32)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect()
}

#[async_trait]
impl SessionVerifier for MokaSessionStore {
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>> {
        Ok(self.sessions.get(token).await)
    }
}
