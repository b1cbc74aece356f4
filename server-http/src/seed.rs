use chrono::Utc;
use shared::config::Config;
use storage_engine::{MemoryStoryBackend, MokaSessionStore};
use taleshelf::domain::AuthUser;
use taleshelf::ports::ProfileRow;
use tracing::info;

const MODERATOR_ID: &str = "00000000-0000-4000-8000-000000000001";
const MODERATOR_NAME: &str = "moderator";

/// The in-memory backend starts with one moderator profile, reachable with
/// the configured moderator token.
pub async fn seed_backend(backend: &MemoryStoryBackend, sessions: &MokaSessionStore, config: &Config) {
    let now = Utc::now();
    backend.add_profile(ProfileRow {
        id: MODERATOR_ID.into(),
        username: MODERATOR_NAME.into(),
        avatar_url: None,
        is_moderator: true,
        created_at: now,
        updated_at: now,
    });

    sessions
        .insert_session(
            config.moderator_token.clone(),
            AuthUser {
                id: MODERATOR_ID.into(),
                email: format!("{MODERATOR_NAME}@localhost"),
                username: MODERATOR_NAME.into(),
                is_moderator: true,
            },
        )
        .await;

    info!(user = MODERATOR_NAME, "seeded moderator profile");
}
