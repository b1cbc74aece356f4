#![deny(clippy::all)]

use crate::domain::{AuthUser, SortField, SortOrder, StoryFilters};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use shared::Result;

// Ports are the seams to the managed backend: row storage, object storage
// and session lookup. Adapters live in the storage-engine crate.

/// Row of the `profiles` table.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub is_moderator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of the `stories` table joined with its author's profile.
#[derive(Clone, Debug, PartialEq)]
pub struct StoryRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub content_text: String,
    pub cover_image_url: Option<String>,
    pub author_id: String,
    pub is_published: bool,
    pub views_count: u64,
    pub collection_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub profile: Option<ProfileRow>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewStoryRow {
    pub title: String,
    pub content: String,
    pub content_text: String,
    pub cover_image_url: Option<String>,
    pub author_id: String,
    pub is_published: bool,
}

/// Column changes for an update. `None` leaves the column untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoryPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_text: Option<String>,
    pub cover_image_url: Option<String>,
    pub is_published: Option<bool>,
}

/// Inclusive row range, like `range(start, end)` on the backend query builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoryQuery {
    pub filters: StoryFilters,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub range: Option<RowRange>,
    /// Ask the backend for the exact number of matching rows.
    pub count_exact: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoryRowSet {
    pub rows: Vec<StoryRow>,
    pub total_count: Option<u64>,
}

#[async_trait]
pub trait StoryBackend: Send + Sync + 'static {
    async fn select_stories(&self, query: StoryQuery) -> Result<StoryRowSet>;
    /// Returns `Error::NotFound` when no row matches.
    async fn select_story(&self, id: &str) -> Result<StoryRow>;
    async fn insert_story(&self, row: NewStoryRow) -> Result<StoryRow>;
    async fn update_story(&self, id: &str, patch: StoryPatch) -> Result<StoryRow>;
    async fn delete_story(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()>;
    fn public_url(&self, path: &str) -> String;
    async fn remove(&self, paths: &[String]) -> Result<()>;
}

#[async_trait]
pub trait SessionVerifier: Send + Sync + 'static {
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>>;
}
