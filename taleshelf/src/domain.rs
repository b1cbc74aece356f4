use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public profile of a story's author, as joined from the `profiles` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub is_moderator: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    /// Rich-text editor document, serialized as JSON.
    pub content: String,
    /// Plain text extracted from `content`, used for search.
    pub content_text: String,
    /// Derived from `content_text` at 200 words per minute.
    pub reading_time_minutes: u32,
    pub cover_image_url: Option<String>,
    pub author_id: String,
    pub is_published: bool,
    pub views_count: u64,
    pub collection_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<Author>,
}

/// Identity attached to an authenticated session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub is_moderator: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFilters {
    pub author_id: Option<String>,
    pub search: Option<String>,
    pub is_published: Option<bool>,
}

impl StoryFilters {
    pub fn published() -> Self {
        Self {
            is_published: Some(true),
            ..Self::default()
        }
    }

    pub fn by_author(author_id: impl Into<String>) -> Self {
        Self {
            author_id: Some(author_id.into()),
            ..Self::default()
        }
    }

    /// Trims the search term and drops empty values so that filters which
    /// select the same rows compare equal.
    pub fn normalized(&self) -> Self {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            author_id: clean(&self.author_id),
            search: clean(&self.search),
            is_published: self.is_published,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Title,
    UpdatedAt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationOptions {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

impl PaginationOptions {
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedStories {
    pub stories: Vec<Story>,
    pub total_count: u64,
    pub current_page: u32,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl PaginatedStories {
    pub fn new(stories: Vec<Story>, total_count: u64, page: u32, limit: u32) -> Self {
        let total_pages = total_count.div_ceil(u64::from(limit.max(1))) as u32;

        Self {
            stories,
            total_count,
            current_page: page,
            total_pages,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }
}

/// An image file attached to a create or update request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateStoryData {
    pub title: String,
    pub content: String,
    pub cover_image: Option<CoverImage>,
    pub is_published: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateStoryData {
    pub title: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<CoverImage>,
    pub is_published: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub stories_created: u64,
    pub stories_published: u64,
}
