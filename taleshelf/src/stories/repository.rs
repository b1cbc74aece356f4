use super::content::{plain_text, reading_time_minutes};
use crate::domain::{
    Author, AuthUser, CoverImage, CreateStoryData, PaginatedStories, PaginationOptions, SortField,
    SortOrder, Story, StoryFilters, UpdateStoryData, UserStats,
};
use crate::ports::{NewStoryRow, RowRange, StoryBackend, StoryPatch, StoryQuery, StoryRow};
use crate::queue::{CacheKey, ExecutionQueue};
use crate::uploads::FileUploadService;
use async_trait::async_trait;
use serde::Serialize;
use shared::{Error, Result};
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Leading segment of every stories cache key.
pub const STORIES: &str = "stories";

/// Key families holding result lists; all of them go stale after a write.
pub const LISTING_FAMILIES: [&str; 5] = ["paginated", "list", "user", "search", "stats"];

#[async_trait]
pub trait StoriesRepository: Send + Sync + 'static {
    async fn get_stories(&self, filters: StoryFilters) -> Result<Vec<Story>>;

    async fn get_stories_paginated(
        &self,
        filters: StoryFilters,
        pagination: PaginationOptions,
    ) -> Result<PaginatedStories>;

    /// `Ok(None)` when no story has this id.
    async fn get_story_by_id(&self, id: &str) -> Result<Option<Story>>;

    async fn create_story(&self, author: &AuthUser, data: CreateStoryData) -> Result<Story>;

    async fn update_story(&self, id: &str, data: UpdateStoryData) -> Result<Story>;

    async fn delete_story(&self, id: &str) -> Result<()>;

    async fn get_user_stories(&self, user_id: &str) -> Result<Vec<Story>>;

    async fn search_stories(&self, query: &str) -> Result<Vec<Story>>;

    /// Best effort: zero counts when the backend cannot answer.
    async fn get_user_stats(&self, user_id: &str) -> Result<UserStats>;
}

/// Discriminant of a paginated listing key. Defaults are resolved before
/// keying so that an explicit `page: 1` and an omitted page share a key.
#[derive(Serialize)]
struct ListingKey<'a> {
    filters: &'a StoryFilters,
    page: u32,
    limit: u32,
    sort_by: SortField,
    sort_order: SortOrder,
}

#[derive(Serialize)]
struct CoverFingerprint<'a> {
    file_name: &'a str,
    content_type: &'a str,
    len: usize,
    digest: u64,
}

impl<'a> CoverFingerprint<'a> {
    fn of(image: &'a CoverImage) -> Self {
        let mut hasher = DefaultHasher::new();
        image.bytes.hash(&mut hasher);
        Self {
            file_name: &image.file_name,
            content_type: &image.content_type,
            len: image.bytes.len(),
            digest: hasher.finish(),
        }
    }
}

#[derive(Serialize)]
struct UpdateKey<'a> {
    title: Option<&'a str>,
    content: Option<&'a str>,
    is_published: Option<bool>,
    cover: Option<CoverFingerprint<'a>>,
}

/// Stories repository backed by the managed row store. Every backend call
/// is routed through the shared [`ExecutionQueue`].
pub struct BackendStoriesRepository {
    queue: Arc<ExecutionQueue>,
    backend: Arc<dyn StoryBackend>,
    uploads: Arc<FileUploadService>,
    page_size: u32,
    cover_folder: String,
}

impl BackendStoriesRepository {
    pub fn new(
        queue: Arc<ExecutionQueue>,
        backend: Arc<dyn StoryBackend>,
        uploads: Arc<FileUploadService>,
        page_size: u32,
        cover_folder: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            backend,
            uploads,
            page_size: page_size.max(1),
            cover_folder: cover_folder.into(),
        }
    }

    fn key(family: &str) -> CacheKey {
        CacheKey::from([STORIES, family])
    }

    /// Route a read through the queue and log failures.
    async fn read<T, F, Fut>(&self, operation: &'static str, key: CacheKey, producer: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.queue
            .run(&key, producer)
            .await
            .inspect_err(|e| error!(operation, error = %e, "stories repository call failed"))
    }

    /// Route a write through the queue. The result is never cached, and the
    /// listing families are dropped inside the operation itself, so they go
    /// stale even when every caller has gone away.
    async fn write<T, F, Fut>(&self, operation: &'static str, key: CacheKey, producer: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let queue = Arc::clone(&self.queue);

        self.queue
            .run_transient(&key, move || async move {
                let value = producer().await?;
                invalidate_listings(&queue);
                Ok(value)
            })
            .await
            .inspect_err(|e| error!(operation, error = %e, "stories repository call failed"))
    }

    fn list_query(filters: StoryFilters) -> StoryQuery {
        StoryQuery {
            filters,
            ..StoryQuery::default()
        }
    }
}

#[async_trait]
impl StoriesRepository for BackendStoriesRepository {
    async fn get_stories(&self, filters: StoryFilters) -> Result<Vec<Story>> {
        let filters = filters.normalized();
        let key = Self::key("list").with_discriminant(&filters)?;
        let backend = Arc::clone(&self.backend);

        self.read("get_stories", key, move || async move {
            let set = backend.select_stories(Self::list_query(filters)).await?;
            Ok(normalize_rows(set.rows))
        })
        .await
    }

    async fn get_stories_paginated(
        &self,
        filters: StoryFilters,
        pagination: PaginationOptions,
    ) -> Result<PaginatedStories> {
        let filters = filters.normalized();
        let page = pagination.page.unwrap_or(1).max(1);
        let limit = pagination.limit.unwrap_or(self.page_size).max(1);
        let sort_by = pagination.sort_by.unwrap_or_default();
        let sort_order = pagination.sort_order.unwrap_or_default();

        let start = (page as usize - 1) * limit as usize;
        let end = start + limit as usize - 1;

        debug!(?filters, page, limit, start, end, "get_stories_paginated");

        let key = Self::key("paginated").with_discriminant(&ListingKey {
            filters: &filters,
            page,
            limit,
            sort_by,
            sort_order,
        })?;
        let backend = Arc::clone(&self.backend);

        self.read("get_stories_paginated", key, move || async move {
            let set = backend
                .select_stories(StoryQuery {
                    filters,
                    sort_by,
                    sort_order,
                    range: Some(RowRange { start, end }),
                    count_exact: true,
                })
                .await?;

            Ok(PaginatedStories::new(
                normalize_rows(set.rows),
                set.total_count.unwrap_or(0),
                page,
                limit,
            ))
        })
        .await
    }

    async fn get_story_by_id(&self, id: &str) -> Result<Option<Story>> {
        let key = Self::key("by_id").push(id);
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();

        self.read("get_story_by_id", key, move || async move {
            match backend.select_story(&id).await {
                Ok(row) => Ok(Some(normalize(row))),
                Err(Error::NotFound) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn create_story(&self, author: &AuthUser, data: CreateStoryData) -> Result<Story> {
        // Fresh key per call: two creates never coalesce.
        let key = Self::key("create").push(Uuid::new_v4().to_string());
        let backend = Arc::clone(&self.backend);
        let uploads = Arc::clone(&self.uploads);
        let folder = self.cover_folder.clone();
        let author_id = author.id.clone();

        self.write("create_story", key, move || async move {
            let content_text = plain_text(&data.content);

            let cover_image_url = match &data.cover_image {
                Some(image) => {
                    debug!("uploading cover image");
                    let url = uploads.upload_image(image, &folder).await?;
                    debug!(url = %url, "cover image uploaded");
                    Some(url)
                }
                None => None,
            };

            let row = backend
                .insert_story(NewStoryRow {
                    title: data.title,
                    content: data.content,
                    content_text,
                    cover_image_url,
                    author_id,
                    is_published: data.is_published,
                })
                .await?;

            Ok(normalize(row))
        })
        .await
    }

    async fn update_story(&self, id: &str, data: UpdateStoryData) -> Result<Story> {
        let key = Self::key("update").push(id).with_discriminant(&UpdateKey {
            title: data.title.as_deref(),
            content: data.content.as_deref(),
            is_published: data.is_published,
            cover: data.cover_image.as_ref().map(CoverFingerprint::of),
        })?;
        let backend = Arc::clone(&self.backend);
        let uploads = Arc::clone(&self.uploads);
        let folder = self.cover_folder.clone();
        let id = id.to_string();

        self.write("update_story", key, move || async move {
            let cover_image_url = match &data.cover_image {
                Some(image) => {
                    debug!("uploading new cover image");
                    Some(uploads.upload_image(image, &folder).await?)
                }
                None => None,
            };

            let patch = StoryPatch {
                content_text: data.content.as_deref().map(plain_text),
                title: data.title,
                content: data.content,
                cover_image_url,
                is_published: data.is_published,
            };

            let row = backend.update_story(&id, patch).await?;
            Ok(normalize(row))
        })
        .await
    }

    async fn delete_story(&self, id: &str) -> Result<()> {
        let key = Self::key("delete").push(id);
        let backend = Arc::clone(&self.backend);
        let id = id.to_string();

        self.write("delete_story", key, move || async move {
            backend.delete_story(&id).await
        })
        .await
    }

    async fn get_user_stories(&self, user_id: &str) -> Result<Vec<Story>> {
        let key = Self::key("user").push(user_id);
        let backend = Arc::clone(&self.backend);
        let filters = StoryFilters::by_author(user_id);

        self.read("get_user_stories", key, move || async move {
            let set = backend.select_stories(Self::list_query(filters)).await?;
            Ok(normalize_rows(set.rows))
        })
        .await
    }

    async fn search_stories(&self, query: &str) -> Result<Vec<Story>> {
        let key = Self::key("search").push(query);
        let backend = Arc::clone(&self.backend);
        let filters = StoryFilters {
            search: Some(query.to_string()),
            ..StoryFilters::default()
        };

        self.read("search_stories", key, move || async move {
            let set = backend.select_stories(Self::list_query(filters)).await?;
            Ok(normalize_rows(set.rows))
        })
        .await
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<UserStats> {
        let key = Self::key("stats").push(user_id);
        let backend = Arc::clone(&self.backend);
        let user_id = user_id.to_string();

        let counted = self
            .queue
            .run(&key, move || async move {
                let count = |filters: StoryFilters| StoryQuery {
                    filters,
                    range: Some(RowRange { start: 0, end: 0 }),
                    count_exact: true,
                    ..StoryQuery::default()
                };

                let created = backend
                    .select_stories(count(StoryFilters::by_author(user_id.clone())))
                    .await?;
                let published = backend
                    .select_stories(count(StoryFilters {
                        is_published: Some(true),
                        ..StoryFilters::by_author(user_id)
                    }))
                    .await?;

                Ok(UserStats {
                    stories_created: created.total_count.unwrap_or(0),
                    stories_published: published.total_count.unwrap_or(0),
                })
            })
            .await;

        match counted {
            Ok(stats) => Ok(stats),
            Err(e) => {
                warn!(error = %e, "user stats unavailable, reporting zero counts");
                Ok(UserStats::default())
            }
        }
    }
}

fn invalidate_listings(queue: &ExecutionQueue) {
    for family in LISTING_FAMILIES {
        queue.invalidate_by_prefix(&CacheKey::from([STORIES, family]));
    }
}

fn normalize(row: StoryRow) -> Story {
    let author = row.profile.map(|profile| Author {
        id: profile.id,
        username: profile.username,
        avatar_url: profile.avatar_url.filter(|url| !url.is_empty()),
        is_moderator: profile.is_moderator,
        created_at: profile.created_at,
    });

    Story {
        id: row.id,
        title: row.title,
        content: row.content,
        reading_time_minutes: reading_time_minutes(&row.content_text),
        content_text: row.content_text,
        cover_image_url: row.cover_image_url.filter(|url| !url.is_empty()),
        author_id: row.author_id,
        is_published: row.is_published,
        views_count: row.views_count,
        collection_count: row.collection_count,
        created_at: row.created_at,
        updated_at: row.updated_at,
        author,
    }
}

fn normalize_rows(rows: Vec<StoryRow>) -> Vec<Story> {
    rows.into_iter().map(normalize).collect()
}
