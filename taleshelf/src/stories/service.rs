use super::repository::StoriesRepository;
use crate::domain::{
    AuthUser, CreateStoryData, PaginatedStories, PaginationOptions, Story, StoryFilters,
    UpdateStoryData, UserStats,
};
use async_trait::async_trait;
use shared::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error};

/// Consumer-facing stories contract: validation in front of the repository.
#[async_trait]
pub trait StoriesService: Send + Sync + 'static {
    async fn get_stories(&self, filters: StoryFilters) -> Result<Vec<Story>>;

    async fn get_stories_paginated(
        &self,
        filters: StoryFilters,
        pagination: PaginationOptions,
    ) -> Result<PaginatedStories>;

    async fn get_story_by_id(&self, id: &str) -> Result<Option<Story>>;

    async fn create_story(&self, author: &AuthUser, data: CreateStoryData) -> Result<Story>;

    async fn update_story(&self, id: &str, data: UpdateStoryData) -> Result<Story>;

    async fn delete_story(&self, id: &str) -> Result<()>;

    async fn get_user_stories(&self, user_id: &str) -> Result<Vec<Story>>;

    async fn search_stories(&self, query: &str) -> Result<Vec<Story>>;

    async fn get_user_stats(&self, user_id: &str) -> Result<UserStats>;

    /// Fetch the requested page. When it comes back empty past page 1 (the
    /// last item of the page was just deleted) step back one page, then to
    /// page 1.
    async fn load_page_with_fallback(
        &self,
        filters: StoryFilters,
        pagination: PaginationOptions,
    ) -> Result<PaginatedStories> {
        let requested = pagination.page.unwrap_or(1).max(1);
        let page = self
            .get_stories_paginated(filters.clone(), pagination.clone())
            .await?;
        if !page.stories.is_empty() || requested <= 1 {
            return Ok(page);
        }

        let previous = requested - 1;
        debug!(requested, previous, "page is empty, falling back");
        let page = self
            .get_stories_paginated(
                filters.clone(),
                PaginationOptions {
                    page: Some(previous),
                    ..pagination.clone()
                },
            )
            .await?;
        if !page.stories.is_empty() || previous <= 1 {
            return Ok(page);
        }

        debug!(previous, "previous page is empty too, loading first page");
        self.get_stories_paginated(
            filters,
            PaginationOptions {
                page: Some(1),
                ..pagination
            },
        )
        .await
    }
}

pub struct DefaultStoriesService {
    repository: Arc<dyn StoriesRepository>,
}

impl DefaultStoriesService {
    pub fn new(repository: Arc<dyn StoriesRepository>) -> Self {
        Self { repository }
    }
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn logged<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    result.inspect_err(|e| error!(operation, error = %e, "stories service call failed"))
}

#[async_trait]
impl StoriesService for DefaultStoriesService {
    async fn get_stories(&self, filters: StoryFilters) -> Result<Vec<Story>> {
        debug!(?filters, "get_stories");
        logged("get_stories", self.repository.get_stories(filters).await)
    }

    async fn get_stories_paginated(
        &self,
        filters: StoryFilters,
        pagination: PaginationOptions,
    ) -> Result<PaginatedStories> {
        debug!(?filters, ?pagination, "get_stories_paginated");
        logged(
            "get_stories_paginated",
            self.repository
                .get_stories_paginated(filters, pagination)
                .await,
        )
    }

    async fn get_story_by_id(&self, id: &str) -> Result<Option<Story>> {
        debug!(id, "get_story_by_id");
        logged("get_story_by_id", self.repository.get_story_by_id(id).await)
    }

    async fn create_story(&self, author: &AuthUser, data: CreateStoryData) -> Result<Story> {
        debug!(title = %data.title, author = %author.id, "create_story");

        if blank(&data.title) {
            return Err(Error::validation("title is required"));
        }
        if blank(&data.content) {
            return Err(Error::validation("content is required"));
        }

        logged("create_story", self.repository.create_story(author, data).await)
    }

    async fn update_story(&self, id: &str, data: UpdateStoryData) -> Result<Story> {
        debug!(id, "update_story");

        if data.title.as_deref().is_some_and(blank) {
            return Err(Error::validation("title cannot be empty"));
        }
        if data.content.as_deref().is_some_and(blank) {
            return Err(Error::validation("content cannot be empty"));
        }

        logged("update_story", self.repository.update_story(id, data).await)
    }

    async fn delete_story(&self, id: &str) -> Result<()> {
        debug!(id, "delete_story");
        logged("delete_story", self.repository.delete_story(id).await)
    }

    async fn get_user_stories(&self, user_id: &str) -> Result<Vec<Story>> {
        debug!(user_id, "get_user_stories");
        logged(
            "get_user_stories",
            self.repository.get_user_stories(user_id).await,
        )
    }

    async fn search_stories(&self, query: &str) -> Result<Vec<Story>> {
        debug!(query, "search_stories");

        if blank(query) {
            return Ok(Vec::new());
        }

        logged(
            "search_stories",
            self.repository.search_stories(query.trim()).await,
        )
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<UserStats> {
        debug!(user_id, "get_user_stats");
        self.repository.get_user_stats(user_id).await
    }
}
