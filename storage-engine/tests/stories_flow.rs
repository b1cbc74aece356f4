use bytes::Bytes;
use chrono::Utc;
use shared::Error;
use shared::config::Config;
use std::sync::Arc;
use std::time::Duration;
use storage_engine::{MemoryObjectStorage, MemoryStoryBackend};
use taleshelf::AppContext;
use taleshelf::domain::{
    AuthUser, CoverImage, CreateStoryData, PaginationOptions, StoryFilters, UpdateStoryData,
};
use taleshelf::ports::ProfileRow;

const AUTHOR: &str = "moderator-1";

fn moderator() -> AuthUser {
    AuthUser {
        id: AUTHOR.into(),
        email: "mod@example.com".into(),
        username: "mod".into(),
        is_moderator: true,
    }
}

fn backend() -> MemoryStoryBackend {
    let now = Utc::now();
    let backend = MemoryStoryBackend::new();
    backend.add_profile(ProfileRow {
        id: AUTHOR.into(),
        username: "mod".into(),
        avatar_url: Some(String::new()),
        is_moderator: true,
        created_at: now,
        updated_at: now,
    });
    backend
}

fn story(title: &str) -> CreateStoryData {
    CreateStoryData {
        title: title.into(),
        content: format!(r#"{{"type":"doc","content":[{{"type":"text","text":"{title}"}}]}}"#),
        cover_image: None,
        is_published: true,
    }
}

fn context(backend: Arc<MemoryStoryBackend>) -> (AppContext, Arc<MemoryObjectStorage>) {
    let storage = Arc::new(MemoryObjectStorage::new("http://cdn.test/story-covers"));
    let context = AppContext::bootstrap(&Config::default(), backend, storage.clone()).unwrap();
    (context, storage)
}

#[tokio::test]
async fn test_created_story_leads_first_page() {
    let backend = Arc::new(backend());
    let (ctx, _) = context(backend.clone());
    for n in 0..3 {
        ctx.stories
            .create_story(&moderator(), story(&format!("Tale {n}")))
            .await
            .unwrap();
    }

    let before = ctx
        .stories
        .get_stories_paginated(StoryFilters::published(), PaginationOptions::page(1, 6))
        .await
        .unwrap();

    let created = ctx
        .stories
        .create_story(&moderator(), story("Newest"))
        .await
        .unwrap();
    assert_eq!(created.content_text, "Newest");
    assert_eq!(created.author.unwrap().avatar_url, None);

    let after = ctx
        .stories
        .get_stories_paginated(StoryFilters::published(), PaginationOptions::page(1, 6))
        .await
        .unwrap();

    assert_eq!(after.total_count, before.total_count + 1);
    assert_eq!(after.stories[0].id, created.id);
}

#[tokio::test]
async fn test_deleting_last_item_on_page_two_falls_back_to_page_one() {
    let backend = Arc::new(backend());
    let (ctx, _) = context(backend.clone());
    for n in 0..7 {
        ctx.stories
            .create_story(&moderator(), story(&format!("Tale {n}")))
            .await
            .unwrap();
    }

    let page_two = ctx
        .stories
        .get_stories_paginated(StoryFilters::published(), PaginationOptions::page(2, 6))
        .await
        .unwrap();
    assert_eq!(page_two.total_pages, 2);
    assert_eq!(page_two.stories.len(), 1);

    ctx.stories
        .delete_story(&page_two.stories[0].id)
        .await
        .unwrap();

    let refetched = ctx
        .stories
        .get_stories_paginated(StoryFilters::published(), PaginationOptions::page(2, 6))
        .await
        .unwrap();
    assert!(refetched.stories.is_empty());

    let shown = ctx
        .stories
        .load_page_with_fallback(StoryFilters::published(), PaginationOptions::page(2, 6))
        .await
        .unwrap();
    assert_eq!(shown.current_page, 1);
    assert_eq!(shown.stories.len(), 6);
    assert_eq!(shown.total_pages, 1);
}

#[tokio::test]
async fn test_simultaneous_reads_issue_one_query() {
    let backend = Arc::new(backend().with_latency(Duration::from_millis(50)));
    let (ctx, _) = context(backend.clone());

    let (a, b) = tokio::join!(
        ctx.stories
            .get_stories_paginated(StoryFilters::published(), PaginationOptions::page(1, 6)),
        ctx.stories.get_stories_paginated(
            StoryFilters::published(),
            PaginationOptions {
                page: Some(1),
                ..PaginationOptions::default()
            },
        ),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(backend.select_calls(), 1);
}

#[tokio::test]
async fn test_many_concurrent_readers_share_one_failure() {
    let backend = Arc::new(backend().with_latency(Duration::from_millis(30)));
    let (ctx, _) = context(backend.clone());
    backend.fail_next(Error::backend("08006", "connection failure"));

    let results = futures::future::join_all((0..8).map(|_| {
        ctx.stories
            .get_stories_paginated(StoryFilters::published(), PaginationOptions::default())
    }))
    .await;

    assert_eq!(backend.select_calls(), 1);
    for result in results {
        assert_eq!(result.unwrap_err(), Error::backend("08006", "connection failure"));
    }

    // Not cached: the next read goes to the backend again.
    ctx.stories
        .get_stories_paginated(StoryFilters::published(), PaginationOptions::default())
        .await
        .unwrap();
    assert_eq!(backend.select_calls(), 2);
}

#[tokio::test]
async fn test_cover_upload_and_update_flow() {
    let backend = Arc::new(backend());
    let (ctx, storage) = context(backend.clone());

    let mut data = story("Painted");
    data.cover_image = Some(CoverImage {
        file_name: "painted.webp".into(),
        content_type: "image/webp".into(),
        bytes: Bytes::from_static(b"webp"),
    });
    let created = ctx.stories.create_story(&moderator(), data).await.unwrap();

    let url = created.cover_image_url.clone().unwrap();
    assert!(url.starts_with("http://cdn.test/story-covers/covers/"));
    assert_eq!(storage.len(), 1);

    let updated = ctx
        .stories
        .update_story(
            &created.id,
            UpdateStoryData {
                content: Some("<p>Plain <b>words</b></p>".into()),
                is_published: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.content_text, "Plain words");
    assert_eq!(updated.cover_image_url, Some(url.clone()));

    let published = ctx
        .stories
        .get_stories(StoryFilters::published())
        .await
        .unwrap();
    assert!(published.is_empty());

    ctx.uploads.delete_image(&url).await.unwrap();
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_search_user_stories_and_stats_refresh_after_writes() {
    let backend = Arc::new(backend());
    let (ctx, _) = context(backend.clone());

    ctx.stories
        .create_story(&moderator(), story("The Brave Hare"))
        .await
        .unwrap();
    assert_eq!(ctx.stories.search_stories("hare").await.unwrap().len(), 1);
    let stats = ctx.stories.get_user_stats(AUTHOR).await.unwrap();
    assert_eq!((stats.stories_created, stats.stories_published), (1, 1));

    let mut draft = story("Hare in Winter");
    draft.is_published = false;
    ctx.stories.create_story(&moderator(), draft).await.unwrap();

    assert_eq!(ctx.stories.search_stories("hare").await.unwrap().len(), 2);
    assert_eq!(ctx.stories.get_user_stories(AUTHOR).await.unwrap().len(), 2);
    let stats = ctx.stories.get_user_stats(AUTHOR).await.unwrap();
    assert_eq!((stats.stories_created, stats.stories_published), (2, 1));
}

#[tokio::test]
async fn test_story_by_id_is_served_from_cache_after_delete() {
    let backend = Arc::new(backend());
    let (ctx, _) = context(backend.clone());

    let created = ctx
        .stories
        .create_story(&moderator(), story("Ephemeral"))
        .await
        .unwrap();
    assert!(ctx.stories.get_story_by_id(&created.id).await.unwrap().is_some());

    ctx.stories.delete_story(&created.id).await.unwrap();

    // Single-entity entries are left to expire on their own.
    assert!(ctx.stories.get_story_by_id(&created.id).await.unwrap().is_some());
    ctx.queue.clear_all();
    assert!(ctx.stories.get_story_by_id(&created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_abandoned_create_still_lands_and_refreshes_listings() {
    let backend = Arc::new(backend().with_latency(Duration::from_millis(30)));
    let (ctx, _) = context(backend.clone());

    let before = ctx
        .stories
        .get_stories_paginated(StoryFilters::published(), PaginationOptions::page(1, 6))
        .await
        .unwrap();
    assert_eq!(before.total_count, 0);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(5),
        ctx.stories.create_story(&moderator(), story("Left Behind")),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.len(), 1);
    assert_eq!(ctx.queue.pending_len().await, 0);

    let after = ctx
        .stories
        .get_stories_paginated(StoryFilters::published(), PaginationOptions::page(1, 6))
        .await
        .unwrap();
    assert_eq!(after.total_count, 1);
    assert_eq!(after.stories[0].title, "Left Behind");
}
