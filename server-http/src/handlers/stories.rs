use crate::api::requests::{CreateStoryRequest, SearchQuery, StoriesQuery, UpdateStoryRequest};
use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::state::AppState;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use shared::Error;
use taleshelf::domain::{AuthUser, PaginatedStories, Story, StoryFilters, UserStats};
use tracing::{debug, info};

/// GET /stories
///
/// `is_published=false` is honored only for moderators and for an author
/// listing their own stories.
pub async fn list_stories(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<StoriesQuery>,
) -> Result<Json<PaginatedStories>, ApiError> {
    let (mut filters, pagination) = query.into_parts();
    if filters.is_published != Some(true) && !viewer.can_see_drafts(filters.author_id.as_deref()) {
        debug!("draft listing requested without access, showing published stories");
        filters.is_published = Some(true);
    }

    let page = state
        .context
        .stories
        .get_stories_paginated(filters, pagination)
        .await?;
    Ok(Json(page))
}

/// GET /stories/search?q=
pub async fn search_stories(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Story>>, ApiError> {
    let mut stories = state.context.stories.search_stories(&query.q).await?;
    stories.retain(|story| story.is_published || viewer.can_see_drafts(Some(&story.author_id)));
    Ok(Json(stories))
}

/// GET /stories/{id}
///
/// A draft is reported as missing to anyone who may not see it.
pub async fn get_story(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Json<Story>, ApiError> {
    state
        .context
        .stories
        .get_story_by_id(&id)
        .await?
        .filter(|story| story.is_published || viewer.can_see_drafts(Some(&story.author_id)))
        .map(Json)
        .ok_or(ApiError(Error::NotFound))
}

/// GET /users/{id}/stories
///
/// Drafts included for the author and for moderators.
pub async fn user_stories(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Story>>, ApiError> {
    let stories = if viewer.can_see_drafts(Some(&user_id)) {
        state.context.stories.get_user_stories(&user_id).await?
    } else {
        state
            .context
            .stories
            .get_stories(StoryFilters {
                is_published: Some(true),
                ..StoryFilters::by_author(user_id)
            })
            .await?
    };
    Ok(Json(stories))
}

/// GET /users/{id}/stats
pub async fn user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, ApiError> {
    Ok(Json(state.context.stories.get_user_stats(&user_id).await?))
}

/// POST /stories
pub async fn create_story(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<Story>), ApiError> {
    let story = state
        .context
        .stories
        .create_story(&user, request.into_data()?)
        .await?;

    info!(id = %story.id, author = %user.username, "story created");
    Ok((StatusCode::CREATED, Json(story)))
}

/// PUT /stories/{id}
pub async fn update_story(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStoryRequest>,
) -> Result<Json<Story>, ApiError> {
    let story = state
        .context
        .stories
        .update_story(&id, request.into_data()?)
        .await?;

    info!(id = %story.id, "story updated");
    Ok(Json(story))
}

/// DELETE /stories/{id}
pub async fn delete_story(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.context.stories.delete_story(&id).await?;

    info!(id = %id, "story deleted");
    Ok(StatusCode::NO_CONTENT)
}
