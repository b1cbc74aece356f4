use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use shared::{Error, Result};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use taleshelf::domain::{SortField, SortOrder, StoryFilters};
use taleshelf::ports::{
    NewStoryRow, ProfileRow, StoryBackend, StoryPatch, StoryQuery, StoryRow, StoryRowSet,
};
use tracing::debug;
use uuid::Uuid;

struct StoredStory {
    /// Insertion order, breaks `created_at` ties.
    seq: u64,
    row: StoryRow,
}

/// In-process stand-in for the managed row store: a `stories` table joined
/// with `profiles` on read.
///
/// Besides the [`StoryBackend`] port it exposes a few knobs for tests:
/// simulated latency, a count of select calls, and one-shot failure injection.
#[derive(Default)]
pub struct MemoryStoryBackend {
    stories: RwLock<Vec<StoredStory>>,
    profiles: DashMap<String, ProfileRow>,
    sequence: AtomicU64,
    latency: Option<Duration>,
    select_calls: AtomicUsize,
    fail_next: Mutex<Option<Error>>,
}

impl MemoryStoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before touching the tables.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add_profile(&self, profile: ProfileRow) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Number of `select_stories`/`select_story` calls served so far.
    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    /// The next call of any kind fails with `error`.
    pub fn fail_next(&self, error: Error) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn len(&self) -> usize {
        self.stories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn round_trip(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.fail_next.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn joined(&self, row: &StoryRow) -> StoryRow {
        let mut row = row.clone();
        row.profile = self.profiles.get(&row.author_id).map(|p| p.value().clone());
        row
    }
}

fn row_matches(filters: &StoryFilters, row: &StoryRow) -> bool {
    let author_ok = filters
        .author_id
        .as_ref()
        .is_none_or(|author_id| &row.author_id == author_id);
    let published_ok = filters
        .is_published
        .is_none_or(|published| row.is_published == published);
    let search_ok = filters
        .search
        .as_deref()
        .is_none_or(|query| title_matches(&row.title, query));

    author_ok && published_ok && search_ok
}

/// Every whitespace-separated term must equal some word of the title,
/// ignoring case.
fn title_matches(title: &str, query: &str) -> bool {
    let words: Vec<String> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut terms = query.split_whitespace().map(str::to_lowercase).peekable();
    if terms.peek().is_none() {
        return false;
    }
    terms.all(|term| words.contains(&term))
}

fn compare(sort_by: SortField, a: &StoredStory, b: &StoredStory) -> CmpOrdering {
    let primary = match sort_by {
        SortField::CreatedAt => a.row.created_at.cmp(&b.row.created_at),
        SortField::UpdatedAt => a.row.updated_at.cmp(&b.row.updated_at),
        SortField::Title => a.row.title.cmp(&b.row.title),
    };
    primary.then(a.seq.cmp(&b.seq))
}

#[async_trait]
impl StoryBackend for MemoryStoryBackend {
    async fn select_stories(&self, query: StoryQuery) -> Result<StoryRowSet> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let stories = self.stories.read();
        let mut selected: Vec<&StoredStory> = stories
            .iter()
            .filter(|s| row_matches(&query.filters, &s.row))
            .collect();

        selected.sort_by(|a, b| {
            let ordering = compare(query.sort_by, a, b);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = selected.len();
        let window = match query.range {
            Some(range) if range.start >= total || range.end < range.start => &selected[..0],
            Some(range) => &selected[range.start..=range.end.min(total - 1)],
            None => &selected[..],
        };

        debug!(matched = total, returned = window.len(), "select stories");

        Ok(StoryRowSet {
            rows: window.iter().map(|s| self.joined(&s.row)).collect(),
            total_count: query.count_exact.then_some(total as u64),
        })
    }

    async fn select_story(&self, id: &str) -> Result<StoryRow> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        self.stories
            .read()
            .iter()
            .find(|s| s.row.id == id)
            .map(|s| self.joined(&s.row))
            .ok_or(Error::NotFound)
    }

    async fn insert_story(&self, new: NewStoryRow) -> Result<StoryRow> {
        self.round_trip().await?;

        if !self.profiles.contains_key(&new.author_id) {
            return Err(Error::backend(
                "23503",
                "insert on table \"stories\" violates foreign key constraint \"stories_author_id_fkey\"",
            ));
        }

        let now = Utc::now();
        let row = StoryRow {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            content: new.content,
            content_text: new.content_text,
            cover_image_url: new.cover_image_url,
            author_id: new.author_id,
            is_published: new.is_published,
            views_count: 0,
            collection_count: 0,
            created_at: now,
            updated_at: now,
            profile: None,
        };

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.stories.write().push(StoredStory {
            seq,
            row: row.clone(),
        });

        Ok(self.joined(&row))
    }

    async fn update_story(&self, id: &str, patch: StoryPatch) -> Result<StoryRow> {
        self.round_trip().await?;

        let mut stories = self.stories.write();
        let stored = stories
            .iter_mut()
            .find(|s| s.row.id == id)
            .ok_or(Error::NotFound)?;

        let row = &mut stored.row;
        if let Some(title) = patch.title {
            row.title = title;
        }
        if let Some(content) = patch.content {
            row.content = content;
        }
        if let Some(content_text) = patch.content_text {
            row.content_text = content_text;
        }
        if let Some(url) = patch.cover_image_url {
            row.cover_image_url = Some(url);
        }
        if let Some(published) = patch.is_published {
            row.is_published = published;
        }
        row.updated_at = Utc::now();

        let updated = row.clone();
        drop(stories);
        Ok(self.joined(&updated))
    }

    async fn delete_story(&self, id: &str) -> Result<()> {
        self.round_trip().await?;

        let mut stories = self.stories.write();
        let before = stories.len();
        stories.retain(|s| s.row.id != id);
        debug!(id, removed = before - stories.len(), "delete story");
        Ok(())
    }
}
