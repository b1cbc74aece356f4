use super::{
    DependencyRegistry, EXECUTION_QUEUE, FILE_UPLOADS, OBJECT_STORAGE, STORIES_REPOSITORY,
    STORIES_SERVICE, STORY_BACKEND, singleton,
};
use crate::ports::{ObjectStorage, StoryBackend};
use crate::queue::ExecutionQueue;
use crate::stories::{
    BackendStoriesRepository, DefaultStoriesService, StoriesRepository, StoriesService,
};
use crate::uploads::FileUploadService;
use shared::Result;
use shared::config::Config;
use std::sync::Arc;
use tracing::info;

/// Process-wide services, resolved once at startup and handed out by `Arc`.
#[derive(Clone)]
pub struct AppContext {
    pub queue: Arc<ExecutionQueue>,
    pub uploads: Arc<FileUploadService>,
    pub repository: Arc<dyn StoriesRepository>,
    pub stories: Arc<dyn StoriesService>,
}

impl AppContext {
    /// Registry holding the default bindings. Callers may re-register any
    /// slot before handing it to [`AppContext::from_registry`].
    pub fn registry(
        config: &Config,
        backend: Arc<dyn StoryBackend>,
        storage: Arc<dyn ObjectStorage>,
    ) -> DependencyRegistry {
        let registry = DependencyRegistry::new();

        registry.register(STORY_BACKEND, move |_| Ok(Arc::clone(&backend)));
        registry.register(OBJECT_STORAGE, move |_| Ok(Arc::clone(&storage)));

        let (ttl, max_entries) = (config.cache_ttl, config.cache_max_entries);
        registry.register(
            EXECUTION_QUEUE,
            singleton(move |_: &DependencyRegistry| {
                Ok(Arc::new(ExecutionQueue::with_capacity(ttl, max_entries)))
            }),
        );

        let max_cover_bytes = config.max_cover_bytes;
        registry.register(
            FILE_UPLOADS,
            singleton(move |r: &DependencyRegistry| {
                Ok(Arc::new(FileUploadService::new(
                    r.resolve(OBJECT_STORAGE)?,
                    max_cover_bytes,
                )))
            }),
        );

        let page_size = config.page_size;
        let cover_folder = config.cover_folder.clone();
        registry.register(
            STORIES_REPOSITORY,
            singleton(move |r: &DependencyRegistry| {
                let repository = BackendStoriesRepository::new(
                    r.resolve(EXECUTION_QUEUE)?,
                    r.resolve(STORY_BACKEND)?,
                    r.resolve(FILE_UPLOADS)?,
                    page_size,
                    cover_folder.clone(),
                );
                Ok(Arc::new(repository) as Arc<dyn StoriesRepository>)
            }),
        );

        registry.register(
            STORIES_SERVICE,
            singleton(|r: &DependencyRegistry| {
                let service = DefaultStoriesService::new(r.resolve(STORIES_REPOSITORY)?);
                Ok(Arc::new(service) as Arc<dyn StoriesService>)
            }),
        );

        registry
    }

    pub fn from_registry(registry: &DependencyRegistry) -> Result<Self> {
        Ok(Self {
            queue: registry.resolve(EXECUTION_QUEUE)?,
            uploads: registry.resolve(FILE_UPLOADS)?,
            repository: registry.resolve(STORIES_REPOSITORY)?,
            stories: registry.resolve(STORIES_SERVICE)?,
        })
    }

    pub fn bootstrap(
        config: &Config,
        backend: Arc<dyn StoryBackend>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self> {
        let registry = Self::registry(config, backend, storage);
        let context = Self::from_registry(&registry)?;
        info!(
            ttl_secs = context.queue.ttl().as_secs(),
            page_size = config.page_size,
            "application context ready"
        );
        Ok(context)
    }
}
