pub mod context;
pub mod dependency_registry;

pub use context::AppContext;
pub use dependency_registry::{Dependency, DependencyRegistry, singleton};

use crate::ports::{ObjectStorage, StoryBackend};
use crate::queue::ExecutionQueue;
use crate::stories::{StoriesRepository, StoriesService};
use crate::uploads::FileUploadService;

// Default slots populated by `AppContext::registry`.
pub const STORY_BACKEND: Dependency<dyn StoryBackend> = Dependency::new("story_backend");
pub const OBJECT_STORAGE: Dependency<dyn ObjectStorage> = Dependency::new("object_storage");
pub const EXECUTION_QUEUE: Dependency<ExecutionQueue> = Dependency::new("execution_queue");
pub const FILE_UPLOADS: Dependency<FileUploadService> = Dependency::new("file_uploads");
pub const STORIES_REPOSITORY: Dependency<dyn StoriesRepository> =
    Dependency::new("stories_repository");
pub const STORIES_SERVICE: Dependency<dyn StoriesService> = Dependency::new("stories_service");
