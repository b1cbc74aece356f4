// taleshelf/src/lib.rs
pub mod domain;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod stories;
pub mod uploads;

pub use queue::{CacheKey, ExecutionQueue};
pub use registry::{AppContext, Dependency, DependencyRegistry};
pub use stories::{StoriesRepository, StoriesService};
pub use uploads::FileUploadService;
