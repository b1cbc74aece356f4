pub mod content;
pub mod repository;
pub mod service;

pub use repository::{BackendStoriesRepository, StoriesRepository};
pub use service::{DefaultStoriesService, StoriesService};
