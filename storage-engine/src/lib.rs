// storage-engine/src/lib.rs
pub mod memory_backend;
pub mod memory_objects;
pub mod memory_sessions;

pub use memory_backend::MemoryStoryBackend;
pub use memory_objects::MemoryObjectStorage;
pub use memory_sessions::MokaSessionStore;
