pub mod execution_queue;
pub mod key;

pub use execution_queue::ExecutionQueue;
pub use key::CacheKey;
