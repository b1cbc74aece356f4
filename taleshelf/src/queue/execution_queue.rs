use super::key::CacheKey;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use moka::future::Cache;
use shared::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Cached results are type-erased; `run` downcasts on the way out.
type Payload = Arc<dyn Any + Send + Sync>;

type PendingOperation = Shared<BoxFuture<'static, Result<Payload>>>;

/// Whether a successful result is kept in the cache once the operation settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retention {
    Cached,
    Transient,
}

struct PendingSlot {
    ticket: u64,
    operation: PendingOperation,
}

struct QueueState {
    cache: Cache<String, Payload>,
    pending: Mutex<HashMap<String, PendingSlot>>,
    next_ticket: AtomicU64,
    ttl: Duration,
}

/// Coalesces concurrent identical fetches and keeps successful results
/// for a fixed time-to-live.
///
/// A caller of [`ExecutionQueue::run`] either gets a live cached value,
/// joins the operation already in flight for the same key, or starts a
/// new one. Failures are never cached.
///
/// Every new operation is driven on its own task: dropping the callers
/// waiting on it never stops the producer or leaves its slot registered.
#[derive(Clone)]
pub struct ExecutionQueue {
    state: Arc<QueueState>,
}

impl ExecutionQueue {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, None)
    }

    pub fn with_capacity(ttl: Duration, max_entries: Option<u64>) -> Self {
        let mut builder = Cache::builder()
            .name("execution-queue")
            .time_to_live(ttl)
            .support_invalidation_closures();

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        Self {
            state: Arc::new(QueueState {
                cache: builder.build(),
                pending: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(0),
                ttl,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.state.ttl
    }

    /// Run `producer` for `key` unless a live result or an in-flight
    /// operation for the same key already exists.
    pub async fn run<T, F, Fut>(&self, key: &CacheKey, producer: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run_with(key, Retention::Cached, producer).await
    }

    /// Like [`ExecutionQueue::run`], but the result is handed to the callers
    /// of the in-flight operation only and never stored. Used for writes,
    /// where a later identical call must run again.
    pub async fn run_transient<T, F, Fut>(&self, key: &CacheKey, producer: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run_with(key, Retention::Transient, producer).await
    }

    async fn run_with<T, F, Fut>(
        &self,
        key: &CacheKey,
        retention: Retention,
        producer: F,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = key.id();

        if let Some(hit) = self.state.cache.get(&id).await {
            debug!(key = %id, "execution queue cache hit");
            return downcast(&id, hit);
        }

        let operation = {
            let mut pending = self.state.pending.lock().await;

            // An operation may have finished between the first lookup and
            // taking the lock; it stores its result before deregistering.
            if let Some(hit) = self.state.cache.get(&id).await {
                debug!(key = %id, "execution queue cache hit");
                return downcast(&id, hit);
            }

            match pending.get(&id) {
                Some(slot) => {
                    debug!(key = %id, "joining pending operation");
                    slot.operation.clone()
                }
                None => {
                    let ticket = self.state.next_ticket.fetch_add(1, Ordering::Relaxed);
                    let task = tokio::spawn(execute(
                        Arc::clone(&self.state),
                        id.clone(),
                        ticket,
                        retention,
                        producer,
                    ));
                    let operation = task
                        .map(|joined| {
                            joined.unwrap_or_else(|e| {
                                Err(Error::Internal(format!("pending operation aborted: {e}")))
                            })
                        })
                        .boxed()
                        .shared();
                    pending.insert(
                        id.clone(),
                        PendingSlot {
                            ticket,
                            operation: operation.clone(),
                        },
                    );
                    debug!(key = %id, ticket, "started pending operation");
                    operation
                }
            }
        };

        let payload = operation.await?;
        downcast(&id, payload)
    }

    /// Drop the cached result stored under exactly this key.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.state.cache.invalidate(&key.id()).await;
    }

    /// Drop every cached result whose key begins with the segments of `pattern`.
    pub fn invalidate_by_prefix(&self, pattern: &CacheKey) {
        let prefix = pattern.id();
        debug!(prefix = %prefix, "invalidating cached results by prefix");

        let matcher = prefix.clone();
        if let Err(e) = self
            .state
            .cache
            .invalidate_entries_if(move |id, _| CacheKey::id_has_prefix(id, &matcher))
        {
            warn!(prefix = %prefix, "prefix invalidation unavailable ({e}), clearing all cached results");
            self.state.cache.invalidate_all();
        }
    }

    pub fn clear_all(&self) {
        self.state.cache.invalidate_all();
    }

    /// Forget every pending registration. Operations already running keep
    /// running and still answer the callers that joined them.
    pub async fn clear_pending(&self) {
        self.state.pending.lock().await.clear();
    }

    pub async fn pending_len(&self) -> usize {
        self.state.pending.lock().await.len()
    }
}

impl Default for ExecutionQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

impl Debug for ExecutionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("ttl", &self.state.ttl)
            .field("entry_count", &self.state.cache.entry_count())
            .finish()
    }
}

async fn execute<T, F, Fut>(
    state: Arc<QueueState>,
    id: String,
    ticket: u64,
    retention: Retention,
    producer: F,
) -> Result<Payload>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let outcome = match AssertUnwindSafe(async move { producer().await })
        .catch_unwind()
        .await
    {
        Ok(result) => result.map(|value| Arc::new(value) as Payload),
        Err(_) => {
            warn!(key = %id, "pending operation panicked");
            Err(Error::Internal(format!("operation for '{id}' panicked")))
        }
    };

    match &outcome {
        Ok(payload) if retention == Retention::Cached => {
            state.cache.insert(id.clone(), Arc::clone(payload)).await
        }
        Ok(_) => {}
        Err(e) => {
            debug!(key = %id, error = %e, "pending operation failed");
            state.cache.invalidate(&id).await;
        }
    }

    // Deregister unconditionally, but only our own slot: after
    // `clear_pending` the key may belong to a newer operation.
    let mut pending = state.pending.lock().await;
    if pending.get(&id).is_some_and(|slot| slot.ticket == ticket) {
        pending.remove(&id);
    }
    drop(pending);

    outcome
}

fn downcast<T: Clone + 'static>(id: &str, payload: Payload) -> Result<T> {
    payload
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| Error::Internal(format!("cached value for '{id}' has an unexpected type")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(delay).await;
                Ok(value.to_string())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_invoke_producer_once() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "paginated", "{}"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let runs = (0..16).map(|_| {
            queue.run(
                &key,
                counting_producer(&calls, "page", Duration::from_millis(50)),
            )
        });
        let results = join_all(runs).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), "page");
        }
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_the_same_failure() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "by_id", "1"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let runs = (0..8).map(|_| {
            let calls = Arc::clone(&calls);
            queue.run(&key, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(30)).await;
                Err::<String, _>(Error::backend("500", "boom"))
            })
        });
        let results = join_all(runs).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap_err(), Error::backend("500", "boom"));
        }
    }

    #[tokio::test]
    async fn test_cached_result_is_reused_within_ttl() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "user", "u1"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = queue
            .run(&key, counting_producer(&calls, "first", Duration::ZERO))
            .await
            .unwrap();
        let second = queue
            .run(&key, counting_producer(&calls, "second", Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(first, "first");
        assert_eq!(second, "first");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_result_is_recomputed() {
        let queue = ExecutionQueue::new(Duration::from_millis(100));
        let key = CacheKey::from(["stories", "search", "fox"]);
        let calls = Arc::new(AtomicUsize::new(0));

        queue
            .run(&key, counting_producer(&calls, "old", Duration::ZERO))
            .await
            .unwrap();

        sleep(Duration::from_millis(150)).await;

        let fresh = queue
            .run(&key, counting_producer(&calls, "new", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(fresh, "new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached_and_slot_is_released() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "by_id", "7"]);

        let failed: Result<String> = queue
            .run(&key, || async { Err(Error::backend("503", "unavailable")) })
            .await;
        assert!(failed.is_err());
        assert_eq!(queue.pending_len().await, 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let retried = queue
            .run(&key, counting_producer(&calls, "story", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(retried, "story");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_prefix_leaves_disjoint_keys() {
        let queue = ExecutionQueue::default();
        let page_one = CacheKey::from(["stories", "paginated", "{\"page\":1}"]);
        let page_two = CacheKey::from(["stories", "paginated", "{\"page\":2}"]);
        let by_id = CacheKey::from(["stories", "by_id", "1"]);
        let calls = Arc::new(AtomicUsize::new(0));

        for key in [&page_one, &page_two, &by_id] {
            queue
                .run(key, counting_producer(&calls, "v1", Duration::ZERO))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        queue.invalidate_by_prefix(&CacheKey::from(["stories", "paginated"]));

        let refreshed = queue
            .run(&page_one, counting_producer(&calls, "v2", Duration::ZERO))
            .await
            .unwrap();
        let refreshed_two = queue
            .run(&page_two, counting_producer(&calls, "v2", Duration::ZERO))
            .await
            .unwrap();
        let untouched = queue
            .run(&by_id, counting_producer(&calls, "v2", Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(refreshed, "v2");
        assert_eq!(refreshed_two, "v2");
        assert_eq!(untouched, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_invalidate_single_key_and_clear_all() {
        let queue = ExecutionQueue::default();
        let a = CacheKey::from(["stories", "by_id", "a"]);
        let b = CacheKey::from(["stories", "by_id", "b"]);
        let calls = Arc::new(AtomicUsize::new(0));

        for key in [&a, &b] {
            queue
                .run(key, counting_producer(&calls, "v1", Duration::ZERO))
                .await
                .unwrap();
        }

        queue.invalidate(&a).await;
        let a_again = queue
            .run(&a, counting_producer(&calls, "v2", Duration::ZERO))
            .await
            .unwrap();
        let b_again = queue
            .run(&b, counting_producer(&calls, "v2", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(a_again, "v2");
        assert_eq!(b_again, "v1");

        queue.clear_all();
        let b_cleared = queue
            .run(&b, counting_producer(&calls, "v3", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(b_cleared, "v3");
    }

    #[tokio::test]
    async fn test_clear_pending_starts_fresh_operation() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "list", "{}"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let queue = queue.clone();
            let key = key.clone();
            let producer = counting_producer(&calls, "slow", Duration::from_millis(100));
            tokio::spawn(async move { queue.run(&key, producer).await })
        };

        sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.pending_len().await, 1);
        queue.clear_pending().await;
        assert_eq!(queue.pending_len().await, 0);

        let fast = queue
            .run(&key, counting_producer(&calls, "fast", Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(fast, "fast");
        assert_eq!(slow.await.unwrap().unwrap(), "slow");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_operation_completes_after_its_only_caller_is_dropped() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "create", "abandoned"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            queue.run(&key, counting_producer(&calls, "done", Duration::from_millis(30))),
        )
        .await;
        assert!(abandoned.is_err());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(queue.pending_len().await, 0);

        let cached = queue
            .run(&key, counting_producer(&calls, "again", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(cached, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_run_coalesces_but_keeps_nothing() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "delete", "9"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let runs = (0..4).map(|_| {
            queue.run_transient(
                &key,
                counting_producer(&calls, "deleted", Duration::from_millis(30)),
            )
        });
        for result in join_all(runs).await {
            assert_eq!(result.unwrap(), "deleted");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        queue
            .run_transient(&key, counting_producer(&calls, "deleted", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_panicking_producer_fails_and_releases_slot() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "by_id", "boom"]);

        let panicked: Result<String> = queue
            .run(&key, || async {
                if std::hint::black_box(true) {
                    panic!("producer exploded");
                }
                Ok(String::new())
            })
            .await;

        assert!(matches!(panicked, Err(Error::Internal(_))));
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_mismatched_type_for_same_key_is_internal_error() {
        let queue = ExecutionQueue::default();
        let key = CacheKey::from(["stories", "stats", "u1"]);

        queue.run(&key, || async { Ok(3u64) }).await.unwrap();
        let wrong: Result<String> = queue
            .run(&key, || async { Ok("three".to_string()) })
            .await;
        assert!(matches!(wrong, Err(Error::Internal(_))));
    }
}
