//! Short-lived, single-flight cache for expensive read models.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry<T> {
    value: Arc<T>,
    loaded_at: Instant,
    generation: u64,
}

/// Caches one value for `ttl`.
///
/// Concurrent callers that miss share a single load: the first caller loads
/// while holding the slot, the others wait on it and read the fresh value.
/// [`TtlCache::invalidate`] never waits; a load that was already running when
/// the cache was invalidated is stored but not served.
///
/// Load errors are not cached.
pub struct TtlCache<T> {
    name: &'static str,
    ttl: Duration,
    generation: AtomicU64,
    slot: Mutex<Option<Entry<T>>>,
}

impl<T> TtlCache<T> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            generation: AtomicU64::new(0),
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Marks the cached value stale.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the cached value, loading it with `load` if missing or stale.
    pub async fn get_or_load<F, Fut, E>(&self, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(entry) = slot.as_ref()
            && entry.generation == generation
            && entry.loaded_at.elapsed() < self.ttl
        {
            return Ok(Arc::clone(&entry.value));
        }

        metrics::counter!("catalog_cache_refreshes_total", "cache" => self.name).increment(1);
        let value = Arc::new(load().await?);
        *slot = Some(Entry {
            value: Arc::clone(&value),
            loaded_at: Instant::now(),
            generation,
        });
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_load() {
        let cache = Arc::new(TtlCache::new("test", Duration::from_secs(2)));
        let loads = Arc::new(AtomicUsize::new(0));

        let callers: Vec<_> = (0..20)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                tokio::spawn(async move {
                    cache
                        .get_or_load(move || async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok::<_, ()>(42)
                        })
                        .await
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(*caller.await.unwrap().unwrap(), 42);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn value_expires_after_ttl() {
        let cache = TtlCache::new("test", Duration::from_secs(2));
        assert_eq!(*cache.get_or_load(|| async { Ok::<_, ()>(1) }).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(*cache.get_or_load(|| async { Ok::<_, ()>(99) }).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(*cache.get_or_load(|| async { Ok::<_, ()>(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.get_or_load(|| async { Ok::<_, ()>(1) }).await.unwrap();

        cache.invalidate();
        assert_eq!(*cache.get_or_load(|| async { Ok::<_, ()>(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::from_secs(60));
        assert!(cache.get_or_load(|| async { Err("down") }).await.is_err());
        assert_eq!(*cache.get_or_load(|| async { Ok::<_, &str>(7) }).await.unwrap(), 7);
    }
}
