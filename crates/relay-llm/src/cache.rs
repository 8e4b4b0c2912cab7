//! Single-flight coalescing of concurrent cache refreshes

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

/// Per-key registry of in-flight computations
///
/// The first caller for a key starts the computation; callers arriving while
/// it runs await the same shared future instead of starting their own. The
/// entry is removed when the computation completes, so the future should
/// write its own result to any cache before returning.
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
{
    inflight: Arc<DashMap<K, Flight<V>>>,
    generation: AtomicU64,
}

struct Flight<V> {
    generation: u64,
    future: Shared<BoxFuture<'static, V>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Empty registry
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `make` for `key` unless a computation for it is already running
    ///
    /// `make` is only called by the caller that starts the computation.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.run_unless(key, || None, make).await
    }

    /// Like [`run`](Self::run), but consult `lookup` before starting
    ///
    /// `lookup` runs while the key's slot is held, so a result stored by a
    /// computation that finished after the caller's own cache check is still
    /// seen and no second computation starts.
    pub async fn run_unless<L, F, Fut>(&self, key: K, lookup: L, make: F) -> V
    where
        L: FnOnce() -> Option<V> + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!("joining in-flight computation");
                entry.get().future.clone()
            }
            Entry::Vacant(entry) => {
                if let Some(value) = lookup() {
                    return value;
                }

                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let inflight = Arc::clone(&self.inflight);
                let work = make();
                let future = async move {
                    let value = work.await;
                    // A cleared registry may already hold a newer computation
                    inflight.remove_if(&key, |_, flight| flight.generation == generation);
                    value
                }
                .boxed()
                .shared();
                entry.insert(Flight {
                    generation,
                    future: future.clone(),
                });
                future
            }
        };

        shared.await
    }

    /// Number of computations currently running
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Forget every in-flight computation (running ones still complete)
    pub fn clear(&self) {
        self.inflight.clear();
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
