use crate::error::RequestError;
use crate::metrics::MetricsSnapshot;
use crate::shared::{CacheShared, Route};

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// A thread-safe, coalescing result cache.
///
/// Cloning the handle is cheap and every clone shares the same state.
pub struct CoalescingCache<K, A, V, E, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, A, V, E, H>>,
}

impl<K, A, V, E, H> Clone for CoalescingCache<K, A, V, E, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<K, A, V, E, H> fmt::Debug for CoalescingCache<K, A, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CoalescingCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<K, A, V, E, H> CoalescingCache<K, A, V, E, H>
where
  K: Eq + Hash + Send + Sync + 'static,
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Returns the result for `key`, running the handler with `args` only if
  /// no result is cached and no invocation is already running.
  ///
  /// - A cached success is returned immediately without suspending.
  /// - If an invocation for `key` is in flight, this call waits for it and
  ///   receives the same outcome as every other waiter. `args` is dropped
  ///   unused in that case: all callers of one invocation get the result
  ///   computed from the first caller's arguments.
  /// - Otherwise a new invocation is started on the configured spawner.
  ///
  /// Successes are cached forever. Failures are returned to every waiter of
  /// the invocation and are not cached; the next call retries from scratch.
  ///
  /// Dropping the returned future does not cancel the invocation.
  pub async fn request<Q>(&self, key: &Q, args: A) -> Result<Arc<V>, RequestError<E>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
  {
    match CacheShared::route(&self.shared, key, args) {
      Route::Ready(value) => Ok(value),
      Route::Wait(flight) => flight.wait().await.into_result(),
    }
  }

  /// The blocking counterpart of [`request`](Self::request).
  ///
  /// The handler still runs on the configured spawner; only the calling
  /// thread is parked. Do not call this from a worker thread of the runtime
  /// that drives the spawner, as the invocation may then never be polled.
  pub fn request_blocking<Q>(&self, key: &Q, args: A) -> Result<Arc<V>, RequestError<E>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
  {
    match CacheShared::route(&self.shared, key, args) {
      Route::Ready(value) => Ok(value),
      Route::Wait(flight) => flight.wait_blocking().into_result(),
    }
  }

  /// Returns the cached value for `key` without ever invoking the handler.
  pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let shard = self.shared.store.get_shard(key).lock();
    shard.completed.get(key).cloned()
  }

  /// Returns `true` if a successful result is cached for `key`.
  pub fn contains_key<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.store.get_shard(key).lock().completed.contains_key(key)
  }

  /// Returns `true` if a handler invocation for `key` is currently running.
  pub fn is_in_flight<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.store.get_shard(key).lock().in_flight.contains_key(key)
  }

  /// The number of cached results.
  pub fn len(&self) -> usize {
    self.shared.completed_len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The number of handler invocations currently running.
  pub fn in_flight_count(&self) -> usize {
    self.shared.in_flight_len()
  }

  /// Returns a snapshot of the cache's metrics.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }
}
