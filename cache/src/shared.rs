use crate::flight::{InFlight, Settlement};
use crate::handler::Handler;
use crate::metrics::Metrics;
use crate::store::{Admission, ShardedStore};
use crate::TaskSpawner;

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Where a request goes after admission.
pub(crate) enum Route<V, E> {
  /// Served from a completed entry, no suspension needed.
  Ready(Arc<V>),
  /// Suspend on this invocation, either started by this request or attached.
  Wait(Arc<InFlight<V, E>>),
}

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K, A, V, E, H> {
  pub(crate) store: ShardedStore<K, V, E, H>,
  pub(crate) metrics: Metrics,
  pub(crate) handler: Handler<A, V, E>,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
}

impl<K, A, V, E, H> fmt::Debug for CacheShared<K, A, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("store", &self.store)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, A, V, E, H> CacheShared<K, A, V, E, H>
where
  K: Eq + Hash + Send + Sync + 'static,
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Routes one request. The shard lock is held only for the admission
  /// decision and is released before the handler is called.
  pub(crate) fn route<Q>(shared: &Arc<Self>, key: &Q, args: A) -> Route<V, E>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
  {
    let admission = shared.store.get_shard(key).lock().admit(key);

    match admission {
      Admission::Hit(value) => {
        shared.metrics.hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("coalesce cache hit");
        Route::Ready(value)
      }
      Admission::Attach(flight) => {
        shared.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("attached to in-flight invocation");
        Route::Wait(flight)
      }
      Admission::Start(flight) => {
        // We are the "leader". This is the ONLY path that invokes the handler.
        shared.metrics.invocations.fetch_add(1, Ordering::Relaxed);
        Self::spawn_invocation(shared, key.to_owned(), args, flight.clone());
        Route::Wait(flight)
      }
    }
  }

  /// Starts the handler for a freshly registered in-flight handle and hands
  /// the resulting future to the spawner.
  fn spawn_invocation(shared: &Arc<Self>, key: K, args: A, flight: Arc<InFlight<V, E>>) {
    // Armed before the handler is called, so a panic in the handler itself
    // still retires the in-flight entry.
    let mut guard = SettleGuard {
      shared: Arc::clone(shared),
      pending: Some((key, flight)),
    };

    tracing::debug!("starting handler invocation");
    let invocation = shared.handler.invoke(args);

    let task = async move {
      let settlement = match invocation.await {
        Ok(value) => Settlement::Succeeded(Arc::new(value)),
        Err(err) => Settlement::Failed(Arc::new(err)),
      };
      guard.settle(settlement);
    };
    shared.spawner.spawn(Box::pin(task));
  }

  /// Retires the in-flight entry and then wakes every waiter.
  ///
  /// The completed entry (on success) and the removal of the in-flight entry
  /// happen under one shard lock acquisition.
  fn settle(&self, key: K, flight: &Arc<InFlight<V, E>>, settlement: Settlement<V, E>) {
    let retired = self
      .store
      .get_shard(&key)
      .lock()
      .retire(key, flight, &settlement);
    debug_assert!(retired, "in-flight entry was retired twice");

    match &settlement {
      Settlement::Succeeded(_) => {
        self.metrics.successes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("handler invocation succeeded");
      }
      Settlement::Failed(_) => {
        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("handler invocation failed, result not cached");
      }
      Settlement::Abandoned => {
        self.metrics.abandoned.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("handler invocation abandoned before settling");
      }
    }

    flight.settle(settlement);
  }

  pub(crate) fn completed_len(&self) -> usize {
    self.store.iter_shards().map(|shard| shard.lock().completed.len()).sum()
  }

  pub(crate) fn in_flight_len(&self) -> usize {
    self.store.iter_shards().map(|shard| shard.lock().in_flight.len()).sum()
  }
}

/// Owned by the spawned invocation task. Settles the invocation exactly once:
/// explicitly with the handler's outcome, or as `Abandoned` when the task is
/// dropped (or unwinds) before that happens.
struct SettleGuard<K, A, V, E, H>
where
  K: Eq + Hash + Send + Sync + 'static,
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  shared: Arc<CacheShared<K, A, V, E, H>>,
  pending: Option<(K, Arc<InFlight<V, E>>)>,
}

impl<K, A, V, E, H> SettleGuard<K, A, V, E, H>
where
  K: Eq + Hash + Send + Sync + 'static,
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn settle(&mut self, settlement: Settlement<V, E>) {
    if let Some((key, flight)) = self.pending.take() {
      self.shared.settle(key, &flight, settlement);
    }
  }
}

impl<K, A, V, E, H> Drop for SettleGuard<K, A, V, E, H>
where
  K: Eq + Hash + Send + Sync + 'static,
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn drop(&mut self) {
    self.settle(Settlement::Abandoned);
  }
}
