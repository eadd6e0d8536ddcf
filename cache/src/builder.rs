use crate::error::BuildError;
use crate::handler::Handler;
use crate::handles::CoalescingCache;
use crate::metrics::Metrics;
use crate::shared::CacheShared;
use crate::store::ShardedStore;
use crate::TaskSpawner;

use core::fmt;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;

/// A builder for creating `CoalescingCache` instances.
///
/// The handler is fixed at construction; everything else is optional.
pub struct CacheBuilder<K, A, V, E, H = ahash::RandomState> {
  shards: usize,
  hasher: H,
  handler: Handler<A, V, E>,
  spawner: Option<Arc<dyn TaskSpawner>>,
  _key_marker: PhantomData<K>,
}

// Manual Debug implementation for CacheBuilder.
impl<K, A, V, E, H> fmt::Debug for CacheBuilder<K, A, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("shards", &self.shards)
      .field("has_spawner", &self.spawner.is_some())
      .finish_non_exhaustive()
  }
}

fn default_shards() -> usize {
  (num_cpus::get() * 4).max(1).next_power_of_two()
}

// --- Constructors ---
impl<K, A, V, E> CacheBuilder<K, A, V, E, ahash::RandomState> {
  /// Creates a new `CacheBuilder` around `handler` with default settings.
  ///
  /// The handler receives the arguments of the request that started the
  /// invocation and produces the value, or an error that is passed to every
  /// waiter and not cached.
  pub fn new<F, Fut>(handler: F) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    Self::with_hasher(handler, ahash::RandomState::new())
  }
}

impl<K, A, V, E, H> CacheBuilder<K, A, V, E, H> {
  /// Creates a new `CacheBuilder` with a custom hasher.
  pub fn with_hasher<F, Fut>(handler: F, hasher: H) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    Self {
      shards: default_shards(),
      hasher,
      handler: Handler::new(handler),
      spawner: None,
      _key_marker: PhantomData,
    }
  }

  /// Sets the number of independently locked shards.
  ///
  /// Rounded up to the next power of two. Zero is rejected by `build()`.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = if shards == 0 { 0 } else { shards.next_power_of_two() };
    self
  }

  /// Replaces the hasher used for shard selection and both key mappings.
  pub fn hasher<H2>(self, hasher: H2) -> CacheBuilder<K, A, V, E, H2> {
    CacheBuilder {
      shards: self.shards,
      hasher,
      handler: self.handler,
      spawner: self.spawner,
      _key_marker: PhantomData,
    }
  }

  /// Sets the spawner that runs handler invocations.
  ///
  /// With the default `tokio` feature, the current Tokio runtime is used when
  /// no spawner is given.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }
}

// --- Build Methods ---
impl<K, A, V, E, H> CacheBuilder<K, A, V, E, H>
where
  K: Eq + Hash + Send + Sync + 'static,
  A: Send + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds a `CoalescingCache`.
  pub fn build(mut self) -> Result<CoalescingCache<K, A, V, E, H>, BuildError> {
    self.validate()?;
    let spawner = self.resolve_spawner()?;

    let shared = CacheShared {
      store: ShardedStore::new(self.shards, self.hasher),
      metrics: Metrics::new(),
      handler: self.handler,
      spawner,
    };
    tracing::debug!(shards = self.shards, "built coalescing cache");

    Ok(CoalescingCache {
      shared: Arc::new(shared),
    })
  }

  fn resolve_spawner(&mut self) -> Result<Arc<dyn TaskSpawner>, BuildError> {
    if let Some(spawner) = self.spawner.take() {
      return Ok(spawner);
    }

    #[cfg(feature = "tokio")]
    {
      if let Some(spawner) = crate::runtime::TokioSpawner::try_current() {
        return Ok(Arc::new(spawner));
      }
    }

    Err(BuildError::SpawnerRequired)
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    Ok(())
  }
}
