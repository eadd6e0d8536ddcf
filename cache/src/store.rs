use crate::flight::{InFlight, Settlement};

use core::fmt;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

/// The routing decision for one request, taken under the shard lock.
pub(crate) enum Admission<V, E> {
  /// A completed entry exists.
  Hit(Arc<V>),
  /// An invocation is already running; wait on it.
  Attach(Arc<InFlight<V, E>>),
  /// Nothing exists. The caller registered this handle and must start the
  /// invocation.
  Start(Arc<InFlight<V, E>>),
}

/// Both mappings for the keys that hash to one shard.
///
/// They live behind a single lock so that "is it cached", "is it running" and
/// "start it" form one atomic step, and so that settlement can move a key from
/// `in_flight` to `completed` without a window in between.
pub(crate) struct Shard<K, V, E, H> {
  pub(crate) completed: HashMap<K, Arc<V>, H>,
  pub(crate) in_flight: HashMap<K, Arc<InFlight<V, E>>, H>,
}

impl<K, V, E, H> Shard<K, V, E, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  /// Decides how a request for `key` is served, registering a new in-flight
  /// handle when nothing exists yet.
  pub(crate) fn admit<Q>(&mut self, key: &Q) -> Admission<V, E>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
  {
    if let Some(value) = self.completed.get(key) {
      return Admission::Hit(value.clone());
    }
    if let Some(flight) = self.in_flight.get(key) {
      return Admission::Attach(flight.clone());
    }

    let flight = Arc::new(InFlight::new());
    self.in_flight.insert(key.to_owned(), flight.clone());
    Admission::Start(flight)
  }

  /// Retires the in-flight handle for `key`, recording the value on success.
  ///
  /// Returns `false` if `flight` is not the handle registered for `key`.
  pub(crate) fn retire(&mut self, key: K, flight: &Arc<InFlight<V, E>>, settlement: &Settlement<V, E>) -> bool {
    match self.in_flight.get(&key) {
      Some(current) if Arc::ptr_eq(current, flight) => {}
      _ => return false,
    }
    self.in_flight.remove(&key);

    if let Settlement::Succeeded(value) = settlement {
      self.completed.insert(key, value.clone());
    }
    true
  }
}

/// A store that is partitioned into multiple, independently locked shards.
///
/// Requests for different keys are unlikely to contend for the same lock.
pub(crate) struct ShardedStore<K, V, E, H> {
  shards: Box<[CachePadded<Mutex<Shard<K, V, E, H>>>]>,
  hasher: H,
}

impl<K, V, E, H> fmt::Debug for ShardedStore<K, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V, E, H> ShardedStore<K, V, E, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a new `ShardedStore`. `num_shards` must be a power of two.
  pub(crate) fn new(num_shards: usize, hasher: H) -> Self {
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      let shard = Shard {
        completed: HashMap::with_hasher(hasher.clone()),
        in_flight: HashMap::with_hasher(hasher.clone()),
      };
      shards.push(CachePadded::new(Mutex::new(shard)));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  /// Returns the lock guarding the shard for a given key.
  #[inline]
  pub(crate) fn get_shard<Q>(&self, key: &Q) -> &Mutex<Shard<K, V, E, H>>
  where
    K: Borrow<Q>,
    Q: Hash + ?Sized,
  {
    let hash = self.hasher.hash_one(key);
    // The builder guarantees a power-of-two shard count.
    let index = hash as usize & (self.shards.len() - 1);
    &self.shards[index]
  }

  /// Returns an iterator over all the shard locks.
  pub(crate) fn iter_shards(&self) -> impl Iterator<Item = &Mutex<Shard<K, V, E, H>>> {
    self.shards.iter().map(|padded| &**padded)
  }
}
