mod common;

use coalesce_cache::{CacheBuilder, CoalescingCache, TaskSpawner, TokioSpawner};
use common::{build_gated_cache, init_tracing, wait_until, ShardControllingHasher, TestError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_the_initiator_does_not_cancel_the_invocation() {
  init_tracing();
  let (cache, gate, seen) = build_gated_cache();

  let initiator = tokio::spawn({
    let cache = cache.clone();
    async move { cache.request("k", "a").await }
  });
  wait_until(|| !seen.lock().unwrap().is_empty()).await;

  initiator.abort();
  assert!(initiator.await.unwrap_err().is_cancelled());
  assert!(cache.is_in_flight("k"), "Invocation should outlive its caller");

  gate.add_permits(1);
  wait_until(|| cache.contains_key("k")).await;

  let value = cache.request("k", "ignored").await.unwrap();
  assert_eq!(*value, "computed from a");
  assert_eq!(cache.metrics().invocations, 1);
  assert_eq!(cache.in_flight_count(), 0);
}

#[tokio::test]
async fn test_observers_never_invoke_the_handler() {
  init_tracing();
  let (cache, gate, seen) = build_gated_cache();

  assert!(cache.get("k").is_none());
  assert!(!cache.contains_key("k"));
  assert!(!cache.is_in_flight("k"));
  assert!(cache.is_empty());
  assert_eq!(cache.in_flight_count(), 0);
  assert!(seen.lock().unwrap().is_empty());
  assert_eq!(cache.metrics().requests, 0);

  gate.add_permits(1);
  cache.request("k", "a").await.unwrap();
  assert_eq!(cache.len(), 1);
  assert_eq!(*cache.get("k").unwrap(), "computed from a");
  assert_eq!(cache.metrics().requests, 1);
}

struct CountingSpawner {
  inner: TokioSpawner,
  spawned: Arc<AtomicUsize>,
}

impl TaskSpawner for CountingSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    self.spawned.fetch_add(1, Ordering::SeqCst);
    self.inner.spawn(future);
  }
}

#[tokio::test]
async fn test_custom_spawner_runs_every_invocation() {
  init_tracing();
  let spawned = Arc::new(AtomicUsize::new(0));

  let cache: CoalescingCache<i32, i32, i32, TestError> =
    CacheBuilder::new(|arg: i32| async move { Ok(arg + 1) })
      .spawner(Arc::new(CountingSpawner {
        inner: TokioSpawner::from_handle(tokio::runtime::Handle::current()),
        spawned: spawned.clone(),
      }))
      .build()
      .unwrap();

  for key in 0..3 {
    assert_eq!(*cache.request(&key, key).await.unwrap(), key + 1);
    assert_eq!(*cache.request(&key, 100).await.unwrap(), key + 1);
  }

  assert_eq!(spawned.load(Ordering::SeqCst), 3);
  assert_eq!(cache.metrics().invocations, 3);
  assert_eq!(cache.metrics().hits, 3);
}

#[tokio::test]
async fn test_custom_hasher_keys_in_one_shard_stay_isolated() {
  init_tracing();

  // Keys 1 and 5 land in the same shard of a 4-shard cache.
  let cache: CoalescingCache<i32, i32, i32, TestError, ShardControllingHasher> =
    CacheBuilder::new(|arg: i32| async move { Ok(arg * 2) })
      .hasher(ShardControllingHasher)
      .shards(4)
      .build()
      .unwrap();

  let (one, five) = tokio::join!(cache.request(&1, 1), cache.request(&5, 5));
  assert_eq!(*one.unwrap(), 2);
  assert_eq!(*five.unwrap(), 10);

  assert_eq!(cache.metrics().invocations, 2);
  assert_eq!(cache.metrics().coalesced, 0);
  assert_eq!(cache.len(), 2);
  assert!(cache.contains_key(&1));
  assert!(cache.contains_key(&5));
  assert!(!cache.contains_key(&9));
}
