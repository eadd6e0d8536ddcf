#![allow(dead_code)]

use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use coalesce_cache::{CacheBuilder, CoalescingCache};
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary. Honors `RUST_LOG`.
pub fn init_tracing() {
  TRACING.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

/// A plain error type for handlers under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub String);

impl fmt::Display for TestError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "test error: {}", self.0)
  }
}

impl std::error::Error for TestError {}

pub type CounterCache = CoalescingCache<String, (), usize, TestError>;

/// The classic counter scenario: every invocation bumps a shared counter,
/// waits `delay`, and returns the counter value it produced.
pub fn build_counter_cache(delay: Duration) -> (CounterCache, Arc<AtomicUsize>) {
  let counter = Arc::new(AtomicUsize::new(0));

  let cache = CacheBuilder::new({
    let counter = counter.clone();
    move |_: ()| {
      let counter = counter.clone();
      async move {
        let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(delay).await;
        Ok(value)
      }
    }
  })
  .build()
  .unwrap();

  (cache, counter)
}

pub type GatedCache = CoalescingCache<String, &'static str, String, TestError>;

/// A handler that records the arguments it was invoked with and then blocks
/// until the test adds a permit to the returned gate. Arguments starting with
/// `"fail"` make the invocation fail.
pub fn build_gated_cache() -> (GatedCache, Arc<Semaphore>, Arc<Mutex<Vec<&'static str>>>) {
  let gate = Arc::new(Semaphore::new(0));
  let seen = Arc::new(Mutex::new(Vec::new()));

  let cache = CacheBuilder::new({
    let gate = gate.clone();
    let seen = seen.clone();
    move |arg: &'static str| {
      let gate = gate.clone();
      let seen = seen.clone();
      async move {
        seen.lock().unwrap().push(arg);
        gate.acquire().await.unwrap().forget();
        if arg.starts_with("fail") {
          Err(TestError(arg.to_string()))
        } else {
          Ok(format!("computed from {arg}"))
        }
      }
    }
  })
  .build()
  .unwrap();

  (cache, gate, seen)
}

// A custom hasher that allows us to control which shard a key is assigned to.
// It simply uses the integer value of the key as its hash.
// For a 4-shard cache:
// - key 0 -> shard 0 (0 & 3 = 0)
// - key 1 -> shard 1 (1 & 3 = 1)
// - key 5 -> shard 1 (5 & 3 = 1)
#[derive(Clone, Default)]
pub struct ShardControllingHasher;
impl BuildHasher for ShardControllingHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher(0)
  }
}
pub struct TestHasher(u64);
impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    self.0
  }
  fn write(&mut self, _: &[u8]) {
    unimplemented!()
  }
  fn write_i32(&mut self, i: i32) {
    self.0 = i as u64;
  }
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
  let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
  while !condition() {
    assert!(
      tokio::time::Instant::now() < deadline,
      "condition not reached within 5s"
    );
    sleep(Duration::from_millis(2)).await;
  }
}

/// The blocking counterpart of `wait_until`, for tests without a runtime
/// context on the current thread.
pub fn wait_until_blocking(mut condition: impl FnMut() -> bool) {
  let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
  while !condition() {
    assert!(
      std::time::Instant::now() < deadline,
      "condition not reached within 5s"
    );
    std::thread::sleep(std::time::Duration::from_millis(2));
  }
}
