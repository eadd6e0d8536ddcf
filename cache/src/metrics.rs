use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Request routing ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) coalesced: CachePadded<AtomicU64>,
  pub(crate) invocations: CachePadded<AtomicU64>,

  // --- Settlements ---
  pub(crate) successes: CachePadded<AtomicU64>,
  pub(crate) failures: CachePadded<AtomicU64>,
  pub(crate) abandoned: CachePadded<AtomicU64>,

  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      coalesced: CachePadded::new(AtomicU64::new(0)),
      invocations: CachePadded::new(AtomicU64::new(0)),
      successes: CachePadded::new(AtomicU64::new(0)),
      failures: CachePadded::new(AtomicU64::new(0)),
      abandoned: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let coalesced = self.coalesced.load(Ordering::Relaxed);
    let invocations = self.invocations.load(Ordering::Relaxed);
    let requests = hits + coalesced + invocations;

    MetricsSnapshot {
      requests,
      hits,
      coalesced,
      invocations,
      hit_ratio: if requests == 0 {
        0.0
      } else {
        (hits + coalesced) as f64 / requests as f64
      },
      successes: self.successes.load(Ordering::Relaxed),
      failures: self.failures.load(Ordering::Relaxed),
      abandoned: self.abandoned.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// The total number of `request` / `request_blocking` calls.
  pub requests: u64,
  /// Requests answered from a completed entry.
  pub hits: u64,
  /// Requests that attached to an invocation already in flight.
  pub coalesced: u64,
  /// Requests that started a new handler invocation.
  pub invocations: u64,
  /// The fraction of requests served without starting an invocation.
  pub hit_ratio: f64,
  /// Invocations that settled with a value.
  pub successes: u64,
  /// Invocations whose handler returned an error.
  pub failures: u64,
  /// Invocations that ended without an outcome (panic or dropped task).
  pub abandoned: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl MetricsSnapshot {
  /// Invocations that have started but not yet settled.
  pub fn outstanding(&self) -> u64 {
    self
      .invocations
      .saturating_sub(self.successes + self.failures + self.abandoned)
  }
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("requests", &self.requests)
      .field("hits", &self.hits)
      .field("coalesced", &self.coalesced)
      .field("invocations", &self.invocations)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("successes", &self.successes)
      .field("failures", &self.failures)
      .field("abandoned", &self.abandoned)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
