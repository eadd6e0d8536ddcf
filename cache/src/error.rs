use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The cache was configured with zero shards, which is not allowed.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// No `TaskSpawner` was configured and none could be derived, either
  /// because the `tokio` feature is disabled or because `build()` was called
  /// outside of a Tokio runtime.
  #[error("a coalescing cache requires a task spawner or a running Tokio runtime")]
  SpawnerRequired,
}

/// The error returned to every caller attached to a failed invocation.
///
/// Failures are never cached. After a `RequestError` the key has no entry of
/// any kind and the next request starts a fresh invocation.
#[derive(Error)]
pub enum RequestError<E> {
  /// The handler returned an error. Every waiter of the invocation receives
  /// the same `Arc`.
  #[error("handler failed: {0}")]
  Handler(Arc<E>),
  /// The invocation task ended without producing an outcome, because the
  /// handler panicked or the runtime dropped the task.
  #[error("handler invocation was abandoned before it settled")]
  Abandoned,
}

impl<E> RequestError<E> {
  /// Returns `true` if the handler itself reported the failure.
  pub fn is_handler(&self) -> bool {
    matches!(self, RequestError::Handler(_))
  }

  /// Returns `true` if the invocation vanished without an outcome.
  pub fn is_abandoned(&self) -> bool {
    matches!(self, RequestError::Abandoned)
  }

  /// Borrows the handler's error, if there is one.
  pub fn handler_error(&self) -> Option<&E> {
    match self {
      RequestError::Handler(err) => Some(err),
      RequestError::Abandoned => None,
    }
  }

  /// Returns the shared handler error, if there is one.
  pub fn into_handler_error(self) -> Option<Arc<E>> {
    match self {
      RequestError::Handler(err) => Some(err),
      RequestError::Abandoned => None,
    }
  }
}

// Manual impls so that `E` needs neither `Clone` nor `Debug` for the error
// itself to be cloneable and printable through `Arc`.
impl<E> Clone for RequestError<E> {
  fn clone(&self) -> Self {
    match self {
      RequestError::Handler(err) => RequestError::Handler(Arc::clone(err)),
      RequestError::Abandoned => RequestError::Abandoned,
    }
  }
}

impl<E: fmt::Debug> fmt::Debug for RequestError<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RequestError::Handler(err) => f.debug_tuple("Handler").field(err).finish(),
      RequestError::Abandoned => f.write_str("Abandoned"),
    }
  }
}
