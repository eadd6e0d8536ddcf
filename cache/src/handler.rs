use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// The type-erased handler stored in `CacheShared`.
///
/// The user's closure is boxed once at build time. Each invocation produces a
/// boxed, `Send` future so it can be handed to any `TaskSpawner`.
pub(crate) struct Handler<A, V, E> {
  f: Arc<dyn Fn(A) -> BoxFuture<'static, Result<V, E>> + Send + Sync>,
}

impl<A, V, E> Handler<A, V, E> {
  pub(crate) fn new<F, Fut>(f: F) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    Self {
      f: Arc::new(move |args| f(args).boxed()),
    }
  }

  /// Starts one invocation. The returned future has not been polled yet.
  pub(crate) fn invoke(&self, args: A) -> BoxFuture<'static, Result<V, E>> {
    (self.f)(args)
  }
}
