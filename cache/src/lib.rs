//! A concurrent, single-flight result cache for asynchronous keyed
//! computations.
//!
//! A `CoalescingCache` is built around one handler. For any key:
//!
//! - **Memoized**: once the handler succeeds, every later request gets the
//!   same `Arc<V>` without calling the handler again.
//! - **Coalesced**: concurrent requests for a key whose invocation is still
//!   running wait on that invocation instead of starting another one. At most
//!   one invocation per key is ever outstanding.
//! - **Failures are not cached**: a handler error is handed to every waiter of
//!   that invocation, and the next request starts a fresh attempt.
//!
//! Invocations run on a [`TaskSpawner`] (Tokio by default), so they finish
//! even if the request that started them is dropped.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use coalesce_cache::{CacheBuilder, CoalescingCache};
//!
//! let cache: CoalescingCache<String, u64, u64, std::io::Error> =
//!   CacheBuilder::new(|n: u64| async move { Ok(n * 2) }).build()?;
//!
//! let value = cache.request("double-21", 21).await?;
//! assert_eq!(*value, 42);
//! # Ok(())
//! # }
//! ```

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod runtime;

// Internal, crate-only modules
mod flight;
mod handler;
mod shared;
mod store;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use error::{BuildError, RequestError};
pub use handles::CoalescingCache;
pub use metrics::MetricsSnapshot;
pub use runtime::TaskSpawner;

#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
