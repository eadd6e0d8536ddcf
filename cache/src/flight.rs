use crate::error::RequestError;

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// Represents a waiter in the queue for an `InFlight`.
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// The outcome of one handler invocation, shared by every waiter.
pub(crate) enum Settlement<V, E> {
  Succeeded(Arc<V>),
  Failed(Arc<E>),
  /// The invocation task went away without producing an outcome.
  Abandoned,
}

impl<V, E> Settlement<V, E> {
  pub(crate) fn into_result(self) -> Result<Arc<V>, RequestError<E>> {
    match self {
      Settlement::Succeeded(value) => Ok(value),
      Settlement::Failed(err) => Err(RequestError::Handler(err)),
      Settlement::Abandoned => Err(RequestError::Abandoned),
    }
  }
}

impl<V, E> Clone for Settlement<V, E> {
  fn clone(&self) -> Self {
    match self {
      Settlement::Succeeded(value) => Settlement::Succeeded(Arc::clone(value)),
      Settlement::Failed(err) => Settlement::Failed(Arc::clone(err)),
      Settlement::Abandoned => Settlement::Abandoned,
    }
  }
}

enum State<V, E> {
  Pending,
  Settled(Settlement<V, E>),
}

/// The internal, mutex-protected core of an `InFlight`.
struct Inner<V, E> {
  state: State<V, E>,
  /// Entries are only appended until settlement drains them, so an index
  /// handed out to a `Wait` stays valid while the state is pending.
  waiters: Vec<Waiter>,
}

/// A settle-once handle for a running handler invocation.
///
/// Any number of async tasks and blocked threads may wait on it. The first
/// call to `settle` stores the outcome and drains the waiter queue; every
/// waiter, including ones arriving later, observes a clone of that outcome.
pub(crate) struct InFlight<V, E> {
  inner: Mutex<Inner<V, E>>,
}

impl<V, E> InFlight<V, E> {
  /// Creates a new `InFlight` in the pending state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Pending,
        waiters: Vec::new(),
      }),
    }
  }

  /// Stores the outcome and wakes all waiters.
  ///
  /// Returns `false` and leaves the stored outcome untouched if the handle
  /// was already settled.
  pub(crate) fn settle(&self, settlement: Settlement<V, E>) -> bool {
    let waiters = {
      let mut inner = self.inner.lock();
      if let State::Settled(_) = inner.state {
        return false;
      }
      inner.state = State::Settled(settlement);
      std::mem::take(&mut inner.waiters)
    };

    // Wake outside the lock so woken tasks don't immediately contend on it.
    for waiter in waiters {
      waiter.wake();
    }
    true
  }

  /// Returns a future resolving to the outcome once settled.
  pub(crate) fn wait(&self) -> Wait<'_, V, E> {
    Wait {
      flight: self,
      slot: None,
    }
  }

  /// Parks the current thread until the handle is settled.
  pub(crate) fn wait_blocking(&self) -> Settlement<V, E> {
    {
      let mut inner = self.inner.lock();
      if let State::Settled(settlement) = &inner.state {
        return settlement.clone();
      }
      inner.waiters.push(Waiter::Sync(thread::current()));
    }

    // The thread stays queued until settlement, so a spurious wakeup only
    // needs to park again.
    loop {
      thread::park();
      if let State::Settled(settlement) = &self.inner.lock().state {
        return settlement.clone();
      }
    }
  }

  #[cfg(test)]
  fn waiter_count(&self) -> usize {
    self.inner.lock().waiters.len()
  }
}

/// The future returned by `InFlight::wait()`.
#[must_use = "futures do nothing unless you .await or poll them"]
pub(crate) struct Wait<'a, V, E> {
  flight: &'a InFlight<V, E>,
  /// Index of this future's waker in the waiter queue, once registered.
  slot: Option<usize>,
}

impl<'a, V, E> Future for Wait<'a, V, E> {
  type Output = Settlement<V, E>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    let mut inner = this.flight.inner.lock();
    if let State::Settled(settlement) = &inner.state {
      return Poll::Ready(settlement.clone());
    }

    match this.slot {
      Some(index) => {
        if let Some(Waiter::Async(waker)) = inner.waiters.get_mut(index) {
          if !waker.will_wake(cx.waker()) {
            *waker = cx.waker().clone();
          }
        }
      }
      None => {
        this.slot = Some(inner.waiters.len());
        inner.waiters.push(Waiter::Async(cx.waker().clone()));
      }
    }
    Poll::Pending
  }
}
