//! Single-flight guard for an asynchronous critical section.
//!
//! At most one operation is pending per [`SingleFlight`]. Callers arriving
//! while it runs receive a clone of the same [`Shared`] future and observe
//! the same output. The operation runs as its own task, so it settles and
//! clears the marker even when every caller has stopped waiting.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::task::JoinError;

/// Handle to a pending (or settled) operation.
pub type Flight<T> = Shared<BoxFuture<'static, T>>;

/// Whether the caller started the operation or joined an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

struct Slot<T: Clone> {
    generation: u64,
    flight: Option<Flight<T>>,
}

pub struct SingleFlight<T: Clone> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                flight: None,
            })),
        }
    }

    /// Join the pending operation, or spawn the one built by `start`.
    ///
    /// `start` runs under the marker lock, so it must only construct the
    /// future, not poll it. `on_abort` turns a panicked or cancelled task
    /// into the output handed to the waiters.
    ///
    /// Must be called from within a tokio runtime.
    pub fn acquire_or_join<F, Fut, A>(&self, start: F, on_abort: A) -> (Flight<T>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        A: FnOnce(JoinError) -> T + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(flight) = slot.flight.as_ref() {
            return (flight.clone(), Role::Follower);
        }

        slot.generation += 1;
        let guard = ClearOnExit {
            slot: Arc::clone(&self.slot),
            generation: slot.generation,
        };
        let operation = start();
        let task = tokio::spawn(async move {
            let _guard = guard;
            operation.await
        });
        let flight = async move { task.await.unwrap_or_else(on_abort) }
            .boxed()
            .shared();

        slot.flight = Some(flight.clone());
        (flight, Role::Leader)
    }

    /// Whether an operation is currently pending.
    pub fn in_flight(&self) -> bool {
        self.slot.lock().flight.is_some()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the marker for its own generation only.
struct ClearOnExit<T: Clone> {
    slot: Arc<Mutex<Slot<T>>>,
    generation: u64,
}

impl<T: Clone> Drop for ClearOnExit<T> {
    fn drop(&mut self) {
        let stale = {
            let mut slot = self.slot.lock();
            if slot.generation == self.generation {
                slot.flight.take()
            } else {
                None
            }
        };
        drop(stale);
    }
}
