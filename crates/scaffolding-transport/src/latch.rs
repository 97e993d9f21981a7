//! Single-resolution completion.

use std::sync::Arc;

use tokio::sync::watch;

/// A value that can be resolved exactly once and awaited by any number of
/// tasks.
///
/// The first call to [`resolve`](Self::resolve) stores the value and wakes
/// every waiter; later calls are no-ops and return `false`. Cloning the
/// latch shares the same slot.
#[derive(Debug)]
pub struct Latch<T> {
    slot: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Latch<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone + Send + Sync> Latch<T> {
    /// Creates an unresolved latch.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Resolves the latch. Returns `true` if this call won.
    pub fn resolve(&self, value: T) -> bool {
        let mut value = Some(value);
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = value.take();
                true
            }
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Returns the stored value without waiting.
    pub fn get(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    /// Waits until the latch is resolved and returns the stored value.
    pub async fn wait(&self) -> T {
        let mut rx = self.slot.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            if rx.changed().await.is_err() {
                // The sender lives in `self`, so this never happens while
                // we are borrowed; park instead of spinning.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl<T: Clone + Send + Sync> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}
