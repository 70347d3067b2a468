//! [`ShutdownEvent`] – the cooperative cancellation signal shared by every
//! worker of a node.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A one-way latch: once set it stays set.
///
/// Clones share the same latch.  Workers poll [`is_set`][Self::is_set]
/// between units of work or park on [`wait_timeout`][Self::wait_timeout].
#[derive(Clone, Debug, Default)]
pub struct ShutdownEvent {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch and wake every waiter.
    pub fn set(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the latch is set or `timeout` elapses.
    ///
    /// Returns whether the latch is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut set = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*set {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            set = condvar
                .wait_timeout(set, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        *set
    }
}
