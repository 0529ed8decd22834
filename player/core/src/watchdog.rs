//! Single-Shot Re-armable Timer
//!
//! A `Watchdog` holds at most one pending deadline. Arming replaces whatever
//! was pending; clearing cancels it. Only the most recent arm can fire, and
//! it fires at most once.
//!
//! Each surface owns two: the stall watchdog (loading that never progresses)
//! and the inactivity timer that hides the controls.
//!
//! Timers run on the tokio clock, so tests drive them with a paused runtime
//! and `tokio::time::advance`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Pending {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

struct Inner {
    name: &'static str,
    pending: Mutex<Option<Pending>>,
    generation: AtomicU64,
}

/// Single-shot timer; cloning shares the same slot
#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

impl Watchdog {
    /// Create an unarmed timer; `name` only appears in logs
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Cancel any pending deadline and start a new one
    ///
    /// `on_expire` runs once, after the slot has been cleared, unless the
    /// timer is cleared or re-armed first. Must be called inside a tokio
    /// runtime.
    pub fn arm<F>(&self, duration: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let deadline = Instant::now() + duration;

        // Held across spawn so the task cannot observe the slot before it is filled
        let mut pending = self.inner.pending.lock();
        if let Some(previous) = pending.take() {
            previous.task.abort();
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let fired = {
                let mut slot = inner.pending.lock();
                match slot.as_ref() {
                    Some(p) if p.generation == generation => {
                        slot.take();
                        true
                    }
                    _ => false,
                }
            };
            if fired {
                tracing::debug!(timer = inner.name, "Timer expired");
                on_expire();
            }
        });

        *pending = Some(Pending {
            generation,
            deadline,
            task,
        });
        tracing::trace!(timer = self.inner.name, ?duration, "Timer armed");
    }

    /// Cancel the pending deadline without firing
    ///
    /// Returns whether anything was pending.
    pub fn clear(&self) -> bool {
        match self.inner.pending.lock().take() {
            Some(p) => {
                p.task.abort();
                tracing::trace!(timer = self.inner.name, "Timer cleared");
                true
            }
            None => false,
        }
    }

    /// Whether a deadline is pending
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Time left before the pending deadline
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .pending
            .lock()
            .as_ref()
            .map(|p| p.deadline.saturating_duration_since(Instant::now()))
    }
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("name", &self.inner.name)
            .field("armed", &self.is_armed())
            .finish()
    }
}
