//! Frame Update Scheduler
//!
//! Runs one continuous refresh loop per playing surface. A loop starts when
//! playback enters `playing` and stops on its own at the first tick that
//! finds playback elsewhere or its scheduled flag cleared, so a stopped loop
//! costs at most one extra no-op tick.
//!
//! ```text
//!   playback -> playing          start(id)     spawn loop, flag = true
//!                                     │
//!                 ┌───────────────────▼──────────────────┐
//!                 │ tick every frame_interval            │
//!                 │   flag cleared or not playing? exit  │
//!                 │   else render_frame()                │
//!                 └───────────────────┬──────────────────┘
//!   playback -> anything else    stop(id)      flag = false
//!   destroy                      cancel(id)    abort + remove
//! ```
//!
//! Every loop carries its own flag. A `stop` followed quickly by a `start`
//! therefore spawns a fresh loop while the old one drains; the two never
//! both render because the old one observes its own cleared flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::instance::SurfaceId;

/// Something the frame loop refreshes
pub trait FrameTarget: Send + Sync {
    /// Whether the loop should keep running
    fn is_playing(&self) -> bool;

    /// Refresh the continuously moving parts of the UI
    fn render_frame(&self);
}

struct LoopSlot {
    generation: u64,
    scheduled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl LoopSlot {
    fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }
}

struct Inner {
    frame_interval: Duration,
    loops: DashMap<SurfaceId, LoopSlot>,
    next_generation: AtomicU64,
    loops_started: AtomicU64,
    frames_rendered: AtomicU64,
}

/// Counters for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Loops currently scheduled
    pub active_loops: usize,
    /// Loops spawned since creation
    pub loops_started: u64,
    /// Frames rendered across all loops
    pub frames_rendered: u64,
}

/// Per-surface frame loops, keyed by identity
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<Inner>,
}

impl UpdateScheduler {
    /// Scheduler ticking every `frame_interval`
    #[must_use]
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                frame_interval,
                loops: DashMap::new(),
                next_generation: AtomicU64::new(1),
                loops_started: AtomicU64::new(0),
                frames_rendered: AtomicU64::new(0),
            }),
        }
    }

    /// Start a loop for `id` unless one is already scheduled
    ///
    /// Returns whether a loop was spawned. Must be called inside a tokio
    /// runtime.
    pub fn start<T>(&self, id: &SurfaceId, target: Weak<T>) -> bool
    where
        T: FrameTarget + 'static,
    {
        let mut slot = self.inner.loops.entry(id.clone()).or_insert_with(|| LoopSlot {
            generation: 0,
            scheduled: Arc::new(AtomicBool::new(false)),
            task: None,
        });
        if slot.is_scheduled() {
            return false;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let scheduled = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            id.clone(),
            generation,
            Arc::clone(&scheduled),
            target,
        ));
        *slot = LoopSlot {
            generation,
            scheduled,
            task: Some(task),
        };
        self.inner.loops_started.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(surface_id = %id, generation, "Frame loop started");
        true
    }

    /// Clear the scheduled flag; the loop exits at its next tick
    pub fn stop(&self, id: &SurfaceId) -> bool {
        match self.inner.loops.get(id) {
            Some(slot) => slot.scheduled.swap(false, Ordering::AcqRel),
            None => false,
        }
    }

    /// Abort and forget the loop for `id`
    pub fn cancel(&self, id: &SurfaceId) {
        if let Some((_, slot)) = self.inner.loops.remove(id) {
            slot.scheduled.store(false, Ordering::Release);
            if let Some(task) = slot.task {
                task.abort();
            }
            tracing::debug!(surface_id = %id, "Frame loop cancelled");
        }
    }

    /// Whether a loop is scheduled for `id`
    #[must_use]
    pub fn is_scheduled(&self, id: &SurfaceId) -> bool {
        self.inner
            .loops
            .get(id)
            .is_some_and(|slot| slot.is_scheduled())
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            active_loops: self.inner.loops.iter().filter(|s| s.is_scheduled()).count(),
            loops_started: self.inner.loops_started.load(Ordering::Relaxed),
            frames_rendered: self.inner.frames_rendered.load(Ordering::Relaxed),
        }
    }
}

async fn run_loop<T>(
    inner: Arc<Inner>,
    id: SurfaceId,
    generation: u64,
    scheduled: Arc<AtomicBool>,
    target: Weak<T>,
) where
    T: FrameTarget + 'static,
{
    let mut interval = tokio::time::interval(inner.frame_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick completes immediately; the first frame waits one interval
    interval.tick().await;

    loop {
        interval.tick().await;

        if !scheduled.load(Ordering::Acquire) {
            break;
        }
        let Some(frame) = target.upgrade() else {
            break;
        };
        if !frame.is_playing() {
            break;
        }
        frame.render_frame();
        inner.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    scheduled.store(false, Ordering::Release);
    inner
        .loops
        .remove_if(&id, |_, slot| slot.generation == generation);
    tracing::trace!(surface_id = %id, generation, "Frame loop exited");
}

impl fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("frame_interval", &self.inner.frame_interval)
            .field("stats", &self.stats())
            .finish()
    }
}
