//! Timed wake-ups for sleeping filters.

use crate::error::{Error, Result};
use crate::graph::FilterId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct WakeState {
    woken: Vec<FilterId>,
    interrupted: bool,
    /// Generation of the timer currently armed for each sleeping filter.
    armed: HashMap<FilterId, u64>,
    next_generation: u64,
}

/// Condition the run loop blocks on while every runnable filter sleeps.
///
/// Each sleep arms a timer thread that records the filter as woken and
/// signals the condition. Timers are tagged with a generation, and only the
/// latest one armed for a filter can wake it. A stop request interrupts the
/// wait.
#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    state: Mutex<WakeState>,
    condvar: Condvar,
}

impl WakeSignal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wake `filter` after `delay`, superseding any timer already armed
    /// for it.
    pub(crate) fn schedule(self: &Arc<Self>, filter: FilterId, delay: Duration) -> Result<()> {
        let generation = {
            let mut state = self.state.lock();
            state.next_generation += 1;
            let generation = state.next_generation;
            state.armed.insert(filter, generation);
            generation
        };
        let signal = Arc::clone(self);
        thread::Builder::new()
            .name("framegraph-wake".into())
            .spawn(move || {
                thread::sleep(delay);
                signal.fire(filter, generation);
            })
            .map(drop)
            .map_err(|e| {
                self.state.lock().armed.remove(&filter);
                Error::InvalidState(format!("failed to start wake timer: {e}"))
            })
    }

    /// Timer expiry. Ignored unless `generation` is still armed for `filter`.
    fn fire(&self, filter: FilterId, generation: u64) {
        let mut state = self.state.lock();
        if state.armed.get(&filter) != Some(&generation) {
            tracing::trace!(%filter, generation, "stale wake timer ignored");
            return;
        }
        state.armed.remove(&filter);
        state.woken.push(filter);
        drop(state);
        self.condvar.notify_all();
    }

    /// Disarm every pending timer and forget unconsumed wake-ups.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.armed.clear();
        state.woken.clear();
    }

    pub(crate) fn interrupt(&self) {
        self.state.lock().interrupted = true;
        self.condvar.notify_all();
    }

    pub(crate) fn clear_interrupt(&self) {
        self.state.lock().interrupted = false;
    }

    /// Filters woken since the last call.
    pub(crate) fn take_woken(&self) -> Vec<FilterId> {
        std::mem::take(&mut self.state.lock().woken)
    }

    /// Block until a filter wakes. Returns `false` if interrupted.
    pub(crate) fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while state.woken.is_empty() && !state.interrupted {
            self.condvar.wait(&mut state);
        }
        !state.interrupted
    }
}
