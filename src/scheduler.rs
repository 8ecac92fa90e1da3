//! Scheduling policies: which ready filter runs next.
//!
//! | Scheduler | Picks |
//! |-----------|-------|
//! | [`SimpleScheduler`] | The first ready filter in insertion order |
//! | [`RoundRobinScheduler`] | The next ready filter after the last pick |
//! | [`RandomScheduler`] | A uniformly random ready filter |
//! | [`OneShotScheduler`] | Round-robin, running source filters only once |
//!
//! A filter is ready when [`FilterNode::can_process`](crate::filter::FilterNode::can_process)
//! holds.

use crate::graph::{FilterGraph, FilterId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Policy choosing the next filter to process.
pub trait Scheduler: Send {
    /// Pick a ready filter, or `None` if nothing can run.
    fn schedule_next(&mut self, graph: &FilterGraph) -> Option<FilterId>;

    /// Forget progress made so far.
    fn reset(&mut self);
}

/// Available scheduling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchedulerKind {
    /// [`SimpleScheduler`].
    Simple,
    /// [`RoundRobinScheduler`].
    #[default]
    RoundRobin,
    /// [`RandomScheduler`].
    Random,
    /// [`OneShotScheduler`].
    OneShot,
}

/// Create a scheduler of the given kind.
pub fn scheduler_for(kind: SchedulerKind) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::Simple => Box::new(SimpleScheduler),
        SchedulerKind::RoundRobin => Box::new(RoundRobinScheduler::new()),
        SchedulerKind::Random => Box::new(RandomScheduler::new()),
        SchedulerKind::OneShot => Box::new(OneShotScheduler::new()),
    }
}

fn ready_filters(graph: &FilterGraph) -> impl Iterator<Item = FilterId> + '_ {
    graph
        .filters()
        .filter(|(_, node)| node.can_process())
        .map(|(id, _)| id)
}

// ============================================================================
// Simple
// ============================================================================

/// Always picks the first ready filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleScheduler;

impl Scheduler for SimpleScheduler {
    fn schedule_next(&mut self, graph: &FilterGraph) -> Option<FilterId> {
        ready_filters(graph).next()
    }

    fn reset(&mut self) {}
}

// ============================================================================
// Round robin
// ============================================================================

/// Cycles through filters in insertion order, skipping those not ready.
#[derive(Debug, Default, Clone)]
pub struct RoundRobinScheduler {
    last: Option<FilterId>,
}

impl RoundRobinScheduler {
    /// Create a new RoundRobinScheduler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for RoundRobinScheduler {
    fn schedule_next(&mut self, graph: &FilterGraph) -> Option<FilterId> {
        let mut first = None;
        let mut after_last = None;
        for id in ready_filters(graph) {
            first.get_or_insert(id);
            if self.last.is_none_or(|last| id > last) {
                after_last = Some(id);
                break;
            }
        }
        let next = after_last.or(first);
        if next.is_some() {
            self.last = next;
        }
        next
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

// ============================================================================
// Random
// ============================================================================

/// Picks uniformly among the ready filters.
#[derive(Debug, Clone)]
pub struct RandomScheduler {
    rng: StdRng,
}

impl RandomScheduler {
    /// Create a scheduler seeded from the OS.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a scheduler with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RandomScheduler {
    fn schedule_next(&mut self, graph: &FilterGraph) -> Option<FilterId> {
        let ready: Vec<FilterId> = ready_filters(graph).collect();
        if ready.is_empty() {
            return None;
        }
        Some(ready[self.rng.gen_range(0..ready.len())])
    }

    fn reset(&mut self) {}
}

// ============================================================================
// One shot
// ============================================================================

/// Round-robin that never schedules a source filter twice.
///
/// Filters without connected inputs are excluded after their first step,
/// so a batch graph runs its sources once and then drains.
#[derive(Debug, Default, Clone)]
pub struct OneShotScheduler {
    inner: RoundRobinScheduler,
    done: HashSet<FilterId>,
}

impl OneShotScheduler {
    /// Create a new OneShotScheduler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for OneShotScheduler {
    fn schedule_next(&mut self, graph: &FilterGraph) -> Option<FilterId> {
        let mut first = None;
        loop {
            let id = self.inner.schedule_next(graph)?;
            if !self.done.contains(&id) {
                let is_source = graph
                    .filter(id)
                    .is_some_and(|node| node.connected_input_count() == 0);
                if is_source {
                    self.done.insert(id);
                }
                return Some(id);
            }
            match first {
                Some(seen) if seen == id => return None,
                Some(_) => {}
                None => first = Some(id),
            }
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.done.clear();
    }
}
