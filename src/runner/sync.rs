//! Run loop on the calling thread.

use super::wake::WakeSignal;
use super::{DoneCallback, GraphRunner, RunControl, RunStatus, RunnerConfig};
use crate::context::FilterContext;
use crate::error::{Error, Result};
use crate::filter::FilterStatus;
use crate::graph::{FilterGraph, FilterId, SharedGraph};
use crate::observability::{span_filter, span_graph};
use crate::scheduler::{Scheduler, scheduler_for};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Drives a graph on the calling thread.
///
/// Each step asks the scheduler for a ready filter and processes it. When
/// nothing is ready but a filter sleeps, the loop blocks until the filter's
/// wake timer fires. The first failing filter aborts the run.
pub struct SyncRunner {
    context: FilterContext,
    config: RunnerConfig,
    graph: Option<SharedGraph>,
    scheduler: Box<dyn Scheduler>,
    control: Arc<RunControl>,
    wake: Arc<WakeSignal>,
    sleeping: HashSet<FilterId>,
    started: bool,
    error: Arc<Mutex<Option<Error>>>,
    done_callback: Option<DoneCallback>,
}

impl SyncRunner {
    /// Create a runner with the default configuration.
    pub fn new(context: FilterContext) -> Self {
        Self::with_config(context, RunnerConfig::default())
    }

    /// Create a runner with the given configuration.
    pub fn with_config(context: FilterContext, config: RunnerConfig) -> Self {
        Self {
            context,
            scheduler: scheduler_for(config.scheduler),
            config,
            graph: None,
            control: Arc::new(RunControl::new()),
            wake: WakeSignal::new(),
            sleeping: HashSet::new(),
            started: false,
            error: Arc::new(Mutex::new(None)),
            done_callback: None,
        }
    }

    /// Replace the scheduler.
    pub fn set_scheduler(&mut self, scheduler: Box<dyn Scheduler>) {
        self.scheduler = scheduler;
    }

    /// The runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub(crate) fn control(&self) -> Arc<RunControl> {
        Arc::clone(&self.control)
    }

    pub(crate) fn wake_signal(&self) -> Arc<WakeSignal> {
        Arc::clone(&self.wake)
    }

    pub(crate) fn error_slot(&self) -> Arc<Mutex<Option<Error>>> {
        Arc::clone(&self.error)
    }

    fn require_graph(&self) -> Result<SharedGraph> {
        self.graph
            .clone()
            .ok_or_else(|| Error::InvalidState("runner has no graph".into()))
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Process at most one filter.
    ///
    /// Sets the graph up and opens it on the first call. Returns
    /// [`RunStatus::Running`] if a filter was processed (or closed), otherwise
    /// the state the graph is in.
    pub fn step(&mut self) -> Result<RunStatus> {
        let graph = self.require_graph()?;
        let mut graph = graph.lock();
        if !self.started {
            self.begin(&mut graph)?;
        }
        self.apply_wakes(&mut graph);

        match self.scheduler.schedule_next(&graph) {
            Some(id) => {
                self.process_filter(&mut graph, id)?;
                Ok(RunStatus::Running)
            }
            None if self.close_drained(&mut graph)? => Ok(RunStatus::Running),
            None => Ok(self.post_run_status(&graph)),
        }
    }

    fn begin(&mut self, graph: &mut FilterGraph) -> Result<()> {
        graph.begin_processing()?;
        self.scheduler.reset();
        self.sleeping.clear();
        self.wake.reset();
        *self.error.lock() = None;
        self.started = true;
        Ok(())
    }

    fn apply_wakes(&mut self, graph: &mut FilterGraph) {
        for id in self.wake.take_woken() {
            if self.sleeping.remove(&id) {
                if let Some(node) = graph.filter_mut(id) {
                    node.wake();
                }
            }
        }
    }

    fn process_filter(&mut self, graph: &mut FilterGraph, id: FilterId) -> Result<()> {
        let span = if self.config.tracing.filter_spans {
            let name = graph.filter(id).map(|n| n.name().to_string()).unwrap_or_default();
            Some(span_filter(graph.name(), &name))
        } else {
            None
        };
        let _guard = span.as_ref().map(|s| s.enter());

        let node = graph
            .filter_mut(id)
            .ok_or_else(|| Error::UnknownFilter(id.to_string()))?;
        if let Err(e) = node.perform_process(&self.context) {
            *self.error.lock() = Some(e.clone());
            return Err(e);
        }
        if node.status() == FilterStatus::Sleeping {
            if let Some(delay) = node.sleep_delay() {
                self.sleeping.insert(id);
                self.wake.schedule(id, delay)?;
            }
        }
        Ok(())
    }

    fn close_drained(&mut self, graph: &mut FilterGraph) -> Result<bool> {
        let mut closed = false;
        for id in graph.filter_ids() {
            if let Some(node) = graph.filter_mut(id) {
                closed |= node.close_if_drained(&self.context)?;
            }
        }
        Ok(closed)
    }

    fn post_run_status(&self, graph: &FilterGraph) -> RunStatus {
        let mut status = RunStatus::Finished;
        for (_, node) in graph.filters() {
            match node.status() {
                FilterStatus::Sleeping => return RunStatus::Sleeping,
                _ if node.is_open() => status = RunStatus::Blocked,
                _ => {}
            }
        }
        status
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    fn run_loop(&mut self) -> Result<RunStatus> {
        loop {
            if self.control.stop_requested() {
                return Ok(RunStatus::Stopped);
            }
            match self.step()? {
                RunStatus::Running => {}
                RunStatus::Sleeping => {
                    tracing::trace!("all runnable filters sleeping");
                    if !self.wake.wait() {
                        return Ok(RunStatus::Stopped);
                    }
                }
                status => return Ok(status),
            }
        }
    }

    fn finish_run(&mut self, graph: &SharedGraph, status: RunStatus) {
        if let Err(e) = graph.lock().close_filters(&self.context) {
            tracing::warn!(error = %e, "failed to close filters after run");
        }
        self.started = false;
        self.control.finish();
        tracing::info!(%status, "run finished");
        if let Some(callback) = &self.done_callback {
            callback(status);
        }
    }
}

impl GraphRunner for SyncRunner {
    fn context(&self) -> &FilterContext {
        &self.context
    }

    fn set_graph(&mut self, graph: SharedGraph) -> Result<()> {
        if self.control.is_running() {
            return Err(Error::InvalidState("cannot change graph while running".into()));
        }
        self.graph = Some(graph);
        self.started = false;
        Ok(())
    }

    fn graph(&self) -> Option<SharedGraph> {
        self.graph.clone()
    }

    fn run(&mut self) -> Result<RunStatus> {
        self.require_graph()?;
        self.control.start()?;
        self.run_started()
    }

    fn is_running(&self) -> bool {
        self.control.is_running()
    }

    fn stop(&mut self) {
        if self.control.request_stop() {
            self.wake.interrupt();
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.control.is_running() {
            return Err(Error::InvalidState("cannot close while running".into()));
        }
        let graph = self.require_graph()?;
        self.started = false;
        graph.lock().close_filters(&self.context)
    }

    fn set_done_callback(&mut self, callback: Option<DoneCallback>) {
        self.done_callback = callback;
    }

    fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }
}

impl SyncRunner {
    /// Body of [`GraphRunner::run`] once the control flag is `Running`.
    pub(crate) fn run_started(&mut self) -> Result<RunStatus> {
        let graph = match self.require_graph() {
            Ok(graph) => graph,
            Err(e) => {
                self.control.finish();
                return Err(e);
            }
        };
        self.wake.clear_interrupt();
        self.started = false;

        let name = graph.lock().name().to_string();
        let span = self.config.tracing.graph_spans.then(|| span_graph(&name));
        let _guard = span.as_ref().map(|s| s.enter());

        let env = self.context.gpu_environment();
        let was_current = env.as_ref().is_some_and(|env| env.is_current());
        let result = match &env {
            Some(env) => env.activate().and_then(|()| self.run_loop()),
            None => self.run_loop(),
        };
        if let Some(env) = &env {
            if !was_current {
                env.deactivate();
            }
        }

        match result {
            Ok(status) => {
                self.finish_run(&graph, status);
                Ok(status)
            }
            Err(e) => {
                tracing::error!(error = %e, "run aborted");
                *self.error.lock() = Some(e.clone());
                self.finish_run(&graph, RunStatus::Error);
                Err(e)
            }
        }
    }
}
