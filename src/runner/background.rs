//! Background runner: the sync run loop on a dedicated worker thread.

use super::sync::SyncRunner;
use super::wake::WakeSignal;
use super::{DoneCallback, GraphRunner, RunControl, RunStatus, RunnerConfig};
use crate::context::FilterContext;
use crate::error::{Error, Result};
use crate::graph::SharedGraph;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Subscribers = Arc<Mutex<Vec<kanal::Sender<RunStatus>>>>;

/// Runs a graph on a background thread.
///
/// [`run`](GraphRunner::run) returns as soon as the worker has started.
/// Completion is reported through the done callback, through channels
/// returned by [`subscribe`](Self::subscribe), and by [`wait`](Self::wait).
///
/// ```rust
/// use framegraph::context::FilterContext;
/// use framegraph::filters::{NullFilter, ObjectSource};
/// use framegraph::graph::FilterGraph;
/// use framegraph::runner::{AsyncRunner, GraphRunner, RunStatus, RunnerConfig};
/// use framegraph::scheduler::SchedulerKind;
///
/// let mut graph = FilterGraph::new("background");
/// let source = graph
///     .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=1")
///     .unwrap();
/// let sink = graph.add_filter("sink", Box::new(NullFilter::new())).unwrap();
/// graph.connect(source, "frame", sink, "frame").unwrap();
///
/// let config = RunnerConfig::default().with_scheduler(SchedulerKind::OneShot);
/// let mut runner = AsyncRunner::with_config(FilterContext::new(), config);
/// runner.set_graph(graph.into_shared()).unwrap();
/// let done = runner.subscribe();
/// runner.run().unwrap();
/// assert_eq!(done.recv().unwrap(), RunStatus::Finished);
/// assert_eq!(runner.wait().unwrap(), RunStatus::Finished);
/// ```
pub struct AsyncRunner {
    context: FilterContext,
    config: RunnerConfig,
    graph: Option<SharedGraph>,
    idle: Option<SyncRunner>,
    worker: Option<JoinHandle<(SyncRunner, Result<RunStatus>)>>,
    control: Arc<RunControl>,
    wake: Arc<WakeSignal>,
    error: Arc<Mutex<Option<Error>>>,
    last_status: Arc<Mutex<RunStatus>>,
    done_callback: Option<DoneCallback>,
    subscribers: Subscribers,
}

impl AsyncRunner {
    /// Create a runner with the default configuration.
    pub fn new(context: FilterContext) -> Self {
        Self::with_config(context, RunnerConfig::default())
    }

    /// Create a runner with the given configuration.
    pub fn with_config(context: FilterContext, config: RunnerConfig) -> Self {
        let runner = SyncRunner::with_config(context.clone(), config.clone());
        Self {
            control: runner.control(),
            wake: runner.wake_signal(),
            error: runner.error_slot(),
            context,
            config,
            graph: None,
            idle: Some(runner),
            worker: None,
            last_status: Arc::new(Mutex::new(RunStatus::Unknown)),
            done_callback: None,
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Status of the last completed run.
    pub fn last_status(&self) -> RunStatus {
        *self.last_status.lock()
    }

    /// Receive the terminal status of every following run.
    pub fn subscribe(&self) -> kanal::Receiver<RunStatus> {
        let (tx, rx) = kanal::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Like [`subscribe`](Self::subscribe), for awaiting from async code.
    pub fn subscribe_async(&self) -> kanal::AsyncReceiver<RunStatus> {
        self.subscribe().to_async()
    }

    /// Block until the active run ends and return its result.
    ///
    /// Without an active run, returns the status of the last one.
    pub fn wait(&mut self) -> Result<RunStatus> {
        match self.worker.take() {
            Some(handle) => self.join(handle),
            None => Ok(self.last_status()),
        }
    }

    // ------------------------------------------------------------------------
    // Worker management
    // ------------------------------------------------------------------------

    fn join(&mut self, handle: JoinHandle<(SyncRunner, Result<RunStatus>)>) -> Result<RunStatus> {
        match handle.join() {
            Ok((runner, result)) => {
                self.idle = Some(runner);
                result
            }
            Err(_) => {
                // A panicking filter takes the inner runner down with it.
                self.control.finish();
                self.replace_runner();
                *self.last_status.lock() = RunStatus::Error;
                Err(Error::InvalidState("runner worker panicked".into()))
            }
        }
    }

    /// Reclaim the inner runner from a worker whose loop has exited.
    ///
    /// The run's result was already reported through the completion callback.
    fn reclaim(&mut self) {
        if self.control.is_running() {
            return;
        }
        if let Some(handle) = self.worker.take() {
            if let Err(e) = self.join(handle) {
                tracing::warn!(error = %e, "previous background run failed");
            }
        }
    }

    fn replace_runner(&mut self) {
        let runner = SyncRunner::with_config(self.context.clone(), self.config.clone());
        self.control = runner.control();
        self.wake = runner.wake_signal();
        self.error = runner.error_slot();
        self.idle = Some(runner);
    }

    fn take_idle(&mut self) -> Result<SyncRunner> {
        if self.idle.is_none() {
            self.replace_runner();
        }
        self.idle
            .take()
            .ok_or_else(|| Error::InvalidState("runner unavailable".into()))
    }

    fn completion_callback(&self) -> DoneCallback {
        let last_status = Arc::clone(&self.last_status);
        let subscribers = Arc::clone(&self.subscribers);
        let user = self.done_callback.clone();
        Arc::new(move |status| {
            *last_status.lock() = status;
            if let Some(callback) = &user {
                callback(status);
            }
            subscribers.lock().retain(|tx| tx.send(status).is_ok());
        })
    }
}

impl GraphRunner for AsyncRunner {
    fn context(&self) -> &FilterContext {
        &self.context
    }

    fn set_graph(&mut self, graph: SharedGraph) -> Result<()> {
        if self.control.is_running() {
            return Err(Error::InvalidState("cannot change graph while running".into()));
        }
        self.reclaim();
        if let Some(runner) = self.idle.as_mut() {
            runner.set_graph(Arc::clone(&graph))?;
        }
        self.graph = Some(graph);
        Ok(())
    }

    fn graph(&self) -> Option<SharedGraph> {
        self.graph.clone()
    }

    fn run(&mut self) -> Result<RunStatus> {
        if self.control.is_running() {
            return Err(Error::InvalidState("runner is already running".into()));
        }
        self.reclaim();
        let graph = self
            .graph
            .clone()
            .ok_or_else(|| Error::InvalidState("no graph to run".into()))?;
        let mut runner = self.take_idle()?;
        runner.set_graph(graph)?;
        runner.set_done_callback(Some(self.completion_callback()));

        if let Err(e) = self.control.start() {
            self.idle = Some(runner);
            return Err(e);
        }
        let spawned = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || {
                let result = runner.run_started();
                (runner, result)
            });
        match spawned {
            Ok(handle) => {
                tracing::debug!(worker = %self.config.worker_name, "background run started");
                self.worker = Some(handle);
                Ok(RunStatus::Running)
            }
            Err(e) => {
                // The closure (and the runner in it) is gone; start afresh.
                self.control.finish();
                self.replace_runner();
                Err(Error::InvalidState(format!("failed to start worker: {e}")))
            }
        }
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
        self.reclaim();
        match self.idle.as_mut() {
            Some(runner) if runner.graph().is_some() => runner.close(),
            _ => Err(Error::InvalidState("no graph to close".into())),
        }
    }

    fn set_done_callback(&mut self, callback: Option<DoneCallback>) {
        self.done_callback = callback;
    }

    fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }
}

impl Drop for AsyncRunner {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.stop();
            if handle.join().is_err() {
                tracing::warn!(worker = %self.config.worker_name, "runner worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for AsyncRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRunner")
            .field("worker_name", &self.config.worker_name)
            .field("running", &self.control.is_running())
            .field("last_status", &self.last_status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, ProcessContext};
    use crate::filters::{NullFilter, ObjectSource};
    use crate::graph::FilterGraph;
    use crate::port::PortSet;
    use crate::scheduler::SchedulerKind;
    use crate::value::{Value, ValueMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps forever between pushes.
    struct Drowsy;

    impl Filter for Drowsy {
        fn setup_ports(&mut self, ports: &mut PortSet) -> crate::error::Result<()> {
            ports.add_output("out", crate::format::FrameFormat::unspecified())?;
            Ok(())
        }

        fn process(&mut self, ctx: &mut ProcessContext<'_>) -> crate::error::Result<()> {
            ctx.delay_next_process(Duration::from_secs(3600));
            Ok(())
        }
    }

    /// Fails on its first process call.
    struct Broken;

    impl Filter for Broken {
        fn setup_ports(&mut self, ports: &mut PortSet) -> crate::error::Result<()> {
            ports.add_output("out", crate::format::FrameFormat::unspecified())?;
            Ok(())
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> crate::error::Result<()> {
            Err(Error::UnsupportedValue("broken".into()))
        }
    }

    fn one_shot_graph() -> SharedGraph {
        let mut graph = FilterGraph::new("bg");
        let source = graph
            .add_filter_with_values(
                "source",
                Box::new(ObjectSource::new()),
                &ValueMap::new().with("object", Value::Int(3)),
            )
            .unwrap();
        let sink = graph.add_filter("sink", Box::new(NullFilter::new())).unwrap();
        graph.connect(source, "frame", sink, "frame").unwrap();
        graph.into_shared()
    }

    fn one_shot_runner() -> AsyncRunner {
        let config = RunnerConfig::default().with_scheduler(SchedulerKind::OneShot);
        AsyncRunner::with_config(FilterContext::new(), config)
    }

    #[test]
    fn test_completion_reported_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut runner = one_shot_runner();
        runner.set_graph(one_shot_graph()).unwrap();
        runner.set_done_callback(Some(Arc::new(move |status: RunStatus| {
            assert_eq!(status, RunStatus::Finished);
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let done = runner.subscribe();

        assert_eq!(runner.run().unwrap(), RunStatus::Running);
        assert_eq!(done.recv().unwrap(), RunStatus::Finished);
        assert_eq!(runner.wait().unwrap(), RunStatus::Finished);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!runner.is_running());
        assert_eq!(runner.last_status(), RunStatus::Finished);
    }

    #[test]
    fn test_rerun_after_completion() {
        let mut runner = one_shot_runner();
        runner.set_graph(one_shot_graph()).unwrap();
        runner.run().unwrap();
        assert_eq!(runner.wait().unwrap(), RunStatus::Finished);

        runner.set_graph(one_shot_graph()).unwrap();
        runner.run().unwrap();
        assert_eq!(runner.wait().unwrap(), RunStatus::Finished);
    }

    #[test]
    fn test_rerun_after_unawaited_failure() {
        let mut graph = FilterGraph::new("broken");
        let id = graph.add_filter("broken", Box::new(Broken)).unwrap();
        let sink = graph.add_filter("sink", Box::new(NullFilter::new())).unwrap();
        graph.connect(id, "out", sink, "frame").unwrap();

        let mut runner = one_shot_runner();
        runner.set_graph(graph.into_shared()).unwrap();
        let done = runner.subscribe();
        runner.run().unwrap();
        assert_eq!(done.recv().unwrap(), RunStatus::Error);
        assert!(runner.error().is_some());

        // The failed worker is reclaimed by the next run without waiting on it.
        while runner.is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        runner.set_graph(one_shot_graph()).unwrap();
        assert_eq!(runner.run().unwrap(), RunStatus::Running);
        assert_eq!(done.recv().unwrap(), RunStatus::Finished);
        assert_eq!(runner.wait().unwrap(), RunStatus::Finished);
        assert!(runner.error().is_none());
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let mut graph = FilterGraph::new("drowsy");
        let id = graph.add_filter("drowsy", Box::new(Drowsy)).unwrap();
        let sink = graph.add_filter("sink", Box::new(NullFilter::new())).unwrap();
        graph.connect(id, "out", sink, "frame").unwrap();

        let mut runner = AsyncRunner::new(FilterContext::new());
        runner.set_graph(graph.into_shared()).unwrap();
        let done = runner.subscribe();
        runner.run().unwrap();
        assert!(runner.is_running());
        assert!(runner.run().is_err());

        std::thread::sleep(Duration::from_millis(20));
        runner.stop();
        assert_eq!(done.recv().unwrap(), RunStatus::Stopped);
        assert_eq!(runner.wait().unwrap(), RunStatus::Stopped);
        assert!(runner.error().is_none());
    }

    #[test]
    fn test_run_without_graph() {
        let mut runner = AsyncRunner::new(FilterContext::new());
        assert!(runner.run().is_err());
        assert!(!runner.is_running());
        assert_eq!(runner.wait().unwrap(), RunStatus::Unknown);
    }
}
