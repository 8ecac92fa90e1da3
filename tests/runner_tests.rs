//! Integration tests for the sync and background runners.

use framegraph::filters::{CallbackFilter, ObjectSource};
use framegraph::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Pushes a counter, sleeping `delay` between pushes, `limit` times.
struct Ticker {
    delay: Duration,
    limit: i64,
    sent: i64,
}

impl Ticker {
    fn new(delay: Duration, limit: i64) -> Self {
        Self {
            delay,
            limit,
            sent: 0,
        }
    }
}

impl Filter for Ticker {
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.add_output("tick", FrameFormat::unspecified())?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        ctx.push_output_value("tick", Value::Int(self.sent))?;
        self.sent += 1;
        if self.sent >= self.limit {
            ctx.close_output_port("tick")?;
        } else {
            ctx.delay_next_process(self.delay);
        }
        Ok(())
    }
}

/// Forwards every input frame unchanged, counting process calls.
struct PassThrough {
    calls: Arc<AtomicUsize>,
}

impl Filter for PassThrough {
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.add_input("in", FrameFormat::unspecified())?;
        ports.add_output("out", FrameFormat::unspecified())?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let frame = ctx.pull_input("in")?;
        ctx.push_output("out", &frame)
    }
}

fn counting_sink(count: &Arc<AtomicUsize>) -> Box<CallbackFilter> {
    let count = Arc::clone(count);
    Box::new(CallbackFilter::with_callback(move |_frame: &Frame| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
}

// ============================================================================
// Sync runner
// ============================================================================

/// A one-shot source delivers its array exactly once.
#[test]
fn test_one_shot_source_delivers_once() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink_received = Arc::clone(&received);

    let mut graph = FilterGraph::new("one-shot");
    let source = graph
        .add_filter_with_values(
            "source",
            Box::new(ObjectSource::new()),
            &ValueMap::new().with("object", vec![1i32, 2, 3]),
        )
        .unwrap();
    let sink = graph
        .add_filter(
            "sink",
            Box::new(CallbackFilter::with_callback(move |frame: &Frame| {
                sink_received.lock().push(frame.ints()?);
                Ok(())
            })),
        )
        .unwrap();
    graph.connect(source, "frame", sink, "frame").unwrap();

    let config = RunnerConfig::default().with_scheduler(SchedulerKind::OneShot);
    let mut runner = SyncRunner::with_config(FilterContext::new(), config);
    runner.set_graph(graph.into_shared()).unwrap();
    assert_eq!(runner.run().unwrap(), RunStatus::Finished);
    assert_eq!(*received.lock(), vec![vec![1, 2, 3]]);
}

/// A repeating source under the one-shot scheduler is not rescheduled.
#[test]
fn test_one_shot_does_not_reschedule_source() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut graph = FilterGraph::new("repeat");
    let source = graph
        .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=5; repeat=true")
        .unwrap();
    let sink = graph.add_filter("sink", counting_sink(&count)).unwrap();
    graph.connect(source, "frame", sink, "frame").unwrap();

    let config = RunnerConfig::default().with_scheduler(SchedulerKind::OneShot);
    let mut runner = SyncRunner::with_config(FilterContext::new(), config);
    runner.set_graph(graph.into_shared()).unwrap();

    // The source stays open, so the run ends blocked rather than finished.
    assert_eq!(runner.run().unwrap(), RunStatus::Blocked);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// After the source is retired, one-shot scheduling still runs downstream filters.
#[test]
fn test_one_shot_runs_downstream_filters() {
    let calls = Arc::new(AtomicUsize::new(0));
    let count = Arc::new(AtomicUsize::new(0));
    let mut graph = FilterGraph::new("three-stage");
    let source = graph
        .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=7; repeat=true")
        .unwrap();
    let pass = graph
        .add_filter(
            "pass",
            Box::new(PassThrough {
                calls: Arc::clone(&calls),
            }),
        )
        .unwrap();
    let sink = graph.add_filter("sink", counting_sink(&count)).unwrap();
    graph.connect(source, "frame", pass, "in").unwrap();
    graph.connect(pass, "out", sink, "frame").unwrap();

    let config = RunnerConfig::default().with_scheduler(SchedulerKind::OneShot);
    let mut runner = SyncRunner::with_config(FilterContext::new(), config);
    runner.set_graph(graph.into_shared()).unwrap();

    assert_eq!(runner.run().unwrap(), RunStatus::Blocked);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// Sleeping filters delay the run by at least the requested time.
#[test]
fn test_sleep_delays_run() {
    init_tracing();
    let count = Arc::new(AtomicUsize::new(0));
    let mut graph = FilterGraph::new("sleepy");
    let ticker = graph
        .add_filter("ticker", Box::new(Ticker::new(Duration::from_millis(50), 2)))
        .unwrap();
    let sink = graph.add_filter("sink", counting_sink(&count)).unwrap();
    graph.connect(ticker, "tick", sink, "frame").unwrap();

    let mut runner = SyncRunner::new(FilterContext::new());
    runner.set_graph(graph.into_shared()).unwrap();
    let start = Instant::now();
    assert_eq!(runner.run().unwrap(), RunStatus::Finished);
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

/// A failing filter aborts the run and is reported by the runner.
#[test]
fn test_filter_failure_reported() {
    init_tracing();
    let mut graph = FilterGraph::new("failing");
    let source = graph
        .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=1")
        .unwrap();
    let sink = graph
        .add_filter(
            "sink",
            Box::new(CallbackFilter::with_callback(|_frame: &Frame| {
                Err(Error::UnsupportedValue("rejected".into()))
            })),
        )
        .unwrap();
    graph.connect(source, "frame", sink, "frame").unwrap();

    let mut runner = SyncRunner::new(FilterContext::new());
    runner.set_graph(graph.into_shared()).unwrap();
    let err = runner.run().unwrap_err();
    assert!(matches!(err, Error::FilterFailed { ref filter, .. } if filter == "sink"));
    assert!(runner.error().is_some());
    assert!(!runner.is_running());
}

// ============================================================================
// Background runner
// ============================================================================

/// An endless graph runs until stopped from async code.
#[tokio::test]
async fn test_async_runner_stop() {
    init_tracing();
    let count = Arc::new(AtomicUsize::new(0));
    let mut graph = FilterGraph::new("endless");
    let source = graph
        .add_filter_with_assignments("source", Box::new(ObjectSource::new()), "object=1; repeat=true")
        .unwrap();
    let sink = graph.add_filter("sink", counting_sink(&count)).unwrap();
    graph.connect(source, "frame", sink, "frame").unwrap();

    let mut runner = AsyncRunner::new(FilterContext::new());
    runner.set_graph(graph.into_shared()).unwrap();
    let done = runner.subscribe_async();
    assert_eq!(runner.run().unwrap(), RunStatus::Running);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(runner.is_running());
    runner.stop();

    assert_eq!(done.recv().await.unwrap(), RunStatus::Stopped);
    assert_eq!(runner.wait().unwrap(), RunStatus::Stopped);
    assert!(count.load(Ordering::SeqCst) > 0);
}

/// Completion of a finite graph reaches the done callback.
#[tokio::test]
async fn test_async_runner_completion() {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&statuses);
    let count = Arc::new(AtomicUsize::new(0));

    let mut graph = FilterGraph::new("finite");
    let ticker = graph
        .add_filter("ticker", Box::new(Ticker::new(Duration::from_millis(5), 3)))
        .unwrap();
    let sink = graph.add_filter("sink", counting_sink(&count)).unwrap();
    graph.connect(ticker, "tick", sink, "frame").unwrap();

    let mut runner = AsyncRunner::new(FilterContext::new());
    runner.set_graph(graph.into_shared()).unwrap();
    runner.set_done_callback(Some(Arc::new(move |status: RunStatus| seen.lock().push(status))));
    let done = runner.subscribe_async();
    runner.run().unwrap();

    assert_eq!(done.recv().await.unwrap(), RunStatus::Finished);
    assert_eq!(runner.wait().unwrap(), RunStatus::Finished);
    assert_eq!(*statuses.lock(), vec![RunStatus::Finished]);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

/// A background run can be stopped while every filter sleeps.
#[test]
fn test_async_stop_during_sleep() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut graph = FilterGraph::new("long-sleep");
    let ticker = graph
        .add_filter("ticker", Box::new(Ticker::new(Duration::from_secs(60), 10)))
        .unwrap();
    let sink = graph.add_filter("sink", counting_sink(&count)).unwrap();
    graph.connect(ticker, "tick", sink, "frame").unwrap();

    let mut runner = AsyncRunner::new(FilterContext::new());
    runner.set_graph(graph.into_shared()).unwrap();
    runner.run().unwrap();
    std::thread::sleep(Duration::from_millis(30));

    let start = Instant::now();
    runner.stop();
    assert_eq!(runner.wait().unwrap(), RunStatus::Stopped);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
