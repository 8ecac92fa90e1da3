//! Session-scoped registry shared by graphs and runners.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::gpu::GpuEnvironment;
use crate::graph::SharedGraph;
use crate::memory::{CachedFrameManager, FrameManager};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct ContextInner {
    manager: Mutex<Arc<dyn FrameManager>>,
    gpu: Mutex<Option<GpuEnvironment>>,
    frames: Mutex<HashMap<String, Frame>>,
    graphs: Mutex<Vec<SharedGraph>>,
    torn_down: AtomicBool,
}

/// Binds a frame manager, an optional GPU environment, named frames and the
/// graphs that run in this session.
///
/// Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct FilterContext {
    inner: Arc<ContextInner>,
}

impl Default for FilterContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterContext {
    /// Create a context with a [`CachedFrameManager`] at the default budget.
    pub fn new() -> Self {
        Self::with_frame_manager(CachedFrameManager::new())
    }

    /// Create a context using `manager`.
    pub fn with_frame_manager(manager: Arc<dyn FrameManager>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                manager: Mutex::new(manager),
                gpu: Mutex::new(None),
                frames: Mutex::new(HashMap::new()),
                graphs: Mutex::new(Vec::new()),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// The frame manager.
    pub fn frame_manager(&self) -> Arc<dyn FrameManager> {
        Arc::clone(&self.inner.manager.lock())
    }

    /// Replace the frame manager. The GPU environment carries over.
    pub fn set_frame_manager(&self, manager: Arc<dyn FrameManager>) {
        manager.set_gpu_environment(self.gpu_environment());
        *self.inner.manager.lock() = manager;
    }

    /// Install a GPU environment for this context and its frame manager.
    pub fn init_gpu_environment(&self, env: GpuEnvironment) -> Result<()> {
        {
            let mut gpu = self.inner.gpu.lock();
            if gpu.is_some() {
                return Err(Error::InvalidState(
                    "attempting to re-initialize GPU environment".into(),
                ));
            }
            *gpu = Some(env.clone());
        }
        self.frame_manager().set_gpu_environment(Some(env.clone()));
        tracing::debug!(env = env.id(), backend = env.backend().name(), "GPU environment initialized");
        Ok(())
    }

    /// Create a new host-backed environment and make it current here.
    pub fn init_gpu_environment_with_new_context(&self) -> Result<GpuEnvironment> {
        let env = GpuEnvironment::host();
        env.activate()?;
        self.init_gpu_environment(env.clone())?;
        Ok(env)
    }

    /// Adopt the environment already current on this thread.
    pub fn init_gpu_environment_adopting_current(&self) -> Result<GpuEnvironment> {
        let env = GpuEnvironment::adopt_current().ok_or_else(|| {
            Error::InvalidState("no GPU environment is current on this thread".into())
        })?;
        self.init_gpu_environment(env.clone())?;
        Ok(env)
    }

    /// The GPU environment, if initialized.
    pub fn gpu_environment(&self) -> Option<GpuEnvironment> {
        self.inner.gpu.lock().clone()
    }

    // ------------------------------------------------------------------
    // Named frames
    // ------------------------------------------------------------------

    /// Store `frame` under `key`, retaining it and releasing any frame it
    /// replaces.
    pub fn store_frame(&self, key: &str, frame: &Frame) -> Result<()> {
        let retained = frame.retain()?;
        retained.on_store();
        let previous = self.inner.frames.lock().insert(key.to_string(), retained);
        if let Some(previous) = previous {
            previous.release()?;
        }
        Ok(())
    }

    /// The frame stored under `key`. The context keeps its reference.
    pub fn fetch_frame(&self, key: &str) -> Option<Frame> {
        let frame = self.inner.frames.lock().get(key).cloned()?;
        frame.on_fetch();
        Some(frame)
    }

    /// Remove and release the frame stored under `key`.
    pub fn remove_frame(&self, key: &str) -> Result<()> {
        let removed = self.inner.frames.lock().remove(key);
        match removed {
            Some(frame) => frame.release(),
            None => Ok(()),
        }
    }

    /// Number of stored frames.
    pub fn stored_frame_count(&self) -> usize {
        self.inner.frames.lock().len()
    }

    // ------------------------------------------------------------------
    // Graphs
    // ------------------------------------------------------------------

    /// Register a graph so it is torn down with the context.
    pub fn add_graph(&self, graph: SharedGraph) {
        self.inner.graphs.lock().push(graph);
    }

    /// Number of registered graphs.
    pub fn graph_count(&self) -> usize {
        self.inner.graphs.lock().len()
    }

    /// Whether [`tear_down`](Self::tear_down) has run.
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }

    /// Release everything the context owns: named frames, graphs, the frame
    /// manager's cache and the GPU environment. Idempotent.
    pub fn tear_down(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let frames: Vec<Frame> = self.inner.frames.lock().drain().map(|(_, f)| f).collect();
        for frame in frames {
            if let Err(e) = frame.release() {
                tracing::warn!(error = %e, "failed to release stored frame during tear down");
            }
        }

        let graphs = std::mem::take(&mut *self.inner.graphs.lock());
        for graph in graphs {
            graph.lock().tear_down(self);
        }

        self.frame_manager().tear_down();
        if let Some(env) = self.inner.gpu.lock().take() {
            env.tear_down();
        }
        tracing::debug!("filter context torn down");
    }
}

impl fmt::Debug for FilterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterContext")
            .field("stored_frames", &self.stored_frame_count())
            .field("graphs", &self.graph_count())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{BaseType, FrameFormat, FrameTarget};
    use crate::memory::SimpleFrameManager;

    fn native_format() -> FrameFormat {
        FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[8])
    }

    #[test]
    fn test_store_fetch_remove() {
        let manager = SimpleFrameManager::new();
        let ctx = FilterContext::with_frame_manager(manager.clone());
        let frame = ctx.frame_manager().new_frame(&native_format()).unwrap();

        ctx.store_frame("last", &frame).unwrap();
        assert_eq!(frame.ref_count(), 2);
        assert!(ctx.fetch_frame("last").unwrap().same_frame(&frame));
        assert!(ctx.fetch_frame("missing").is_none());

        frame.release().unwrap();
        ctx.remove_frame("last").unwrap();
        assert_eq!(manager.stats().live_native_allocations(), 0);
    }

    #[test]
    fn test_store_replaces_and_releases_previous() {
        let manager = SimpleFrameManager::new();
        let ctx = FilterContext::with_frame_manager(manager.clone());
        let first = manager.new_frame(&native_format()).unwrap();
        let second = manager.new_frame(&native_format()).unwrap();
        ctx.store_frame("k", &first).unwrap();
        ctx.store_frame("k", &second).unwrap();
        assert_eq!(first.ref_count(), 1);
        first.release().unwrap();
        second.release().unwrap();
        assert_eq!(manager.stats().live_native_allocations(), 1);
        ctx.tear_down();
        assert_eq!(manager.stats().live_native_allocations(), 0);
    }

    #[test]
    fn test_tear_down_is_idempotent() {
        let ctx = FilterContext::new();
        let env = ctx.init_gpu_environment_with_new_context().unwrap();
        assert!(ctx.frame_manager().gpu_environment().is_some());
        ctx.tear_down();
        ctx.tear_down();
        assert!(ctx.is_torn_down());
        assert!(env.is_torn_down());
        assert!(ctx.gpu_environment().is_none());
    }

    #[test]
    fn test_gpu_environment_initialized_once() {
        let ctx = FilterContext::new();
        ctx.init_gpu_environment(GpuEnvironment::host()).unwrap();
        assert!(matches!(
            ctx.init_gpu_environment(GpuEnvironment::host()),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            FilterContext::new().init_gpu_environment_adopting_current(),
            Err(Error::InvalidState(_))
        ));
    }
}
