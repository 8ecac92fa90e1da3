//! Frame allocation and recycling.
//!
//! A [`FrameManager`] is the sole authority for creating, retaining and
//! releasing the frames it hands out. Two variants are provided:
//!
//! - [`SimpleFrameManager`]: allocates on every request and frees native
//!   storage as soon as a frame's reference count reaches zero.
//! - [`CachedFrameManager`]: offers released native/GPU frames to a FIFO
//!   recycle cache bounded by a byte budget (24 MiB by default) and serves
//!   later requests for a replaceable format from it.
//!
//! ```rust
//! use framegraph::format::{BaseType, FrameFormat, FrameTarget};
//! use framegraph::memory::{CachedFrameManager, FrameManager};
//!
//! let manager = CachedFrameManager::new();
//! let format = FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[1024]);
//!
//! let first = manager.new_frame(&format)?;
//! first.release()?;
//! let second = manager.new_frame(&format)?;
//! assert!(first.same_frame(&second));
//! assert_eq!(manager.stats().frames_recycled, 1);
//! # Ok::<(), framegraph::Error>(())
//! ```

mod cached;
mod simple;

pub use cached::{CacheConfig, CachedFrameManager, DEFAULT_CACHE_CAPACITY};
pub use simple::SimpleFrameManager;

use crate::error::{Error, Result};
use crate::format::{FrameFormat, FrameTarget};
use crate::frame::{Frame, FrameBinding};
use crate::gpu::GpuEnvironment;
use crate::observability;
use parking_lot::Mutex;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// ============================================================================
// FrameManager Trait
// ============================================================================

/// Creates, retains and releases frames.
///
/// Managers are always held in an `Arc`; frames keep a weak back-reference
/// so [`Frame::retain`] and [`Frame::release`] can delegate here.
pub trait FrameManager: Send + Sync {
    /// Allocate a frame for `format`'s target store.
    fn new_frame(&self, format: &FrameFormat) -> Result<Frame>;

    /// Allocate a GPU frame bound to external storage.
    fn new_bound_frame(&self, format: &FrameFormat, binding: FrameBinding) -> Result<Frame>;

    /// Increment a frame's reference count.
    fn retain_frame(&self, frame: &Frame) -> Result<()>;

    /// Decrement a frame's reference count, freeing or recycling its storage
    /// when the count reaches zero.
    fn release_frame(&self, frame: &Frame) -> Result<()>;

    /// Set the GPU environment used for GPU and vertex allocations.
    fn set_gpu_environment(&self, env: Option<GpuEnvironment>);

    /// The configured GPU environment.
    fn gpu_environment(&self) -> Option<GpuEnvironment>;

    /// Snapshot of allocation statistics.
    fn stats(&self) -> ManagerStats;

    /// Free every cached frame and refuse further allocations.
    fn tear_down(&self);
}

/// Allocation statistics of a manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Frames created by allocation (not counting cache hits).
    pub frames_allocated: u64,
    /// Allocations that created native or GPU storage.
    pub native_allocations: u64,
    /// Native or GPU storages freed.
    pub native_frees: u64,
    /// Requests served from the recycle cache.
    pub frames_recycled: u64,
    /// Cached frames evicted to make room.
    pub frames_evicted: u64,
    /// Released frames too large to cache.
    pub frames_rejected: u64,
    /// Frames currently cached.
    pub cached_frames: usize,
    /// Bytes currently cached.
    pub cached_bytes: usize,
    /// Cache byte budget (0 for non-caching managers).
    pub capacity_bytes: usize,
}

impl ManagerStats {
    /// Native allocations not yet freed, cached frames included.
    pub fn live_native_allocations(&self) -> u64 {
        self.native_allocations - self.native_frees
    }
}

// ============================================================================
// Shared allocation core
// ============================================================================

pub(crate) fn target_label(target: FrameTarget) -> &'static str {
    match target {
        FrameTarget::Unspecified => "unspecified",
        FrameTarget::Simple => "simple",
        FrameTarget::Native => "native",
        FrameTarget::Gpu => "gpu",
        FrameTarget::VertexBuffer => "vertex",
    }
}

/// State shared by both manager variants.
pub(crate) struct ManagerCore {
    this: Weak<dyn FrameManager>,
    gpu: Mutex<Option<GpuEnvironment>>,
    frames_allocated: AtomicU64,
    native_allocations: AtomicU64,
    native_frees: AtomicU64,
    torn_down: AtomicBool,
}

impl ManagerCore {
    pub(crate) fn new(this: Weak<dyn FrameManager>) -> Self {
        Self {
            this,
            gpu: Mutex::new(None),
            frames_allocated: AtomicU64::new(0),
            native_allocations: AtomicU64::new(0),
            native_frees: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn allocate(&self, format: &FrameFormat, binding: FrameBinding) -> Result<Frame> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(Error::InvalidState(
                "frame manager has been torn down".into(),
            ));
        }
        let gpu = self.gpu.lock().clone();
        let frame = Frame::allocate(format, binding, gpu.as_ref(), Some(self.this.clone()))?;
        self.frames_allocated.fetch_add(1, Ordering::Relaxed);
        if frame.has_native_allocation() {
            self.native_allocations.fetch_add(1, Ordering::Relaxed);
        }
        observability::record_frame_allocated(target_label(format.target()));
        tracing::trace!(frame = frame.id(), %format, "allocated frame");
        Ok(frame)
    }

    /// Free a frame's storage, counting native frees exactly once.
    pub(crate) fn free(&self, frame: &Frame) {
        if frame.deallocate() {
            self.native_frees.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(frame = frame.id(), "freed native frame storage");
        }
    }

    pub(crate) fn set_gpu(&self, env: Option<GpuEnvironment>) {
        *self.gpu.lock() = env;
    }

    pub(crate) fn gpu(&self) -> Option<GpuEnvironment> {
        self.gpu.lock().clone()
    }

    pub(crate) fn mark_torn_down(&self) {
        self.torn_down.store(true, Ordering::Release);
        self.gpu.lock().take();
    }

    pub(crate) fn stats(&self) -> ManagerStats {
        ManagerStats {
            frames_allocated: self.frames_allocated.load(Ordering::Relaxed),
            native_allocations: self.native_allocations.load(Ordering::Relaxed),
            native_frees: self.native_frees.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}
