//! Caching frame manager with a FIFO recycle cache.

use super::{FrameManager, ManagerCore, ManagerStats, target_label};
use crate::error::Result;
use crate::format::FrameFormat;
use crate::frame::{Frame, FrameBinding};
use crate::gpu::GpuEnvironment;
use crate::observability;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Default cache budget: 24 MiB of cumulative cached frame size.
pub const DEFAULT_CACHE_CAPACITY: usize = 24 * 1024 * 1024;

/// Recycle cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on the summed format size of cached frames.
    pub capacity_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Set the byte budget.
    pub fn with_capacity_bytes(mut self, capacity_bytes: usize) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }
}

struct CachedEntry {
    frame: Frame,
    size: usize,
}

#[derive(Default)]
struct CacheState {
    /// Insertion counter → entry; iteration order is insertion order.
    entries: BTreeMap<u64, CachedEntry>,
    next_key: u64,
    bytes: usize,
}

/// Frame manager that recycles released native and GPU frames.
///
/// Every cached frame counts its full format size against the budget,
/// including GPU frames wrapping textures the engine does not own.
pub struct CachedFrameManager {
    core: ManagerCore,
    config: CacheConfig,
    cache: Mutex<CacheState>,
    recycled: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
}

impl CachedFrameManager {
    /// Create a manager with the default 24 MiB budget.
    pub fn new() -> Arc<Self> {
        Self::with_config(CacheConfig::default())
    }

    /// Create a manager with a custom configuration.
    pub fn with_config(config: CacheConfig) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn FrameManager> = this.clone();
            Self {
                core: ManagerCore::new(this),
                config,
                cache: Mutex::new(CacheState::default()),
                recycled: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }
        })
    }

    /// Cache byte budget.
    pub fn capacity(&self) -> usize {
        self.config.capacity_bytes
    }

    /// Bytes currently cached.
    pub fn cached_bytes(&self) -> usize {
        self.cache.lock().bytes
    }

    /// Frames currently cached.
    pub fn cached_frame_count(&self) -> usize {
        self.cache.lock().entries.len()
    }

    /// Offer a released frame to the cache.
    ///
    /// Frames larger than the whole budget are rejected without evicting
    /// anything. Otherwise the oldest entries are evicted until the frame
    /// fits. Returns whether the frame was cached.
    fn store_frame(&self, frame: &Frame) -> bool {
        let size = frame.format().size();
        if size > self.config.capacity_bytes {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                frame = frame.id(),
                size,
                capacity = self.config.capacity_bytes,
                "frame too large to cache"
            );
            return false;
        }

        frame.on_store();
        let mut evicted = Vec::new();
        let bytes = {
            let mut cache = self.cache.lock();
            while cache.bytes + size > self.config.capacity_bytes {
                match cache.entries.pop_first() {
                    Some((_, entry)) => {
                        cache.bytes -= entry.size;
                        evicted.push(entry.frame);
                    }
                    None => break,
                }
            }
            let key = cache.next_key;
            cache.next_key += 1;
            cache.entries.insert(
                key,
                CachedEntry {
                    frame: frame.clone(),
                    size,
                },
            );
            cache.bytes += size;
            cache.bytes
        };

        for frame in evicted {
            tracing::warn!(frame = frame.id(), "evicting cached frame");
            self.evicted.fetch_add(1, Ordering::Relaxed);
            observability::record_frame_evicted();
            self.core.free(&frame);
        }
        observability::record_cache_bytes(bytes);
        tracing::trace!(frame = frame.id(), size, cached_bytes = bytes, "cached frame");
        true
    }

    /// Take the oldest cached frame replaceable by `format` with a matching
    /// binding, reset to `format` with a reference count of one.
    fn find_available_frame(&self, format: &FrameFormat, binding: FrameBinding) -> Option<Frame> {
        let (frame, bytes) = {
            let mut cache = self.cache.lock();
            let key = cache.entries.iter().find_map(|(key, entry)| {
                let candidate = &entry.frame;
                (candidate.binding().matches(&binding)
                    && candidate.format().is_replaceable_by(format))
                .then_some(*key)
            })?;
            let entry = cache.entries.remove(&key)?;
            cache.bytes -= entry.size;
            (entry.frame, cache.bytes)
        };
        frame.on_fetch();
        frame.reset(format);
        self.recycled.fetch_add(1, Ordering::Relaxed);
        observability::record_frame_recycled(target_label(format.target()));
        observability::record_cache_bytes(bytes);
        tracing::trace!(frame = frame.id(), %format, "recycled cached frame");
        Some(frame)
    }

    /// Free every cached frame.
    pub fn clear_cache(&self) {
        let entries = {
            let mut cache = self.cache.lock();
            cache.bytes = 0;
            std::mem::take(&mut cache.entries)
        };
        for entry in entries.into_values() {
            self.core.free(&entry.frame);
        }
        observability::record_cache_bytes(0);
    }
}

impl FrameManager for CachedFrameManager {
    fn new_frame(&self, format: &FrameFormat) -> Result<Frame> {
        self.new_bound_frame(format, FrameBinding::UNBOUND)
    }

    fn new_bound_frame(&self, format: &FrameFormat, binding: FrameBinding) -> Result<Frame> {
        match self.find_available_frame(format, binding) {
            Some(frame) => Ok(frame),
            None => self.core.allocate(format, binding),
        }
    }

    fn retain_frame(&self, frame: &Frame) -> Result<()> {
        frame.inc_ref();
        Ok(())
    }

    fn release_frame(&self, frame: &Frame) -> Result<()> {
        if frame.dec_ref()? > 0 {
            return Ok(());
        }
        if !(frame.is_reusable() && frame.has_native_allocation() && self.store_frame(frame)) {
            self.core.free(frame);
        }
        Ok(())
    }

    fn set_gpu_environment(&self, env: Option<GpuEnvironment>) {
        self.core.set_gpu(env);
    }

    fn gpu_environment(&self) -> Option<GpuEnvironment> {
        self.core.gpu()
    }

    fn stats(&self) -> ManagerStats {
        let (cached_frames, cached_bytes) = {
            let cache = self.cache.lock();
            (cache.entries.len(), cache.bytes)
        };
        ManagerStats {
            frames_recycled: self.recycled.load(Ordering::Relaxed),
            frames_evicted: self.evicted.load(Ordering::Relaxed),
            frames_rejected: self.rejected.load(Ordering::Relaxed),
            cached_frames,
            cached_bytes,
            capacity_bytes: self.config.capacity_bytes,
            ..self.core.stats()
        }
    }

    fn tear_down(&self) {
        self.clear_cache();
        self.core.mark_torn_down();
        tracing::debug!("tore down caching frame manager");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{BaseType, FrameTarget};
    use crate::frame::BindingType;
    use crate::gpu::{GpuEnvironment, HostGpuBackend};

    fn bytes(n: usize) -> FrameFormat {
        FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[n])
    }

    fn small_cache(capacity: usize) -> Arc<CachedFrameManager> {
        CachedFrameManager::with_config(CacheConfig::default().with_capacity_bytes(capacity))
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(CachedFrameManager::new().capacity(), 24 * 1024 * 1024);
    }

    #[test]
    fn test_recycled_frame_matches_requested_format() {
        let manager = CachedFrameManager::new();
        let int_fmt = FrameFormat::new(BaseType::Int32, FrameTarget::Native).with_dimensions(&[4, 4]);
        let frame = manager.new_frame(&int_fmt).unwrap();
        frame.mark_read_only();
        frame.release().unwrap();
        assert_eq!(manager.cached_bytes(), 64);

        let float_fmt = FrameFormat::new(BaseType::Float, FrameTarget::Native).with_dimensions(&[4, 4]);
        let reused = manager.new_frame(&float_fmt).unwrap();
        assert!(reused.same_frame(&frame));
        assert_eq!(reused.format(), float_fmt);
        assert_eq!(reused.format().size(), 64);
        assert_eq!(reused.ref_count(), 1);
        assert!(!reused.is_read_only());
        assert_eq!(manager.cached_bytes(), 0);

        let stats = manager.stats();
        assert_eq!(stats.frames_recycled, 1);
        assert_eq!(stats.native_allocations, 1);
    }

    #[test]
    fn test_dimension_mismatch_is_not_reused() {
        let manager = CachedFrameManager::new();
        let frame = manager
            .new_frame(&FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[4, 4]))
            .unwrap();
        frame.release().unwrap();
        let other = manager
            .new_frame(&FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[2, 8]))
            .unwrap();
        assert!(!other.same_frame(&frame));
        assert_eq!(manager.cached_frame_count(), 1);
    }

    #[test]
    fn test_eviction_is_fifo() {
        let manager = small_cache(100);
        let frames: Vec<Frame> = (0..3).map(|_| manager.new_frame(&bytes(40)).unwrap()).collect();
        for frame in &frames {
            frame.release().unwrap();
        }
        assert_eq!(manager.cached_bytes(), 80);
        assert!(!frames[0].is_allocated());
        assert!(frames[1].is_allocated());
        assert!(frames[2].is_allocated());

        let stats = manager.stats();
        assert_eq!(stats.frames_evicted, 1);
        assert_eq!(stats.native_frees, 1);

        let next = manager.new_frame(&bytes(40)).unwrap();
        assert!(next.same_frame(&frames[1]));
    }

    #[test]
    fn test_oversized_frame_is_rejected_without_eviction() {
        let manager = small_cache(100);
        let kept = manager.new_frame(&bytes(60)).unwrap();
        kept.release().unwrap();
        let huge = manager.new_frame(&bytes(150)).unwrap();
        huge.release().unwrap();

        assert_eq!(manager.cached_bytes(), 60);
        assert!(kept.is_allocated());
        assert!(!huge.is_allocated());
        let stats = manager.stats();
        assert_eq!(stats.frames_rejected, 1);
        assert_eq!(stats.frames_evicted, 0);
    }

    #[test]
    fn test_native_storage_freed_or_recycled_exactly_once() {
        let manager = small_cache(1024);
        for _ in 0..10 {
            let frame = manager.new_frame(&bytes(64)).unwrap();
            frame.retain().unwrap();
            frame.release().unwrap();
            frame.release().unwrap();
        }
        let stats = manager.stats();
        assert_eq!(stats.native_allocations, 1);
        assert_eq!(stats.frames_recycled, 9);
        assert_eq!(stats.live_native_allocations(), 1);

        manager.tear_down();
        let stats = manager.stats();
        assert_eq!(stats.native_frees, 1);
        assert_eq!(stats.live_native_allocations(), 0);
    }

    #[test]
    fn test_simple_frames_are_not_cached() {
        let manager = CachedFrameManager::new();
        let format = FrameFormat::new(BaseType::Int32, FrameTarget::Simple).with_dimensions(&[8]);
        let frame = manager.new_frame(&format).unwrap();
        frame.release().unwrap();
        assert_eq!(manager.cached_frame_count(), 0);
    }

    #[test]
    fn test_gpu_binding_must_match() {
        let backend = HostGpuBackend::new();
        let external = backend.upload_texture(vec![0; 16]);
        let env = GpuEnvironment::new(backend);
        env.activate().unwrap();

        let manager = CachedFrameManager::new();
        manager.set_gpu_environment(Some(env.clone()));
        let format = FrameFormat::image(2, 2, FrameTarget::Gpu);

        let bound = manager
            .new_bound_frame(&format, FrameBinding::new(BindingType::ExistingTexture, external))
            .unwrap();
        assert!(bound.is_read_only());
        bound.release().unwrap();
        assert_eq!(manager.cached_bytes(), 16);

        let unbound = manager.new_frame(&format).unwrap();
        assert!(!unbound.same_frame(&bound));

        let rebound = manager
            .new_bound_frame(&format, FrameBinding::new(BindingType::ExistingTexture, external))
            .unwrap();
        assert!(rebound.same_frame(&bound));
        assert!(rebound.is_read_only());
        env.deactivate();
    }

    #[test]
    fn test_external_textures_are_never_cached() {
        let env = GpuEnvironment::host();
        env.activate().unwrap();
        let manager = CachedFrameManager::new();
        manager.set_gpu_environment(Some(env.clone()));
        let format = FrameFormat::image(2, 2, FrameTarget::Gpu);
        let frame = manager
            .new_bound_frame(&format, FrameBinding::new(BindingType::ExternalTexture, 0))
            .unwrap();
        assert!(!frame.is_reusable());
        frame.release().unwrap();
        assert_eq!(manager.cached_frame_count(), 0);
        assert_eq!(manager.stats().native_frees, 1);
        env.deactivate();
    }
}
