//! Non-caching frame manager.

use super::{FrameManager, ManagerCore, ManagerStats};
use crate::error::Result;
use crate::format::FrameFormat;
use crate::frame::{Frame, FrameBinding};
use crate::gpu::GpuEnvironment;
use std::sync::Arc;

/// Allocates on every request; frees storage when the count reaches zero.
pub struct SimpleFrameManager {
    core: ManagerCore,
}

impl SimpleFrameManager {
    /// Create a manager.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &std::sync::Weak<Self>| {
            let this: std::sync::Weak<dyn FrameManager> = this.clone();
            Self {
                core: ManagerCore::new(this),
            }
        })
    }
}

impl FrameManager for SimpleFrameManager {
    fn new_frame(&self, format: &FrameFormat) -> Result<Frame> {
        self.core.allocate(format, FrameBinding::UNBOUND)
    }

    fn new_bound_frame(&self, format: &FrameFormat, binding: FrameBinding) -> Result<Frame> {
        self.core.allocate(format, binding)
    }

    fn retain_frame(&self, frame: &Frame) -> Result<()> {
        frame.inc_ref();
        Ok(())
    }

    fn release_frame(&self, frame: &Frame) -> Result<()> {
        if frame.dec_ref()? == 0 {
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
        self.core.stats()
    }

    fn tear_down(&self) {
        self.core.mark_torn_down();
    }
}
