//! Write-only GPU vertex buffer store.

use crate::error::{Error, Result};
use crate::format::FrameFormat;
use crate::gpu::GpuEnvironment;

pub(crate) struct VertexStore {
    env: GpuEnvironment,
    buffer: u32,
    capacity: usize,
}

impl VertexStore {
    pub(crate) fn allocate(env: &GpuEnvironment, format: &FrameFormat) -> Result<Self> {
        env.ensure_current()?;
        let capacity = format.size();
        let buffer = env.backend().create_buffer(capacity)?;
        Ok(Self {
            env: env.clone(),
            buffer,
            capacity,
        })
    }

    pub(crate) fn environment(&self) -> &GpuEnvironment {
        &self.env
    }

    pub(crate) fn buffer_id(&self) -> Result<u32> {
        self.env.ensure_current()?;
        Ok(self.buffer)
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        self.env.ensure_current()?;
        if data.len() > self.capacity {
            return Err(Error::CapacityExceeded {
                requested: data.len(),
                capacity: self.capacity,
            });
        }
        self.env.backend().write_buffer(self.buffer, data)
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        Err(Error::UnsupportedOperation(
            "vertex frames are write-only and cannot be read back".into(),
        ))
    }

    pub(crate) fn release(self) {
        self.env.backend().delete_buffer(self.buffer);
    }
}
