//! Fixed-capacity native byte store.

use crate::error::{Error, Result};
use crate::format::FrameFormat;

pub(crate) struct NativeStore {
    buffer: Box<[u8]>,
}

impl NativeStore {
    /// Allocate a zeroed buffer of exactly the format's size.
    pub(crate) fn allocate(format: &FrameFormat) -> Result<Self> {
        let size = format.size();
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(size).map_err(|e| {
            Error::AllocationFailed(format!("native frame of {size} bytes: {e}"))
        })?;
        buffer.resize(size, 0);
        Ok(Self {
            buffer: buffer.into_boxed_slice(),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Overwrite the leading bytes. Larger writes fail without modifying.
    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.capacity() {
            return Err(Error::CapacityExceeded {
                requested: data.len(),
                capacity: self.capacity(),
            });
        }
        self.buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }
}
