//! Host-memory GPU backend.
//!
//! Emulates textures, framebuffers and vertex buffers with plain byte
//! vectors. Used when no hardware driver is plugged in and in tests.

use super::GpuBackend;
use crate::error::{Error, Result};
use crate::format::FrameFormat;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct HostState {
    next_id: u32,
    textures: HashMap<u32, Vec<u8>>,
    framebuffers: HashMap<u32, Option<u32>>,
    buffers: HashMap<u32, Vec<u8>>,
}

impl HostState {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// GPU backend keeping all resources in host memory.
#[derive(Default)]
pub struct HostGpuBackend {
    state: Mutex<HostState>,
}

impl HostGpuBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a texture with explicit contents, as a caller-owned texture
    /// handed to the engine would be.
    pub fn upload_texture(&self, data: Vec<u8>) -> u32 {
        let mut state = self.state.lock();
        let id = state.next();
        state.textures.insert(id, data);
        id
    }
}

fn missing(operation: &'static str, what: &str, id: u32) -> Error {
    Error::GpuResource {
        operation,
        message: format!("no {what} with id {id}"),
    }
}

impl GpuBackend for HostGpuBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn create_texture(&self, format: &FrameFormat) -> Result<u32> {
        let mut state = self.state.lock();
        let id = state.next();
        state.textures.insert(id, vec![0; format.size()]);
        Ok(id)
    }

    fn create_external_texture(&self) -> Result<u32> {
        let mut state = self.state.lock();
        let id = state.next();
        state.textures.insert(id, Vec::new());
        Ok(id)
    }

    fn texture_exists(&self, texture: u32) -> bool {
        self.state.lock().textures.contains_key(&texture)
    }

    fn write_texture(&self, texture: u32, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let storage = state
            .textures
            .get_mut(&texture)
            .ok_or_else(|| missing("write_texture", "texture", texture))?;
        if storage.len() < data.len() {
            storage.resize(data.len(), 0);
        }
        storage[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_texture(&self, texture: u32) -> Result<Vec<u8>> {
        self.state
            .lock()
            .textures
            .get(&texture)
            .cloned()
            .ok_or_else(|| missing("read_texture", "texture", texture))
    }

    fn copy_texture(&self, source: u32, target: u32) -> Result<()> {
        let mut state = self.state.lock();
        let data = state
            .textures
            .get(&source)
            .cloned()
            .ok_or_else(|| missing("copy_texture", "texture", source))?;
        let storage = state
            .textures
            .get_mut(&target)
            .ok_or_else(|| missing("copy_texture", "texture", target))?;
        *storage = data;
        Ok(())
    }

    fn delete_texture(&self, texture: u32) {
        self.state.lock().textures.remove(&texture);
    }

    fn create_framebuffer(&self) -> Result<u32> {
        let mut state = self.state.lock();
        let id = state.next();
        state.framebuffers.insert(id, None);
        Ok(id)
    }

    fn attach_texture(&self, framebuffer: u32, texture: u32) -> Result<()> {
        let mut state = self.state.lock();
        if !state.textures.contains_key(&texture) {
            return Err(missing("attach_texture", "texture", texture));
        }
        let slot = state
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| missing("attach_texture", "framebuffer", framebuffer))?;
        *slot = Some(texture);
        Ok(())
    }

    fn detach_texture(&self, framebuffer: u32) -> Result<()> {
        let mut state = self.state.lock();
        let slot = state
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| missing("detach_texture", "framebuffer", framebuffer))?;
        *slot = None;
        Ok(())
    }

    fn attached_texture(&self, framebuffer: u32) -> Option<u32> {
        self.state
            .lock()
            .framebuffers
            .get(&framebuffer)
            .copied()
            .flatten()
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        self.state.lock().framebuffers.remove(&framebuffer);
    }

    fn create_buffer(&self, size: usize) -> Result<u32> {
        let mut state = self.state.lock();
        let id = state.next();
        state.buffers.insert(id, vec![0; size]);
        Ok(id)
    }

    fn write_buffer(&self, buffer: u32, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let storage = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| missing("write_buffer", "buffer", buffer))?;
        storage.clear();
        storage.extend_from_slice(data);
        Ok(())
    }

    fn delete_buffer(&self, buffer: u32) {
        self.state.lock().buffers.remove(&buffer);
    }

    fn live_resources(&self) -> usize {
        let state = self.state.lock();
        state.textures.len() + state.framebuffers.len() + state.buffers.len()
    }

    fn release_all(&self) {
        let mut state = self.state.lock();
        state.textures.clear();
        state.framebuffers.clear();
        state.buffers.clear();
    }
}
