//! GPU backend trait.
//!
//! The engine only needs the buffer/copy contract of a GPU: allocate
//! textures, framebuffers and vertex buffers, move bytes in and out, and
//! attach textures to framebuffers. Shader compilation and drawing live
//! outside the engine.

use crate::error::Result;
use crate::format::FrameFormat;

/// Backend-specific GPU resource operations.
///
/// Resource ids are backend handles; `0` is never a valid id. Implementations
/// must be thread-safe, but the engine only calls into a backend from the
/// thread its [`GpuEnvironment`](super::GpuEnvironment) is current on.
pub trait GpuBackend: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Allocate a texture large enough for `format`.
    fn create_texture(&self, format: &FrameFormat) -> Result<u32>;

    /// Allocate an external-image texture target.
    fn create_external_texture(&self) -> Result<u32>;

    /// Whether `texture` names a live texture.
    fn texture_exists(&self, texture: u32) -> bool;

    /// Replace the texture contents.
    fn write_texture(&self, texture: u32, data: &[u8]) -> Result<()>;

    /// Read back the texture contents.
    fn read_texture(&self, texture: u32) -> Result<Vec<u8>>;

    /// Copy one texture into another.
    fn copy_texture(&self, source: u32, target: u32) -> Result<()>;

    /// Free a texture.
    fn delete_texture(&self, texture: u32);

    /// Allocate a framebuffer object.
    fn create_framebuffer(&self) -> Result<u32>;

    /// Attach `texture` as the color target of `framebuffer`.
    fn attach_texture(&self, framebuffer: u32, texture: u32) -> Result<()>;

    /// Detach whatever texture is attached to `framebuffer`.
    fn detach_texture(&self, framebuffer: u32) -> Result<()>;

    /// Texture currently attached to `framebuffer`.
    fn attached_texture(&self, framebuffer: u32) -> Option<u32>;

    /// Free a framebuffer object.
    fn delete_framebuffer(&self, framebuffer: u32);

    /// Allocate a vertex buffer of `size` bytes.
    fn create_buffer(&self, size: usize) -> Result<u32>;

    /// Upload vertex data.
    fn write_buffer(&self, buffer: u32, data: &[u8]) -> Result<()>;

    /// Free a vertex buffer.
    fn delete_buffer(&self, buffer: u32);

    /// Number of live resources of any kind.
    fn live_resources(&self) -> usize;

    /// Free every resource. Called once on environment tear-down.
    fn release_all(&self);
}
