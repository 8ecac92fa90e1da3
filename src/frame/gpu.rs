//! GPU texture / framebuffer store.

use super::{BindingType, FrameBinding};
use crate::error::{Error, Result};
use crate::format::FrameFormat;
use crate::gpu::GpuEnvironment;

pub(crate) struct GpuStore {
    env: GpuEnvironment,
    binding: BindingType,
    texture: Option<u32>,
    framebuffer: Option<u32>,
    owns_texture: bool,
    owns_framebuffer: bool,
}

impl GpuStore {
    /// Allocate or wrap GPU resources according to `binding`.
    ///
    /// The environment must be current on the calling thread.
    pub(crate) fn allocate(
        env: &GpuEnvironment,
        format: &FrameFormat,
        binding: FrameBinding,
    ) -> Result<Self> {
        env.ensure_current()?;
        let backend = env.backend();
        let mut store = Self {
            env: env.clone(),
            binding: binding.kind,
            texture: None,
            framebuffer: None,
            owns_texture: false,
            owns_framebuffer: false,
        };
        match binding.kind {
            BindingType::Unbound => {
                store.texture = Some(backend.create_texture(format)?);
                store.owns_texture = true;
            }
            BindingType::ExternalTexture => {
                store.texture = Some(backend.create_external_texture()?);
                store.owns_texture = true;
            }
            BindingType::ExistingTexture | BindingType::AdoptedTexture => {
                if !backend.texture_exists(binding.id) {
                    return Err(Error::GpuResource {
                        operation: "bind_texture",
                        message: format!("texture {} does not exist", binding.id),
                    });
                }
                store.texture = Some(binding.id);
                store.owns_texture = binding.kind == BindingType::AdoptedTexture;
            }
            BindingType::ExistingFramebuffer => {
                store.framebuffer = Some(binding.id);
                store.texture = backend.attached_texture(binding.id);
            }
        }
        tracing::trace!(
            env = env.id(),
            binding = ?binding.kind,
            texture = ?store.texture,
            "allocated GPU frame storage"
        );
        Ok(store)
    }

    pub(crate) fn is_read_only_binding(&self) -> bool {
        self.binding == BindingType::ExistingTexture
    }

    pub(crate) fn environment(&self) -> &GpuEnvironment {
        &self.env
    }

    pub(crate) fn texture(&self) -> Result<u32> {
        self.env.ensure_current()?;
        self.texture.ok_or_else(|| Error::GpuResource {
            operation: "texture",
            message: "framebuffer has no attached texture".into(),
        })
    }

    /// Framebuffer rendering into this frame, created on first use.
    pub(crate) fn framebuffer(&mut self) -> Result<u32> {
        self.env.ensure_current()?;
        if let Some(fbo) = self.framebuffer {
            return Ok(fbo);
        }
        let texture = self.texture()?;
        let backend = self.env.backend();
        let fbo = backend.create_framebuffer()?;
        if let Err(e) = backend.attach_texture(fbo, texture) {
            backend.delete_framebuffer(fbo);
            return Err(e);
        }
        self.framebuffer = Some(fbo);
        self.owns_framebuffer = true;
        Ok(fbo)
    }

    pub(crate) fn write(&mut self, format: &FrameFormat, data: &[u8]) -> Result<()> {
        let texture = self.texture()?;
        let capacity = format.size();
        if self.binding != BindingType::ExternalTexture && data.len() > capacity {
            return Err(Error::CapacityExceeded {
                requested: data.len(),
                capacity,
            });
        }
        self.env.backend().write_texture(texture, data)
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        let texture = self.texture()?;
        self.env.backend().read_texture(texture)
    }

    pub(crate) fn copy_from(&mut self, format: &FrameFormat, source: &GpuStore) -> Result<()> {
        if self.env.same_as(&source.env) {
            let (src, dst) = (source.texture()?, self.texture()?);
            self.env.backend().copy_texture(src, dst)
        } else {
            let data = source.read()?;
            self.write(format, &data)
        }
    }

    /// Detach a non-owned texture from its framebuffer while cached, so
    /// external changes to the texture cannot leak through the framebuffer.
    pub(crate) fn on_store(&self) {
        if let (false, Some(fbo), Some(_)) = (self.owns_texture, self.framebuffer, self.texture) {
            if let Err(e) = self.env.backend().detach_texture(fbo) {
                tracing::warn!(fbo, error = %e, "failed to detach texture on store");
            }
        }
    }

    pub(crate) fn on_fetch(&self) {
        if let (false, Some(fbo), Some(texture)) = (self.owns_texture, self.framebuffer, self.texture)
        {
            if let Err(e) = self.env.backend().attach_texture(fbo, texture) {
                tracing::warn!(fbo, texture, error = %e, "failed to reattach texture on fetch");
            }
        }
    }

    pub(crate) fn release(self) {
        let backend = self.env.backend();
        if self.owns_framebuffer {
            if let Some(fbo) = self.framebuffer {
                backend.delete_framebuffer(fbo);
            }
        }
        if self.owns_texture {
            if let Some(texture) = self.texture {
                backend.delete_texture(texture);
            }
        }
    }
}
