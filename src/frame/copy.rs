//! Cross-store frame copy.
//!
//! Copies are dispatched through a `(source kind, target kind)` table. A few
//! pairs have direct store-to-store paths; every other pair reads the source
//! as a [`Value`](crate::value::Value) and writes it into the target.

use super::{Frame, FrameKind, FrameState, Storage};
use crate::error::{Error, Result};
use parking_lot::MutexGuard;

/// How a copy between two frame kinds is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyPath {
    /// Byte copy between native buffers.
    NativeToNative,
    /// Upload a native buffer into a texture.
    NativeToGpu,
    /// Read a texture back into a native buffer.
    GpuToNative,
    /// Texture-to-texture copy.
    GpuToGpu,
    /// Clone the stored value between object stores of the same kind.
    ObjectToObject,
    /// Read the source as a value and write it into the target.
    Generic,
}

/// Copy path for a source/target kind pair.
pub const fn copy_path(source: FrameKind, target: FrameKind) -> CopyPath {
    match (source, target) {
        (FrameKind::Native, FrameKind::Native) => CopyPath::NativeToNative,
        (FrameKind::Native, FrameKind::Gpu) => CopyPath::NativeToGpu,
        (FrameKind::Gpu, FrameKind::Native) => CopyPath::GpuToNative,
        (FrameKind::Gpu, FrameKind::Gpu) => CopyPath::GpuToGpu,
        (FrameKind::Simple, FrameKind::Simple) | (FrameKind::Serialized, FrameKind::Serialized) => {
            CopyPath::ObjectToObject
        }
        _ => CopyPath::Generic,
    }
}

/// Lock two distinct frames in id order, returning (source, target) guards.
fn lock_pair<'a>(
    source: &'a Frame,
    target: &'a Frame,
) -> (MutexGuard<'a, FrameState>, MutexGuard<'a, FrameState>) {
    if source.id() < target.id() {
        let s = source.inner.state.lock();
        let t = target.inner.state.lock();
        (s, t)
    } else {
        let t = target.inner.state.lock();
        let s = source.inner.state.lock();
        (s, t)
    }
}

impl Frame {
    /// Copy the contents of `source` into this frame.
    ///
    /// Copying a frame onto itself is a no-op.
    pub fn set_data_from_frame(&self, source: &Frame) -> Result<()> {
        if self.same_frame(source) {
            return Ok(());
        }
        let path = copy_path(source.kind(), self.kind());
        tracing::trace!(
            source = source.id(),
            target = self.id(),
            ?path,
            "copying frame contents"
        );
        if path == CopyPath::Generic {
            let value = source.value()?;
            return self.set_value(&value);
        }

        let (source_state, mut target_state) = lock_pair(source, self);
        if target_state.read_only {
            return Err(Error::ReadOnlyFrame(self.describe()));
        }
        let source_store = source_state
            .storage
            .as_ref()
            .ok_or_else(|| Error::FrameReleased(source.describe()))?;
        let FrameState {
            format, storage, ..
        } = &mut *target_state;
        let target_store = storage
            .as_mut()
            .ok_or_else(|| Error::FrameReleased(self.describe()))?;

        match (source_store, target_store) {
            (Storage::Native(src), Storage::Native(dst)) => dst.write(src.bytes()),
            (Storage::Native(src), Storage::Gpu(dst)) => dst.write(format, src.bytes()),
            (Storage::Gpu(src), Storage::Native(dst)) => dst.write(&src.read()?),
            (Storage::Gpu(src), Storage::Gpu(dst)) => dst.copy_from(format, src),
            (Storage::Simple(src), Storage::Simple(dst)) => dst.copy_from(format, src),
            (Storage::Serialized(src), Storage::Serialized(dst)) => {
                dst.copy_from(src);
                Ok(())
            }
            _ => Err(Error::UnsupportedOperation(format!(
                "no direct copy path from {} to {}",
                source.describe(),
                self.describe()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{BaseType, FrameFormat, FrameTarget};
    use crate::frame::FrameBinding;
    use crate::gpu::GpuEnvironment;
    use crate::value::Value;

    const KINDS: [FrameKind; 5] = [
        FrameKind::Simple,
        FrameKind::Native,
        FrameKind::Gpu,
        FrameKind::VertexBuffer,
        FrameKind::Serialized,
    ];

    #[test]
    fn test_copy_table_is_exhaustive() {
        let mut fast = 0;
        for source in KINDS {
            for target in KINDS {
                let path = copy_path(source, target);
                if path != CopyPath::Generic {
                    fast += 1;
                }
                if target == FrameKind::VertexBuffer || source == FrameKind::VertexBuffer {
                    assert_eq!(path, CopyPath::Generic, "{source:?} -> {target:?}");
                }
            }
        }
        assert_eq!(fast, 6);
        assert_eq!(copy_path(FrameKind::Native, FrameKind::Gpu), CopyPath::NativeToGpu);
        assert_eq!(copy_path(FrameKind::Simple, FrameKind::Native), CopyPath::Generic);
    }

    fn alloc(format: &FrameFormat, env: Option<&GpuEnvironment>) -> Frame {
        Frame::allocate(format, FrameBinding::UNBOUND, env, None).unwrap()
    }

    #[test]
    fn test_native_gpu_native_copy() {
        let env = GpuEnvironment::host();
        env.activate().unwrap();
        let native_fmt = FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[4]);
        let gpu_fmt = native_fmt.clone().with_target(FrameTarget::Gpu);

        let a = alloc(&native_fmt, None);
        let texture = alloc(&gpu_fmt, Some(&env));
        let b = alloc(&native_fmt, None);
        a.set_data(&[9, 8, 7, 6]).unwrap();
        texture.set_data_from_frame(&a).unwrap();
        b.set_data_from_frame(&texture).unwrap();
        assert_eq!(b.data().unwrap(), vec![9, 8, 7, 6]);
        env.deactivate();
    }

    #[test]
    fn test_generic_copy_simple_to_native() {
        let simple = Frame::wrap_value(Value::Ints(vec![1, 2]));
        let format = FrameFormat::new(BaseType::Int32, FrameTarget::Native).with_dimensions(&[2]);
        let native = alloc(&format, None);
        native.set_data_from_frame(&simple).unwrap();
        assert_eq!(native.ints().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_copy_into_smaller_native_fails() {
        let big = alloc(&FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[8]), None);
        let small = alloc(&FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[2]), None);
        assert!(matches!(
            small.set_data_from_frame(&big),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_self_copy_is_noop() {
        let frame = Frame::wrap_value(Value::Int(1));
        frame.set_data_from_frame(&frame).unwrap();
    }

    #[test]
    fn test_vertex_source_cannot_be_copied() {
        let env = GpuEnvironment::host();
        env.activate().unwrap();
        let vertex = alloc(
            &FrameFormat::new(BaseType::Float, FrameTarget::VertexBuffer).with_dimensions(&[4]),
            Some(&env),
        );
        vertex.set_floats(&[0.0, 1.0, 0.0, 1.0]).unwrap();
        let target = Frame::wrap_value(Value::Floats(vec![]));
        assert!(matches!(
            target.set_data_from_frame(&vertex),
            Err(Error::UnsupportedOperation(_))
        ));
        env.deactivate();
    }
}
