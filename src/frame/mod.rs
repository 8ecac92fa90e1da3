//! Frames: reference-counted buffer handles.
//!
//! A [`Frame`] is a cheap, cloneable handle to one buffer in one backing
//! store. Cloning the handle does not change the frame's reference count;
//! engine-level ownership is tracked explicitly with [`Frame::retain`] and
//! [`Frame::release`], which delegate to the [`FrameManager`] that created
//! the frame. When the count reaches zero the manager frees the backing
//! storage or offers the frame to its recycle cache.
//!
//! # Backing stores
//!
//! | Kind | Target | Native allocation | Recyclable | Readable |
//! |------|--------|-------------------|------------|----------|
//! | [`FrameKind::Simple`] | `Simple` | no | no | yes |
//! | [`FrameKind::Native`] | `Native` | yes | yes | yes |
//! | [`FrameKind::Gpu`] | `Gpu` | yes | yes (not external textures) | yes |
//! | [`FrameKind::VertexBuffer`] | `VertexBuffer` | yes | yes | no |
//! | [`FrameKind::Serialized`] | - | no | no | yes |

mod copy;
mod gpu;
mod native;
mod serialized;
mod simple;
mod vertex;

pub use copy::{CopyPath, copy_path};

use crate::error::{Error, Result};
use crate::format::{BaseType, FrameFormat, FrameTarget};
use crate::gpu::GpuEnvironment;
use crate::memory::FrameManager;
use crate::value::{Bitmap, Value};
use gpu::GpuStore;
use native::NativeStore;
use parking_lot::Mutex;
use rkyv::api::high::{HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::de::Pool;
use rkyv::rancor::{self, Strategy};
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use serialized::SerializedStore;
use simple::SimpleStore;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use vertex::VertexStore;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Descriptors
// ============================================================================

/// Frame timestamp in nanoseconds, or one of two sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Timestamp {
    /// The producer has not stamped the frame.
    #[default]
    NotSet,
    /// The time is unknown (a filter's current time before any input).
    Unknown,
    /// A concrete time.
    At(i64),
}

impl Timestamp {
    /// Whether a concrete time is present.
    pub fn is_set(&self) -> bool {
        matches!(self, Timestamp::At(_))
    }

    /// The concrete time, if any.
    pub fn nanos(&self) -> Option<i64> {
        match self {
            Timestamp::At(ns) => Some(*ns),
            _ => None,
        }
    }
}

/// How a GPU frame relates to externally-owned storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingType {
    /// Engine-owned texture (framebuffer created on demand).
    #[default]
    Unbound,
    /// Engine-allocated external-image texture; never recycled.
    ExternalTexture,
    /// Wraps a caller texture without owning it; the frame is read-only.
    ExistingTexture,
    /// Wraps a caller framebuffer and its attached texture; not owned.
    ExistingFramebuffer,
    /// Wraps a caller texture and takes ownership of it.
    AdoptedTexture,
}

/// Binding descriptor: binding type plus the external resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameBinding {
    /// Binding type.
    pub kind: BindingType,
    /// External texture or framebuffer id (unused when unbound).
    pub id: u32,
}

impl FrameBinding {
    /// No binding.
    pub const UNBOUND: FrameBinding = FrameBinding {
        kind: BindingType::Unbound,
        id: 0,
    };

    /// Create a binding descriptor.
    pub const fn new(kind: BindingType, id: u32) -> Self {
        Self { kind, id }
    }

    /// Whether the frame wraps external storage.
    pub fn is_bound(&self) -> bool {
        self.kind != BindingType::Unbound
    }

    /// Cache lookup rule: same type, and same id when bound.
    pub fn matches(&self, other: &FrameBinding) -> bool {
        self.kind == other.kind && (!self.is_bound() || self.id == other.id)
    }
}

/// Concrete backing store of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Host memory holding a typed value.
    Simple,
    /// Fixed-capacity byte buffer.
    Native,
    /// GPU texture / framebuffer.
    Gpu,
    /// GPU vertex buffer.
    VertexBuffer,
    /// Opaque serialized bytes.
    Serialized,
}

/// What a frame kind supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindCapabilities {
    /// Contents can be read back.
    pub readable: bool,
    /// Holds a native or GPU allocation that must be freed.
    pub native_allocation: bool,
    /// May be offered to a recycle cache.
    pub recyclable: bool,
    /// Stores arbitrary values, not just byte-convertible ones.
    pub object_values: bool,
}

impl FrameKind {
    /// Kind allocated for a format target.
    pub fn for_target(target: FrameTarget) -> Option<FrameKind> {
        match target {
            FrameTarget::Simple => Some(FrameKind::Simple),
            FrameTarget::Native => Some(FrameKind::Native),
            FrameTarget::Gpu => Some(FrameKind::Gpu),
            FrameTarget::VertexBuffer => Some(FrameKind::VertexBuffer),
            FrameTarget::Unspecified => None,
        }
    }

    /// Capability table entry for this kind.
    pub const fn capabilities(self) -> KindCapabilities {
        match self {
            FrameKind::Simple => KindCapabilities {
                readable: true,
                native_allocation: false,
                recyclable: false,
                object_values: true,
            },
            FrameKind::Native => KindCapabilities {
                readable: true,
                native_allocation: true,
                recyclable: true,
                object_values: false,
            },
            FrameKind::Gpu => KindCapabilities {
                readable: true,
                native_allocation: true,
                recyclable: true,
                object_values: false,
            },
            FrameKind::VertexBuffer => KindCapabilities {
                readable: false,
                native_allocation: true,
                recyclable: true,
                object_values: false,
            },
            FrameKind::Serialized => KindCapabilities {
                readable: true,
                native_allocation: false,
                recyclable: false,
                object_values: true,
            },
        }
    }
}

// ============================================================================
// Storage dispatch
// ============================================================================

pub(crate) enum Storage {
    Simple(SimpleStore),
    Native(NativeStore),
    Gpu(GpuStore),
    Vertex(VertexStore),
    Serialized(SerializedStore),
}

impl Storage {
    fn write_value(&mut self, format: &FrameFormat, value: &Value) -> Result<()> {
        match self {
            Storage::Simple(store) => store.set_value(format, value),
            Storage::Serialized(store) => store.store_value(value),
            Storage::Native(store) => store.write(&value_bytes(value)?),
            Storage::Gpu(store) => store.write(format, &value_bytes(value)?),
            Storage::Vertex(store) => store.write(&value_bytes(value)?),
        }
    }

    fn read_value(&self, format: &FrameFormat) -> Result<Value> {
        match self {
            Storage::Simple(store) => store.value(),
            Storage::Serialized(store) => store.load_value(),
            Storage::Native(store) => Ok(value_from_bytes(format, store.bytes().to_vec())),
            Storage::Gpu(store) => Ok(value_from_bytes(format, store.read()?)),
            Storage::Vertex(store) => store.read().map(Value::Bytes),
        }
    }

    fn write_bytes(&mut self, format: &FrameFormat, data: &[u8]) -> Result<()> {
        match self {
            Storage::Simple(store) => store.set_value(format, &value_from_bytes(format, data.to_vec())),
            Storage::Serialized(store) => store.store_value(&Value::Bytes(data.to_vec())),
            Storage::Native(store) => store.write(data),
            Storage::Gpu(store) => store.write(format, data),
            Storage::Vertex(store) => store.write(data),
        }
    }

    fn read_bytes(&self, format: &FrameFormat) -> Result<Vec<u8>> {
        match self {
            Storage::Native(store) => Ok(store.bytes().to_vec()),
            Storage::Gpu(store) => store.read(),
            Storage::Vertex(store) => store.read(),
            Storage::Simple(_) | Storage::Serialized(_) => {
                value_bytes(&self.read_value(format)?).map(Cow::into_owned)
            }
        }
    }

    /// Free backing resources. Returns whether a native allocation was freed.
    fn release(self) -> bool {
        match self {
            Storage::Simple(_) | Storage::Serialized(_) => false,
            Storage::Native(_) => true,
            Storage::Gpu(store) => {
                store.release();
                true
            }
            Storage::Vertex(store) => {
                store.release();
                true
            }
        }
    }
}

pub(crate) fn ints_to_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn floats_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn bytes_to_ints(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub(crate) fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Byte view of a value for byte-oriented stores.
pub(crate) fn value_bytes(value: &Value) -> Result<Cow<'_, [u8]>> {
    match value {
        Value::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        Value::Bitmap(bitmap) => Ok(Cow::Borrowed(&bitmap.pixels)),
        Value::Ints(ints) => Ok(Cow::Owned(ints_to_bytes(ints))),
        Value::Floats(floats) => Ok(Cow::Owned(floats_to_bytes(floats))),
        other => Err(Error::UnsupportedValue(format!(
            "{} values cannot be stored as bytes",
            other.kind_name()
        ))),
    }
}

/// Interpret raw bytes according to a format's base type.
pub(crate) fn value_from_bytes(format: &FrameFormat, bytes: Vec<u8>) -> Value {
    match format.base_type() {
        BaseType::Int32 => Value::Ints(bytes_to_ints(&bytes)),
        BaseType::Float => Value::Floats(bytes_to_floats(&bytes)),
        BaseType::Byte
            if format.bytes_per_sample() == Bitmap::BYTES_PER_PIXEL
                && format.dimension_count() == 2
                && bytes.len() == format.size() =>
        {
            Value::Bitmap(Bitmap {
                width: format.width(),
                height: format.height(),
                pixels: bytes,
            })
        }
        _ => Value::Bytes(bytes),
    }
}

// ============================================================================
// Frame
// ============================================================================

pub(crate) struct FrameState {
    format: FrameFormat,
    read_only: bool,
    reusable: bool,
    timestamp: Timestamp,
    storage: Option<Storage>,
}

struct FrameInner {
    id: u64,
    kind: FrameKind,
    binding: FrameBinding,
    ref_count: AtomicUsize,
    manager: Option<Weak<dyn FrameManager>>,
    state: Mutex<FrameState>,
}

/// Handle to a reference-counted frame.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    fn from_parts(
        kind: FrameKind,
        binding: FrameBinding,
        format: FrameFormat,
        storage: Storage,
        read_only: bool,
        reusable: bool,
        manager: Option<Weak<dyn FrameManager>>,
    ) -> Self {
        Self {
            inner: Arc::new(FrameInner {
                id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                binding,
                ref_count: AtomicUsize::new(1),
                manager,
                state: Mutex::new(FrameState {
                    format,
                    read_only,
                    reusable,
                    timestamp: Timestamp::NotSet,
                    storage: Some(storage),
                }),
            }),
        }
    }

    /// Allocate a frame for `format`'s target store.
    pub(crate) fn allocate(
        format: &FrameFormat,
        binding: FrameBinding,
        gpu: Option<&GpuEnvironment>,
        manager: Option<Weak<dyn FrameManager>>,
    ) -> Result<Frame> {
        format.checked_size()?;
        let kind = FrameKind::for_target(format.target()).ok_or_else(|| {
            Error::FormatMismatch(format!("cannot allocate a frame for format {format}"))
        })?;
        if binding.is_bound() && kind != FrameKind::Gpu {
            return Err(Error::UnsupportedOperation(format!(
                "{kind:?} frames cannot be bound to external storage"
            )));
        }
        let require_gpu = || {
            gpu.ok_or_else(|| {
                Error::InvalidState(format!(
                    "allocating a {kind:?} frame requires a GPU environment"
                ))
            })
        };

        let mut read_only = false;
        let storage = match kind {
            FrameKind::Simple => Storage::Simple(SimpleStore::new(format)),
            FrameKind::Native => Storage::Native(NativeStore::allocate(format)?),
            FrameKind::Gpu => {
                let store = GpuStore::allocate(require_gpu()?, format, binding)?;
                read_only = store.is_read_only_binding();
                Storage::Gpu(store)
            }
            FrameKind::VertexBuffer => {
                Storage::Vertex(VertexStore::allocate(require_gpu()?, format)?)
            }
            FrameKind::Serialized => {
                return Err(Error::UnsupportedOperation(
                    "serialized frames are created with Frame::serialize".into(),
                ));
            }
        };
        let reusable =
            kind.capabilities().recyclable && binding.kind != BindingType::ExternalTexture;
        Ok(Frame::from_parts(
            kind,
            binding,
            format.clone(),
            storage,
            read_only,
            reusable,
            manager,
        ))
    }

    /// Wrap a value in a transient simple frame with no manager.
    ///
    /// Retain and release are no-ops on the result.
    pub fn wrap_value(value: Value) -> Frame {
        let format = FrameFormat::for_value(&value, FrameTarget::Simple);
        Frame::from_parts(
            FrameKind::Simple,
            FrameBinding::UNBOUND,
            format,
            Storage::Simple(SimpleStore::with_value(value)),
            false,
            false,
            None,
        )
    }

    /// Serialize `value` into a transient frame for cross-thread hand-off.
    pub fn serialize<T>(value: &T) -> Result<Frame>
    where
        T: for<'a> rkyv::Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>
            + 'static,
    {
        let frame = Frame::from_parts(
            FrameKind::Serialized,
            FrameBinding::UNBOUND,
            FrameFormat::object::<T>(FrameTarget::Simple),
            Storage::Serialized(SerializedStore::default()),
            false,
            false,
            None,
        );
        frame.store_serialized(value)?;
        Ok(frame)
    }

    /// Serialize a built-in value into a transient frame.
    pub fn serialize_value(value: &Value) -> Result<Frame> {
        let frame = Frame::from_parts(
            FrameKind::Serialized,
            FrameBinding::UNBOUND,
            FrameFormat::for_value(value, FrameTarget::Simple),
            Storage::Serialized(SerializedStore::default()),
            false,
            false,
            None,
        );
        frame.set_value(value)?;
        Ok(frame)
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    /// Unique frame id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Backing store kind.
    pub fn kind(&self) -> FrameKind {
        self.inner.kind
    }

    /// Binding descriptor.
    pub fn binding(&self) -> FrameBinding {
        self.inner.binding
    }

    /// Copy of the frame's format.
    pub fn format(&self) -> FrameFormat {
        self.inner.state.lock().format.clone()
    }

    /// Whether the frame rejects mutation.
    pub fn is_read_only(&self) -> bool {
        self.inner.state.lock().read_only
    }

    /// Mark the contents as final. Irreversible until the frame is recycled.
    pub fn mark_read_only(&self) {
        self.inner.state.lock().read_only = true;
    }

    /// Whether a cache may recycle this frame.
    pub fn is_reusable(&self) -> bool {
        self.inner.state.lock().reusable
    }

    /// Frame timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.inner.state.lock().timestamp
    }

    /// Set the frame timestamp. Allowed on read-only frames.
    pub fn set_timestamp(&self, timestamp: Timestamp) {
        self.inner.state.lock().timestamp = timestamp;
    }

    /// Current engine-level reference count.
    pub fn ref_count(&self) -> usize {
        self.inner.ref_count.load(Ordering::Acquire)
    }

    /// Whether the frame was drawn from a manager.
    pub fn has_manager(&self) -> bool {
        self.inner.manager.is_some()
    }

    /// Whether both handles refer to the same frame.
    pub fn same_frame(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether backing storage is still attached.
    pub fn is_allocated(&self) -> bool {
        self.inner.state.lock().storage.is_some()
    }

    /// Whether the frame currently holds a native or GPU allocation.
    pub fn has_native_allocation(&self) -> bool {
        self.kind().capabilities().native_allocation && self.is_allocated()
    }

    pub(crate) fn describe(&self) -> String {
        format!("#{} ({:?})", self.inner.id, self.inner.kind)
    }

    // ------------------------------------------------------------------
    // Reference counting
    // ------------------------------------------------------------------

    /// Take another engine-level reference through the owning manager.
    pub fn retain(&self) -> Result<Frame> {
        if let Some(manager) = self.manager() {
            manager.retain_frame(self)?;
        }
        Ok(self.clone())
    }

    /// Drop an engine-level reference through the owning manager.
    pub fn release(&self) -> Result<()> {
        match self.manager() {
            Some(manager) => manager.release_frame(self),
            None => Ok(()),
        }
    }

    fn manager(&self) -> Option<Arc<dyn FrameManager>> {
        self.inner.manager.as_ref()?.upgrade()
    }

    pub(crate) fn inc_ref(&self) -> usize {
        self.inner.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn dec_ref(&self) -> Result<usize> {
        self.inner
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| Error::RefCountUnderflow(self.describe()))
    }

    /// Reinitialize a recycled frame for `format`.
    pub(crate) fn reset(&self, format: &FrameFormat) {
        let mut state = self.inner.state.lock();
        state.format = format.clone();
        state.read_only = matches!(&state.storage, Some(Storage::Gpu(g)) if g.is_read_only_binding());
        state.timestamp = Timestamp::NotSet;
        self.inner.ref_count.store(1, Ordering::Release);
    }

    pub(crate) fn on_store(&self) {
        if let Some(Storage::Gpu(store)) = &self.inner.state.lock().storage {
            store.on_store();
        }
    }

    pub(crate) fn on_fetch(&self) {
        if let Some(Storage::Gpu(store)) = &self.inner.state.lock().storage {
            store.on_fetch();
        }
    }

    /// Free backing storage. Returns whether a native allocation was freed;
    /// a second call frees nothing.
    pub(crate) fn deallocate(&self) -> bool {
        let storage = self.inner.state.lock().storage.take();
        storage.is_some_and(Storage::release)
    }

    // ------------------------------------------------------------------
    // Content access
    // ------------------------------------------------------------------

    fn write<R>(&self, f: impl FnOnce(&FrameFormat, &mut Storage) -> Result<R>) -> Result<R> {
        let mut state = self.inner.state.lock();
        if state.read_only {
            return Err(Error::ReadOnlyFrame(self.describe()));
        }
        let FrameState {
            format, storage, ..
        } = &mut *state;
        let storage = storage
            .as_mut()
            .ok_or_else(|| Error::FrameReleased(self.describe()))?;
        f(format, storage)
    }

    fn read<R>(&self, f: impl FnOnce(&FrameFormat, &Storage) -> Result<R>) -> Result<R> {
        let state = self.inner.state.lock();
        let storage = state
            .storage
            .as_ref()
            .ok_or_else(|| Error::FrameReleased(self.describe()))?;
        f(&state.format, storage)
    }

    /// Store a value, dispatching on its variant to the store's setters.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        self.write(|format, storage| storage.write_value(format, value))
    }

    /// Read the contents as a value.
    pub fn value(&self) -> Result<Value> {
        self.read(|format, storage| storage.read_value(format))
    }

    /// Replace the contents with raw bytes.
    pub fn set_data(&self, data: &[u8]) -> Result<()> {
        self.write(|format, storage| storage.write_bytes(format, data))
    }

    /// Raw bytes of the contents.
    pub fn data(&self) -> Result<Vec<u8>> {
        self.read(|format, storage| storage.read_bytes(format))
    }

    /// Store an int array.
    pub fn set_ints(&self, ints: &[i32]) -> Result<()> {
        self.set_value(&Value::Ints(ints.to_vec()))
    }

    /// Read an int array.
    pub fn ints(&self) -> Result<Vec<i32>> {
        match self.value()? {
            Value::Ints(ints) => Ok(ints),
            Value::Bytes(bytes) => Ok(bytes_to_ints(&bytes)),
            other => Err(self.wrong_value("int array", &other)),
        }
    }

    /// Store a float array.
    pub fn set_floats(&self, floats: &[f32]) -> Result<()> {
        self.set_value(&Value::Floats(floats.to_vec()))
    }

    /// Read a float array.
    pub fn floats(&self) -> Result<Vec<f32>> {
        match self.value()? {
            Value::Floats(floats) => Ok(floats),
            Value::Bytes(bytes) => Ok(bytes_to_floats(&bytes)),
            other => Err(self.wrong_value("float array", &other)),
        }
    }

    /// Store a bitmap.
    pub fn set_bitmap(&self, bitmap: &Bitmap) -> Result<()> {
        self.set_value(&Value::Bitmap(bitmap.clone()))
    }

    /// Read a bitmap.
    pub fn bitmap(&self) -> Result<Bitmap> {
        match self.value()? {
            Value::Bitmap(bitmap) => Ok(bitmap),
            other => Err(self.wrong_value("bitmap", &other)),
        }
    }

    fn wrong_value(&self, wanted: &str, found: &Value) -> Error {
        Error::UnsupportedValue(format!(
            "frame {} holds {}, not {wanted}",
            self.describe(),
            found.kind_name()
        ))
    }

    /// Serialize an arbitrary value into a serialized frame.
    pub fn store_serialized<T>(&self, value: &T) -> Result<()>
    where
        T: for<'a> rkyv::Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>
            + 'static,
    {
        let bytes = rkyv::to_bytes::<rancor::Error>(value)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        self.write(|_, storage| match storage {
            Storage::Serialized(store) => {
                store.store_bytes(bytes, std::any::type_name::<T>());
                Ok(())
            }
            _ => Err(Error::UnsupportedOperation(format!(
                "frame {} is not a serialized frame",
                self.describe()
            ))),
        })
    }

    /// Deserialize the value stored with [`store_serialized`](Self::store_serialized).
    pub fn load_serialized<T>(&self) -> Result<T>
    where
        T: rkyv::Archive + 'static,
        T::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
            + rkyv::Deserialize<T, Strategy<Pool, rancor::Error>>,
    {
        self.read(|_, storage| match storage {
            Storage::Serialized(store) => {
                let bytes = store.bytes_for(std::any::type_name::<T>())?;
                rkyv::from_bytes::<T, rancor::Error>(bytes)
                    .map_err(|e| Error::Serialization(e.to_string()))
            }
            _ => Err(Error::UnsupportedOperation(format!(
                "frame {} is not a serialized frame",
                self.describe()
            ))),
        })
    }

    // ------------------------------------------------------------------
    // GPU access
    // ------------------------------------------------------------------

    /// GPU environment the frame lives in.
    pub fn gpu_environment(&self) -> Option<GpuEnvironment> {
        match &self.inner.state.lock().storage {
            Some(Storage::Gpu(store)) => Some(store.environment().clone()),
            Some(Storage::Vertex(store)) => Some(store.environment().clone()),
            _ => None,
        }
    }

    /// Texture id of a GPU frame.
    pub fn texture_id(&self) -> Result<u32> {
        self.read(|_, storage| match storage {
            Storage::Gpu(store) => store.texture(),
            _ => Err(self.not_kind("GPU")),
        })
    }

    /// Framebuffer id of a GPU frame, creating one on first use.
    pub fn framebuffer_id(&self) -> Result<u32> {
        self.write(|_, storage| match storage {
            Storage::Gpu(store) => store.framebuffer(),
            _ => Err(self.not_kind("GPU")),
        })
    }

    /// Buffer id of a vertex frame.
    pub fn vertex_buffer_id(&self) -> Result<u32> {
        self.read(|_, storage| match storage {
            Storage::Vertex(store) => store.buffer_id(),
            _ => Err(self.not_kind("vertex buffer")),
        })
    }

    fn not_kind(&self, kind: &str) -> Error {
        Error::UnsupportedOperation(format!("frame {} is not a {kind} frame", self.describe()))
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.same_frame(other)
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Frame");
        s.field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("ref_count", &self.ref_count());
        if let Some(state) = self.inner.state.try_lock() {
            s.field("format", &state.format)
                .field("timestamp", &state.timestamp)
                .field("read_only", &state.read_only);
        }
        s.finish()
    }
}
