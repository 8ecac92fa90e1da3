//! GPU environment lifecycle.
//!
//! A [`GpuEnvironment`] owns one [`GpuBackend`] and models a rendering
//! context: it is current on at most one thread at a time, and every GPU or
//! vertex frame access checks that its environment is current on the calling
//! thread.
//!
//! ```rust
//! use framegraph::gpu::GpuEnvironment;
//!
//! let env = GpuEnvironment::host();
//! env.activate()?;
//! assert!(env.is_current());
//! assert!(GpuEnvironment::adopt_current().is_some());
//! env.deactivate();
//! # Ok::<(), framegraph::Error>(())
//! ```

mod host;
mod program;
mod traits;

pub use host::HostGpuBackend;
pub use program::ShaderProgram;
pub use traits::GpuBackend;

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<GpuEnvironment>> = const { RefCell::new(None) };
}

struct EnvInner {
    id: u64,
    backend: Box<dyn GpuBackend>,
    owner: Mutex<Option<ThreadId>>,
    torn_down: AtomicBool,
}

/// A rendering environment bound to one backend.
///
/// Cloning yields another handle to the same environment.
#[derive(Clone)]
pub struct GpuEnvironment {
    inner: Arc<EnvInner>,
}

impl GpuEnvironment {
    /// Create an environment over `backend`. It is not current anywhere yet.
    pub fn new(backend: impl GpuBackend + 'static) -> Self {
        let id = NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(env = id, backend = backend.name(), "created GPU environment");
        Self {
            inner: Arc::new(EnvInner {
                id,
                backend: Box::new(backend),
                owner: Mutex::new(None),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Create an environment over a [`HostGpuBackend`].
    pub fn host() -> Self {
        Self::new(HostGpuBackend::new())
    }

    /// The environment current on the calling thread, if any.
    pub fn adopt_current() -> Option<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Unique environment id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The backend driving this environment.
    pub fn backend(&self) -> &dyn GpuBackend {
        self.inner.backend.as_ref()
    }

    /// Whether [`tear_down`](Self::tear_down) has run.
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }

    /// Make this environment current on the calling thread.
    ///
    /// Any other environment current on this thread is deactivated. Fails
    /// with [`Error::GpuContextBusy`] if the environment is current on a
    /// different thread.
    pub fn activate(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(Error::InvalidState(format!(
                "GPU environment {} has been torn down",
                self.id()
            )));
        }
        let me = thread::current().id();
        {
            let mut owner = self.inner.owner.lock();
            match *owner {
                Some(other) if other != me => return Err(Error::GpuContextBusy(self.id())),
                Some(_) => return Ok(()),
                None => *owner = Some(me),
            }
        }
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        if let Some(previous) = previous {
            if !previous.same_as(self) {
                *previous.inner.owner.lock() = None;
            }
        }
        tracing::trace!(env = self.id(), "activated GPU environment");
        Ok(())
    }

    /// Release this environment from the calling thread. No-op if it is not
    /// current here.
    pub fn deactivate(&self) {
        let me = thread::current().id();
        let mut owner = self.inner.owner.lock();
        if *owner != Some(me) {
            return;
        }
        *owner = None;
        drop(owner);
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if current.as_ref().is_some_and(|env| env.same_as(self)) {
                *current = None;
            }
        });
        tracing::trace!(env = self.id(), "deactivated GPU environment");
    }

    /// Whether this environment is current on the calling thread.
    pub fn is_current(&self) -> bool {
        !self.is_torn_down() && *self.inner.owner.lock() == Some(thread::current().id())
    }

    /// Fail with [`Error::GpuContextNotCurrent`] unless current here.
    pub fn ensure_current(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(Error::GpuContextNotCurrent(self.id()))
        }
    }

    /// Free every backend resource and make further access fail.
    pub fn tear_down(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.backend.release_all();
        let me = thread::current().id();
        let was_here = {
            let mut owner = self.inner.owner.lock();
            let here = *owner == Some(me);
            *owner = None;
            here
        };
        if was_here {
            CURRENT.with(|current| {
                let mut current = current.borrow_mut();
                if current.as_ref().is_some_and(|env| env.same_as(self)) {
                    *current = None;
                }
            });
        }
        tracing::debug!(env = self.id(), "tore down GPU environment");
    }

    /// Whether both handles refer to the same environment.
    pub fn same_as(&self, other: &GpuEnvironment) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for GpuEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuEnvironment")
            .field("id", &self.id())
            .field("backend", &self.inner.backend.name())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
