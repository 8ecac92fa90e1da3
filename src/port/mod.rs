//! Filter ports.
//!
//! Every connection joins exactly one [`OutputPort`] to exactly one
//! [`InputPort`]; fan-out goes through an explicit branch filter. Opening or
//! closing either end of a connection opens or closes the other, so a pipe
//! changes state as a unit.
//!
//! Input ports come in four kinds, see [`InputKind`]:
//!
//! | Kind | Holds | Pull | Assignment |
//! |------|-------|------|------------|
//! | `Stream` | one frame (or a persistent frame) | yes | push / set |
//! | `Field` | pending value for a [`FieldHandle`] | no | on transfer |
//! | `Final` | value for a [`FieldHandle`] | no | once, immediately |
//! | `Program` | pending value for a shader host variable | no | on transfer |

mod field;
mod set;

pub use field::FieldHandle;
pub(crate) use field::{FieldTarget, ProgramTarget, ValueTarget};
pub use set::PortSet;

use crate::error::{Error, Result};
use crate::format::FrameFormat;
use crate::frame::Frame;
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

// ============================================================================
// Port kinds
// ============================================================================

/// Concrete kind of an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Streams frames from an upstream output.
    Stream,
    /// Feeds a filter parameter; new values apply at the next step.
    Field,
    /// Feeds a filter parameter that may be assigned only once, before init.
    Final,
    /// Feeds a shader program host variable.
    Program,
}

/// What an input port kind supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputCapabilities {
    /// Frames can be pulled by the filter.
    pub pullable: bool,
    /// Pushed frames are unwrapped into a bound value.
    pub value_bound: bool,
    /// The value may be assigned at most once.
    pub assign_once: bool,
}

impl InputKind {
    /// Capability table entry for this kind.
    pub const fn capabilities(self) -> InputCapabilities {
        match self {
            InputKind::Stream => InputCapabilities {
                pullable: true,
                value_bound: false,
                assign_once: false,
            },
            InputKind::Field | InputKind::Program => InputCapabilities {
                pullable: false,
                value_bound: true,
                assign_once: false,
            },
            InputKind::Final => InputCapabilities {
                pullable: false,
                value_bound: true,
                assign_once: true,
            },
        }
    }
}

// ============================================================================
// Input port
// ============================================================================

struct ValueSlot {
    target: Box<dyn ValueTarget>,
    value: Option<Value>,
    waiting: bool,
    has_frame: bool,
    assigned: bool,
}

enum InputSlot {
    Stream {
        frame: Option<Frame>,
        persistent: bool,
    },
    Field(ValueSlot),
    Final(ValueSlot),
    Program(ValueSlot),
}

impl InputSlot {
    fn kind(&self) -> InputKind {
        match self {
            InputSlot::Stream { .. } => InputKind::Stream,
            InputSlot::Field(_) => InputKind::Field,
            InputSlot::Final(_) => InputKind::Final,
            InputSlot::Program(_) => InputKind::Program,
        }
    }

    fn value_slot(&mut self) -> Option<&mut ValueSlot> {
        match self {
            InputSlot::Stream { .. } => None,
            InputSlot::Field(slot) | InputSlot::Final(slot) | InputSlot::Program(slot) => {
                Some(slot)
            }
        }
    }

    fn has_frame(&self) -> bool {
        match self {
            InputSlot::Stream { frame, .. } => frame.is_some(),
            InputSlot::Field(slot) | InputSlot::Final(slot) | InputSlot::Program(slot) => {
                slot.has_frame
            }
        }
    }

    fn accepts_frame(&self) -> bool {
        match self {
            InputSlot::Stream { frame, .. } => frame.is_none(),
            InputSlot::Field(slot) | InputSlot::Final(slot) | InputSlot::Program(slot) => {
                !slot.waiting
            }
        }
    }
}

struct InputState {
    format: FrameFormat,
    open: bool,
    blocking: bool,
    checks_type: bool,
    source: Option<Weak<OutputShared>>,
    slot: InputSlot,
}

struct InputShared {
    filter: String,
    name: String,
    state: Mutex<InputState>,
}

/// Receiving end of a connection.
///
/// Cloning yields another handle to the same port.
#[derive(Clone)]
pub struct InputPort {
    shared: Arc<InputShared>,
}

impl InputPort {
    fn with_slot(filter: &str, name: &str, format: FrameFormat, slot: InputSlot) -> Self {
        Self {
            shared: Arc::new(InputShared {
                filter: filter.to_string(),
                name: name.to_string(),
                state: Mutex::new(InputState {
                    format,
                    open: false,
                    blocking: true,
                    checks_type: false,
                    source: None,
                    slot,
                }),
            }),
        }
    }

    /// Create a stream port accepting frames matching `format`.
    pub fn stream(filter: &str, name: &str, format: FrameFormat) -> Self {
        Self::with_slot(
            filter,
            name,
            format,
            InputSlot::Stream {
                frame: None,
                persistent: false,
            },
        )
    }

    pub(crate) fn value_bound(
        filter: &str,
        name: &str,
        kind: InputKind,
        target: Box<dyn ValueTarget>,
        has_default: bool,
    ) -> Self {
        let slot = ValueSlot {
            value: if has_default { target.current() } else { None },
            target,
            waiting: false,
            has_frame: has_default,
            assigned: false,
        };
        let slot = match kind {
            InputKind::Final => InputSlot::Final(slot),
            InputKind::Program => InputSlot::Program(slot),
            InputKind::Field | InputKind::Stream => InputSlot::Field(slot),
        };
        Self::with_slot(filter, name, FrameFormat::unspecified(), slot)
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Name of the owning filter.
    pub fn filter_name(&self) -> &str {
        &self.shared.filter
    }

    /// `filter.port` label used in errors and logs.
    pub fn describe(&self) -> String {
        format!("{}.{}", self.shared.filter, self.shared.name)
    }

    /// Concrete kind of this port.
    pub fn kind(&self) -> InputKind {
        self.shared.state.lock().slot.kind()
    }

    /// Declared format mask.
    pub fn format(&self) -> FrameFormat {
        self.shared.state.lock().format.clone()
    }

    /// Replace the declared format mask.
    pub fn set_format(&self, format: FrameFormat) {
        self.shared.state.lock().format = format;
    }

    /// Whether the port is open.
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// Open the port and its upstream output.
    pub fn open(&self) {
        let source = {
            let mut state = self.shared.state.lock();
            if state.open {
                return;
            }
            state.open = true;
            state.source.as_ref().and_then(Weak::upgrade)
        };
        tracing::trace!(port = %self.describe(), "opened input port");
        if let Some(source) = source {
            OutputPort { shared: source }.open();
        }
    }

    /// Close the port and its upstream output.
    pub fn close(&self) {
        let source = {
            let mut state = self.shared.state.lock();
            if !state.open {
                return;
            }
            state.open = false;
            state.source.as_ref().and_then(Weak::upgrade)
        };
        tracing::trace!(port = %self.describe(), "closed input port");
        if let Some(source) = source {
            OutputPort { shared: source }.close();
        }
    }

    /// Whether readiness requires a frame.
    pub fn is_blocking(&self) -> bool {
        self.shared.state.lock().blocking
    }

    /// Set whether readiness requires a frame.
    pub fn set_blocking(&self, blocking: bool) {
        self.shared.state.lock().blocking = blocking;
    }

    /// Whether pushed frames are checked against the format mask.
    pub fn checks_type(&self) -> bool {
        self.shared.state.lock().checks_type
    }

    /// Enable or disable per-frame format checks.
    pub fn set_checks_type(&self, checks: bool) {
        self.shared.state.lock().checks_type = checks;
    }

    /// Whether an upstream output is connected.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().source.is_some()
    }

    /// The connected upstream output.
    pub fn source(&self) -> Option<OutputPort> {
        let source = self.shared.state.lock().source.as_ref().and_then(Weak::upgrade);
        source.map(|shared| OutputPort { shared })
    }

    /// Format of the connected upstream output.
    pub fn source_format(&self) -> Option<FrameFormat> {
        self.source().map(|source| source.format())
    }

    fn set_source(&self, source: &OutputPort) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.source.is_some() {
            return Err(Error::AlreadyConnected(self.describe()));
        }
        state.source = Some(Arc::downgrade(&source.shared));
        Ok(())
    }

    /// Whether a frame or value is available.
    pub fn has_frame(&self) -> bool {
        self.shared.state.lock().slot.has_frame()
    }

    /// `has_frame() || !is_blocking()`.
    pub fn is_ready(&self) -> bool {
        let state = self.shared.state.lock();
        state.slot.has_frame() || !state.blocking
    }

    /// Whether another frame can be pushed without overwriting one.
    pub fn accepts_frame(&self) -> bool {
        self.shared.state.lock().slot.accepts_frame()
    }

    /// Natural end of stream: closed, blocking and drained.
    pub fn filter_must_close(&self) -> bool {
        let state = self.shared.state.lock();
        !state.open && state.blocking && !state.slot.has_frame()
    }

    /// Push a one-shot frame; it must be pulled before the next push.
    pub fn push_frame(&self, frame: &Frame) -> Result<()> {
        self.assign_frame(frame, false)
    }

    /// Set a persistent frame that survives pulls until replaced.
    pub fn set_frame(&self, frame: &Frame) -> Result<()> {
        self.assign_frame(frame, true)
    }

    /// Push a value, wrapping it in a transient frame for stream ports.
    pub fn push_value(&self, value: Value) -> Result<()> {
        self.assign_frame(&Frame::wrap_value(value), false)
    }

    /// Set a persistent value.
    pub fn set_value(&self, value: Value) -> Result<()> {
        self.assign_frame(&Frame::wrap_value(value), true)
    }

    fn assign_frame(&self, frame: &Frame, persistent: bool) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.open {
            return Err(Error::PortClosed(self.describe()));
        }
        let format = frame.format();
        if (state.checks_type || persistent) && !format.is_compatible_with(&state.format) {
            return Err(Error::FormatMismatch(format!(
                "frame format {format} is not compatible with {} on port {}",
                state.format,
                self.describe()
            )));
        }
        match &mut state.slot {
            InputSlot::Stream {
                frame: held,
                persistent: held_persistent,
            } => {
                if persistent {
                    if let Some(old) = held.take() {
                        old.release()?;
                    }
                } else if held.is_some() {
                    return Err(Error::PortOccupied(self.describe()));
                }
                let retained = frame.retain()?;
                retained.mark_read_only();
                *held = Some(retained);
                *held_persistent = persistent;
                tracing::trace!(port = %self.describe(), frame = frame.id(), persistent, "frame assigned");
                Ok(())
            }
            InputSlot::Final(slot) => {
                if slot.assigned {
                    return Err(Error::FinalPortModified(self.describe()));
                }
                let value = frame.value()?;
                slot.target.assign(&value)?;
                slot.value = Some(value);
                slot.assigned = true;
                slot.waiting = false;
                slot.has_frame = true;
                Ok(())
            }
            InputSlot::Field(slot) | InputSlot::Program(slot) => {
                let value = frame.value()?;
                slot.target.check(&value)?;
                if slot.value.as_ref() != Some(&value) {
                    slot.value = Some(value);
                    slot.waiting = true;
                }
                slot.has_frame = true;
                Ok(())
            }
        }
    }

    /// Take the held frame.
    ///
    /// The caller owns one reference to the result and must release it. A
    /// persistent frame stays in the port and is retained again.
    pub fn pull_frame(&self) -> Result<Frame> {
        let mut state = self.shared.state.lock();
        match &mut state.slot {
            InputSlot::Stream { frame, persistent } => {
                let Some(held) = frame.as_ref() else {
                    return Err(Error::NoFrameAvailable(self.describe()));
                };
                if *persistent {
                    held.retain()
                } else {
                    frame
                        .take()
                        .ok_or_else(|| Error::NoFrameAvailable(self.describe()))
                }
            }
            _ => Err(Error::UnsupportedOperation(format!(
                "cannot pull a frame from value port {}",
                self.describe()
            ))),
        }
    }

    /// Apply a pending value to its bound target. Returns whether one was applied.
    pub(crate) fn transfer(&self) -> Result<bool> {
        let mut state = self.shared.state.lock();
        let Some(slot) = state.slot.value_slot() else {
            return Ok(false);
        };
        if !slot.waiting {
            return Ok(false);
        }
        if let Some(value) = &slot.value {
            slot.target.assign(value)?;
        }
        slot.waiting = false;
        Ok(true)
    }

    /// Drop any held frame.
    pub fn clear(&self) -> Result<()> {
        let held = match &mut self.shared.state.lock().slot {
            InputSlot::Stream { frame, .. } => frame.take(),
            _ => None,
        };
        match held {
            Some(frame) => frame.release(),
            None => Ok(()),
        }
    }

    /// Whether both handles refer to the same port.
    pub fn same_port(&self, other: &InputPort) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPort")
            .field("port", &self.describe())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Output port
// ============================================================================

struct OutputState {
    format: FrameFormat,
    open: bool,
    blocking: bool,
    base_input: Option<String>,
    target: Option<InputPort>,
}

struct OutputShared {
    filter: String,
    name: String,
    state: Mutex<OutputState>,
}

/// Sending end of a connection.
#[derive(Clone)]
pub struct OutputPort {
    shared: Arc<OutputShared>,
}

impl OutputPort {
    /// Create an output port emitting `format`.
    pub fn new(filter: &str, name: &str, format: FrameFormat) -> Self {
        Self::with_base(filter, name, format, None)
    }

    pub(crate) fn with_base(
        filter: &str,
        name: &str,
        format: FrameFormat,
        base_input: Option<String>,
    ) -> Self {
        Self {
            shared: Arc::new(OutputShared {
                filter: filter.to_string(),
                name: name.to_string(),
                state: Mutex::new(OutputState {
                    format,
                    open: false,
                    blocking: true,
                    base_input,
                    target: None,
                }),
            }),
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Name of the owning filter.
    pub fn filter_name(&self) -> &str {
        &self.shared.filter
    }

    /// `filter.port` label used in errors and logs.
    pub fn describe(&self) -> String {
        format!("{}.{}", self.shared.filter, self.shared.name)
    }

    /// Emitted format; unspecified until resolved for input-based outputs.
    pub fn format(&self) -> FrameFormat {
        self.shared.state.lock().format.clone()
    }

    /// Set the emitted format.
    pub fn set_format(&self, format: FrameFormat) {
        self.shared.state.lock().format = format;
    }

    /// Input port whose format this output derives from.
    pub fn base_input(&self) -> Option<String> {
        self.shared.state.lock().base_input.clone()
    }

    /// Whether the port is open.
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// Open the port and its downstream input.
    pub fn open(&self) {
        let target = {
            let mut state = self.shared.state.lock();
            if state.open {
                return;
            }
            state.open = true;
            state.target.clone()
        };
        tracing::trace!(port = %self.describe(), "opened output port");
        if let Some(target) = target {
            target.open();
        }
    }

    /// Close the port and its downstream input.
    pub fn close(&self) {
        let target = {
            let mut state = self.shared.state.lock();
            if !state.open {
                return;
            }
            state.open = false;
            state.target.clone()
        };
        tracing::trace!(port = %self.describe(), "closed output port");
        if let Some(target) = target {
            target.close();
        }
    }

    /// Whether readiness requires downstream room.
    pub fn is_blocking(&self) -> bool {
        self.shared.state.lock().blocking
    }

    /// Set whether readiness requires downstream room.
    pub fn set_blocking(&self, blocking: bool) {
        self.shared.state.lock().blocking = blocking;
    }

    /// Whether a downstream input is connected.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().target.is_some()
    }

    /// The connected downstream input.
    pub fn target(&self) -> Option<InputPort> {
        self.shared.state.lock().target.clone()
    }

    /// Connect to `target`. Each end may be connected only once.
    pub fn connect_to(&self, target: &InputPort) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected(self.describe()));
        }
        target.set_source(self)?;
        self.shared.state.lock().target = Some(target.clone());
        tracing::debug!(from = %self.describe(), to = %target.describe(), "connected ports");
        Ok(())
    }

    /// `(open && target accepts a frame) || !blocking`.
    ///
    /// An unconnected output accepts nothing.
    pub fn is_ready(&self) -> bool {
        let (open, blocking, target) = {
            let state = self.shared.state.lock();
            (state.open, state.blocking, state.target.clone())
        };
        (open && target.is_some_and(|t| t.accepts_frame())) || !blocking
    }

    /// Closed and blocking.
    pub fn filter_must_close(&self) -> bool {
        let state = self.shared.state.lock();
        !state.open && state.blocking
    }

    fn require_target(&self) -> Result<InputPort> {
        self.target()
            .ok_or_else(|| Error::UnconnectedPort(self.describe()))
    }

    /// Push a one-shot frame downstream.
    pub fn push_frame(&self, frame: &Frame) -> Result<()> {
        self.require_target()?.push_frame(frame)
    }

    /// Set a persistent frame downstream.
    pub fn set_frame(&self, frame: &Frame) -> Result<()> {
        self.require_target()?.set_frame(frame)
    }

    /// Push a value downstream in a transient frame.
    pub fn push_value(&self, value: Value) -> Result<()> {
        self.require_target()?.push_value(value)
    }

    /// Whether both handles refer to the same port.
    pub fn same_port(&self, other: &OutputPort) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPort")
            .field("port", &self.describe())
            .finish_non_exhaustive()
    }
}
