//! Built-in filters.
//!
//! ## Sources
//! - [`ObjectSource`]: Emits a value once or on every step
//! - [`FrameFetch`]: Emits a frame stored in the context
//!
//! ## Sinks
//! - [`NullFilter`]: Discards every frame
//! - [`FrameStore`]: Stores frames in the context under a key
//! - [`CallbackFilter`]: Hands every frame to a closure
//!
//! ## Transforms
//! - [`FrameBranch`]: Forwards each frame to all of its outputs
//! - [`RetargetFilter`]: Copies frames into another backing store
//!
//! All of them are registered in the default
//! [`FilterRegistry`](crate::graph::FilterRegistry).

mod branch;
mod callback;
mod null;
mod object_source;
mod retarget;
mod store;

pub use branch::FrameBranch;
pub use callback::{CallbackFilter, FrameCallback, listener_value};
pub use null::NullFilter;
pub use object_source::ObjectSource;
pub use retarget::RetargetFilter;
pub use store::{FrameFetch, FrameStore};
