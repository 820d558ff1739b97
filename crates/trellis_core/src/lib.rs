//! Trellis Core
//!
//! Foundational primitives shared by the Trellis view engine and its hosts:
//!
//! - **Values**: `AttrValue`, the payload of every node attribute, and
//!   identity-compared event `Listener`s
//! - **Native Bridge**: the `NativeBackend` trait the engine drives, plus an
//!   in-memory `RecordingBackend` for headless use and tests
//! - **Frames**: the `FrameRequester` hook through which render flushes are
//!   deferred to the next display frame

pub mod frame;
pub mod native_bridge;
pub mod value;

pub use frame::{FrameRequester, ManualFrames};
pub use native_bridge::{
    Mutation, NativeBackend, NativeError, NativeHandle, NativeResult, RecordingBackend,
};
pub use value::{AttrValue, Event, Listener};
