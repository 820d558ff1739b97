//! Display-frame callback boundary
//!
//! The render scheduler never flushes synchronously. When work is pending it
//! asks its [`FrameRequester`] for a frame, and the host calls back into the
//! renderer (`Renderer::flush`) when the display is ready for it.

use std::cell::Cell;
use std::rc::Rc;

/// Host facility that delivers display-frame callbacks
pub trait FrameRequester {
    /// Ask for one frame callback; repeated requests before it fires coalesce
    fn request_frame(&self);
}

impl<F: Fn()> FrameRequester for F {
    fn request_frame(&self) {
        self()
    }
}

/// Frame requester for headless hosts and tests
///
/// Records requests instead of talking to a display. The host polls
/// [`take_requested`](Self::take_requested) from its loop and flushes when it
/// returns true. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ManualFrames {
    requested: Rc<Cell<bool>>,
    total: Rc<Cell<usize>>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a frame is currently requested
    pub fn is_requested(&self) -> bool {
        self.requested.get()
    }

    /// Consume the outstanding request, if any
    pub fn take_requested(&self) -> bool {
        self.requested.replace(false)
    }

    /// Total number of requests received
    pub fn total_requests(&self) -> usize {
        self.total.get()
    }
}

impl FrameRequester for ManualFrames {
    fn request_frame(&self) {
        self.requested.set(true);
        self.total.set(self.total.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_frames() {
        let frames = ManualFrames::new();
        let host = frames.clone();
        assert!(!host.is_requested());

        frames.request_frame();
        frames.request_frame();
        assert!(host.is_requested());
        assert_eq!(host.total_requests(), 2);

        assert!(host.take_requested());
        assert!(!host.take_requested());
    }

    #[test]
    fn test_closure_requester() {
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let requester = move || seen.set(seen.get() + 1);

        requester.request_frame();
        assert_eq!(count.get(), 1);
    }
}
