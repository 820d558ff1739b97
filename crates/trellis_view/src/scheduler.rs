//! Render scheduling
//!
//! Invalidation and rendering are decoupled by one display frame:
//!
//! - `schedule_render` marks a component invalid and propagates *damage* to
//!   its ancestor components, stopping at the first one already damaged
//! - the first request while nothing is pending asks the host for a frame;
//!   later requests coalesce into that frame
//! - `flush` walks the live tree breadth-first from the root, renders every
//!   invalid component it meets and skips the subtree of every component
//!   that is not damaged
//!
//! Components reach the scheduler through a cloneable [`SchedulerHandle`].
//! Handle requests are queued and applied when the next flush starts.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use trellis_core::FrameRequester;

use crate::error::{RenderError, Result};
use crate::renderer::Renderer;
use crate::tree::NodeId;

// ============================================================================
// Scheduler State
// ============================================================================

struct Shared {
    frames: Box<dyn FrameRequester>,
    pending: Cell<bool>,
    flushing: Cell<bool>,
    /// Work was requested while a flush was running
    requeue: Cell<bool>,
    requests: RefCell<Vec<NodeId>>,
}

impl Shared {
    fn request_frame(&self) {
        if self.flushing.get() {
            self.requeue.set(true);
            return;
        }
        if self.pending.replace(true) {
            return;
        }
        tracing::trace!("requesting render frame");
        self.frames.request_frame();
    }
}

/// Cloneable handle for requesting re-renders from listeners and hooks
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Rc<Shared>,
}

impl SchedulerHandle {
    /// Queue a re-render of `component` for the next frame
    ///
    /// The component is only marked invalid and damaged when the next flush
    /// picks the request up, so [`Renderer::is_invalid`] still reads false
    /// right after this call.
    pub fn schedule_render(&self, component: NodeId) {
        self.shared.requests.borrow_mut().push(component);
        self.shared.request_frame();
    }

    /// Whether a flush has been requested and not yet run
    pub fn is_pending(&self) -> bool {
        self.shared.pending.get()
    }
}

/// Scheduler owned by a [`Renderer`]
pub struct RenderScheduler {
    handle: SchedulerHandle,
    /// Components whose render is currently executing, innermost last
    rendering: Vec<NodeId>,
}

impl RenderScheduler {
    pub fn new(frames: Box<dyn FrameRequester>) -> Self {
        Self {
            handle: SchedulerHandle {
                shared: Rc::new(Shared {
                    frames,
                    pending: Cell::new(false),
                    flushing: Cell::new(false),
                    requeue: Cell::new(false),
                    requests: RefCell::new(Vec::new()),
                }),
            },
            rendering: Vec::new(),
        }
    }

    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    pub fn is_pending(&self) -> bool {
        self.handle.shared.pending.get()
    }

    pub fn is_flushing(&self) -> bool {
        self.handle.shared.flushing.get()
    }

    /// Component whose render is innermost on the stack
    pub fn current(&self) -> Option<NodeId> {
        self.rendering.last().copied()
    }

    pub(crate) fn request_frame(&self) {
        self.handle.shared.request_frame();
    }

    pub(crate) fn take_requests(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.handle.shared.requests.borrow_mut())
    }

    pub(crate) fn begin_flush(&self) {
        self.handle.shared.flushing.set(true);
    }

    /// Close a flush; work requested during it gets a new frame unless the
    /// pass failed
    pub(crate) fn end_flush(&self, succeeded: bool) {
        let shared = &self.handle.shared;
        shared.flushing.set(false);
        shared.pending.set(false);
        if shared.requeue.replace(false) && succeeded {
            shared.request_frame();
        }
    }

    pub(crate) fn enter(&mut self, component: NodeId) -> Result<()> {
        if self.rendering.contains(&component) {
            return Err(RenderError::ReentrantRender(component));
        }
        self.rendering.push(component);
        Ok(())
    }

    pub(crate) fn leave(&mut self, component: NodeId) {
        if let Some(position) = self.rendering.iter().rposition(|c| *c == component) {
            self.rendering.truncate(position);
        }
    }
}

/// What one flush did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Components rendered, in traversal order
    pub rendered: Vec<NodeId>,
    /// Nodes whose children were inspected
    pub expanded: Vec<NodeId>,
}

// ============================================================================
// Renderer Integration
// ============================================================================

impl Renderer {
    /// Mark `component` invalid and request a frame
    pub fn schedule_render(&mut self, component: NodeId) -> Result<()> {
        self.invalidate(component)?;
        self.scheduler.request_frame();
        Ok(())
    }

    pub(crate) fn invalidate(&mut self, component: NodeId) -> Result<()> {
        let state = self.tree.component_mut(component)?;
        state.invalid = true;
        tracing::trace!("invalidated {} {:?}", state.name, component);
        self.mark_damage_above(component);
        Ok(())
    }

    /// Mark ancestor components damaged up to the first one already marked
    pub(crate) fn mark_damage_above(&mut self, node: NodeId) {
        let mut cursor = self.tree.parent(node);
        while let Some(ancestor) = cursor {
            if let Ok(state) = self.tree.component_mut(ancestor) {
                if state.damaged {
                    break;
                }
                state.damaged = true;
            }
            cursor = self.tree.parent(ancestor);
        }
    }

    /// Whether a flush has been requested and not yet run
    pub fn is_flush_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Render all pending work reachable from the root
    ///
    /// Called by the host from its frame callback. A failing render aborts
    /// the pass and is returned; remaining invalid components stay invalid.
    pub fn flush(&mut self) -> Result<FlushReport> {
        self.scheduler.begin_flush();
        let root = self.root();
        let result = self
            .absorb_requests()
            .and_then(|()| self.render_tree(root));
        self.scheduler.end_flush(result.is_ok());

        match &result {
            Ok(report) => tracing::debug!(
                rendered = report.rendered.len(),
                expanded = report.expanded.len(),
                "flush complete"
            ),
            Err(err) => tracing::warn!("render pass aborted: {}", err),
        }
        result
    }

    fn absorb_requests(&mut self) -> Result<()> {
        for component in self.scheduler.take_requests() {
            // Requests can outlive the component they name.
            if self.tree.is_component(component) {
                self.invalidate(component)?;
            }
        }
        Ok(())
    }

    fn render_tree(&mut self, root: NodeId) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        let mut queue = VecDeque::from([root]);

        while let Some(node) = queue.pop_front() {
            if !self.tree.contains(node) {
                continue;
            }
            report.expanded.push(node);

            let children = self.tree.children(node).to_vec();
            for child in children {
                if !self.tree.contains(child) {
                    continue;
                }
                if self.tree.is_component(child) {
                    if self.tree.component(child)?.invalid {
                        self.tree.component_mut(child)?.invalid = false;
                        self.render_component(child)?;
                        report.rendered.push(child);
                    }
                    let state = self.tree.component_mut(child)?;
                    if !state.damaged {
                        continue;
                    }
                    state.damaged = false;
                }
                queue.push_back(child);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::ManualFrames;

    fn scheduler() -> (RenderScheduler, ManualFrames) {
        let frames = ManualFrames::new();
        (RenderScheduler::new(Box::new(frames.clone())), frames)
    }

    fn ids(count: usize) -> Vec<NodeId> {
        let mut map = slotmap::SlotMap::<NodeId, ()>::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_requests_coalesce() {
        let (scheduler, frames) = scheduler();
        let handle = scheduler.handle().clone();
        let nodes = ids(3);

        for node in &nodes {
            handle.schedule_render(*node);
        }
        assert!(handle.is_pending());
        assert_eq!(frames.total_requests(), 1);
        assert_eq!(scheduler.take_requests(), nodes);
        assert!(scheduler.take_requests().is_empty());
    }

    #[test]
    fn test_requests_during_flush_requeue() {
        let (scheduler, frames) = scheduler();
        let node = ids(1)[0];

        scheduler.request_frame();
        scheduler.begin_flush();
        scheduler.handle().schedule_render(node);
        assert_eq!(frames.total_requests(), 1);

        scheduler.end_flush(true);
        assert!(scheduler.is_pending());
        assert_eq!(frames.total_requests(), 2);
    }

    #[test]
    fn test_failed_flush_does_not_requeue() {
        let (scheduler, frames) = scheduler();
        scheduler.begin_flush();
        scheduler.request_frame();
        scheduler.end_flush(false);

        assert!(!scheduler.is_pending());
        assert_eq!(frames.total_requests(), 0);
    }

    #[test]
    fn test_rendering_stack() {
        let (mut scheduler, _frames) = scheduler();
        let nodes = ids(2);

        scheduler.enter(nodes[0]).unwrap();
        scheduler.enter(nodes[1]).unwrap();
        assert_eq!(scheduler.current(), Some(nodes[1]));
        assert_eq!(
            scheduler.enter(nodes[0]),
            Err(RenderError::ReentrantRender(nodes[0]))
        );

        scheduler.leave(nodes[1]);
        assert_eq!(scheduler.current(), Some(nodes[0]));
        scheduler.leave(nodes[0]);
        assert_eq!(scheduler.current(), None);
    }
}
