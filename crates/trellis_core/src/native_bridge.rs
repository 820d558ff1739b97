//! Native bridge boundary
//!
//! The view engine never touches platform views directly. Every structural or
//! attribute change is forwarded through a [`NativeBackend`], which owns the
//! real widgets and hands back opaque [`NativeHandle`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            trellis_view engine           │
//! │  mount / patch / slots / scheduler       │
//! └────────────────┬────────────────────────┘
//!                  │ NativeBackend
//!       ┌──────────┴──────────┐
//!       ▼                     ▼
//! ┌───────────┐        ┌────────────────┐
//! │ Platform  │        │ RecordingBackend│
//! │  views    │        │ (headless/tests)│
//! └───────────┘        └────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use trellis_core::native_bridge::{NativeBackend, RecordingBackend};
//!
//! let mut backend = RecordingBackend::new();
//! let parent = backend.create_node("View")?;
//! let child = backend.create_node("Text")?;
//! backend.insert(parent, child, 0)?;
//! assert_eq!(backend.children(parent), vec![child]);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::value::{AttrValue, Event, Listener};

// ============================================================================
// Types
// ============================================================================

/// Opaque reference to a platform node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// Result type for native bridge operations
pub type NativeResult<T> = Result<T, NativeError>;

/// Error type for native bridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NativeError {
    #[error("unknown native handle {0:?}")]
    UnknownHandle(NativeHandle),

    #[error("native node {child:?} is not a child of {parent:?}")]
    NotAChild {
        parent: NativeHandle,
        child: NativeHandle,
    },

    #[error("index {index} out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("platform error: {0}")]
    Platform(String),
}

/// Platform node mutation interface
///
/// All calls are synchronous and take effect immediately. Indices are
/// positions in the parent's child list; for [`move_child`](Self::move_child)
/// the index is the final position, computed after the child has been taken
/// out of its current slot.
pub trait NativeBackend {
    /// Create a detached node of the given type
    fn create_node(&mut self, node_type: &str) -> NativeResult<NativeHandle>;

    /// Insert a detached child at `index`
    fn insert(&mut self, parent: NativeHandle, child: NativeHandle, index: usize)
        -> NativeResult<()>;

    /// Remove a child from its parent, leaving it detached
    fn remove(&mut self, parent: NativeHandle, child: NativeHandle) -> NativeResult<()>;

    /// Reposition an existing child within the same parent
    fn move_child(
        &mut self,
        parent: NativeHandle,
        child: NativeHandle,
        index: usize,
    ) -> NativeResult<()>;

    /// Assign an attribute; `AttrValue::Null` resets it
    fn set_attribute(
        &mut self,
        handle: NativeHandle,
        name: &str,
        value: &AttrValue,
    ) -> NativeResult<()>;

    fn attach_listener(
        &mut self,
        handle: NativeHandle,
        event: &str,
        listener: &Listener,
    ) -> NativeResult<()>;

    fn detach_listener(
        &mut self,
        handle: NativeHandle,
        event: &str,
        listener: &Listener,
    ) -> NativeResult<()>;

    /// Release a node that will never be used again
    fn release(&mut self, _handle: NativeHandle) -> NativeResult<()> {
        Ok(())
    }
}

// ============================================================================
// Recording Backend
// ============================================================================

/// A single call received by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create {
        handle: NativeHandle,
        node_type: String,
    },
    Insert {
        parent: NativeHandle,
        child: NativeHandle,
        index: usize,
    },
    Remove {
        parent: NativeHandle,
        child: NativeHandle,
    },
    Move {
        parent: NativeHandle,
        child: NativeHandle,
        index: usize,
    },
    SetAttribute {
        handle: NativeHandle,
        name: String,
        value: AttrValue,
    },
    AttachListener {
        handle: NativeHandle,
        event: String,
    },
    DetachListener {
        handle: NativeHandle,
        event: String,
    },
    Release {
        handle: NativeHandle,
    },
}

impl Mutation {
    /// Whether this call changed the shape of the native tree
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Mutation::Create { .. }
                | Mutation::Insert { .. }
                | Mutation::Remove { .. }
                | Mutation::Move { .. }
                | Mutation::Release { .. }
        )
    }
}

#[derive(Debug, Default)]
struct RecordedNode {
    node_type: String,
    parent: Option<NativeHandle>,
    children: Vec<NativeHandle>,
    attributes: IndexMap<String, AttrValue>,
    listeners: Vec<(String, Listener)>,
    released: bool,
}

#[derive(Debug, Default)]
struct RecordingState {
    next_handle: u64,
    nodes: FxHashMap<NativeHandle, RecordedNode>,
    log: Vec<Mutation>,
    fail_next: Option<String>,
}

impl RecordingState {
    fn node(&self, handle: NativeHandle) -> NativeResult<&RecordedNode> {
        self.nodes
            .get(&handle)
            .ok_or(NativeError::UnknownHandle(handle))
    }

    fn node_mut(&mut self, handle: NativeHandle) -> NativeResult<&mut RecordedNode> {
        self.nodes
            .get_mut(&handle)
            .ok_or(NativeError::UnknownHandle(handle))
    }

    fn check_failure(&mut self) -> NativeResult<()> {
        match self.fail_next.take() {
            Some(message) => Err(NativeError::Platform(message)),
            None => Ok(()),
        }
    }
}

/// In-memory backend keeping a simulated native tree and a call log
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to inspect what happened.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    state: Rc<RefCell<RecordingState>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call received so far, in order
    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.borrow().log.clone()
    }

    /// Drain the call log
    pub fn take_mutations(&self) -> Vec<Mutation> {
        std::mem::take(&mut self.state.borrow_mut().log)
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }

    /// Number of logged calls matching `predicate`
    pub fn count_where(&self, predicate: impl Fn(&Mutation) -> bool) -> usize {
        self.state.borrow().log.iter().filter(|m| predicate(m)).count()
    }

    /// Make the next backend call fail with a platform error
    pub fn fail_next(&self, message: impl Into<String>) {
        self.state.borrow_mut().fail_next = Some(message.into());
    }

    pub fn children(&self, handle: NativeHandle) -> Vec<NativeHandle> {
        self.state
            .borrow()
            .nodes
            .get(&handle)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, handle: NativeHandle) -> Option<NativeHandle> {
        self.state.borrow().nodes.get(&handle).and_then(|n| n.parent)
    }

    pub fn node_type(&self, handle: NativeHandle) -> Option<String> {
        self.state
            .borrow()
            .nodes
            .get(&handle)
            .map(|n| n.node_type.clone())
    }

    /// Current attribute value; `None` when never assigned or reset to null
    pub fn attribute(&self, handle: NativeHandle, name: &str) -> Option<AttrValue> {
        self.state
            .borrow()
            .nodes
            .get(&handle)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    pub fn listener_count(&self, handle: NativeHandle, event: &str) -> usize {
        self.state
            .borrow()
            .nodes
            .get(&handle)
            .map(|n| n.listeners.iter().filter(|(e, _)| e == event).count())
            .unwrap_or(0)
    }

    pub fn is_released(&self, handle: NativeHandle) -> bool {
        self.state
            .borrow()
            .nodes
            .get(&handle)
            .map(|n| n.released)
            .unwrap_or(false)
    }

    /// Deliver an event to the listeners attached on `handle`
    ///
    /// Returns how many listeners ran.
    pub fn emit(&self, handle: NativeHandle, event: &Event) -> usize {
        // Collect first so callbacks may call back into this backend.
        let listeners: Vec<Listener> = self
            .state
            .borrow()
            .nodes
            .get(&handle)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|(name, _)| *name == event.name)
                    .map(|(_, l)| l.clone())
                    .collect()
            })
            .unwrap_or_default();

        for listener in &listeners {
            listener.call(event);
        }
        listeners.len()
    }

    /// Node types of `handle`'s children, handy for structural assertions
    pub fn child_types(&self, handle: NativeHandle) -> Vec<String> {
        self.children(handle)
            .into_iter()
            .filter_map(|c| self.node_type(c))
            .collect()
    }
}

impl NativeBackend for RecordingBackend {
    fn create_node(&mut self, node_type: &str) -> NativeResult<NativeHandle> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        state.next_handle += 1;
        let handle = NativeHandle(state.next_handle);
        state.nodes.insert(
            handle,
            RecordedNode {
                node_type: node_type.to_string(),
                ..Default::default()
            },
        );
        state.log.push(Mutation::Create {
            handle,
            node_type: node_type.to_string(),
        });
        Ok(handle)
    }

    fn insert(
        &mut self,
        parent: NativeHandle,
        child: NativeHandle,
        index: usize,
    ) -> NativeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        if let Some(previous) = state.node(child)?.parent {
            return Err(NativeError::Platform(format!(
                "node {:?} is still attached to {:?}",
                child, previous
            )));
        }
        let siblings = &mut state.node_mut(parent)?.children;
        if index > siblings.len() {
            return Err(NativeError::IndexOutOfBounds {
                index,
                len: siblings.len(),
            });
        }
        siblings.insert(index, child);
        state.node_mut(child)?.parent = Some(parent);
        state.log.push(Mutation::Insert {
            parent,
            child,
            index,
        });
        Ok(())
    }

    fn remove(&mut self, parent: NativeHandle, child: NativeHandle) -> NativeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        let siblings = &mut state.node_mut(parent)?.children;
        let position = siblings
            .iter()
            .position(|c| *c == child)
            .ok_or(NativeError::NotAChild { parent, child })?;
        siblings.remove(position);
        state.node_mut(child)?.parent = None;
        state.log.push(Mutation::Remove { parent, child });
        Ok(())
    }

    fn move_child(
        &mut self,
        parent: NativeHandle,
        child: NativeHandle,
        index: usize,
    ) -> NativeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        let siblings = &mut state.node_mut(parent)?.children;
        let position = siblings
            .iter()
            .position(|c| *c == child)
            .ok_or(NativeError::NotAChild { parent, child })?;
        siblings.remove(position);
        if index > siblings.len() {
            let len = siblings.len();
            siblings.insert(position, child);
            return Err(NativeError::IndexOutOfBounds { index, len });
        }
        siblings.insert(index, child);
        state.log.push(Mutation::Move {
            parent,
            child,
            index,
        });
        Ok(())
    }

    fn set_attribute(
        &mut self,
        handle: NativeHandle,
        name: &str,
        value: &AttrValue,
    ) -> NativeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        let attributes = &mut state.node_mut(handle)?.attributes;
        if value.is_null() {
            attributes.shift_remove(name);
        } else {
            attributes.insert(name.to_string(), value.clone());
        }
        state.log.push(Mutation::SetAttribute {
            handle,
            name: name.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    fn attach_listener(
        &mut self,
        handle: NativeHandle,
        event: &str,
        listener: &Listener,
    ) -> NativeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        state
            .node_mut(handle)?
            .listeners
            .push((event.to_string(), listener.clone()));
        state.log.push(Mutation::AttachListener {
            handle,
            event: event.to_string(),
        });
        Ok(())
    }

    fn detach_listener(
        &mut self,
        handle: NativeHandle,
        event: &str,
        listener: &Listener,
    ) -> NativeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        let listeners = &mut state.node_mut(handle)?.listeners;
        if let Some(position) = listeners
            .iter()
            .position(|(e, l)| e == event && l.ptr_eq(listener))
        {
            listeners.remove(position);
        }
        state.log.push(Mutation::DetachListener {
            handle,
            event: event.to_string(),
        });
        Ok(())
    }

    fn release(&mut self, handle: NativeHandle) -> NativeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_failure()?;

        let node = state.node_mut(handle)?;
        node.released = true;
        node.listeners.clear();
        tracing::trace!("released native node {:?}", handle);
        state.log.push(Mutation::Release { handle });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_insert_and_remove() {
        let mut backend = RecordingBackend::new();
        let parent = backend.create_node("View").unwrap();
        let a = backend.create_node("Text").unwrap();
        let b = backend.create_node("Text").unwrap();

        backend.insert(parent, a, 0).unwrap();
        backend.insert(parent, b, 0).unwrap();
        assert_eq!(backend.children(parent), vec![b, a]);
        assert_eq!(backend.parent(a), Some(parent));

        backend.remove(parent, b).unwrap();
        assert_eq!(backend.children(parent), vec![a]);
        assert_eq!(backend.parent(b), None);
        assert_eq!(
            backend.remove(parent, b),
            Err(NativeError::NotAChild { parent, child: b })
        );
    }

    #[test]
    fn test_insert_attached_node_fails() {
        let mut backend = RecordingBackend::new();
        let p1 = backend.create_node("View").unwrap();
        let p2 = backend.create_node("View").unwrap();
        let child = backend.create_node("View").unwrap();

        backend.insert(p1, child, 0).unwrap();
        assert!(backend.insert(p2, child, 0).is_err());
    }

    #[test]
    fn test_move_uses_final_index() {
        let mut backend = RecordingBackend::new();
        let parent = backend.create_node("View").unwrap();
        let nodes: Vec<_> = (0..3)
            .map(|i| {
                let n = backend.create_node("View").unwrap();
                backend.insert(parent, n, i).unwrap();
                n
            })
            .collect();

        backend.move_child(parent, nodes[2], 0).unwrap();
        assert_eq!(backend.children(parent), vec![nodes[2], nodes[0], nodes[1]]);

        backend.move_child(parent, nodes[2], 2).unwrap();
        assert_eq!(backend.children(parent), nodes);
    }

    #[test]
    fn test_attributes_and_reset() {
        let mut backend = RecordingBackend::new();
        let node = backend.create_node("View").unwrap();

        backend
            .set_attribute(node, "color", &AttrValue::from("red"))
            .unwrap();
        assert_eq!(backend.attribute(node, "color"), Some("red".into()));

        backend.set_attribute(node, "color", &AttrValue::Null).unwrap();
        assert_eq!(backend.attribute(node, "color"), None);
        assert_eq!(
            backend.count_where(|m| matches!(m, Mutation::SetAttribute { .. })),
            2
        );
    }

    #[test]
    fn test_emit_reaches_attached_listeners() {
        let mut backend = RecordingBackend::new();
        let node = backend.create_node("Button").unwrap();
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        let listener = Listener::new(move |_| seen.set(seen.get() + 1));

        backend.attach_listener(node, "tap", &listener).unwrap();
        assert_eq!(backend.emit(node, &Event::new("tap")), 1);
        assert_eq!(backend.emit(node, &Event::new("press")), 0);

        backend.detach_listener(node, "tap", &listener).unwrap();
        assert_eq!(backend.emit(node, &Event::new("tap")), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_fail_next() {
        let mut backend = RecordingBackend::new();
        backend.fail_next("boom");
        assert_eq!(
            backend.create_node("View"),
            Err(NativeError::Platform("boom".into()))
        );
        assert!(backend.create_node("View").is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let observer = RecordingBackend::new();
        let mut backend = observer.clone();
        let node = backend.create_node("View").unwrap();

        assert_eq!(observer.node_type(node), Some("View".to_string()));
        assert_eq!(observer.take_mutations().len(), 1);
        assert!(observer.mutations().is_empty());
    }
}
