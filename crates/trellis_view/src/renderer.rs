//! Renderer facade
//!
//! [`Renderer`] owns the node arena, the native backend and the scheduler.
//! The mount, patch, slot and scheduler modules extend it with their own
//! `impl` blocks; this module holds construction, queries and the structural
//! primitives they share.

use smallvec::{smallvec, SmallVec};
use trellis_core::{AttrValue, FrameRequester, NativeBackend, NativeHandle};

use crate::component::{Component, ComponentState, Phase};
use crate::config::RendererConfig;
use crate::descriptor::{short_type_name, ViewType};
use crate::error::{RenderError, Result};
use crate::scheduler::{RenderScheduler, SchedulerHandle};
use crate::tree::{Node, NodeId, NodeKind, NodeTree};

/// Rendering engine bound to one native backend and one live root
pub struct Renderer {
    pub(crate) tree: NodeTree,
    pub(crate) backend: Box<dyn NativeBackend>,
    pub(crate) scheduler: RenderScheduler,
    pub(crate) config: RendererConfig,
    root: NodeId,
}

impl Renderer {
    pub fn new(
        backend: impl NativeBackend + 'static,
        frames: impl FrameRequester + 'static,
    ) -> Result<Self> {
        Self::with_config(RendererConfig::standard(), backend, frames)
    }

    pub fn with_config(
        config: RendererConfig,
        backend: impl NativeBackend + 'static,
        frames: impl FrameRequester + 'static,
    ) -> Result<Self> {
        let mut backend: Box<dyn NativeBackend> = Box::new(backend);
        let handle = backend.create_node(&config.root_type)?;
        let mut tree = NodeTree::new();
        let root = tree.insert(Node::new(NodeKind::Root, handle, None));
        tracing::debug!("renderer created with {} root {:?}", config.root_type, root);

        Ok(Self {
            tree,
            backend,
            scheduler: RenderScheduler::new(Box::new(frames)),
            config,
            root,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The live root whose subtree is walked on flush
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        self.scheduler.handle()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.tree.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.tree.children(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.parent(id)
    }

    pub fn native_handle(&self, id: NodeId) -> Result<NativeHandle> {
        self.tree.handle(id)
    }

    pub fn phase(&self, component: NodeId) -> Result<Phase> {
        Ok(self.tree.component(component)?.phase)
    }

    pub fn is_invalid(&self, component: NodeId) -> Result<bool> {
        Ok(self.tree.component(component)?.invalid)
    }

    pub fn is_damaged(&self, component: NodeId) -> Result<bool> {
        Ok(self.tree.component(component)?.damaged)
    }

    pub fn component<C: Component>(&self, id: NodeId) -> Option<&C> {
        self.tree.get(id).ok()?.component()?.downcast_ref::<C>()
    }

    pub fn component_mut<C: Component>(&mut self, id: NodeId) -> Option<&mut C> {
        self.tree.get_mut(id).ok()?.component_mut()?.downcast_mut::<C>()
    }

    /// Mutate a component's state and schedule a re-render
    pub fn update<C: Component, R>(
        &mut self,
        id: NodeId,
        update: impl FnOnce(&mut C) -> R,
    ) -> Result<R> {
        let component = self
            .component_mut::<C>(id)
            .ok_or(RenderError::NotAComponent(id))?;
        let result = update(component);
        self.schedule_render(id)?;
        Ok(result)
    }

    // ========================================================================
    // Node Creation
    // ========================================================================

    /// Create a detached, application-owned view
    pub fn create_view(&mut self, ty: &'static str) -> Result<NodeId> {
        self.create_node(NodeKind::View(ViewType(ty)), None)
    }

    /// Create a detached, application-owned text node
    pub fn create_text(&mut self, content: &str) -> Result<NodeId> {
        let node = self.create_node(NodeKind::Text, None)?;
        self.write_text(node, content)?;
        Ok(node)
    }

    /// Create a detached component; it renders when first attached
    pub fn create_component<C: Component>(&mut self, instance: C) -> Result<NodeId> {
        let name = short_type_name(std::any::type_name::<C>());
        self.create_component_node(Box::new(instance), name, None)
    }

    pub(crate) fn create_component_node(
        &mut self,
        instance: Box<dyn Component>,
        name: &'static str,
        origin: Option<NodeId>,
    ) -> Result<NodeId> {
        let state = ComponentState::new(instance, name);
        self.create_node(NodeKind::Component(Box::new(state)), origin)
    }

    pub(crate) fn create_node(&mut self, kind: NodeKind, origin: Option<NodeId>) -> Result<NodeId> {
        let handle = self.backend.create_node(kind.type_name())?;
        if self.config.trace_mutations {
            tracing::trace!(?handle, node_type = kind.type_name(), "create node");
        }
        Ok(self.tree.insert(Node::new(kind, handle, origin)))
    }

    /// Render `component` now if it is invalid
    ///
    /// Returns whether a render happened.
    pub fn render_if_needed(&mut self, component: NodeId) -> Result<bool> {
        let state = self.tree.component_mut(component)?;
        if !state.invalid {
            return Ok(false);
        }
        state.invalid = false;
        self.render_component(component)?;
        Ok(true)
    }

    // ========================================================================
    // Native Calls
    // ========================================================================

    pub(crate) fn native_set(
        &mut self,
        handle: NativeHandle,
        name: &str,
        value: &AttrValue,
    ) -> Result<()> {
        if self.config.trace_mutations {
            tracing::trace!(?handle, name, value = ?value, "set attribute");
        }
        self.backend.set_attribute(handle, name, value)?;
        Ok(())
    }

    pub(crate) fn write_text(&mut self, node: NodeId, content: &str) -> Result<()> {
        let handle = self.tree.handle(node)?;
        let name = self.config.text_attribute.clone();
        let value = AttrValue::from(content);
        self.native_set(handle, &name, &value)?;
        self.tree.get_mut(node)?.attributes.insert(name, value);
        Ok(())
    }

    // ========================================================================
    // Structural Primitives
    // ========================================================================

    /// Place `child` in `container` before `anchor` (or last)
    ///
    /// The child is detached from any previous parent first. A component that
    /// has never rendered is rendered before it is linked.
    pub(crate) fn attach(
        &mut self,
        container: NodeId,
        child: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<usize> {
        self.check_slot_accepts(container, child)?;
        if self.tree.is_component(child) && !self.tree.component(child)?.rendered {
            self.render_if_needed(child)?;
        }
        if let Some(previous) = self.tree.parent(child) {
            self.detach(previous, child)?;
        }

        let anchor = anchor.filter(|a| self.tree.parent(*a) == Some(container));
        let index = self.tree.link(container, child, anchor)?;
        let parent_handle = self.tree.handle(container)?;
        let child_handle = self.tree.handle(child)?;
        if self.config.trace_mutations {
            tracing::trace!(?parent_handle, ?child_handle, index, "insert");
        }
        self.backend.insert(parent_handle, child_handle, index)?;

        let is_slot = self.tree.get(container)?.slot().is_some();
        self.tree.get_mut(child)?.assigned_slot = is_slot.then_some(container);

        // Pending work inside the child must be reachable from its new ancestors.
        let pending = self
            .tree
            .component(child)
            .map_or(false, |state| state.invalid || state.damaged);
        if pending {
            self.mark_damage_above(child);
            self.scheduler.request_frame();
        }

        self.notify(container, |c| c.on_insert(child, index));
        Ok(index)
    }

    /// Unlink `child` from `parent`
    pub(crate) fn detach(&mut self, parent: NodeId, child: NodeId) -> Result<usize> {
        let index = self
            .tree
            .unlink(parent, child)?
            .ok_or(RenderError::NotAChild { parent, child })?;
        let parent_handle = self.tree.handle(parent)?;
        let child_handle = self.tree.handle(child)?;
        if self.config.trace_mutations {
            tracing::trace!(?parent_handle, ?child_handle, "remove");
        }
        self.backend.remove(parent_handle, child_handle)?;
        self.tree.get_mut(child)?.assigned_slot = None;

        self.notify(parent, |c| c.on_remove(child, index));
        Ok(index)
    }

    /// Move `child` before `anchor` (or last) within its current container
    pub(crate) fn move_before(&mut self, child: NodeId, anchor: Option<NodeId>) -> Result<()> {
        let Some(parent) = self.tree.parent(child) else {
            return Err(RenderError::Internal("moving a detached node"));
        };
        let anchor = anchor.filter(|a| self.tree.parent(*a) == Some(parent));
        if let Some((parent, index)) = self.tree.reposition(child, anchor)? {
            let parent_handle = self.tree.handle(parent)?;
            let child_handle = self.tree.handle(child)?;
            tracing::trace!(?child, index, "move");
            self.backend.move_child(parent_handle, child_handle, index)?;
        }
        Ok(())
    }

    /// Run a hook on the component owning `container` (itself, or the owner
    /// of the slot)
    fn notify(&mut self, container: NodeId, hook: impl FnOnce(&mut Box<dyn Component>)) {
        let target = match self.tree.get(container).map(|n| n.kind()) {
            Ok(NodeKind::Component(_)) => container,
            Ok(NodeKind::Slot(slot)) => slot.owner,
            _ => return,
        };
        if let Ok(state) = self.tree.component_mut(target) {
            hook(&mut state.instance);
        }
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Detach and destroy `node` and everything it owns
    ///
    /// Children that were produced by a component outside the destroyed
    /// subtree are detached and left alive.
    pub fn destroy(&mut self, node: NodeId) -> Result<()> {
        if node == self.root {
            return Err(RenderError::Internal("the root cannot be destroyed"));
        }
        if let Some(parent) = self.tree.parent(node) {
            self.detach(parent, node)?;
        }
        let mut dying = SmallVec::new();
        self.release_subtree(node, &mut dying, true)
    }

    /// Remove a node produced by `owner`'s render
    pub(crate) fn discard(&mut self, owner: NodeId, node: NodeId) -> Result<()> {
        if let Some(parent) = self.tree.parent(node) {
            self.detach(parent, node)?;
        }
        let mut dying = smallvec![owner];
        self.release_subtree(node, &mut dying, false)
    }

    fn release_subtree(
        &mut self,
        node: NodeId,
        dying: &mut SmallVec<[NodeId; 4]>,
        release_unowned: bool,
    ) -> Result<()> {
        if self.tree.is_component(node) {
            dying.push(node);
        }

        let children = self.tree.children(node).to_vec();
        for child in children {
            let owned = match self.tree.get(child)?.origin {
                Some(origin) => dying.contains(&origin),
                None => release_unowned,
            };
            if owned {
                self.release_subtree(child, dying, release_unowned)?;
            } else {
                self.detach(node, child)?;
            }
        }

        self.unregister_slot(node);
        let handle = self.tree.handle(node)?;
        self.backend.release(handle)?;
        if let Some(removed) = self.tree.remove(node) {
            tracing::trace!("released {} {:?}", removed.type_name(), node);
        }
        Ok(())
    }
}
