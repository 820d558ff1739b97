//! Node arena
//!
//! Materialized nodes live in a generational arena. The arena mirrors the
//! native tree structurally; every link change made here is paired with the
//! matching [`NativeBackend`](trellis_core::NativeBackend) call by the engine.

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, Key, SlotMap};
use smallvec::SmallVec;
use trellis_core::{AttrValue, Listener, NativeHandle};

use crate::component::ComponentState;
use crate::descriptor::{SlotSpec, ViewType};
use crate::error::{RenderError, Result};
use crate::tokens::TokenList;

new_key_type! {
    pub struct NodeId;
}

impl NodeId {
    /// Convert to a raw u64 representation
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Create from a raw u64 representation produced by `to_raw()`
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// A slot outlet registered by its owning component
#[derive(Debug)]
pub struct SlotNode {
    pub(crate) spec: SlotSpec,
    /// Component whose render declared the slot
    pub(crate) owner: NodeId,
}

pub enum NodeKind {
    /// The live root
    Root,
    View(ViewType),
    Text,
    Slot(SlotNode),
    Component(Box<ComponentState>),
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Root => "Root",
            NodeKind::View(ty) => ty.name(),
            NodeKind::Text => ViewType::TEXT.name(),
            NodeKind::Slot(_) => ViewType::SLOT.name(),
            NodeKind::Component(state) => state.name,
        }
    }
}

/// Kind of token list attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Style,
    State,
}

pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) handle: NativeHandle,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Last value assigned to each attribute
    pub(crate) attributes: FxHashMap<String, AttrValue>,
    /// Value each attribute had before it was first assigned
    pub(crate) defaults: FxHashMap<String, AttrValue>,
    pub(crate) styles: TokenList,
    pub(crate) states: TokenList,
    pub(crate) listeners: SmallVec<[(String, Listener); 2]>,
    /// Slot this node was last attached to
    pub(crate) assigned_slot: Option<NodeId>,
    /// Component (or fragment host) whose render created this node
    pub(crate) origin: Option<NodeId>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, handle: NativeHandle, origin: Option<NodeId>) -> Self {
        Self {
            kind,
            handle,
            parent: None,
            children: Vec::new(),
            attributes: FxHashMap::default(),
            defaults: FxHashMap::default(),
            styles: TokenList::new(),
            states: TokenList::new(),
            listeners: SmallVec::new(),
            assigned_slot: None,
            origin,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_component(&self) -> bool {
        matches!(self.kind, NodeKind::Component(_))
    }

    pub fn component(&self) -> Option<&ComponentState> {
        match &self.kind {
            NodeKind::Component(state) => Some(state),
            _ => None,
        }
    }

    pub fn component_mut(&mut self) -> Option<&mut ComponentState> {
        match &mut self.kind {
            NodeKind::Component(state) => Some(state),
            _ => None,
        }
    }

    pub fn slot(&self) -> Option<&SlotNode> {
        match &self.kind {
            NodeKind::Slot(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn tokens(&self, kind: TokenKind) -> &TokenList {
        match kind {
            TokenKind::Style => &self.styles,
            TokenKind::State => &self.states,
        }
    }

    pub(crate) fn tokens_mut(&mut self, kind: TokenKind) -> &mut TokenList {
        match kind {
            TokenKind::Style => &mut self.styles,
            TokenKind::State => &mut self.states,
        }
    }
}

/// Arena of materialized nodes
pub struct NodeTree {
    nodes: SlotMap<NodeId, Node>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(RenderError::UnknownNode(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(RenderError::UnknownNode(id))
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn handle(&self, id: NodeId) -> Result<NativeHandle> {
        self.get(id).map(|n| n.handle)
    }

    pub fn component(&self, id: NodeId) -> Result<&ComponentState> {
        self.get(id)?
            .component()
            .ok_or(RenderError::NotAComponent(id))
    }

    pub(crate) fn component_mut(&mut self, id: NodeId) -> Result<&mut ComponentState> {
        self.get_mut(id)?
            .component_mut()
            .ok_or(RenderError::NotAComponent(id))
    }

    pub fn is_component(&self, id: NodeId) -> bool {
        self.nodes.get(id).map_or(false, Node::is_component)
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// Sibling following `id` under its parent
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == id)?;
        siblings.get(index + 1).copied()
    }

    /// Iterate the ancestors of `id`, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Nearest ancestor component of `id`
    pub fn owning_component(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|a| self.is_component(*a))
    }

    /// Link a detached child before `anchor` (or last) and return its index
    ///
    /// An anchor that is not a child of `parent` appends.
    pub(crate) fn link(
        &mut self,
        parent: NodeId,
        child: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<usize> {
        let siblings = &mut self.get_mut(parent)?.children;
        let index = anchor
            .and_then(|a| siblings.iter().position(|c| *c == a))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.get_mut(child)?.parent = Some(parent);
        Ok(index)
    }

    /// Unlink a child from `parent`, returning the index it occupied
    pub(crate) fn unlink(&mut self, parent: NodeId, child: NodeId) -> Result<Option<usize>> {
        let siblings = &mut self.get_mut(parent)?.children;
        let index = siblings.iter().position(|c| *c == child);
        if let Some(index) = index {
            siblings.remove(index);
        }
        if let Ok(node) = self.get_mut(child) {
            if node.parent == Some(parent) {
                node.parent = None;
            }
        }
        Ok(index)
    }

    /// Move a child before `anchor` (or last) within its parent
    ///
    /// Returns the parent and the child's final index, or `None` when the
    /// child was already in place.
    pub(crate) fn reposition(
        &mut self,
        child: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<Option<(NodeId, usize)>> {
        let parent = self
            .parent(child)
            .ok_or(RenderError::Internal("moving a detached node"))?;
        let siblings = &mut self.get_mut(parent)?.children;
        let current = siblings
            .iter()
            .position(|c| *c == child)
            .ok_or(RenderError::Internal("parent does not list child"))?;
        let anchor = anchor.filter(|a| *a != child);

        // Position before the anchor once the child is out of the list.
        let target_before_removal = anchor
            .and_then(|a| siblings.iter().position(|c| *c == a))
            .unwrap_or(siblings.len());
        if target_before_removal == current || target_before_removal == current + 1 {
            return Ok(None);
        }
        siblings.remove(current);
        let target = if target_before_removal > current {
            target_before_removal - 1
        } else {
            target_before_removal
        };
        siblings.insert(target, child);
        Ok(Some((parent, target)))
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}
