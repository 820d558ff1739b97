//! Slot distribution
//!
//! A component declares outlets in its own render output: at most one main
//! slot and at most one slot per name. Children that application code adds
//! to the component are redirected:
//!
//! - to the slot registered under the requested name (unknown names fail)
//! - else to the main slot
//! - else directly under the component's own node
//!
//! Removal follows the slot recorded on the child when it was attached, not
//! the name the caller passes.
//!
//! While a patch is running, slot declarations are collected instead of
//! registered and settled once the child walk ends. Uniqueness is then
//! checked against the new render only, so slots may trade names or the
//! main role between renders.

use rustc_hash::FxHashMap;

use crate::component::Phase;
use crate::descriptor::SlotSpec;
use crate::error::{RenderError, Result};
use crate::renderer::Renderer;
use crate::tree::{NodeId, NodeKind};

/// Slots registered by one component
#[derive(Debug, Default)]
pub struct SlotRegistry {
    main: Option<NodeId>,
    named: FxHashMap<String, NodeId>,
    /// Slots declared or changed by the patch in progress
    deferred: Option<Vec<NodeId>>,
}

impl SlotRegistry {
    pub fn main(&self) -> Option<NodeId> {
        self.main
    }

    pub fn named(&self, name: &str) -> Option<NodeId> {
        self.named.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.named.len() + usize::from(self.main.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate a declaration against the uniqueness rules
    pub(crate) fn check(&self, spec: &SlotSpec) -> Result<()> {
        check_declaration(spec)?;
        if spec.main && self.main.is_some() {
            return Err(RenderError::DuplicateMainSlot);
        }
        if let Some(name) = spec.name.as_deref().filter(|n| !n.is_empty()) {
            if self.named.contains_key(name) {
                return Err(RenderError::DuplicateSlot(name.to_string()));
            }
        }
        Ok(())
    }

    /// Register a slot; on error nothing is registered
    pub(crate) fn register(&mut self, spec: &SlotSpec, node: NodeId) -> Result<()> {
        self.check(spec)?;
        if spec.main {
            self.main = Some(node);
        }
        if let Some(name) = spec.name.as_deref().filter(|n| !n.is_empty()) {
            self.named.insert(name.to_string(), node);
        }
        Ok(())
    }

    pub(crate) fn unregister(&mut self, node: NodeId) {
        if self.main == Some(node) {
            self.main = None;
        }
        self.named.retain(|_, slot| *slot != node);
    }

    /// Hold back registrations until [`SlotRegistry::take_deferred`]
    pub(crate) fn begin_deferral(&mut self) {
        self.deferred.get_or_insert_with(Vec::new);
    }

    /// Queue `node` for registration if a deferral is open
    fn defer(&mut self, node: NodeId) -> bool {
        if self.deferred.is_none() {
            return false;
        }
        self.unregister(node);
        self.deferred.get_or_insert_with(Vec::new).push(node);
        true
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<NodeId> {
        self.deferred.take().unwrap_or_default()
    }
}

/// A slot must be main, named, or both
fn check_declaration(spec: &SlotSpec) -> Result<()> {
    if spec.name.as_deref().map_or(true, str::is_empty) && !spec.main {
        return Err(RenderError::UnnamedSlot);
    }
    Ok(())
}

impl Renderer {
    // ========================================================================
    // Public Distribution API
    // ========================================================================

    /// Append `child` to `parent`, redirecting through the component's slots
    pub fn append(&mut self, parent: NodeId, child: NodeId, slot: Option<&str>) -> Result<()> {
        self.insert_at(parent, child, None, slot)
    }

    /// Insert `child` at `index` of the resolved container (clamped)
    pub fn insert(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
        slot: Option<&str>,
    ) -> Result<()> {
        self.insert_at(parent, child, Some(index), slot)
    }

    /// Detach `child` from `parent` or from the slot of `parent` it sits in
    ///
    /// A slot name, when given, must exist; the actual container is the one
    /// recorded on the child.
    pub fn remove(&mut self, parent: NodeId, child: NodeId, slot: Option<&str>) -> Result<()> {
        if slot.is_some() {
            self.resolve_container(parent, slot)?;
        }
        let Some(actual) = self.tree.parent(child) else {
            return Ok(());
        };
        let container = self.tree.get(child)?.assigned_slot.unwrap_or(actual);
        let belongs = container == parent || self.slot_owner(container) == Some(parent);
        if !belongs {
            return Err(RenderError::NotAChild { parent, child });
        }

        self.lock(parent)?;
        let result = self.detach(container, child).map(|_| ());
        self.unlock(parent);
        result
    }

    /// Slot registered under `name` by `component`
    pub fn slot(&self, component: NodeId, name: &str) -> Result<Option<NodeId>> {
        Ok(self.tree.component(component)?.slots.named(name))
    }

    pub fn main_slot(&self, component: NodeId) -> Result<Option<NodeId>> {
        Ok(self.tree.component(component)?.slots.main())
    }

    fn insert_at(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: Option<usize>,
        slot: Option<&str>,
    ) -> Result<()> {
        if child == parent || self.tree.ancestors(parent).any(|a| a == child) {
            return Err(RenderError::CyclicInsert(child));
        }
        let container = self.resolve_container(parent, slot)?;
        let anchor = index.and_then(|i| self.tree.children(container).get(i).copied());

        self.lock(parent)?;
        let result = self.attach(container, child, anchor).map(|_| ());
        self.unlock(parent);
        result
    }

    /// Container that receives children added to `parent` under `slot`
    pub(crate) fn resolve_container(&self, parent: NodeId, slot: Option<&str>) -> Result<NodeId> {
        let node = self.tree.get(parent)?;
        match (node.component(), slot) {
            (Some(state), Some(name)) => state
                .slots
                .named(name)
                .ok_or_else(|| RenderError::UnknownSlot(name.to_string())),
            (Some(state), None) => Ok(state.slots.main().unwrap_or(parent)),
            (None, Some(name)) => Err(RenderError::UnknownSlot(name.to_string())),
            (None, None) => Ok(parent),
        }
    }

    fn slot_owner(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .get(node)
            .ok()
            .and_then(|n| n.slot())
            .map(|slot| slot.owner)
    }

    pub(crate) fn lock(&mut self, parent: NodeId) -> Result<()> {
        if let Some(state) = self.tree.get_mut(parent)?.component_mut() {
            if state.phase != Phase::Idle {
                return Err(RenderError::ComponentBusy { phase: state.phase });
            }
            state.phase = Phase::DelegatingToSlot;
        }
        Ok(())
    }

    pub(crate) fn unlock(&mut self, parent: NodeId) {
        if let Ok(state) = self.tree.component_mut(parent) {
            state.phase = Phase::Idle;
        }
    }

    // ========================================================================
    // Engine Hooks
    // ========================================================================

    /// Create and register a slot node declared by `owner`'s render
    pub(crate) fn create_slot(&mut self, owner: NodeId, spec: SlotSpec) -> Result<NodeId> {
        let Ok(state) = self.tree.component(owner) else {
            return Err(RenderError::SlotOutsideComponent);
        };
        check_declaration(&spec)?;
        if state.slots.deferred.is_none() {
            state.slots.check(&spec)?;
        }

        let node = self.create_node(
            NodeKind::Slot(crate::tree::SlotNode {
                spec: spec.clone(),
                owner,
            }),
            Some(owner),
        )?;
        let slots = &mut self.tree.component_mut(owner)?.slots;
        if !slots.defer(node) {
            slots.register(&spec, node)?;
            tracing::debug!("registered slot '{}' {:?}", spec.label(), node);
        }
        Ok(node)
    }

    /// Apply a changed declaration to an existing slot node
    pub(crate) fn respec_slot(&mut self, node: NodeId, spec: SlotSpec) -> Result<()> {
        check_declaration(&spec)?;
        let owner = self
            .slot_owner(node)
            .ok_or(RenderError::Internal("respec of a non-slot node"))?;
        let slots = &mut self.tree.component_mut(owner)?.slots;
        if !slots.defer(node) {
            slots.unregister(node);
            slots.register(&spec, node)?;
        }

        if let NodeKind::Slot(slot) = &mut self.tree.get_mut(node)?.kind {
            slot.spec = spec;
        }
        Ok(())
    }

    /// Open a deferral on `owner`'s slots for the duration of a patch
    pub(crate) fn defer_slots(&mut self, owner: NodeId) {
        if let Ok(state) = self.tree.component_mut(owner) {
            state.slots.begin_deferral();
        }
    }

    /// Register every slot the patch declared or changed
    ///
    /// Slots released during the patch are skipped. On a conflict the slot
    /// settled first keeps the name, and the first error is returned once
    /// every other slot is registered.
    pub(crate) fn settle_slots(&mut self, owner: NodeId) -> Result<()> {
        let Ok(state) = self.tree.component_mut(owner) else {
            return Ok(());
        };
        let deferred = state.slots.take_deferred();
        let mut first_error = None;
        for node in deferred {
            let spec = self.tree.get(node).ok().and_then(|n| n.slot());
            let Some(spec) = spec.map(|slot| slot.spec.clone()) else {
                continue;
            };
            let slots = &mut self.tree.component_mut(owner)?.slots;
            match slots.register(&spec, node) {
                Ok(()) => tracing::debug!("registered slot '{}' {:?}", spec.label(), node),
                Err(err) => {
                    tracing::warn!(?owner, "slot '{}' rejected: {}", spec.label(), err);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Enforce a slot's content type on a child about to enter `container`
    pub(crate) fn check_slot_accepts(&self, container: NodeId, child: NodeId) -> Result<()> {
        let Some(slot) = self.tree.get(container)?.slot() else {
            return Ok(());
        };
        let Some(expected) = slot.spec.accepts.as_deref() else {
            return Ok(());
        };
        let found = self.tree.get(child)?.type_name();
        if found != expected {
            return Err(RenderError::SlotTypeMismatch {
                slot: slot.spec.label().to_string(),
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Drop the registration of a slot node being destroyed
    pub(crate) fn unregister_slot(&mut self, node: NodeId) {
        if let Some(owner) = self.slot_owner(node) {
            if let Ok(state) = self.tree.component_mut(owner) {
                state.slots.unregister(node);
            }
        }
    }
}
