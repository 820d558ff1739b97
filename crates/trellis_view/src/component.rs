//! Component model
//!
//! A component is a stateful node whose children come from its own
//! [`render`](Component::render) output. The engine keeps, per component, the
//! last rendered tree, the scheduling flags and the slot registry.
//!
//! # Example
//!
//! ```ignore
//! use trellis_view::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl Component for Counter {
//!     fn render(&self, cx: &RenderContext) -> Option<Descriptor> {
//!         let handle = cx.scheduler().clone();
//!         let me = cx.node();
//!         Some(
//!             body()
//!                 .child(view("Label").attr("value", self.count))
//!                 .child(view("Button").on("tap", Listener::new(move |_| handle.schedule_render(me))))
//!                 .into(),
//!         )
//!     }
//! }
//! ```

use std::any::Any;

use trellis_core::AttrValue;

use crate::descriptor::Descriptor;
use crate::mount::Mounted;
use crate::scheduler::SchedulerHandle;
use crate::slot::SlotRegistry;
use crate::tree::NodeId;

// ============================================================================
// Component Trait
// ============================================================================

/// Type-erased access to a component for downcasting
pub trait AsAny: 'static {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Outcome of assigning an attribute to a component
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyUpdate {
    /// State changed; the component needs to re-render
    Changed,
    Unchanged,
    /// Not a component property; forwarded to the component's native node
    Unhandled,
}

pub trait Component: AsAny {
    /// Produce the component's tree; the root must be a Body
    ///
    /// Called by the engine only. Returning `None` renders nothing.
    fn render(&self, cx: &RenderContext) -> Option<Descriptor>;

    fn set_property(&mut self, _name: &str, _value: &AttrValue) -> PropertyUpdate {
        PropertyUpdate::Unhandled
    }

    /// Current value of a property, captured as its default before the
    /// first assignment
    fn property(&self, _name: &str) -> Option<AttrValue> {
        None
    }

    /// Called after each render has been applied
    fn on_render(&mut self, _cx: &RenderContext) {}

    /// Called after a child was attached to this component or one of its slots
    fn on_insert(&mut self, _child: NodeId, _index: usize) {}

    /// Called after a child was detached from this component or one of its slots
    fn on_remove(&mut self, _child: NodeId, _index: usize) {}
}

/// Handed to [`Component::render`] and [`Component::on_render`]
pub struct RenderContext<'a> {
    node: NodeId,
    scheduler: &'a SchedulerHandle,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(node: NodeId, scheduler: &'a SchedulerHandle) -> Self {
        Self { node, scheduler }
    }

    /// The component's own node
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Scheduler handle; clone it into listeners that trigger re-renders
    pub fn scheduler(&self) -> &'a SchedulerHandle {
        self.scheduler
    }

    /// Request a re-render of this component on the next frame
    pub fn schedule_render(&self) {
        self.scheduler.schedule_render(self.node);
    }
}

// ============================================================================
// Engine State
// ============================================================================

/// Structural phase of a component
///
/// Public mutation entry points only accept a component in `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Building its first tree
    Mounting,
    /// Reconciling against its previous tree
    Patching,
    /// Moving an externally supplied child into place
    DelegatingToSlot,
}

/// Engine bookkeeping attached to a component node
pub struct ComponentState {
    pub(crate) instance: Box<dyn Component>,
    pub(crate) name: &'static str,
    /// Mirror of the last rendered tree
    pub(crate) content: Option<Mounted>,
    pub(crate) rendered: bool,
    pub(crate) invalid: bool,
    pub(crate) damaged: bool,
    pub(crate) phase: Phase,
    pub(crate) slots: SlotRegistry,
}

impl ComponentState {
    pub(crate) fn new(instance: Box<dyn Component>, name: &'static str) -> Self {
        Self {
            instance,
            name,
            content: None,
            rendered: false,
            invalid: true,
            damaged: false,
            phase: Phase::Idle,
            slots: SlotRegistry::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn is_damaged(&self) -> bool {
        self.damaged
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn slots(&self) -> &SlotRegistry {
        &self.slots
    }

    pub fn downcast_ref<C: Component>(&self) -> Option<&C> {
        (*self.instance).as_any().downcast_ref::<C>()
    }

    pub fn downcast_mut<C: Component>(&mut self) -> Option<&mut C> {
        (*self.instance).as_any_mut().downcast_mut::<C>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Badge {
        label: String,
    }

    impl Component for Badge {
        fn render(&self, _cx: &RenderContext) -> Option<Descriptor> {
            None
        }
    }

    #[test]
    fn test_new_state_is_invalid() {
        let state = ComponentState::new(Box::new(Badge::default()), "Badge");
        assert!(state.is_invalid());
        assert!(!state.is_damaged());
        assert!(!state.is_rendered());
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_downcast() {
        let mut state = ComponentState::new(Box::new(Badge::default()), "Badge");
        state.downcast_mut::<Badge>().unwrap().label = "new".into();
        assert_eq!(state.downcast_ref::<Badge>().unwrap().label, "new");
    }

    #[test]
    fn test_default_property_hooks() {
        let mut badge = Badge::default();
        assert_eq!(
            badge.set_property("label", &AttrValue::from("x")),
            PropertyUpdate::Unhandled
        );
        assert_eq!(badge.property("label"), None);
    }
}
