//! Trellis View Engine
//!
//! Declarative rendering and reconciliation on top of a native node backend.
//!
//! - **Descriptors**: immutable values built with `body()`, `view()`,
//!   `slot()`, `component::<C>()` and `text()`
//! - **Mount/Patch**: first renders materialize nodes; later renders are
//!   reconciled with keyed, two-ended child matching
//! - **Slots**: components distribute externally added children through
//!   main and named outlets
//! - **Scheduling**: invalidations coalesce into one flush per display frame,
//!   pruned by damage flags
//!
//! # Example
//!
//! ```rust
//! use trellis_view::prelude::*;
//!
//! #[derive(Default)]
//! struct Greeting;
//!
//! impl Component for Greeting {
//!     fn render(&self, _cx: &RenderContext) -> Option<Descriptor> {
//!         Some(
//!             body()
//!                 .child(view("Label").style("title").child(text("Hello")))
//!                 .child(slot().main())
//!                 .into(),
//!         )
//!     }
//! }
//!
//! let mut renderer = Renderer::new(RecordingBackend::new(), ManualFrames::new()).unwrap();
//! let greeting = renderer.create_component(Greeting).unwrap();
//! let root = renderer.root();
//! renderer.append(root, greeting, None).unwrap();
//!
//! // Children added to the component land in its main slot
//! let extra = renderer.create_view("Button").unwrap();
//! renderer.append(greeting, extra, None).unwrap();
//! let main = renderer.main_slot(greeting).unwrap().unwrap();
//! assert_eq!(renderer.children(main), &[extra]);
//! ```

pub mod attributes;
pub mod component;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod mount;
pub mod patch;
pub mod renderer;
pub mod scheduler;
pub mod slot;
pub mod tokens;
pub mod tree;


pub use component::{Component, ComponentState, Phase, PropertyUpdate, RenderContext};
pub use config::{ConfigError, RendererConfig};
pub use descriptor::{
    Attributes, ComponentType, Descriptor, Element, ElementKind, Key, SlotSpec, ViewType,
};
pub use error::{RenderError, Result};
pub use mount::FragmentHandle;
pub use renderer::Renderer;
pub use scheduler::{FlushReport, RenderScheduler, SchedulerHandle};
pub use slot::SlotRegistry;
pub use tokens::{TokenDiff, TokenList};
pub use tree::{Node, NodeId, NodeKind, NodeTree};

pub mod prelude {
    pub use crate::component::{Component, PropertyUpdate, RenderContext};
    pub use crate::descriptor::{
        body, component, fragment, slot, text, view, Descriptor, Element, Key,
    };
    pub use crate::error::{RenderError, Result};
    pub use crate::mount::FragmentHandle;
    pub use crate::renderer::Renderer;
    pub use crate::scheduler::SchedulerHandle;
    pub use crate::tree::NodeId;
    pub use trellis_core::{
        AttrValue, Event, Listener, ManualFrames, NativeBackend, RecordingBackend,
    };
}
