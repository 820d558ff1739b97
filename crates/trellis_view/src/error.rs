//! Error types for trellis_view

use thiserror::Error;
use trellis_core::NativeError;

use crate::component::Phase;
use crate::tree::NodeId;

/// Errors raised while mounting, patching or redistributing nodes
///
/// Structural violations are programming errors in a component's render
/// output. They abort the current operation and leave the tree in whatever
/// state it reached; nothing is rolled back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A component rendered something other than a Body element
    #[error("component render root must be a Body, found {found}")]
    InvalidRoot { found: String },

    /// A Body or Fragment appeared below the root of a rendered tree
    #[error("{kind} is only valid as the root of a rendered tree")]
    MisplacedContainer { kind: &'static str },

    #[error("component already has a main slot")]
    DuplicateMainSlot,

    #[error("component already has a slot named '{0}'")]
    DuplicateSlot(String),

    /// A slot declared neither a name nor the main flag
    #[error("slot must be named or marked as main")]
    UnnamedSlot,

    /// A slot was rendered outside of any component
    #[error("slot has no owning component")]
    SlotOutsideComponent,

    #[error("slot '{slot}' accepts {expected}, got {found}")]
    SlotTypeMismatch {
        slot: String,
        expected: String,
        found: String,
    },

    /// Two rendered roots are not the same logical node
    #[error("cannot reconcile incompatible descriptor roots")]
    IncompatibleRoots,

    #[error("component has no slot named '{0}'")]
    UnknownSlot(String),

    #[error("node {child:?} is not a child of {parent:?} or its slots")]
    NotAChild { parent: NodeId, child: NodeId },

    /// A node was inserted into itself or one of its descendants
    #[error("node {0:?} cannot be inserted below itself")]
    CyclicInsert(NodeId),

    /// A public mutation hit a component in the middle of a structural change
    #[error("component is busy ({phase:?})")]
    ComponentBusy { phase: Phase },

    #[error("component {0:?} is already rendering")]
    ReentrantRender(NodeId),

    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0:?} is not a component")]
    NotAComponent(NodeId),

    #[error("native backend error: {0}")]
    Native(#[from] NativeError),

    #[error("internal error: {0}")]
    Internal(&'static str),
}

/// Result type for trellis_view operations
pub type Result<T> = std::result::Result<T, RenderError>;
