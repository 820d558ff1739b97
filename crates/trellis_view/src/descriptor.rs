//! Descriptor model
//!
//! Descriptors are the immutable value a component's `render` returns. They
//! describe what the node tree should look like and carry no behavior; the
//! mount and patch engines turn them into nodes.
//!
//! # Example
//!
//! ```ignore
//! use trellis_view::prelude::*;
//!
//! let tree = body()
//!     .child(view("Header").style("title bold").child(text("Inbox")))
//!     .child(slot().main())
//!     .child(view("Button").key("send").on("tap", on_send));
//! ```

use std::any::TypeId;
use std::fmt;

use indexmap::IndexMap;
use trellis_core::{AttrValue, Listener};

use crate::component::Component;

/// Ordered attribute map of an element
pub type Attributes = IndexMap<String, AttrValue>;

// ============================================================================
// Identity
// ============================================================================

/// Sibling-unique identity used to match children across renders
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(v as i64)
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Key::Int(v as i64)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Str(v)
    }
}

/// Native view class, e.g. `"Text"` or `"Button"`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewType(pub &'static str);

impl ViewType {
    pub const VIEW: ViewType = ViewType("View");
    pub const TEXT: ViewType = ViewType("Text");
    pub const SLOT: ViewType = ViewType("Slot");

    pub fn name(self) -> &'static str {
        self.0
    }
}

/// Identity and factory of a component class
#[derive(Clone, Copy)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
    create: fn() -> Box<dyn Component>,
}

fn create_default<C: Component + Default>() -> Box<dyn Component> {
    Box::new(C::default())
}

impl ComponentType {
    pub fn of<C: Component + Default>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: short_type_name(std::any::type_name::<C>()),
            create: create_default::<C>,
        }
    }

    /// Unqualified Rust type name of the component
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Component> {
        (self.create)()
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({})", self.name)
    }
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    // Generic parameters may contain `::` too; only trim the path before them.
    let end = full.find('<').unwrap_or(full.len());
    match full[..end].rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// Declaration of a slot outlet
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: Option<String>,
    pub main: bool,
    /// Node type name every child must have, if constrained
    pub accepts: Option<String>,
}

impl SlotSpec {
    /// Label used in diagnostics
    pub fn label(&self) -> &str {
        match (&self.name, self.main) {
            (Some(name), _) => name,
            (None, true) => "main",
            (None, false) => "<unnamed>",
        }
    }
}

/// What an element materializes into
#[derive(Clone, Debug)]
pub enum ElementKind {
    View(ViewType),
    Component(ComponentType),
    Slot(SlotSpec),
    /// Root container of a component's render output
    Body,
    /// Root container of a tree mounted outside any component
    Fragment,
}

impl ElementKind {
    /// Type equality for reconciliation
    ///
    /// Slots compare equal regardless of their declaration; a changed
    /// declaration is applied to the existing slot node.
    pub fn same_type(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::View(a), ElementKind::View(b)) => a == b,
            (ElementKind::Component(a), ElementKind::Component(b)) => a == b,
            (ElementKind::Slot(_), ElementKind::Slot(_))
            | (ElementKind::Body, ElementKind::Body)
            | (ElementKind::Fragment, ElementKind::Fragment) => true,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::View(ty) => ty.name(),
            ElementKind::Component(ty) => ty.name(),
            ElementKind::Slot(_) => ViewType::SLOT.name(),
            ElementKind::Body => "Body",
            ElementKind::Fragment => "Fragment",
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// A structural descriptor
#[derive(Clone, Debug)]
pub struct Element {
    pub key: Option<Key>,
    pub kind: ElementKind,
    pub attributes: Attributes,
    pub children: Vec<Descriptor>,
}

/// One entry of a rendered tree
#[derive(Clone, Debug)]
pub enum Descriptor {
    Element(Element),
    Text(String),
    /// Renders nothing
    Bool(bool),
    /// Renders nothing
    Null,
}

impl Descriptor {
    pub fn is_text(&self) -> bool {
        matches!(self, Descriptor::Text(_))
    }

    /// Booleans and null produce no node
    pub fn is_empty(&self) -> bool {
        matches!(self, Descriptor::Bool(_) | Descriptor::Null)
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Descriptor::Element(_))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Descriptor::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        self.as_element().and_then(|el| el.key.as_ref())
    }

    /// Whether two descriptors denote the same logical node
    ///
    /// Elements match on type and key (both absent counts as equal). Text
    /// matches text and empty matches empty.
    pub fn same_node(&self, other: &Descriptor) -> bool {
        match (self, other) {
            (Descriptor::Element(a), Descriptor::Element(b)) => {
                a.kind.same_type(&b.kind) && a.key == b.key
            }
            (Descriptor::Text(_), Descriptor::Text(_)) => true,
            (a, b) => a.is_empty() && b.is_empty(),
        }
    }

    /// Short description for diagnostics
    pub fn describe(&self) -> String {
        match self {
            Descriptor::Element(el) => el.kind.type_name().to_string(),
            Descriptor::Text(_) => "text".to_string(),
            Descriptor::Bool(_) => "bool".to_string(),
            Descriptor::Null => "null".to_string(),
        }
    }
}

impl From<Element> for Descriptor {
    fn from(el: Element) -> Self {
        Descriptor::Element(el)
    }
}

impl From<&str> for Descriptor {
    fn from(s: &str) -> Self {
        Descriptor::Text(s.to_string())
    }
}

impl From<String> for Descriptor {
    fn from(s: String) -> Self {
        Descriptor::Text(s)
    }
}

impl From<bool> for Descriptor {
    fn from(b: bool) -> Self {
        Descriptor::Bool(b)
    }
}

impl<T: Into<Descriptor>> From<Option<T>> for Descriptor {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Descriptor::Null)
    }
}

// ============================================================================
// Builders
// ============================================================================

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            key: None,
            kind,
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Space-separated style tokens
    pub fn style(self, tokens: &str) -> Self {
        self.attr("style", tokens)
    }

    /// Space-separated state tokens
    pub fn state(self, tokens: &str) -> Self {
        self.attr("state", tokens)
    }

    /// Attach a listener for `event` (stored as the `on<event>` attribute)
    pub fn on(self, event: &str, listener: Listener) -> Self {
        self.attr(format!("on{}", event), listener)
    }

    pub fn child(mut self, child: impl Into<Descriptor>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Descriptor>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Name a slot element
    pub fn name(mut self, name: impl Into<String>) -> Self {
        if let ElementKind::Slot(spec) = &mut self.kind {
            spec.name = Some(name.into());
        }
        self
    }

    /// Mark a slot element as the component's main slot
    pub fn main(mut self) -> Self {
        if let ElementKind::Slot(spec) = &mut self.kind {
            spec.main = true;
        }
        self
    }

    /// Restrict a slot element to children of one node type
    pub fn accepts(mut self, type_name: impl Into<String>) -> Self {
        if let ElementKind::Slot(spec) = &mut self.kind {
            spec.accepts = Some(type_name.into());
        }
        self
    }
}

pub fn view(ty: &'static str) -> Element {
    Element::new(ElementKind::View(ViewType(ty)))
}

pub fn body() -> Element {
    Element::new(ElementKind::Body)
}

pub fn fragment() -> Element {
    Element::new(ElementKind::Fragment)
}

pub fn slot() -> Element {
    Element::new(ElementKind::Slot(SlotSpec::default()))
}

pub fn component<C: Component + Default>() -> Element {
    Element::new(ElementKind::Component(ComponentType::of::<C>()))
}

pub fn text(content: impl Into<String>) -> Descriptor {
    Descriptor::Text(content.into())
}
