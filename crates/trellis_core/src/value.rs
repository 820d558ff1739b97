//! Attribute values and event listeners
//!
//! `AttrValue` is the currency between descriptors, nodes and the native
//! backend. Everything a render can assign to a node is expressed as one
//! of its variants, including event listeners.

use std::fmt;
use std::rc::Rc;

// ============================================================================
// Events
// ============================================================================

/// An event delivered to a listener
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name without the `on` prefix, lowercased (`"tap"`)
    pub name: String,
    /// Optional payload
    pub data: AttrValue,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: AttrValue::Null,
        }
    }

    pub fn with_data(mut self, data: impl Into<AttrValue>) -> Self {
        self.data = data.into();
        self
    }
}

/// Shared event callback
///
/// Listeners compare by identity: two listeners are equal only when they
/// wrap the same allocation. Re-rendering with a cloned listener is a no-op,
/// re-rendering with a fresh closure swaps the native registration.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Event)>);

impl Listener {
    pub fn new(callback: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(callback))
    }

    /// Invoke the callback
    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

// ============================================================================
// Values
// ============================================================================

/// Value assignable to a node attribute
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    /// Absent value; assigning it resets the attribute on the native side
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Ordered token list (style and state lists)
    List(Vec<String>),
    Listener(Listener),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AttrValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_listener(&self) -> Option<&Listener> {
        match self {
            AttrValue::Listener(l) => Some(l),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::List(_) => "list",
            AttrValue::Listener(_) => "listener",
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        AttrValue::List(v)
    }
}

impl From<Listener> for AttrValue {
    fn from(v: Listener) -> Self {
        AttrValue::Listener(v)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_listener_identity() {
        let a = Listener::new(|_| {});
        let b = a.clone();
        let c = Listener::new(|_| {});

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(AttrValue::from(a.clone()), AttrValue::from(b));
        assert_ne!(AttrValue::from(a), AttrValue::from(c));
    }

    #[test]
    fn test_listener_call() {
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        let listener = Listener::new(move |event| {
            assert_eq!(event.name, "tap");
            seen.set(seen.get() + 1);
        });

        listener.call(&Event::new("tap"));
        listener.call(&Event::new("tap").with_data(3));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(AttrValue::from("red").as_str(), Some("red"));
        assert_eq!(AttrValue::from(4).as_i64(), Some(4));
        assert_eq!(AttrValue::from(4).as_f64(), Some(4.0));
        assert_eq!(AttrValue::from(true).as_bool(), Some(true));
        assert!(AttrValue::from(None::<i64>).is_null());
        assert_eq!(AttrValue::from(Some("x")), AttrValue::Str("x".into()));
        assert_eq!(AttrValue::List(vec![]).type_name(), "list");
    }
}
