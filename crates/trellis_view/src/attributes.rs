//! Attribute application
//!
//! Three kinds of attributes are routed differently:
//!
//! - style and state lists are kept as ordered token lists and written back
//!   whole when they change
//! - `onX` attributes holding a listener attach it to the native node
//! - everything else is assigned, after its pre-existing value has been
//!   cached as the default to restore once a render stops specifying it
//!
//! On component nodes plain attributes go through
//! [`Component::set_property`](crate::Component::set_property) first.

use trellis_core::AttrValue;

use crate::component::{Phase, PropertyUpdate};
use crate::descriptor::Attributes;
use crate::error::Result;
use crate::renderer::Renderer;
use crate::tokens::TokenList;
use crate::tree::{NodeId, TokenKind};

impl Renderer {
    /// Assign an attribute on any node
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        self.write_attribute(node, name, &value.into())
    }

    /// Drop an attribute, restoring its default
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<()> {
        self.restore_attribute(node, name)
    }

    /// Reconcile a node's attributes from `old` to `new`
    pub(crate) fn update_attributes(
        &mut self,
        node: NodeId,
        old: &Attributes,
        new: &Attributes,
    ) -> Result<()> {
        for (name, value) in new {
            if old.get(name) != Some(value) {
                self.write_attribute(node, name, value)?;
            }
        }
        for name in old.keys() {
            if !new.contains_key(name) {
                self.restore_attribute(node, name)?;
            }
        }
        Ok(())
    }

    pub(crate) fn write_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: &AttrValue,
    ) -> Result<()> {
        if let Some(kind) = self.token_kind(name) {
            return self.write_tokens(node, kind, name, value);
        }
        if let Some(event) = self.listener_event(node, name, value)? {
            return self.write_listener(node, name, &event, value);
        }
        self.capture_default(node, name)?;
        self.assign(node, name, value)
    }

    pub(crate) fn restore_attribute(&mut self, node: NodeId, name: &str) -> Result<()> {
        let default = self
            .tree
            .get(node)?
            .defaults
            .get(name)
            .cloned()
            .unwrap_or_default();
        let is_special = self.token_kind(name).is_some()
            || self.listener_event(node, name, &AttrValue::Null)?.is_some();
        if is_special {
            return self.write_attribute(node, name, &AttrValue::Null);
        }
        self.assign(node, name, &default)
    }

    fn token_kind(&self, name: &str) -> Option<TokenKind> {
        if name == self.config.style_attribute {
            Some(TokenKind::Style)
        } else if name == self.config.state_attribute {
            Some(TokenKind::State)
        } else {
            None
        }
    }

    /// Event carried by an `onX` attribute
    ///
    /// Null only counts as an event value when a listener is currently
    /// attached under that attribute.
    fn listener_event(&self, node: NodeId, name: &str, value: &AttrValue) -> Result<Option<String>> {
        let Some(event) = self.config.event_name(name) else {
            return Ok(None);
        };
        let is_event = match value {
            AttrValue::Listener(_) => true,
            AttrValue::Null => matches!(
                self.tree.get(node)?.attribute(name),
                Some(AttrValue::Listener(_))
            ),
            _ => false,
        };
        Ok(is_event.then_some(event))
    }

    fn write_listener(
        &mut self,
        node: NodeId,
        name: &str,
        event: &str,
        value: &AttrValue,
    ) -> Result<()> {
        let target = self.tree.get(node)?;
        let handle = target.handle;
        let previous = target.attribute(name).and_then(AttrValue::as_listener).cloned();
        let next = value.as_listener();

        if previous.as_ref() == next {
            return Ok(());
        }
        if let Some(previous) = previous {
            self.backend.detach_listener(handle, event, &previous)?;
            self.tree
                .get_mut(node)?
                .listeners
                .retain(|(e, l)| !(e.as_str() == event && l.ptr_eq(&previous)));
        }
        let target = self.tree.get_mut(node)?;
        match next {
            Some(listener) => {
                target.listeners.push((event.to_string(), listener.clone()));
                target.attributes.insert(name.to_string(), value.clone());
                self.backend.attach_listener(handle, event, listener)?;
            }
            None => {
                target.attributes.remove(name);
            }
        }
        tracing::trace!(?node, event, attached = next.is_some(), "listener updated");
        Ok(())
    }

    fn write_tokens(
        &mut self,
        node: NodeId,
        kind: TokenKind,
        name: &str,
        value: &AttrValue,
    ) -> Result<()> {
        let next = TokenList::parse(value);
        let target = self.tree.get_mut(node)?;
        if *target.tokens(kind) == next {
            return Ok(());
        }

        let diff = target.tokens(kind).diff(&next);
        let handle = target.handle;
        let written = next.to_value();
        *target.tokens_mut(kind) = next;
        if value.is_null() {
            target.attributes.remove(name);
        } else {
            target.attributes.insert(name.to_string(), value.clone());
        }

        tracing::trace!(?node, added = ?diff.added, removed = ?diff.removed, "{} tokens", name);
        self.native_set(handle, name, &written)
    }

    /// Cache the value an attribute had before its first assignment
    fn capture_default(&mut self, node: NodeId, name: &str) -> Result<()> {
        let target = self.tree.get(node)?;
        if target.defaults.contains_key(name) {
            return Ok(());
        }
        let current = target
            .component()
            .filter(|state| state.phase == Phase::Idle)
            .and_then(|state| state.instance.property(name))
            .or_else(|| target.attribute(name).cloned())
            .unwrap_or_default();
        self.tree
            .get_mut(node)?
            .defaults
            .insert(name.to_string(), current);
        Ok(())
    }

    fn assign(&mut self, node: NodeId, name: &str, value: &AttrValue) -> Result<()> {
        let target = self.tree.get_mut(node)?;
        let handle = target.handle;
        // A component applying its own Body attributes writes them natively.
        let update = target
            .component_mut()
            .filter(|state| state.phase == Phase::Idle)
            .map(|state| (state.instance.set_property(name, value), state.rendered));
        if value.is_null() {
            target.attributes.remove(name);
        } else {
            target.attributes.insert(name.to_string(), value.clone());
        }

        match update {
            // A component that has not rendered yet is still invalid.
            Some((PropertyUpdate::Changed, true)) => self.schedule_render(node),
            Some((PropertyUpdate::Changed, false)) | Some((PropertyUpdate::Unchanged, _)) => Ok(()),
            Some((PropertyUpdate::Unhandled, _)) | None => self.native_set(handle, name, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, RenderContext};
    use crate::config::RendererConfig;
    use crate::descriptor::Descriptor;
    use std::cell::Cell;
    use std::rc::Rc;
    use trellis_core::{Event, Listener, ManualFrames, Mutation, RecordingBackend};

    fn renderer() -> (Renderer, RecordingBackend) {
        let backend = RecordingBackend::new();
        let renderer = Renderer::with_config(
            RendererConfig::testing(),
            backend.clone(),
            ManualFrames::new(),
        )
        .unwrap();
        (renderer, backend)
    }

    fn attrs(pairs: &[(&str, AttrValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    struct Titled {
        title: String,
    }

    impl Component for Titled {
        fn render(&self, _cx: &RenderContext) -> Option<Descriptor> {
            None
        }

        fn set_property(&mut self, name: &str, value: &AttrValue) -> PropertyUpdate {
            match (name, value.as_str()) {
                ("title", Some(title)) if title == self.title => PropertyUpdate::Unchanged,
                ("title", Some(title)) => {
                    self.title = title.to_string();
                    PropertyUpdate::Changed
                }
                _ => PropertyUpdate::Unhandled,
            }
        }

        fn property(&self, name: &str) -> Option<AttrValue> {
            (name == "title").then(|| AttrValue::from(self.title.as_str()))
        }
    }

    #[test]
    fn test_removed_attribute_restores_default() {
        let (mut renderer, backend) = renderer();
        let node = renderer.create_view("Label").unwrap();
        let handle = renderer.native_handle(node).unwrap();

        let old = attrs(&[("color", "red".into()), ("size", 12.into())]);
        let new = attrs(&[("size", 14.into())]);
        renderer.update_attributes(node, &Attributes::new(), &old).unwrap();
        renderer.update_attributes(node, &old, &new).unwrap();

        assert_eq!(backend.attribute(handle, "color"), None);
        assert_eq!(backend.attribute(handle, "size"), Some(14.into()));
        assert_eq!(renderer.node(node).unwrap().attribute("color"), None);
    }

    #[test]
    fn test_unchanged_attributes_issue_no_calls() {
        let (mut renderer, backend) = renderer();
        let node = renderer.create_view("Label").unwrap();
        let set = attrs(&[("color", "red".into()), ("style", "a b".into())]);
        renderer.update_attributes(node, &Attributes::new(), &set).unwrap();
        backend.clear_log();

        renderer.update_attributes(node, &set, &set.clone()).unwrap();
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_style_tokens_replace_in_order() {
        let (mut renderer, backend) = renderer();
        let node = renderer.create_view("Label").unwrap();
        let handle = renderer.native_handle(node).unwrap();

        renderer.set_attribute(node, "style", "card selected").unwrap();
        renderer.set_attribute(node, "style", "card disabled").unwrap();
        assert_eq!(
            backend.attribute(handle, "style"),
            Some(AttrValue::List(vec!["card".into(), "disabled".into()]))
        );

        renderer.remove_attribute(node, "style").unwrap();
        assert_eq!(backend.attribute(handle, "style"), Some(AttrValue::List(vec![])));
        assert!(renderer.node(node).unwrap().tokens(TokenKind::Style).is_empty());
    }

    #[test]
    fn test_state_tokens_are_separate() {
        let (mut renderer, _backend) = renderer();
        let node = renderer.create_view("Button").unwrap();
        renderer.set_attribute(node, "state", "pressed").unwrap();

        let target = renderer.node(node).unwrap();
        assert!(target.tokens(TokenKind::State).contains("pressed"));
        assert!(target.tokens(TokenKind::Style).is_empty());
    }

    #[test]
    fn test_listener_attach_swap_detach() {
        let (mut renderer, backend) = renderer();
        let node = renderer.create_view("Button").unwrap();
        let handle = renderer.native_handle(node).unwrap();
        let hits = Rc::new(Cell::new(0));

        let seen = hits.clone();
        let first = Listener::new(move |_| seen.set(seen.get() + 1));
        let seen = hits.clone();
        let second = Listener::new(move |_| seen.set(seen.get() + 10));

        renderer.set_attribute(node, "onTap", first.clone()).unwrap();
        renderer.set_attribute(node, "onTap", first).unwrap();
        assert_eq!(backend.listener_count(handle, "tap"), 1);

        renderer.set_attribute(node, "onTap", second).unwrap();
        assert_eq!(backend.listener_count(handle, "tap"), 1);
        backend.emit(handle, &Event::new("tap"));
        assert_eq!(hits.get(), 10);

        renderer.remove_attribute(node, "onTap").unwrap();
        assert_eq!(backend.listener_count(handle, "tap"), 0);
        assert!(renderer.node(node).unwrap().attribute("onTap").is_none());
        assert_eq!(
            backend.count_where(|m| matches!(m, Mutation::SetAttribute { .. })),
            0
        );
    }

    #[test]
    fn test_on_prefixed_plain_value_is_an_attribute() {
        let (mut renderer, backend) = renderer();
        let node = renderer.create_view("Status").unwrap();
        let handle = renderer.native_handle(node).unwrap();

        renderer.set_attribute(node, "online", true).unwrap();
        assert_eq!(backend.attribute(handle, "online"), Some(true.into()));
        assert_eq!(backend.listener_count(handle, "line"), 0);
    }

    #[test]
    fn test_component_property_default_restored() {
        let (mut renderer, backend) = renderer();
        let node = renderer
            .create_component(Titled {
                title: "Untitled".into(),
            })
            .unwrap();

        renderer.set_attribute(node, "title", "Inbox").unwrap();
        assert_eq!(renderer.component::<Titled>(node).unwrap().title, "Inbox");

        renderer.remove_attribute(node, "title").unwrap();
        assert_eq!(renderer.component::<Titled>(node).unwrap().title, "Untitled");

        // Unhandled attributes reach the component's native node
        renderer.set_attribute(node, "opacity", 0.5).unwrap();
        let handle = renderer.native_handle(node).unwrap();
        assert_eq!(backend.attribute(handle, "opacity"), Some(0.5.into()));
        assert_eq!(backend.attribute(handle, "title"), None);
    }
}
