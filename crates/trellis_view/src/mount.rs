//! Mount engine
//!
//! Turns descriptor trees into nodes. Every materialized descriptor is
//! recorded in a [`Mounted`] mirror that the patch engine reconciles against
//! on the next render, so descriptors themselves are never annotated.
//!
//! Children are built bottom-up: a node receives its attributes, is rendered
//! if it is a component, and gets its own children before it is attached to
//! its parent.

use crate::component::{Phase, RenderContext};
use crate::descriptor::{Attributes, Descriptor, Element, ElementKind, Key};
use crate::error::{RenderError, Result};
use crate::renderer::Renderer;
use crate::tree::{NodeId, NodeKind};

// ============================================================================
// Mirror Tree
// ============================================================================

/// A rendered descriptor bound to the node it produced
#[derive(Debug)]
pub(crate) enum Mounted {
    Element(MountedElement),
    Text { node: NodeId, content: String },
    /// A boolean or null entry; holds its position without a node
    Empty,
}

#[derive(Debug)]
pub(crate) struct MountedElement {
    pub(crate) key: Option<Key>,
    pub(crate) kind: ElementKind,
    /// For a Body or Fragment root this is the host node
    pub(crate) node: NodeId,
    pub(crate) attributes: Attributes,
    pub(crate) children: Vec<Mounted>,
}

impl Mounted {
    pub(crate) fn node(&self) -> Option<NodeId> {
        match self {
            Mounted::Element(el) => Some(el.node),
            Mounted::Text { node, .. } => Some(*node),
            Mounted::Empty => None,
        }
    }

    pub(crate) fn key(&self) -> Option<&Key> {
        match self {
            Mounted::Element(el) => el.key.as_ref(),
            _ => None,
        }
    }

    /// Descriptor equality for reconciliation, against the mirrored entry
    pub(crate) fn same_node(&self, descriptor: &Descriptor) -> bool {
        match (self, descriptor) {
            (Mounted::Element(current), Descriptor::Element(next)) => {
                current.kind.same_type(&next.kind) && current.key == next.key
            }
            (Mounted::Text { .. }, Descriptor::Text(_)) => true,
            (Mounted::Empty, next) => next.is_empty(),
            _ => false,
        }
    }
}

/// A tree mounted under an arbitrary node by [`Renderer::mount_fragment`]
#[derive(Debug)]
pub struct FragmentHandle {
    host: NodeId,
    root: Option<MountedElement>,
}

impl FragmentHandle {
    /// Node the fragment's children are attached to
    pub fn host(&self) -> NodeId {
        self.host
    }

    /// Top-level nodes of the fragment, in order
    pub fn nodes(&self) -> Vec<NodeId> {
        self.root
            .iter()
            .flat_map(|root| root.children.iter().filter_map(Mounted::node))
            .collect()
    }
}

impl Renderer {
    // ========================================================================
    // Component Rendering
    // ========================================================================

    /// Run `id`'s render and apply it: build on first render, patch after
    pub(crate) fn render_component(&mut self, id: NodeId) -> Result<()> {
        self.scheduler.enter(id)?;
        let result = self.run_render(id);
        self.scheduler.leave(id);
        if let Ok(state) = self.tree.component_mut(id) {
            state.phase = Phase::Idle;
        }
        result
    }

    fn run_render(&mut self, id: NodeId) -> Result<()> {
        let descriptor = {
            let state = self.tree.component(id)?;
            let cx = RenderContext::new(id, self.scheduler.handle());
            state.instance.render(&cx)
        };
        let state = self.tree.component_mut(id)?;
        tracing::debug!("rendering {} {:?}", state.name, id);
        let mut content = state.content.take();

        // The mirror goes back even when applying fails part way.
        let result = self.apply_render(id, &mut content, descriptor);
        self.tree.component_mut(id)?.content = content;
        result?;

        let state = self.tree.component_mut(id)?;
        state.rendered = true;
        let cx = RenderContext::new(id, self.scheduler.handle());
        state.instance.on_render(&cx);
        Ok(())
    }

    fn apply_render(
        &mut self,
        id: NodeId,
        content: &mut Option<Mounted>,
        descriptor: Option<Descriptor>,
    ) -> Result<()> {
        let Some(descriptor) = descriptor else {
            if let Some(previous) = content.take() {
                self.tree.component_mut(id)?.phase = Phase::Patching;
                self.unmount(id, previous)?;
            }
            return Ok(());
        };
        if let Some(previous) = content.as_mut() {
            self.tree.component_mut(id)?.phase = Phase::Patching;
            return self.patch_root(id, previous, &descriptor);
        }
        self.tree.component_mut(id)?.phase = Phase::Mounting;
        self.build(id, &descriptor, content)
    }

    /// First materialization of a component's Body
    ///
    /// Whatever got attached before a failure is recorded in `content`.
    fn build(
        &mut self,
        owner: NodeId,
        descriptor: &Descriptor,
        content: &mut Option<Mounted>,
    ) -> Result<()> {
        let Some(body) = descriptor
            .as_element()
            .filter(|el| matches!(el.kind, ElementKind::Body))
        else {
            return Err(RenderError::InvalidRoot {
                found: descriptor.describe(),
            });
        };

        self.update_attributes(owner, &Attributes::new(), &body.attributes)?;
        let mut children = Vec::with_capacity(body.children.len());
        let result = self.mount_children(owner, owner, &body.children, &mut children);
        *content = Some(Mounted::Element(MountedElement {
            key: body.key.clone(),
            kind: ElementKind::Body,
            node: owner,
            attributes: body.attributes.clone(),
            children,
        }));
        result
    }

    /// Remove everything a previous render produced
    fn unmount(&mut self, owner: NodeId, previous: Mounted) -> Result<()> {
        let Mounted::Element(root) = previous else {
            return Ok(());
        };
        for child in root.children {
            self.discard_mounted(owner, child)?;
        }
        self.update_attributes(owner, &root.attributes, &Attributes::new())?;
        tracing::debug!(?owner, "unmounted rendered content");
        Ok(())
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Materialize and attach `descriptors` in order
    ///
    /// Entries are pushed to `children` as they are attached, so a failure
    /// leaves it describing exactly what was mounted.
    fn mount_children(
        &mut self,
        owner: NodeId,
        parent: NodeId,
        descriptors: &[Descriptor],
        children: &mut Vec<Mounted>,
    ) -> Result<()> {
        for descriptor in descriptors {
            let mounted = self.materialize(owner, descriptor)?;
            if let Some(node) = mounted.node() {
                if let Err(err) = self.place(owner, parent, node, None) {
                    self.discard_mounted(owner, mounted)?;
                    return Err(err);
                }
            }
            children.push(mounted);
        }
        Ok(())
    }

    /// Create the detached node tree for one descriptor
    pub(crate) fn materialize(&mut self, owner: NodeId, descriptor: &Descriptor) -> Result<Mounted> {
        match descriptor {
            Descriptor::Element(el) => Ok(Mounted::Element(self.materialize_element(owner, el)?)),
            Descriptor::Text(content) => {
                let node = self.create_node(NodeKind::Text, Some(owner))?;
                self.write_text(node, content)?;
                Ok(Mounted::Text {
                    node,
                    content: content.clone(),
                })
            }
            Descriptor::Bool(_) | Descriptor::Null => Ok(Mounted::Empty),
        }
    }

    fn materialize_element(&mut self, owner: NodeId, el: &Element) -> Result<MountedElement> {
        let node = match &el.kind {
            ElementKind::Body | ElementKind::Fragment => {
                return Err(RenderError::MisplacedContainer {
                    kind: el.kind.type_name(),
                })
            }
            ElementKind::View(ty) => self.create_node(NodeKind::View(*ty), Some(owner))?,
            ElementKind::Slot(spec) => self.create_slot(owner, spec.clone())?,
            ElementKind::Component(ty) => {
                self.create_component_node(ty.instantiate(), ty.name(), Some(owner))?
            }
        };

        let mut children = Vec::with_capacity(el.children.len());
        if let Err(err) = self.fill_element(owner, node, el, &mut children) {
            if let Err(cleanup) = self.discard(owner, node) {
                tracing::warn!(?node, "releasing partial element: {}", cleanup);
            }
            return Err(err);
        }

        Ok(MountedElement {
            key: el.key.clone(),
            kind: el.kind.clone(),
            node,
            attributes: el.attributes.clone(),
            children,
        })
    }

    fn fill_element(
        &mut self,
        owner: NodeId,
        node: NodeId,
        el: &Element,
        children: &mut Vec<Mounted>,
    ) -> Result<()> {
        self.update_attributes(node, &Attributes::new(), &el.attributes)?;
        if self.tree.is_component(node) {
            self.render_if_needed(node)?;
        }
        self.mount_children(owner, node, &el.children, children)
    }

    /// Attach a node rendered by `owner` as a child of `parent`
    pub(crate) fn place(
        &mut self,
        owner: NodeId,
        parent: NodeId,
        node: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        let container = self.container_for(owner, parent)?;
        self.attach(container, node, anchor)?;
        Ok(())
    }

    /// Put `node` before `anchor`, attaching it again if something detached it
    pub(crate) fn relocate(
        &mut self,
        owner: NodeId,
        parent: NodeId,
        node: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        if self.tree.parent(node).is_some() {
            self.move_before(node, anchor)
        } else {
            self.place(owner, parent, node, anchor)
        }
    }

    /// Children rendered inside another component go through its main slot
    fn container_for(&self, owner: NodeId, parent: NodeId) -> Result<NodeId> {
        if parent != owner && self.tree.is_component(parent) {
            self.resolve_container(parent, None)
        } else {
            Ok(parent)
        }
    }

    pub(crate) fn discard_mounted(&mut self, owner: NodeId, mounted: Mounted) -> Result<()> {
        match mounted.node() {
            Some(node) if self.tree.contains(node) => self.discard(owner, node),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Fragments
    // ========================================================================

    /// Mount a Fragment-rooted tree as children of `host`
    ///
    /// Nodes are appended after the host's existing children. Attributes on
    /// the Fragment itself are ignored.
    pub fn mount_fragment(
        &mut self,
        host: NodeId,
        descriptor: impl Into<Descriptor>,
    ) -> Result<FragmentHandle> {
        let descriptor = descriptor.into();
        let root = fragment_root(&descriptor)?;

        self.lock(host)?;
        let mut children = Vec::with_capacity(root.children.len());
        let result = self.mount_children(host, host, &root.children, &mut children);
        if result.is_err() {
            for child in children.drain(..) {
                if let Err(cleanup) = self.discard_mounted(host, child) {
                    tracing::warn!(?host, "releasing partial fragment: {}", cleanup);
                }
            }
        }
        self.unlock(host);
        result?;

        Ok(FragmentHandle {
            host,
            root: Some(MountedElement {
                key: None,
                kind: ElementKind::Fragment,
                node: host,
                attributes: root.attributes.clone(),
                children,
            }),
        })
    }

    /// Reconcile a mounted fragment against a new Fragment-rooted tree
    pub fn patch_fragment(
        &mut self,
        handle: &mut FragmentHandle,
        descriptor: impl Into<Descriptor>,
    ) -> Result<()> {
        let descriptor = descriptor.into();
        let next = fragment_root(&descriptor)?;
        let host = handle.host;
        let root = handle
            .root
            .as_mut()
            .ok_or(RenderError::Internal("fragment already unmounted"))?;

        self.lock(host)?;
        self.defer_slots(host);
        let walked = self.update_children(host, host, &mut root.children, &next.children);
        let result = walked.and(self.settle_slots(host));
        self.unlock(host);
        root.attributes = next.attributes.clone();
        result
    }

    /// Destroy every node a fragment produced
    pub fn unmount_fragment(&mut self, mut handle: FragmentHandle) -> Result<()> {
        let Some(root) = handle.root.take() else {
            return Ok(());
        };
        self.lock(handle.host)?;
        let result = root
            .children
            .into_iter()
            .try_for_each(|child| self.discard_mounted(handle.host, child));
        self.unlock(handle.host);
        result
    }
}

fn fragment_root(descriptor: &Descriptor) -> Result<&Element> {
    descriptor
        .as_element()
        .filter(|el| matches!(el.kind, ElementKind::Fragment))
        .ok_or_else(|| RenderError::InvalidRoot {
            found: descriptor.describe(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::config::RendererConfig;
    use crate::descriptor::{body, component, fragment, slot, text, view};
    use trellis_core::{AttrValue, ManualFrames, Mutation, RecordingBackend};

    #[derive(Default)]
    struct Scripted {
        tree: Option<Descriptor>,
    }

    impl Component for Scripted {
        fn render(&self, _cx: &RenderContext) -> Option<Descriptor> {
            self.tree.clone()
        }
    }

    #[derive(Default)]
    struct Leaf;

    impl Component for Leaf {
        fn render(&self, _cx: &RenderContext) -> Option<Descriptor> {
            Some(body().child(view("Dot")).into())
        }
    }

    #[derive(Default)]
    struct Frame;

    impl Component for Frame {
        fn render(&self, _cx: &RenderContext) -> Option<Descriptor> {
            Some(
                body()
                    .child(view("Chrome"))
                    .child(slot().main())
                    .into(),
            )
        }
    }

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

    fn mount(renderer: &mut Renderer, tree: impl Into<Descriptor>) -> Result<NodeId> {
        let id = renderer.create_component(Scripted {
            tree: Some(tree.into()),
        })?;
        let root = renderer.root();
        renderer.append(root, id, None)?;
        Ok(id)
    }

    #[test]
    fn test_build_creates_native_tree() {
        let (mut renderer, backend) = renderer();
        let id = mount(
            &mut renderer,
            body()
                .attr("title", "Inbox")
                .child(view("Header").style("bold").child(text("Hi")))
                .child(view("List")),
        )
        .unwrap();

        let handle = renderer.native_handle(id).unwrap();
        assert_eq!(backend.child_types(handle), vec!["Header", "List"]);
        assert_eq!(backend.attribute(handle, "title"), Some("Inbox".into()));

        let header = renderer.children(id)[0];
        let header_handle = renderer.native_handle(header).unwrap();
        assert_eq!(
            backend.attribute(header_handle, "style"),
            Some(AttrValue::List(vec!["bold".into()]))
        );
        let label = renderer.children(header)[0];
        assert_eq!(
            backend.attribute(renderer.native_handle(label).unwrap(), "content"),
            Some("Hi".into())
        );
        assert!(renderer.node(id).unwrap().component().unwrap().is_rendered());
    }

    #[test]
    fn test_empty_children_produce_no_nodes() {
        let (mut renderer, _backend) = renderer();
        let id = mount(
            &mut renderer,
            body()
                .child(false)
                .child(view("A"))
                .child(Descriptor::Null),
        )
        .unwrap();
        assert_eq!(renderer.children(id).len(), 1);
    }

    #[test]
    fn test_root_must_be_body() {
        let (mut renderer, _backend) = renderer();
        assert_eq!(
            mount(&mut renderer, view("View")),
            Err(RenderError::InvalidRoot {
                found: "View".into()
            })
        );
        assert_eq!(
            mount(&mut renderer, body().child(body())),
            Err(RenderError::MisplacedContainer { kind: "Body" })
        );
    }

    #[test]
    fn test_nested_component_renders_before_attach() {
        let (mut renderer, backend) = renderer();
        let id = mount(&mut renderer, body().child(component::<Leaf>())).unwrap();
        let leaf = renderer.children(id)[0];
        let leaf_handle = renderer.native_handle(leaf).unwrap();
        let dot_handle = renderer.native_handle(renderer.children(leaf)[0]).unwrap();

        let log = backend.mutations();
        let position = |wanted: &Mutation| log.iter().position(|m| m == wanted);
        let dot_inserted = position(&Mutation::Insert {
            parent: leaf_handle,
            child: dot_handle,
            index: 0,
        });
        let leaf_inserted = position(&Mutation::Insert {
            parent: renderer.native_handle(id).unwrap(),
            child: leaf_handle,
            index: 0,
        });
        assert!(dot_inserted.is_some());
        assert!(dot_inserted < leaf_inserted);
        assert_eq!(renderer.node(leaf).unwrap().type_name(), "Leaf");
    }

    #[test]
    fn test_component_children_go_to_main_slot() {
        let (mut renderer, _backend) = renderer();
        let id = mount(
            &mut renderer,
            body().child(component::<Frame>().child(view("Content"))),
        )
        .unwrap();

        let frame = renderer.children(id)[0];
        let main = renderer.main_slot(frame).unwrap().unwrap();
        let placed = renderer.children(main);
        assert_eq!(placed.len(), 1);
        assert_eq!(renderer.node(placed[0]).unwrap().type_name(), "Content");
        assert_eq!(renderer.children(frame).len(), 2);
    }

    #[test]
    fn test_render_none_unmounts_content() {
        let (mut renderer, backend) = renderer();
        let id = mount(&mut renderer, body().child(view("A"))).unwrap();
        let a_handle = renderer.native_handle(renderer.children(id)[0]).unwrap();

        renderer
            .update::<Scripted, _>(id, |c| c.tree = None)
            .unwrap();
        renderer.flush().unwrap();

        assert!(renderer.children(id).is_empty());
        assert!(backend.is_released(a_handle));
    }

    #[test]
    fn test_fragment_lifecycle() {
        let (mut renderer, backend) = renderer();
        let root = renderer.root();
        let host = renderer.create_view("List").unwrap();
        renderer.append(root, host, None).unwrap();

        let mut handle = renderer
            .mount_fragment(
                host,
                fragment()
                    .child(view("Row").key(1))
                    .child(view("Row").key(2)),
            )
            .unwrap();
        let rows = handle.nodes();
        assert_eq!(renderer.children(host), rows.as_slice());
        let first_handle = renderer.native_handle(rows[0]).unwrap();

        renderer
            .patch_fragment(&mut handle, fragment().child(view("Row").key(2)))
            .unwrap();
        assert_eq!(renderer.children(host), &[rows[1]]);
        assert!(backend.is_released(first_handle));

        renderer.unmount_fragment(handle).unwrap();
        assert!(renderer.children(host).is_empty());
    }

    #[test]
    fn test_fragment_rejects_slots_and_bad_roots() {
        let (mut renderer, _backend) = renderer();
        let host = renderer.create_view("List").unwrap();

        assert_eq!(
            renderer
                .mount_fragment(host, fragment().child(slot().main()))
                .map(|_| ()),
            Err(RenderError::SlotOutsideComponent)
        );
        assert_eq!(
            renderer.mount_fragment(host, body()).map(|_| ()),
            Err(RenderError::InvalidRoot {
                found: "Body".into()
            })
        );
    }
}
