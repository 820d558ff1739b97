//! Patch engine
//!
//! Reconciles a component's mirror tree against its next render. Matching
//! descriptors keep their node and only have attributes and children
//! updated; everything else is created or destroyed.
//!
//! Children are matched with a two-ended walk. Each step tries, in order:
//!
//! 1. old head against new head
//! 2. old tail against new tail
//! 3. old head against new tail (the node moves to the end of the range)
//! 4. old tail against new head (the node moves to the front of the range)
//! 5. the new head's key against the remaining old entries
//!
//! Appends, prepends, reversals and single-element shifts therefore cost a
//! constant number of native moves. Old entries consumed out of order are
//! left as `None` in place.

use rustc_hash::FxHashMap;

use crate::descriptor::{Descriptor, Element, ElementKind, Key};
use crate::error::{RenderError, Result};
use crate::mount::{Mounted, MountedElement};
use crate::renderer::Renderer;
use crate::tree::NodeId;

impl Renderer {
    /// Reconcile a component's mounted Body with a new render
    pub(crate) fn patch_root(
        &mut self,
        owner: NodeId,
        previous: &mut Mounted,
        descriptor: &Descriptor,
    ) -> Result<()> {
        let Some(body) = descriptor
            .as_element()
            .filter(|el| matches!(el.kind, ElementKind::Body))
        else {
            return Err(RenderError::InvalidRoot {
                found: descriptor.describe(),
            });
        };
        let Mounted::Element(root) = previous else {
            return Err(RenderError::IncompatibleRoots);
        };
        if !matches!(root.kind, ElementKind::Body) {
            return Err(RenderError::IncompatibleRoots);
        }

        self.update_attributes(owner, &root.attributes, &body.attributes)?;
        root.attributes = body.attributes.clone();

        self.defer_slots(owner);
        let walked = self.update_children(owner, owner, &mut root.children, &body.children);
        let settled = self.settle_slots(owner);
        walked.and(settled)
    }

    /// Update one matched entry in place
    fn patch(&mut self, owner: NodeId, mounted: &mut Mounted, descriptor: &Descriptor) -> Result<()> {
        match (mounted, descriptor) {
            (Mounted::Element(current), Descriptor::Element(next)) => {
                self.patch_element(owner, current, next)
            }
            (Mounted::Text { node, content }, Descriptor::Text(next)) => {
                if *content != *next {
                    self.write_text(*node, next)?;
                    *content = next.clone();
                }
                Ok(())
            }
            (Mounted::Empty, next) if next.is_empty() => Ok(()),
            _ => Err(RenderError::IncompatibleRoots),
        }
    }

    fn patch_element(
        &mut self,
        owner: NodeId,
        current: &mut MountedElement,
        next: &Element,
    ) -> Result<()> {
        let node = current.node;
        if let (ElementKind::Slot(old), ElementKind::Slot(new)) = (&current.kind, &next.kind) {
            if old != new {
                self.respec_slot(node, new.clone())?;
            }
        }

        self.update_attributes(node, &current.attributes, &next.attributes)?;
        current.attributes = next.attributes.clone();
        current.kind = next.kind.clone();
        self.update_children(owner, node, &mut current.children, &next.children)
    }

    // ========================================================================
    // Child Reconciliation
    // ========================================================================

    /// Reconcile the children of `parent` from `current` to `next`
    ///
    /// Nodes are created and discarded on behalf of `owner`. When a step
    /// fails, `current` is left holding every entry that still has a live
    /// node, in container order, so the next render reconciles against what
    /// is actually attached.
    pub(crate) fn update_children(
        &mut self,
        owner: NodeId,
        parent: NodeId,
        current: &mut Vec<Mounted>,
        next: &[Descriptor],
    ) -> Result<()> {
        let mut old: Vec<Option<Mounted>> = std::mem::take(current).into_iter().map(Some).collect();
        let mut out: Vec<Option<Mounted>> = next.iter().map(|_| None).collect();

        match self.walk_children(owner, parent, &mut old, &mut out, next) {
            Ok(()) => {
                *current = out.into_iter().flatten().collect();
                Ok(())
            }
            Err(err) => {
                let mut survivors = Vec::with_capacity(out.len() + old.len());
                for entry in out.into_iter().chain(old).flatten() {
                    match entry.node() {
                        Some(node) if self.tree.parent(node).is_none() => {
                            if let Err(cleanup) = self.discard_mounted(owner, entry) {
                                tracing::warn!(?node, "releasing detached child: {}", cleanup);
                            }
                        }
                        _ => survivors.push(entry),
                    }
                }
                survivors.sort_by_key(|entry| self.position(entry));
                tracing::debug!(?parent, kept = survivors.len(), "child patch failed: {}", err);
                *current = survivors;
                Err(err)
            }
        }
    }

    /// Index of an entry's node among its container's children
    fn position(&self, entry: &Mounted) -> usize {
        entry
            .node()
            .and_then(|node| {
                let container = self.tree.parent(node)?;
                self.tree.children(container).iter().position(|c| *c == node)
            })
            .unwrap_or(usize::MAX)
    }

    fn walk_children(
        &mut self,
        owner: NodeId,
        parent: NodeId,
        old: &mut [Option<Mounted>],
        out: &mut [Option<Mounted>],
        next: &[Descriptor],
    ) -> Result<()> {
        let mut keys: Option<FxHashMap<Key, usize>> = None;

        // End cursors are exclusive.
        let (mut old_head, mut old_end) = (0, old.len());
        let (mut new_head, mut new_end) = (0, next.len());

        while old_head < old_end && new_head < new_end {
            if old[old_head].is_none() {
                old_head += 1;
                continue;
            }
            if old[old_end - 1].is_none() {
                old_end -= 1;
                continue;
            }
            let first = &next[new_head];
            let last = &next[new_end - 1];

            if same(&old[old_head], first) {
                out[new_head] = Some(self.patch_taken(owner, &mut old[old_head], first)?);
                old_head += 1;
                new_head += 1;
            } else if same(&old[old_end - 1], last) {
                out[new_end - 1] = Some(self.patch_taken(owner, &mut old[old_end - 1], last)?);
                old_end -= 1;
                new_end -= 1;
            } else if same(&old[old_head], last) {
                let mounted = self.patch_taken(owner, &mut old[old_head], last)?;
                let anchor = first_node(&out[new_end..]);
                let node = mounted.node();
                out[new_end - 1] = Some(mounted);
                old_head += 1;
                new_end -= 1;
                if let Some(node) = node {
                    self.relocate(owner, parent, node, anchor)?;
                }
            } else if same(&old[old_end - 1], first) {
                let anchor = first_node(&old[old_head..old_end - 1])
                    .or_else(|| first_node(&out[new_end..]));
                let mounted = self.patch_taken(owner, &mut old[old_end - 1], first)?;
                let node = mounted.node();
                out[new_head] = Some(mounted);
                old_end -= 1;
                new_head += 1;
                if let Some(node) = node {
                    self.relocate(owner, parent, node, anchor)?;
                }
            } else {
                let keys = keys.get_or_insert_with(|| key_map(&old[old_head..old_end], old_head));
                let matched = first
                    .key()
                    .and_then(|key| keys.get(key).copied())
                    .filter(|index| same(&old[*index], first));

                let mounted = match matched {
                    Some(index) => {
                        let mounted = self.patch_taken(owner, &mut old[index], first)?;
                        tracing::trace!(?parent, from = index, to = new_head, "keyed move");
                        mounted
                    }
                    None => self.materialize(owner, first)?,
                };
                let anchor = first_node(&old[old_head..old_end])
                    .or_else(|| first_node(&out[new_end..]));
                let node = mounted.node();
                out[new_head] = Some(mounted);
                new_head += 1;
                if let Some(node) = node {
                    match matched {
                        Some(_) => self.relocate(owner, parent, node, anchor)?,
                        None => self.place(owner, parent, node, anchor)?,
                    }
                }
            }
        }

        if new_head < new_end {
            let anchor = first_node(&out[new_end..]);
            for index in new_head..new_end {
                let mounted = self.materialize(owner, &next[index])?;
                let node = mounted.node();
                out[index] = Some(mounted);
                if let Some(node) = node {
                    self.place(owner, parent, node, anchor)?;
                }
            }
        }
        for entry in old.iter_mut() {
            if let Some(leftover) = entry.take() {
                self.discard_mounted(owner, leftover)?;
            }
        }
        Ok(())
    }

    /// Take an old entry out of its slot and patch it against `descriptor`
    fn patch_taken(
        &mut self,
        owner: NodeId,
        entry: &mut Option<Mounted>,
        descriptor: &Descriptor,
    ) -> Result<Mounted> {
        let mut mounted = entry
            .take()
            .ok_or(RenderError::Internal("old child consumed twice"))?;
        match self.patch(owner, &mut mounted, descriptor) {
            Ok(()) => Ok(mounted),
            Err(err) => {
                *entry = Some(mounted);
                Err(err)
            }
        }
    }
}

fn same(entry: &Option<Mounted>, descriptor: &Descriptor) -> bool {
    entry
        .as_ref()
        .map_or(false, |mounted| mounted.same_node(descriptor))
}

/// First node in a run of entries, skipping empties and consumed entries
fn first_node(entries: &[Option<Mounted>]) -> Option<NodeId> {
    entries.iter().flatten().find_map(Mounted::node)
}

/// Index of every keyed entry, offset by the range start
fn key_map(entries: &[Option<Mounted>], offset: usize) -> FxHashMap<Key, usize> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let key = entry.as_ref()?.key()?;
            Some((key.clone(), offset + i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::component::{Component, RenderContext};
    use crate::config::RendererConfig;
    use crate::descriptor::{body, slot, text, view, Descriptor};
    use crate::error::RenderError;
    use crate::renderer::Renderer;
    use crate::tree::NodeId;
    use trellis_core::{Listener, ManualFrames, Mutation, RecordingBackend};

    #[derive(Default)]
    struct Scripted {
        tree: Option<Descriptor>,
    }

    impl Component for Scripted {
        fn render(&self, _cx: &RenderContext) -> Option<Descriptor> {
            self.tree.clone()
        }
    }

    struct Harness {
        renderer: Renderer,
        backend: RecordingBackend,
        id: NodeId,
    }

    impl Harness {
        fn mount(tree: impl Into<Descriptor>) -> Self {
            let backend = RecordingBackend::new();
            let mut renderer = Renderer::with_config(
                RendererConfig::testing(),
                backend.clone(),
                ManualFrames::new(),
            )
            .unwrap();
            let id = renderer
                .create_component(Scripted {
                    tree: Some(tree.into()),
                })
                .unwrap();
            let root = renderer.root();
            renderer.append(root, id, None).unwrap();
            backend.clear_log();
            Self {
                renderer,
                backend,
                id,
            }
        }

        fn rerender(&mut self, tree: impl Into<Descriptor>) -> Result<(), RenderError> {
            let tree = tree.into();
            self.renderer
                .update::<Scripted, _>(self.id, |c| c.tree = Some(tree))?;
            self.renderer.flush().map(|_| ())
        }

        fn children(&self) -> Vec<NodeId> {
            self.renderer.children(self.id).to_vec()
        }

        fn count(&self, predicate: impl Fn(&Mutation) -> bool) -> usize {
            self.backend.count_where(predicate)
        }
    }

    fn rows(keys: &[i64]) -> Descriptor {
        body()
            .children(keys.iter().map(|k| view("Row").key(*k).attr("id", *k)))
            .into()
    }

    fn is_move(m: &Mutation) -> bool {
        matches!(m, Mutation::Move { .. })
    }

    fn is_create(m: &Mutation) -> bool {
        matches!(m, Mutation::Create { .. })
    }

    #[test]
    fn test_identical_render_issues_no_mutations() {
        let on_tap = Listener::new(|_| {});
        let tree: Descriptor = body()
            .attr("title", "List")
            .child(view("Header").style("bold").child(text("Inbox")))
            .child(view("List").children([1, 2, 3].map(|k| view("Row").key(k))))
            .child(view("Button").on("tap", on_tap))
            .child(false)
            .into();
        let mut harness = Harness::mount(tree.clone());

        harness.rerender(tree).unwrap();
        assert!(harness.backend.mutations().is_empty());
    }

    #[test]
    fn test_rotation_uses_one_move() {
        let mut harness = Harness::mount(rows(&[1, 2, 3]));
        let before = harness.children();

        harness.rerender(rows(&[3, 1, 2])).unwrap();
        assert_eq!(harness.children(), vec![before[2], before[0], before[1]]);
        assert_eq!(harness.count(is_move), 1);
        assert_eq!(harness.count(is_create), 0);
    }

    #[test]
    fn test_reverse_keeps_nodes() {
        let mut harness = Harness::mount(rows(&[1, 2, 3, 4]));
        let before = harness.children();

        harness.rerender(rows(&[4, 3, 2, 1])).unwrap();
        let mut expected = before.clone();
        expected.reverse();
        assert_eq!(harness.children(), expected);
        assert_eq!(harness.count(is_create), 0);
        assert!(harness.count(is_move) <= 3);
    }

    #[test]
    fn test_keyed_insert_before_existing() {
        let mut harness = Harness::mount(rows(&[1]));
        let kept = harness.children()[0];

        harness.rerender(rows(&[2, 1])).unwrap();
        let after = harness.children();
        assert_eq!(after.len(), 2);
        assert_eq!(after[1], kept);
        assert_eq!(harness.count(is_create), 1);
        assert_eq!(harness.count(is_move), 0);
    }

    #[test]
    fn test_insert_between_moved_entries() {
        let mut harness = Harness::mount(rows(&[1, 2, 3, 4]));
        let before = harness.children();

        harness.rerender(rows(&[3, 5, 1, 2, 4])).unwrap();
        let after = harness.children();
        assert_eq!(after.len(), 5);
        assert_eq!(after[0], before[2]);
        assert_eq!(&after[2..], &[before[0], before[1], before[3]]);
        assert_eq!(harness.count(is_create), 1);
    }

    #[test]
    fn test_keyed_lookup_reuses_inner_entry() {
        let mut harness = Harness::mount(rows(&[1, 2, 3, 4]));
        let before = harness.children();

        // No end of the old list matches an end of the new one
        harness.rerender(rows(&[3, 1, 4, 2])).unwrap();
        assert_eq!(
            harness.children(),
            vec![before[2], before[0], before[3], before[1]]
        );
        assert_eq!(harness.count(is_create), 0);
        assert_eq!(harness.count(is_move), 2);
    }

    #[test]
    fn test_unknown_keys_are_created() {
        let mut harness = Harness::mount(rows(&[1, 2]));
        let before = harness.children();

        harness.rerender(rows(&[3, 4])).unwrap();
        let after = harness.children();
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|node| !before.contains(node)));
        assert_eq!(harness.count(is_create), 2);
        assert_eq!(
            harness.count(|m| matches!(m, Mutation::Release { .. })),
            2
        );
    }

    #[test]
    fn test_removed_children_are_released() {
        let mut harness = Harness::mount(rows(&[1, 2, 3]));
        let before = harness.children();
        let gone = harness.renderer.native_handle(before[1]).unwrap();

        harness.rerender(rows(&[1, 3])).unwrap();
        assert_eq!(harness.children(), vec![before[0], before[2]]);
        assert!(harness.backend.is_released(gone));
        assert!(harness.renderer.node(before[1]).is_err());
    }

    #[test]
    fn test_type_change_replaces_node() {
        let mut harness = Harness::mount(body().child(view("Label")));
        let before = harness.children();

        harness.rerender(body().child(view("Image"))).unwrap();
        let after = harness.children();
        assert_eq!(after.len(), 1);
        assert_ne!(after[0], before[0]);
        assert_eq!(harness.renderer.node(after[0]).unwrap().type_name(), "Image");
    }

    #[test]
    fn test_text_updates_in_place() {
        let mut harness = Harness::mount(body().child(text("one")));
        let node = harness.children()[0];

        harness.rerender(body().child(text("two"))).unwrap();
        assert_eq!(harness.children(), vec![node]);
        let handle = harness.renderer.native_handle(node).unwrap();
        assert_eq!(harness.backend.attribute(handle, "content"), Some("two".into()));
        assert_eq!(harness.count(is_create), 0);
    }

    #[test]
    fn test_empty_entries_hold_position() {
        let mut harness = Harness::mount(body().child(view("A")).child(false).child(view("C")));
        let before = harness.children();

        harness
            .rerender(body().child(view("A")).child(view("B")).child(view("C")))
            .unwrap();
        let after = harness.children();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[1]);
        assert_eq!(harness.renderer.node(after[1]).unwrap().type_name(), "B");
    }

    #[test]
    fn test_slot_redeclaration_updates_registry() {
        let mut harness = Harness::mount(body().child(slot().name("footer")));
        let footer = harness.renderer.slot(harness.id, "footer").unwrap().unwrap();

        harness
            .rerender(body().child(slot().name("actions").main()))
            .unwrap();
        let renderer = &harness.renderer;
        assert_eq!(renderer.slot(harness.id, "footer").unwrap(), None);
        assert_eq!(renderer.slot(harness.id, "actions").unwrap(), Some(footer));
        assert_eq!(renderer.main_slot(harness.id).unwrap(), Some(footer));
    }

    #[test]
    fn test_non_body_rerender_fails() {
        let mut harness = Harness::mount(body());
        assert_eq!(
            harness.rerender(view("View")),
            Err(RenderError::InvalidRoot {
                found: "View".into()
            })
        );
    }
}
