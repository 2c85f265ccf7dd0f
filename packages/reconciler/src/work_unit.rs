//! # Work unit tree
//!
//! One [`WorkUnit`] per component instance, stored in a slot-map arena owned
//! by a [`WorkTree`]. The child list is the only ownership path; the parent
//! link is a plain [`UnitId`] back-reference.
//!
//! ## Keys
//!
//! Keys are derived from output positions: the root is `"__root__"` and the
//! node at index `i` below a node keyed `k` is `"k/i"`. A component
//! placeholder and the unit rendered into it share a key, which is how a
//! unit's output finds its splice point in the tree-wide output.
//!
//! ## Render pass
//!
//! The scheduler visits units in pre-order ([`WorkTree::next`]). Each visit
//! renders the unit if needed and then splices the unit's output into the
//! tree-wide output, replacing the placeholder its parent left behind.
//! Pending props and state are promoted to committed only by
//! [`WorkTree::commit_pending`].

use crate::element::{Children, Component, Element, Props};
use crate::error::{ReconcileError, ReconcileResult};
use crate::hooks::{RenderContext, StatePatch, UpdateRequest};
use crate::output::OutputNode;
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

new_key_type! {
    /// Arena handle of a work unit
    pub struct UnitId;
}

pub const ROOT_KEY: &str = "__root__";

/// Key of the output node at `index` below `parent`
pub fn child_key(parent: &str, index: usize) -> String {
    format!("{}/{}", parent, index)
}

/// Persistent node for one component instance
#[derive(Debug, Clone)]
pub struct WorkUnit {
    key: String,
    parent: Option<UnitId>,
    children: Vec<UnitId>,
    component: Component,
    props: Props,
    states: Vec<Value>,
    pending_props: Props,
    pending_states: Vec<Value>,
    /// Last rendered output; nested components appear as placeholder fragments
    output: OutputNode,
    rendered: bool,
    is_root: bool,
}

impl WorkUnit {
    fn new(key: String, parent: Option<UnitId>, component: Component, props: Props) -> Self {
        Self {
            output: OutputNode::fragment(key.clone()),
            key,
            is_root: parent.is_none(),
            parent,
            children: Vec::new(),
            component,
            props: props.clone(),
            states: Vec::new(),
            pending_props: props,
            pending_states: Vec::new(),
            rendered: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent(&self) -> Option<UnitId> {
        self.parent
    }

    pub fn children(&self) -> &[UnitId] {
        &self.children
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn states(&self) -> &[Value] {
        &self.states
    }

    pub fn pending_props(&self) -> &Props {
        &self.pending_props
    }

    pub fn pending_states(&self) -> &[Value] {
        &self.pending_states
    }

    pub fn output(&self) -> &OutputNode {
        &self.output
    }

    pub fn has_rendered(&self) -> bool {
        self.rendered
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Render when never rendered, when pending input differs from
    /// committed input, or when a transition is pending.
    pub fn needs_render(&self, transition_pending: bool) -> bool {
        !self.rendered
            || self.pending_props != self.props
            || self.pending_states != self.states
            || transition_pending
    }
}

/// Arena of work units plus the output the tree last produced
pub struct WorkTree {
    units: SlotMap<UnitId, WorkUnit>,
    root: UnitId,
    output: OutputNode,
    active_key: Option<String>,
    updates: UnboundedSender<UpdateRequest>,
}

impl WorkTree {
    /// Build a tree holding a single, unrendered root unit
    pub fn create_root(component: Component, updates: UnboundedSender<UpdateRequest>) -> Self {
        let mut units = SlotMap::with_key();
        let root = units.insert(WorkUnit::new(
            ROOT_KEY.to_string(),
            None,
            component,
            Props::new(),
        ));

        Self {
            units,
            root,
            output: OutputNode::fragment(ROOT_KEY),
            active_key: None,
            updates,
        }
    }

    pub fn root(&self) -> UnitId {
        self.root
    }

    pub fn unit(&self, id: UnitId) -> Option<&WorkUnit> {
        self.units.get(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Output of the whole tree
    pub fn output(&self) -> &OutputNode {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputNode {
        &mut self.output
    }

    /// Key of the unit whose state change started this pass
    pub fn active_key(&self) -> Option<&str> {
        self.active_key.as_deref()
    }

    pub fn set_active(&mut self, key: impl Into<String>) {
        self.active_key = Some(key.into());
    }

    /// Render a unit if needed, then splice its output into the tree output.
    ///
    /// Returns whether the component was invoked.
    pub fn render(&mut self, id: UnitId, transition_pending: bool) -> ReconcileResult<bool> {
        let unit = self.get(id)?;
        let invoked = unit.needs_render(transition_pending);

        if invoked {
            let component = unit.component.clone();
            let props = unit.pending_props.clone();
            let key = unit.key.clone();
            let previous = unit.children.clone();

            let element = {
                let unit = &mut self.units[id];
                let mut cx = RenderContext::new(
                    &unit.key,
                    &mut unit.pending_states,
                    transition_pending,
                    &self.updates,
                );
                component.call(&mut cx, &props)
            };
            let element = element.map_err(|e| {
                warn!(key = %key, component = component.name(), error = %e, "Render failed");
                e
            })?;

            let mut adopted = Vec::new();
            let output = self.build_output(id, &key, key.clone(), element, &previous, &mut adopted);

            for &stale in &previous {
                if !adopted.contains(&stale) {
                    self.remove_subtree(stale);
                }
            }

            let unit = &mut self.units[id];
            unit.children = adopted;
            unit.output = output;
            debug!(key = %key, component = component.name(), transition_pending, "Rendered unit");
        }

        if let Some(unit) = self.units.get_mut(id) {
            unit.rendered = true;
        }
        self.splice(id)?;

        Ok(invoked)
    }

    /// Put a unit's last output into the tree output at its key
    pub fn splice(&mut self, id: UnitId) -> ReconcileResult<()> {
        let unit = self.units.get(id).ok_or_else(|| unknown(id))?;

        if unit.is_root {
            self.output = unit.output.clone();
            return Ok(());
        }

        if self.output.replace_descendant(unit.output.clone()) {
            trace!(key = %unit.key, "Spliced output");
            Ok(())
        } else {
            Err(ReconcileError::SpliceTargetMissing {
                key: unit.key.clone(),
            })
        }
    }

    /// Next unit in depth-first pre-order, or `None` once the root's
    /// subtree is exhausted.
    pub fn next(&self, id: UnitId) -> Option<UnitId> {
        let unit = self.units.get(id)?;
        if let Some(&first) = unit.children.first() {
            return Some(first);
        }

        let mut current = id;
        loop {
            let unit = self.units.get(current)?;
            if unit.is_root {
                return None;
            }

            let parent = unit.parent?;
            let siblings = &self.units.get(parent)?.children;
            let position = siblings.iter().position(|&child| child == current)?;
            if let Some(&sibling) = siblings.get(position + 1) {
                return Some(sibling);
            }

            current = parent;
        }
    }

    /// All units in traversal order
    pub fn preorder(&self) -> Vec<UnitId> {
        let mut order = Vec::with_capacity(self.units.len());
        let mut cursor = Some(self.root);
        while let Some(id) = cursor {
            order.push(id);
            cursor = self.next(id);
        }
        order
    }

    /// Deep copy used as a work-in-progress tree.
    ///
    /// Every unit's output is copied clean and spliced back into a fresh tree
    /// output in traversal order; a missing splice point is an error.
    pub fn copy(&self) -> ReconcileResult<WorkTree> {
        let mut units = self.units.clone();
        let ids: Vec<UnitId> = units.keys().collect();

        for id in ids {
            let placeholders: Vec<OutputNode> = units[id]
                .children
                .iter()
                .filter_map(|&child| units.get(child))
                .map(|child| OutputNode::fragment(child.key.clone()))
                .collect();

            let unit = &mut units[id];
            let mut output = unit.output.clone_clean();
            if output.is_fragment() {
                output.children = placeholders;
            }
            unit.output = output;
        }

        let mut copy = WorkTree {
            units,
            root: self.root,
            output: OutputNode::fragment(ROOT_KEY),
            active_key: None,
            updates: self.updates.clone(),
        };

        for id in copy.preorder() {
            copy.splice(id)?;
        }

        Ok(copy)
    }

    /// Depth-first search below the root
    pub fn find_descendant(&self, key: &str) -> Option<UnitId> {
        let root = self.units.get(self.root)?;
        let mut stack: Vec<UnitId> = root.children.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            if unit.key == key {
                return Some(id);
            }
            stack.extend(unit.children.iter().rev().copied());
        }

        None
    }

    /// Find any unit, root included, by key
    pub fn find_unit(&self, key: &str) -> Option<UnitId> {
        match self.units.get(self.root) {
            Some(root) if root.key == key => Some(self.root),
            _ => self.find_descendant(key),
        }
    }

    /// Write a state slot of a unit's pending state
    pub fn apply_patch(&mut self, id: UnitId, patch: &StatePatch) -> ReconcileResult<()> {
        let unit = self.units.get_mut(id).ok_or_else(|| unknown(id))?;

        match unit.pending_states.get_mut(patch.slot) {
            Some(slot) => {
                *slot = patch.value.clone();
                Ok(())
            }
            None => Err(ReconcileError::StateSlot {
                key: unit.key.clone(),
                slot: patch.slot,
            }),
        }
    }

    /// Force the unit to render on its next visit even if its input is
    /// unchanged. Returns false when no unit has `key`.
    pub fn invalidate(&mut self, key: &str) -> bool {
        let Some(id) = self.find_unit(key) else {
            return false;
        };
        match self.units.get_mut(id) {
            Some(unit) => {
                unit.rendered = false;
                true
            }
            None => false,
        }
    }

    /// Promote pending props and state to committed for every unit
    pub fn commit_pending(&mut self) {
        for unit in self.units.values_mut() {
            unit.props = unit.pending_props.clone();
            unit.states = unit.pending_states.clone();
        }
    }

    fn get(&self, id: UnitId) -> ReconcileResult<&WorkUnit> {
        self.units.get(id).ok_or_else(|| unknown(id))
    }

    fn build_output(
        &mut self,
        owner: UnitId,
        owner_key: &str,
        key: String,
        element: Element,
        previous: &[UnitId],
        adopted: &mut Vec<UnitId>,
    ) -> OutputNode {
        match element {
            Element::Intrinsic {
                tag,
                attributes,
                children,
                on_click,
            } => {
                let mut node = OutputNode::element(key, tag);
                node.attributes = attributes;
                node.handler = on_click;

                match children {
                    Children::Empty => {}
                    Children::Text(text) => node.text = Some(text),
                    Children::Nodes(elements) => {
                        for (i, child) in elements.into_iter().enumerate() {
                            let key = child_key(&node.key, i);
                            let child = self.build_output(owner, owner_key, key, child, previous, adopted);
                            node.children.push(child);
                        }
                    }
                }

                node
            }
            Element::Component { component, props } => {
                if key == owner_key {
                    // A unit's output root always carries the unit's key
                    let nested = child_key(&key, 0);
                    let placeholder = self.adopt(owner, nested, component, props, previous, adopted);
                    OutputNode::fragment(key).with_child(placeholder)
                } else {
                    self.adopt(owner, key, component, props, previous, adopted)
                }
            }
        }
    }

    /// Match a child by key and component type, or create it
    fn adopt(
        &mut self,
        owner: UnitId,
        key: String,
        component: Component,
        props: Props,
        previous: &[UnitId],
        adopted: &mut Vec<UnitId>,
    ) -> OutputNode {
        let existing = previous.iter().copied().find(|&id| {
            self.units
                .get(id)
                .is_some_and(|unit| unit.key == key && unit.component.same_type(&component))
        });

        let id = match existing {
            Some(id) => {
                if let Some(unit) = self.units.get_mut(id) {
                    unit.pending_props = props;
                }
                id
            }
            None => {
                trace!(key = %key, component = component.name(), "Creating unit");
                self.units
                    .insert(WorkUnit::new(key.clone(), Some(owner), component, props))
            }
        };

        adopted.push(id);
        OutputNode::fragment(key)
    }

    fn remove_subtree(&mut self, id: UnitId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(unit) = self.units.remove(id) {
                trace!(key = %unit.key, "Removed unit");
                stack.extend(unit.children);
            }
        }
    }
}

impl fmt::Debug for WorkTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self
            .preorder()
            .into_iter()
            .filter_map(|id| self.units.get(id).map(|unit| unit.key.as_str()))
            .collect();

        f.debug_struct("WorkTree")
            .field("units", &keys)
            .field("active_key", &self.active_key)
            .field("output", &self.output)
            .finish()
    }
}

fn unknown(id: UnitId) -> ReconcileError {
    ReconcileError::UnknownUnit {
        key: format!("{:?}", id),
    }
}
