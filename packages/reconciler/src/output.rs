//! # Output tree
//!
//! Snapshot of what the host should display. A work unit produces a fresh
//! subtree every time it renders; the subtrees are spliced into one tree per
//! render pass by key, and the diff marks the nodes whose host representation
//! must be (re)applied.
//!
//! Fragments are structural only: a fragment is never rendered, its first
//! non-fragment descendant stands in for it (see [`OutputNode::flatten`]).

use crate::error::ReconcileResult;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Tag reserved for fragment nodes
pub const FRAGMENT_TAG: &str = "__fragment__";

/// Interaction handler attached to an output node
pub type Handler = Rc<dyn Fn() -> ReconcileResult<()>>;

/// Output tree node
#[derive(Clone, Serialize)]
pub struct OutputNode {
    pub key: String,
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<OutputNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Set by the diff: this node's host representation must be reapplied
    pub dirty: bool,
    #[serde(skip)]
    pub handler: Option<Handler>,
}

impl OutputNode {
    pub fn element(key: impl Into<String>, tag: impl Into<String>) -> Self {
        OutputNode {
            key: key.into(),
            tag: tag.into(),
            attributes: HashMap::new(),
            children: Vec::new(),
            text: None,
            dirty: false,
            handler: None,
        }
    }

    pub fn fragment(key: impl Into<String>) -> Self {
        Self::element(key, FRAGMENT_TAG)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: OutputNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn is_fragment(&self) -> bool {
        self.tag == FRAGMENT_TAG
    }

    /// Resolve a fragment to its first non-fragment descendant.
    ///
    /// Non-fragments resolve to themselves. Returns `None` while a fragment
    /// has nothing renderable below it yet.
    pub fn flatten(&self) -> Option<&OutputNode> {
        if !self.is_fragment() {
            return Some(self);
        }
        self.children.iter().find_map(OutputNode::flatten)
    }

    /// Replace the descendant whose key matches `node.key`.
    ///
    /// The search is iterative so deep trees cannot exhaust the stack.
    /// Returns `false` when no descendant carries the key.
    pub fn replace_descendant(&mut self, node: OutputNode) -> bool {
        let Some(path) = self.find_path(&node.key) else {
            return false;
        };

        match self.node_at_path_mut(&path) {
            Some(slot) => {
                *slot = node;
                true
            }
            None => false,
        }
    }

    /// Deep copy with `dirty` cleared. Fragments copy without children; the
    /// unit owning the fragment splices them back on its next render.
    pub fn clone_clean(&self) -> OutputNode {
        let children = if self.is_fragment() {
            Vec::new()
        } else {
            self.children.iter().map(OutputNode::clone_clean).collect()
        };

        OutputNode {
            key: self.key.clone(),
            tag: self.tag.clone(),
            attributes: self.attributes.clone(),
            children,
            text: self.text.clone(),
            dirty: false,
            handler: self.handler.clone(),
        }
    }

    pub fn clear_dirty(&mut self) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            node.dirty = false;
            stack.extend(node.children.iter_mut());
        }
    }

    pub fn count_dirty(&self) -> usize {
        self.iter().filter(|node| node.dirty).count()
    }

    /// Keys of dirty nodes in pre-order
    pub fn dirty_keys(&self) -> Vec<&str> {
        self.iter()
            .filter(|node| node.dirty)
            .map(|node| node.key.as_str())
            .collect()
    }

    /// Find a node (self included) by key
    pub fn find(&self, key: &str) -> Option<&OutputNode> {
        self.iter().find(|node| node.key == key)
    }

    /// Pre-order iterator over this node and all descendants
    pub fn iter(&self) -> OutputIter<'_> {
        OutputIter { stack: vec![self] }
    }

    fn find_path(&self, key: &str) -> Option<Vec<usize>> {
        let mut stack: Vec<(Vec<usize>, &OutputNode)> = self
            .children
            .iter()
            .enumerate()
            .rev()
            .map(|(i, child)| (vec![i], child))
            .collect();

        while let Some((path, node)) = stack.pop() {
            if node.key == key {
                return Some(path);
            }
            for (i, child) in node.children.iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(i);
                stack.push((child_path, child));
            }
        }

        None
    }

    fn node_at_path_mut(&mut self, path: &[usize]) -> Option<&mut OutputNode> {
        let mut node = self;
        for &index in path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }
}

impl fmt::Debug for OutputNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputNode")
            .field("key", &self.key)
            .field("tag", &self.tag)
            .field("attributes", &self.attributes)
            .field("text", &self.text)
            .field("dirty", &self.dirty)
            .field("handler", &self.handler.is_some())
            .field("children", &self.children)
            .finish()
    }
}

pub struct OutputIter<'a> {
    stack: Vec<&'a OutputNode>,
}

impl<'a> Iterator for OutputIter<'a> {
    type Item = &'a OutputNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
