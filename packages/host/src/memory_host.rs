//! # Memory host
//!
//! Applies committed output trees to an in-memory element tree.
//!
//! `apply` walks the patch breadth-first. Fragments are flattened before a
//! node is processed, and every resolved node lands at the same child
//! position of its host parent:
//!
//! - no element at that position: create one
//! - element present, node clean: keep it
//! - element present, node dirty: replace it if the tag changed, otherwise
//!   patch attributes and text in place
//!
//! Handlers are detached before the decision and reattached after it, so an
//! element never keeps a handler from an older tree.

use arbor_reconciler::{Handler, HostSync, OutputNode, ReconcileError};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument, trace};

pub type HostResult<T> = Result<T, HostError>;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("No host element at {path:?}")]
    MissingElement { path: Vec<usize> },

    #[error("Host element at {path:?} has no click handler")]
    NoHandler { path: Vec<usize> },

    #[error("Handler failed: {0}")]
    Handler(#[from] ReconcileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ElementId(pub u64);

/// One displayed element
#[derive(Clone, Serialize)]
pub struct HostElement {
    pub id: ElementId,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub children: Vec<HostElement>,
    #[serde(skip)]
    handler: Option<Handler>,
}

impl HostElement {
    fn from_patch(id: ElementId, patch: &OutputNode) -> Self {
        Self {
            id,
            tag: patch.tag.clone(),
            attributes: sorted(patch),
            text: patch.text.clone(),
            children: Vec::new(),
            handler: patch.handler.clone(),
        }
    }

    fn container() -> Self {
        Self {
            id: ElementId(0),
            tag: "#container".to_string(),
            attributes: BTreeMap::new(),
            text: None,
            children: Vec::new(),
            handler: None,
        }
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Child at `path`, relative to this element
    pub fn descendant(&self, path: &[usize]) -> Option<&HostElement> {
        path.iter()
            .try_fold(self, |element, &index| element.children.get(index))
    }

    fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut HostElement> {
        path.iter()
            .try_fold(self, |element, &index| element.children.get_mut(index))
    }
}

impl fmt::Debug for HostElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostElement")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("attributes", &self.attributes)
            .field("text", &self.text)
            .field("children", &self.children)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

fn sorted(patch: &OutputNode) -> BTreeMap<String, String> {
    patch
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Running totals of host operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStats {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub kept: usize,
    pub removed: usize,
    pub handlers_detached: usize,
    pub handlers_attached: usize,
    pub applies: usize,
}

#[derive(Debug)]
pub struct MemoryHost {
    container: HostElement,
    next_id: u64,
    stats: HostStats,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            container: HostElement::container(),
            next_id: 1,
            stats: HostStats::default(),
        }
    }

    /// Element the root output resolved to
    pub fn root(&self) -> Option<&HostElement> {
        self.container.children.first()
    }

    /// Element at `path` below the root; the empty path is the root itself
    pub fn element(&self, path: &[usize]) -> Option<&HostElement> {
        self.root().and_then(|root| root.descendant(path))
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = HostStats::default();
    }

    /// Fire the click handler of the element at `path`
    pub fn click(&self, path: &[usize]) -> HostResult<()> {
        let element = self.element(path).ok_or_else(|| HostError::MissingElement {
            path: path.to_vec(),
        })?;
        let handler = element.handler.clone().ok_or_else(|| HostError::NoHandler {
            path: path.to_vec(),
        })?;

        debug!(path = ?path, tag = %element.tag, "Click");
        handler()?;
        Ok(())
    }

    pub fn to_html(&self) -> String {
        self.root()
            .map(|root| crate::html::to_html(root, &crate::html::HtmlOptions::default()))
            .unwrap_or_default()
    }

    /// Bring the element at `index` below `parent_path` in line with `patch`.
    /// Returns the element's path.
    fn sync(&mut self, patch: &OutputNode, parent_path: &[usize], index: usize) -> HostResult<Vec<usize>> {
        let Self {
            container,
            next_id,
            stats,
        } = self;
        let mut allocate = || {
            let id = ElementId(*next_id);
            *next_id += 1;
            id
        };

        let parent = container
            .descendant_mut(parent_path)
            .ok_or_else(|| HostError::MissingElement {
                path: parent_path.to_vec(),
            })?;
        let mut path = parent_path.to_vec();

        if index >= parent.children.len() {
            // Positions past the end fall back to an append
            trace!(key = %patch.key, tag = %patch.tag, "Create");
            let element = HostElement::from_patch(allocate(), patch);
            if element.handler.is_some() {
                stats.handlers_attached += 1;
            }
            parent.children.push(element);
            stats.created += 1;
            path.push(parent.children.len() - 1);
            return Ok(path);
        }

        let element = &mut parent.children[index];

        if element.handler.take().is_some() {
            stats.handlers_detached += 1;
        }

        if !patch.dirty {
            stats.kept += 1;
        } else if element.tag != patch.tag {
            trace!(key = %patch.key, from = %element.tag, to = %patch.tag, "Replace");
            *element = HostElement::from_patch(allocate(), patch);
            stats.replaced += 1;
        } else {
            trace!(key = %patch.key, "Update");
            element.attributes = sorted(patch);
            element.text = patch.text.clone();
            stats.updated += 1;
        }

        element.handler = patch.handler.clone();
        if element.handler.is_some() {
            stats.handlers_attached += 1;
        }

        path.push(index);
        Ok(path)
    }

    /// Drop host children beyond what the patch declares
    fn trim(&mut self, path: &[usize], keep: usize) {
        if let Some(element) = self.container.descendant_mut(path) {
            if element.children.len() > keep {
                let removed = element.children.len() - keep;
                element.children.truncate(keep);
                self.stats.removed += removed;
                trace!(path = ?path, removed, "Trimmed surplus children");
            }
        }
    }
}

impl HostSync for MemoryHost {
    type Error = HostError;

    #[instrument(skip_all, fields(root = %patch.key))]
    fn apply(&mut self, patch: &OutputNode) -> HostResult<()> {
        self.stats.applies += 1;

        let mut queue: VecDeque<(&OutputNode, Vec<usize>, usize)> = VecDeque::new();
        queue.push_back((patch, Vec::new(), 0));

        while let Some((node, parent_path, index)) = queue.pop_front() {
            let Some(node) = node.flatten() else {
                continue;
            };

            let path = self.sync(node, &parent_path, index)?;
            self.trim(&path, node.children.len());

            for (i, child) in node.children.iter().enumerate() {
                queue.push_back((child, path.clone(), i));
            }
        }

        self.trim(&[], 1);
        debug!(stats = ?self.stats, "Applied patch");
        Ok(())
    }
}
