use crate::output::OutputNode;

/// Mark the nodes of `after` whose host representation differs from `before`.
///
/// Children are compared positionally. A node's flag depends only on the node
/// itself: a dirty child never dirties its parent, and a dirty parent does
/// not dirty its children. With no `before` every node is dirty (first mount).
pub fn compare(before: Option<&OutputNode>, after: &mut OutputNode) {
    after.dirty = match before {
        None => true,
        Some(before) => {
            before.tag != after.tag
                || before.attributes != after.attributes
                || before.text != after.text
        }
    };

    for (i, child) in after.children.iter_mut().enumerate() {
        let before_child = before.and_then(|b| b.children.get(i));
        compare(before_child, child);
    }
}

/// Nodes of `before` with no positional counterpart in `after`.
///
/// These never show up as dirty: the host drops them by trimming surplus
/// children. Fragments count like any other node.
pub fn count_removed(before: Option<&OutputNode>, after: &OutputNode) -> usize {
    let Some(before) = before else {
        return 0;
    };

    let surplus: usize = before
        .children
        .iter()
        .skip(after.children.len())
        .map(|child| child.iter().count())
        .sum();

    surplus
        + after
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| count_removed(before.children.get(i), child))
            .sum::<usize>()
}

/// Result of diffing a finished tree against the committed one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Nodes marked dirty in the finished tree
    pub dirty: usize,
    /// Committed nodes the finished tree no longer has
    pub removed: usize,
}

/// Mark the finished tree dirty against the committed one and summarise
pub fn diff_trees(before: Option<&OutputNode>, after: &mut OutputNode) -> DiffSummary {
    compare(before, after);
    DiffSummary {
        dirty: after.count_dirty(),
        removed: count_removed(before, after),
    }
}
