//! Utilities to traverse the vp-tree structure.

use std::marker::PhantomData;

use crate::r#type::IndexableFloat;
use crate::vptree::constants::LEAF_MARKER;
use crate::vptree::VpTreeIndex;

/// An internal node of the vp-tree.
///
/// Obtained from [`VpTreeIndex::root`] and walked via
/// [`left_child`][Node::left_child] / [`right_child`][Node::right_child].
#[derive(Debug, Clone)]
pub struct Node<'a, N: IndexableFloat, T: VpTreeIndex<N>> {
    /// The tree that this node is a reference onto
    tree: &'a T,

    index: usize,

    phantom: PhantomData<N>,
}

impl<'a, N: IndexableFloat, T: VpTreeIndex<N>> Node<'a, N, T> {
    pub(crate) fn from_root(tree: &'a T) -> Option<Self> {
        (tree.num_items() > 0).then(|| Self {
            tree,
            index: 0,
            phantom: PhantomData,
        })
    }

    fn from_child(tree: &'a T, child: i32) -> Option<Self> {
        (child != LEAF_MARKER).then(|| Self {
            tree,
            index: child as usize,
            phantom: PhantomData,
        })
    }

    /// This node's position in the node array.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The item index of this node's vantage point, in the caller's
    /// original ordering.
    pub fn item(&self) -> u32 {
        self.tree.node_items()[self.index]
    }

    /// The coordinates of this node's vantage point.
    pub fn point(&self) -> &'a [N] {
        self.tree.store().point(self.item() as usize)
    }

    /// The partition radius around the vantage point. Zero (and
    /// meaningless) for leaves.
    pub fn threshold(&self) -> N {
        self.tree.thresholds()[self.index]
    }

    /// Returns `true` if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.tree.left_children()[self.index] == LEAF_MARKER
            && self.tree.right_children()[self.index] == LEAF_MARKER
    }

    /// The child whose points are strictly closer to the vantage point
    /// than the threshold.
    pub fn left_child(&self) -> Option<Node<'a, N, T>> {
        Self::from_child(self.tree, self.tree.left_children()[self.index])
    }

    /// The child whose points are at or beyond the threshold.
    pub fn right_child(&self) -> Option<Node<'a, N, T>> {
        Self::from_child(self.tree, self.tree.right_children()[self.index])
    }
}
