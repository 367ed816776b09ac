use tinyvec::TinyVec;

use crate::error::Result;
use crate::points::PointStore;
use crate::r#type::IndexableFloat;
use crate::vptree::constants::LEAF_MARKER;
use crate::vptree::distance::DistanceMetric;
use crate::vptree::index::{VpTree, VpTreeMetadata, VpTreeRef};
use crate::vptree::queue::NeighborQueue;
use crate::vptree::traversal::Node;
use crate::MetricIndexError;

/// The results of a single query: item indices and their distances to the
/// query, as parallel sequences in a consistent order.
///
/// `items[i]` is an index into the caller's original point ordering and
/// `distances[i]` is its distance to the query point.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults<N: IndexableFloat> {
    /// Indices of the matching points, in the caller's original ordering.
    pub items: Vec<u32>,
    /// Distance from the query to each matching point, parallel to
    /// `items`.
    pub distances: Vec<N>,
}

impl<N: IndexableFloat> Default for SearchResults<N> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            distances: Vec::new(),
        }
    }
}

impl<N: IndexableFloat> SearchResults<N> {
    /// The number of matches.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the query matched nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over `(item, distance)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, N)> + '_ {
        self.items
            .iter()
            .copied()
            .zip(self.distances.iter().copied())
    }

    fn push(&mut self, item: u32, distance: N) {
        self.items.push(item);
        self.distances.push(distance);
    }

    /// Stable joint sort by ascending distance.
    fn sort_by_distance(&mut self) {
        let mut order: Vec<(N, u32)> = self
            .distances
            .iter()
            .copied()
            .zip(self.items.iter().copied())
            .collect();
        order.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .expect("non-finite distance in results")
        });
        for (slot, (distance, item)) in order.into_iter().enumerate() {
            self.distances[slot] = distance;
            self.items[slot] = item;
        }
    }
}

/// A trait for searching and accessing data out of a vp-tree.
///
/// Implemented by both [`VpTree`] and [`VpTreeRef`]; the search algorithms
/// are default methods over the accessor slices. Queries never mutate the
/// tree, so a tree shared across threads can serve them concurrently.
pub trait VpTreeIndex<N: IndexableFloat>: Sized {
    /// The distance metric type this tree was built with.
    type Metric: DistanceMetric<N>;

    /// Per-node partition radii around each vantage point.
    fn thresholds(&self) -> &[N];

    /// Per-node vantage point item indices.
    fn node_items(&self) -> &[u32];

    /// Per-node left child node indices; `-1` means no child. A left
    /// subtree holds points strictly closer to the vantage point than the
    /// node's threshold.
    fn left_children(&self) -> &[i32];

    /// Per-node right child node indices; `-1` means no child. A right
    /// subtree holds points at or beyond the node's threshold.
    fn right_children(&self) -> &[i32];

    /// The point store this tree was built over.
    fn store(&self) -> PointStore<'_, N>;

    /// The distance metric instance.
    fn metric(&self) -> &Self::Metric;

    /// Access the metadata describing this tree's buffer.
    fn metadata(&self) -> &VpTreeMetadata<N>;

    /// The number of indexed points.
    fn num_items(&self) -> usize {
        self.metadata().num_items()
    }

    /// The number of coordinates per point.
    fn num_dims(&self) -> usize {
        self.metadata().num_dims()
    }

    /// Access the root node for manual traversal; `None` for an empty
    /// tree.
    fn root(&self) -> Option<Node<'_, N, Self>> {
        Node::from_root(self)
    }

    /// Search the index for all items within `radius` of a query point.
    ///
    /// Results come back in encounter order unless `sorted` is set, which
    /// sorts them by ascending distance (stable for ties). There is no cap
    /// on the result count; a large enough radius returns every point.
    fn within(&self, query: &[N], radius: N, sorted: bool) -> Result<SearchResults<N>> {
        check_query(self, query)?;
        check_radius(radius)?;
        Ok(search_within(self, query, radius, None, sorted))
    }

    /// Search the index for all items within `radius` of the indexed point
    /// `item`, optionally excluding `item` itself from the results.
    fn within_item(
        &self,
        item: usize,
        radius: N,
        exclude_self: bool,
        sorted: bool,
    ) -> Result<SearchResults<N>> {
        check_item(self, item)?;
        check_radius(radius)?;
        let exclude = if exclude_self { Some(item as u32) } else { None };
        Ok(search_within(
            self,
            self.store().point(item),
            radius,
            exclude,
            sorted,
        ))
    }

    /// Search the index for the `k` items nearest to a query point.
    ///
    /// Results are ordered by ascending distance; the order of equidistant
    /// items is unspecified. If the tree holds fewer than `k` points, all
    /// of them are returned.
    fn neighbors(&self, query: &[N], k: usize) -> Result<SearchResults<N>> {
        check_query(self, query)?;
        check_k(k)?;
        Ok(search_nearest(self, query, k, None))
    }

    /// Search the index for the `k` items nearest to the indexed point
    /// `item`, optionally excluding `item` itself from the results.
    fn neighbors_item(
        &self,
        item: usize,
        k: usize,
        exclude_self: bool,
    ) -> Result<SearchResults<N>> {
        check_item(self, item)?;
        check_k(k)?;
        let exclude = if exclude_self { Some(item as u32) } else { None };
        Ok(search_nearest(self, self.store().point(item), k, exclude))
    }
}

fn check_query<N: IndexableFloat, T: VpTreeIndex<N>>(tree: &T, query: &[N]) -> Result<()> {
    if query.len() != tree.num_dims() {
        return Err(MetricIndexError::InvalidInput(format!(
            "Query has {} dimensions but the tree has {}.",
            query.len(),
            tree.num_dims()
        )));
    }
    if query.iter().any(|c| !c.is_finite()) {
        return Err(MetricIndexError::InvalidInput(
            "Query contains non-finite values.".to_string(),
        ));
    }
    Ok(())
}

fn check_item<N: IndexableFloat, T: VpTreeIndex<N>>(tree: &T, item: usize) -> Result<()> {
    if item >= tree.num_items() {
        return Err(MetricIndexError::InvalidInput(format!(
            "Item {} out of range for {} points.",
            item,
            tree.num_items()
        )));
    }
    Ok(())
}

fn check_radius<N: IndexableFloat>(radius: N) -> Result<()> {
    if radius.is_nan() || radius < N::zero() {
        return Err(MetricIndexError::InvalidInput(
            "Radius must be non-negative.".to_string(),
        ));
    }
    Ok(())
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(MetricIndexError::InvalidInput(
            "Neighbor count must be at least 1.".to_string(),
        ));
    }
    Ok(())
}

fn search_within<N: IndexableFloat, T: VpTreeIndex<N>>(
    tree: &T,
    query: &[N],
    radius: N,
    exclude: Option<u32>,
    sorted: bool,
) -> SearchResults<N> {
    let thresholds = tree.thresholds();
    let node_items = tree.node_items();
    let lefts = tree.left_children();
    let rights = tree.right_children();
    let store = tree.store();
    let metric = tree.metric();

    let mut results = SearchResults::default();
    if node_items.is_empty() {
        return results;
    }

    // Use TinyVec to avoid heap allocations
    let mut stack: TinyVec<[i32; 64]> = TinyVec::new();
    stack.push(0);

    while let Some(node) = stack.pop() {
        let node = node as usize;
        let item = node_items[node];
        let d = metric.distance(query, store.point(item as usize));

        if d <= radius && exclude != Some(item) {
            results.push(item, d);
        }

        // The query ball can straddle the threshold shell, in which case
        // both subtrees are searched. Both comparisons are inclusive so
        // boundary points are never missed.
        let threshold = thresholds[node];
        if lefts[node] != LEAF_MARKER && d - radius <= threshold {
            stack.push(lefts[node]);
        }
        if rights[node] != LEAF_MARKER && d + radius >= threshold {
            stack.push(rights[node]);
        }
    }

    if sorted {
        results.sort_by_distance();
    }
    results
}

fn search_nearest<N: IndexableFloat, T: VpTreeIndex<N>>(
    tree: &T,
    query: &[N],
    k: usize,
    exclude: Option<u32>,
) -> SearchResults<N> {
    let mut queue = NeighborQueue::new(k);
    if tree.num_items() > 0 {
        descend_nearest(tree, 0, query, exclude, &mut queue);
    }

    let mut results = SearchResults::default();
    for candidate in queue.into_sorted() {
        results.push(candidate.item, candidate.distance);
    }
    results
}

fn descend_nearest<N: IndexableFloat, T: VpTreeIndex<N>>(
    tree: &T,
    node: i32,
    query: &[N],
    exclude: Option<u32>,
    queue: &mut NeighborQueue<N>,
) {
    if node == LEAF_MARKER {
        return;
    }
    let node = node as usize;

    let item = tree.node_items()[node];
    let d = tree.metric().distance(query, tree.store().point(item as usize));
    if exclude != Some(item) {
        queue.offer(d, item);
    }

    // Visit the side the query falls on first: it tightens the tau bound
    // before the far side is considered, so more of it can be pruned.
    let threshold = tree.thresholds()[node];
    let (near, far) = if d < threshold {
        (tree.left_children()[node], tree.right_children()[node])
    } else {
        (tree.right_children()[node], tree.left_children()[node])
    };

    descend_nearest(tree, near, query, exclude, queue);
    if (d - threshold).abs() <= queue.worst_distance() {
        descend_nearest(tree, far, query, exclude, queue);
    }
}

impl<N: IndexableFloat, M: DistanceMetric<N>> VpTreeIndex<N> for VpTree<'_, N, M> {
    type Metric = M;

    fn thresholds(&self) -> &[N] {
        self.metadata.thresholds_slice(&self.buffer)
    }

    fn node_items(&self) -> &[u32] {
        self.metadata.items_slice(&self.buffer)
    }

    fn left_children(&self) -> &[i32] {
        self.metadata.lefts_slice(&self.buffer)
    }

    fn right_children(&self) -> &[i32] {
        self.metadata.rights_slice(&self.buffer)
    }

    fn store(&self) -> PointStore<'_, N> {
        self.store
    }

    fn metric(&self) -> &M {
        &self.metric
    }

    fn metadata(&self) -> &VpTreeMetadata<N> {
        &self.metadata
    }
}

impl<N: IndexableFloat, M: DistanceMetric<N>> VpTreeIndex<N> for VpTreeRef<'_, N, M> {
    type Metric = M;

    fn thresholds(&self) -> &[N] {
        self.thresholds
    }

    fn node_items(&self) -> &[u32] {
        self.items
    }

    fn left_children(&self) -> &[i32] {
        self.lefts
    }

    fn right_children(&self) -> &[i32] {
        self.rights
    }

    fn store(&self) -> PointStore<'_, N> {
        self.store
    }

    fn metric(&self) -> &M {
        &self.metric
    }

    fn metadata(&self) -> &VpTreeMetadata<N> {
        &self.metadata
    }
}
