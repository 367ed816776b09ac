use std::cmp;

use bytemuck::cast_slice_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::points::PointStore;
use crate::r#type::IndexableFloat;
use crate::vptree::constants::{LEAF_MARKER, VPTREE_HEADER_SIZE, VPTREE_MAGIC, VPTREE_VERSION};
use crate::vptree::distance::{DistanceMetric, EuclideanDistance};
use crate::vptree::index::{VpTree, VpTreeMetadata};
use crate::MetricIndexError;

const DEFAULT_SEED: u64 = 0x9e3779b97f4a7c15;

/// A builder to create a [`VpTree`].
///
/// The builder consumes a [`PointStore`] and partitions its items into a
/// vantage-point tree. Vantage points are chosen pseudo-randomly from a
/// seeded generator, so the tree shape (and the serialized buffer) is
/// reproducible for a given seed; [`seed`][VpTreeBuilder::seed] overrides
/// the default.
pub struct VpTreeBuilder<'a, N: IndexableFloat, M: DistanceMetric<N> = EuclideanDistance> {
    store: PointStore<'a, N>,
    metric: M,
    rng: StdRng,
}

impl<'a, N: IndexableFloat> VpTreeBuilder<'a, N, EuclideanDistance> {
    /// Create a new builder over `store` using Euclidean distance.
    pub fn new(store: PointStore<'a, N>) -> Self {
        Self::new_with_metric(store, EuclideanDistance)
    }
}

impl<'a, N: IndexableFloat, M: DistanceMetric<N>> VpTreeBuilder<'a, N, M> {
    /// Create a new builder over `store` using a custom distance metric.
    pub fn new_with_metric(store: PointStore<'a, N>, metric: M) -> Self {
        Self {
            store,
            metric,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
        }
    }

    /// Reseed the vantage-point selector.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Consume this builder, partitioning the points into a tree ready for
    /// queries.
    ///
    /// Fails with [`MetricIndexError::InvalidInput`] if any computed
    /// distance is non-finite (finite coordinates can still overflow, e.g.
    /// around `f64::MAX`).
    pub fn finish(mut self) -> Result<VpTree<'a, N, M>> {
        let num_items = self.store.len();
        let num_dims = self.store.num_dims();

        if num_dims > u16::MAX as usize {
            return Err(MetricIndexError::InvalidInput(format!(
                "Dimensionality {} exceeds the maximum of {}.",
                num_dims,
                u16::MAX
            )));
        }
        // Child slots are i32 with -1 reserved, so the node count must fit.
        if num_items > i32::MAX as usize {
            return Err(MetricIndexError::InvalidInput(format!(
                "{} points exceed the maximum of {}.",
                num_items,
                i32::MAX
            )));
        }

        let metadata = VpTreeMetadata::<N>::new(num_items, num_dims);
        let mut data = vec![0u8; metadata.data_buffer_length()];

        // Set data header;
        data[0] = VPTREE_MAGIC;
        data[1] = (VPTREE_VERSION << 4) + N::TYPE_INDEX;
        cast_slice_mut::<_, u16>(&mut data[2..4])[0] = num_dims as u16;
        cast_slice_mut::<_, u32>(&mut data[4..8])[0] = num_items as u32;

        if num_items > 0 {
            // Scratch state for the recursion: a permutation of the item
            // indices and, parallel to it, each item's distance to the
            // vantage point currently being partitioned around.
            let mut items: Vec<u32> = (0..num_items as u32).collect();
            let mut dists: Vec<N> = vec![N::zero(); num_items];

            let (thresholds, node_items, lefts, rights) =
                split_data_borrow::<N>(&mut data, &metadata);
            let mut nodes = NodeArrays {
                thresholds,
                items: node_items,
                lefts,
                rights,
                pos: 0,
            };

            let root = build_from_points(
                &self.store,
                &self.metric,
                &mut nodes,
                &mut items,
                &mut dists,
                0,
                num_items,
                &mut self.rng,
            )?;
            debug_assert_eq!(root, 0);
            debug_assert_eq!(nodes.pos, num_items);
        }

        Ok(VpTree {
            buffer: data,
            metadata,
            store: self.store,
            metric: self.metric,
        })
    }
}

/// Mutable borrow of the four node sections of the buffer.
fn split_data_borrow<'b, N: IndexableFloat>(
    data: &'b mut [u8],
    metadata: &VpTreeMetadata<N>,
) -> (&'b mut [N], &'b mut [u32], &'b mut [i32], &'b mut [i32]) {
    let (_header, rest) = data.split_at_mut(VPTREE_HEADER_SIZE);
    let (thresholds_buf, rest) = rest.split_at_mut(metadata.thresholds_byte_length());
    let (items_buf, rest) = rest.split_at_mut(metadata.indices_byte_length());
    let (lefts_buf, rights_buf) = rest.split_at_mut(metadata.indices_byte_length());

    (
        cast_slice_mut(thresholds_buf),
        cast_slice_mut(items_buf),
        cast_slice_mut(lefts_buf),
        cast_slice_mut(rights_buf),
    )
}

/// The node sections during construction, filled in pre-order.
struct NodeArrays<'b, N: IndexableFloat> {
    thresholds: &'b mut [N],
    items: &'b mut [u32],
    lefts: &'b mut [i32],
    rights: &'b mut [i32],
    pos: usize,
}

impl<N: IndexableFloat> NodeArrays<'_, N> {
    /// Append a node for `item` with no children yet; returns its index.
    fn push(&mut self, item: u32) -> usize {
        let node = self.pos;
        self.thresholds[node] = N::zero();
        self.items[node] = item;
        self.lefts[node] = LEAF_MARKER;
        self.rights[node] = LEAF_MARKER;
        self.pos += 1;
        node
    }
}

/// Recursively build the subtree over `items[lower..upper]`, returning the
/// new node's index (or `LEAF_MARKER` for an empty range).
#[allow(clippy::too_many_arguments)]
fn build_from_points<N: IndexableFloat, M: DistanceMetric<N>>(
    store: &PointStore<'_, N>,
    metric: &M,
    nodes: &mut NodeArrays<'_, N>,
    items: &mut [u32],
    dists: &mut [N],
    lower: usize,
    upper: usize,
    rng: &mut StdRng,
) -> Result<i32> {
    if lower == upper {
        return Ok(LEAF_MARKER);
    }

    // The vantage point: a pseudo-random element of the range, pulled to
    // the front. It is excluded from its own subtree.
    if upper - lower > 1 {
        let chosen = rng.gen_range(lower..upper);
        items.swap(lower, chosen);
    }
    let node = nodes.push(items[lower]);

    if upper - lower > 1 {
        let vantage = store.point(items[lower] as usize);
        for i in (lower + 1)..upper {
            let d = metric.distance(vantage, store.point(items[i] as usize));
            if !d.is_finite() {
                return Err(MetricIndexError::InvalidInput(format!(
                    "Non-finite distance between items {} and {}.",
                    items[lower], items[i]
                )));
            }
            dists[i] = d;
        }

        // Partition the rest of the range around the median distance, with
        // a selection rather than a full sort.
        let median = (lower + upper) / 2;
        select(items, dists, median, lower + 1, upper - 1);
        let threshold = dists[median];

        // Selection leaves ties with the median on either side; sweep them
        // into the far half so the near half stays strictly inside the
        // threshold.
        let mut mid = median;
        let mut i = lower + 1;
        while i < mid {
            if dists[i] >= threshold {
                mid -= 1;
                items.swap(i, mid);
                dists.swap(i, mid);
            } else {
                i += 1;
            }
        }

        nodes.thresholds[node] = threshold;
        let left = build_from_points(store, metric, nodes, items, dists, lower + 1, mid, rng)?;
        let right = build_from_points(store, metric, nodes, items, dists, mid, upper, rng)?;
        nodes.lefts[node] = left;
        nodes.rights[node] = right;
    }

    Ok(node as i32)
}

/// Custom Floyd-Rivest selection algorithm: reorder `items`/`dists` so that
/// `dists[k]` ends in its sorted position within `[left, right]`, smaller
/// distances before it and larger or equal distances after it.
#[inline]
fn select<N: IndexableFloat>(
    items: &mut [u32],
    dists: &mut [N],
    k: usize,
    mut left: usize,
    mut right: usize,
) {
    while right > left {
        if right - left > 600 {
            let n = (right - left + 1) as f64;
            let m = (k - left + 1) as f64;
            let z = f64::ln(n);
            let s = 0.5 * f64::exp((2.0 * z) / 3.0);
            let sd = 0.5
                * f64::sqrt((z * s * (n - s)) / n)
                * (if m - n / 2.0 < 0.0 { -1.0 } else { 1.0 });
            let new_left = cmp::max(left, f64::floor(k as f64 - (m * s) / n + sd) as usize);
            let new_right = cmp::min(
                right,
                f64::floor(k as f64 + ((n - m) * s) / n + sd) as usize,
            );
            select(items, dists, k, new_left, new_right);
        }

        let t = dists[k];
        let mut i = left;
        let mut j = right;

        swap_item(items, dists, left, k);
        if dists[right] > t {
            swap_item(items, dists, left, right);
        }

        while i < j {
            swap_item(items, dists, i, j);
            i += 1;
            j -= 1;
            while dists[i] < t {
                i += 1;
            }
            while dists[j] > t {
                j -= 1;
            }
        }

        if dists[left] == t {
            swap_item(items, dists, left, j);
        } else {
            j += 1;
            swap_item(items, dists, j, right);
        }

        if j <= k {
            left = j + 1;
        }
        if k <= j {
            right = j - 1;
        }
    }
}

#[inline]
fn swap_item<N: IndexableFloat>(items: &mut [u32], dists: &mut [N], i: usize, j: usize) {
    items.swap(i, j);
    dists.swap(i, j);
}
