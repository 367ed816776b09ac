use std::marker::PhantomData;

use bytemuck::cast_slice;

use crate::error::Result;
use crate::points::PointStore;
use crate::r#type::IndexableFloat;
use crate::vptree::constants::{LEAF_MARKER, VPTREE_HEADER_SIZE, VPTREE_MAGIC, VPTREE_VERSION};
use crate::vptree::distance::{DistanceMetric, EuclideanDistance};
use crate::MetricIndexError;

/// Common metadata describing a serialized vp-tree buffer.
///
/// The buffer holds one node per indexed point, root first, as four
/// contiguous sections behind an 8-byte header: thresholds (`N`), vantage
/// item indices (`u32`), left children and right children (`i32`, with
/// `-1` meaning "no child").
#[derive(Debug, Clone, PartialEq)]
pub struct VpTreeMetadata<N: IndexableFloat> {
    num_items: usize,
    num_dims: usize,
    thresholds_byte_length: usize,
    indices_byte_length: usize,
    phantom: PhantomData<N>,
}

impl<N: IndexableFloat> VpTreeMetadata<N> {
    pub(crate) fn new(num_items: usize, num_dims: usize) -> Self {
        Self {
            num_items,
            num_dims,
            thresholds_byte_length: num_items * N::BYTES_PER_ELEMENT,
            indices_byte_length: num_items * 4,
            phantom: PhantomData,
        }
    }

    /// Parse and validate the header of a serialized buffer.
    pub fn try_new(data: &[u8]) -> Result<Self> {
        if data.len() < VPTREE_HEADER_SIZE {
            return Err(MetricIndexError::CorruptState(
                "Buffer shorter than the header.".to_string(),
            ));
        }

        if data[0] != VPTREE_MAGIC {
            return Err(MetricIndexError::CorruptState(
                "Data not in vp-tree format.".to_string(),
            ));
        }

        let version_and_type = data[1];
        let version = version_and_type >> 4;
        if version != VPTREE_VERSION {
            return Err(MetricIndexError::CorruptState(format!(
                "Got v{} data when expected v{}.",
                version, VPTREE_VERSION
            )));
        }

        let type_ = version_and_type & 0x0f;
        if type_ != N::TYPE_INDEX {
            return Err(MetricIndexError::CorruptState(format!(
                "Got type {} data when expected type {}.",
                type_,
                N::TYPE_INDEX
            )));
        }

        let num_dims: u16 = cast_slice(&data[2..4])[0];
        let num_items: u32 = cast_slice(&data[4..8])[0];
        let metadata = Self::new(num_items as usize, num_dims as usize);

        if data.len() != metadata.data_buffer_length() {
            return Err(MetricIndexError::CorruptState(format!(
                "Incorrect buffer length. Expected {} got {}.",
                metadata.data_buffer_length(),
                data.len()
            )));
        }

        Ok(metadata)
    }

    /// The number of indexed points (and nodes; the tree has one node per
    /// point).
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// The number of coordinates per point.
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    /// The total byte length of a conforming buffer.
    pub fn data_buffer_length(&self) -> usize {
        VPTREE_HEADER_SIZE + self.thresholds_byte_length + 3 * self.indices_byte_length
    }

    pub(crate) fn thresholds_byte_length(&self) -> usize {
        self.thresholds_byte_length
    }

    pub(crate) fn indices_byte_length(&self) -> usize {
        self.indices_byte_length
    }

    /// The per-node partition radii stored in `data`.
    pub fn thresholds_slice<'b>(&self, data: &'b [u8]) -> &'b [N] {
        let start = VPTREE_HEADER_SIZE;
        cast_slice(&data[start..start + self.thresholds_byte_length])
    }

    /// The per-node vantage item indices stored in `data`.
    pub fn items_slice<'b>(&self, data: &'b [u8]) -> &'b [u32] {
        let start = VPTREE_HEADER_SIZE + self.thresholds_byte_length;
        cast_slice(&data[start..start + self.indices_byte_length])
    }

    /// The per-node left child indices stored in `data`.
    pub fn lefts_slice<'b>(&self, data: &'b [u8]) -> &'b [i32] {
        let start = VPTREE_HEADER_SIZE + self.thresholds_byte_length + self.indices_byte_length;
        cast_slice(&data[start..start + self.indices_byte_length])
    }

    /// The per-node right child indices stored in `data`.
    pub fn rights_slice<'b>(&self, data: &'b [u8]) -> &'b [i32] {
        let start =
            VPTREE_HEADER_SIZE + self.thresholds_byte_length + 2 * self.indices_byte_length;
        cast_slice(&data[start..start + self.indices_byte_length])
    }
}

/// Reject buffers whose header disagrees with the supplied point store.
fn check_store<N: IndexableFloat>(
    metadata: &VpTreeMetadata<N>,
    store: &PointStore<'_, N>,
) -> Result<()> {
    if metadata.num_items() != store.len() {
        return Err(MetricIndexError::CorruptState(format!(
            "Buffer holds {} nodes but the store has {} points.",
            metadata.num_items(),
            store.len()
        )));
    }
    if metadata.num_dims() != store.num_dims() {
        return Err(MetricIndexError::CorruptState(format!(
            "Buffer records dimensionality {} but the store has {}.",
            metadata.num_dims(),
            store.num_dims()
        )));
    }
    Ok(())
}

/// Reject buffers with out-of-range child or item indices.
fn validate_nodes<N: IndexableFloat>(metadata: &VpTreeMetadata<N>, data: &[u8]) -> Result<()> {
    let num_items = metadata.num_items();

    for (node, &item) in metadata.items_slice(data).iter().enumerate() {
        if item as usize >= num_items {
            return Err(MetricIndexError::CorruptState(format!(
                "Node {} references item {} but the store has {} points.",
                node, item, num_items
            )));
        }
    }

    for &child in metadata
        .lefts_slice(data)
        .iter()
        .chain(metadata.rights_slice(data))
    {
        if child != LEAF_MARKER && (child < 0 || child as usize >= num_items) {
            return Err(MetricIndexError::CorruptState(format!(
                "Child index {} out of range for {} nodes.",
                child, num_items
            )));
        }
    }

    Ok(())
}

/// An owned vp-tree buffer over a borrowed point store.
///
/// Usually this is created from scratch via
/// [`VpTreeBuilder`][crate::vptree::VpTreeBuilder], or reloaded from a
/// previously serialized buffer via [`try_new`][VpTree::try_new]. The raw
/// buffer is available through `AsRef<[u8]>` and
/// [`into_inner`][VpTree::into_inner]; persisting it and reloading it next
/// to the original coordinate buffer skips the build entirely.
#[derive(Debug, Clone)]
pub struct VpTree<'a, N: IndexableFloat, M: DistanceMetric<N> = EuclideanDistance> {
    pub(crate) buffer: Vec<u8>,
    pub(crate) metadata: VpTreeMetadata<N>,
    pub(crate) store: PointStore<'a, N>,
    pub(crate) metric: M,
}

impl<'a, N: IndexableFloat> VpTree<'a, N, EuclideanDistance> {
    /// Reconstruct a Euclidean tree from a serialized node buffer.
    ///
    /// `store` must view the same coordinate buffer the tree was built
    /// from; the buffer records node structure only, never coordinates.
    /// Fails with [`MetricIndexError::CorruptState`] if the buffer is
    /// malformed or inconsistent with the store.
    pub fn try_new(store: PointStore<'a, N>, buffer: Vec<u8>) -> Result<Self> {
        Self::try_new_with_metric(store, buffer, EuclideanDistance)
    }
}

impl<'a, N: IndexableFloat, M: DistanceMetric<N>> VpTree<'a, N, M> {
    /// Reconstruct a tree from a serialized node buffer under a custom
    /// metric. The metric must be the one the tree was built with; the
    /// buffer does not record it, exactly as it does not record the
    /// coordinates.
    pub fn try_new_with_metric(
        store: PointStore<'a, N>,
        buffer: Vec<u8>,
        metric: M,
    ) -> Result<Self> {
        let metadata = VpTreeMetadata::try_new(&buffer)?;
        check_store(&metadata, &store)?;
        validate_nodes(&metadata, &buffer)?;
        Ok(Self {
            buffer,
            metadata,
            store,
            metric,
        })
    }

    /// Consume self, returning the serialized node buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// A zero-copy reference view over this tree's buffer.
    pub fn as_tree_ref(&self) -> VpTreeRef<'_, N, M> {
        VpTreeRef {
            thresholds: self.metadata.thresholds_slice(&self.buffer),
            items: self.metadata.items_slice(&self.buffer),
            lefts: self.metadata.lefts_slice(&self.buffer),
            rights: self.metadata.rights_slice(&self.buffer),
            store: self.store,
            metadata: self.metadata.clone(),
            metric: self.metric.clone(),
        }
    }
}

impl<N: IndexableFloat, M: DistanceMetric<N>> AsRef<[u8]> for VpTree<'_, N, M> {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

/// A vp-tree view over an externally held serialized buffer.
///
/// Usually this is created from a [`VpTree`] via
/// [`as_tree_ref`][VpTree::as_tree_ref], but it can also be created from
/// any existing data buffer without copying it.
#[derive(Debug, Clone)]
pub struct VpTreeRef<'a, N: IndexableFloat, M: DistanceMetric<N> = EuclideanDistance> {
    pub(crate) thresholds: &'a [N],
    pub(crate) items: &'a [u32],
    pub(crate) lefts: &'a [i32],
    pub(crate) rights: &'a [i32],
    pub(crate) store: PointStore<'a, N>,
    pub(crate) metadata: VpTreeMetadata<N>,
    pub(crate) metric: M,
}

impl<'a, N: IndexableFloat> VpTreeRef<'a, N, EuclideanDistance> {
    /// View a serialized Euclidean tree without copying the buffer.
    ///
    /// Validation matches [`VpTree::try_new`].
    pub fn try_new<T: AsRef<[u8]>>(store: PointStore<'a, N>, data: &'a T) -> Result<Self> {
        Self::try_new_with_metric(store, data, EuclideanDistance)
    }
}

impl<'a, N: IndexableFloat, M: DistanceMetric<N>> VpTreeRef<'a, N, M> {
    /// View a serialized tree under a custom metric without copying the
    /// buffer.
    pub fn try_new_with_metric<T: AsRef<[u8]>>(
        store: PointStore<'a, N>,
        data: &'a T,
        metric: M,
    ) -> Result<Self> {
        let data = data.as_ref();
        let metadata = VpTreeMetadata::try_new(data)?;
        check_store(&metadata, &store)?;
        validate_nodes(&metadata, data)?;
        Ok(Self {
            thresholds: metadata.thresholds_slice(data),
            items: metadata.items_slice(data),
            lefts: metadata.lefts_slice(data),
            rights: metadata.rights_slice(data),
            store,
            metadata,
            metric,
        })
    }
}
