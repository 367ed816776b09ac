use std::fmt::Debug;

use num_traits::Float;

use crate::error::Result;
use crate::vptree::constants::VPTREE_MAGIC;
use crate::MetricIndexError;

/// A trait for scalar types that can back the coordinates of an index.
///
/// This trait is sealed and cannot be implemented for external types: the
/// serialized buffer records the scalar type in its header, so the set of
/// representable types is part of the wire format. Distances live in the
/// same type as coordinates, which restricts the index to `f32` and `f64`.
pub trait IndexableFloat:
    private::Sealed + Float + Debug + Send + Sync + bytemuck::Pod
{
    /// The type index recorded in the buffer header.
    const TYPE_INDEX: u8;
    /// The number of bytes per element
    const BYTES_PER_ELEMENT: usize;
}

impl IndexableFloat for f32 {
    const TYPE_INDEX: u8 = 7;
    const BYTES_PER_ELEMENT: usize = 4;
}

impl IndexableFloat for f64 {
    const TYPE_INDEX: u8 = 8;
    const BYTES_PER_ELEMENT: usize = 8;
}

/// An enum over the allowed coordinate types in the index.
pub enum CoordType {
    Float32,
    Float64,
}

impl CoordType {
    /// Infer the CoordType from an existing buffer.
    ///
    /// This can be used to discern the generic type to use when constructing
    /// a [`VpTree`][crate::vptree::VpTree] or
    /// [`VpTreeRef`][crate::vptree::VpTreeRef] from serialized bytes.
    pub fn from_buffer<T: AsRef<[u8]>>(data: &T) -> Result<Self> {
        let data = data.as_ref();
        if data.is_empty() || data[0] != VPTREE_MAGIC {
            return Err(MetricIndexError::CorruptState(
                "Data not in vp-tree format.".to_string(),
            ));
        }

        let version_and_type = data[1];
        let type_ = version_and_type & 0x0f;
        let result = match type_ {
            f32::TYPE_INDEX => CoordType::Float32,
            f64::TYPE_INDEX => CoordType::Float64,
            t => {
                return Err(MetricIndexError::CorruptState(format!(
                    "Unexpected type {}.",
                    t
                )))
            }
        };
        Ok(result)
    }
}

// https://rust-lang.github.io/api-guidelines/future-proofing.html#sealed-traits-protect-against-downstream-implementations-c-sealed
mod private {
    pub trait Sealed {}

    impl Sealed for f32 {}
    impl Sealed for f64 {}
}
