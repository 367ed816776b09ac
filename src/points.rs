//! A borrowed view over the caller's coordinate buffer.

use crate::error::Result;
use crate::r#type::IndexableFloat;
use crate::MetricIndexError;

/// An immutable set of points referencing a caller-owned coordinate buffer.
///
/// The buffer is dense and row-major: point `i` occupies
/// `coords[i * num_dims..(i + 1) * num_dims]`. Coordinates are never
/// copied; the store (and any tree built from it) borrows the buffer for
/// its whole lifetime. Item indices are stable and match the caller's
/// original ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointStore<'a, N: IndexableFloat> {
    coords: &'a [N],
    num_dims: usize,
}

impl<'a, N: IndexableFloat> PointStore<'a, N> {
    /// Create a store over `coords` with `num_dims` values per point.
    ///
    /// Fails with [`MetricIndexError::InvalidInput`] if `num_dims` is zero,
    /// the buffer length is not a multiple of `num_dims`, or any value is
    /// non-finite. An empty buffer is legal and produces an empty store.
    pub fn try_new(coords: &'a [N], num_dims: usize) -> Result<Self> {
        if num_dims == 0 {
            return Err(MetricIndexError::InvalidInput(
                "Dimensionality must be at least 1.".to_string(),
            ));
        }
        if coords.len() % num_dims != 0 {
            return Err(MetricIndexError::InvalidInput(format!(
                "Coordinate buffer length {} is not a multiple of dimensionality {}.",
                coords.len(),
                num_dims
            )));
        }
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(MetricIndexError::InvalidInput(
                "Coordinate buffer contains non-finite values.".to_string(),
            ));
        }

        Ok(Self { coords, num_dims })
    }

    /// The number of points in this store.
    pub fn len(&self) -> usize {
        self.coords.len() / self.num_dims
    }

    /// Whether this store holds zero points.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// The number of coordinates per point.
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    /// The coordinates of point `item`.
    ///
    /// Panics if `item >= self.len()`; callers validate item indices first.
    #[inline]
    pub fn point(&self, item: usize) -> &'a [N] {
        &self.coords[item * self.num_dims..(item + 1) * self.num_dims]
    }
}
