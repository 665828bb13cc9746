//! Dense N-D arrays in row-major layout.
//!
//! `DenseArray` is the storage primitive shared by images, label fields and
//! masks. The last axis is contiguous and the axis order is the same one the
//! neighbourhood offset vectors use, so a displacement vector maps to a fixed
//! signed linear offset that is valid everywhere the per-axis bounds test
//! passes.

use crate::math::Real;
use serde::{Serialize, Serializer};

/// Serializes a const-generic-length array as a JSON array. `serde`'s
/// built-in array impls only cover fixed literal lengths, not arrays
/// generic over `N`, so fields of type `[T; N]` need this helper.
fn serialize_array<S, T, const N: usize>(array: &[T; N], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    array.as_slice().serialize(serializer)
}

/// Owned dense N-D array with shape, strides and linear storage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DenseArray<T, const N: usize> {
    #[serde(serialize_with = "serialize_array")]
    shape: [usize; N],
    #[serde(serialize_with = "serialize_array")]
    strides: [usize; N],
    data: Vec<T>,
}

/// Row-major strides for a shape (last axis contiguous).
pub fn strides_for<const N: usize>(shape: [usize; N]) -> [usize; N] {
    let mut strides = [1usize; N];
    for a in (0..N.saturating_sub(1)).rev() {
        strides[a] = strides[a + 1] * shape[a + 1];
    }
    strides
}

impl<T: Clone + Default, const N: usize> DenseArray<T, N> {
    /// Default-filled array of the given shape.
    pub fn new(shape: [usize; N]) -> Self {
        Self::filled(shape, T::default())
    }

    /// Array of the given shape with every element set to `value`.
    pub fn filled(shape: [usize; N], value: T) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            strides: strides_for(shape),
            data: vec![value; len],
        }
    }

    /// Wraps an existing buffer. The buffer length must equal the product of
    /// the shape.
    pub fn from_vec(shape: [usize; N], data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "buffer length must match shape"
        );
        Self {
            shape,
            strides: strides_for(shape),
            data,
        }
    }

    /// Builds an array by evaluating `f` at every coordinate.
    pub fn from_fn(shape: [usize; N], mut f: impl FnMut([usize; N]) -> T) -> Self {
        let mut out = Self::new(shape);
        let len = out.len();
        for idx in 0..len {
            let c = out.coords(idx);
            out.data[idx] = f(c);
        }
        out
    }

    /// Reshapes in place, reusing the allocation. Element content after a
    /// resize is unspecified.
    pub fn resize(&mut self, shape: [usize; N]) {
        let len = shape.iter().product();
        self.shape = shape;
        self.strides = strides_for(shape);
        self.data.clear();
        self.data.resize(len, T::default());
    }
}

impl<T, const N: usize> DenseArray<T, N> {
    #[inline]
    pub fn shape(&self) -> [usize; N] {
        self.shape
    }

    #[inline]
    pub fn strides(&self) -> [usize; N] {
        self.strides
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear index of a coordinate.
    #[inline]
    pub fn linear(&self, c: [usize; N]) -> usize {
        let mut idx = 0;
        for a in 0..N {
            debug_assert!(c[a] < self.shape[a]);
            idx += c[a] * self.strides[a];
        }
        idx
    }

    /// Coordinate of a linear index.
    #[inline]
    pub fn coords(&self, mut idx: usize) -> [usize; N] {
        let mut c = [0usize; N];
        for a in 0..N {
            c[a] = idx / self.strides[a];
            idx %= self.strides[a];
        }
        c
    }

    /// Signed linear displacement of an integer offset vector.
    #[inline]
    pub fn offset_linear(&self, d: [isize; N]) -> isize {
        let mut off = 0isize;
        for a in 0..N {
            off += d[a] * self.strides[a] as isize;
        }
        off
    }

    /// Coordinate shifted by `d`, or `None` when any axis leaves the array.
    #[inline]
    pub fn offset_coords(&self, c: [usize; N], d: [isize; N]) -> Option<[usize; N]> {
        let mut out = [0usize; N];
        for a in 0..N {
            let v = c[a] as isize + d[a];
            if v < 0 || v as usize >= self.shape[a] {
                return None;
            }
            out[a] = v as usize;
        }
        Some(out)
    }

    #[inline]
    pub fn get(&self, c: [usize; N]) -> &T {
        &self.data[self.linear(c)]
    }

    #[inline]
    pub fn set(&mut self, c: [usize; N], v: T) {
        let idx = self.linear(c);
        self.data[idx] = v;
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}

impl<T, const N: usize> std::ops::Index<usize> for DenseArray<T, N> {
    type Output = T;

    #[inline]
    fn index(&self, idx: usize) -> &T {
        &self.data[idx]
    }
}

impl<T, const N: usize> std::ops::IndexMut<usize> for DenseArray<T, N> {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut T {
        &mut self.data[idx]
    }
}

/// Scalar image: a dense array of intensities plus per-axis voxel spacing
/// consumed by the boundary metric.
#[derive(Clone, Debug, Serialize)]
pub struct Image<T, const N: usize> {
    pub data: DenseArray<T, N>,
    #[serde(serialize_with = "serialize_array")]
    pub spacing: [f64; N],
}

impl<T: Real, const N: usize> Image<T, N> {
    /// Image with unit spacing over an existing array.
    pub fn from_array(data: DenseArray<T, N>) -> Self {
        Self {
            data,
            spacing: [1.0; N],
        }
    }

    /// Image with unit spacing built from a coordinate function.
    pub fn from_fn(shape: [usize; N], f: impl FnMut([usize; N]) -> T) -> Self {
        Self::from_array(DenseArray::from_fn(shape, f))
    }

    pub fn with_spacing(mut self, spacing: [f64; N]) -> Self {
        self.spacing = spacing;
        self
    }

    #[inline]
    pub fn shape(&self) -> [usize; N] {
        self.data.shape()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when every axis has unit spacing.
    pub fn is_isotropic(&self) -> bool {
        self.spacing.iter().all(|&s| s == 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        let a: DenseArray<f64, 3> = DenseArray::new([2, 3, 4]);
        assert_eq!(a.strides(), [12, 4, 1]);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn linear_and_coords_round_trip() {
        let a: DenseArray<u8, 2> = DenseArray::new([3, 5]);
        for idx in 0..a.len() {
            assert_eq!(a.linear(a.coords(idx)), idx);
        }
        assert_eq!(a.linear([2, 4]), 14);
        assert_eq!(a.coords(7), [1, 2]);
    }

    #[test]
    fn offset_respects_per_axis_bounds() {
        let a: DenseArray<u8, 2> = DenseArray::new([3, 3]);
        assert_eq!(a.offset_coords([0, 0], [1, 1]), Some([1, 1]));
        assert_eq!(a.offset_coords([0, 0], [-1, 0]), None);
        // A wrap through the linear index must be rejected by the axis test.
        assert_eq!(a.offset_coords([0, 2], [0, 1]), None);
        assert_eq!(a.offset_linear([1, -1]), 2);
    }

    #[test]
    fn resize_reuses_allocation() {
        let mut a: DenseArray<f32, 2> = DenseArray::filled([4, 4], 1.0);
        a.resize([2, 2]);
        assert_eq!(a.shape(), [2, 2]);
        assert_eq!(a.len(), 4);
    }
}
