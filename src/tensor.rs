//! Dense multi-dimensional containers for per-element data.
//!
//! All tensors are contiguous and column-major: the *leftmost* index varies
//! fastest. This matches the layout of the geometric factor arrays, where e.g.
//! Jacobians are stored as `(row, col, quadrature point, element)` so that the
//! per-element block for element `e` is a single contiguous slice.
//!
//! [`Tensor`] owns its buffer; [`TensorView`] and [`TensorViewMut`] borrow
//! externally-owned storage. The lifetime of a view is tied to the viewed
//! buffer by the borrow checker, so the buffer always outlives the view.

use nalgebra::Scalar;
use num::Zero;

/// Computes the flat column-major offset of a multi-index.
#[inline]
fn flat_offset<const R: usize>(shape: &[usize; R], index: &[usize; R]) -> usize {
    let mut offset = 0;
    let mut stride = 1;
    for axis in 0..R {
        debug_assert!(
            index[axis] < shape[axis],
            "Tensor index out of bounds: index {} >= extent {} along axis {}",
            index[axis],
            shape[axis],
            axis
        );
        offset += stride * index[axis];
        stride *= shape[axis];
    }
    offset
}

#[inline]
fn total_len<const R: usize>(shape: &[usize; R]) -> usize {
    shape.iter().product()
}

/// An owning, dense, column-major tensor of rank `R`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor<T: Scalar, const R: usize> {
    data: Vec<T>,
    shape: [usize; R],
}

/// A non-owning view into a rank-`R` tensor.
#[derive(Debug)]
pub struct TensorView<'a, T: Scalar, const R: usize> {
    data: &'a [T],
    shape: [usize; R],
}

/// A non-owning mutable view into a rank-`R` tensor.
#[derive(Debug)]
pub struct TensorViewMut<'a, T: Scalar, const R: usize> {
    data: &'a mut [T],
    shape: [usize; R],
}

// Views are cheap handles; the shared variant can be freely copied.
impl<'a, T: Scalar, const R: usize> Copy for TensorView<'a, T, R> {}

impl<'a, T: Scalar, const R: usize> Clone for TensorView<'a, T, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Scalar, const R: usize> Tensor<T, R> {
    /// Allocates a zero-initialized tensor with the given shape.
    pub fn zeros(shape: [usize; R]) -> Self
    where
        T: Zero,
    {
        Self {
            data: vec![T::zero(); total_len(&shape)],
            shape,
        }
    }

    /// Wraps an existing buffer in a tensor.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the product of the extents.
    pub fn from_vec(data: Vec<T>, shape: [usize; R]) -> Self {
        assert_eq!(
            data.len(),
            total_len(&shape),
            "Buffer length must match the product of the tensor extents"
        );
        Self { data, shape }
    }

    pub fn shape(&self) -> &[usize; R] {
        &self.shape
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn view(&self) -> TensorView<'_, T, R> {
        TensorView {
            data: &self.data,
            shape: self.shape,
        }
    }

    pub fn view_mut(&mut self) -> TensorViewMut<'_, T, R> {
        TensorViewMut {
            data: &mut self.data,
            shape: self.shape,
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<'a, T: Scalar, const R: usize> TensorView<'a, T, R> {
    /// Wraps an externally-owned buffer in a borrowed view.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the product of the extents.
    pub fn from_slice(data: &'a [T], shape: [usize; R]) -> Self {
        assert_eq!(
            data.len(),
            total_len(&shape),
            "Buffer length must match the product of the tensor extents"
        );
        Self { data, shape }
    }

    pub fn shape(&self) -> &[usize; R] {
        &self.shape
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }
}

impl<'a, T: Scalar, const R: usize> TensorViewMut<'a, T, R> {
    pub fn from_slice(data: &'a mut [T], shape: [usize; R]) -> Self {
        assert_eq!(
            data.len(),
            total_len(&shape),
            "Buffer length must match the product of the tensor extents"
        );
        Self { data, shape }
    }

    pub fn shape(&self) -> &[usize; R] {
        &self.shape
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    pub fn as_slice(&self) -> &[T] {
        self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data
    }

    pub fn as_view(&self) -> TensorView<'_, T, R> {
        TensorView {
            data: self.data,
            shape: self.shape,
        }
    }
}

impl<T: Scalar, const R: usize> std::ops::Index<[usize; R]> for Tensor<T, R> {
    type Output = T;

    #[inline]
    fn index(&self, index: [usize; R]) -> &T {
        &self.data[flat_offset(&self.shape, &index)]
    }
}

impl<T: Scalar, const R: usize> std::ops::IndexMut<[usize; R]> for Tensor<T, R> {
    #[inline]
    fn index_mut(&mut self, index: [usize; R]) -> &mut T {
        &mut self.data[flat_offset(&self.shape, &index)]
    }
}

impl<'a, T: Scalar, const R: usize> std::ops::Index<[usize; R]> for TensorView<'a, T, R> {
    type Output = T;

    #[inline]
    fn index(&self, index: [usize; R]) -> &T {
        &self.data[flat_offset(&self.shape, &index)]
    }
}

impl<'a, T: Scalar, const R: usize> std::ops::Index<[usize; R]> for TensorViewMut<'a, T, R> {
    type Output = T;

    #[inline]
    fn index(&self, index: [usize; R]) -> &T {
        &self.data[flat_offset(&self.shape, &index)]
    }
}

impl<'a, T: Scalar, const R: usize> std::ops::IndexMut<[usize; R]> for TensorViewMut<'a, T, R> {
    #[inline]
    fn index_mut(&mut self, index: [usize; R]) -> &mut T {
        &mut self.data[flat_offset(&self.shape, &index)]
    }
}

/// Implements last-index slicing from rank `$from` down to rank `$to`.
///
/// Fixing the last (slowest-varying) index of a column-major tensor selects a
/// contiguous block, so the resulting lower-rank view aliases the parent
/// buffer without copying.
macro_rules! impl_slice_last {
    ($from:literal => $to:literal) => {
        impl<T: Scalar> Tensor<T, $from> {
            /// Returns the rank-lowered view obtained by fixing the last index.
            pub fn index_last(&self, index: usize) -> TensorView<'_, T, $to> {
                self.view().index_last(index)
            }

            /// Returns the mutable rank-lowered view obtained by fixing the last index.
            pub fn index_last_mut(&mut self, index: usize) -> TensorViewMut<'_, T, $to> {
                self.view_mut().into_index_last_mut(index)
            }
        }

        impl<'a, T: Scalar> TensorView<'a, T, $from> {
            /// Returns the rank-lowered view obtained by fixing the last index.
            pub fn index_last(&self, index: usize) -> TensorView<'a, T, $to> {
                assert!(
                    index < self.shape[$from - 1],
                    "Slice index {} out of bounds for extent {}",
                    index,
                    self.shape[$from - 1]
                );
                let mut shape = [0; $to];
                shape.copy_from_slice(&self.shape[..$to]);
                let block = total_len(&shape);
                let data: &'a [T] = self.data;
                TensorView {
                    data: &data[index * block..(index + 1) * block],
                    shape,
                }
            }
        }

        impl<'a, T: Scalar> TensorViewMut<'a, T, $from> {
            /// Consumes the view and returns the mutable rank-lowered view
            /// obtained by fixing the last index.
            pub fn into_index_last_mut(self, index: usize) -> TensorViewMut<'a, T, $to> {
                assert!(
                    index < self.shape[$from - 1],
                    "Slice index {} out of bounds for extent {}",
                    index,
                    self.shape[$from - 1]
                );
                let mut shape = [0; $to];
                shape.copy_from_slice(&self.shape[..$to]);
                let block = total_len(&shape);
                TensorViewMut {
                    data: &mut self.data[index * block..(index + 1) * block],
                    shape,
                }
            }
        }
    };
}

impl_slice_last!(4 => 3);
impl_slice_last!(3 => 2);
impl_slice_last!(2 => 1);
