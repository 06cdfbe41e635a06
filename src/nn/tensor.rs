//! Tensor API.
//!
//! Tensors are the inputs and outputs of neural networks. Here they always hold `f32` elements,
//! since that is what the detection networks this crate runs consume and produce.

use std::fmt;

use crate::iter::zip_exact;
use tinyvec::TinyVec;

/// Shape and row-major strides of a tensor.
#[derive(Clone)]
struct Layout {
    shape: TinyVec<[usize; 4]>,
    strides: TinyVec<[usize; 4]>,
}

impl Layout {
    fn from_shape(shape: &[usize]) -> Self {
        let mut strides = TinyVec::from_iter(shape.iter().map(|_| 0));
        let mut stride = 1;
        for (out, size) in zip_exact(strides.iter_mut().rev(), shape.iter().copied().rev()) {
            *out = stride;
            stride *= size;
        }

        Self {
            shape: TinyVec::from(shape),
            strides,
        }
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn elements(&self) -> usize {
        self.shape.iter().product()
    }

    fn remove_prefix(&self, num: usize) -> Layout {
        assert!(num <= self.shape.len());

        Self {
            shape: TinyVec::from(&self.shape[num..]),
            strides: TinyVec::from(&self.strides[num..]),
        }
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.shape, self.strides)
    }
}

/// Invokes `f` with every index vector of `shape`, in row-major order.
///
/// Starts at `[0, ..., 0]` and increments the innermost dimension first. Does nothing when any
/// dimension is 0.
fn for_each_index(shape: &[usize], buf: &mut [usize], mut f: impl FnMut(&[usize])) {
    if shape.iter().any(|&size| size == 0) {
        return;
    }

    buf.fill(0);
    loop {
        f(buf);

        // Odometer increment with carry, starting at the innermost dimension.
        let mut dim = shape.len();
        loop {
            if dim == 0 {
                return;
            }
            dim -= 1;

            if buf[dim] + 1 < shape[dim] {
                buf[dim] += 1;
                break;
            }
            buf[dim] = 0;
        }
    }
}

/// A dynamically sized tensor holding `f32` elements.
///
/// Tensors are constructed with [`Tensor::from_array_shape_fn`] or [`Tensor::from_iter`]. Data is
/// accessed through [`TensorView`]s: [`Tensor::index`] selects a prefix of the dimensions and
/// returns a view of the remaining ones, and 1-dimensional tensors or views expose their elements
/// via `as_slice`.
#[derive(Clone)]
pub struct Tensor {
    layout: Layout,
    data: Box<[f32]>,
}

/// A borrowed view into a [`Tensor`].
#[derive(Clone)]
pub struct TensorView<'a> {
    layout: Layout,
    data: &'a [f32],
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// This will invoke `f` with successive indices to fill, starting with `[0, ..., 0, 0]`, then
    /// `[0, ..., 0, 1]` and so on. `f` can choose to use or ignore the index vector.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        mut f: F,
    ) -> Self {
        let mut data = Vec::with_capacity(shape.iter().product());
        let mut buf = [0; N];
        for_each_index(&shape, &mut buf, |indices| {
            let mut arr = [0; N];
            arr.copy_from_slice(indices);
            data.push(f(arr));
        });
        Self {
            layout: Layout::from_shape(&shape),
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as specified by `shape` (by multiplying all of
    /// its entries), otherwise this method will panic.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let layout = Layout::from_shape(shape);
        let data: Box<_> = iter.into_iter().collect();
        assert_eq!(data.len(), layout.elements());
        Self { layout, data }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> Self {
        let data = tract.as_slice::<f32>().unwrap();
        Self::from_iter(tract.shape(), data.iter().copied())
    }

    pub(super) fn to_tract(&self) -> tract_onnx::prelude::Tensor {
        tract_onnx::prelude::Tensor::from_shape(self.shape(), &self.data).unwrap()
    }

    /// Returns the shape of this tensor.
    ///
    /// A tensor's shape is the number of entries in each dimension.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Returns the number of dimensions of this tensor.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Returns a [`TensorView`] covering all of `self`.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            layout: self.layout.clone(),
            data: &self.data,
        }
    }

    /// Indexes a prefix of the tensor's dimensions with `indices`.
    ///
    /// See [`TensorView::index`].
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        self.view().index(indices)
    }

    /// Returns the values stored in a 1-dimensional tensor as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &[f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor of shape {:?} as slice",
            self.shape()
        );
        &self.data
    }
}

impl<'d> TensorView<'d> {
    /// Returns the shape of this tensor view.
    ///
    /// The shape is the number of entries in each dimension.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Returns the number of dimensions of this tensor view.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the view's dimensions with `indices`.
    ///
    /// For an example, consider a view of shape `[2, 3, 4, 5]`. Indexing it with 2 indices
    /// `[a, b]` will return a view of shape `[4, 5]`, while indexing it with all 4 indices returns
    /// a view of shape `[]` holding a single value. Indexing with zero indices (`[]`) is also
    /// permitted and returns a view of the unchanged shape.
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'d> {
        assert!(
            N <= self.rank(),
            "attempted to index tensor of shape {:?} with {:?}",
            self.shape(),
            indices
        );

        let mut offset = 0;
        for (dim, &index) in indices.iter().enumerate() {
            assert!(
                index < self.layout.shape[dim],
                "attempted to index tensor of shape {:?} with {:?}",
                self.shape(),
                indices
            );
            offset += index * self.layout.strides[dim];
        }

        let layout = self.layout.remove_prefix(N);
        let len = layout.elements();
        TensorView {
            data: &self.data[offset..offset + len],
            layout,
        }
    }

    /// Returns the values stored in a 1-dimensional view as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &'d [f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor view of shape {:?} as slice",
            self.shape()
        );
        self.data
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .finish()
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_in_row_major_order() {
        let expected = [
            [0, 0, 0],
            [0, 0, 1],
            [0, 0, 2],
            [0, 1, 0],
            [0, 1, 1],
            [0, 1, 2],
        ];

        let mut iter = expected.into_iter();
        let tensor = Tensor::from_array_shape_fn([1, 2, 3], |index| {
            assert_eq!(iter.next(), Some(index));
            0.0
        });
        assert!(iter.next().is_none());
        assert_eq!(tensor.rank(), 3);
        assert_eq!(tensor.shape(), &[1, 2, 3]);
    }

    #[test]
    fn indexing_peels_dimensions() {
        let tensor = Tensor::from_array_shape_fn([2, 3, 4], |[a, b, c]| (a * 12 + b * 4 + c) as f32);

        let plane = tensor.index([1]);
        assert_eq!(plane.shape(), &[3, 4]);

        let row = plane.index([2]);
        assert_eq!(row.shape(), &[4]);
        assert_eq!(row.as_slice(), &[20.0, 21.0, 22.0, 23.0]);

        // Indexing the same row from the tensor directly.
        assert_eq!(tensor.index([1, 2]).as_slice(), &[20.0, 21.0, 22.0, 23.0]);

        // A view with zero indices keeps the shape.
        assert_eq!(plane.index([]).shape(), &[3, 4]);
    }

    #[test]
    fn from_iter_lays_out_rows() {
        let tensor = Tensor::from_iter(&[2, 2], [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(tensor.index([0]).as_slice(), &[0.0, 1.0]);
        assert_eq!(tensor.index([1]).as_slice(), &[2.0, 3.0]);
        assert_eq!(tensor.view().index([1]).as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn empty_dimensions() {
        let tensor = Tensor::from_array_shape_fn([2, 0, 3], |idx| unreachable!("{idx:?}"));
        assert_eq!(tensor.shape(), &[2, 0, 3]);

        let view = tensor.index([1]);
        assert_eq!(view.shape(), &[0, 3]);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_index() {
        let tensor = Tensor::from_iter(&[2, 2], [0.0, 1.0, 2.0, 3.0]);
        tensor.index([2]);
    }

    #[test]
    #[should_panic]
    fn as_slice_requires_rank_1() {
        let tensor = Tensor::from_iter(&[2, 2], [0.0, 1.0, 2.0, 3.0]);
        tensor.as_slice();
    }
}
