use alloc::vec::Vec;

use crate::{DType, Element, Shape};

/// Dense row-major host tensor, erased over element type.
///
/// Storage is a flat byte buffer of `numel * dtype.size_bytes()` bytes in
/// native byte order. The buffer is always contiguous; block extraction
/// copies, it never aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: Shape,
    data: Vec<u8>,
}

impl Tensor {
    /// Create a tensor from raw bytes and shape.
    pub fn new(dtype: DType, shape: Shape, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), shape.numel() * dtype.size_bytes());
        Self { dtype, shape, data }
    }

    /// Create a zero-filled tensor.
    pub fn zeros(dtype: DType, shape: Shape) -> Self {
        let n = shape.numel() * dtype.size_bytes();
        Self {
            dtype,
            shape,
            data: alloc::vec![0u8; n],
        }
    }

    /// Create a tensor from typed values.
    pub fn from_vec<S: Element>(values: Vec<S>, shape: Shape) -> Self {
        Self::new(S::DTYPE, shape, bytemuck::cast_slice(&values).to_vec())
    }

    /// 1-D tensor from a typed slice.
    pub fn from_slice<S: Element>(values: &[S]) -> Self {
        Self::from_vec(values.to_vec(), Shape::from_slice(&[values.len()]))
    }

    /// Scalar tensor.
    pub fn scalar<S: Element>(value: S) -> Self {
        Self::from_vec(alloc::vec![value], Shape::scalar())
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }
    pub fn shape(&self) -> &Shape {
        &self.shape
    }
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the tensor, returning its byte storage.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Copy the elements out as a typed vector.
    ///
    /// Reads element-wise because the byte buffer carries no alignment
    /// guarantee for wider scalars.
    pub fn to_vec<S: Element>(&self) -> Vec<S> {
        assert_eq!(self.dtype, S::DTYPE);
        self.data
            .chunks_exact(self.dtype.size_bytes())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Element at a multi-index.
    pub fn get<S: Element>(&self, idx: &[usize]) -> S {
        assert_eq!(self.dtype, S::DTYPE);
        assert_eq!(idx.len(), self.ndim());
        let flat: usize = idx
            .iter()
            .zip(self.shape.contiguous_strides())
            .map(|(i, s)| i * s)
            .sum();
        let size = self.dtype.size_bytes();
        bytemuck::pod_read_unaligned(&self.data[flat * size..(flat + 1) * size])
    }

    /// Extract the block spanning `[offsets[d], offsets[d] + dims[d])` on
    /// every axis, as a new contiguous tensor of shape `dims`.
    pub fn slice(&self, offsets: &[usize], dims: &[usize]) -> Tensor {
        assert_eq!(offsets.len(), self.ndim());
        assert_eq!(dims.len(), self.ndim());
        for d in 0..self.ndim() {
            assert!(offsets[d] + dims[d] <= self.shape[d]);
        }

        let out_shape = Shape::from_slice(dims);
        let elem = self.dtype.size_bytes();
        let mut out = alloc::vec![0u8; out_shape.numel() * elem];
        for_each_row(&self.shape, offsets, dims, elem, |tensor_pos, block_pos, len| {
            out[block_pos..block_pos + len]
                .copy_from_slice(&self.data[tensor_pos..tensor_pos + len]);
        });
        Tensor::new(self.dtype, out_shape, out)
    }

    /// Write `block` into this tensor with its origin at `offsets`.
    pub fn write_block(&mut self, offsets: &[usize], block: &Tensor) {
        assert_eq!(self.dtype, block.dtype);
        assert_eq!(offsets.len(), self.ndim());
        assert_eq!(block.ndim(), self.ndim());
        for d in 0..self.ndim() {
            assert!(offsets[d] + block.shape[d] <= self.shape[d]);
        }

        let elem = self.dtype.size_bytes();
        let data = &mut self.data;
        for_each_row(
            &self.shape,
            offsets,
            block.shape.dims(),
            elem,
            |tensor_pos, block_pos, len| {
                data[tensor_pos..tensor_pos + len]
                    .copy_from_slice(&block.data[block_pos..block_pos + len]);
            },
        );
    }
}

/// Visit the byte ranges a block copy touches: one call per contiguous
/// row. The innermost axis is contiguous in both the strided tensor and
/// the packed block, so each row is a single memcpy; the outer axes step
/// through a multi-index.
fn for_each_row(
    tensor_shape: &Shape,
    offsets: &[usize],
    dims: &[usize],
    elem: usize,
    mut copy: impl FnMut(usize, usize, usize),
) {
    let n = dims.len();
    if n == 0 {
        copy(0, 0, elem);
        return;
    }

    let strides = tensor_shape.contiguous_strides();
    let row_bytes = dims[n - 1] * elem;
    let outer: usize = dims[..n - 1].iter().product();
    let mut idx = alloc::vec![0usize; n - 1];
    let mut block_pos = 0usize;

    for _ in 0..outer {
        let base: usize = (0..n - 1)
            .map(|d| (offsets[d] + idx[d]) * strides[d])
            .sum::<usize>()
            + offsets[n - 1] * strides[n - 1];
        copy(base * elem, block_pos, row_bytes);
        block_pos += row_bytes;

        // Increment the outer multi-index.
        for d in (0..n - 1).rev() {
            idx[d] += 1;
            if idx[d] < dims[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn sequential_4x4() -> Tensor {
        Tensor::from_vec((0..16).collect::<Vec<i32>>(), Shape::from_slice(&[4, 4]))
    }

    #[test]
    fn typed_round_trip() {
        let t = Tensor::from_vec(vec![1.5f32, -2.0, 0.25], Shape::from_slice(&[3]));
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.to_vec::<f32>(), vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn get_by_multi_index() {
        let t = sequential_4x4();
        assert_eq!(t.get::<i32>(&[0, 0]), 0);
        assert_eq!(t.get::<i32>(&[1, 2]), 6);
        assert_eq!(t.get::<i32>(&[3, 3]), 15);
    }

    #[test]
    fn slice_quadrants() {
        let t = sequential_4x4();
        assert_eq!(t.slice(&[0, 0], &[2, 2]).to_vec::<i32>(), vec![0, 1, 4, 5]);
        assert_eq!(t.slice(&[0, 2], &[2, 2]).to_vec::<i32>(), vec![2, 3, 6, 7]);
        assert_eq!(
            t.slice(&[2, 0], &[2, 2]).to_vec::<i32>(),
            vec![8, 9, 12, 13]
        );
        assert_eq!(
            t.slice(&[2, 2], &[2, 2]).to_vec::<i32>(),
            vec![10, 11, 14, 15]
        );
    }

    #[test]
    fn slice_full_is_identity() {
        let t = sequential_4x4();
        assert_eq!(t.slice(&[0, 0], &[4, 4]), t);
    }

    #[test]
    fn write_block_round_trip() {
        let t = sequential_4x4();
        let mut rebuilt = Tensor::zeros(DType::I32, Shape::from_slice(&[4, 4]));
        for (r, c) in [(0, 0), (0, 2), (2, 0), (2, 2)] {
            let block = t.slice(&[r, c], &[2, 2]);
            rebuilt.write_block(&[r, c], &block);
        }
        assert_eq!(rebuilt, t);
    }

    #[test]
    fn slice_three_dim() {
        let t = Tensor::from_vec((0..24).collect::<Vec<i32>>(), Shape::from_slice(&[2, 3, 4]));
        let b = t.slice(&[1, 1, 2], &[1, 2, 2]);
        assert_eq!(b.to_vec::<i32>(), vec![18, 19, 22, 23]);
    }

    #[test]
    fn scalar_block_copy() {
        let t = Tensor::scalar(7i64);
        let b = t.slice(&[], &[]);
        assert_eq!(b.to_vec::<i64>(), vec![7]);

        let mut out = Tensor::zeros(DType::I64, Shape::scalar());
        out.write_block(&[], &b);
        assert_eq!(out.get::<i64>(&[]), 7);
    }

    #[test]
    fn zero_sized_slice() {
        let t = sequential_4x4();
        let b = t.slice(&[1, 1], &[0, 2]);
        assert_eq!(b.numel(), 0);
        assert!(b.bytes().is_empty());
    }
}
