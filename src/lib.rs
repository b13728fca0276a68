//! weft — host tensor foundation for sharded serving.
//!
//! Dense, row-major, dtype-erased tensors plus the block operations the
//! distributed layer needs: extracting a shard-sized block at an offset
//! and writing one back. Element storage is a flat byte buffer; typed
//! access goes through the [`Element`] trait.
//!
//! Tensor algebra is out of scope. This crate only knows shapes, strides,
//! element types, and block copies.

#![no_std]

extern crate alloc;

mod dtype;
mod shape;
mod tensor;

pub use dtype::{DType, Element};
pub use shape::Shape;
pub use tensor::Tensor;
