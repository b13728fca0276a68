//! Error types for weft-mesh.

use std::fmt;

use weft::DType;

use crate::device::DeviceId;

/// Errors from sharding, placement, and variable loading.
///
/// `Clone` because load failures are stored in resolved futures that any
/// number of waiters read.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Sharding rank does not match the tensor rank.
    RankMismatch { expected: usize, got: usize },
    /// A shard's shape disagrees with the layout computed from the spec.
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    /// Device fan-out implied by the sharding does not match the device list.
    DeviceCountMismatch { expected: usize, got: usize },
    /// A tiled axis does not divide evenly into its tile count.
    UnevenTiling { axis: usize, size: usize, tiles: usize },
    /// Malformed sharding specification.
    InvalidSharding(String),
    /// Device appears more than once in an assignment.
    DuplicateDevice(DeviceId),
    /// Element type not supported by the runtime client.
    UnsupportedDtype(DType),
    /// Named entry missing from a registry.
    NotFound(String),
    /// Device transfer failed while placing or reading a shard.
    Transfer(String),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankMismatch { expected, got } => {
                write!(f, "rank mismatch: expected {expected}, got {got}")
            }
            Self::ShapeMismatch { expected, got } => {
                write!(f, "shard shape mismatch: expected {expected:?}, got {got:?}")
            }
            Self::DeviceCountMismatch { expected, got } => {
                write!(f, "device count mismatch: sharding implies {expected}, got {got}")
            }
            Self::UnevenTiling { axis, size, tiles } => {
                write!(f, "axis {axis} of size {size} does not divide into {tiles} tiles")
            }
            Self::InvalidSharding(msg) => write!(f, "invalid sharding: {msg}"),
            Self::DuplicateDevice(id) => write!(f, "{id} appears more than once"),
            Self::UnsupportedDtype(dtype) => {
                write!(f, "element type {dtype:?} not supported by the runtime")
            }
            Self::NotFound(name) => write!(f, "no entry for '{name}'"),
            Self::Transfer(msg) => write!(f, "device transfer failed: {msg}"),
        }
    }
}

impl std::error::Error for MeshError {}
