//! Sharding specifications and per-device shard layout.
//!
//! A [`Sharding`] describes how a tensor's axes are replicated and/or
//! tiled across an ordered device assignment. [`Sharding::layout`] turns
//! it into one [`ShardDescriptor`] per device position, which is all the
//! transfer paths need: shard shape, offsets into the global tensor, and
//! whether the shard is a replica of an earlier one.

use serde::{Deserialize, Serialize};

use weft::Shape;

use crate::error::MeshError;

/// How a single tensor is distributed across devices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Sharding {
    /// Full copy on every device.
    Replicated,
    /// Tile grid over the tensor axes, optionally replicated as a whole.
    ///
    /// `tiles[d]` splits axis `d` into that many equal contiguous ranges;
    /// a count of 1 leaves the axis whole (partial tiling). The grid is
    /// enumerated row-major, and each tile occupies `replicas` consecutive
    /// device positions, so the implied fan-out is
    /// `product(tiles) * replicas`.
    Tiled { tiles: Vec<usize>, replicas: usize },
}

/// Shape, position, and replica role of one device's shard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardDescriptor {
    /// Shard extent along each tensor axis.
    pub shape: Vec<usize>,
    /// Per-axis element offset of the shard in the global tensor.
    pub offsets: Vec<usize>,
    /// `Some(i)` if this shard holds the same data as shard `i` on an
    /// earlier device position. Read-back skips replicas entirely.
    pub replica_of: Option<usize>,
}

impl ShardDescriptor {
    /// Flat row-major element offset of the shard's first element in the
    /// global tensor.
    pub fn host_offset(&self, global: &Shape) -> usize {
        self.offsets
            .iter()
            .zip(global.contiguous_strides())
            .map(|(o, s)| o * s)
            .sum()
    }

    /// Number of elements in this shard.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

impl Sharding {
    /// Fully tiled spec with no replication.
    pub fn tiled(tiles: Vec<usize>) -> Self {
        Self::Tiled { tiles, replicas: 1 }
    }

    pub fn is_replicated(&self) -> bool {
        matches!(self, Self::Replicated)
    }

    /// Shard count this spec implies for `device_count` devices.
    ///
    /// `Replicated` adapts to any device count; `Tiled` is fixed by its
    /// grid and replica factor.
    pub fn fan_out(&self, device_count: usize) -> usize {
        match self {
            Self::Replicated => device_count,
            Self::Tiled { tiles, replicas } => tiles.iter().product::<usize>() * replicas,
        }
    }

    /// Compute one shard descriptor per device position.
    ///
    /// Validates the spec against the global shape and the device count;
    /// a tiled axis that does not divide evenly is an error, never a
    /// truncation.
    pub fn layout(
        &self,
        global: &Shape,
        device_count: usize,
    ) -> Result<Vec<ShardDescriptor>, MeshError> {
        if device_count == 0 {
            return Err(MeshError::DeviceCountMismatch {
                expected: self.fan_out(1).max(1),
                got: 0,
            });
        }

        match self {
            Self::Replicated => {
                let shape = global.dims().to_vec();
                let offsets = vec![0; global.ndim()];
                Ok((0..device_count)
                    .map(|i| ShardDescriptor {
                        shape: shape.clone(),
                        offsets: offsets.clone(),
                        replica_of: (i > 0).then_some(0),
                    })
                    .collect())
            }
            Self::Tiled { tiles, replicas } => {
                if tiles.len() != global.ndim() {
                    return Err(MeshError::RankMismatch {
                        expected: global.ndim(),
                        got: tiles.len(),
                    });
                }
                if *replicas == 0 {
                    return Err(MeshError::InvalidSharding(
                        "replica count must be at least 1".into(),
                    ));
                }
                if tiles.iter().any(|&t| t == 0) {
                    return Err(MeshError::InvalidSharding(
                        "tile counts must be at least 1".into(),
                    ));
                }

                let fan_out = tiles.iter().product::<usize>() * replicas;
                if fan_out != device_count {
                    return Err(MeshError::DeviceCountMismatch {
                        expected: fan_out,
                        got: device_count,
                    });
                }

                let mut extent = Vec::with_capacity(tiles.len());
                for (axis, (&size, &t)) in global.dims().iter().zip(tiles).enumerate() {
                    if size % t != 0 {
                        return Err(MeshError::UnevenTiling { axis, size, tiles: t });
                    }
                    extent.push(size / t);
                }

                let tile_count: usize = tiles.iter().product();
                let mut shards = Vec::with_capacity(device_count);
                for tile in 0..tile_count {
                    // Decompose the row-major tile index into per-axis
                    // tile coordinates.
                    let mut rem = tile;
                    let mut coord = vec![0usize; tiles.len()];
                    for d in (0..tiles.len()).rev() {
                        coord[d] = rem % tiles[d];
                        rem /= tiles[d];
                    }
                    let offsets: Vec<usize> =
                        coord.iter().zip(&extent).map(|(c, e)| c * e).collect();

                    for r in 0..*replicas {
                        shards.push(ShardDescriptor {
                            shape: extent.clone(),
                            offsets: offsets.clone(),
                            replica_of: (r > 0).then_some(tile * replicas),
                        });
                    }
                }
                Ok(shards)
            }
        }
    }
}
