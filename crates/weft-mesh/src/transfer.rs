//! Host-to-device shard transfer and back.
//!
//! The constructor slices a host tensor per its sharding layout and
//! places every shard on its device; the disassembler reads primary
//! shards back and reassembles the host tensor. Per-shard work runs on
//! the worker pool; nothing returns until every shard settled.

use std::sync::Arc;

use futures_util::future;
use tracing::debug;

use weft::{Shape, Tensor};

use crate::device::{DeviceId, DeviceList};
use crate::error::MeshError;
use crate::queue::WorkQueue;
use crate::runtime::{ArrayShard, DeviceArray, RuntimeClient};
use crate::sharding::Sharding;

/// Shard `tensor` per `sharding` and place it on `device_ids`, in the
/// given order.
pub async fn make_array_from_tensor(
    client: Arc<dyn RuntimeClient>,
    tensor: &Tensor,
    device_ids: &[DeviceId],
    sharding: &Sharding,
    pool: &WorkQueue,
) -> Result<DeviceArray, MeshError> {
    let devices = DeviceList::from_ids(device_ids)?;
    make_array_on_devices(client, tensor, &devices, sharding, pool).await
}

/// Variant of [`make_array_from_tensor`] taking a pre-built device order.
pub async fn make_array_from_tensor_on(
    client: Arc<dyn RuntimeClient>,
    tensor: &Tensor,
    devices: &DeviceList,
    sharding: &Sharding,
    pool: &WorkQueue,
) -> Result<DeviceArray, MeshError> {
    make_array_on_devices(client, tensor, devices, sharding, pool).await
}

async fn make_array_on_devices(
    client: Arc<dyn RuntimeClient>,
    tensor: &Tensor,
    devices: &DeviceList,
    sharding: &Sharding,
    pool: &WorkQueue,
) -> Result<DeviceArray, MeshError> {
    let dtype = tensor.dtype();
    if !client.supports(dtype) {
        return Err(MeshError::UnsupportedDtype(dtype));
    }
    let layout = sharding.layout(tensor.shape(), devices.len())?;

    // One copy of the host tensor shared by all shard tasks; each task
    // slices its own block out of it.
    let source = Arc::new(tensor.clone());
    let pending: Vec<_> = layout
        .into_iter()
        .zip(devices.iter())
        .map(|(desc, device)| {
            let source = Arc::clone(&source);
            let client = Arc::clone(&client);
            pool.submit(move || {
                let block = source.slice(&desc.offsets, &desc.shape);
                client
                    .place(device, dtype, &desc.shape, block.into_bytes())
                    .map(|buffer| ArrayShard {
                        device,
                        shape: desc.shape,
                        buffer,
                    })
            })
        })
        .collect();

    let results = future::join_all(pending.iter().map(|p| p.wait())).await;

    let mut shards = Vec::with_capacity(results.len());
    let mut failure = None;
    for result in results {
        match result {
            Ok(shard) => shards.push(shard),
            Err(e) => failure = Some(e),
        }
    }
    if let Some(e) = failure {
        // No partial arrays: anything already placed goes back.
        for shard in shards {
            client.release(shard.buffer);
        }
        return Err(e);
    }

    debug!(
        shards = shards.len(),
        shape = ?tensor.shape().dims(),
        "placed device array"
    );
    Ok(DeviceArray::new(client, dtype, tensor.shape().clone(), shards))
}

/// Reassemble one host tensor from `array`'s shards.
///
/// `devices` must be exactly the order the array was built with; the
/// layout is re-derived from it, not from the array. When replication
/// put identical copies on several devices, only the first device in
/// order is read.
pub async fn make_tensor_from_array(
    array: &DeviceArray,
    sharding: &Sharding,
    devices: &DeviceList,
    pool: &WorkQueue,
) -> Result<Tensor, MeshError> {
    let layout = sharding.layout(array.global_shape(), devices.len())?;
    if layout.len() != array.shard_count() {
        return Err(MeshError::DeviceCountMismatch {
            expected: layout.len(),
            got: array.shard_count(),
        });
    }
    for (desc, shard) in layout.iter().zip(array.shards()) {
        if desc.shape != shard.shape {
            return Err(MeshError::ShapeMismatch {
                expected: desc.shape.clone(),
                got: shard.shape.clone(),
            });
        }
    }

    let dtype = array.dtype();
    let pending: Vec<_> = layout
        .into_iter()
        .enumerate()
        .filter(|(_, desc)| desc.replica_of.is_none())
        .map(|(i, desc)| {
            let client = Arc::clone(array.client());
            let buffer = array.shards()[i].buffer;
            pool.submit(move || client.read(buffer).map(|bytes| (desc, bytes)))
        })
        .collect();

    let mut out = Tensor::zeros(dtype, array.global_shape().clone());
    for result in future::join_all(pending.iter().map(|p| p.wait())).await {
        let (desc, bytes) = result?;
        let expected = desc.numel() * dtype.size_bytes();
        if bytes.len() != expected {
            return Err(MeshError::Transfer(format!(
                "shard read returned {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        let block = Tensor::new(dtype, Shape::from_slice(&desc.shape), bytes);
        out.write_block(&desc.offsets, &block);
    }
    Ok(out)
}
