//! Runtime client boundary and distributed array handles.
//!
//! The runtime that actually owns device memory sits behind
//! [`RuntimeClient`]. [`HostRuntime`] is the in-process implementation
//! backed by host memory, used by tests and single-host serving the same
//! way a real device runtime would be.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use weft::{DType, Shape};

use crate::device::DeviceId;
use crate::error::MeshError;

/// Opaque identifier for a device-resident buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Boundary to the runtime that owns device memory.
///
/// Implementations are internally thread-safe; per-shard calls arrive
/// concurrently from pool workers.
pub trait RuntimeClient: Send + Sync {
    /// Whether the runtime can represent `dtype` on device.
    fn supports(&self, dtype: DType) -> bool {
        let _ = dtype;
        true
    }

    /// Place one shard's bytes on `device`, returning a buffer handle.
    fn place(
        &self,
        device: DeviceId,
        dtype: DType,
        shape: &[usize],
        bytes: Vec<u8>,
    ) -> Result<BufferId, MeshError>;

    /// Read a previously placed buffer back into host memory.
    fn read(&self, buffer: BufferId) -> Result<Vec<u8>, MeshError>;

    /// Release a buffer. Called when the owning array drops.
    fn release(&self, buffer: BufferId);
}

/// One device-resident shard of a [`DeviceArray`].
#[derive(Clone, Debug)]
pub struct ArrayShard {
    pub device: DeviceId,
    pub shape: Vec<usize>,
    pub buffer: BufferId,
}

struct ArrayInner {
    client: Arc<dyn RuntimeClient>,
    dtype: DType,
    global_shape: Shape,
    shards: Vec<ArrayShard>,
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        for shard in &self.shards {
            self.client.release(shard.buffer);
        }
    }
}

/// Handle to a tensor split across device buffers.
///
/// Cloning shares the buffers; the last handle dropped releases them on
/// the runtime client.
#[derive(Clone)]
pub struct DeviceArray {
    inner: Arc<ArrayInner>,
}

impl PartialEq for DeviceArray {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl DeviceArray {
    pub(crate) fn new(
        client: Arc<dyn RuntimeClient>,
        dtype: DType,
        global_shape: Shape,
        shards: Vec<ArrayShard>,
    ) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                client,
                dtype,
                global_shape,
                shards,
            }),
        }
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn global_shape(&self) -> &Shape {
        &self.inner.global_shape
    }

    pub fn shards(&self) -> &[ArrayShard] {
        &self.inner.shards
    }

    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    pub(crate) fn client(&self) -> &Arc<dyn RuntimeClient> {
        &self.inner.client
    }
}

impl fmt::Debug for DeviceArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceArray")
            .field("dtype", &self.inner.dtype)
            .field("global_shape", &self.inner.global_shape)
            .field("shards", &self.inner.shards.len())
            .finish()
    }
}

struct HostBuffer {
    device: DeviceId,
    bytes: Vec<u8>,
}

/// In-process runtime backed by host memory.
#[derive(Default)]
pub struct HostRuntime {
    buffers: RwLock<HashMap<BufferId, HostBuffer>>,
    next_id: AtomicU64,
}

impl HostRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live buffers, across all devices.
    pub fn buffer_count(&self) -> usize {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Device a live buffer sits on.
    pub fn device_of(&self, buffer: BufferId) -> Option<DeviceId> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&buffer)
            .map(|b| b.device)
    }
}

impl RuntimeClient for HostRuntime {
    fn place(
        &self,
        device: DeviceId,
        dtype: DType,
        shape: &[usize],
        bytes: Vec<u8>,
    ) -> Result<BufferId, MeshError> {
        let expected = shape.iter().product::<usize>() * dtype.size_bytes();
        if bytes.len() != expected {
            return Err(MeshError::Transfer(format!(
                "buffer of {} bytes for shard shape {shape:?} ({expected} expected)",
                bytes.len()
            )));
        }

        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, HostBuffer { device, bytes });
        debug!(%device, buffer = id.0, "placed shard buffer");
        Ok(id)
    }

    fn read(&self, buffer: BufferId) -> Result<Vec<u8>, MeshError> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&buffer)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| MeshError::Transfer(format!("unknown buffer {}", buffer.0)))
    }

    fn release(&self, buffer: BufferId) {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_read_release() {
        let runtime = HostRuntime::new();
        let id = runtime
            .place(DeviceId(0), DType::U8, &[4], vec![1, 2, 3, 4])
            .unwrap();
        assert_eq!(runtime.read(id).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(runtime.device_of(id), Some(DeviceId(0)));

        runtime.release(id);
        assert_eq!(runtime.buffer_count(), 0);
        assert!(matches!(runtime.read(id), Err(MeshError::Transfer(_))));
    }

    #[test]
    fn place_validates_byte_length() {
        let runtime = HostRuntime::new();
        let err = runtime
            .place(DeviceId(0), DType::F32, &[2, 2], vec![0u8; 4])
            .unwrap_err();
        assert!(matches!(err, MeshError::Transfer(_)));
    }

    #[test]
    fn array_drop_releases_buffers() {
        let runtime = Arc::new(HostRuntime::new());
        let b0 = runtime
            .place(DeviceId(0), DType::U8, &[2], vec![1, 2])
            .unwrap();
        let b1 = runtime
            .place(DeviceId(1), DType::U8, &[2], vec![3, 4])
            .unwrap();
        assert_eq!(runtime.buffer_count(), 2);

        let array = DeviceArray::new(
            runtime.clone() as Arc<dyn RuntimeClient>,
            DType::U8,
            Shape::from_slice(&[4]),
            vec![
                ArrayShard {
                    device: DeviceId(0),
                    shape: vec![2],
                    buffer: b0,
                },
                ArrayShard {
                    device: DeviceId(1),
                    shape: vec![2],
                    buffer: b1,
                },
            ],
        );

        let clone = array.clone();
        drop(array);
        assert_eq!(runtime.buffer_count(), 2); // still referenced

        drop(clone);
        assert_eq!(runtime.buffer_count(), 0);
    }
}
