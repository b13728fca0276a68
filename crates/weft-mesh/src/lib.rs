//! Sharded tensor placement across devices.
//!
//! `weft-mesh` takes host tensors from the `weft` core and distributes
//! them across an ordered device assignment: a [`Sharding`] spec is
//! interpreted into per-device shard layouts, shards move through a
//! [`RuntimeClient`] onto devices as a [`DeviceArray`], and the reverse
//! path reassembles the host tensor. On top of that sits the
//! restored-variable pipeline: name-keyed registries plus
//! [`load_restored_variable`], which shards checkpoint tensors onto
//! devices exactly once per variable, no matter how many requests race.

pub mod device;
pub mod error;
pub mod future;
pub mod loader;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod sharding;
pub mod transfer;

pub use device::{DeviceId, DeviceList};
pub use error::MeshError;
pub use future::{FutureValue, Promise};
pub use loader::{load_restored_variable, VariableHandle, VariableShardingConfig};
pub use queue::WorkQueue;
pub use registry::{ArrayFuture, LoadedVariableRegistry, RestoreTensorRegistry, TensorFuture};
pub use runtime::{ArrayShard, BufferId, DeviceArray, HostRuntime, RuntimeClient};
pub use sharding::{ShardDescriptor, Sharding};
pub use transfer::{make_array_from_tensor, make_array_from_tensor_on, make_tensor_from_array};
