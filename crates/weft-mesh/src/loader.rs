//! Restored-variable loading onto devices.
//!
//! Bridges the two registries: once the restore path resolves a host
//! tensor, a loader task shards it onto devices and publishes the
//! resulting array under the variable's runtime name. Loading is
//! deduplicated per name; concurrent requests converge on one array.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::DeviceList;
use crate::error::MeshError;
use crate::queue::WorkQueue;
use crate::registry::{LoadedVariableRegistry, RestoreTensorRegistry};
use crate::runtime::RuntimeClient;
use crate::sharding::Sharding;
use crate::transfer::make_array_from_tensor_on;

/// Identity of a variable as the serving graph names it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableHandle {
    pub container: String,
    pub name: String,
}

impl VariableHandle {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Registry key for this variable. Container and name combine into a
    /// single stable string so distinct containers never collide.
    pub fn runtime_name(&self) -> String {
        format!("{}__{}", self.container, self.name)
    }
}

/// Where and how a loaded variable should live on devices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableShardingConfig {
    pub devices: DeviceList,
    pub sharding: Sharding,
}

/// Ensure the variable behind `handle` is (or will be) resident on
/// devices.
///
/// Returns as soon as the load is claimed or found claimed; the transfer
/// itself runs on `loader_queue` once the restored tensor resolves.
/// Callers observe completion through
/// [`LoadedVariableRegistry::get`]. A name with no registered restore
/// tensor is an error and leaves the loaded registry untouched.
pub async fn load_restored_variable(
    handle: &VariableHandle,
    client: Arc<dyn RuntimeClient>,
    pool: &WorkQueue,
    config: VariableShardingConfig,
    restore_registry: &RestoreTensorRegistry,
    loaded_registry: &Arc<LoadedVariableRegistry>,
    loader_queue: &WorkQueue,
) -> Result<(), MeshError> {
    let name = handle.runtime_name();

    let restored = restore_registry
        .get(&name)
        .await
        .ok_or_else(|| MeshError::NotFound(name.clone()))?;

    let promise = match loaded_registry.insert_if_absent(&name).await {
        Some(promise) => promise,
        None => {
            debug!(%name, "variable load already in flight");
            return Ok(());
        }
    };

    let pool = pool.clone();
    let task_name = name.clone();
    let scheduled = loader_queue.schedule(async move {
        let result = match restored.wait().await {
            Ok(tensor) => {
                make_array_from_tensor_on(
                    client,
                    &tensor,
                    &config.devices,
                    &config.sharding,
                    &pool,
                )
                .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(name = %task_name, error = %e, "variable load failed");
        } else {
            debug!(name = %task_name, "variable loaded");
        }
        promise.set(result);
    });
    if !scheduled {
        warn!(%name, "loader queue is shut down; load will never resolve");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::runtime::HostRuntime;
    use weft::{Shape, Tensor};

    fn config(n: u32) -> VariableShardingConfig {
        let ids: Vec<_> = (0..n).map(DeviceId).collect();
        VariableShardingConfig {
            devices: DeviceList::from_ids(&ids).unwrap(),
            sharding: Sharding::Replicated,
        }
    }

    #[test]
    fn runtime_name_separates_containers() {
        let a = VariableHandle::new("serving", "w");
        let b = VariableHandle::new("training", "w");
        assert_eq!(a.runtime_name(), "serving__w");
        assert_ne!(a.runtime_name(), b.runtime_name());
    }

    #[tokio::test]
    async fn missing_restore_entry_is_not_found() {
        let handle = VariableHandle::new("c", "v");
        let runtime = Arc::new(HostRuntime::new());
        let pool = WorkQueue::new(2);
        let restore = RestoreTensorRegistry::new();
        let loaded = Arc::new(LoadedVariableRegistry::new());

        let err = load_restored_variable(
            &handle,
            runtime,
            &pool,
            config(1),
            &restore,
            &loaded,
            &pool,
        )
        .await
        .unwrap_err();
        assert_eq!(err, MeshError::NotFound("c__v".into()));
        assert!(loaded.is_empty().await);
    }

    #[tokio::test]
    async fn load_resolves_after_restore() {
        let handle = VariableHandle::new("c", "v");
        let runtime = Arc::new(HostRuntime::new());
        let pool = WorkQueue::new(2);
        let loader_queue = WorkQueue::new(1);
        let restore = RestoreTensorRegistry::new();
        let loaded = Arc::new(LoadedVariableRegistry::new());

        let promise = restore.register(&handle.runtime_name()).await.unwrap();

        load_restored_variable(
            &handle,
            runtime.clone(),
            &pool,
            config(2),
            &restore,
            &loaded,
            &loader_queue,
        )
        .await
        .unwrap();

        let future = loaded.get(&handle.runtime_name()).await.unwrap();
        assert_eq!(future.peek(), None);

        let tensor = Tensor::from_vec(vec![1i32, 2, 3], Shape::from_slice(&[3]));
        promise.set(Ok(tensor));

        let array = future.wait().await.unwrap();
        assert_eq!(array.shard_count(), 2);
        assert_eq!(runtime.buffer_count(), 2);
    }

    #[tokio::test]
    async fn restore_failure_propagates() {
        let handle = VariableHandle::new("c", "bad");
        let runtime = Arc::new(HostRuntime::new());
        let pool = WorkQueue::new(2);
        let restore = RestoreTensorRegistry::new();
        let loaded = Arc::new(LoadedVariableRegistry::new());

        let promise = restore.register(&handle.runtime_name()).await.unwrap();
        promise.set(Err(MeshError::Transfer("checkpoint unreadable".into())));

        load_restored_variable(
            &handle,
            runtime.clone(),
            &pool,
            config(1),
            &restore,
            &loaded,
            &pool,
        )
        .await
        .unwrap();

        let result = loaded.get(&handle.runtime_name()).await.unwrap().wait().await;
        assert_eq!(
            result,
            Err(MeshError::Transfer("checkpoint unreadable".into()))
        );
        assert_eq!(runtime.buffer_count(), 0);
    }

    #[tokio::test]
    async fn second_load_is_a_no_op() {
        let handle = VariableHandle::new("c", "v");
        let runtime = Arc::new(HostRuntime::new());
        let pool = WorkQueue::new(2);
        let restore = RestoreTensorRegistry::new();
        let loaded = Arc::new(LoadedVariableRegistry::new());

        let promise = restore.register(&handle.runtime_name()).await.unwrap();
        promise.set(Ok(Tensor::from_vec(vec![5i32], Shape::from_slice(&[1]))));

        for _ in 0..2 {
            load_restored_variable(
                &handle,
                runtime.clone(),
                &pool,
                config(1),
                &restore,
                &loaded,
                &pool,
            )
            .await
            .unwrap();
        }

        let array = loaded
            .get(&handle.runtime_name())
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(array.shard_count(), 1);
        assert_eq!(loaded.len().await, 1);
        assert_eq!(runtime.buffer_count(), 1);
    }
}
