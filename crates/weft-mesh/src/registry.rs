//! Name-keyed registries shared between restore and serving paths.
//!
//! Both registries are first-writer-wins: at most one caller obtains the
//! promise for a name, and everyone else observes that caller's result
//! through the shared future cell.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use weft::Tensor;

use crate::error::MeshError;
use crate::future::{FutureValue, Promise};
use crate::runtime::DeviceArray;

/// Future host tensor produced by a checkpoint restore.
pub type TensorFuture = FutureValue<Result<Tensor, MeshError>>;

/// Future device array produced by variable loading.
pub type ArrayFuture = FutureValue<Result<DeviceArray, MeshError>>;

/// Tensors the restore path has promised to produce, keyed by runtime
/// name.
#[derive(Default)]
pub struct RestoreTensorRegistry {
    entries: RwLock<HashMap<String, TensorFuture>>,
}

impl RestoreTensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a name, returning the promise to resolve it.
    ///
    /// `None` means another caller already holds the name; its future is
    /// the one [`RestoreTensorRegistry::get`] hands out.
    pub async fn register(&self, name: &str) -> Option<Promise<Result<Tensor, MeshError>>> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(name) {
            return None;
        }
        let (promise, value) = Promise::channel();
        entries.insert(name.to_string(), value);
        debug!(name, "registered restore tensor");
        Some(promise)
    }

    /// Future for a registered name.
    pub async fn get(&self, name: &str) -> Option<TensorFuture> {
        self.entries.read().await.get(name).cloned()
    }
}

/// Device arrays built from restored variables, keyed by runtime name.
#[derive(Default)]
pub struct LoadedVariableRegistry {
    entries: RwLock<HashMap<String, ArrayFuture>>,
}

impl LoadedVariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a name, returning the promise to resolve it.
    ///
    /// Concurrent callers race; exactly one receives `Some` and owns the
    /// load, the rest share its outcome via [`LoadedVariableRegistry::get`].
    pub async fn insert_if_absent(
        &self,
        name: &str,
    ) -> Option<Promise<Result<DeviceArray, MeshError>>> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(name) {
            return None;
        }
        let (promise, value) = Promise::channel();
        entries.insert(name.to_string(), value);
        debug!(name, "claimed loaded variable slot");
        Some(promise)
    }

    /// Future for a claimed name.
    pub async fn get(&self, name: &str) -> Option<ArrayFuture> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft::{DType, Shape};

    #[tokio::test]
    async fn restore_register_is_exclusive() {
        let registry = RestoreTensorRegistry::new();
        let promise = registry.register("model/w__w").await;
        assert!(promise.is_some());
        assert!(registry.register("model/w__w").await.is_none());

        let future = registry.get("model/w__w").await.unwrap();
        assert_eq!(future.peek(), None);

        let tensor = Tensor::zeros(DType::F32, Shape::from_slice(&[2]));
        promise.unwrap().set(Ok(tensor.clone()));
        assert_eq!(future.wait().await, Ok(tensor));
    }

    #[tokio::test]
    async fn get_unknown_name() {
        let registry = RestoreTensorRegistry::new();
        assert!(registry.get("missing").await.is_none());

        let loaded = LoadedVariableRegistry::new();
        assert!(loaded.get("missing").await.is_none());
        assert!(!loaded.contains("missing").await);
        assert!(loaded.is_empty().await);
    }

    #[tokio::test]
    async fn loaded_insert_if_absent_races_once() {
        let registry = std::sync::Arc::new(LoadedVariableRegistry::new());
        let claims: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.insert_if_absent("v").await.is_some() })
            })
            .collect();

        let mut winners = 0;
        for claim in claims {
            if claim.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains("v").await);
    }

    #[tokio::test]
    async fn loaded_failure_is_shared() {
        let registry = LoadedVariableRegistry::new();
        let promise = registry.insert_if_absent("v").await.unwrap();
        let future = registry.get("v").await.unwrap();

        promise.set(Err(MeshError::NotFound("v".into())));
        assert_eq!(future.wait().await, Err(MeshError::NotFound("v".into())));
    }
}
