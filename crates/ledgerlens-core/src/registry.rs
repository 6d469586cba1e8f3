//! Kernel registry.
//!
//! Detector crates register their kernel metadata here so tools can list
//! what an engine build is able to report.

use crate::anomaly::AnomalyType;
use crate::error::{EngineError, Result};
use crate::kernel::{KernelMetadata, Stage};
use hashbrown::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Total number of registered kernels.
    pub total: usize,
    /// Kernels by stage.
    pub by_stage: HashMap<Stage, usize>,
}

/// Central registry for kernel metadata.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    kernels: RwLock<HashMap<String, KernelMetadata>>,
}

impl KernelRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register kernel metadata.
    pub fn register_metadata(&self, metadata: KernelMetadata) -> Result<()> {
        let mut kernels = self.kernels.write().unwrap_or_else(PoisonError::into_inner);

        if kernels.contains_key(&metadata.id) {
            return Err(EngineError::KernelAlreadyRegistered(metadata.id));
        }

        debug!(kernel_id = %metadata.id, stage = %metadata.stage, "Registering kernel");
        kernels.insert(metadata.id.clone(), metadata);
        Ok(())
    }

    /// Get metadata by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<KernelMetadata> {
        let kernels = self.kernels.read().unwrap_or_else(PoisonError::into_inner);
        kernels.get(id).cloned()
    }

    /// All kernels, sorted by id.
    #[must_use]
    pub fn all(&self) -> Vec<KernelMetadata> {
        let kernels = self.kernels.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = kernels.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Kernels in a stage, sorted by id.
    #[must_use]
    pub fn by_stage(&self, stage: Stage) -> Vec<KernelMetadata> {
        self.all().into_iter().filter(|m| m.stage == stage).collect()
    }

    /// Kernels that can emit the given anomaly type.
    #[must_use]
    pub fn emitting(&self, anomaly_type: AnomalyType) -> Vec<KernelMetadata> {
        self.all()
            .into_iter()
            .filter(|m| m.emits.contains(&anomaly_type))
            .collect()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let kernels = self.kernels.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = RegistryStats {
            total: kernels.len(),
            ..Default::default()
        };
        for meta in kernels.values() {
            *stats.by_stage.entry(meta.stage).or_insert(0) += 1;
        }
        stats
    }

    /// Number of registered kernels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kernels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = KernelRegistry::new();
        registry
            .register_metadata(
                KernelMetadata::deterministic("detect/wash-trading")
                    .with_emits(AnomalyType::WashTrading),
            )
            .unwrap();
        registry
            .register_metadata(KernelMetadata::learned("detect/structural"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("detect/wash-trading").is_some());
        assert_eq!(registry.by_stage(Stage::Learned).len(), 1);
        assert_eq!(registry.emitting(AnomalyType::WashTrading).len(), 1);

        let stats = registry.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_stage.get(&Stage::Deterministic), Some(&1));
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = KernelRegistry::new();
        registry
            .register_metadata(KernelMetadata::deterministic("detect/x"))
            .unwrap();
        let err = registry
            .register_metadata(KernelMetadata::deterministic("detect/x"))
            .unwrap_err();
        assert!(matches!(err, EngineError::KernelAlreadyRegistered(_)));
    }
}
