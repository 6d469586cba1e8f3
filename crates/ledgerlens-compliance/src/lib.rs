//! # LedgerLens Compliance
//!
//! Anomaly detectors over per-slice transaction graphs.
//!
//! ## Detectors
//!
//! ### Deterministic (4 kernels)
//! - `CircularTrading` - short cycles of near-equal transfers
//! - `DenseClusters` - components with unnatural edge density
//! - `WashTrading` - reciprocal volume with negligible net flow
//! - `Structuring` - fan-out / fan-in of near-identical amounts
//!
//! ### Learned (1 kernel)
//! - `StructuralAnomalyDetector` - per-slice GCN autoencoder edge plausibility

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod circular;
pub mod clusters;
pub mod detector;
pub mod learned;
pub mod messages;
pub mod structuring;
pub mod wash;

use detector::SliceDetector;
use ledgerlens_core::config::EngineConfig;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::circular::CircularTrading;
    pub use crate::clusters::DenseClusters;
    pub use crate::detector::{LearnedDetector, SliceDetector};
    pub use crate::learned::{EdgeScore, LearnedSliceResult, StructuralAnomalyDetector};
    pub use crate::messages::*;
    pub use crate::structuring::Structuring;
    pub use crate::wash::WashTrading;
}

/// The four deterministic detectors configured from `config`, in run order.
#[must_use]
pub fn deterministic_detectors(config: &EngineConfig) -> Vec<Box<dyn SliceDetector>> {
    vec![
        Box::new(circular::CircularTrading::with_config(config.cycles.clone())),
        Box::new(clusters::DenseClusters::with_config(config.clusters.clone())),
        Box::new(wash::WashTrading::with_config(config.wash.clone())),
        Box::new(structuring::Structuring::with_config(
            config.structuring.clone(),
        )),
    ]
}

/// Register all detector kernels.
pub fn register_all(
    registry: &ledgerlens_core::registry::KernelRegistry,
) -> ledgerlens_core::error::Result<()> {
    use ledgerlens_core::traits::AnalysisKernel;

    tracing::info!("Registering compliance detectors");

    // Deterministic detectors (4)
    registry.register_metadata(circular::CircularTrading::new().metadata().clone())?;
    registry.register_metadata(clusters::DenseClusters::new().metadata().clone())?;
    registry.register_metadata(wash::WashTrading::new().metadata().clone())?;
    registry.register_metadata(structuring::Structuring::new().metadata().clone())?;

    // Learned detectors (1)
    registry.register_metadata(learned::StructuralAnomalyDetector::new().metadata().clone())?;

    tracing::info!("Registered 5 compliance detectors");
    Ok(())
}
