//! # LedgerLens
//!
//! Anomaly detection over time-sliced transaction graphs.
//!
//! A run partitions a ledger into chronological slices, builds one
//! edge-aggregated graph per slice and runs four deterministic pattern
//! detectors plus a learned structural detector on each. Findings from all
//! slices then pass through a temporal persistence stage, which assigns
//! confidence from recurrence, and a context overlay, which annotates them
//! with jurisdiction-specific tax signals.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ledgerlens::prelude::*;
//!
//! let engine = AnalysisEngine::new(EngineConfig::default())?;
//! let contexts = ContextRegistry::with_builtin();
//! contexts.set_active("india_gst")?;
//!
//! let report = engine.analyze(&transactions, &contexts.active())?;
//! for anomaly in &report.anomalies {
//!     println!("{} [{}] {}", anomaly.anomaly_type, anomaly.confidence, anomaly.description);
//! }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Kernel | Emits |
//! |-------|--------|-------|
//! | Deterministic | `CircularTrading`, `DenseClusters`, `WashTrading`, `Structuring` | structural patterns |
//! | Learned | `StructuralAnomalyDetector` | improbable edges |
//! | Temporal | `PersistenceEngine` | confidence, watchlist retyping |
//! | Overlay | `ContextOverlay` | tax context annotations |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use ledgerlens_compliance as compliance;
pub use ledgerlens_core as core;
pub use ledgerlens_graph as graph;

pub mod engine;
pub mod overlay;
pub mod report;
pub mod temporal;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use ledgerlens_core::prelude::*;

    pub use crate::engine::{AnalysisEngine, AnalysisRequest, AnalysisResponse};
    pub use crate::overlay::{AsymmetricRateRule, ContextOverlay, InputCreditFlowRule, OverlayRule};
    pub use crate::report::{AnalysisReport, GraphView, SliceStatus, SliceSummary};
    pub use crate::temporal::{PersistenceEngine, PersistenceOutcome, PersistenceRecord};
}

/// Version information.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Register every kernel of the pipeline.
pub fn register_all(
    registry: &ledgerlens_core::registry::KernelRegistry,
) -> ledgerlens_core::error::Result<()> {
    use ledgerlens_core::traits::AnalysisKernel;

    tracing::info!("Registering LedgerLens pipeline kernels");

    ledgerlens_compliance::register_all(registry)?;
    registry.register_metadata(temporal::PersistenceEngine::new().metadata().clone())?;
    registry.register_metadata(overlay::ContextOverlay::new().metadata().clone())?;

    Ok(())
}
