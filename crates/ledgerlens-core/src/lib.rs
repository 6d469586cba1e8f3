//! # LedgerLens Core
//!
//! Core data model, traits and shared infrastructure for the LedgerLens
//! transaction anomaly engine.
//!
//! This crate provides:
//! - Transaction and anomaly records
//! - Rule contexts and the context registry
//! - Kernel metadata, traits and registry
//! - Canonical hashing
//! - Engine configuration and logging setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anomaly;
pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod hashing;
pub mod kernel;
pub mod observability;
pub mod registry;
pub mod traits;
pub mod transaction;
pub mod window;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::anomaly::{
        Anomaly, AnomalySignature, AnomalyType, Confidence, DetectionMethod, EVIDENCE_SLICE,
        EVIDENCE_TRANSACTION_IDS,
    };
    pub use crate::cancel::CancellationToken;
    pub use crate::config::EngineConfig;
    pub use crate::context::{ContextRegistry, RuleContext};
    pub use crate::error::{EngineError, Result};
    pub use crate::kernel::{KernelMetadata, Stage};
    pub use crate::registry::{KernelRegistry, RegistryStats};
    pub use crate::traits::{AnalysisKernel, BatchKernel};
    pub use crate::transaction::{TaxDetails, Transaction};
    pub use crate::window::SliceWindow;
}
