//! # LedgerLens Graph
//!
//! Transaction graph construction and graph algorithms.
//!
//! ## Contents
//! - `builder` - edge-aggregated graphs and chronological slices
//! - `snapshot` - canonical serialization and content hash
//! - `cycles` - bounded elementary cycle enumeration
//! - `components` - weakly connected components
//! - `gnn` - GCN autoencoder for edge plausibility scoring

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod components;
pub mod cycles;
pub mod gnn;
pub mod snapshot;

// Common graph types
pub mod types;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::builder::{build_graph, build_time_sliced_graphs};
    pub use crate::components::{induced_edge_count, weakly_connected_components};
    pub use crate::cycles::{CycleEnumeration, CycleSearch, canonical_rotation};
    pub use crate::gnn::{AutoencoderConfig, EdgeAutoencoder, GraphTensors, TrainingReport};
    pub use crate::snapshot::{GraphSnapshot, snapshot};
    pub use crate::types::*;
}
