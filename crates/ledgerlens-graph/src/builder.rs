//! Graph construction and time slicing.

use crate::types::{TimeSlice, TransactionGraph};
use ledgerlens_core::transaction::Transaction;
use ledgerlens_core::window::SliceWindow;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Fold transactions into one aggregated graph.
///
/// Transactions that fail validation are skipped and logged, so every edge
/// weight stays non-negative.
#[must_use]
pub fn build_graph(transactions: &[Transaction]) -> TransactionGraph {
    let mut graph = TransactionGraph::new();
    for tx in transactions {
        if accept(tx) {
            graph.add_transaction(tx);
        }
    }
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Built transaction graph"
    );
    graph
}

/// Partition transactions into chronological slices, one graph per slice.
///
/// Slices are sorted by label ascending and empty slices are never emitted.
#[must_use]
pub fn build_time_sliced_graphs(
    transactions: &[Transaction],
    window: SliceWindow,
) -> Vec<TimeSlice> {
    let mut buckets: BTreeMap<String, TransactionGraph> = BTreeMap::new();
    for tx in transactions {
        if accept(tx) {
            buckets
                .entry(window.label(&tx.timestamp))
                .or_default()
                .add_transaction(tx);
        }
    }

    let slices: Vec<TimeSlice> = buckets
        .into_iter()
        .filter(|(_, graph)| !graph.is_empty())
        .map(|(label, graph)| TimeSlice { label, graph })
        .collect();

    debug!(window = %window, slices = slices.len(), "Built time-sliced graphs");
    slices
}

fn accept(tx: &Transaction) -> bool {
    match tx.validate() {
        Ok(()) => true,
        Err(e) => {
            warn!(transaction_id = %tx.id, error = %e, "Skipping invalid transaction");
            false
        }
    }
}
