//! Content-addressed graph snapshots.
//!
//! The canonical form is node-link JSON with sorted keys, sorted nodes,
//! edges sorted by endpoints and transaction ids sorted within each edge.

use crate::types::TransactionGraph;
use ledgerlens_core::error::Result;
use ledgerlens_core::hashing::{canonical_json, sha256_hex};
use serde::{Deserialize, Serialize};

/// Fingerprint of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// First 16 hex characters of the content hash.
    pub id: String,
    /// Number of nodes.
    pub node_count: usize,
    /// Number of edges.
    pub edge_count: usize,
    /// SHA-256 of the canonical serialization.
    pub content_hash: String,
}

#[derive(Serialize)]
struct NodeLink<'a> {
    directed: bool,
    multigraph: bool,
    nodes: Vec<NodeEntry<'a>>,
    links: Vec<LinkEntry<'a>>,
}

#[derive(Serialize)]
struct NodeEntry<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct LinkEntry<'a> {
    source: &'a str,
    target: &'a str,
    weight: f64,
    count: usize,
    transaction_ids: Vec<&'a str>,
    types: Vec<&'a str>,
    dates: Vec<String>,
}

/// Canonical serialization of a graph.
pub fn canonical_form(graph: &TransactionGraph) -> Result<String> {
    let links = graph
        .edges()
        .map(|(source, target, edge)| {
            let mut transaction_ids: Vec<&str> =
                edge.transaction_ids.iter().map(String::as_str).collect();
            transaction_ids.sort_unstable();
            LinkEntry {
                source,
                target,
                weight: edge.weight(),
                count: edge.count,
                transaction_ids,
                types: edge.types.iter().map(String::as_str).collect(),
                dates: edge
                    .dates
                    .iter()
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .collect(),
            }
        })
        .collect();

    let data = NodeLink {
        directed: true,
        multigraph: false,
        nodes: graph.nodes().map(|id| NodeEntry { id }).collect(),
        links,
    };
    canonical_json(&data)
}

/// Snapshot a graph.
pub fn snapshot(graph: &TransactionGraph) -> Result<GraphSnapshot> {
    let content_hash = sha256_hex(canonical_form(graph)?);
    Ok(GraphSnapshot {
        id: content_hash[..16].to_string(),
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        content_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_graph;
    use chrono::{TimeZone, Utc};
    use ledgerlens_core::transaction::Transaction;

    fn ledger() -> Vec<Transaction> {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        vec![
            Transaction::new("t1", "A", "B", 1000.0, ts).with_type("wire"),
            Transaction::new("t2", "B", "C", 1020.0, ts).with_type("wire"),
            Transaction::new("t3", "C", "A", 980.0, ts).with_type("invoice"),
            Transaction::new("t4", "A", "B", 5.0, ts),
        ]
    }

    #[test]
    fn test_snapshot_counts_and_id() {
        let snap = snapshot(&build_graph(&ledger())).unwrap();
        assert_eq!(snap.node_count, 3);
        assert_eq!(snap.edge_count, 3);
        assert_eq!(snap.content_hash.len(), 64);
        assert_eq!(snap.id, snap.content_hash[..16]);
    }

    #[test]
    fn test_hash_ignores_construction_order() {
        let mut reversed = ledger();
        reversed.reverse();
        assert_eq!(
            snapshot(&build_graph(&ledger())).unwrap().content_hash,
            snapshot(&build_graph(&reversed)).unwrap().content_hash
        );
    }

    #[test]
    fn test_hash_sensitive_to_weight() {
        let mut changed = ledger();
        changed[1].amount = 1021.0;
        assert_ne!(
            snapshot(&build_graph(&ledger())).unwrap().content_hash,
            snapshot(&build_graph(&changed)).unwrap().content_hash
        );
    }

    #[test]
    fn test_canonical_form_is_compact() {
        let form = canonical_form(&build_graph(&ledger())).unwrap();
        assert!(!form.contains(' '));
        assert!(form.starts_with(r#"{"directed":true,"links":["#));
    }
}
