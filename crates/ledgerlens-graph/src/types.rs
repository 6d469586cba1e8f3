//! Transaction graph types.
//!
//! The graph collapses every transaction between the same ordered pair of
//! entities into one directed edge. Maps are ordered so that iteration over
//! nodes and edges is deterministic.

use chrono::NaiveDate;
use ledgerlens_core::transaction::Transaction;
use std::collections::{BTreeMap, BTreeSet};

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Convert an amount to integer micro-units. Negative or non-finite amounts map to zero.
#[must_use]
pub fn to_micros(amount: f64) -> u128 {
    if amount.is_finite() && amount > 0.0 {
        (amount * MICROS_PER_UNIT).round() as u128
    } else {
        0
    }
}

/// Aggregated attributes of one directed edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeData {
    /// Sum of amounts in micro-units. Integer accumulation keeps the sum
    /// independent of insertion order.
    pub weight_micros: u128,
    /// Number of underlying transactions.
    pub count: usize,
    /// Underlying transaction ids in insertion order.
    pub transaction_ids: Vec<String>,
    /// Observed transaction types.
    pub types: BTreeSet<String>,
    /// Observed calendar days.
    pub dates: BTreeSet<NaiveDate>,
}

impl EdgeData {
    /// Sum of amounts.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight_micros as f64 / MICROS_PER_UNIT
    }

    /// Fold one transaction into the edge.
    pub fn absorb(&mut self, tx: &Transaction) {
        self.weight_micros = self.weight_micros.saturating_add(to_micros(tx.amount));
        self.count += 1;
        self.transaction_ids.push(tx.id.clone());
        if !tx.tx_type.is_empty() {
            self.types.insert(tx.tx_type.clone());
        }
        self.dates.insert(tx.timestamp.date_naive());
    }

    /// Equality of everything except transaction id order.
    #[must_use]
    pub fn same_aggregate(&self, other: &EdgeData) -> bool {
        let mut mine: Vec<&String> = self.transaction_ids.iter().collect();
        let mut theirs: Vec<&String> = other.transaction_ids.iter().collect();
        mine.sort();
        theirs.sort();
        self.weight_micros == other.weight_micros
            && self.count == other.count
            && self.types == other.types
            && self.dates == other.dates
            && mine == theirs
    }
}

/// Directed, edge-aggregated transaction graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionGraph {
    nodes: BTreeSet<String>,
    outgoing: BTreeMap<String, BTreeMap<String, EdgeData>>,
    incoming: BTreeMap<String, BTreeSet<String>>,
    edge_count: usize,
}

impl TransactionGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a transaction into the graph.
    pub fn add_transaction(&mut self, tx: &Transaction) {
        self.nodes.insert(tx.source_entity.clone());
        self.nodes.insert(tx.target_entity.clone());

        let edge = self
            .outgoing
            .entry(tx.source_entity.clone())
            .or_default()
            .entry(tx.target_entity.clone())
            .or_default();
        if edge.count == 0 {
            self.edge_count += 1;
            self.incoming
                .entry(tx.target_entity.clone())
                .or_default()
                .insert(tx.source_entity.clone());
        }
        edge.absorb(tx);
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct directed edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if the node exists.
    #[must_use]
    pub fn contains_node(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Nodes in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// Outgoing neighbours with their edge data, sorted by target.
    pub fn successors<'a>(
        &'a self,
        node: &str,
    ) -> impl Iterator<Item = (&'a str, &'a EdgeData)> + use<'a> {
        self.outgoing
            .get(node)
            .into_iter()
            .flat_map(|targets| targets.iter().map(|(t, e)| (t.as_str(), e)))
    }

    /// Incoming neighbours, sorted by source.
    pub fn predecessors<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.incoming
            .get(node)
            .into_iter()
            .flat_map(|sources| sources.iter().map(String::as_str))
    }

    /// Number of distinct targets.
    #[must_use]
    pub fn out_degree(&self, node: &str) -> usize {
        self.outgoing.get(node).map_or(0, BTreeMap::len)
    }

    /// Number of distinct sources.
    #[must_use]
    pub fn in_degree(&self, node: &str) -> usize {
        self.incoming.get(node).map_or(0, BTreeSet::len)
    }

    /// In-degree plus out-degree.
    #[must_use]
    pub fn degree(&self, node: &str) -> usize {
        self.in_degree(node) + self.out_degree(node)
    }

    /// Edge data for `source -> target`.
    #[must_use]
    pub fn edge(&self, source: &str, target: &str) -> Option<&EdgeData> {
        self.outgoing.get(source).and_then(|t| t.get(target))
    }

    /// Returns true if `source -> target` exists.
    #[must_use]
    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edge(source, target).is_some()
    }

    /// All edges as `(source, target, data)`, sorted by source then target.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &EdgeData)> {
        self.outgoing.iter().flat_map(|(source, targets)| {
            targets
                .iter()
                .map(move |(target, edge)| (source.as_str(), target.as_str(), edge))
        })
    }

    /// Total amount received by a node.
    #[must_use]
    pub fn in_amount(&self, node: &str) -> f64 {
        self.predecessors(node)
            .filter_map(|source| self.edge(source, node))
            .map(EdgeData::weight)
            .sum()
    }

    /// Total amount sent by a node.
    #[must_use]
    pub fn out_amount(&self, node: &str) -> f64 {
        self.successors(node).map(|(_, edge)| edge.weight()).sum()
    }

    /// Directed density: edges / (n * (n - 1)).
    #[must_use]
    pub fn density(&self) -> f64 {
        directed_density(self.node_count(), self.edge_count())
    }

    /// Equality of structure and aggregates, ignoring transaction id order.
    #[must_use]
    pub fn same_aggregate(&self, other: &TransactionGraph) -> bool {
        self.nodes == other.nodes
            && self.edge_count == other.edge_count
            && self.edges().all(|(s, t, edge)| {
                other
                    .edge(s, t)
                    .is_some_and(|theirs| edge.same_aggregate(theirs))
            })
    }
}

/// Directed density of `edges` over `nodes` nodes.
#[must_use]
pub fn directed_density(nodes: usize, edges: usize) -> f64 {
    if nodes < 2 {
        return 0.0;
    }
    edges as f64 / (nodes as f64 * (nodes as f64 - 1.0))
}

/// One chronological bucket of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlice {
    /// Bucket label (`YYYY-MM`, `YYYY-Qn` or `ALL`).
    pub label: String,
    /// Graph of the transactions in the bucket.
    pub graph: TransactionGraph,
}
