//! Property tests for graph construction and hashing.

use chrono::{Duration, TimeZone, Utc};
use ledgerlens_core::transaction::Transaction;
use ledgerlens_core::window::SliceWindow;
use ledgerlens_graph::builder::{build_graph, build_time_sliced_graphs};
use ledgerlens_graph::snapshot::snapshot;
use proptest::prelude::*;

const ENTITIES: [&str; 6] = ["ACME", "BETA", "CORE", "DELTA", "ECHO", "FOXTROT"];

fn ledger() -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec(
        (0..ENTITIES.len(), 0..ENTITIES.len(), 0u32..5_000_000, 0i64..400, 0..3usize),
        1..40,
    )
    .prop_map(|rows| {
        let origin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        rows.into_iter()
            .enumerate()
            .map(|(i, (s, t, cents, day, kind))| {
                Transaction::new(
                    format!("tx-{}", i),
                    ENTITIES[s],
                    ENTITIES[t],
                    f64::from(cents) / 100.0,
                    origin + Duration::days(day),
                )
                .with_type(["wire", "invoice", "cash"][kind])
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn aggregation_is_order_independent(
        (txs, shuffled) in ledger().prop_flat_map(|txs| {
            let shuffled = Just(txs.clone()).prop_shuffle();
            (Just(txs), shuffled)
        })
    ) {
        let a = build_graph(&txs);
        let b = build_graph(&shuffled);
        prop_assert!(a.same_aggregate(&b));
        prop_assert_eq!(
            snapshot(&a).unwrap().content_hash,
            snapshot(&b).unwrap().content_hash
        );
    }

    #[test]
    fn weight_change_changes_hash(txs in ledger(), bump in 1u32..1000) {
        let mut changed = txs.clone();
        changed[0].amount += f64::from(bump);
        prop_assert_ne!(
            snapshot(&build_graph(&txs)).unwrap().content_hash,
            snapshot(&build_graph(&changed)).unwrap().content_hash
        );
    }

    #[test]
    fn slices_partition_the_ledger(txs in ledger()) {
        let slices = build_time_sliced_graphs(&txs, SliceWindow::Month);
        let total: usize = slices
            .iter()
            .flat_map(|s| s.graph.edges())
            .map(|(_, _, e)| e.count)
            .sum();
        prop_assert_eq!(total, txs.len());
        prop_assert!(slices.windows(2).all(|w| w[0].label < w[1].label));
        prop_assert!(slices.iter().all(|s| !s.graph.is_empty()));
    }
}
