//! Property-based tests for splits, negatives, and minibatch scheduling.
//!
//! These tests verify invariants that must hold for any input graph:
//! - Splits partition the positive edges
//! - Held-out positives never reach the encoder's adjacency
//! - Negatives are never known positives
//! - Every training edge is visited exactly once per epoch

use hetlink_core::{
    Edge, EdgeMinibatchIterator, Error, GraphData, IteratorConfig, NegativeStrategy,
    RelationCatalog, RelationType, SparseMatrix,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

const N0: usize = 20;
const N1: usize = 15;

fn same_type() -> RelationType {
    RelationType::new(0, 0, 0)
}

fn cross_type() -> RelationType {
    RelationType::new(0, 1, 0)
}

fn build_graph(homo: &[Edge], bip: &[Edge]) -> GraphData {
    let mut catalog = RelationCatalog::new();
    catalog.add_node_type(0, N0).unwrap();
    catalog.add_node_type(1, N1).unwrap();
    catalog.add_relations(0, 0, 1).unwrap();
    catalog.add_relations(0, 1, 1).unwrap();

    let mut adj = BTreeMap::new();
    adj.insert(same_type(), SparseMatrix::from_edges(N0, N0, homo).unwrap());
    adj.insert(cross_type(), SparseMatrix::from_edges(N0, N1, bip).unwrap());
    GraphData::with_identity_features(catalog, adj).unwrap()
}

/// Off-diagonal edges on the same-type relation.
fn arb_homo_edges() -> impl Strategy<Value = Vec<Edge>> {
    prop::collection::vec((0..N0, 0..N0), 1..60).prop_map(|mut edges| {
        edges.retain(|(r, c)| r != c);
        if edges.is_empty() {
            edges.push((0, 1));
        }
        edges
    })
}

fn arb_bip_edges() -> impl Strategy<Value = Vec<Edge>> {
    prop::collection::vec((0..N0, 0..N1), 1..60)
}

fn arb_strategy() -> impl Strategy<Value = NegativeStrategy> {
    prop_oneof![
        Just(NegativeStrategy::Uniform),
        (0.0f64..1.0).prop_map(|distortion| NegativeStrategy::DegreeWeighted { distortion }),
        Just(NegativeStrategy::DegreeWeighted { distortion: 0.75 }),
    ]
}

mod split_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn splits_partition_positives(
            homo in arb_homo_edges(),
            bip in arb_bip_edges(),
            fraction in 0.0f64..0.45,
            seed in any::<u64>(),
        ) {
            let graph = build_graph(&homo, &bip);
            let cfg = IteratorConfig::default()
                .with_held_out_fraction(fraction)
                .with_seed(seed);
            let it = EdgeMinibatchIterator::new(&graph, &[same_type(), cross_type()], cfg).unwrap();

            for slot in it.slots() {
                let split = slot.split();
                let original: HashSet<Edge> =
                    graph.positive_edges(&slot.relation()).unwrap().into_iter().collect();
                let expected_held = (fraction * original.len() as f64).floor() as usize;

                prop_assert_eq!(split.val.len(), expected_held);
                prop_assert_eq!(split.test.len(), expected_held);
                prop_assert_eq!(split.total(), original.len());

                let train: HashSet<Edge> = split.train.iter().copied().collect();
                let val: HashSet<Edge> = split.val.iter().copied().collect();
                let test: HashSet<Edge> = split.test.iter().copied().collect();
                prop_assert!(train.is_disjoint(&val));
                prop_assert!(train.is_disjoint(&test));
                prop_assert!(val.is_disjoint(&test));

                let union: HashSet<Edge> = train.union(&val).chain(test.iter()).copied().collect();
                prop_assert_eq!(union, original);
            }
        }

        #[test]
        fn no_held_out_leakage(
            homo in arb_homo_edges(),
            bip in arb_bip_edges(),
            seed in any::<u64>(),
        ) {
            let graph = build_graph(&homo, &bip);
            let cfg = IteratorConfig::default().with_held_out_fraction(0.2).with_seed(seed);
            let selection = [same_type(), cross_type(), cross_type()];
            let it = EdgeMinibatchIterator::new(&graph, &selection, cfg).unwrap();

            for slot in it.slots() {
                let adj = &it.train_adjacency()[&slot.relation()];
                for &(r, c) in slot.split().held_out() {
                    prop_assert!(!adj.contains(r, c), "held-out edge ({}, {}) leaked", r, c);
                }
            }
            let homo_adj = &it.train_adjacency()[&same_type()];
            for i in 0..N0 {
                prop_assert!(!homo_adj.contains(i, i));
            }
        }
    }
}

mod negative_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn negatives_absent_from_original(
            homo in arb_homo_edges(),
            bip in arb_bip_edges(),
            strategy in arb_strategy(),
            neg in 1usize..4,
            seed in any::<u64>(),
        ) {
            let graph = build_graph(&homo, &bip);
            let cfg = IteratorConfig::default()
                .with_batch_size(7)
                .with_neg_sample_size(neg)
                .with_negative_strategy(strategy)
                .with_seed(seed);
            let mut it =
                EdgeMinibatchIterator::new(&graph, &[same_type(), cross_type()], cfg).unwrap();

            for slot in it.slots() {
                let adj = graph.adjacency(&slot.relation()).unwrap();
                let split = slot.split();
                prop_assert_eq!(split.val_negatives.len(), split.val.len());
                prop_assert_eq!(split.test_negatives.len(), split.test.len());
                for &(r, c) in split.val_negatives.iter().chain(&split.test_negatives) {
                    prop_assert!(!adj.contains(r, c));
                }
            }

            it.shuffle();
            while let Some(batch) = it.next_minibatch().unwrap() {
                let adj = graph.adjacency(&batch.relation).unwrap();
                prop_assert_eq!(batch.negatives.len(), batch.positives.len() * neg);
                for &(r, c) in &batch.negatives {
                    prop_assert!(!adj.contains(r, c));
                    if batch.relation.is_homogeneous() {
                        prop_assert_ne!(r, c);
                    }
                }
            }
        }
    }
}

mod schedule_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn every_edge_once_per_epoch(
            homo in arb_homo_edges(),
            bip in arb_bip_edges(),
            batch_size in 1usize..16,
            seed in any::<u64>(),
        ) {
            let graph = build_graph(&homo, &bip);
            let cfg = IteratorConfig::default()
                .with_batch_size(batch_size)
                .with_seed(seed);
            let selection = [cross_type(), same_type(), cross_type()];
            let mut it = EdgeMinibatchIterator::new(&graph, &selection, cfg).unwrap();

            for _epoch in 0..2 {
                it.shuffle();
                let mut visited: Vec<Vec<Edge>> = vec![Vec::new(); selection.len()];
                let mut batches = 0;
                while !it.end() {
                    let batch = it.next_minibatch().unwrap().unwrap();
                    prop_assert!(batch.len() <= batch_size);
                    prop_assert!(!batch.is_empty());
                    visited[batch.slot].extend(&batch.positives);
                    batches += 1;
                }
                prop_assert_eq!(batches, it.batches_per_epoch());

                for (slot, seen) in it.slots().iter().zip(visited) {
                    let mut seen_sorted = seen.clone();
                    seen_sorted.sort_unstable();
                    let mut train = slot.split().train.clone();
                    train.sort_unstable();
                    prop_assert_eq!(seen_sorted, train);
                }
            }
        }

        #[test]
        fn batch_sizes_follow_partition(
            edges in 1usize..40,
            batch_size in 1usize..12,
        ) {
            let bip: Vec<Edge> = (0..edges).map(|i| (i % N0, i / N0)).collect();
            let graph = build_graph(&[(0, 1)], &bip);
            let cfg = IteratorConfig::default()
                .with_batch_size(batch_size)
                .with_held_out_fraction(0.0);
            let mut it = EdgeMinibatchIterator::new(&graph, &[cross_type()], cfg).unwrap();
            it.shuffle();

            let mut sizes = Vec::new();
            while let Some(batch) = it.next_minibatch().unwrap() {
                sizes.push(batch.len());
            }
            let mut expected = vec![batch_size; edges / batch_size];
            if edges % batch_size != 0 {
                expected.push(edges % batch_size);
            }
            prop_assert_eq!(sizes, expected);
        }
    }
}

#[test]
fn ten_edges_batch_four() {
    let bip: Vec<Edge> = (0..10).map(|i| (i, i % N1)).collect();
    let graph = build_graph(&[(0, 1)], &bip);
    let cfg = IteratorConfig::default()
        .with_batch_size(4)
        .with_held_out_fraction(0.0);
    let mut it = EdgeMinibatchIterator::new(&graph, &[cross_type()], cfg).unwrap();
    it.shuffle();

    let mut sizes = Vec::new();
    let mut seen = HashSet::new();
    while !it.end() {
        let batch = it.next_minibatch().unwrap().unwrap();
        for e in &batch.positives {
            assert!(seen.insert(*e), "edge {e:?} repeated within an epoch");
        }
        sizes.push(batch.len());
    }
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[test]
fn empty_relation_fails_at_construction() {
    let graph = build_graph(&[(0, 1)], &[]);
    let err = EdgeMinibatchIterator::new(&graph, &[same_type(), cross_type()], IteratorConfig::default())
        .unwrap_err();
    match err {
        Error::EmptyRelation { relation, rows, cols } => {
            assert_eq!(relation, cross_type());
            assert_eq!((rows, cols), (N0, N1));
        }
        other => panic!("expected EmptyRelation, got {other}"),
    }
}

#[test]
fn self_loops_only_is_empty() {
    let mut catalog = RelationCatalog::new();
    catalog.add_node_type(0, 3).unwrap();
    catalog.add_relations(0, 0, 1).unwrap();
    let mut adj = BTreeMap::new();
    adj.insert(same_type(), SparseMatrix::identity(3));
    let graph = GraphData::with_identity_features(catalog, adj).unwrap();
    assert!(matches!(
        EdgeMinibatchIterator::new(&graph, &[same_type()], IteratorConfig::default()),
        Err(Error::EmptyRelation { .. })
    ));
}
