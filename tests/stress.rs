use std::collections::HashSet;

use himo::{Graph, GraphError, Options, Result};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::NamedTempFile;

fn random_key(rng: &mut ChaCha8Rng, len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[test]
fn ten_thousand_random_keys_stay_retrievable_and_shallow() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(
        tmp.path(),
        Options {
            max_key_len: 20,
            table_size: 1024,
            ..Options::default()
        },
    )?;

    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    let mut keys = HashSet::new();
    while keys.len() < 10_000 {
        keys.insert(random_key(&mut rng, 20));
    }
    for key in &keys {
        g.add_node(key, None)?;
    }

    assert_eq!(g.node_count(), 10_000);
    for key in &keys {
        assert!(g.has_node(key)?, "{key} not retrievable");
    }

    let iterated: HashSet<String> = g.nodes().collect::<Result<_>>()?;
    assert_eq!(iterated.len(), 10_000);
    assert_eq!(iterated, keys);

    let stats = g.depth_stats()?;
    assert_eq!(stats.nodes, 10_000);
    let bound = 2.0 * (10_000f64 / 1024.0).log2() + 4.0;
    assert!(
        stats.mean_depth <= bound,
        "mean bucket-tree depth {:.2} exceeds {:.2}",
        stats.mean_depth,
        bound
    );
    Ok(())
}

#[test]
fn bulk_insert_remove_reinsert_cycle() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(
        tmp.path(),
        Options {
            max_key_len: 16,
            table_size: 64,
            ..Options::default()
        },
    )?;

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let keys: Vec<String> = (0..500).map(|i| format!("node-{i:04}")).collect();
    for key in &keys {
        g.add_node(key, None)?;
    }
    for _ in 0..1500 {
        let src = &keys[rng.gen_range(0..keys.len())];
        let dst = &keys[rng.gen_range(0..keys.len())];
        match g.add_edge(src, dst, None) {
            Ok(()) | Err(GraphError::AlreadyExists(_)) => {}
            Err(err) => return Err(err),
        }
    }
    g.check()?;

    // remove a random half of the nodes, cascading their edges
    let mut removed = HashSet::new();
    for key in &keys {
        if rng.gen_bool(0.5) {
            g.remove_node(key)?;
            removed.insert(key.clone());
        }
    }
    g.check()?;

    for key in &keys {
        assert_eq!(g.has_node(key)?, !removed.contains(key));
    }

    // recycled slots must serve a second population
    for key in &removed {
        g.add_node(key, None)?;
    }
    assert_eq!(g.node_count(), keys.len() as u64);
    g.check()?;
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    AddNode(String),
    AddEdge(String, String),
    RemoveNode(String),
    RemoveEdge(String, String),
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-h]{1,3}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_key().prop_map(Op::AddNode),
        (arb_key(), arb_key()).prop_map(|(s, t)| Op::AddEdge(s, t)),
        arb_key().prop_map(Op::RemoveNode),
        (arb_key(), arb_key()).prop_map(|(s, t)| Op::RemoveEdge(s, t)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_op_sequence_matches_the_reference_model(ops in prop::collection::vec(arb_op(), 1..60)) {
        let tmp = NamedTempFile::new().unwrap();
        let mut g = Graph::create(
            tmp.path(),
            Options { max_key_len: 4, table_size: 4, ..Options::default() },
        ).unwrap();

        let mut nodes: HashSet<String> = HashSet::new();
        let mut edges: HashSet<(String, String)> = HashSet::new();

        for op in ops {
            match op {
                Op::AddNode(key) => {
                    let result = g.add_node(&key, None);
                    if nodes.insert(key) {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert!(matches!(result, Err(GraphError::AlreadyExists(_))));
                    }
                }
                Op::AddEdge(src, dst) => {
                    let result = g.add_edge(&src, &dst, None);
                    nodes.insert(src.clone());
                    nodes.insert(dst.clone());
                    if edges.insert((src, dst)) {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert!(matches!(result, Err(GraphError::AlreadyExists(_))));
                    }
                }
                Op::RemoveNode(key) => {
                    let result = g.remove_node(&key);
                    if nodes.remove(&key) {
                        prop_assert!(result.is_ok());
                        edges.retain(|(s, t)| s != &key && t != &key);
                    } else {
                        prop_assert!(matches!(result, Err(GraphError::NotFound(_))));
                    }
                }
                Op::RemoveEdge(src, dst) => {
                    let result = g.remove_edge(&src, &dst);
                    if edges.remove(&(src, dst)) {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert!(matches!(result, Err(GraphError::NotFound(_))));
                    }
                }
            }
        }

        prop_assert_eq!(g.node_count(), nodes.len() as u64);
        prop_assert_eq!(g.edge_count(), edges.len() as u64);

        let iterated_nodes: HashSet<String> = g.nodes().collect::<Result<_>>().unwrap();
        prop_assert_eq!(&iterated_nodes, &nodes);
        let iterated_edges: HashSet<(String, String)> = g.edges().collect::<Result<_>>().unwrap();
        prop_assert_eq!(&iterated_edges, &edges);

        for (src, dst) in &edges {
            prop_assert!(g.has_edge(src, dst).unwrap());
        }

        g.check().unwrap();
    }
}
