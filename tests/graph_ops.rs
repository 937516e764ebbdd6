use std::collections::HashSet;

use himo::{Graph, GraphError, Options, Result};
use tempfile::NamedTempFile;

fn small_options() -> Options {
    Options {
        max_key_len: 4,
        table_size: 16,
        ..Options::default()
    }
}

fn setup_abc() -> (NamedTempFile, Graph) {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(tmp.path(), small_options()).unwrap();
    g.add_node("A", None).unwrap();
    g.add_node("B", None).unwrap();
    g.add_node("C", None).unwrap();
    (tmp, g)
}

fn key_set(iter: impl Iterator<Item = Result<String>>) -> HashSet<String> {
    iter.collect::<Result<HashSet<_>>>().unwrap()
}

#[test]
fn add_nodes_then_iterate() -> Result<()> {
    let (_tmp, mut g) = setup_abc();

    assert_eq!(g.node_count(), 3);
    assert_eq!(g.edge_count(), 0);
    let keys = key_set(g.nodes());
    assert_eq!(
        keys,
        HashSet::from(["A".to_owned(), "B".to_owned(), "C".to_owned()])
    );
    g.check()?;
    Ok(())
}

#[test]
fn add_edges_and_query_adjacency() -> Result<()> {
    let (_tmp, mut g) = setup_abc();
    g.add_edge("A", "B", None)?;
    g.add_edge("A", "C", None)?;

    assert_eq!(g.edge_count(), 2);
    assert_eq!(
        key_set(g.neighbors("A")?),
        HashSet::from(["B".to_owned(), "C".to_owned()])
    );
    assert_eq!(key_set(g.predecessors("B")?), HashSet::from(["A".to_owned()]));
    assert_eq!(key_set(g.predecessors("C")?), HashSet::from(["A".to_owned()]));
    assert_eq!(g.degree("A")?, 2);
    assert_eq!(g.in_degree("A")?, 0);
    assert!(g.has_edge("A", "B")?);
    assert!(!g.has_edge("B", "A")?);

    let edges: HashSet<(String, String)> = g.edges().collect::<Result<_>>()?;
    assert_eq!(
        edges,
        HashSet::from([
            ("A".to_owned(), "B".to_owned()),
            ("A".to_owned(), "C".to_owned()),
        ])
    );
    g.check()?;
    Ok(())
}

#[test]
fn remove_node_cascades_to_edges() -> Result<()> {
    let (_tmp, mut g) = setup_abc();
    g.add_edge("A", "B", None)?;
    g.add_edge("A", "C", None)?;

    g.remove_node("C")?;

    assert_eq!(key_set(g.neighbors("A")?), HashSet::from(["B".to_owned()]));
    assert!(!g.has_edge("A", "C")?);
    assert!(!g.has_node("C")?);
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 1);

    let report = g.check()?;
    assert!(report.tombstones >= 1, "freed slots must be tombstoned");
    Ok(())
}

#[test]
fn duplicate_node_insert_fails_and_leaves_count_alone() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(tmp.path(), small_options())?;

    g.add_node("X", None)?;
    for _ in 0..5 {
        let err = g.add_node("X", None).unwrap_err();
        assert!(matches!(err, GraphError::AlreadyExists(_)));
    }
    assert_eq!(g.node_count(), 1);
    g.check()?;
    Ok(())
}

#[test]
fn duplicate_edge_insert_fails() -> Result<()> {
    let (_tmp, mut g) = setup_abc();
    g.add_edge("A", "B", None)?;
    let err = g.add_edge("A", "B", None).unwrap_err();
    assert!(matches!(err, GraphError::AlreadyExists(_)));
    assert_eq!(g.edge_count(), 1);
    g.check()?;
    Ok(())
}

#[test]
fn remove_missing_edge_is_not_found_and_state_unchanged() -> Result<()> {
    let (_tmp, mut g) = setup_abc();
    g.add_edge("A", "C", None)?;

    let err = g.remove_edge("A", "B").unwrap_err();
    assert!(matches!(err, GraphError::NotFound(_)));
    let err = g.remove_edge("A", "Z").unwrap_err();
    assert!(matches!(err, GraphError::NotFound(_)));

    assert_eq!(g.node_count(), 3);
    assert_eq!(g.edge_count(), 1);
    assert!(g.has_edge("A", "C")?);
    g.check()?;
    Ok(())
}

#[test]
fn remove_missing_node_is_not_found() {
    let (_tmp, mut g) = setup_abc();
    assert!(matches!(
        g.remove_node("Z"),
        Err(GraphError::NotFound(_))
    ));
}

#[test]
fn add_edge_auto_creates_endpoints() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(tmp.path(), small_options())?;

    g.add_edge("u", "v", None)?;
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 1);
    assert!(g.has_node("u")?);
    assert!(g.has_node("v")?);
    g.check()?;
    Ok(())
}

#[test]
fn self_loops_are_supported() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(tmp.path(), small_options())?;

    g.add_edge("s", "s", None)?;
    assert!(g.has_edge("s", "s")?);
    assert_eq!(key_set(g.neighbors("s")?), HashSet::from(["s".to_owned()]));
    assert_eq!(key_set(g.predecessors("s")?), HashSet::from(["s".to_owned()]));
    g.check()?;

    g.remove_node("s")?;
    assert_eq!(g.node_count(), 0);
    assert_eq!(g.edge_count(), 0);
    g.check()?;
    Ok(())
}

#[test]
fn key_too_long_is_rejected() {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(tmp.path(), small_options()).unwrap();

    assert!(matches!(
        g.add_node("too-long", None),
        Err(GraphError::KeyTooLong { len: 8, max: 4 })
    ));
    assert!(matches!(
        g.add_edge("ok", "long-key", None),
        Err(GraphError::KeyTooLong { .. })
    ));
    assert_eq!(g.node_count(), 0);
}

#[test]
fn node_attrs_roundtrip_and_overwrite() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(
        tmp.path(),
        Options {
            node_attr_size: 8,
            edge_attr_size: 4,
            ..small_options()
        },
    )?;

    g.add_node("n", Some(b"abc"))?;
    assert_eq!(g.get_node("n")?.attrs, b"abc\0\0\0\0\0");

    g.set_node("n", b"xyzw")?;
    assert_eq!(g.get_node("n")?.attrs, b"xyzw\0\0\0\0");

    g.add_edge_typed("n", "m", 7, Some(b"pq"))?;
    let edge = g.get_edge("n", "m")?;
    assert_eq!(edge.ty, 7);
    assert_eq!(edge.attrs, b"pq\0\0");

    g.set_edge("n", "m", b"rstu")?;
    assert_eq!(g.get_edge("n", "m")?.attrs, b"rstu");

    let err = g.set_node("n", b"way-too-big").unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));
    g.check()?;
    Ok(())
}

#[test]
fn removing_and_reinserting_recycles_slots() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(tmp.path(), small_options())?;

    g.add_edge("a", "b", None)?;
    g.add_edge("b", "c", None)?;
    let before = g.check()?;
    assert_eq!((before.nodes, before.edges, before.tombstones), (3, 2, 0));

    // removing b frees its node slot and both incident edge slots
    g.remove_node("b")?;
    assert_eq!(g.check()?.tombstones, 3);

    // the new edge slot comes off the freelist, not the tail
    g.add_edge("a", "c", None)?;
    let after = g.check()?;
    assert_eq!((after.nodes, after.edges, after.tombstones), (2, 1, 2));
    Ok(())
}

#[derive(Debug, PartialEq)]
struct Weight {
    grams: u32,
}

impl himo::FixedAttrs for Weight {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.grams.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            grams: u32::from_le_bytes(buf.try_into().expect("slice is 4 bytes")),
        })
    }
}

#[test]
fn typed_attribute_codecs_roundtrip() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(
        tmp.path(),
        Options {
            node_attr_size: 8,
            edge_attr_size: 4,
            ..small_options()
        },
    )?;

    g.add_edge("p", "q", None)?;
    g.set_node_attrs("p", &Weight { grams: 1250 })?;
    g.set_edge_attrs("p", "q", &Weight { grams: 17 })?;

    assert_eq!(g.get_node_attrs::<Weight>("p")?, Weight { grams: 1250 });
    assert_eq!(g.get_edge_attrs::<Weight>("p", "q")?, Weight { grams: 17 });

    // a codec wider than the declared region is refused up front
    struct Wide;
    impl himo::FixedAttrs for Wide {
        const SIZE: usize = 64;
        fn encode(&self, _buf: &mut [u8]) {}
        fn decode(_buf: &[u8]) -> Result<Self> {
            Ok(Wide)
        }
    }
    assert!(matches!(
        g.get_edge_attrs::<Wide>("p", "q"),
        Err(GraphError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn dense_graph_survives_interleaved_removal() -> Result<()> {
    let tmp = NamedTempFile::new().unwrap();
    let mut g = Graph::create(tmp.path(), Options { max_key_len: 8, table_size: 4, ..Options::default() })?;

    let keys: Vec<String> = (0..12).map(|i| format!("n{i}")).collect();
    for src in &keys {
        for dst in &keys {
            g.add_edge(src, dst, None)?;
        }
    }
    assert_eq!(g.node_count(), 12);
    assert_eq!(g.edge_count(), 144);
    g.check()?;

    for (i, key) in keys.iter().enumerate() {
        if i % 2 == 0 {
            g.remove_node(key)?;
        }
    }
    assert_eq!(g.node_count(), 6);
    assert_eq!(g.edge_count(), 36);
    g.check()?;

    for key in keys.iter().skip(1).step_by(2) {
        assert!(g.has_node(key)?);
        for other in keys.iter().skip(1).step_by(2) {
            assert!(g.has_edge(key, other)?);
        }
    }
    Ok(())
}
