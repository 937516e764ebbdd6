//! Lazy iteration over nodes, edges and adjacency.
//!
//! Every iterator borrows the graph mutably, so holding one across a
//! mutation is a compile error; freed slots can be recycled as another
//! record kind at any time, and only string keys are stable references.
//! Traversal state is an explicit stack; adversarial insertion orders can
//! make the trees arbitrarily deep.

use smallvec::SmallVec;

use crate::error::Result;
use crate::model::SlotId;
use crate::storage::adjacency::Dir;
use crate::storage::record::RecordKind;

use super::Graph;

/// All node keys, bucket by bucket.
pub struct Nodes<'a> {
    graph: &'a mut Graph,
    bucket: u64,
    stack: SmallVec<[SlotId; 32]>,
    done: bool,
}

impl<'a> Nodes<'a> {
    pub(super) fn new(graph: &'a mut Graph) -> Self {
        Self {
            graph,
            bucket: 0,
            stack: SmallVec::new(),
            done: false,
        }
    }
}

impl Iterator for Nodes<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(slot) = self.stack.pop() {
                match self.graph.sf.read_node(slot) {
                    Ok(node) => {
                        if node.left != 0 {
                            self.stack.push(node.left);
                        }
                        if node.right != 0 {
                            self.stack.push(node.right);
                        }
                        return Some(Ok(node.key));
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }

            if self.bucket >= self.graph.sf.header().table_size {
                self.done = true;
                return None;
            }
            let bucket = self.bucket;
            self.bucket += 1;
            match self.graph.sf.dir_get(bucket) {
                Ok(0) => {}
                Ok(root) => self.stack.push(root),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// All live edges as `(source_key, target_key)`, in slot order.
pub struct Edges<'a> {
    graph: &'a mut Graph,
    next_slot: SlotId,
    done: bool,
}

impl<'a> Edges<'a> {
    pub(super) fn new(graph: &'a mut Graph) -> Self {
        Self {
            graph,
            next_slot: 1,
            done: false,
        }
    }

    fn read_pair(&mut self, slot: SlotId) -> Result<(String, String)> {
        let edge = self.graph.sf.read_edge(slot)?;
        let source = self.graph.sf.read_node(edge.source)?;
        let target = self.graph.sf.read_node(edge.target)?;
        Ok((source.key, target.key))
    }
}

impl Iterator for Edges<'_> {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while self.next_slot < self.graph.sf.header().tail {
            let slot = self.next_slot;
            self.next_slot += 1;
            match self.graph.sf.slot_kind(slot) {
                Ok(RecordKind::Edge) => match self.read_pair(slot) {
                    Ok(pair) => return Some(Ok(pair)),
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                },
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        self.done = true;
        None
    }
}

/// Adjacency walk shared by [`Neighbors`] and [`Predecessors`].
struct TreeWalk<'a> {
    graph: &'a mut Graph,
    dir: Dir,
    stack: SmallVec<[SlotId; 32]>,
    done: bool,
}

impl<'a> TreeWalk<'a> {
    fn new(graph: &'a mut Graph, head: SlotId, dir: Dir) -> Self {
        let mut stack = SmallVec::new();
        if head != 0 {
            stack.push(head);
        }
        Self {
            graph,
            dir,
            stack,
            done: false,
        }
    }

    fn next_key(&mut self) -> Option<Result<String>> {
        if self.done {
            return None;
        }
        let slot = match self.stack.pop() {
            Some(slot) => slot,
            None => {
                self.done = true;
                return None;
            }
        };
        let edge = match self.graph.sf.read_edge(slot) {
            Ok(edge) => edge,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        if self.dir.left(&edge) != 0 {
            self.stack.push(self.dir.left(&edge));
        }
        if self.dir.right(&edge) != 0 {
            self.stack.push(self.dir.right(&edge));
        }
        match self.graph.sf.read_node(self.dir.endpoint(&edge)) {
            Ok(node) => Some(Ok(node.key)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Successor keys of one node.
pub struct Neighbors<'a> {
    walk: TreeWalk<'a>,
}

impl<'a> Neighbors<'a> {
    pub(super) fn new(graph: &'a mut Graph, out_head: SlotId) -> Self {
        Self {
            walk: TreeWalk::new(graph, out_head, Dir::Out),
        }
    }
}

impl Iterator for Neighbors<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk.next_key()
    }
}

/// Predecessor keys of one node.
pub struct Predecessors<'a> {
    walk: TreeWalk<'a>,
}

impl<'a> Predecessors<'a> {
    pub(super) fn new(graph: &'a mut Graph, in_head: SlotId) -> Self {
        Self {
            walk: TreeWalk::new(graph, in_head, Dir::In),
        }
    }
}

impl Iterator for Predecessors<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk.next_key()
    }
}
