// Pass scheduling
//
// Builds the write-before-read dependency graph from declared footprints and
// orders it with Kahn's algorithm. Ready passes are taken in declaration order
// so the result is deterministic.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use super::registry::ResourceKey;
use crate::error::GraphError;

/// Resources a pass reads and writes, already resolved to keys
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Footprint {
    pub reads: Vec<ResourceKey>,
    pub writes: Vec<ResourceKey>,
}

impl Footprint {
    pub fn add_read(&mut self, key: ResourceKey) {
        if !self.reads.contains(&key) {
            self.reads.push(key);
        }
    }

    pub fn add_write(&mut self, key: ResourceKey) {
        if !self.writes.contains(&key) {
            self.writes.push(key);
        }
    }
}

struct DependencyGraph {
    successors: Vec<BTreeSet<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    fn new(pass_count: usize) -> Self {
        Self {
            successors: vec![BTreeSet::new(); pass_count],
            in_degree: vec![0; pass_count],
        }
    }

    fn add_edge(&mut self, producer: usize, consumer: usize) {
        if producer != consumer && self.successors[producer].insert(consumer) {
            self.in_degree[consumer] += 1;
        }
    }
}

/// Order passes so every writer of a resource precedes every pure reader of
/// it. A pass that reads and writes the same resource runs after the writers
/// of it declared before it, which lets read-modify-write passes accumulate
/// into a target. Writers with no reader between them are left unordered.
///
/// `preinitialized` tells whether a resource already holds data before the
/// first pass (imported textures).
pub(crate) fn schedule(
    pass_names: &[&str],
    footprints: &[Footprint],
    preinitialized: impl Fn(ResourceKey) -> bool,
    resource_name: impl Fn(ResourceKey) -> String,
) -> Result<Vec<usize>, GraphError> {
    let pass_count = footprints.len();
    let mut writers: HashMap<ResourceKey, Vec<usize>> = HashMap::new();
    for (index, footprint) in footprints.iter().enumerate() {
        for &key in &footprint.writes {
            writers.entry(key).or_default().push(index);
        }
    }

    let mut graph = DependencyGraph::new(pass_count);
    for (index, footprint) in footprints.iter().enumerate() {
        for &key in &footprint.reads {
            let chain = writers.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            // Chains are in declaration order
            let sources = if footprint.writes.contains(&key) {
                &chain[..chain.partition_point(|&writer| writer < index)]
            } else {
                chain
            };

            if sources.is_empty() && !preinitialized(key) {
                return Err(GraphError::ReadBeforeWrite {
                    pass: pass_names[index].to_string(),
                    resource: resource_name(key),
                });
            }

            for &writer in sources {
                graph.add_edge(writer, index);
            }
        }
    }

    let mut in_degree = graph.in_degree.clone();
    let mut ready: BinaryHeap<Reverse<usize>> = (0..pass_count)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(pass_count);

    while let Some(Reverse(pass)) = ready.pop() {
        order.push(pass);
        for &next in &graph.successors[pass] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != pass_count {
        let stuck = (0..pass_count)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| pass_names[i].to_string())
            .collect();
        return Err(GraphError::Cycle(stuck));
    }

    Ok(order)
}
