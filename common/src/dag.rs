use bitvec::prelude::*;
use indexmap::IndexMap;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{error::DagError, rwset::TxRwSet};

/// Predecessors of one vertex, ascending
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DagNeighbors {
    pub neighbors: Vec<u32>,
}

impl DagNeighbors {
    pub fn new(neighbors: Vec<u32>) -> Self {
        Self { neighbors }
    }
}

/// Dependency graph over the transactions of a block, indexed in
/// execution order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dag {
    pub vertexes: Vec<DagNeighbors>,
}

impl Dag {
    pub fn len(&self) -> usize {
        self.vertexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertexes.is_empty()
    }

    /// Append a vertex depending on every vertex already present
    pub fn push_after_all(&mut self) {
        let neighbors = (0..self.vertexes.len() as u32).collect();
        self.vertexes.push(DagNeighbors::new(neighbors));
    }

    /// Append a vertex depending only on the last vertex
    pub fn push_after_last(&mut self) {
        let neighbors = match self.vertexes.len() {
            0 => Vec::new(),
            len => vec![len as u32 - 1],
        };
        self.vertexes.push(DagNeighbors::new(neighbors));
    }

    /// Check that every neighbor list is strictly increasing and only
    /// references predecessors.
    pub fn validate(&self) -> Result<(), DagError> {
        for (vertex, entry) in self.vertexes.iter().enumerate() {
            let mut previous: Option<u32> = None;
            for &neighbor in &entry.neighbors {
                if previous.map_or(false, |p| neighbor <= p) {
                    return Err(DagError::NonIncreasingNeighbors {
                        vertex,
                        neighbors: entry.neighbors.clone(),
                    });
                }
                if neighbor as usize >= vertex {
                    return Err(DagError::NeighborOutOfRange { vertex, neighbor });
                }
                previous = Some(neighbor);
            }
        }

        Ok(())
    }

    /// Same as `validate`, also requiring one vertex per transaction
    pub fn validate_for(&self, tx_count: usize) -> Result<(), DagError> {
        if self.vertexes.len() != tx_count {
            return Err(DagError::VertexCountMismatch {
                vertices: self.vertexes.len(),
                txs: tx_count,
            });
        }
        self.validate()
    }

    /// Whether `from` can reach `to` by following predecessor edges
    pub fn reaches(&self, from: usize, to: usize) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(vertex) = stack.pop() {
            let Some(entry) = self.vertexes.get(vertex) else {
                continue;
            };
            for &neighbor in &entry.neighbors {
                let neighbor = neighbor as usize;
                if neighbor == to {
                    return true;
                }
                if neighbor > to && seen.insert(neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        false
    }
}

/// Build the DAG of `rwsets`, which are given in execution order.
///
/// A transaction depends on the last writer of every key it reads or
/// writes and on every reader of a key it writes since that key was last
/// written. Dependencies implied by other dependencies are dropped.
/// With SQL contracts enabled every transaction depends on its predecessor.
pub fn build_dag(rwsets: &[TxRwSet], enable_sql_support: bool) -> Dag {
    let mut dag = Dag {
        vertexes: Vec::with_capacity(rwsets.len()),
    };

    if enable_sql_support {
        for _ in rwsets {
            dag.push_after_last();
        }
        return dag;
    }

    let count = rwsets.len();
    let mut last_writer: IndexMap<Vec<u8>, usize> = IndexMap::new();
    let mut readers: IndexMap<Vec<u8>, Vec<usize>> = IndexMap::new();
    let mut reach: Vec<BitVec> = Vec::with_capacity(count);

    for (index, rwset) in rwsets.iter().enumerate() {
        let mut direct = BTreeSet::new();

        for read in &rwset.tx_reads {
            if let Some(&writer) = last_writer.get(&read.full_key()) {
                direct.insert(writer);
            }
        }
        for write in &rwset.tx_writes {
            let key = write.full_key();
            if let Some(&writer) = last_writer.get(&key) {
                direct.insert(writer);
            }
            if let Some(list) = readers.get(&key) {
                direct.extend(list.iter().copied().filter(|&reader| reader != index));
            }
        }

        // Highest first: a lower candidate reachable through a higher one is redundant
        let mut reachable = bitvec![0; count];
        let mut neighbors = Vec::with_capacity(direct.len());
        for &candidate in direct.iter().rev() {
            if reachable[candidate] {
                continue;
            }
            neighbors.push(candidate as u32);
            reachable.set(candidate, true);
            for transitive in reach[candidate].iter_ones() {
                reachable.set(transitive, true);
            }
        }
        neighbors.sort_unstable();
        reach.push(reachable);

        for read in &rwset.tx_reads {
            readers.entry(read.full_key()).or_default().push(index);
        }
        for write in &rwset.tx_writes {
            let key = write.full_key();
            last_writer.insert(key.clone(), index);
            readers.shift_remove(&key);
        }

        trace!("vertex {} ({}) depends on {:?}", index, rwset.tx_id, neighbors);
        dag.vertexes.push(DagNeighbors::new(neighbors));
    }

    dag
}
