//! Entry-point for native graph partitioning.
//!
//! The partitioner adapter in [`crate::algs::partition`] hands a CSR
//! [`AdjacencyGraph`] to a [`GraphPartitioner`] and expects one 0-based part
//! label per graph vertex back. Built-in partitioners live here; a METIS-backed
//! one sits behind the `metis-support` feature.

pub mod error;
pub mod growth;
pub mod metrics;
pub mod seed_select;

pub use self::error::PartitionError;
pub use self::growth::GreedyPartitioner;
pub use self::metrics::{edge_cut, imbalance, part_loads};

use crate::algs::dual_graph::AdjacencyGraph;

pub type PartitionId = usize;

/// Which adjacency graph the adapter builds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphStrategy {
    /// Dual graph when all primary elements share one type, nodal graph otherwise.
    #[default]
    Auto,
    Dual,
    Nodal,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PartitionerConfig {
    /// Seed for every randomized decision; equal seeds give equal partitions.
    pub rng_seed: u64,
    /// Seed candidates drawn per part before the spread-out pick.
    pub seed_factor: f64,
    pub strategy: GraphStrategy,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            seed_factor: 4.0,
            strategy: GraphStrategy::Auto,
        }
    }
}

/// An opaque graph partitioner: one label in `0..n_parts` per graph vertex.
pub trait GraphPartitioner {
    fn partition_graph(
        &self,
        graph: &AdjacencyGraph,
        n_parts: usize,
    ) -> Result<Vec<PartitionId>, PartitionError>;
}

/// Contiguous blocks of graph vertices in index order; ignores adjacency.
#[derive(Copy, Clone, Debug, Default)]
pub struct BlockPartitioner;

impl GraphPartitioner for BlockPartitioner {
    fn partition_graph(
        &self,
        graph: &AdjacencyGraph,
        n_parts: usize,
    ) -> Result<Vec<PartitionId>, PartitionError> {
        if n_parts == 0 {
            return Err(PartitionError::InvalidPartCount(n_parts));
        }
        let n = graph.n_vertices();
        Ok((0..n).map(|v| v * n_parts / n).collect())
    }
}

/// Check a partitioner's output before anything is committed.
pub(crate) fn check_labels(
    labels: &[PartitionId],
    n_vertices: usize,
    n_parts: usize,
) -> Result<(), PartitionError> {
    if labels.len() != n_vertices {
        return Err(PartitionError::LabelCountMismatch {
            expected: n_vertices,
            got: labels.len(),
        });
    }
    match labels.iter().find(|&&l| l >= n_parts) {
        Some(&label) => Err(PartitionError::LabelOutOfRange { label, n_parts }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests;
