//! Partitioning errors for mesh-shard

use thiserror::Error;

/// Errors from graph construction and partitioning routines
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// Zero parts were requested
    #[error("Invalid part count {0}: at least one part is required")]
    InvalidPartCount(usize),
    /// The adjacency graph has no vertices (no primary elements)
    #[error("Empty adjacency graph: the mesh has no primary elements")]
    EmptyGraph,
    /// The partitioner returned the wrong number of labels
    #[error("Partitioner returned {got} labels for {expected} graph vertices")]
    LabelCountMismatch { expected: usize, got: usize },
    /// The partitioner returned a label outside `0..n_parts`
    #[error("Partitioner returned label {label} outside 0..{n_parts}")]
    LabelOutOfRange { label: usize, n_parts: usize },
    /// Degree array does not match the graph
    #[error("Degree array has {got} entries for {expected} vertices")]
    DegreeLengthMismatch { expected: usize, got: usize },
    /// The mesh cannot be turned into an adjacency graph
    #[error("Malformed mesh: {0}")]
    MalformedMesh(String),
    /// Other errors (e.g. METIS wrapper failures)
    #[error("Partitioner error: {0}")]
    Other(String),
}
