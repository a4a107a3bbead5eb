//! Partitioning metrics utilities.
//!
//! Edge cut and per-part load of a labelling, logged by the partitioner
//! adapter after every partition and used by tests to sanity-check quality.

use crate::algs::dual_graph::AdjacencyGraph;
use crate::partitioning::PartitionId;

/// Computes the edge cut of a partitioning (O(E)): the number of undirected
/// graph edges whose endpoints carry different labels.
pub fn edge_cut(g: &AdjacencyGraph, labels: &[PartitionId]) -> usize {
    g.edges().filter(|&(u, v)| labels[u] != labels[v]).count()
}

/// Number of vertices per part. Labels `>= n_parts` are ignored.
pub fn part_loads(labels: &[PartitionId], n_parts: usize) -> Vec<usize> {
    let mut loads = vec![0; n_parts];
    for &l in labels {
        if let Some(slot) = loads.get_mut(l) {
            *slot += 1;
        }
    }
    loads
}

/// Largest load divided by the mean load; 1.0 is perfect balance.
pub fn imbalance(loads: &[usize]) -> f64 {
    let total: usize = loads.iter().sum();
    if loads.is_empty() || total == 0 {
        return 1.0;
    }
    let max = loads.iter().copied().max().unwrap_or(0);
    max as f64 * loads.len() as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle4() -> AdjacencyGraph {
        AdjacencyGraph::from_adjacency(vec![vec![1, 3], vec![0, 2], vec![1, 3], vec![2, 0]])
    }

    #[test]
    fn edge_cut_cycle() {
        let g = cycle4();
        assert_eq!(edge_cut(&g, &[0, 0, 0, 0]), 0);
        assert_eq!(edge_cut(&g, &[0, 0, 1, 1]), 2);
        assert_eq!(edge_cut(&g, &[0, 1, 0, 1]), 4);
    }

    #[test]
    fn loads_and_imbalance() {
        let loads = part_loads(&[0, 0, 1, 2, 2, 2], 3);
        assert_eq!(loads, vec![2, 1, 3]);
        assert!((imbalance(&loads) - 1.5).abs() < 1e-12);
        assert_eq!(imbalance(&[]), 1.0);
    }
}
