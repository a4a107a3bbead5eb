//! Seed selection for graph partitioning.
//!
//! [`pick_seeds`] draws seed candidates with probability weighted by vertex
//! degree and without replacement; [`spread_seeds`] then keeps the candidates
//! that are farthest apart in hop distance.

use crate::algs::dual_graph::AdjacencyGraph;
use crate::partitioning::{PartitionError, PartitionerConfig};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::VecDeque;

/// Returns an error if `degrees.len()` doesn’t match the number of vertices.
pub fn pick_seeds(
    graph: &AdjacencyGraph,
    degrees: &[u64],
    n_parts: usize,
    cfg: &PartitionerConfig,
) -> Result<Vec<usize>, PartitionError> {
    let n = graph.n_vertices();
    if degrees.len() != n {
        return Err(PartitionError::DegreeLengthMismatch {
            expected: n,
            got: degrees.len(),
        });
    }
    if n == 0 {
        return Ok(Vec::new());
    }
    let num_seeds = ((cfg.seed_factor.max(1.0) * n_parts as f64).ceil() as usize)
        .min(n)
        .max(1);
    let mut weights = degrees.to_vec();
    let mut prefix: Vec<u64> = Vec::with_capacity(n);
    let mut sum = 0u64;
    for &w in &weights {
        sum += w;
        prefix.push(sum);
    }
    let mut rng = SmallRng::seed_from_u64(cfg.rng_seed);
    let mut chosen = Vec::with_capacity(num_seeds);
    if sum == 0 {
        // all degrees zero: uniform without replacement
        let mut pool: Vec<usize> = (0..n).collect();
        for _ in 0..num_seeds {
            let idx = rng.gen_range(0..pool.len());
            chosen.push(pool.swap_remove(idx));
        }
        return Ok(chosen);
    }
    for _ in 0..num_seeds {
        let total_weight = prefix[n - 1];
        if total_weight == 0 {
            break;
        }
        let t = rng.gen_range(0..total_weight);
        // first prefix strictly greater than t
        let mut i = prefix.partition_point(|&p| p <= t);
        while i < n && weights[i] == 0 {
            i += 1;
        }
        if i == n {
            break;
        }
        chosen.push(i);
        let w = weights[i];
        weights[i] = 0;
        for p in &mut prefix[i..] {
            *p -= w;
        }
    }
    Ok(chosen)
}

/// Hop distance from the nearest of `sources`; `usize::MAX` when unreachable.
pub fn hop_distances(graph: &AdjacencyGraph, sources: &[usize]) -> Vec<usize> {
    let mut dist = vec![usize::MAX; graph.n_vertices()];
    let mut queue = VecDeque::new();
    for &s in sources {
        if dist[s] != 0 {
            dist[s] = 0;
            queue.push_back(s);
        }
    }
    while let Some(v) = queue.pop_front() {
        for &u in graph.neighbors(v) {
            if dist[u] == usize::MAX {
                dist[u] = dist[v] + 1;
                queue.push_back(u);
            }
        }
    }
    dist
}

/// Farthest-first choice of `n_parts` seeds among `candidates`, starting from
/// the first candidate. Unreachable candidates count as infinitely far.
pub fn spread_seeds(graph: &AdjacencyGraph, candidates: &[usize], n_parts: usize) -> Vec<usize> {
    let Some(&first) = candidates.first() else {
        return Vec::new();
    };
    let mut seeds = vec![first];
    while seeds.len() < n_parts {
        let dist = hop_distances(graph, &seeds);
        let next = candidates
            .iter()
            .copied()
            .filter(|c| !seeds.contains(c))
            .max_by_key(|&c| (dist[c], std::cmp::Reverse(c)));
        match next {
            Some(c) => seeds.push(c),
            None => break,
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(n: usize) -> AdjacencyGraph {
        let adj = (0..n)
            .map(|v| {
                let mut neigh = Vec::new();
                if v > 0 {
                    neigh.push(v - 1);
                }
                if v + 1 < n {
                    neigh.push(v + 1);
                }
                neigh
            })
            .collect();
        AdjacencyGraph::from_adjacency(adj)
    }

    #[test]
    fn pick_seeds_length_mismatch() {
        let g = path_graph(3);
        let err = pick_seeds(&g, &[1, 2], 1, &PartitionerConfig::default()).unwrap_err();
        assert_eq!(err, PartitionError::DegreeLengthMismatch { expected: 3, got: 2 });
    }

    #[test]
    fn pick_seeds_are_distinct_and_capped() {
        let g = path_graph(3);
        let cfg = PartitionerConfig {
            seed_factor: 1.0,
            ..Default::default()
        };
        let mut seeds = pick_seeds(&g, &g.degrees(), 5, &cfg).unwrap();
        seeds.sort_unstable();
        assert_eq!(seeds, vec![0, 1, 2]);
    }

    #[test]
    fn pick_seeds_is_reproducible() {
        let g = path_graph(50);
        let cfg = PartitionerConfig::default();
        let a = pick_seeds(&g, &g.degrees(), 4, &cfg).unwrap();
        let b = pick_seeds(&g, &g.degrees(), 4, &cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn zero_degrees_fall_back_to_uniform() {
        let g = AdjacencyGraph::from_adjacency(vec![Vec::new(); 4]);
        let seeds = pick_seeds(&g, &[0; 4], 2, &PartitionerConfig {
            seed_factor: 1.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(seeds.len(), 2);
        assert_ne!(seeds[0], seeds[1]);
    }

    #[test]
    fn spread_prefers_far_candidates() {
        let g = path_graph(10);
        let seeds = spread_seeds(&g, &[4, 5, 0, 9], 2);
        assert_eq!(seeds, vec![4, 9]);
    }
}
