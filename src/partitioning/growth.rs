//! Seeded graph-growing partitioner.
//!
//! Seeds come from [`pick_seeds`] followed by a farthest-first spread. Parts
//! then grow breadth-first in round-robin order, one vertex per part per
//! round, until each reaches `ceil(n / n_parts)` vertices. Vertices that no
//! part can reach (disconnected graphs) go to the currently smallest part.

use crate::algs::dual_graph::AdjacencyGraph;
use crate::partitioning::seed_select::{pick_seeds, spread_seeds};
use crate::partitioning::{GraphPartitioner, PartitionError, PartitionId, PartitionerConfig};
use std::collections::VecDeque;

const UNASSIGNED: usize = usize::MAX;

#[derive(Clone, Debug, Default)]
pub struct GreedyPartitioner {
    pub cfg: PartitionerConfig,
}

impl GreedyPartitioner {
    pub fn new(cfg: PartitionerConfig) -> Self {
        Self { cfg }
    }
}

struct Growth<'g> {
    graph: &'g AdjacencyGraph,
    label: Vec<usize>,
    sizes: Vec<usize>,
    frontier: Vec<VecDeque<usize>>,
    assigned: usize,
}

impl<'g> Growth<'g> {
    fn claim(&mut self, v: usize, part: usize) {
        self.label[v] = part;
        self.sizes[part] += 1;
        self.frontier[part].push_back(v);
        self.assigned += 1;
    }

    /// Claim one unassigned neighbour of the part's frontier; `false` when stalled.
    fn grow(&mut self, part: usize) -> bool {
        while let Some(&v) = self.frontier[part].front() {
            let next = self
                .graph
                .neighbors(v)
                .iter()
                .copied()
                .find(|&u| self.label[u] == UNASSIGNED);
            match next {
                Some(u) => {
                    self.claim(u, part);
                    return true;
                }
                None => {
                    self.frontier[part].pop_front();
                }
            }
        }
        false
    }
}

impl GraphPartitioner for GreedyPartitioner {
    fn partition_graph(
        &self,
        graph: &AdjacencyGraph,
        n_parts: usize,
    ) -> Result<Vec<PartitionId>, PartitionError> {
        if n_parts == 0 {
            return Err(PartitionError::InvalidPartCount(n_parts));
        }
        let n = graph.n_vertices();
        if n == 0 {
            return Ok(Vec::new());
        }
        if n_parts == 1 {
            return Ok(vec![0; n]);
        }

        let candidates = pick_seeds(graph, &graph.degrees(), n_parts, &self.cfg)?;
        let mut seeds = spread_seeds(graph, &candidates, n_parts);
        // isolated vertices never win the degree-weighted draw
        let wanted = n_parts.min(n);
        for v in 0..n {
            if seeds.len() >= wanted {
                break;
            }
            if !seeds.contains(&v) {
                seeds.push(v);
            }
        }

        let mut g = Growth {
            graph,
            label: vec![UNASSIGNED; n],
            sizes: vec![0; n_parts],
            frontier: vec![VecDeque::new(); n_parts],
            assigned: 0,
        };
        for (part, &s) in seeds.iter().enumerate() {
            g.claim(s, part);
        }

        let target = n.div_ceil(n_parts);
        let mut next_orphan = 0;
        while g.assigned < n {
            let mut progressed = false;
            for part in 0..n_parts {
                if g.sizes[part] < target && g.grow(part) {
                    progressed = true;
                }
            }
            if !progressed {
                while g.label[next_orphan] != UNASSIGNED {
                    next_orphan += 1;
                }
                let smallest = (0..n_parts)
                    .min_by_key(|&p| (g.sizes[p], p))
                    .unwrap_or(0);
                g.claim(next_orphan, smallest);
            }
        }
        log::debug!(
            "greedy partition: {n} vertices into {n_parts} parts, sizes {:?}",
            g.sizes
        );
        Ok(g.label)
    }
}
