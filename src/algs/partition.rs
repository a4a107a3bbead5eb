//! Partitioner adapter: mesh → adjacency graph → external partitioner → owning rank per element.
//!
//! Uniform element types use the dual graph with the element's smallest face
//! as the common-nodes threshold. Mixed types use the nodal graph; each element
//! then goes to the part holding the plurality of its vertices, ties to the
//! lowest part. Ghost elements are never graph vertices and never get an owner.
//!
//! Ranks are 1-based: part `p` becomes rank `p + 1`, rank 0 being the coordinator.

use crate::algs::dual_graph::{AdjacencyGraph, build_dual, build_nodal};
use crate::partitioning::{
    GraphPartitioner, GraphStrategy, PartitionError, PartitionId, PartitionerConfig,
    check_labels, edge_cut, imbalance, part_loads,
};
use crate::topology::mesh::Mesh;

/// Owning rank per volume element; `None` for ghosts.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Partition {
    pub n_parts: usize,
    pub owner: Vec<Option<usize>>,
}

impl Partition {
    pub fn owner(&self, element: usize) -> Option<usize> {
        self.owner.get(element).copied().flatten()
    }

    /// Elements owned by `rank`, ascending.
    pub fn elements_of(&self, rank: usize) -> Vec<usize> {
        self.owner
            .iter()
            .enumerate()
            .filter(|(_, o)| **o == Some(rank))
            .map(|(e, _)| e)
            .collect()
    }

    /// Element count per rank `1..=n_parts` (index 0 is rank 1).
    pub fn loads(&self) -> Vec<usize> {
        let mut loads = vec![0; self.n_parts];
        for r in self.owner.iter().flatten() {
            loads[r - 1] += 1;
        }
        loads
    }
}

/// Which graph the adapter ended up using.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GraphKind {
    Dual { ncommon: usize },
    Nodal,
}

/// Pick the graph for `mesh` under `strategy`.
pub fn graph_kind(mesh: &Mesh, strategy: GraphStrategy) -> GraphKind {
    let ncommon = || {
        mesh.primary_elements()
            .map(|e| mesh.volume_elements[e].kind.min_face_vertices())
            .min()
            .unwrap_or(1)
    };
    match strategy {
        GraphStrategy::Nodal => GraphKind::Nodal,
        GraphStrategy::Dual => GraphKind::Dual { ncommon: ncommon() },
        GraphStrategy::Auto => match mesh.uniform_element_type() {
            Some(kind) => GraphKind::Dual {
                ncommon: kind.min_face_vertices(),
            },
            None => GraphKind::Nodal,
        },
    }
}

/// Partition the primary elements of `mesh` into `n_parts` ranks `1..=n_parts`.
pub fn partition_mesh<P: GraphPartitioner + ?Sized>(
    mesh: &Mesh,
    n_parts: usize,
    cfg: &PartitionerConfig,
    partitioner: &P,
) -> Result<Partition, PartitionError> {
    if n_parts == 0 {
        return Err(PartitionError::InvalidPartCount(n_parts));
    }
    let primaries: Vec<usize> = mesh.primary_elements().collect();
    if primaries.is_empty() {
        return Err(PartitionError::EmptyGraph);
    }
    mesh.validate_closure().map_err(|e| PartitionError::MalformedMesh(e.to_string()))?;

    let mut owner = vec![None; mesh.volume_elements.len()];
    match graph_kind(mesh, cfg.strategy) {
        GraphKind::Dual { ncommon } => {
            let graph = build_dual(mesh, &primaries, ncommon);
            let labels = run(partitioner, &graph, n_parts)?;
            log::info!(
                "dual-graph partition: {} elements, {} parts, edge cut {}, imbalance {:.3}",
                primaries.len(),
                n_parts,
                edge_cut(&graph, &labels),
                imbalance(&part_loads(&labels, n_parts))
            );
            for (&e, &l) in primaries.iter().zip(&labels) {
                owner[e] = Some(l + 1);
            }
        }
        GraphKind::Nodal => {
            let graph = build_nodal(mesh, &primaries);
            let labels = run(partitioner, &graph, n_parts)?;
            let mut votes = vec![0usize; n_parts];
            for &e in &primaries {
                votes.iter_mut().for_each(|v| *v = 0);
                for &p in &mesh.volume_elements[e].vertices {
                    votes[labels[p]] += 1;
                }
                owner[e] = Some(plurality(&votes) + 1);
            }
            log::info!(
                "nodal-graph partition: {} elements over {} points, {} parts",
                primaries.len(),
                graph.n_vertices(),
                n_parts
            );
        }
    }
    let partition = Partition { n_parts, owner };
    log::debug!("element loads per rank: {:?}", partition.loads());
    Ok(partition)
}

fn run<P: GraphPartitioner + ?Sized>(
    partitioner: &P,
    graph: &AdjacencyGraph,
    n_parts: usize,
) -> Result<Vec<PartitionId>, PartitionError> {
    if graph.is_empty() {
        return Err(PartitionError::EmptyGraph);
    }
    let labels = partitioner.partition_graph(graph, n_parts)?;
    check_labels(&labels, graph.n_vertices(), n_parts)?;
    Ok(labels)
}

/// Index of the largest vote; the lowest index wins ties.
pub fn plurality(votes: &[usize]) -> usize {
    let mut best = 0;
    for (p, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = p;
        }
    }
    best
}
