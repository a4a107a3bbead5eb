//! Build CSR (compressed-sparse-row) adjacency graphs of a mesh for the partitioner.
//
// Two flavours:
//
// * **dual graph**: one graph vertex per primary volume element; two elements
//   are adjacent when they share at least `ncommon` mesh vertices (a face).
// * **nodal graph**: one graph vertex per mesh point; two points are adjacent
//   when they span a mesh edge of some primary element.
//
// Returned in METIS-ready CSR triples:
//
// * `xadj[i] .. xadj[i+1]`   = neighbour list of graph vertex *i*
// * `adjncy`                 = concatenated neighbour vertices
// * `vwgt[i]`                = vertex weight, default = 1
//
// Both graphs are **symmetrised** (i↔j appear in both lists), **self-free**
// and neighbour lists are sorted.

use crate::overlap::perf::FastMap;
use crate::topology::mesh::Mesh;
use itertools::Itertools;

/// CSR triple
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacencyGraph {
    pub xadj: Vec<usize>,
    pub adjncy: Vec<usize>,
    pub vwgt: Vec<i32>, // METIS expects integer weights
}

impl AdjacencyGraph {
    /// Build from per-vertex neighbour lists; lists are sorted and deduplicated.
    pub fn from_adjacency(mut adj: Vec<Vec<usize>>) -> Self {
        let n = adj.len();
        let mut xadj = Vec::with_capacity(n + 1);
        let mut adjncy = Vec::new();
        xadj.push(0);
        for (v, nbrs) in adj.iter_mut().enumerate() {
            nbrs.sort_unstable();
            nbrs.dedup();
            adjncy.extend(nbrs.iter().copied().filter(|&u| u != v));
            xadj.push(adjncy.len());
        }
        AdjacencyGraph {
            xadj,
            adjncy,
            vwgt: vec![1; n],
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.n_vertices() == 0
    }

    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.adjncy[self.xadj[v]..self.xadj[v + 1]]
    }

    pub fn degree(&self, v: usize) -> usize {
        self.xadj[v + 1] - self.xadj[v]
    }

    pub fn degrees(&self) -> Vec<u64> {
        (0..self.n_vertices()).map(|v| self.degree(v) as u64).collect()
    }

    /// Undirected edges `(u, v)` with `u < v`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n_vertices()).flat_map(move |u| {
            self.neighbors(u)
                .iter()
                .copied()
                .filter(move |&v| u < v)
                .map(move |v| (u, v))
        })
    }

    pub fn n_edges(&self) -> usize {
        self.adjncy.len() / 2
    }
}

/// Dual graph over `elements` (indices into `mesh.volume_elements`); graph vertex
/// `i` is `elements[i]`. Elements sharing at least `ncommon` vertices are adjacent.
pub fn build_dual(mesh: &Mesh, elements: &[usize], ncommon: usize) -> AdjacencyGraph {
    let ncommon = ncommon.max(1);

    // point -> graph vertices touching it
    let mut touching: Vec<Vec<usize>> = vec![Vec::new(); mesh.points.len()];
    for (i, &e) in elements.iter().enumerate() {
        for &p in &mesh.volume_elements[e].vertices {
            touching[p].push(i);
        }
    }

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); elements.len()];
    let mut shared: FastMap<usize, usize> = FastMap::default();
    for (i, &e) in elements.iter().enumerate() {
        shared.clear();
        for &p in mesh.volume_elements[e].vertices.iter().unique() {
            for &j in &touching[p] {
                if j != i {
                    *shared.entry(j).or_insert(0) += 1;
                }
            }
        }
        adj[i].extend(
            shared
                .iter()
                .filter(|&(_, &count)| count >= ncommon)
                .map(|(&j, _)| j),
        );
    }
    AdjacencyGraph::from_adjacency(adj)
}

/// Nodal graph over every mesh point, connected along the edges of `elements`.
/// Each mesh edge is stored once per direction however many elements share it.
pub fn build_nodal(mesh: &Mesh, elements: &[usize]) -> AdjacencyGraph {
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); mesh.points.len()];
    for &e in elements {
        let el = &mesh.volume_elements[e];
        for &[a, b] in el.kind.edges() {
            let (u, v) = (el.vertices[a], el.vertices[b]);
            if u != v {
                adj[u].push(v);
                adj[v].push(u);
            }
        }
    }
    AdjacencyGraph::from_adjacency(adj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::cell_type::ElementType;
    use crate::topology::mesh::{MeshPoint, VolumeElement};

    // two tets sharing face (1,2,3) and a third touching only vertex 4
    fn tiny_mesh() -> Mesh {
        let mut m = Mesh::new();
        for i in 0..8 {
            m.add_point(MeshPoint::new(i as f64, 0.0, 0.0));
        }
        for verts in [[0, 1, 2, 3], [4, 1, 2, 3], [4, 5, 6, 7]] {
            m.add_volume_element(VolumeElement::new(ElementType::Tetrahedron, 1, verts.to_vec()))
                .unwrap();
        }
        m
    }

    #[test]
    fn dual_graph_needs_a_common_face() {
        let m = tiny_mesh();
        let g = build_dual(&m, &[0, 1, 2], 3);
        assert_eq!(g.xadj, vec![0, 1, 2, 2]);
        assert_eq!(g.neighbors(0), &[1]);
        assert_eq!(g.neighbors(1), &[0]);
        assert_eq!(g.degree(2), 0);
        assert_eq!(g.edges().collect::<Vec<_>>(), vec![(0, 1)]);

        // one common node is enough at ncommon = 1
        let g1 = build_dual(&m, &[0, 1, 2], 1);
        assert_eq!(g1.neighbors(1), &[0, 2]);
    }

    #[test]
    fn dual_graph_respects_element_subset() {
        let m = tiny_mesh();
        let g = build_dual(&m, &[1, 2], 1);
        assert_eq!(g.n_vertices(), 2);
        assert_eq!(g.neighbors(0), &[1]);
    }

    #[test]
    fn nodal_graph_dedups_shared_edges() {
        let m = tiny_mesh();
        let g = build_nodal(&m, &[0, 1]);
        assert_eq!(g.n_vertices(), 8);
        // 6 + 6 tet edges, 3 shared on face (1,2,3)
        assert_eq!(g.n_edges(), 9);
        assert_eq!(g.neighbors(1), &[0, 2, 3, 4]);
        assert_eq!(g.degree(7), 0);
    }
}
