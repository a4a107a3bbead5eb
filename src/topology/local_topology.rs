//! Derived topology of a mesh: unique edges and faces plus the incidence tables
//! the stitcher, overlap extender and dual-graph builder walk.
//!
//! Edges and faces are numbered in first-seen order while scanning volume
//! elements in index order. Appending elements (ghost layers) therefore never
//! renumbers the edges and faces of the elements already present.

use crate::overlap::perf::FastMap;
use crate::topology::mesh::Mesh;

#[derive(Clone, Debug, Default)]
pub struct LocalTopology {
    edges: Vec<[usize; 2]>,
    faces: Vec<Vec<usize>>,
    edge_index: FastMap<[usize; 2], usize>,
    face_index: FastMap<Vec<usize>, usize>,
    element_edges: Vec<Vec<usize>>,
    element_faces: Vec<Vec<usize>>,
    face_elements: Vec<Vec<usize>>,
    face_edges: Vec<Vec<usize>>,
    vertex_elements: Vec<Vec<usize>>,
}

#[inline]
fn edge_key(a: usize, b: usize) -> [usize; 2] {
    if a <= b { [a, b] } else { [b, a] }
}

fn face_key(vertices: &[usize]) -> Vec<usize> {
    let mut key = vertices.to_vec();
    key.sort_unstable();
    key
}

impl LocalTopology {
    /// Build edges, faces and incidences for every volume element of `mesh`.
    pub fn build(mesh: &Mesh) -> Self {
        let mut topo = LocalTopology {
            vertex_elements: vec![Vec::new(); mesh.points.len()],
            ..Default::default()
        };

        for (e, el) in mesh.volume_elements.iter().enumerate() {
            let mut el_edges = Vec::with_capacity(el.kind.edges().len());
            for &[a, b] in el.kind.edges() {
                let key = edge_key(el.vertices[a], el.vertices[b]);
                let id = match topo.edge_index.get(&key) {
                    Some(&id) => id,
                    None => {
                        let id = topo.edges.len();
                        topo.edges.push(key);
                        topo.edge_index.insert(key, id);
                        id
                    }
                };
                el_edges.push(id);
            }
            topo.element_edges.push(el_edges);

            let mut el_faces = Vec::with_capacity(el.kind.faces().len());
            for local in el.kind.faces() {
                let verts: Vec<usize> = local.iter().map(|&i| el.vertices[i]).collect();
                let key = face_key(&verts);
                let id = match topo.face_index.get(&key) {
                    Some(&id) => id,
                    None => {
                        let id = topo.faces.len();
                        let edges = (0..verts.len())
                            .map(|i| {
                                let k = edge_key(verts[i], verts[(i + 1) % verts.len()]);
                                topo.edge_index[&k]
                            })
                            .collect();
                        topo.faces.push(verts);
                        topo.face_edges.push(edges);
                        topo.face_elements.push(Vec::with_capacity(2));
                        topo.face_index.insert(key, id);
                        id
                    }
                };
                topo.face_elements[id].push(e);
                el_faces.push(id);
            }
            topo.element_faces.push(el_faces);

            for &v in &el.vertices {
                topo.vertex_elements[v].push(e);
            }
        }
        topo
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    /// Local vertex ids of edge `i`, smaller id first.
    pub fn edge(&self, i: usize) -> [usize; 2] {
        self.edges[i]
    }

    /// Local vertex ids of face `i` in the orientation of its first element.
    pub fn face(&self, i: usize) -> &[usize] {
        &self.faces[i]
    }

    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_index.get(&edge_key(a, b)).copied()
    }

    pub fn find_face(&self, vertices: &[usize]) -> Option<usize> {
        self.face_index.get(&face_key(vertices)).copied()
    }

    pub fn element_edges(&self, e: usize) -> &[usize] {
        &self.element_edges[e]
    }

    pub fn element_faces(&self, e: usize) -> &[usize] {
        &self.element_faces[e]
    }

    pub fn face_elements(&self, f: usize) -> &[usize] {
        &self.face_elements[f]
    }

    pub fn face_edges(&self, f: usize) -> &[usize] {
        &self.face_edges[f]
    }

    pub fn vertex_elements(&self, v: usize) -> &[usize] {
        self.vertex_elements.get(v).map_or(&[], |els| els.as_slice())
    }

    /// Faces with exactly one adjacent element.
    pub fn boundary_faces(&self) -> impl Iterator<Item = usize> + '_ {
        self.face_elements
            .iter()
            .enumerate()
            .filter(|(_, els)| els.len() == 1)
            .map(|(f, _)| f)
    }

    /// Elements containing both endpoints of edge `i`.
    pub fn edge_elements(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let [a, b] = self.edges[i];
        let of_b = self.vertex_elements(b);
        self.vertex_elements(a)
            .iter()
            .copied()
            .filter(move |e| of_b.contains(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::cell_type::ElementType;
    use crate::topology::mesh::{MeshPoint, VolumeElement};

    /// Two tets sharing face (1,2,3).
    fn two_tets() -> Mesh {
        let mut m = Mesh::new();
        for p in [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
        ] {
            m.add_point(MeshPoint::new(p[0], p[1], p[2]));
        }
        m.add_volume_element(VolumeElement::new(ElementType::Tetrahedron, 1, vec![0, 1, 2, 3]))
            .unwrap();
        m.add_volume_element(VolumeElement::new(ElementType::Tetrahedron, 1, vec![4, 1, 2, 3]))
            .unwrap();
        m
    }

    #[test]
    fn shared_face_is_counted_once() {
        let topo = LocalTopology::build(&two_tets());
        assert_eq!(topo.n_faces(), 7);
        assert_eq!(topo.n_edges(), 9);
        let shared = topo.find_face(&[3, 2, 1]).unwrap();
        assert_eq!(topo.face_elements(shared), &[0, 1]);
        assert_eq!(topo.boundary_faces().count(), 6);
        assert_eq!(topo.face_edges(shared).len(), 3);
    }

    #[test]
    fn appending_elements_keeps_numbering() {
        let mut m = two_tets();
        let before = LocalTopology::build(&m);
        m.add_point(MeshPoint::new(2.0, 2.0, 2.0));
        m.add_volume_element(VolumeElement::new(ElementType::Tetrahedron, 1, vec![5, 4, 2, 3]))
            .unwrap();
        let after = LocalTopology::build(&m);
        for f in 0..before.n_faces() {
            assert_eq!(before.face(f), after.face(f));
        }
        for e in 0..before.n_edges() {
            assert_eq!(before.edge(e), after.edge(e));
        }
        assert!(after.n_faces() > before.n_faces());
    }

    #[test]
    fn edge_elements_lists_all_incident() {
        let topo = LocalTopology::build(&two_tets());
        let e = topo.find_edge(2, 1).unwrap();
        assert_eq!(topo.edge_elements(e).collect::<Vec<_>>(), vec![0, 1]);
    }
}
