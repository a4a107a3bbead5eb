//! Structured volume meshes of the box `[0,nx] x [0,ny] x [0,nz]`.
//!
//! Every generated mesh is complete: points, volume elements, one face
//! descriptor, a surface element per boundary face and boundary segments
//! along the twelve box edges. Used by tests and benches as the global mesh
//! handed to the distribution coordinator.

use crate::topology::cell_type::ElementType;
use crate::topology::local_topology::LocalTopology;
use crate::topology::mesh::{
    BoundarySegment, FaceDescriptor, Mesh, MeshPoint, SurfaceElement, VolumeElement,
};

/// Five-tet split of a unit cube, local corner index `i + 2j + 4k`. Cubes with
/// odd `i + j + k` use the mirrored split so face diagonals of neighbouring
/// cubes coincide.
const TETS_EVEN: [[usize; 4]; 5] = [[1, 2, 4, 7], [0, 1, 2, 4], [3, 1, 2, 7], [5, 1, 4, 7], [6, 2, 4, 7]];
const TETS_ODD: [[usize; 4]; 5] = [[0, 3, 5, 6], [1, 0, 3, 5], [2, 0, 3, 6], [4, 0, 5, 6], [7, 3, 5, 6]];

/// Hex corners in `ElementType::Hexahedron` order, as cube-corner indices.
const HEX_CORNERS: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];

/// Two prisms per cube, split along the vertical plane through corners 0 and 3.
const PRISMS: [[usize; 6]; 2] = [[0, 1, 3, 4, 5, 7], [0, 3, 2, 4, 7, 6]];

struct Grid {
    nx: usize,
    ny: usize,
    nz: usize,
}

impl Grid {
    fn point(&self, i: usize, j: usize, k: usize) -> usize {
        i + (self.nx + 1) * (j + (self.ny + 1) * k)
    }

    fn corner(&self, i: usize, j: usize, k: usize, c: usize) -> usize {
        self.point(i + (c & 1), j + ((c >> 1) & 1), k + ((c >> 2) & 1))
    }

    fn points(&self) -> Vec<MeshPoint> {
        let mut pts = Vec::with_capacity((self.nx + 1) * (self.ny + 1) * (self.nz + 1));
        for k in 0..=self.nz {
            for j in 0..=self.ny {
                for i in 0..=self.nx {
                    pts.push(MeshPoint::new(i as f64, j as f64, k as f64));
                }
            }
        }
        pts
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.nz).flat_map(move |k| {
            (0..self.ny).flat_map(move |j| (0..self.nx).map(move |i| (i, j, k)))
        })
    }
}

/// `5 * nx * ny * nz` conforming tetrahedra.
pub fn tet_box(nx: usize, ny: usize, nz: usize) -> Mesh {
    let grid = Grid { nx, ny, nz };
    let mut mesh = Mesh {
        points: grid.points(),
        ..Mesh::default()
    };
    for (i, j, k) in grid.cells() {
        let split = if (i + j + k) % 2 == 0 { &TETS_EVEN } else { &TETS_ODD };
        for tet in split {
            let vertices = tet.iter().map(|&c| grid.corner(i, j, k, c)).collect();
            mesh.volume_elements
                .push(VolumeElement::new(ElementType::Tetrahedron, 1, vertices));
        }
    }
    finish_boundary(&mut mesh, &grid);
    mesh
}

/// `nx * ny * nz` hexahedra.
pub fn hex_box(nx: usize, ny: usize, nz: usize) -> Mesh {
    let grid = Grid { nx, ny, nz };
    let mut mesh = Mesh {
        points: grid.points(),
        ..Mesh::default()
    };
    for (i, j, k) in grid.cells() {
        let vertices = HEX_CORNERS.iter().map(|&c| grid.corner(i, j, k, c)).collect();
        mesh.volume_elements
            .push(VolumeElement::new(ElementType::Hexahedron, 1, vertices));
    }
    finish_boundary(&mut mesh, &grid);
    mesh
}

/// Hexahedra in even `i` columns, prism pairs in odd ones: `nx * ny * nz`
/// cubes, a mixed-type mesh whose hex/prism interfaces are full quads.
pub fn prism_hex_box(nx: usize, ny: usize, nz: usize) -> Mesh {
    let grid = Grid { nx, ny, nz };
    let mut mesh = Mesh {
        points: grid.points(),
        ..Mesh::default()
    };
    for (i, j, k) in grid.cells() {
        if i % 2 == 0 {
            let vertices = HEX_CORNERS.iter().map(|&c| grid.corner(i, j, k, c)).collect();
            mesh.volume_elements
                .push(VolumeElement::new(ElementType::Hexahedron, 1, vertices));
        } else {
            for prism in &PRISMS {
                let vertices = prism.iter().map(|&c| grid.corner(i, j, k, c)).collect();
                mesh.volume_elements
                    .push(VolumeElement::new(ElementType::Prism, 2, vertices));
            }
        }
    }
    finish_boundary(&mut mesh, &grid);
    mesh
}

fn finish_boundary(mesh: &mut Mesh, grid: &Grid) {
    mesh.face_descriptors.push(FaceDescriptor {
        surface: 1,
        domain_in: 1,
        domain_out: 0,
        bc: 1,
    });

    let topo = LocalTopology::build(mesh);
    for f in topo.boundary_faces() {
        let vertices = topo.face(f).to_vec();
        let kind = if vertices.len() == 3 {
            ElementType::Triangle
        } else {
            ElementType::Quadrilateral
        };
        mesh.surface_elements.push(SurfaceElement {
            kind,
            face_descriptor: 0,
            geominfo: vec![1; vertices.len()],
            vertices,
        });
    }

    let (nx, ny, nz) = (grid.nx, grid.ny, grid.nz);
    let mut edge_nr = 0;
    let mut line = |mesh: &mut Mesh, pts: Vec<usize>| {
        edge_nr += 1;
        for w in pts.windows(2) {
            mesh.segments.push(BoundarySegment {
                vertices: [w[0], w[1]],
                edge_nr,
                surfaces: [1, 1],
                geominfo: [0, 0],
            });
        }
    };
    for (j, k) in [(0, 0), (ny, 0), (0, nz), (ny, nz)] {
        line(mesh, (0..=nx).map(|i| grid.point(i, j, k)).collect());
    }
    for (i, k) in [(0, 0), (nx, 0), (0, nz), (nx, nz)] {
        line(mesh, (0..=ny).map(|j| grid.point(i, j, k)).collect());
    }
    for (i, j) in [(0, 0), (nx, 0), (0, ny), (nx, ny)] {
        line(mesh, (0..=nz).map(|k| grid.point(i, j, k)).collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tet_box_is_conforming() {
        let mesh = tet_box(5, 2, 2);
        assert_eq!(mesh.volume_elements.len(), 100);
        assert_eq!(mesh.points.len(), 54);
        mesh.validate_closure().unwrap();

        let topo = LocalTopology::build(&mesh);
        // 2 triangles per boundary cube face
        let boundary_quads = 2 * (5 * 2 + 5 * 2 + 2 * 2);
        assert_eq!(topo.boundary_faces().count(), 2 * boundary_quads);
        assert_eq!(mesh.surface_elements.len(), 2 * boundary_quads);
        assert!((0..topo.n_faces()).all(|f| topo.face_elements(f).len() <= 2));
        assert_eq!(mesh.segments.len(), 4 * (5 + 2 + 2));
    }

    #[test]
    fn segments_lie_on_mesh_edges() {
        let mesh = tet_box(2, 3, 1);
        let topo = LocalTopology::build(&mesh);
        for seg in &mesh.segments {
            assert!(topo.find_edge(seg.vertices[0], seg.vertices[1]).is_some());
        }
    }

    #[test]
    fn hex_box_counts() {
        let mesh = hex_box(2, 2, 2);
        assert_eq!(mesh.volume_elements.len(), 8);
        assert_eq!(mesh.points.len(), 27);
        let topo = LocalTopology::build(&mesh);
        assert_eq!(topo.n_faces(), 36);
        assert_eq!(topo.boundary_faces().count(), 24);
    }

    #[test]
    fn prism_hex_box_mixes_types_conformingly() {
        let mesh = prism_hex_box(4, 2, 2);
        assert_eq!(mesh.volume_elements.len(), 8 + 16);
        assert_eq!(mesh.uniform_element_type(), None);
        mesh.validate_closure().unwrap();

        let topo = LocalTopology::build(&mesh);
        assert!((0..topo.n_faces()).all(|f| topo.face_elements(f).len() <= 2));
        // x and y sides are quads; top and bottom carry 4 quads and 8 triangles each
        let tris = mesh
            .surface_elements
            .iter()
            .filter(|se| se.kind == ElementType::Triangle)
            .count();
        assert_eq!(tris, 16);
        assert_eq!(mesh.surface_elements.len(), 8 + 16 + 8 + 16);
    }
}
