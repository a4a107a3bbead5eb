//! Element type metadata: vertex counts and reference face/edge tables.

/// Element shapes carried by volume elements, surface elements and segments.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ElementType {
    /// 1D segment/edge.
    Segment,
    /// 2D simplex (triangle).
    #[default]
    Triangle,
    /// 2D tensor-product cell (quad).
    Quadrilateral,
    /// 3D simplex (tet).
    Tetrahedron,
    /// 3D pyramid.
    Pyramid,
    /// 3D wedge/prism.
    Prism,
    /// 3D tensor-product cell (hex).
    Hexahedron,
}

const TET_FACES: &[&[usize]] = &[&[1, 2, 3], &[0, 2, 3], &[0, 1, 3], &[0, 1, 2]];
const TET_EDGES: &[[usize; 2]] = &[[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

const PYRAMID_FACES: &[&[usize]] = &[
    &[0, 1, 2, 3],
    &[0, 1, 4],
    &[1, 2, 4],
    &[2, 3, 4],
    &[3, 0, 4],
];
const PYRAMID_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [0, 4],
    [1, 4],
    [2, 4],
    [3, 4],
];

const PRISM_FACES: &[&[usize]] = &[
    &[0, 1, 2],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[2, 0, 3, 5],
];
const PRISM_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 0],
    [3, 4],
    [4, 5],
    [5, 3],
    [0, 3],
    [1, 4],
    [2, 5],
];

const HEX_FACES: &[&[usize]] = &[
    &[0, 1, 2, 3],
    &[4, 5, 6, 7],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
];
const HEX_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

const TRIANGLE_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0]];
const QUAD_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 3], [3, 0]];
const SEGMENT_EDGES: &[[usize; 2]] = &[[0, 1]];

impl ElementType {
    /// Returns the topological dimension of the element.
    pub fn dimension(self) -> u8 {
        match self {
            ElementType::Segment => 1,
            ElementType::Triangle | ElementType::Quadrilateral => 2,
            ElementType::Tetrahedron
            | ElementType::Pyramid
            | ElementType::Prism
            | ElementType::Hexahedron => 3,
        }
    }

    /// Number of vertices of the element.
    pub fn vertex_count(self) -> usize {
        match self {
            ElementType::Segment => 2,
            ElementType::Triangle => 3,
            ElementType::Quadrilateral | ElementType::Tetrahedron => 4,
            ElementType::Pyramid => 5,
            ElementType::Prism => 6,
            ElementType::Hexahedron => 8,
        }
    }

    /// Local vertex lists of the element's faces. Empty below dimension 3.
    pub fn faces(self) -> &'static [&'static [usize]] {
        match self {
            ElementType::Tetrahedron => TET_FACES,
            ElementType::Pyramid => PYRAMID_FACES,
            ElementType::Prism => PRISM_FACES,
            ElementType::Hexahedron => HEX_FACES,
            _ => &[],
        }
    }

    /// Local vertex pairs of the element's edges.
    pub fn edges(self) -> &'static [[usize; 2]] {
        match self {
            ElementType::Segment => SEGMENT_EDGES,
            ElementType::Triangle => TRIANGLE_EDGES,
            ElementType::Quadrilateral => QUAD_EDGES,
            ElementType::Tetrahedron => TET_EDGES,
            ElementType::Pyramid => PYRAMID_EDGES,
            ElementType::Prism => PRISM_EDGES,
            ElementType::Hexahedron => HEX_EDGES,
        }
    }

    /// Fewest vertices on any face; the "common nodes" threshold for dual-graph adjacency.
    pub fn min_face_vertices(self) -> usize {
        self.faces()
            .iter()
            .map(|f| f.len())
            .min()
            .unwrap_or(self.vertex_count())
    }

    /// Wire code; inverse of [`ElementType::from_code`].
    pub fn code(self) -> u8 {
        match self {
            ElementType::Segment => 1,
            ElementType::Triangle => 2,
            ElementType::Quadrilateral => 3,
            ElementType::Tetrahedron => 4,
            ElementType::Pyramid => 5,
            ElementType::Prism => 6,
            ElementType::Hexahedron => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => ElementType::Segment,
            2 => ElementType::Triangle,
            3 => ElementType::Quadrilateral,
            4 => ElementType::Tetrahedron,
            5 => ElementType::Pyramid,
            6 => ElementType::Prism,
            7 => ElementType::Hexahedron,
            _ => return None,
        })
    }

    /// Guess the volume element type from its vertex count.
    pub fn volume_from_vertex_count(n: usize) -> Option<Self> {
        Some(match n {
            4 => ElementType::Tetrahedron,
            5 => ElementType::Pyramid,
            6 => ElementType::Prism,
            8 => ElementType::Hexahedron,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_tables_reference_valid_vertices() {
        for ty in [
            ElementType::Tetrahedron,
            ElementType::Pyramid,
            ElementType::Prism,
            ElementType::Hexahedron,
        ] {
            let n = ty.vertex_count();
            assert!(ty.faces().iter().flat_map(|f| f.iter()).all(|&v| v < n));
            assert!(ty.edges().iter().flat_map(|e| e.iter()).all(|&v| v < n));
        }
    }

    #[test]
    fn euler_characteristic_of_volume_types() {
        // V - E + F = 2 for every convex polyhedron.
        for ty in [
            ElementType::Tetrahedron,
            ElementType::Pyramid,
            ElementType::Prism,
            ElementType::Hexahedron,
        ] {
            let chi = ty.vertex_count() as isize - ty.edges().len() as isize
                + ty.faces().len() as isize;
            assert_eq!(chi, 2, "{ty:?}");
        }
    }

    #[test]
    fn common_nodes_threshold() {
        assert_eq!(ElementType::Tetrahedron.min_face_vertices(), 3);
        assert_eq!(ElementType::Prism.min_face_vertices(), 3);
        assert_eq!(ElementType::Hexahedron.min_face_vertices(), 4);
    }
}
