//! Mesh containers shared by the coordinator's global mesh and every local shard.
//!
//! Indices are 0-based and dense per entity kind. Elements reference vertices by
//! their index into [`Mesh::points`].

use crate::mesh_error::MeshShardError;
use crate::topology::cell_type::ElementType;
use crate::topology::entity::EntityKind;

/// A mesh vertex: coordinates plus one extra scalar carried along (e.g. a
/// mesh-size or layer tag).
#[derive(Copy, Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MeshPoint {
    pub coords: [f64; 3],
    pub extra: f64,
}

impl MeshPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            coords: [x, y, z],
            extra: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VolumeElement {
    pub kind: ElementType,
    pub material: u32,
    pub vertices: Vec<usize>,
    /// Mirrored copy of a neighbour rank's element.
    pub is_ghost: bool,
}

impl VolumeElement {
    pub fn new(kind: ElementType, material: u32, vertices: Vec<usize>) -> Self {
        Self {
            kind,
            material,
            vertices,
            is_ghost: false,
        }
    }
}

/// Boundary-condition / domain description referenced by surface elements.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FaceDescriptor {
    pub surface: u32,
    pub domain_in: u32,
    pub domain_out: u32,
    pub bc: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceElement {
    pub kind: ElementType,
    /// Index into [`Mesh::face_descriptors`].
    pub face_descriptor: usize,
    pub vertices: Vec<usize>,
    /// Geometric-info tag per vertex (same length as `vertices`).
    pub geominfo: Vec<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BoundarySegment {
    pub vertices: [usize; 2],
    pub edge_nr: u32,
    pub surfaces: [u32; 2],
    pub geominfo: [u32; 2],
}

/// Points, volume elements, face descriptors, surface elements and boundary segments.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Mesh {
    pub points: Vec<MeshPoint>,
    pub volume_elements: Vec<VolumeElement>,
    pub face_descriptors: Vec<FaceDescriptor>,
    pub surface_elements: Vec<SurfaceElement>,
    pub segments: Vec<BoundarySegment>,
}

/// `element` must be of `dimension` and carry exactly its vertex count.
fn check_shape(
    kind: EntityKind,
    index: usize,
    element: ElementType,
    dimension: u8,
    vertices: &[usize],
) -> Result<(), MeshShardError> {
    if element.dimension() != dimension {
        return Err(MeshShardError::ElementDimension {
            kind,
            index,
            element,
        });
    }
    let expected = element.vertex_count();
    if vertices.len() != expected {
        return Err(MeshShardError::ElementShape {
            kind,
            index,
            element,
            expected,
            found: vertices.len(),
        });
    }
    Ok(())
}

fn check_surface(index: usize, el: &SurfaceElement) -> Result<(), MeshShardError> {
    check_shape(EntityKind::SurfaceElement, index, el.kind, 2, &el.vertices)?;
    if el.geominfo.len() != el.vertices.len() {
        return Err(MeshShardError::ElementShape {
            kind: EntityKind::SurfaceElement,
            index,
            element: el.kind,
            expected: el.vertices.len(),
            found: el.geominfo.len(),
        });
    }
    Ok(())
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, p: MeshPoint) -> usize {
        self.points.push(p);
        self.points.len() - 1
    }

    pub fn add_volume_element(&mut self, el: VolumeElement) -> Result<usize, MeshShardError> {
        let index = self.volume_elements.len();
        check_shape(EntityKind::VolumeElement, index, el.kind, 3, &el.vertices)?;
        self.check_vertices(EntityKind::VolumeElement, index, &el.vertices)?;
        self.volume_elements.push(el);
        Ok(index)
    }

    pub fn add_face_descriptor(&mut self, fd: FaceDescriptor) -> usize {
        self.face_descriptors.push(fd);
        self.face_descriptors.len() - 1
    }

    pub fn add_surface_element(&mut self, el: SurfaceElement) -> Result<usize, MeshShardError> {
        let index = self.surface_elements.len();
        check_surface(index, &el)?;
        self.check_vertices(EntityKind::SurfaceElement, index, &el.vertices)?;
        if el.face_descriptor >= self.face_descriptors.len() {
            return Err(MeshShardError::InvalidState(format!(
                "surface element {index} uses face descriptor {} of {}",
                el.face_descriptor,
                self.face_descriptors.len()
            )));
        }
        self.surface_elements.push(el);
        Ok(index)
    }

    pub fn add_segment(&mut self, seg: BoundarySegment) -> Result<usize, MeshShardError> {
        let index = self.segments.len();
        self.check_vertices(EntityKind::BoundarySegment, index, &seg.vertices)?;
        self.segments.push(seg);
        Ok(index)
    }

    fn check_vertices(
        &self,
        kind: EntityKind,
        index: usize,
        vertices: &[usize],
    ) -> Result<(), MeshShardError> {
        match vertices.iter().find(|&&v| v >= self.points.len()) {
            Some(&vertex) => Err(MeshShardError::InvalidElement {
                kind,
                index,
                vertex,
                n_points: self.points.len(),
            }),
            None => Ok(()),
        }
    }

    /// Number of entities of a stored kind. Edges and faces are derived and live
    /// in [`LocalTopology`](crate::topology::local_topology::LocalTopology).
    pub fn count(&self, kind: EntityKind) -> Option<usize> {
        match kind {
            EntityKind::Vertex => Some(self.points.len()),
            EntityKind::VolumeElement => Some(self.volume_elements.len()),
            EntityKind::SurfaceElement => Some(self.surface_elements.len()),
            EntityKind::BoundarySegment => Some(self.segments.len()),
            EntityKind::Edge | EntityKind::Face => None,
        }
    }

    /// Indices of non-ghost volume elements.
    pub fn primary_elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.volume_elements
            .iter()
            .enumerate()
            .filter(|(_, el)| !el.is_ghost)
            .map(|(i, _)| i)
    }

    pub fn ghost_element_count(&self) -> usize {
        self.volume_elements.iter().filter(|el| el.is_ghost).count()
    }

    /// The shared element type when every non-ghost volume element has the same one.
    pub fn uniform_element_type(&self) -> Option<ElementType> {
        let mut types = self
            .volume_elements
            .iter()
            .filter(|el| !el.is_ghost)
            .map(|el| el.kind);
        let first = types.next()?;
        types.all(|t| t == first).then_some(first)
    }

    /// Check that every element has the shape of its type and that elements,
    /// surface elements and segments only reference existing points.
    pub fn validate_closure(&self) -> Result<(), MeshShardError> {
        for (i, el) in self.volume_elements.iter().enumerate() {
            check_shape(EntityKind::VolumeElement, i, el.kind, 3, &el.vertices)?;
            self.check_vertices(EntityKind::VolumeElement, i, &el.vertices)?;
        }
        for (i, el) in self.surface_elements.iter().enumerate() {
            check_surface(i, el)?;
            self.check_vertices(EntityKind::SurfaceElement, i, &el.vertices)?;
        }
        for (i, seg) in self.segments.iter().enumerate() {
            self.check_vertices(EntityKind::BoundarySegment, i, &seg.vertices)?;
        }
        Ok(())
    }
}
