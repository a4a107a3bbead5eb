//! Mesh containers and the local topology derived from them.
//!
//! A [`Mesh`] stores points and the explicit element lists; edges and faces
//! are never stored but derived per shard by [`LocalTopology`]. A
//! [`MeshShard`] bundles one rank's mesh with its cross-rank tables.

pub mod cell_type;
pub mod entity;
pub mod local_topology;
pub mod mesh;
pub mod shard;

pub use cell_type::ElementType;
pub use entity::EntityKind;
pub use local_topology::LocalTopology;
pub use mesh::{BoundarySegment, FaceDescriptor, Mesh, MeshPoint, SurfaceElement, VolumeElement};
pub use shard::MeshShard;
