#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-shard
//!
//! Distributed partitioning and topology synchronization for unstructured
//! volume meshes. A single global mesh held on rank 0 is partitioned, shipped
//! to the worker ranks as a stream of tagged sections, and stitched so every
//! entity shared between ranks knows its remote copies and carries one global
//! id. Optional ghost layers give each worker read access to its neighbours'
//! boundary elements.
//!
//! ## Features
//! - Partitioner adapter over dual or nodal graphs with pluggable
//!   [`GraphPartitioner`](partitioning::GraphPartitioner)s (built-in greedy
//!   growth, METIS behind `metis-support`)
//! - Section-tagged, versioned little-endian wire format
//! - Coarse-grid stitching for vertices, edges, faces, elements, surface
//!   elements and boundary segments, followed by a global numbering round
//! - Ghost-layer extension of any depth
//! - Pluggable transports: in-process threads ([`LocalComm`](algs::communicator::LocalComm))
//!   or MPI (`mpi-support`)
//!
//! ## Determinism
//!
//! Partitioning draws all randomness from `PartitionerConfig::rng_seed`, so two
//! runs with the same seed and mesh yield the same shards.
//!
//! ## Usage
//! Every rank calls [`distribute_mesh`](algs::distribute_mesh) collectively;
//! only rank 0 passes the mesh:
//!
//! ```no_run
//! use mesh_shard::prelude::*;
//! use mesh_shard::algs::meshgen::tet_box;
//!
//! let comms = LocalComm::world(3);
//! let mesh = tet_box(4, 2, 2);
//! std::thread::scope(|s| {
//!     for comm in &comms {
//!         let mesh = (comm.rank() == 0).then_some(&mesh);
//!         s.spawn(move || distribute_mesh(comm, mesh, &DistributionConfig::default()));
//!     }
//! });
//! ```

pub mod algs;
pub mod debug_invariants;
pub mod mesh_error;
pub mod overlap;
pub mod partitioning;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{COORDINATOR, Communicator, LocalComm, NoComm, RankContext};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::distribute::{
        DistributionConfig, DistributionOutcome, distribute_mesh, distribute_mesh_with,
    };
    pub use crate::algs::overlap_extend::extend_overlap;
    pub use crate::algs::partition::{Partition, partition_mesh};
    pub use crate::algs::stitch::stitch;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::{MeshShardError, Phase};
    pub use crate::overlap::{ExchangeMarkerSet, IndexMapTable};
    pub use crate::partitioning::{GraphPartitioner, GreedyPartitioner, PartitionerConfig};
    pub use crate::topology::{ElementType, EntityKind, Mesh, MeshShard};
}
