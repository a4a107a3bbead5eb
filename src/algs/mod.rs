//! Distribution protocols and the pieces they are built from.
//!
//! Transport ([`communicator`], [`channel`], [`wire`]) sits at the bottom;
//! [`partition`] and [`serialize`] feed [`distribute`], which hands assembled
//! shards to [`stitch`] and [`overlap_extend`].

pub mod channel;
pub mod communicator;
pub mod distribute;
pub mod dual_graph;
pub mod meshgen;
#[cfg(feature = "metis-support")]
pub mod metis_partition;
pub mod overlap_extend;
pub mod partition;
pub mod serialize;
pub mod stitch;
pub mod wire;

pub use distribute::{
    DistributionConfig, DistributionOutcome, distribute_mesh, distribute_mesh_with,
};
pub use overlap_extend::extend_overlap;
pub use partition::{Partition, partition_mesh};
pub use stitch::stitch;
