//! A rank's local mesh shard and its cross-rank bookkeeping.
//!
//! The shard owns the local [`Mesh`], its derived [`LocalTopology`], the
//! [`IndexMapTable`] and the [`ExchangeMarkerSet`]. Tables are sized to the
//! current entity counts and grown, never shrunk, by [`MeshShard::rebuild_topology`].
//!
//! On workers the coordinator's mesh index of every vertex, volume element,
//! surface element and segment is stored as the `remote[COORDINATOR]` link;
//! this is the entity's *origin id*.

use crate::algs::communicator::{COORDINATOR, RankContext};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshShardError;
use crate::overlap::perf::FastMap;
use crate::overlap::{ExchangeMarkerSet, IndexMapTable};
use crate::topology::entity::EntityKind;
use crate::topology::local_topology::LocalTopology;
use crate::topology::mesh::Mesh;

#[derive(Clone, Debug)]
pub struct MeshShard {
    pub ctx: RankContext,
    pub mesh: Mesh,
    pub topology: LocalTopology,
    pub index: IndexMapTable,
    pub markers: ExchangeMarkerSet,
    /// Per local vertex: other worker ranks known to hold a copy.
    pub share_hints: Vec<Vec<usize>>,
}

impl MeshShard {
    /// Wrap an assembled mesh; `index` already carries the deserialised links.
    pub fn new(
        ctx: RankContext,
        mesh: Mesh,
        index: IndexMapTable,
        share_hints: Vec<Vec<usize>>,
    ) -> Self {
        let mut shard = MeshShard {
            ctx,
            topology: LocalTopology::default(),
            markers: ExchangeMarkerSet::new(ctx.world_size),
            mesh,
            index,
            share_hints,
        };
        shard.rebuild_topology();
        shard
    }

    /// Serial shard: the whole mesh, global ids equal to local indices.
    pub fn from_global(ctx: RankContext, mesh: Mesh) -> Result<Self, MeshShardError> {
        mesh.validate_closure()?;
        let n_points = mesh.points.len();
        let mut shard = MeshShard::new(ctx, mesh, IndexMapTable::new(), vec![Vec::new(); n_points]);
        for kind in EntityKind::ALL {
            for local in 0..shard.count(kind) {
                shard.index.set_global(kind, local, local)?;
            }
        }
        Ok(shard)
    }

    /// Rederive edges and faces and grow every table to the current counts.
    /// Existing edge and face numbers survive when elements were only appended.
    pub fn rebuild_topology(&mut self) {
        self.topology = LocalTopology::build(&self.mesh);
        self.share_hints.resize_with(self.mesh.points.len(), Vec::new);
        for kind in EntityKind::ALL {
            let n = self.count(kind);
            self.index.resize(kind, n);
            self.markers.resize(kind, n);
        }
        for e in 0..self.mesh.volume_elements.len() {
            if self.mesh.volume_elements[e].is_ghost {
                self.markers.set_ghost(EntityKind::VolumeElement, e, true);
            }
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Edge => self.topology.n_edges(),
            EntityKind::Face => self.topology.n_faces(),
            other => self.mesh.count(other).unwrap_or(0),
        }
    }

    /// Coordinator mesh index of a vertex or element-like entity.
    pub fn origin_id(&self, kind: EntityKind, local: usize) -> Option<usize> {
        if !kind.has_origin_id() {
            return None;
        }
        if self.ctx.is_coordinator() {
            self.index.global(kind, local)
        } else {
            self.index.remote(kind, local, COORDINATOR)
        }
    }

    /// Origin id → local index for `kind`.
    pub fn origin_lookup(&self, kind: EntityKind) -> FastMap<usize, usize> {
        (0..self.count(kind))
            .filter_map(|l| self.origin_id(kind, l).map(|g| (g, l)))
            .collect()
    }

    pub fn global_id(&self, kind: EntityKind, local: usize) -> Option<usize> {
        self.index.global(kind, local)
    }

    pub fn is_ghost(&self, kind: EntityKind, local: usize) -> bool {
        self.markers.is_ghost(kind, local)
    }

    /// Non-ghost volume elements.
    pub fn primary_element_count(&self) -> usize {
        self.mesh.volume_elements.len() - self.mesh.ghost_element_count()
    }

    /// Worker ranks linked from any entity of `kind`.
    pub fn neighbor_ranks(&self, kind: EntityKind) -> Vec<usize> {
        self.index
            .neighbor_ranks(kind)
            .into_iter()
            .filter(|&r| r != COORDINATOR && r != self.ctx.self_rank)
            .collect()
    }
}

impl DebugInvariants for MeshShard {
    fn validate_invariants(&self) -> Result<(), MeshShardError> {
        self.mesh.validate_closure()?;
        if self.share_hints.len() != self.mesh.points.len() {
            return Err(MeshShardError::Invariant(format!(
                "{} share-hint lists for {} points",
                self.share_hints.len(),
                self.mesh.points.len()
            )));
        }
        for kind in EntityKind::ALL {
            let n = self.count(kind);
            if self.index.len(kind) < n || self.markers.len(kind) < n {
                return Err(MeshShardError::Invariant(format!(
                    "{kind} tables sized {}/{} for {n} entities",
                    self.index.len(kind),
                    self.markers.len(kind)
                )));
            }
            for local in 0..n {
                if self.markers.is_ghost(kind, local) {
                    continue;
                }
                for rank in self.markers.exchange_ranks(kind, local) {
                    if rank != self.ctx.self_rank && self.index.remote(kind, local, rank).is_none() {
                        return Err(MeshShardError::Invariant(format!(
                            "{kind} {local} is marked shared with rank {rank} but has no remote entry"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
