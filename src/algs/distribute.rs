//! Distribution coordinator and worker receive loop.
//!
//! Rank 0 holds the global mesh, partitions it over the worker ranks
//! `1..world_size`, serializes one section stream per worker and sends it.
//! Every section is two framed messages on [`DISTRIBUTE_TAG`]: the section tag
//! as UTF-8, then its payload. Streams end with `endmesh`. A worker that meets
//! a tag it does not know logs it, drops the payload and keeps reading.
//!
//! Both sides take a barrier before the first section and one after the last,
//! so no rank starts stitching while another is still receiving.
//!
//! ```text
//! Coordinator: Idle → Partitioned → Serialized → Sent → AwaitingAck → Done
//! Worker:      Idle → Receiving → Assembled
//! ```
//!
//! With a world of one rank the coordinator keeps the whole mesh as its own
//! shard and nothing is sent.

use crate::algs::channel::{recv_message, send_message};
use crate::algs::communicator::{COORDINATOR, CommTag, Communicator, RankContext};
use crate::algs::overlap_extend::{OverlapReport, extend_overlap};
use crate::algs::partition::{Partition, partition_mesh};
use crate::algs::serialize::{DistributionPlan, ShardBuilder, serialize_shard};
use crate::algs::stitch::{StitchReport, stitch};
use crate::algs::wire::SectionKind;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::{MeshShardError, Phase};
use crate::partitioning::{GraphPartitioner, GreedyPartitioner, PartitionerConfig};
use crate::topology::mesh::Mesh;
use crate::topology::shard::MeshShard;
use bytes::Bytes;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

pub const DISTRIBUTE_TAG: CommTag = CommTag::new(0x0100);

/// Run-wide settings; every rank must pass the same values.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub partition: PartitionerConfig,
    /// Run the coarse-grid stitcher after distribution.
    pub stitch: bool,
    /// Ghost layers to add after stitching; 0 disables the overlap extender.
    pub overlap_depth: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            partition: PartitionerConfig::default(),
            stitch: true,
            overlap_depth: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CoordinatorState {
    Idle,
    Partitioned,
    Serialized,
    Sent,
    AwaitingAck,
    Done,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WorkerState {
    Idle,
    Receiving,
    Assembled,
}

fn wrong_state<S: std::fmt::Debug>(step: &str, state: S) -> MeshShardError {
    MeshShardError::InvalidState(format!("cannot {step} in state {state:?}"))
}

/// Send one section (tag string, then payload) to `peer`.
pub fn send_section<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: &str,
    payload: &[u8],
) -> Result<(), MeshShardError> {
    log::trace!("rank {} → {peer}: section {tag:?}, {} bytes", comm.rank(), payload.len());
    send_message(comm, peer, DISTRIBUTE_TAG, tag.as_bytes())?;
    send_message(comm, peer, DISTRIBUTE_TAG, payload)
}

/// Rank-0 side of the distribution protocol.
#[derive(Debug)]
pub struct Coordinator<'a, C: Communicator> {
    comm: &'a C,
    mesh: &'a Mesh,
    ctx: RankContext,
    state: CoordinatorState,
    partition: Option<Partition>,
    plan: Option<DistributionPlan>,
    streams: Vec<Vec<(SectionKind, Bytes)>>,
}

impl<'a, C: Communicator> Coordinator<'a, C> {
    pub fn new(comm: &'a C, mesh: &'a Mesh) -> Self {
        Coordinator {
            comm,
            mesh,
            ctx: comm.context(),
            state: CoordinatorState::Idle,
            partition: None,
            plan: None,
            streams: Vec::new(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    pub fn plan(&self) -> Option<&DistributionPlan> {
        self.plan.as_ref()
    }

    /// Split the primary elements over the worker ranks.
    pub fn partition_with<P: GraphPartitioner + ?Sized>(
        &mut self,
        cfg: &PartitionerConfig,
        partitioner: &P,
    ) -> Result<&Partition, MeshShardError> {
        if self.state != CoordinatorState::Idle {
            return Err(wrong_state("partition", self.state));
        }
        if !self.ctx.is_coordinator() {
            return Err(MeshShardError::InvalidState(format!(
                "rank {} is not the coordinator",
                self.ctx.self_rank
            )));
        }
        let partition = partition_mesh(self.mesh, self.ctx.n_workers(), cfg, partitioner)?;
        self.state = CoordinatorState::Partitioned;
        Ok(self.partition.insert(partition))
    }

    /// Encode one section stream per worker.
    pub fn serialize(&mut self) -> Result<(), MeshShardError> {
        let partition = match (&self.state, &self.partition) {
            (CoordinatorState::Partitioned, Some(p)) => p,
            _ => return Err(wrong_state("serialize", self.state)),
        };
        let plan = DistributionPlan::build(self.mesh, partition);
        let mesh = self.mesh;
        let ranks: Vec<usize> = self.ctx.workers().collect();

        #[cfg(feature = "rayon")]
        let streams = ranks
            .par_iter()
            .map(|&r| serialize_shard(mesh, &plan, r))
            .collect::<Result<Vec<_>, _>>()?;
        #[cfg(not(feature = "rayon"))]
        let streams = ranks
            .iter()
            .map(|&r| serialize_shard(mesh, &plan, r))
            .collect::<Result<Vec<_>, _>>()?;

        for (r, stream) in ranks.iter().zip(&streams) {
            let bytes: usize = stream.iter().map(|(_, b)| b.len()).sum();
            log::debug!("rank {r}: {bytes} bytes in {} sections", stream.len());
        }
        self.plan = Some(plan);
        self.streams = streams;
        self.state = CoordinatorState::Serialized;
        Ok(())
    }

    /// Ship every stream. Takes the opening barrier.
    pub fn send(&mut self) -> Result<(), MeshShardError> {
        if self.state != CoordinatorState::Serialized {
            return Err(wrong_state("send", self.state));
        }
        self.comm.barrier();
        for (rank, stream) in self.ctx.workers().zip(&self.streams) {
            for (kind, payload) in stream {
                send_section(self.comm, rank, kind.as_tag(), payload)?;
            }
            log::info!("mesh sent to rank {rank}");
        }
        self.streams.clear();
        self.state = CoordinatorState::Sent;
        Ok(())
    }

    /// Wait until every worker has assembled its shard.
    pub fn await_workers(&mut self) -> Result<(), MeshShardError> {
        if self.state != CoordinatorState::Sent {
            return Err(wrong_state("await workers", self.state));
        }
        self.state = CoordinatorState::AwaitingAck;
        self.comm.barrier();
        self.state = CoordinatorState::Done;
        Ok(())
    }

    pub fn into_summary(self) -> Result<CoordinatorSummary, MeshShardError> {
        match (self.state, self.partition) {
            (CoordinatorState::Done, Some(partition)) => Ok(CoordinatorSummary {
                elements_per_rank: partition.loads(),
                partition,
                stitch: None,
                overlap: None,
            }),
            (state, _) => Err(wrong_state("summarize", state)),
        }
    }
}

/// Receive side run by every worker rank.
#[derive(Debug)]
pub struct Worker<'a, C: Communicator> {
    comm: &'a C,
    ctx: RankContext,
    state: WorkerState,
}

impl<'a, C: Communicator> Worker<'a, C> {
    pub fn new(comm: &'a C) -> Self {
        Worker {
            comm,
            ctx: comm.context(),
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Read sections until `endmesh` and assemble the shard.
    pub fn receive(&mut self) -> Result<MeshShard, MeshShardError> {
        if self.state != WorkerState::Idle {
            return Err(wrong_state("receive", self.state));
        }
        if self.ctx.is_coordinator() {
            return Err(MeshShardError::InvalidState(
                "the coordinator does not receive a shard".into(),
            ));
        }
        self.comm.barrier();
        self.state = WorkerState::Receiving;

        let mut builder = ShardBuilder::new(self.ctx);
        loop {
            let tag = recv_message(self.comm, COORDINATOR, DISTRIBUTE_TAG)?;
            let payload = recv_message(self.comm, COORDINATOR, DISTRIBUTE_TAG)?;
            let kind = std::str::from_utf8(&tag).ok().and_then(SectionKind::from_tag);
            match kind {
                Some(kind) => {
                    builder.consume(kind, Bytes::from(payload))?;
                    if kind == SectionKind::EndMesh {
                        break;
                    }
                }
                None => log::warn!(
                    "rank {}: skipping unknown section {:?} ({} bytes)",
                    self.ctx.self_rank,
                    String::from_utf8_lossy(&tag),
                    payload.len()
                ),
            }
        }
        let shard = builder.finish();
        shard.debug_assert_invariants();
        self.comm.barrier();
        self.state = WorkerState::Assembled;
        log::info!(
            "rank {}: shard assembled, {} points, {} elements",
            self.ctx.self_rank,
            shard.mesh.points.len(),
            shard.mesh.volume_elements.len()
        );
        Ok(shard)
    }
}

/// What the coordinator knows once the run is over.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinatorSummary {
    pub partition: Partition,
    /// Primary element count of rank `r` at index `r - 1`.
    pub elements_per_rank: Vec<usize>,
    pub stitch: Option<StitchReport>,
    pub overlap: Option<OverlapReport>,
}

#[derive(Clone, Debug)]
pub enum DistributionOutcome {
    /// Rank 0 in a multi-rank world.
    Coordinator(CoordinatorSummary),
    /// A worker, or the single rank of a serial world.
    Shard(MeshShard),
}

impl DistributionOutcome {
    pub fn shard(&self) -> Option<&MeshShard> {
        match self {
            DistributionOutcome::Shard(s) => Some(s),
            DistributionOutcome::Coordinator(_) => None,
        }
    }

    pub fn into_shard(self) -> Option<MeshShard> {
        match self {
            DistributionOutcome::Shard(s) => Some(s),
            DistributionOutcome::Coordinator(_) => None,
        }
    }

    pub fn summary(&self) -> Option<&CoordinatorSummary> {
        match self {
            DistributionOutcome::Coordinator(s) => Some(s),
            DistributionOutcome::Shard(_) => None,
        }
    }
}

/// Distribute `mesh` with the built-in [`GreedyPartitioner`].
///
/// Every rank calls this collectively; only rank 0 passes `Some(mesh)`.
pub fn distribute_mesh<C: Communicator>(
    comm: &C,
    mesh: Option<&Mesh>,
    cfg: &DistributionConfig,
) -> Result<DistributionOutcome, MeshShardError> {
    let partitioner = GreedyPartitioner::new(cfg.partition.clone());
    distribute_mesh_with(comm, mesh, cfg, &partitioner)
}

/// Distribute `mesh` with a caller-supplied partitioner, then stitch and
/// extend the overlap as `cfg` asks. Errors carry the phase and rank.
pub fn distribute_mesh_with<C, P>(
    comm: &C,
    mesh: Option<&Mesh>,
    cfg: &DistributionConfig,
    partitioner: &P,
) -> Result<DistributionOutcome, MeshShardError>
where
    C: Communicator,
    P: GraphPartitioner + ?Sized,
{
    let ctx = comm.context();
    let rank = ctx.self_rank;
    if cfg.overlap_depth > 0 && !cfg.stitch {
        return Err(MeshShardError::InvalidState(
            "overlap extension needs a stitched partition".into(),
        )
        .in_phase(Phase::Overlap, rank));
    }

    if ctx.world_size <= 1 {
        let mesh = mesh.ok_or_else(|| {
            MeshShardError::InvalidState("serial run without a mesh".into())
                .in_phase(Phase::Partition, rank)
        })?;
        log::info!("single-rank world: keeping the whole mesh as the local shard");
        let mut shard = MeshShard::from_global(ctx, mesh.clone())
            .map_err(|e| e.in_phase(Phase::Partition, rank))?;
        if cfg.stitch {
            stitch(comm, Some(&mut shard)).map_err(|e| e.in_phase(Phase::Stitch, rank))?;
        }
        return Ok(DistributionOutcome::Shard(shard));
    }

    if ctx.is_coordinator() {
        let mesh = mesh.ok_or_else(|| {
            MeshShardError::InvalidState("coordinator has no mesh to distribute".into())
                .in_phase(Phase::Partition, rank)
        })?;
        let mut coord = Coordinator::new(comm, mesh);
        coord
            .partition_with(&cfg.partition, partitioner)
            .map_err(|e| e.in_phase(Phase::Partition, rank))?;
        coord.serialize().map_err(|e| e.in_phase(Phase::Serialize, rank))?;
        coord.send().map_err(|e| e.in_phase(Phase::Send, rank))?;
        coord.await_workers().map_err(|e| e.in_phase(Phase::Send, rank))?;
        let mut summary = coord
            .into_summary()
            .map_err(|e| e.in_phase(Phase::Send, rank))?;
        if cfg.stitch {
            summary.stitch =
                Some(stitch(comm, None).map_err(|e| e.in_phase(Phase::Stitch, rank))?);
        }
        if cfg.overlap_depth > 0 {
            summary.overlap = Some(
                extend_overlap(comm, None, cfg.overlap_depth)
                    .map_err(|e| e.in_phase(Phase::Overlap, rank))?,
            );
        }
        log::info!("distribution finished: {:?} elements per rank", summary.elements_per_rank);
        Ok(DistributionOutcome::Coordinator(summary))
    } else {
        let mut shard = Worker::new(comm)
            .receive()
            .map_err(|e| e.in_phase(Phase::Receive, rank))?;
        if cfg.stitch {
            stitch(comm, Some(&mut shard)).map_err(|e| e.in_phase(Phase::Stitch, rank))?;
        }
        if cfg.overlap_depth > 0 {
            extend_overlap(comm, Some(&mut shard), cfg.overlap_depth)
                .map_err(|e| e.in_phase(Phase::Overlap, rank))?;
        }
        Ok(DistributionOutcome::Shard(shard))
    }
}
