#![allow(dead_code)]
use itertools::Itertools;
use mesh_shard::algs::communicator::LocalComm;
use mesh_shard::algs::distribute::CoordinatorSummary;
use mesh_shard::prelude::*;

/// Run `f` once per rank of an `n`-rank world, one thread per rank.
/// Results come back in rank order.
pub fn run_world<T: Send>(n: usize, f: impl Fn(&LocalComm) -> T + Sync) -> Vec<T> {
    let comms = LocalComm::world(n);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms.iter().map(|c| s.spawn(move || f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Distribute `mesh` over an `n`-rank world; returns the coordinator summary
/// and the worker shards (index 0 is rank 1).
pub fn distribute(n: usize, mesh: &Mesh, cfg: &DistributionConfig) -> (CoordinatorSummary, Vec<MeshShard>) {
    let mut outcomes = run_world(n, |comm| {
        let mesh = (comm.rank() == COORDINATOR).then_some(mesh);
        distribute_mesh(comm, mesh, cfg)
    })
    .into_iter()
    .map(|r| r.unwrap());
    let summary = outcomes
        .next()
        .and_then(|o| o.summary().cloned())
        .expect("rank 0 returns the summary");
    let shards = outcomes.map(|o| o.into_shard().expect("worker shard")).collect();
    (summary, shards)
}

/// Origin (global mesh) ids of the vertices of a local entity vertex list, sorted.
pub fn vertex_key(shard: &MeshShard, vertices: &[usize]) -> Vec<usize> {
    vertices
        .iter()
        .map(|&v| shard.origin_id(EntityKind::Vertex, v).unwrap())
        .sorted_unstable()
        .collect()
}

pub fn face_key(shard: &MeshShard, f: usize) -> Vec<usize> {
    vertex_key(shard, shard.topology.face(f))
}

pub fn edge_key(shard: &MeshShard, e: usize) -> Vec<usize> {
    vertex_key(shard, &shard.topology.edge(e))
}

/// Origin ids of the primary (non-ghost) elements of a shard.
pub fn primary_gids(shard: &MeshShard) -> Vec<usize> {
    shard
        .mesh
        .primary_elements()
        .map(|e| shard.origin_id(EntityKind::VolumeElement, e).unwrap())
        .collect()
}
