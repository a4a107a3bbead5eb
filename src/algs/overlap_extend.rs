//! Overlap extender: ghost layers on top of a stitched partition.
//!
//! Neighbours are the worker ranks a shard shares at least one face with,
//! fixed before the first layer. Per neighbour the extender runs a BFS whose
//! frontier starts at the vertices linked to that neighbour; each layer ships
//! every not-yet-sent primary element touching the frontier, plus the vertex
//! records the neighbour does not hold yet. Vertices introduced by a layer form
//! the next frontier, so a layer costs what it adds.
//!
//! Packets are routed through the coordinator and every layer ends with a
//! barrier. Receivers deduplicate by global id, so an element reaching a rank
//! from two directions is inserted once. After the last layer the stitcher
//! reruns to link and number the ghosts; edges and faces touched only by ghost
//! elements are flagged ghost.

use crate::algs::channel::{recv_message, send_message};
use crate::algs::communicator::{COORDINATOR, CommTag, Communicator, RankContext};
use crate::algs::serialize::{VertexRecord, VolumeRecord};
use crate::algs::stitch::{StitchReport, stitch};
use crate::algs::wire::{WireReader, WireWriter};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshShardError;
use crate::overlap::perf::{FastMap, FastSet};
use crate::topology::entity::EntityKind;
use crate::topology::mesh::VolumeElement;
use crate::topology::shard::MeshShard;
use bytes::Bytes;
use itertools::Itertools;

pub const OVERLAP_UP: CommTag = CommTag::new(0x0300);
pub const OVERLAP_DOWN: CommTag = CommTag::new(0x0301);

const UP_KIND: u16 = 0x31;
const DOWN_KIND: u16 = 0x32;
const LAYER_KIND: u16 = 0x33;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OverlapReport {
    pub layers: usize,
    /// Ghost elements held after extension.
    pub ghost_elements: usize,
    pub ghost_vertices: usize,
    /// Element records this rank shipped over all layers.
    pub sent_elements: usize,
    /// Result of the closing stitch.
    pub stitch: StitchReport,
}

/// BFS state towards one neighbour.
#[derive(Debug)]
struct Front {
    rank: usize,
    frontier: Vec<usize>,
    known: FastSet<usize>,
    sent: FastSet<usize>,
}

impl Front {
    fn new(shard: &MeshShard, rank: usize) -> Self {
        let known: FastSet<usize> = shard
            .index
            .shared_with(EntityKind::Vertex, rank)
            .map(|(local, _)| local)
            .collect();
        Front {
            rank,
            frontier: known.iter().copied().sorted_unstable().collect(),
            known,
            sent: FastSet::default(),
        }
    }
}

fn origin(shard: &MeshShard, kind: EntityKind, local: usize) -> Result<usize, MeshShardError> {
    shard
        .origin_id(kind, local)
        .ok_or_else(|| MeshShardError::Invariant(format!("{kind} {local} has no origin id")))
}

/// Build one layer for `front` and advance it. Returns the payload and the
/// number of element records in it.
fn build_layer(shard: &mut MeshShard, front: &mut Front) -> Result<(Bytes, usize), MeshShardError> {
    let me = shard.ctx.self_rank;
    let elements: Vec<usize> = front
        .frontier
        .iter()
        .flat_map(|&v| shard.topology.vertex_elements(v).iter().copied())
        .filter(|&e| !shard.mesh.volume_elements[e].is_ghost && !front.sent.contains(&e))
        .sorted_unstable()
        .dedup()
        .collect();

    let mut new_vertices = Vec::new();
    for &e in &elements {
        for &v in &shard.mesh.volume_elements[e].vertices {
            if front.known.insert(v) {
                new_vertices.push(v);
            }
        }
    }

    let mut w = WireWriter::with_header(LAYER_KIND);
    w.put_u32(new_vertices.len() as u32);
    for &v in &new_vertices {
        let holders = std::iter::once(me)
            .chain(
                shard
                    .index
                    .remotes(EntityKind::Vertex, v)
                    .iter()
                    .map(|l| l.rank)
                    .filter(|&r| r != COORDINATOR),
            )
            .chain(shard.share_hints[v].iter().copied())
            .filter(|&r| r != front.rank)
            .sorted_unstable()
            .dedup()
            .collect();
        VertexRecord {
            gid: origin(shard, EntityKind::Vertex, v)?,
            point: shard.mesh.points[v],
            holders,
        }
        .encode(&mut w);
    }
    w.put_u32(elements.len() as u32);
    for &e in &elements {
        let el = &shard.mesh.volume_elements[e];
        VolumeRecord {
            gid: origin(shard, EntityKind::VolumeElement, e)?,
            kind: el.kind,
            material: el.material,
            vertices: el
                .vertices
                .iter()
                .map(|&v| origin(shard, EntityKind::Vertex, v))
                .collect::<Result<_, _>>()?,
        }
        .encode(&mut w);
    }

    // the neighbour holds these vertices once the layer lands
    for &v in &new_vertices {
        if !shard.share_hints[v].contains(&front.rank) {
            shard.share_hints[v].push(front.rank);
        }
    }
    front.sent.extend(elements.iter().copied());
    front.frontier = new_vertices;
    Ok((w.finish(), elements.len()))
}

/// Ghost vertices and elements introduced so far on this rank.
#[derive(Debug, Default)]
struct Intake {
    vertex_lookup: FastMap<usize, usize>,
    element_gids: FastSet<usize>,
    new_ghost_vertices: Vec<usize>,
}

impl Intake {
    fn new(shard: &MeshShard) -> Self {
        Intake {
            vertex_lookup: shard.origin_lookup(EntityKind::Vertex),
            element_gids: shard
                .origin_lookup(EntityKind::VolumeElement)
                .keys()
                .copied()
                .collect(),
            new_ghost_vertices: Vec::new(),
        }
    }

    fn absorb(&mut self, shard: &mut MeshShard, sender: usize, payload: Bytes) -> Result<usize, MeshShardError> {
        let me = shard.ctx.self_rank;
        let mut r = WireReader::open(payload, LAYER_KIND)?;
        let n_vertices = r.get_u32()? as usize;
        for _ in 0..n_vertices {
            let rec = VertexRecord::decode(&mut r)?;
            let local = match self.vertex_lookup.get(&rec.gid) {
                Some(&local) => local,
                None => {
                    let local = shard.mesh.add_point(rec.point);
                    shard.share_hints.resize_with(local + 1, Vec::new);
                    shard.index.resize(EntityKind::Vertex, local + 1);
                    shard.index.set_remote(EntityKind::Vertex, local, COORDINATOR, rec.gid)?;
                    self.vertex_lookup.insert(rec.gid, local);
                    self.new_ghost_vertices.push(local);
                    local
                }
            };
            let hints = &mut shard.share_hints[local];
            for h in rec.holders.into_iter().chain(std::iter::once(sender)) {
                if h != me && !hints.contains(&h) {
                    hints.push(h);
                }
            }
        }

        let n_elements = r.get_u32()? as usize;
        let mut added = 0;
        for _ in 0..n_elements {
            let rec = VolumeRecord::decode(&mut r)?;
            if !self.element_gids.insert(rec.gid) {
                continue;
            }
            let vertices = rec
                .vertices
                .iter()
                .map(|g| {
                    self.vertex_lookup
                        .get(g)
                        .copied()
                        .ok_or(MeshShardError::UnknownVertexReference { global: *g as u64 })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let mut el = VolumeElement::new(rec.kind, rec.material, vertices);
            el.is_ghost = true;
            let local = shard.mesh.add_volume_element(el)?;
            shard.index.resize(EntityKind::VolumeElement, local + 1);
            shard
                .index
                .set_remote(EntityKind::VolumeElement, local, COORDINATOR, rec.gid)?;
            added += 1;
        }
        if !r.is_empty() {
            return Err(MeshShardError::Wire("trailing bytes after ghost layer".into()));
        }
        Ok(added)
    }
}

fn route_layer<C: Communicator>(comm: &C, ctx: RankContext) -> Result<(), MeshShardError> {
    let mut inbox: FastMap<usize, Vec<(usize, Bytes)>> = FastMap::default();
    for src in ctx.workers() {
        let mut r = WireReader::open(recv_message(comm, src, OVERLAP_UP)?, UP_KIND)?;
        let n = r.get_u32()? as usize;
        for _ in 0..n {
            let dest = r.get_usize()?;
            let blob = r.get_blob()?;
            if dest == COORDINATOR || dest >= ctx.world_size || dest == src {
                return Err(MeshShardError::Wire(format!(
                    "rank {src} addressed a ghost layer to rank {dest}"
                )));
            }
            inbox.entry(dest).or_default().push((src, blob));
        }
    }
    for dest in ctx.workers() {
        let packets = inbox.remove(&dest).unwrap_or_default();
        let mut w = WireWriter::with_header(DOWN_KIND);
        w.put_u32(packets.len() as u32);
        for (src, blob) in &packets {
            w.put_usize(*src);
            w.put_blob(blob);
        }
        send_message(comm, dest, OVERLAP_DOWN, &w.finish())?;
    }
    Ok(())
}

fn extend_worker<C: Communicator>(
    comm: &C,
    shard: &mut MeshShard,
    depth: usize,
) -> Result<OverlapReport, MeshShardError> {
    let me = shard.ctx.self_rank;
    let neighbours = shard.neighbor_ranks(EntityKind::Face);
    log::debug!("rank {me}: extending overlap to {neighbours:?}, depth {depth}");
    let mut fronts: Vec<Front> = neighbours.iter().map(|&r| Front::new(shard, r)).collect();
    let mut intake = Intake::new(shard);
    let mut report = OverlapReport {
        layers: depth,
        ..OverlapReport::default()
    };

    for layer in 0..depth {
        let mut w = WireWriter::with_header(UP_KIND);
        w.put_u32(fronts.len() as u32);
        for front in &mut fronts {
            let (payload, n) = build_layer(shard, front)?;
            report.sent_elements += n;
            w.put_usize(front.rank);
            w.put_blob(&payload);
        }
        send_message(comm, COORDINATOR, OVERLAP_UP, &w.finish())?;

        let mut r = WireReader::open(recv_message(comm, COORDINATOR, OVERLAP_DOWN)?, DOWN_KIND)?;
        let n = r.get_u32()? as usize;
        let mut added = 0;
        for _ in 0..n {
            let sender = r.get_usize()?;
            added += intake.absorb(shard, sender, r.get_blob()?)?;
        }
        shard.rebuild_topology();
        comm.barrier();
        log::debug!("rank {me}: overlap layer {} added {added} ghost elements", layer + 1);
    }

    for &v in &intake.new_ghost_vertices {
        shard.markers.set_ghost(EntityKind::Vertex, v, true);
    }
    report.stitch = stitch(comm, Some(shard))?;
    flag_ghost_closure(shard);
    shard.debug_assert_invariants();

    report.ghost_elements = shard.mesh.ghost_element_count();
    report.ghost_vertices = intake.new_ghost_vertices.len();
    log::info!(
        "rank {me}: overlap done, {} ghost elements, {} ghost vertices",
        report.ghost_elements,
        report.ghost_vertices
    );
    Ok(report)
}

/// Edges and faces whose incident elements are all ghosts are ghosts.
fn flag_ghost_closure(shard: &mut MeshShard) {
    let topo = &shard.topology;
    let ghost = |e: usize| shard.mesh.volume_elements[e].is_ghost;
    let faces: Vec<usize> = (0..topo.n_faces())
        .filter(|&f| topo.face_elements(f).iter().all(|&e| ghost(e)))
        .collect();
    let edges: Vec<usize> = (0..topo.n_edges())
        .filter(|&i| topo.edge_elements(i).all(|e| ghost(e)))
        .collect();
    for f in faces {
        shard.markers.set_ghost(EntityKind::Face, f, true);
    }
    for i in edges {
        shard.markers.set_ghost(EntityKind::Edge, i, true);
    }
}

/// Add `depth` ghost layers around every worker shard, then restitch.
/// The coordinator passes `None`. Depth 0 is a no-op on every rank.
pub fn extend_overlap<C: Communicator>(
    comm: &C,
    shard: Option<&mut MeshShard>,
    depth: usize,
) -> Result<OverlapReport, MeshShardError> {
    let ctx = comm.context();
    if depth == 0 || ctx.world_size <= 1 {
        return Ok(OverlapReport::default());
    }
    match shard {
        _ if ctx.is_coordinator() => {
            for _ in 0..depth {
                route_layer(comm, ctx)?;
                comm.barrier();
            }
            let stitch = stitch(comm, None)?;
            Ok(OverlapReport {
                layers: depth,
                stitch,
                ..OverlapReport::default()
            })
        }
        Some(shard) => extend_worker(comm, shard, depth),
        None => Err(MeshShardError::InvalidState(format!(
            "worker rank {} has no shard to extend",
            ctx.self_rank
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::meshgen::tet_box;

    #[test]
    fn depth_zero_and_serial_worlds_do_nothing() {
        let comm = crate::algs::communicator::NoComm;
        let mut shard = MeshShard::from_global(RankContext::new(0, 1), tet_box(1, 1, 1)).unwrap();
        let report = extend_overlap(&comm, Some(&mut shard), 2).unwrap();
        assert_eq!(report, OverlapReport::default());
        assert_eq!(shard.mesh.ghost_element_count(), 0);
    }

    #[test]
    fn layer_payload_rejects_unknown_vertices() {
        let mut shard = MeshShard::from_global(RankContext::new(0, 1), tet_box(1, 1, 1)).unwrap();
        let mut intake = Intake::new(&shard);
        let mut w = WireWriter::with_header(LAYER_KIND);
        w.put_u32(0);
        w.put_u32(1);
        VolumeRecord {
            gid: 900,
            kind: crate::topology::cell_type::ElementType::Tetrahedron,
            material: 1,
            vertices: vec![0, 1, 2, 777],
        }
        .encode(&mut w);
        let err = intake.absorb(&mut shard, 1, w.finish()).unwrap_err();
        assert_eq!(err, MeshShardError::UnknownVertexReference { global: 777 });
    }

    #[test]
    fn layer_payload_rejects_misshapen_elements() {
        let mut shard = MeshShard::from_global(RankContext::new(0, 1), tet_box(1, 1, 1)).unwrap();
        let before = shard.mesh.volume_elements.len();
        let mut intake = Intake::new(&shard);
        let mut w = WireWriter::with_header(LAYER_KIND);
        w.put_u32(0);
        w.put_u32(1);
        VolumeRecord {
            gid: 901,
            kind: crate::topology::cell_type::ElementType::Hexahedron,
            material: 1,
            vertices: vec![0, 1, 2, 3],
        }
        .encode(&mut w);
        let err = intake.absorb(&mut shard, 1, w.finish()).unwrap_err();
        assert!(matches!(
            err,
            MeshShardError::ElementShape { expected: 8, found: 4, .. }
        ));
        assert_eq!(shard.mesh.volume_elements.len(), before);
    }
}
