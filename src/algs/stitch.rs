//! Coarse-grid stitcher: cross-rank identity of shared entities.
//!
//! Runs after distribution (and again after every overlap extension) with the
//! coordinator as rendezvous point; workers never talk to each other.
//!
//! 1. Every worker sends the coordinator a *bundle* of descriptors, one per
//!    advertised entity: vertex gid, sorted edge gid pair, sorted face gid set
//!    (plus its owning element gid), or the element / surface element /
//!    segment gid. A vertex is advertised when another rank is known to hold
//!    it; higher kinds are advertised when their vertices are.
//! 2. Barrier. No bundle is consumed before all were emitted.
//! 3. The coordinator forwards bundle `a` to worker `b` when their advertised
//!    vertex sets intersect. Each worker matches incoming descriptors against
//!    its own advertised entities only, by exact key equality, and records
//!    `remote[sender]` plus the exchange marker. Both sides of a pair see the
//!    other's bundle, so links come out symmetric.
//! 4. Numbering round: vertices and element-like kinds take their origin id
//!    as global id. Edges and faces belong to the lowest rank holding them;
//!    the coordinator hands out exclusive prefix offsets of the owned counts
//!    and routes `(peer, peer_local, global)` assignments to the other holders.
//!
//! A boundary face that advertises but finds no peer is a true boundary face;
//! this is logged at debug level and never an error.

use crate::algs::channel::{recv_message, send_message};
use crate::algs::communicator::{COORDINATOR, CommTag, Communicator, RankContext};
use crate::algs::wire::{WireReader, WireWriter};
use crate::mesh_error::MeshShardError;
use crate::overlap::perf::FastMap;
use crate::topology::entity::EntityKind;
use crate::topology::shard::MeshShard;
use bytes::Bytes;
use itertools::Itertools;

pub const STITCH_DESCRIPTORS: CommTag = CommTag::new(0x0200);
pub const STITCH_FORWARD: CommTag = CommTag::new(0x0201);
pub const STITCH_COUNTS: CommTag = CommTag::new(0x0202);
pub const STITCH_OFFSETS: CommTag = CommTag::new(0x0203);
pub const STITCH_IDS: CommTag = CommTag::new(0x0204);

const BUNDLE_KIND: u16 = 0x21;
const FORWARD_KIND: u16 = 0x22;
const COUNTS_KIND: u16 = 0x23;
const OFFSETS_KIND: u16 = 0x24;
const IDS_KIND: u16 = 0x25;

/// Outcome of one stitching run on one rank.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StitchReport {
    /// Advertised entities per kind, indexed by [`EntityKind::index`].
    pub advertised: [usize; EntityKind::COUNT],
    /// Local entities per kind with at least one peer link.
    pub shared: [usize; EntityKind::COUNT],
    /// Boundary faces that advertised but matched no peer.
    pub unmatched_boundary_faces: usize,
    pub owned_edges: usize,
    pub owned_faces: usize,
    /// Distinct edges and faces across all shards.
    pub total_edges: usize,
    pub total_faces: usize,
    /// Bundles the coordinator forwarded (coordinator only).
    pub forwarded_bundles: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Key {
    Id(usize),
    Pair([usize; 2]),
    Set(Vec<usize>),
}

#[derive(Clone, Debug)]
struct Descriptor {
    key: Key,
    local: usize,
    /// Owning element gid, faces only.
    element: Option<usize>,
}

/// Entities this rank advertises, per kind.
#[derive(Debug, Default)]
struct Advertised {
    descriptors: [Vec<Descriptor>; EntityKind::COUNT],
    lookup: [FastMap<Key, usize>; EntityKind::COUNT],
}

impl Advertised {
    fn push(&mut self, kind: EntityKind, key: Key, local: usize, element: Option<usize>) {
        self.lookup[kind.index()].insert(key.clone(), local);
        self.descriptors[kind.index()].push(Descriptor {
            key,
            local,
            element,
        });
    }
}

fn missing_origin(kind: EntityKind, local: usize) -> MeshShardError {
    MeshShardError::Invariant(format!("{kind} {local} has no origin id"))
}

fn advertise(shard: &MeshShard) -> Result<Advertised, MeshShardError> {
    let mut adv = Advertised::default();
    let n_v = shard.count(EntityKind::Vertex);
    let mut vgid = Vec::with_capacity(n_v);
    let mut on = Vec::with_capacity(n_v);
    for v in 0..n_v {
        let g = shard
            .origin_id(EntityKind::Vertex, v)
            .ok_or_else(|| missing_origin(EntityKind::Vertex, v))?;
        let advertised = !shard.share_hints[v].is_empty();
        if advertised {
            adv.push(EntityKind::Vertex, Key::Id(g), v, None);
        }
        vgid.push(g);
        on.push(advertised);
    }

    let topo = &shard.topology;
    for e in 0..topo.n_edges() {
        let [a, b] = topo.edge(e);
        if on[a] && on[b] {
            let (ga, gb) = (vgid[a], vgid[b]);
            let key = Key::Pair(if ga <= gb { [ga, gb] } else { [gb, ga] });
            adv.push(EntityKind::Edge, key, e, None);
        }
    }
    for f in 0..topo.n_faces() {
        let verts = topo.face(f);
        if verts.iter().all(|&v| on[v]) {
            let key = Key::Set(verts.iter().map(|&v| vgid[v]).sorted_unstable().collect());
            let element = topo
                .face_elements(f)
                .first()
                .and_then(|&el| shard.origin_id(EntityKind::VolumeElement, el));
            adv.push(EntityKind::Face, key, f, element);
        }
    }
    for (e, el) in shard.mesh.volume_elements.iter().enumerate() {
        if el.vertices.iter().any(|&v| on[v]) {
            let g = shard
                .origin_id(EntityKind::VolumeElement, e)
                .ok_or_else(|| missing_origin(EntityKind::VolumeElement, e))?;
            adv.push(EntityKind::VolumeElement, Key::Id(g), e, None);
        }
    }
    for (s, se) in shard.mesh.surface_elements.iter().enumerate() {
        if se.vertices.iter().all(|&v| on[v]) {
            let g = shard
                .origin_id(EntityKind::SurfaceElement, s)
                .ok_or_else(|| missing_origin(EntityKind::SurfaceElement, s))?;
            adv.push(EntityKind::SurfaceElement, Key::Id(g), s, None);
        }
    }
    for (s, seg) in shard.mesh.segments.iter().enumerate() {
        if seg.vertices.iter().all(|&v| on[v]) {
            let g = shard
                .origin_id(EntityKind::BoundarySegment, s)
                .ok_or_else(|| missing_origin(EntityKind::BoundarySegment, s))?;
            adv.push(EntityKind::BoundarySegment, Key::Id(g), s, None);
        }
    }
    Ok(adv)
}

// ===== bundle codec ========================================================

fn encode_bundle(adv: &Advertised) -> Bytes {
    let mut w = WireWriter::with_header(BUNDLE_KIND);
    for kind in EntityKind::ALL {
        let list = &adv.descriptors[kind.index()];
        w.put_u32(list.len() as u32);
        for d in list {
            match &d.key {
                Key::Id(g) => w.put_usize(*g),
                Key::Pair([a, b]) => {
                    w.put_usize(*a);
                    w.put_usize(*b);
                }
                Key::Set(gids) => {
                    w.put_usize(d.element.unwrap_or(usize::MAX));
                    w.put_ids(gids.iter().copied());
                }
            }
            w.put_usize(d.local);
        }
    }
    w.finish()
}

fn decode_bundle(payload: Bytes) -> Result<[Vec<Descriptor>; EntityKind::COUNT], MeshShardError> {
    let mut r = WireReader::open(payload, BUNDLE_KIND)?;
    let mut out: [Vec<Descriptor>; EntityKind::COUNT] = Default::default();
    for kind in EntityKind::ALL {
        let n = r.get_u32()? as usize;
        let list = &mut out[kind.index()];
        list.reserve(n);
        for _ in 0..n {
            let (key, element) = match kind {
                EntityKind::Edge => (Key::Pair([r.get_usize()?, r.get_usize()?]), None),
                EntityKind::Face => {
                    let element = r.get_u64()?;
                    let element = (element != u64::MAX).then_some(element as usize);
                    (Key::Set(r.get_ids()?), element)
                }
                _ => (Key::Id(r.get_usize()?), None),
            };
            list.push(Descriptor {
                key,
                local: r.get_usize()?,
                element,
            });
        }
    }
    Ok(out)
}

/// Advertised vertex gids of a bundle, sorted.
fn bundle_vertices(payload: &Bytes) -> Result<Vec<usize>, MeshShardError> {
    let mut r = WireReader::open(payload.clone(), BUNDLE_KIND)?;
    let n = r.get_u32()? as usize;
    let mut gids = Vec::with_capacity(n);
    for _ in 0..n {
        gids.push(r.get_usize()?);
        r.get_usize()?;
    }
    gids.sort_unstable();
    Ok(gids)
}

fn sorted_intersect(a: &[usize], b: &[usize]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

fn decode_pairs(payload: Vec<u8>, kind: u16) -> Result<[usize; 2], MeshShardError> {
    let mut r = WireReader::open(payload, kind)?;
    Ok([r.get_usize()?, r.get_usize()?])
}

// ===== coordinator =========================================================

fn stitch_coordinator<C: Communicator>(
    comm: &C,
    ctx: RankContext,
) -> Result<StitchReport, MeshShardError> {
    let workers: Vec<usize> = ctx.workers().collect();
    let mut bundles = Vec::with_capacity(workers.len());
    for &w in &workers {
        bundles.push(Bytes::from(recv_message(comm, w, STITCH_DESCRIPTORS)?));
    }
    let vertex_sets = bundles
        .iter()
        .map(bundle_vertices)
        .collect::<Result<Vec<_>, _>>()?;
    comm.barrier();

    let mut report = StitchReport::default();
    for (bi, &b) in workers.iter().enumerate() {
        let peers: Vec<usize> = (0..workers.len())
            .filter(|&ai| ai != bi && sorted_intersect(&vertex_sets[ai], &vertex_sets[bi]))
            .collect();
        let mut w = WireWriter::with_header(FORWARD_KIND);
        w.put_u32(peers.len() as u32);
        for &ai in &peers {
            w.put_usize(workers[ai]);
            w.put_blob(&bundles[ai]);
        }
        report.forwarded_bundles += peers.len();
        log::trace!("stitch: forwarding {} bundles to rank {b}", peers.len());
        send_message(comm, b, STITCH_FORWARD, &w.finish())?;
    }

    // numbering round
    let mut counts = Vec::with_capacity(workers.len());
    for &w in &workers {
        counts.push(decode_pairs(recv_message(comm, w, STITCH_COUNTS)?, COUNTS_KIND)?);
    }
    let total_edges: usize = counts.iter().map(|c| c[0]).sum();
    let total_faces: usize = counts.iter().map(|c| c[1]).sum();
    let (mut edge_off, mut face_off) = (0, 0);
    for (&w, c) in workers.iter().zip(&counts) {
        let mut msg = WireWriter::with_header(OFFSETS_KIND);
        msg.put_usize(edge_off);
        msg.put_usize(face_off);
        msg.put_usize(total_edges);
        msg.put_usize(total_faces);
        send_message(comm, w, STITCH_OFFSETS, &msg.finish())?;
        edge_off += c[0];
        face_off += c[1];
    }

    let mut routed: FastMap<usize, Vec<(u8, usize, usize)>> = FastMap::default();
    for &w in &workers {
        let mut r = WireReader::open(recv_message(comm, w, STITCH_IDS)?, IDS_KIND)?;
        let n = r.get_u32()? as usize;
        for _ in 0..n {
            let dest = r.get_usize()?;
            let kind = r.get_u8()?;
            let local = r.get_usize()?;
            let gid = r.get_usize()?;
            if !workers.contains(&dest) {
                return Err(MeshShardError::Wire(format!(
                    "rank {w} routed a global id to non-worker rank {dest}"
                )));
            }
            routed.entry(dest).or_default().push((kind, local, gid));
        }
    }
    for &w in &workers {
        let list = routed.remove(&w).unwrap_or_default();
        let mut msg = WireWriter::with_header(IDS_KIND);
        msg.put_u32(list.len() as u32);
        for (kind, local, gid) in list {
            msg.put_u8(kind);
            msg.put_usize(local);
            msg.put_usize(gid);
        }
        send_message(comm, w, STITCH_IDS, &msg.finish())?;
    }

    report.total_edges = total_edges;
    report.total_faces = total_faces;
    log::info!(
        "stitch: {} workers, {} bundles forwarded, {total_edges} edges, {total_faces} faces",
        workers.len(),
        report.forwarded_bundles
    );
    Ok(report)
}

// ===== worker ==============================================================

/// Drop every peer link and exchange mark so a rerun starts clean.
fn clear_peer_state(shard: &mut MeshShard) {
    for kind in EntityKind::ALL {
        shard.index.retain_remotes(kind, |l| l.rank == COORDINATOR);
        shard.markers.clear_exchange(kind);
    }
    shard.index.clear_globals(EntityKind::Edge);
    shard.index.clear_globals(EntityKind::Face);
}

fn stitch_worker<C: Communicator>(
    comm: &C,
    shard: &mut MeshShard,
) -> Result<StitchReport, MeshShardError> {
    let me = shard.ctx.self_rank;
    clear_peer_state(shard);
    let adv = advertise(shard)?;
    let mut report = StitchReport::default();
    for kind in EntityKind::ALL {
        report.advertised[kind.index()] = adv.descriptors[kind.index()].len();
    }

    send_message(comm, COORDINATOR, STITCH_DESCRIPTORS, &encode_bundle(&adv))?;
    comm.barrier();

    let mut r = WireReader::open(recv_message(comm, COORDINATOR, STITCH_FORWARD)?, FORWARD_KIND)?;
    let n = r.get_u32()? as usize;
    for _ in 0..n {
        let sender = r.get_usize()?;
        let incoming = decode_bundle(r.get_blob()?)?;
        for kind in EntityKind::ALL {
            let lookup = &adv.lookup[kind.index()];
            for d in &incoming[kind.index()] {
                if let Some(&local) = lookup.get(&d.key) {
                    shard.index.set_remote(kind, local, sender, d.local)?;
                    shard.markers.set_exchange(kind, sender, local, true);
                }
            }
        }
    }

    for kind in EntityKind::ALL {
        report.shared[kind.index()] = (0..shard.count(kind))
            .filter(|&l| shard.index.remotes(kind, l).iter().any(|x| x.rank != COORDINATOR))
            .count();
    }
    let mut face_on = vec![false; shard.count(EntityKind::Face)];
    for d in &adv.descriptors[EntityKind::Face.index()] {
        face_on[d.local] = true;
    }
    for f in shard.topology.boundary_faces() {
        let linked = shard
            .index
            .remotes(EntityKind::Face, f)
            .iter()
            .any(|l| l.rank != COORDINATOR);
        if face_on[f] && !linked {
            report.unmatched_boundary_faces += 1;
            log::debug!(
                "stitch mismatch on rank {me}: boundary face {f} advertised but no peer holds it; treating it as true boundary"
            );
        }
    }

    number_entities(comm, shard, &mut report)?;
    log::debug!(
        "rank {me}: stitched, shared vertices {}, edges {}, faces {}",
        report.shared[EntityKind::Vertex.index()],
        report.shared[EntityKind::Edge.index()],
        report.shared[EntityKind::Face.index()]
    );
    Ok(report)
}

/// Lowest rank among this rank and its peers for an entity.
fn owner_of(shard: &MeshShard, kind: EntityKind, local: usize) -> usize {
    shard
        .index
        .remotes(kind, local)
        .iter()
        .map(|l| l.rank)
        .filter(|&r| r != COORDINATOR)
        .fold(shard.ctx.self_rank, usize::min)
}

fn number_entities<C: Communicator>(
    comm: &C,
    shard: &mut MeshShard,
    report: &mut StitchReport,
) -> Result<(), MeshShardError> {
    let me = shard.ctx.self_rank;
    for kind in EntityKind::ALL.into_iter().filter(|k| k.has_origin_id()) {
        for local in 0..shard.count(kind) {
            let g = shard
                .origin_id(kind, local)
                .ok_or_else(|| missing_origin(kind, local))?;
            shard.index.set_global(kind, local, g)?;
        }
    }

    let owned = |kind: EntityKind| -> Vec<usize> {
        (0..shard.count(kind))
            .filter(|&l| owner_of(shard, kind, l) == me)
            .collect()
    };
    let owned_edges = owned(EntityKind::Edge);
    let owned_faces = owned(EntityKind::Face);
    report.owned_edges = owned_edges.len();
    report.owned_faces = owned_faces.len();

    let mut msg = WireWriter::with_header(COUNTS_KIND);
    msg.put_usize(owned_edges.len());
    msg.put_usize(owned_faces.len());
    send_message(comm, COORDINATOR, STITCH_COUNTS, &msg.finish())?;

    let mut r = WireReader::open(recv_message(comm, COORDINATOR, STITCH_OFFSETS)?, OFFSETS_KIND)?;
    let edge_off = r.get_usize()?;
    let face_off = r.get_usize()?;
    report.total_edges = r.get_usize()?;
    report.total_faces = r.get_usize()?;

    let mut outgoing: Vec<(usize, u8, usize, usize)> = Vec::new();
    for (kind, list, offset) in [
        (EntityKind::Edge, &owned_edges, edge_off),
        (EntityKind::Face, &owned_faces, face_off),
    ] {
        for (i, &local) in list.iter().enumerate() {
            let gid = offset + i;
            shard.index.set_global(kind, local, gid)?;
            for link in shard.index.remotes(kind, local) {
                if link.rank != COORDINATOR {
                    outgoing.push((link.rank, kind.code(), link.local_id, gid));
                }
            }
        }
    }
    let mut msg = WireWriter::with_header(IDS_KIND);
    msg.put_u32(outgoing.len() as u32);
    for (dest, kind, local, gid) in outgoing {
        msg.put_usize(dest);
        msg.put_u8(kind);
        msg.put_usize(local);
        msg.put_usize(gid);
    }
    send_message(comm, COORDINATOR, STITCH_IDS, &msg.finish())?;

    let mut r = WireReader::open(recv_message(comm, COORDINATOR, STITCH_IDS)?, IDS_KIND)?;
    let n = r.get_u32()? as usize;
    for _ in 0..n {
        let code = r.get_u8()?;
        let kind = EntityKind::from_code(code)
            .ok_or_else(|| MeshShardError::Wire(format!("unknown entity kind code {code}")))?;
        let local = r.get_usize()?;
        let gid = r.get_usize()?;
        shard.index.set_global(kind, local, gid)?;
    }

    for kind in [EntityKind::Edge, EntityKind::Face] {
        if let Some(l) = (0..shard.count(kind)).find(|&l| shard.index.global(kind, l).is_none()) {
            return Err(MeshShardError::Invariant(format!(
                "{kind} {l} on rank {me} received no global id from its owner"
            )));
        }
    }
    Ok(())
}

/// Single-rank world: global ids are local indices.
fn stitch_serial(shard: &mut MeshShard) -> Result<StitchReport, MeshShardError> {
    let mut report = StitchReport::default();
    for kind in EntityKind::ALL {
        for local in 0..shard.count(kind) {
            shard.index.set_global(kind, local, local)?;
        }
    }
    report.owned_edges = shard.count(EntityKind::Edge);
    report.owned_faces = shard.count(EntityKind::Face);
    report.total_edges = report.owned_edges;
    report.total_faces = report.owned_faces;
    Ok(report)
}

/// Run the stitcher on this rank. The coordinator passes `None` unless it is
/// the only rank and holds the whole mesh.
pub fn stitch<C: Communicator>(
    comm: &C,
    shard: Option<&mut MeshShard>,
) -> Result<StitchReport, MeshShardError> {
    let ctx = comm.context();
    match shard {
        Some(shard) if ctx.world_size <= 1 => stitch_serial(shard),
        _ if ctx.is_coordinator() => stitch_coordinator(comm, ctx),
        Some(shard) => stitch_worker(comm, shard),
        None => Err(MeshShardError::InvalidState(format!(
            "worker rank {} has no shard to stitch",
            ctx.self_rank
        ))),
    }
}
