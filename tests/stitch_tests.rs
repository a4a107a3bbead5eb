mod util;
use mesh_shard::algs::meshgen::tet_box;
use mesh_shard::algs::stitch::stitch;
use mesh_shard::prelude::*;
use mesh_shard::topology::LocalTopology;
use std::collections::{BTreeMap, BTreeSet};
use util::*;

fn stitched_box() -> (Mesh, Vec<MeshShard>, usize, usize) {
    let mesh = tet_box(5, 2, 2);
    let (summary, shards) = distribute(5, &mesh, &DistributionConfig::default());
    let report = summary.stitch.expect("coordinator stitch report");
    (mesh, shards, report.total_edges, report.total_faces)
}

fn shard_of(shards: &[MeshShard], rank: usize) -> &MeshShard {
    &shards[rank - 1]
}

#[test]
fn remote_links_are_symmetric_and_name_the_same_entity() {
    let (_, shards, _, _) = stitched_box();
    for a in &shards {
        let ra = a.ctx.self_rank;
        for kind in EntityKind::ALL {
            for local in 0..a.count(kind) {
                for link in a.index.remotes(kind, local) {
                    if link.rank == COORDINATOR {
                        continue;
                    }
                    let b = shard_of(&shards, link.rank);
                    assert_eq!(
                        b.index.remote(kind, link.local_id, ra),
                        Some(local),
                        "{kind} {local} on rank {ra} → rank {}",
                        link.rank
                    );
                    assert_eq!(a.global_id(kind, local), b.global_id(kind, link.local_id));
                    match kind {
                        EntityKind::Edge => assert_eq!(edge_key(a, local), edge_key(b, link.local_id)),
                        EntityKind::Face => assert_eq!(face_key(a, local), face_key(b, link.local_id)),
                        _ => assert_eq!(
                            a.origin_id(kind, local),
                            b.origin_id(kind, link.local_id)
                        ),
                    }
                    assert!(a.markers.is_exchange(kind, link.rank, local));
                }
            }
        }
    }
}

#[test]
fn every_cut_face_lives_on_exactly_two_linked_ranks() {
    let (_, shards, _, _) = stitched_box();
    let mut holders: BTreeMap<Vec<usize>, Vec<(usize, usize)>> = BTreeMap::new();
    for s in &shards {
        for f in 0..s.topology.n_faces() {
            holders.entry(face_key(s, f)).or_default().push((s.ctx.self_rank, f));
        }
    }
    let mut cut = 0;
    for (key, list) in &holders {
        assert!(list.len() <= 2, "face {key:?} on {list:?}");
        if let [(ra, fa), (rb, fb)] = list[..] {
            cut += 1;
            assert_eq!(shard_of(&shards, ra).index.remote(EntityKind::Face, fa, rb), Some(fb));
            assert_eq!(shard_of(&shards, rb).index.remote(EntityKind::Face, fb, ra), Some(fa));
            // one primary element on each side
            assert_eq!(shard_of(&shards, ra).topology.face_elements(fa).len(), 1);
        }
    }
    assert!(cut > 0, "four parts of a box must share faces");
}

#[test]
fn edges_and_faces_get_one_global_number_each() {
    let (mesh, shards, total_edges, total_faces) = stitched_box();
    let global = LocalTopology::build(&mesh);
    assert_eq!(total_edges, global.n_edges());
    assert_eq!(total_faces, global.n_faces());

    for (kind, total) in [(EntityKind::Edge, total_edges), (EntityKind::Face, total_faces)] {
        let mut by_key: BTreeMap<Vec<usize>, usize> = BTreeMap::new();
        let mut ids = BTreeSet::new();
        for s in &shards {
            for l in 0..s.count(kind) {
                let key = if kind == EntityKind::Edge { edge_key(s, l) } else { face_key(s, l) };
                let gid = s.global_id(kind, l).expect("numbered");
                assert!(gid < total);
                assert_eq!(*by_key.entry(key).or_insert(gid), gid, "{kind} numbered twice");
                ids.insert(gid);
            }
        }
        assert_eq!(ids.len(), total, "{kind} ids are not a bijection");
        assert_eq!(by_key.len(), total);
    }
}

#[test]
fn element_like_ids_are_origin_ids() {
    let (_, shards, _, _) = stitched_box();
    for s in &shards {
        for kind in [
            EntityKind::Vertex,
            EntityKind::VolumeElement,
            EntityKind::SurfaceElement,
            EntityKind::BoundarySegment,
        ] {
            for l in 0..s.count(kind) {
                assert_eq!(s.global_id(kind, l), s.origin_id(kind, l));
            }
        }
        s.validate_invariants().unwrap();
    }
}

#[test]
fn shared_vertices_match_share_hints() {
    let (_, shards, _, _) = stitched_box();
    for s in &shards {
        for v in 0..s.mesh.points.len() {
            let linked: BTreeSet<usize> = s
                .index
                .remotes(EntityKind::Vertex, v)
                .iter()
                .map(|l| l.rank)
                .filter(|&r| r != COORDINATOR)
                .collect();
            let hinted: BTreeSet<usize> = s.share_hints[v].iter().copied().collect();
            assert_eq!(linked, hinted, "vertex {v} on rank {}", s.ctx.self_rank);
        }
    }
}

#[test]
fn workers_report_what_they_own() {
    let mesh = tet_box(4, 2, 1);
    let reports = run_world(3, |comm| {
        let mesh = (comm.rank() == COORDINATOR).then_some(&mesh);
        let cfg = DistributionConfig {
            stitch: false,
            ..DistributionConfig::default()
        };
        let mut shard = distribute_mesh(comm, mesh, &cfg).unwrap().into_shard();
        stitch(comm, shard.as_mut()).unwrap()
    });
    let global = LocalTopology::build(&mesh);
    let owned: usize = reports[1..].iter().map(|r| r.owned_faces).sum();
    assert_eq!(owned, global.n_faces());
    assert_eq!(reports[0].total_faces, global.n_faces());
    assert!(reports[0].forwarded_bundles >= 2);
    assert!(reports[1].shared[EntityKind::Face.index()] > 0);
}

#[test]
fn restitching_is_idempotent() {
    let mesh = tet_box(3, 2, 1);
    let shards = run_world(3, |comm| {
        let mesh = (comm.rank() == COORDINATOR).then_some(&mesh);
        let mut shard = distribute_mesh(comm, mesh, &DistributionConfig::default())
            .unwrap()
            .into_shard();
        let before = shard.as_ref().map(|s| s.index.clone());
        stitch(comm, shard.as_mut()).unwrap();
        (before, shard.map(|s| s.index))
    });
    for (before, after) in shards {
        assert_eq!(before, after);
    }
}
