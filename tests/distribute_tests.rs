mod util;
use mesh_shard::algs::communicator::LocalComm;
use mesh_shard::algs::distribute::{Coordinator, Worker, send_section};
use mesh_shard::algs::meshgen::{hex_box, tet_box};
use mesh_shard::algs::partition::Partition;
use mesh_shard::algs::serialize::{DistributionPlan, VolumeRecord, serialize_shard};
use mesh_shard::algs::wire::{SectionKind, WireWriter};
use mesh_shard::partitioning::PartitionError;
use mesh_shard::prelude::*;
use util::*;

fn no_stitch() -> DistributionConfig {
    DistributionConfig {
        stitch: false,
        ..DistributionConfig::default()
    }
}

#[test]
fn hundred_tets_over_four_workers_cover_every_element_once() {
    let mesh = tet_box(5, 2, 2);
    let (summary, shards) = distribute(5, &mesh, &no_stitch());
    assert_eq!(shards.len(), 4);
    assert_eq!(summary.elements_per_rank.iter().sum::<usize>(), 100);

    let mut seen = vec![0usize; mesh.volume_elements.len()];
    for (i, shard) in shards.iter().enumerate() {
        assert_eq!(shard.ctx.self_rank, i + 1);
        assert_eq!(shard.primary_element_count(), summary.elements_per_rank[i]);
        for g in primary_gids(shard) {
            seen[g] += 1;
            assert_eq!(summary.partition.owner(g), Some(i + 1));
        }
    }
    assert!(seen.iter().all(|&n| n == 1), "{seen:?}");
}

#[test]
fn shards_are_closed_and_keep_geometry() {
    let mesh = tet_box(5, 2, 2);
    let (_, shards) = distribute(5, &mesh, &no_stitch());
    for shard in &shards {
        shard.mesh.validate_closure().unwrap();
        shard.validate_invariants().unwrap();
        for v in 0..shard.mesh.points.len() {
            let g = shard.origin_id(EntityKind::Vertex, v).unwrap();
            assert_eq!(shard.mesh.points[v], mesh.points[g]);
        }
        for (e, el) in shard.mesh.volume_elements.iter().enumerate() {
            let g = shard.origin_id(EntityKind::VolumeElement, e).unwrap();
            assert_eq!(vertex_key(shard, &el.vertices), {
                let mut k = mesh.volume_elements[g].vertices.clone();
                k.sort_unstable();
                k
            });
        }
        assert_eq!(shard.mesh.face_descriptors, mesh.face_descriptors);
    }
}

#[test]
fn boundary_records_follow_their_vertices() {
    let mesh = tet_box(5, 2, 2);
    let (_, shards) = distribute(5, &mesh, &no_stitch());
    let mut surface_seen = vec![false; mesh.surface_elements.len()];
    for shard in &shards {
        for (s, se) in shard.mesh.surface_elements.iter().enumerate() {
            let g = shard.origin_id(EntityKind::SurfaceElement, s).unwrap();
            surface_seen[g] = true;
            assert_eq!(se.geominfo, mesh.surface_elements[g].geominfo);
        }
        for (s, seg) in shard.mesh.segments.iter().enumerate() {
            let g = shard.origin_id(EntityKind::BoundarySegment, s).unwrap();
            assert_eq!(seg.edge_nr, mesh.segments[g].edge_nr);
        }
    }
    assert!(surface_seen.into_iter().all(|s| s));
}

#[test]
fn same_seed_same_shards() {
    let mesh = tet_box(4, 3, 2);
    let run = || {
        let (summary, shards) = distribute(4, &mesh, &no_stitch());
        let gids: Vec<Vec<usize>> = shards.iter().map(primary_gids).collect();
        (summary.partition, gids)
    };
    assert_eq!(run(), run());
}

#[test]
fn mixed_seed_still_covers() {
    let mesh = tet_box(3, 3, 1);
    let cfg = DistributionConfig {
        partition: PartitionerConfig {
            rng_seed: 7,
            ..PartitionerConfig::default()
        },
        stitch: false,
        overlap_depth: 0,
    };
    let (summary, _) = distribute(3, &mesh, &cfg);
    assert_eq!(summary.partition.owner.iter().flatten().count(), 45);
}

#[test]
fn hexahedra_distribute_with_quad_faces() {
    let mesh = hex_box(4, 2, 2);
    let (summary, shards) = distribute(3, &mesh, &DistributionConfig::default());
    assert_eq!(summary.elements_per_rank.iter().sum::<usize>(), 16);
    for shard in &shards {
        assert!((0..shard.topology.n_faces()).all(|f| shard.topology.face(f).len() == 4));
    }
}

#[test]
fn unknown_section_tags_are_skipped() {
    let mesh = tet_box(2, 1, 1);
    let results = run_world(2, |comm| {
        if comm.rank() == COORDINATOR {
            let part = Partition {
                n_parts: 1,
                owner: vec![Some(1); mesh.volume_elements.len()],
            };
            let plan = DistributionPlan::build(&mesh, &part);
            let sections = serialize_shard(&mesh, &plan, 1).unwrap();
            comm.barrier();
            send_section(comm, 1, "materialnames", b"steel\0copper").unwrap();
            for (kind, payload) in &sections {
                send_section(comm, 1, kind.as_tag(), payload).unwrap();
                if *kind == SectionKind::Vertex {
                    send_section(comm, 1, "\u{fffd}bogus", &[]).unwrap();
                }
            }
            comm.barrier();
            None
        } else {
            let mut worker = Worker::new(comm);
            let shard = worker.receive().unwrap();
            Some(shard)
        }
    });
    let shard = results[1].as_ref().unwrap();
    assert_eq!(shard.mesh.volume_elements.len(), 10);
    assert_eq!(shard.mesh.points.len(), mesh.points.len());
    assert!(shard.share_hints.iter().all(Vec::is_empty));
}

#[test]
fn undeclared_vertex_fails_the_receive_phase() {
    let results = run_world(2, |comm| {
        if comm.rank() == COORDINATOR {
            let mut w = WireWriter::with_header(SectionKind::VolumeElements.code());
            w.put_u32(1);
            VolumeRecord {
                gid: 0,
                kind: ElementType::Tetrahedron,
                material: 1,
                vertices: vec![0, 1, 2, 999],
            }
            .encode(&mut w);
            comm.barrier();
            send_section(comm, 1, SectionKind::VolumeElements.as_tag(), &w.finish()).unwrap();
            None
        } else {
            Some(distribute_mesh(comm, None, &DistributionConfig::default()))
        }
    });
    let err = results.into_iter().nth(1).flatten().unwrap().unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Receive));
    assert_eq!(
        err.root_cause(),
        &MeshShardError::UnknownVertexReference { global: 999 }
    );
    let msg = err.to_string();
    assert!(msg.contains("receive") && msg.contains("rank 1"), "{msg}");
}

#[test]
fn element_with_too_few_vertices_fails_the_receive_phase() {
    let mesh = tet_box(1, 1, 1);
    let results = run_world(2, |comm| {
        if comm.rank() == COORDINATOR {
            let part = Partition {
                n_parts: 1,
                owner: vec![Some(1); mesh.volume_elements.len()],
            };
            let plan = DistributionPlan::build(&mesh, &part);
            let sections = serialize_shard(&mesh, &plan, 1).unwrap();
            let mut bad = WireWriter::with_header(SectionKind::VolumeElements.code());
            bad.put_u32(1);
            VolumeRecord {
                gid: 0,
                kind: ElementType::Hexahedron,
                material: 1,
                vertices: vec![0, 1, 2, 3],
            }
            .encode(&mut bad);
            let bad = bad.finish();
            comm.barrier();
            for (kind, payload) in &sections {
                let payload = if *kind == SectionKind::VolumeElements { &bad } else { payload };
                send_section(comm, 1, kind.as_tag(), payload).unwrap();
            }
            None
        } else {
            Some(distribute_mesh(comm, None, &DistributionConfig::default()))
        }
    });
    let err = results.into_iter().nth(1).flatten().unwrap().unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Receive));
    assert_eq!(
        err.root_cause(),
        &MeshShardError::ElementShape {
            kind: EntityKind::VolumeElement,
            index: 0,
            element: ElementType::Hexahedron,
            expected: 8,
            found: 4,
        }
    );
}

#[test]
fn misshapen_global_mesh_is_rejected_before_partitioning() {
    let mut mesh = tet_box(2, 1, 1);
    mesh.volume_elements[3].vertices.pop();

    let err = distribute_mesh(&NoComm, Some(&mesh), &DistributionConfig::default()).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Partition));
    assert!(matches!(
        err.root_cause(),
        MeshShardError::ElementShape { index: 3, expected: 4, found: 3, .. }
    ));

    let comms = LocalComm::world(3);
    let cfg = PartitionerConfig::default();
    let err = Coordinator::new(&comms[0], &mesh)
        .partition_with(&cfg, &GreedyPartitioner::new(cfg.clone()))
        .unwrap_err();
    assert!(matches!(
        err,
        MeshShardError::Partitioning(PartitionError::MalformedMesh(_))
    ));
}

#[test]
fn serial_world_keeps_whole_mesh() {
    let mesh = tet_box(3, 2, 1);
    let out = distribute_mesh(&NoComm, Some(&mesh), &DistributionConfig::default()).unwrap();
    let shard = out.into_shard().unwrap();
    assert_eq!(shard.mesh, mesh);
    for kind in EntityKind::ALL {
        for l in 0..shard.count(kind) {
            assert_eq!(shard.global_id(kind, l), Some(l));
        }
    }
}

#[test]
fn coordinator_without_mesh_is_a_partition_error() {
    let comms = LocalComm::world(1);
    let err = distribute_mesh(&comms[0], None, &DistributionConfig::default()).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Partition));
}

#[test]
fn empty_mesh_is_rejected_before_anything_is_sent() {
    let comms = LocalComm::world(3);
    let mesh = Mesh::new();
    let mut coord = Coordinator::new(&comms[0], &mesh);
    let cfg = PartitionerConfig::default();
    let err = coord
        .partition_with(&cfg, &GreedyPartitioner::new(cfg.clone()))
        .unwrap_err();
    assert_eq!(err, MeshShardError::Partitioning(PartitionError::EmptyGraph));
}

#[test]
fn config_loads_from_json() {
    let cfg: DistributionConfig = serde_json::from_str(
        r#"{"partition": {"rng_seed": 3, "strategy": "dual"}, "overlap_depth": 1}"#,
    )
    .unwrap();
    assert_eq!(cfg.partition.rng_seed, 3);
    assert!(cfg.stitch);
    let back: DistributionConfig = serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
    assert_eq!(back, cfg);
}
