use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use mesh_shard::algs::dual_graph::build_dual;
use mesh_shard::algs::meshgen::tet_box;
use mesh_shard::algs::partition::partition_mesh;
use mesh_shard::algs::serialize::{DistributionPlan, serialize_shard};
use mesh_shard::partitioning::{GraphPartitioner, GreedyPartitioner, PartitionerConfig};

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for &(nx, n_parts) in &[(10, 4), (20, 8), (40, 16)] {
        let mesh = tet_box(nx, 8, 8);
        let elements: Vec<usize> = mesh.primary_elements().collect();
        let cfg = PartitionerConfig::default();
        let partitioner = GreedyPartitioner::new(cfg.clone());
        let label = format!("tets{}", mesh.volume_elements.len());

        group.bench_with_input(BenchmarkId::new("build_dual", &label), &mesh, |b, mesh| {
            b.iter(|| build_dual(mesh, &elements, 3));
        });

        let graph = build_dual(&mesh, &elements, 3);
        group.bench_with_input(BenchmarkId::new("greedy", &label), &graph, |b, g| {
            b.iter(|| partitioner.partition_graph(g, n_parts).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("serialize", &label), &mesh, |b, mesh| {
            let part = partition_mesh(mesh, n_parts, &cfg, &partitioner).unwrap();
            let plan = DistributionPlan::build(mesh, &part);
            b.iter(|| {
                for rank in 1..=n_parts {
                    let _ = serialize_shard(mesh, &plan, rank).unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);
