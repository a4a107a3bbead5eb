use super::*;

#[test]
fn block_partition_is_contiguous_and_balanced() {
    let g = AdjacencyGraph::from_adjacency(vec![Vec::new(); 10]);
    let labels = BlockPartitioner.partition_graph(&g, 3).unwrap();
    assert_eq!(labels, vec![0, 0, 0, 0, 1, 1, 1, 2, 2, 2]);
    assert!(BlockPartitioner.partition_graph(&g, 0).is_err());
}

#[test]
fn label_check_catches_bad_output() {
    assert_eq!(
        check_labels(&[0, 1], 3, 2),
        Err(PartitionError::LabelCountMismatch { expected: 3, got: 2 })
    );
    assert_eq!(
        check_labels(&[0, 2, 1], 3, 2),
        Err(PartitionError::LabelOutOfRange { label: 2, n_parts: 2 })
    );
    assert!(check_labels(&[1, 0, 1], 3, 2).is_ok());
}

#[test]
fn config_defaults_fill_missing_fields() {
    let cfg: PartitionerConfig = serde_json::from_str(r#"{"rng_seed": 7}"#).unwrap();
    assert_eq!(cfg.rng_seed, 7);
    assert_eq!(cfg.strategy, GraphStrategy::Auto);
    let nodal: PartitionerConfig = serde_json::from_str(r#"{"strategy": "nodal"}"#).unwrap();
    assert_eq!(nodal.strategy, GraphStrategy::Nodal);
}

#[test]
fn single_part_takes_everything() {
    let g = AdjacencyGraph::from_adjacency(vec![vec![1], vec![0, 2], vec![1]]);
    let labels = GreedyPartitioner::default().partition_graph(&g, 1).unwrap();
    assert_eq!(labels, vec![0, 0, 0]);
}

#[test]
fn more_parts_than_vertices_still_labels_in_range() {
    let g = AdjacencyGraph::from_adjacency(vec![vec![1], vec![0]]);
    let labels = GreedyPartitioner::default().partition_graph(&g, 5).unwrap();
    assert_eq!(labels.len(), 2);
    assert!(labels.iter().all(|&l| l < 5));
    assert_ne!(labels[0], labels[1]);
}
