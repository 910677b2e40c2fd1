//! End-to-end stack test: mesh lookup through the full layer stack.

use ndarray::Array2;
use vismesh_core::{LookupParams, MeshOperator, StructureDescriptor};
use vismesh_net::Network;
use vismesh_op::ReferenceOperator;

#[test]
fn five_layer_stack_over_a_degree_seven_mesh() {
    let descriptor: StructureDescriptor = "4-4-4_8-8".parse().unwrap();
    let mut network = Network::build(&descriptor, 17);

    // Ten projected points in the plane, three input channels.
    let op = ReferenceOperator::new();
    let points = Array2::from_shape_fn((10, 2), |(i, j)| (i as f32 * 1.7 + j as f32).sin());
    let lookup = op
        .lookup(
            &points,
            &LookupParams {
                degree: 7,
                ..Default::default()
            },
        )
        .unwrap();

    let pixels = Array2::from_shape_fn((10, 3), |(i, j)| (i * 3 + j) as f32 / 30.0);
    let features = op.map(&pixels, &lookup.placement).unwrap();

    let out = network.forward(&features, &[&lookup.table]).unwrap();
    assert_eq!(out.dim(), (10, 8));

    // Final layer is a softmax: rows are probability distributions.
    for row in out.rows() {
        let sum: f32 = row.sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }
}

#[test]
fn output_rows_unmap_back_to_source_order() {
    let descriptor: StructureDescriptor = "4_2".parse().unwrap();
    let mut network = Network::build(&descriptor, 5);

    let op = ReferenceOperator::new();
    let points = Array2::from_shape_fn((8, 2), |(i, j)| i as f32 * 0.5 - j as f32 * 0.25);
    let lookup = op.lookup(&points, &LookupParams::default()).unwrap();

    let out = network.forward(&lookup.seed, &[&lookup.table]).unwrap();
    let unmapped = op.unmap(&out, &lookup.placement).unwrap();
    assert_eq!(unmapped.dim(), (8, 2));
}
