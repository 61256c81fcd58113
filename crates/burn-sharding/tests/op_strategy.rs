use burn_sharding::sharding::{
    DeviceMesh, DeviceMeshBuilder, MeshDim, Placement, ShardingSpec, TensorMeta,
};
use burn_sharding::strategy::{parse_dims, parse_equation};
use burn_sharding::{CostModel, gen_einsum_strategies, redistribute_cost};
use burn_tensor::{DType, Shape};

fn mesh_2x2() -> DeviceMesh<usize> {
    DeviceMeshBuilder::new(vec![0, 1, 2, 3], [2, 2])
        .with_dim(0, MeshDim::new("dp"))
        .with_dim(1, MeshDim::new("tp"))
        .build()
        .unwrap()
}

#[test]
fn test_parse_then_classify() {
    let sides = parse_equation("bmk,bkn->bmn").unwrap();
    let dims = parse_dims(&sides.inputs, &sides.output).unwrap();

    assert_eq!(dims.batch_dims, vec!['b']);
    assert_eq!(dims.contracting_dims, vec!['k']);
    assert_eq!(dims.lhs_out_only_dims(), &['m']);
    assert_eq!(dims.rhs_out_only_dims(), &['n']);
}

#[test]
fn test_cheapest_mm_strategy_from_row_sharded_operands() {
    let mesh = mesh_2x2();
    let strategies = gen_einsum_strategies("mk,kn->mn", &mesh, false).unwrap();
    let meta = |rows, cols| TensorMeta::contiguous(Shape::new([rows, cols]), DType::F32);

    // Both operands start sharded on their rows along both mesh dims.
    let lhs = ShardingSpec::new(
        mesh.shape().to_vec(),
        vec![Placement::Shard(0); 2],
        Some(meta(64, 32)),
    )
    .unwrap();
    let rhs = ShardingSpec::new(
        mesh.shape().to_vec(),
        vec![Placement::Shard(0); 2],
        Some(meta(32, 16)),
    )
    .unwrap();
    let current = [lhs, rhs];

    let model = CostModel::default();
    let totals: Vec<f64> = strategies
        .iter()
        .map(|strategy| {
            strategy
                .input_redistribute_costs(&current, &model)
                .unwrap()
                .into_iter()
                .sum()
        })
        .collect();

    assert_eq!(totals.len(), 16);
    assert!(totals.iter().all(|cost| *cost >= 0.0));

    // Keeping the lhs rows sharded only moves the rhs, which is cheaper than gathering both.
    let keep_rows = strategies
        .iter()
        .position(|strategy| strategy.input_specs[0].placements() == [Placement::Shard(0); 2])
        .unwrap();
    let replicate_all = 0;
    assert!(totals[keep_rows] < totals[replicate_all]);
}

#[test]
fn test_enumerated_output_specs_price_against_themselves() {
    let mesh = mesh_2x2();
    let strategies = gen_einsum_strategies("bmk,bkn->bmn", &mesh, false).unwrap();
    let meta = TensorMeta::contiguous(Shape::new([4, 8, 8]), DType::F32);

    for strategy in &strategies {
        let spec = strategy.output_spec.clone().with_tensor_meta(meta.clone()).unwrap();
        assert_eq!(redistribute_cost(&spec, &spec).unwrap(), 0.0);
    }
}
