use alloc::vec;
use alloc::vec::Vec;
use derive_new::new;

use super::{EquationError, PlacementCatalog, build_catalog, parse_equation};
use crate::cost::{CostError, CostModel};
use crate::sharding::{DeviceMesh, Placement, ShardingSpec};

/// One feasible way of running an operation on a mesh: a spec for every operand and one
/// for the output.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct PlacementStrategy {
    /// Spec of the output.
    pub output_spec: ShardingSpec,
    /// Spec of each operand, in operand order.
    pub input_specs: Vec<ShardingSpec>,
}

impl PlacementStrategy {
    /// Prices moving each operand from its current spec to the spec this strategy expects.
    ///
    /// The strategy's input specs inherit the tensor metadata of the current specs.
    pub fn input_redistribute_costs(
        &self,
        current: &[ShardingSpec],
        model: &CostModel,
    ) -> Result<Vec<f64>, CostError> {
        if current.len() != self.input_specs.len() {
            return Err(CostError::OperandCountMismatch {
                expected: self.input_specs.len(),
                actual: current.len(),
            });
        }

        current
            .iter()
            .zip(&self.input_specs)
            .map(|(src, target)| {
                let meta = src.tensor_meta().ok_or(CostError::MissingTensorMeta)?;
                let dst = target.clone().with_tensor_meta(meta.clone())?;
                model.redistribute_cost(src, &dst)
            })
            .collect()
    }
}

/// Every strategy enumerated for one operation on one mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpStrategy {
    mesh_shape: Vec<usize>,
    strategies: Vec<PlacementStrategy>,
}

impl OpStrategy {
    /// Shape of the mesh the strategies were enumerated for.
    pub fn mesh_shape(&self) -> &[usize] {
        &self.mesh_shape
    }

    /// The strategies, in enumeration order.
    pub fn strategies(&self) -> &[PlacementStrategy] {
        &self.strategies
    }

    /// Number of strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no strategy was enumerated.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Iterates over the strategies in enumeration order.
    pub fn iter(&self) -> core::slice::Iter<'_, PlacementStrategy> {
        self.strategies.iter()
    }

    /// The largest number of shards of any strategy's output.
    pub fn max_num_shards(&self) -> usize {
        self.strategies
            .iter()
            .map(|strategy| strategy.output_spec.num_shards())
            .max()
            .unwrap_or(1)
    }
}

impl<'a> IntoIterator for &'a OpStrategy {
    type Item = &'a PlacementStrategy;
    type IntoIter = core::slice::Iter<'a, PlacementStrategy>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Enumerates every strategy of an einsum operation on the given mesh.
///
/// Each mesh dimension picks one option of the equation's [`PlacementCatalog`]
/// independently of the others, so the result holds `catalog.len() ^ mesh.ndim()`
/// strategies, in lexicographic order of the per mesh dimension choices. Nothing is pruned:
/// two mesh dimensions may shard the same tensor dimension.
///
/// Set `linearity` for operations that commute with the partial reduction (e.g. the
/// addition of two partial tensors), which allows keeping every operand partial.
///
/// # Example
///
/// ```rust
/// use burn_sharding::sharding::{DeviceMeshBuilder, MeshDim};
/// use burn_sharding::strategy::gen_einsum_strategies;
///
/// let mesh = DeviceMeshBuilder::new(vec![0, 1, 2, 3], [2, 2])
///     .with_dim(0, MeshDim::new("dp"))
///     .with_dim(1, MeshDim::new("tp"))
///     .build()
///     .unwrap();
///
/// let strategies = gen_einsum_strategies("bmk,bkn->bmn", &mesh, false).unwrap();
/// assert_eq!(strategies.len(), 25);
/// ```
pub fn gen_einsum_strategies<T>(
    equation: &str,
    mesh: &DeviceMesh<T>,
    linearity: bool,
) -> Result<OpStrategy, EquationError> {
    let sides = parse_equation(equation)?;
    let dims = sides.classify()?;
    let catalog = build_catalog(&sides, &dims, linearity);

    let mesh_shape = mesh.shape().to_vec();
    let capacity = u32::try_from(mesh_shape.len())
        .ok()
        .and_then(|ndim| catalog.len().checked_pow(ndim))
        .unwrap_or(0);
    let mut strategies = Vec::with_capacity(capacity);

    let mut selection = vec![0; mesh_shape.len()];
    loop {
        strategies.push(materialize(
            &catalog,
            &selection,
            &mesh_shape,
            sides.num_inputs(),
        ));
        if !advance(&mut selection, catalog.len()) {
            break;
        }
    }

    log::debug!(
        "Generated {} strategies for '{equation}' on mesh {:?} from {} option(s) per mesh dim",
        strategies.len(),
        mesh_shape,
        catalog.len(),
    );

    Ok(OpStrategy {
        mesh_shape,
        strategies,
    })
}

/// Moves the selection to the next tuple, the last mesh dimension varying fastest.
/// Returns `false` once every tuple was visited.
fn advance(selection: &mut [usize], num_options: usize) -> bool {
    for choice in selection.iter_mut().rev() {
        *choice += 1;
        if *choice < num_options {
            return true;
        }
        *choice = 0;
    }

    false
}

fn materialize(
    catalog: &PlacementCatalog,
    selection: &[usize],
    mesh_shape: &[usize],
    num_inputs: usize,
) -> PlacementStrategy {
    let options = catalog.options();
    let spec = |placements: Vec<Placement>| {
        ShardingSpec::from_placements(mesh_shape.to_vec(), placements)
    };

    let output_spec = spec(selection.iter().map(|&o| options[o].output).collect());
    let input_specs = (0..num_inputs)
        .map(|input| spec(selection.iter().map(|&o| options[o].inputs[input]).collect()))
        .collect();

    PlacementStrategy::new(output_spec, input_specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::{DeviceMeshBuilder, MeshDim, TensorMeta};
    use burn_tensor::{DType, Shape};
    use rstest::rstest;

    fn mesh(shape: &[usize]) -> DeviceMesh<usize> {
        let num_devices: usize = shape.iter().product();
        shape
            .iter()
            .enumerate()
            .fold(
                DeviceMeshBuilder::new((0..num_devices).collect(), shape.to_vec()),
                |builder, (idx, _)| builder.with_dim(idx, MeshDim::new(alloc::format!("d{idx}"))),
            )
            .build()
            .unwrap()
    }

    #[rstest]
    #[case::mm_1d("mk,kn->mn", &[4], false, 4)]
    #[case::mm_2d("mk,kn->mn", &[2, 2], false, 16)]
    #[case::bmm_1d("bmk,bkn->bmn", &[4], false, 5)]
    #[case::bmm_2d("bmk,bkn->bmn", &[2, 2], false, 25)]
    #[case::pointwise_1d("abcd,abcd->abcd", &[4], false, 5)]
    #[case::broadcast_1d("bcd,abcd->abcd", &[4], false, 5)]
    #[case::linearity_1d("abcd,abcd->abcd", &[4], true, 6)]
    #[case::mm_3d("mk,kn->mn", &[2, 2, 2], false, 64)]
    fn test_strategy_count(
        #[case] equation: &str,
        #[case] shape: &[usize],
        #[case] linearity: bool,
        #[case] count: usize,
    ) {
        let strategies = gen_einsum_strategies(equation, &mesh(shape), linearity).unwrap();

        assert_eq!(strategies.len(), count);
        assert_eq!(strategies.mesh_shape(), shape);
    }

    #[test]
    fn test_mm_1d_strategies() {
        let strategies = gen_einsum_strategies("mk,kn->mn", &mesh(&[4]), false).unwrap();
        let placements: Vec<(Placement, Placement, Placement)> = strategies
            .iter()
            .map(|strategy| {
                (
                    strategy.output_spec.placements()[0],
                    strategy.input_specs[0].placements()[0],
                    strategy.input_specs[1].placements()[0],
                )
            })
            .collect();

        assert_eq!(
            placements,
            vec![
                (Placement::Replicate, Placement::Replicate, Placement::Replicate),
                (Placement::Shard(0), Placement::Shard(0), Placement::Replicate),
                (Placement::Shard(1), Placement::Replicate, Placement::Shard(1)),
                (Placement::partial(), Placement::Shard(1), Placement::Shard(0)),
            ]
        );
    }

    #[test]
    fn test_2d_strategies_are_independent_per_mesh_dim() {
        let strategies = gen_einsum_strategies("mk,kn->mn", &mesh(&[2, 2]), false).unwrap();

        for strategy in &strategies {
            assert_eq!(strategy.input_specs.len(), 2);
            assert_eq!(strategy.output_spec.placements().len(), 2);
            for spec in &strategy.input_specs {
                assert_eq!(spec.placements().len(), 2);
                assert_eq!(spec.mesh_shape(), &[2, 2]);
            }
        }

        // The second mesh dim varies fastest.
        assert_eq!(
            strategies.strategies()[1].output_spec.placements(),
            &[Placement::Replicate, Placement::Shard(0)]
        );

        // Both mesh dims may shard the same tensor dim.
        let nested = strategies
            .iter()
            .find(|strategy| strategy.output_spec.placements() == [Placement::Shard(0); 2])
            .unwrap();
        assert_eq!(
            nested.input_specs[0].placements(),
            &[Placement::Shard(0), Placement::Shard(0)]
        );
        assert_eq!(strategies.max_num_shards(), 4);
    }

    #[test]
    fn test_linearity_keeps_everything_partial() {
        let strategies =
            gen_einsum_strategies("abcd,abcd->abcd", &mesh(&[4]), true).unwrap();
        let last = strategies.strategies().last().unwrap();

        assert!(last.output_spec.is_partial());
        assert!(last.input_specs.iter().all(ShardingSpec::is_partial));
    }

    #[test]
    fn test_rank_0_mesh_has_a_single_strategy() {
        let strategies = gen_einsum_strategies("mk,kn->mn", &mesh(&[]), false).unwrap();

        assert_eq!(strategies.len(), 1);
        assert!(strategies.strategies()[0].output_spec.placements().is_empty());
        assert_eq!(strategies.max_num_shards(), 1);
    }

    #[test]
    fn test_malformed_equation_is_rejected() {
        let result = gen_einsum_strategies("mk,kn", &mesh(&[4]), false);

        assert_eq!(result, Err(EquationError::MissingArrow));
    }

    #[test]
    fn test_input_redistribute_costs() {
        let strategies = gen_einsum_strategies("mk,kn->mn", &mesh(&[4]), false).unwrap();
        let meta = TensorMeta::contiguous(Shape::new([8, 8]), DType::F32);
        let replicated = ShardingSpec::new(vec![4], vec![Placement::Replicate], Some(meta))
            .unwrap();
        let current = [replicated.clone(), replicated];
        let model = CostModel::default();

        // Slicing a replicated operand is local.
        for strategy in &strategies {
            let costs = strategy.input_redistribute_costs(&current, &model).unwrap();
            assert_eq!(costs, vec![0.0, 0.0]);
        }

        let result = strategies.strategies()[0].input_redistribute_costs(&current[..1], &model);
        assert_eq!(
            result,
            Err(CostError::OperandCountMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_input_redistribute_costs_requires_meta() {
        let strategies = gen_einsum_strategies("mk,kn->mn", &mesh(&[4]), false).unwrap();
        let bare = ShardingSpec::new(vec![4], vec![Placement::Shard(0)], None).unwrap();

        let result = strategies.strategies()[0]
            .input_redistribute_costs(&[bare.clone(), bare], &CostModel::default());
        assert_eq!(result, Err(CostError::MissingTensorMeta));
    }
}
