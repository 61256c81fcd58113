use alloc::vec::Vec;

use super::{DimClassification, DimLabel, EquationSides};
use crate::sharding::Placement;

/// The rule behind a [`MeshDimOption`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    /// Every operand and the output are replicated.
    Replicate,
    /// Every operand carrying the label and the output are sharded on it.
    Batch(DimLabel),
    /// The only operand carrying the label and the output are sharded on it.
    OutOnly {
        /// Operand carrying the label.
        side: usize,
        /// Sharded label.
        label: DimLabel,
    },
    /// Every operand carrying the label is sharded on it, leaving the output partial.
    Contracting(DimLabel),
    /// Every operand and the output are partial. Only valid for linear operations.
    PartialPassthrough,
}

/// One choice of placements for a single mesh dimension: a placement for every operand and
/// one for the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshDimOption {
    /// The rule the placements were derived from.
    pub kind: OptionKind,
    /// Placement of the output.
    pub output: Placement,
    /// Placement of each operand.
    pub inputs: Vec<Placement>,
}

/// The ordered options available to every mesh dimension of an einsum operation.
///
/// The catalog is built once per equation and shared by all mesh dimensions: each mesh
/// dimension picks any of the options independently of the others.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementCatalog {
    options: Vec<MeshDimOption>,
}

impl PlacementCatalog {
    /// The options, in catalog order.
    pub fn options(&self) -> &[MeshDimOption] {
        &self.options
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Whether the catalog has no option. Never true for a built catalog.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Iterates over the options in catalog order.
    pub fn iter(&self) -> core::slice::Iter<'_, MeshDimOption> {
        self.options.iter()
    }
}

/// Builds the option catalog of an equation.
///
/// Options are ordered as: replicate everything, one per batch label, one per out-only
/// label (operand by operand), one per contracting label, then partial passthrough when
/// `linearity` is set.
pub fn build_catalog(
    sides: &EquationSides,
    dims: &DimClassification,
    linearity: bool,
) -> PlacementCatalog {
    let sharded = |kind: OptionKind, label: DimLabel, output: Placement| MeshDimOption {
        kind,
        output,
        inputs: sides
            .inputs
            .iter()
            .map(|side| shard_or_replicate(side, label))
            .collect(),
    };

    let mut options = Vec::with_capacity(2 + dims.num_dims());

    options.push(uniform(OptionKind::Replicate, Placement::Replicate, sides));

    for &label in &dims.batch_dims {
        let output = shard_or_replicate(&sides.output, label);
        options.push(sharded(OptionKind::Batch(label), label, output));
    }

    for (side, labels) in dims.out_only_dims.iter().enumerate() {
        for &label in labels {
            let output = shard_or_replicate(&sides.output, label);
            options.push(sharded(OptionKind::OutOnly { side, label }, label, output));
        }
    }

    for &label in &dims.contracting_dims {
        options.push(sharded(
            OptionKind::Contracting(label),
            label,
            Placement::partial(),
        ));
    }

    if linearity {
        options.push(uniform(
            OptionKind::PartialPassthrough,
            Placement::partial(),
            sides,
        ));
    }

    log::debug!(
        "Built {} mesh dim option(s) for {:?} -> {:?} (linearity: {linearity})",
        options.len(),
        sides.inputs,
        sides.output,
    );

    PlacementCatalog { options }
}

fn uniform(kind: OptionKind, placement: Placement, sides: &EquationSides) -> MeshDimOption {
    MeshDimOption {
        kind,
        output: placement,
        inputs: sides.inputs.iter().map(|_| placement).collect(),
    }
}

/// Shards the side on the label's position when it carries the label.
fn shard_or_replicate(side: &[DimLabel], label: DimLabel) -> Placement {
    side.iter()
        .position(|&l| l == label)
        .map_or(Placement::Replicate, Placement::Shard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::parse_equation;
    use alloc::vec;
    use rstest::rstest;

    fn catalog(equation: &str, linearity: bool) -> PlacementCatalog {
        let sides = parse_equation(equation).unwrap();
        let dims = sides.classify().unwrap();
        build_catalog(&sides, &dims, linearity)
    }

    #[rstest]
    #[case("mk,kn->mn", false, 4)]
    #[case("bmk,bkn->bmn", false, 5)]
    #[case("abcd,abcd->abcd", false, 5)]
    #[case("bcd,abcd->abcd", false, 5)]
    #[case("abcd,abcd->abcd", true, 6)]
    #[case("mk,kn->mn", true, 5)]
    #[case("abd,bf->abfd", false, 5)]
    fn test_catalog_size(#[case] equation: &str, #[case] linearity: bool, #[case] size: usize) {
        let catalog = catalog(equation, linearity);

        assert_eq!(catalog.len(), size);
        assert!(!catalog.is_empty());
    }

    #[test]
    fn test_mm_catalog() {
        let catalog = catalog("mk,kn->mn", false);
        let kinds: Vec<OptionKind> = catalog.iter().map(|option| option.kind).collect();

        assert_eq!(
            kinds,
            vec![
                OptionKind::Replicate,
                OptionKind::OutOnly { side: 0, label: 'm' },
                OptionKind::OutOnly { side: 1, label: 'n' },
                OptionKind::Contracting('k'),
            ]
        );

        let options = catalog.options();
        assert_eq!(options[0].output, Placement::Replicate);
        assert_eq!(options[0].inputs, vec![Placement::Replicate; 2]);

        // Row-wise: m is the first dim of both the lhs and the output.
        assert_eq!(options[1].output, Placement::Shard(0));
        assert_eq!(options[1].inputs, vec![Placement::Shard(0), Placement::Replicate]);

        // Column-wise: n is the second dim of both the rhs and the output.
        assert_eq!(options[2].output, Placement::Shard(1));
        assert_eq!(options[2].inputs, vec![Placement::Replicate, Placement::Shard(1)]);

        assert_eq!(options[3].output, Placement::partial());
        assert_eq!(options[3].inputs, vec![Placement::Shard(1), Placement::Shard(0)]);
    }

    #[test]
    fn test_broadcast_batch_replicates_missing_operand() {
        let catalog = catalog("bcd,abcd->abcd", false);
        let batch_b = catalog
            .iter()
            .find(|option| option.kind == OptionKind::Batch('b'))
            .unwrap();

        assert_eq!(batch_b.output, Placement::Shard(1));
        assert_eq!(batch_b.inputs, vec![Placement::Shard(0), Placement::Shard(1)]);

        let out_only_a = catalog
            .iter()
            .find(|option| option.kind == OptionKind::OutOnly { side: 1, label: 'a' })
            .unwrap();

        assert_eq!(out_only_a.output, Placement::Shard(0));
        assert_eq!(out_only_a.inputs, vec![Placement::Replicate, Placement::Shard(0)]);
    }

    #[test]
    fn test_linearity_appends_partial_passthrough() {
        let catalog = catalog("abcd,abcd->abcd", true);
        let last = catalog.options().last().unwrap();

        assert_eq!(last.kind, OptionKind::PartialPassthrough);
        assert_eq!(last.output, Placement::partial());
        assert_eq!(last.inputs, vec![Placement::partial(); 2]);
    }
}
