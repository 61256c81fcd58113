//! Parsing and classification of einsum equations.
//!
//! An equation such as `"bmk,bkn->bmn"` names every dimension of every operand and of the
//! output with a single lowercase label. Each label is then classified by how it flows
//! from the operands to the output:
//!
//! | kind | carried by | in output |
//! |---|---|---|
//! | batch | two or more operands | yes |
//! | out-only (of operand `k`) | exactly operand `k` | yes |
//! | contracting | one or more operands | no |

use alloc::vec;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};

/// Label naming one logical tensor dimension within an equation.
pub type DimLabel = char;

const ARROW: &str = "->";

/// Errors raised for malformed einsum equations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EquationError {
    /// The equation has no `->` separating the operands from the output.
    #[error("equation has no '->' separating operands from the output")]
    MissingArrow,
    /// The equation has more than one `->`.
    #[error("equation has {count} '->' separators, expected exactly one")]
    MultipleArrows {
        /// Number of separators found.
        count: usize,
    },
    /// An operand has no labels.
    #[error("operand #{index} has no dimension labels")]
    EmptyOperand {
        /// Index of the empty operand.
        index: usize,
    },
    /// The output has no labels.
    #[error("output has no dimension labels")]
    EmptyOutput,
    /// A character outside of `a..=z` was found where a label was expected.
    #[error("invalid dimension label {label:?} at position {position}")]
    InvalidLabel {
        /// Offending character.
        label: char,
        /// Character position within the equation.
        position: usize,
    },
    /// A label appears twice within the same operand or within the output.
    #[error("dimension label '{label}' is repeated at position {position}")]
    RepeatedLabel {
        /// Repeated label.
        label: DimLabel,
        /// Character position of the repetition within the equation.
        position: usize,
    },
    /// An output label is not carried by any operand.
    #[error("output dimension label '{label}' is not carried by any operand")]
    UnknownOutputLabel {
        /// Unknown label.
        label: DimLabel,
    },
}

/// The operand and output sides of an einsum equation, in equation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquationSides {
    /// Labels of each operand.
    pub inputs: Vec<Vec<DimLabel>>,
    /// Labels of the output.
    pub output: Vec<DimLabel>,
}

impl EquationSides {
    /// Number of operands.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Classifies the labels of the equation, see [`parse_dims`].
    pub fn classify(&self) -> Result<DimClassification, EquationError> {
        parse_dims(&self.inputs, &self.output)
    }
}

/// Labels of an equation, grouped by how each dimension flows to the output.
///
/// Every label lands in exactly one group. Batch and out-only labels follow their order
/// in the output; contracting labels follow their first occurrence scanning the operands
/// left to right.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DimClassification {
    /// Labels carried by two or more operands and by the output.
    pub batch_dims: Vec<DimLabel>,
    /// Labels carried by operands but summed away in the output.
    pub contracting_dims: Vec<DimLabel>,
    /// For each operand, the labels carried by that operand only and by the output.
    pub out_only_dims: Vec<Vec<DimLabel>>,
}

impl DimClassification {
    /// Out-only labels of operand `side`, empty if the operand doesn't exist.
    pub fn out_only_dims(&self, side: usize) -> &[DimLabel] {
        self.out_only_dims.get(side).map_or(&[], Vec::as_slice)
    }

    /// Out-only labels of the first operand.
    pub fn lhs_out_only_dims(&self) -> &[DimLabel] {
        self.out_only_dims(0)
    }

    /// Out-only labels of the second operand.
    pub fn rhs_out_only_dims(&self) -> &[DimLabel] {
        self.out_only_dims(1)
    }

    /// Total number of classified labels.
    pub fn num_dims(&self) -> usize {
        self.batch_dims.len()
            + self.contracting_dims.len()
            + self.out_only_dims.iter().map(Vec::len).sum::<usize>()
    }
}

/// Splits an einsum equation into its operand sides and its output side.
///
/// # Example
///
/// ```rust
/// use burn_sharding::strategy::parse_equation;
///
/// let sides = parse_equation("bmk,bkn->bmn").unwrap();
/// assert_eq!(sides.inputs, vec![vec!['b', 'm', 'k'], vec!['b', 'k', 'n']]);
/// assert_eq!(sides.output, vec!['b', 'm', 'n']);
/// ```
pub fn parse_equation(equation: &str) -> Result<EquationSides, EquationError> {
    let (lhs, output) = match equation.matches(ARROW).count() {
        0 => return Err(EquationError::MissingArrow),
        1 => equation
            .split_once(ARROW)
            .ok_or(EquationError::MissingArrow)?,
        count => return Err(EquationError::MultipleArrows { count }),
    };

    let mut inputs = Vec::new();
    let mut offset = 0;
    for (index, operand) in lhs.split(',').enumerate() {
        if operand.is_empty() {
            return Err(EquationError::EmptyOperand { index });
        }
        inputs.push(parse_side(operand, offset)?);
        offset += operand.chars().count() + 1;
    }

    if output.is_empty() {
        return Err(EquationError::EmptyOutput);
    }
    let output = parse_side(output, lhs.chars().count() + ARROW.len())?;

    Ok(EquationSides { inputs, output })
}

/// Parses the labels of one side, `offset` being the position of its first character.
fn parse_side(side: &str, offset: usize) -> Result<Vec<DimLabel>, EquationError> {
    let mut labels = Vec::with_capacity(side.len());
    for (i, label) in side.chars().enumerate() {
        let position = offset + i;
        if !label.is_ascii_lowercase() {
            return Err(EquationError::InvalidLabel { label, position });
        }
        if labels.contains(&label) {
            return Err(EquationError::RepeatedLabel { label, position });
        }
        labels.push(label);
    }

    Ok(labels)
}

/// Classifies every label of an equation as batch, contracting or out-only.
///
/// A label carried by a single operand but absent from the output is a local reduction of
/// that operand; it is classified as contracting, since sharding it leaves the output
/// partial just like a label summed across operands.
pub fn parse_dims(
    inputs: &[Vec<DimLabel>],
    output: &[DimLabel],
) -> Result<DimClassification, EquationError> {
    let mut carriers: HashMap<DimLabel, usize> = HashMap::new();
    for side in inputs {
        let mut seen = HashSet::new();
        for &label in side {
            if seen.insert(label) {
                *carriers.entry(label).or_default() += 1;
            }
        }
    }

    let mut classification = DimClassification {
        out_only_dims: vec![Vec::new(); inputs.len()],
        ..Default::default()
    };
    let mut classified = HashSet::new();

    for &label in output {
        if !classified.insert(label) {
            continue;
        }
        match carriers.get(&label) {
            Some(&count) if count >= 2 => classification.batch_dims.push(label),
            Some(_) => {
                let side = inputs
                    .iter()
                    .position(|side| side.contains(&label))
                    .ok_or(EquationError::UnknownOutputLabel { label })?;
                classification.out_only_dims[side].push(label);
            }
            None => return Err(EquationError::UnknownOutputLabel { label }),
        }
    }

    for side in inputs {
        for &label in side {
            if !output.contains(&label) && classified.insert(label) {
                classification.contracting_dims.push(label);
            }
        }
    }

    log::trace!("Classified dims of {inputs:?} -> {output:?}: {classification:?}");

    Ok(classification)
}
