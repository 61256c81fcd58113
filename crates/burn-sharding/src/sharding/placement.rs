use core::fmt;

/// How the pending partial values of a [`Placement::Partial`] tensor are combined.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum ReduceOp {
    /// Element-wise sum across the devices of the mesh dimension.
    #[default]
    Sum,
}

/// Describes how a tensor is laid out along a single mesh dimension.
///
/// A sharding spec holds one placement per mesh dimension. The set of placement kinds
/// is closed: every consumer matches on all three variants.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum Placement {
    /// Every device along the mesh dimension holds a full copy.
    #[default]
    Replicate,
    /// The tensor is split along the given tensor dimension across the mesh dimension.
    Shard(usize),
    /// Every device holds a partial value. The full value is obtained by combining the
    /// partial values across the mesh dimension with the given reduction.
    Partial(ReduceOp),
}

impl Placement {
    /// A partial placement combined with [`ReduceOp::Sum`].
    pub const fn partial() -> Self {
        Placement::Partial(ReduceOp::Sum)
    }

    /// Whether the placement is a [`Placement::Shard`] on any tensor dimension.
    pub fn is_shard(&self) -> bool {
        matches!(self, Placement::Shard(_))
    }

    /// Whether the placement shards the given tensor dimension.
    pub fn is_shard_on(&self, dim: usize) -> bool {
        matches!(self, Placement::Shard(d) if *d == dim)
    }

    /// Whether the placement is [`Placement::Replicate`].
    pub fn is_replicate(&self) -> bool {
        matches!(self, Placement::Replicate)
    }

    /// Whether the placement is [`Placement::Partial`].
    pub fn is_partial(&self) -> bool {
        matches!(self, Placement::Partial(_))
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Replicate => f.write_str("R"),
            Placement::Shard(dim) => write!(f, "S({dim})"),
            Placement::Partial(op) => write!(f, "P({op})"),
        }
    }
}
