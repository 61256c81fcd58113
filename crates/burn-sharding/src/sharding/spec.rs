use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use burn_tensor::{DType, Shape};
use derive_new::new;

use super::Placement;

/// Metadata of the logical (global) tensor described by a [`ShardingSpec`].
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct TensorMeta {
    /// Global shape of the tensor.
    pub shape: Shape,
    /// Strides of the tensor, one per tensor dimension.
    pub strides: Vec<usize>,
    /// Element type of the tensor.
    pub dtype: DType,
}

impl TensorMeta {
    /// Metadata for a row-major contiguous tensor.
    pub fn contiguous(shape: Shape, dtype: DType) -> Self {
        let mut strides = vec![1; shape.num_dims()];
        for dim in (0..shape.num_dims().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * shape.dims[dim + 1];
        }

        Self::new(shape, strides, dtype)
    }

    /// Rank of the tensor.
    pub fn rank(&self) -> usize {
        self.shape.num_dims()
    }

    /// Size of the whole tensor in bytes.
    pub fn num_bytes(&self) -> usize {
        self.shape.num_elements() * self.dtype.size()
    }
}

/// Errors raised when a [`ShardingSpec`] is constructed from inconsistent parts.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// The number of placements differs from the mesh rank.
    #[error("expected {expected} placement(s), one per mesh dimension, but got {actual}")]
    PlacementCountMismatch {
        /// Rank of the mesh.
        expected: usize,
        /// Number of placements given.
        actual: usize,
    },
    /// A mesh dimension holds no device.
    #[error("mesh dimension {dim} has size 0")]
    EmptyMeshDim {
        /// Index of the empty mesh dimension.
        dim: usize,
    },
    /// A shard placement references a tensor dimension beyond the tensor rank.
    #[error("mesh dimension {mesh_dim} shards tensor dimension {tensor_dim}, but the tensor has rank {rank}")]
    ShardDimOutOfRange {
        /// Mesh dimension holding the placement.
        mesh_dim: usize,
        /// Sharded tensor dimension.
        tensor_dim: usize,
        /// Rank of the tensor.
        rank: usize,
    },
    /// The tensor metadata carries a stride count that differs from its rank.
    #[error("tensor of rank {rank} has {strides} stride(s)")]
    StrideRankMismatch {
        /// Rank of the tensor.
        rank: usize,
        /// Number of strides.
        strides: usize,
    },
}

/// Describes how a tensor is distributed across the devices of a mesh.
///
/// A spec holds exactly one [`Placement`] per mesh dimension. Different mesh dimensions
/// may shard the same tensor dimension, in which case the tensor dimension is split
/// across both (nested sharding).
///
/// Tensor metadata is optional: specs produced by strategy enumeration describe placements
/// only, while the cost model requires the metadata to know how many bytes move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardingSpec {
    /// Size of each mesh dimension.
    mesh_shape: Vec<usize>,
    /// Placement of the tensor along each mesh dimension.
    placements: Vec<Placement>,
    /// Metadata of the logical tensor.
    tensor_meta: Option<TensorMeta>,
}

impl ShardingSpec {
    /// Creates a new spec, validating that the placements match the mesh and the tensor.
    pub fn new(
        mesh_shape: Vec<usize>,
        placements: Vec<Placement>,
        tensor_meta: Option<TensorMeta>,
    ) -> Result<Self, SpecError> {
        if placements.len() != mesh_shape.len() {
            return Err(SpecError::PlacementCountMismatch {
                expected: mesh_shape.len(),
                actual: placements.len(),
            });
        }
        if let Some(dim) = mesh_shape.iter().position(|&size| size == 0) {
            return Err(SpecError::EmptyMeshDim { dim });
        }

        let spec = Self {
            mesh_shape,
            placements,
            tensor_meta: None,
        };

        match tensor_meta {
            Some(meta) => spec.with_tensor_meta(meta),
            None => Ok(spec),
        }
    }

    /// Creates a spec whose placements are known to match the mesh.
    pub(crate) fn from_placements(mesh_shape: Vec<usize>, placements: Vec<Placement>) -> Self {
        debug_assert_eq!(mesh_shape.len(), placements.len());
        Self {
            mesh_shape,
            placements,
            tensor_meta: None,
        }
    }

    /// Attaches tensor metadata to the spec, validating the shard placements against its rank.
    pub fn with_tensor_meta(mut self, meta: TensorMeta) -> Result<Self, SpecError> {
        let rank = meta.rank();
        if meta.strides.len() != rank {
            return Err(SpecError::StrideRankMismatch {
                rank,
                strides: meta.strides.len(),
            });
        }

        for (mesh_dim, placement) in self.placements.iter().enumerate() {
            match placement {
                Placement::Shard(tensor_dim) if *tensor_dim >= rank => {
                    return Err(SpecError::ShardDimOutOfRange {
                        mesh_dim,
                        tensor_dim: *tensor_dim,
                        rank,
                    });
                }
                Placement::Shard(_) | Placement::Replicate | Placement::Partial(_) => {}
            }
        }

        self.tensor_meta = Some(meta);
        Ok(self)
    }

    /// Size of each mesh dimension.
    pub fn mesh_shape(&self) -> &[usize] {
        &self.mesh_shape
    }

    /// Placement of the tensor along each mesh dimension.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Metadata of the logical tensor, if known.
    pub fn tensor_meta(&self) -> Option<&TensorMeta> {
        self.tensor_meta.as_ref()
    }

    /// Number of mesh dimensions.
    pub fn ndim(&self) -> usize {
        self.mesh_shape.len()
    }

    /// Number of pieces the tensor is split into, i.e. the product of the sizes of all
    /// mesh dimensions that shard it.
    pub fn num_shards(&self) -> usize {
        self.placements
            .iter()
            .zip(&self.mesh_shape)
            .filter(|(placement, _)| placement.is_shard())
            .map(|(_, size)| *size)
            .product()
    }

    /// Whether the tensor is replicated along every mesh dimension.
    pub fn is_replicated(&self) -> bool {
        self.placements.iter().all(Placement::is_replicate)
    }

    /// Whether the tensor is sharded along at least one mesh dimension.
    pub fn is_sharded(&self) -> bool {
        self.placements.iter().any(Placement::is_shard)
    }

    /// Whether the tensor is partial along at least one mesh dimension.
    pub fn is_partial(&self) -> bool {
        self.placements.iter().any(Placement::is_partial)
    }

    /// Bytes held by each device, if the tensor metadata is known.
    pub fn local_num_bytes(&self) -> Option<f64> {
        self.tensor_meta
            .as_ref()
            .map(|meta| meta.num_bytes() as f64 / self.num_shards() as f64)
    }
}

impl fmt::Display for ShardingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, placement) in self.placements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{placement}")?;
        }
        f.write_str(")")
    }
}
