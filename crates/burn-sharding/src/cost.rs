//! Communication cost of redistributing a sharded tensor.
//!
//! Moving a tensor from one [`ShardingSpec`] to another is priced mesh dimension by mesh
//! dimension, each changed placement being mapped to the collective that performs it:
//!
//! | from | to | collective |
//! |---|---|---|
//! | `Shard` | `Replicate` | all-gather |
//! | `Partial` | `Shard` | reduce-scatter |
//! | `Partial` | `Replicate` | all-reduce |
//! | `Shard(a)` | `Shard(b)` | all-to-all, priced as an all-gather plus a penalty |
//! | `Replicate` | `Shard` or `Partial` | none, the change is local |
//! | `Shard` | `Partial` | unreachable, the cost is infinite |
//!
//! Every collective is modeled as a ring: a fixed launch latency, a latency per hop and a
//! transfer time proportional to the bytes each device exchanges. Costs are unitless and
//! only meant to be compared with each other.

use alloc::vec::Vec;
use burn_tensor::{DType, Shape};
use derive_new::new;

use crate::sharding::{Placement, ShardingSpec, SpecError};

/// Errors raised when two specs can't be compared.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CostError {
    /// The specs live on meshes of different shapes.
    #[error("cannot redistribute from mesh {src:?} to mesh {dst:?}")]
    MeshShapeMismatch {
        /// Mesh shape of the source spec.
        src: Vec<usize>,
        /// Mesh shape of the destination spec.
        dst: Vec<usize>,
    },
    /// The specs describe tensors of different shapes.
    #[error("cannot redistribute a tensor of shape {src:?} into shape {dst:?}")]
    TensorShapeMismatch {
        /// Tensor shape of the source spec.
        src: Shape,
        /// Tensor shape of the destination spec.
        dst: Shape,
    },
    /// The specs describe tensors of different element types.
    #[error("cannot redistribute a tensor of type {src:?} into type {dst:?}")]
    DTypeMismatch {
        /// Element type of the source spec.
        src: DType,
        /// Element type of the destination spec.
        dst: DType,
    },
    /// A spec has no tensor metadata, so the moved volume is unknown.
    #[error("redistribution cost requires tensor metadata")]
    MissingTensorMeta,
    /// The number of current specs differs from the number of operands of a strategy.
    #[error("expected {expected} operand spec(s) but got {actual}")]
    OperandCountMismatch {
        /// Number of operands of the strategy.
        expected: usize,
        /// Number of specs given.
        actual: usize,
    },
    /// A spec is invalid for the tensor it describes.
    #[error(transparent)]
    InvalidSpec(#[from] SpecError),
}

/// Constants of the cost model.
#[derive(Clone, Debug, PartialEq)]
pub struct CostModelConfig {
    /// Fixed cost of launching one collective.
    ///
    /// A fused all-reduce launches once where a reduce-scatter followed by an all-gather
    /// launches twice, so it is also the gap between those two.
    pub base_latency: f64,
    /// Cost of every hop around the ring.
    pub hop_latency: f64,
    /// Bytes transferred per unit of cost.
    pub bandwidth: f64,
    /// Extra cost of an all-to-all over an all-gather of the same volume.
    pub all_to_all_penalty: f64,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            base_latency: 1.0,
            hop_latency: 1.0,
            bandwidth: 1024.0,
            all_to_all_penalty: 1.0,
        }
    }
}

impl CostModelConfig {
    /// Sets the fixed cost of launching one collective.
    pub fn with_base_latency(mut self, base_latency: f64) -> Self {
        self.base_latency = base_latency;
        self
    }

    /// Sets the cost of every hop around the ring.
    pub fn with_hop_latency(mut self, hop_latency: f64) -> Self {
        self.hop_latency = hop_latency;
        self
    }

    /// Sets the bytes transferred per unit of cost.
    pub fn with_bandwidth(mut self, bandwidth: f64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Sets the extra cost of an all-to-all over an all-gather.
    pub fn with_all_to_all_penalty(mut self, all_to_all_penalty: f64) -> Self {
        self.all_to_all_penalty = all_to_all_penalty;
        self
    }
}

/// Prices redistributions between sharding specs.
#[derive(new, Clone, Debug, Default, PartialEq)]
pub struct CostModel {
    config: CostModelConfig,
}

impl CostModel {
    /// The constants of the model.
    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    /// Cost of gathering `num_bytes` (the gathered size) across `num_devices` devices.
    pub fn allgather_cost(&self, num_bytes: f64, num_devices: usize) -> f64 {
        self.ring_cost(num_bytes, num_devices)
    }

    /// Cost of reducing `num_bytes` (the size before scattering) across `num_devices` devices.
    pub fn reduce_scatter_cost(&self, num_bytes: f64, num_devices: usize) -> f64 {
        self.ring_cost(num_bytes, num_devices)
    }

    /// Cost of reducing `num_bytes` across `num_devices` devices, every device receiving the
    /// full result.
    pub fn allreduce_cost(&self, num_bytes: f64, num_devices: usize) -> f64 {
        self.reduce_scatter_cost(num_bytes, num_devices) + self.allgather_cost(num_bytes, num_devices)
            - self.config.base_latency
    }

    fn ring_cost(&self, num_bytes: f64, num_devices: usize) -> f64 {
        let hops = num_devices.saturating_sub(1) as f64;
        let latency = self.config.base_latency + hops * self.config.hop_latency;
        let transfer = num_bytes * hops / num_devices as f64 / self.config.bandwidth;

        latency + transfer
    }

    /// Estimates the cost of moving a tensor from `src` to `dst`.
    ///
    /// The result is the sum of the cost of every mesh dimension whose placement changes,
    /// or [`f64::INFINITY`] when a mesh dimension goes from shard to partial, which no
    /// single collective performs.
    pub fn redistribute_cost(
        &self,
        src: &ShardingSpec,
        dst: &ShardingSpec,
    ) -> Result<f64, CostError> {
        if src.mesh_shape() != dst.mesh_shape() {
            return Err(CostError::MeshShapeMismatch {
                src: src.mesh_shape().to_vec(),
                dst: dst.mesh_shape().to_vec(),
            });
        }
        if let (Some(src_meta), Some(dst_meta)) = (src.tensor_meta(), dst.tensor_meta()) {
            if src_meta.shape != dst_meta.shape {
                return Err(CostError::TensorShapeMismatch {
                    src: src_meta.shape.clone(),
                    dst: dst_meta.shape.clone(),
                });
            }
            if src_meta.dtype != dst_meta.dtype {
                return Err(CostError::DTypeMismatch {
                    src: src_meta.dtype,
                    dst: dst_meta.dtype,
                });
            }
        }
        if src.placements() == dst.placements() {
            return Ok(0.0);
        }
        if dst.tensor_meta().is_none() {
            return Err(CostError::MissingTensorMeta);
        }
        let mut num_bytes = src.local_num_bytes().ok_or(CostError::MissingTensorMeta)?;

        let mut cost = 0.0;
        for (mesh_dim, ((current, target), &num_devices)) in src
            .placements()
            .iter()
            .zip(dst.placements())
            .zip(src.mesh_shape())
            .enumerate()
        {
            let dim_cost = self.transition_cost(*current, *target, &mut num_bytes, num_devices);
            log::trace!(
                "Mesh dim {mesh_dim}: {current} -> {target} on {num_devices} device(s) costs {dim_cost}"
            );
            if dim_cost == f64::INFINITY {
                return Ok(f64::INFINITY);
            }
            cost += dim_cost;
        }

        log::debug!("Redistributing {src} -> {dst} costs {cost}");

        Ok(cost)
    }

    /// Cost of one mesh dimension. `num_bytes` is the volume held by each device, updated
    /// when the transition changes it.
    fn transition_cost(
        &self,
        current: Placement,
        target: Placement,
        num_bytes: &mut f64,
        num_devices: usize,
    ) -> f64 {
        match (current, target) {
            (Placement::Replicate, Placement::Replicate)
            | (Placement::Partial(_), Placement::Partial(_)) => 0.0,
            (Placement::Shard(from), Placement::Shard(to)) if from == to => 0.0,
            (Placement::Shard(_), Placement::Shard(_)) => {
                self.allgather_cost(*num_bytes, num_devices) + self.config.all_to_all_penalty
            }
            (Placement::Shard(_), Placement::Replicate) => {
                *num_bytes *= num_devices as f64;
                self.allgather_cost(*num_bytes, num_devices)
            }
            (Placement::Shard(_), Placement::Partial(_)) => f64::INFINITY,
            (Placement::Partial(_), Placement::Replicate) => {
                self.allreduce_cost(*num_bytes, num_devices)
            }
            (Placement::Partial(_), Placement::Shard(_)) => {
                let cost = self.reduce_scatter_cost(*num_bytes, num_devices);
                *num_bytes /= num_devices as f64;
                cost
            }
            (Placement::Replicate, Placement::Shard(_)) => {
                *num_bytes /= num_devices as f64;
                0.0
            }
            (Placement::Replicate, Placement::Partial(_)) => 0.0,
        }
    }
}

/// Estimates the cost of moving a tensor from `src` to `dst` with the default
/// [`CostModelConfig`]. See [`CostModel::redistribute_cost`].
pub fn redistribute_cost(src: &ShardingSpec, dst: &ShardingSpec) -> Result<f64, CostError> {
    CostModel::default().redistribute_cost(src, dst)
}
