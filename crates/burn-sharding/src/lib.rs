#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Burn sharding strategies.
//!
//! Enumerates the ways an einsum operation can be partitioned across a device mesh and
//! estimates the communication cost of moving a tensor from one partitioning to another.
//! Everything here is a pure function of its inputs: nothing is executed on a device.

extern crate alloc;

pub mod cost;
pub mod sharding;
pub mod strategy;

pub use cost::{CostError, CostModel, CostModelConfig, redistribute_cost};
pub use strategy::{OpStrategy, PlacementStrategy, gen_einsum_strategies};
