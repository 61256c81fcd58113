//! Enumeration of the sharding strategies of einsum operations.
//!
//! An equation is first split and classified ([`parse_equation`], [`parse_dims`]), the
//! classification yields the options available to a single mesh dimension
//! ([`build_catalog`]), and the options of every mesh dimension are combined into full
//! strategies ([`gen_einsum_strategies`]).

mod catalog;
mod einsum;
mod enumerate;

pub use catalog::*;
pub use einsum::*;
pub use enumerate::*;
