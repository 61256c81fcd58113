//! Device meshes and the placement of tensors across them.

mod mesh;
mod placement;
mod spec;

pub use mesh::*;
pub use placement::*;
pub use spec::*;
