//! Device-side resources: geometry, textures, materials and the meshes pairing them

mod geometry;
mod material;
mod mesh;
mod texture;

pub use geometry::*;
pub use material::*;
pub use mesh::*;
pub use texture::*;
