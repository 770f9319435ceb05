//! Host-side data shared by the loaders and the renderer: vertex layouts,
//! uniform blocks, built-in meshes and object components.

mod component;
pub mod mesh;
mod uniform;
mod vertex;

pub use component::{Component, ComponentType, Material, Object};
pub use mesh::MeshData;
pub use uniform::{Camera, UniformBufferObject};
pub use vertex::{
    format_size, ColoredVertex, MeshVertex, PositionVertex, Vertex, VertexAttribute, VertexLayout,
};
