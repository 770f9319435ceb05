use std::path::PathBuf;

use thiserror::Error;

/// Any errors that can be returned from this crate.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Error from ResourceManager: {0}")]
    ResourceManagerError(#[from] resource_manager::ResourceManagerError),

    #[error("Error from GLTF: {0}")]
    GltfError(#[from] gltf::Error),

    #[error("Unsupported model file '{}': expected .gltf or .glb", .0.display())]
    UnsupportedModelFormat(PathBuf),

    #[error("Unsupported component type {found:?} for {semantic}, expected {expected:?}")]
    UnsupportedComponentType {
        semantic: String,
        found: gltf::accessor::DataType,
        expected: gltf::accessor::DataType,
    },

    #[error("Unsupported glTF image format {0:?}")]
    UnsupportedImageFormat(gltf::image::Format),

    #[error("Model '{}' contains no drawable primitives", .0.display())]
    NoGeometry(PathBuf),

    #[error("InconsistentData: {0}")]
    InconsistentData(String),
}

pub type Result<T, E = SceneError> = std::result::Result<T, E>;
