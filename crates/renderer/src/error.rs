use std::path::PathBuf;

use ash::vk;
use gfx_hal::error::GfxHalError;
use resource_manager::ResourceManagerError;
use thiserror::Error;

use crate::{arena::SurfaceHandle, state::RendererState, surface::SurfaceDescBuilderError};

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Graphics HAL Error: {0}")]
    GfxHal(#[from] GfxHalError),
    #[error("Resource Manager Error: {0}")]
    ResourceManager(#[from] ResourceManagerError),
    #[error("Vulkan Error: {0}")]
    Vulkan(#[from] vk::Result),
    #[error("Failed to create shader module: {0}")]
    ShaderCreation(vk::Result),
    #[error("Shader '{}' is not valid SPIR-V ({len} bytes)", path.display())]
    InvalidShader { path: PathBuf, len: usize },
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create pipeline layout: {0}")]
    PipelineLayoutCreation(vk::Result),
    #[error("Failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),
    #[error("Failed to allocate command buffers: {0}")]
    CommandBufferAllocation(vk::Result),
    #[error("Unknown surface handle {0:?}")]
    UnknownSurface(SurfaceHandle),
    #[error("{resource} already created for surface '{surface}'")]
    AlreadyCreated {
        surface: String,
        resource: &'static str,
    },
    #[error("Surface '{surface}' is missing {resource}")]
    MissingResource {
        surface: String,
        resource: &'static str,
    },
    #[error("Operation '{operation}' not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: RendererState,
    },
    #[error("Render fence still unsignaled after {attempts} wait(s)")]
    FenceTimeout { attempts: u32 },
    #[error("Uniform slot {index} out of range ({count} slots)")]
    UniformSlotOutOfRange { index: usize, count: usize },
    #[error("Invalid surface description: {0}")]
    InvalidSurfaceDesc(#[from] SurfaceDescBuilderError),
}

pub type Result<T, E = RendererError> = std::result::Result<T, E>;
