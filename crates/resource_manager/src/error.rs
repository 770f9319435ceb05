use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Error type for the resource_manager crate.
#[derive(Error, Debug)]
pub enum ResourceManagerError {
    #[error("Vulkan API error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("GPU allocation error: {0}")]
    AllocationError(#[from] gpu_allocator::AllocationError),

    #[error("Buffer is not CPU visible or mapped")]
    NotMapped,

    #[error("Write of {len} bytes at offset {offset} exceeds mapped size {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("Cannot upload empty data for {0}")]
    EmptyData(String),

    #[error("Unsupported texture file '{}': only .ktx containers are accepted", .0.display())]
    UnsupportedTextureFormat(PathBuf),

    #[error("Invalid KTX data: {0}")]
    InvalidKtx(String),

    #[error("Unsupported KTX pixel format (glInternalFormat {internal:#x}, glType {ty:#x})")]
    UnsupportedPixelFormat { internal: u32, ty: u32 },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Error occurred in GfxHal: {0}")]
    GfxHalError(#[from] gfx_hal::error::GfxHalError),
}

impl<T> From<std::sync::PoisonError<T>> for ResourceManagerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ResourceManagerError::LockPoisoned(e.to_string())
    }
}

pub type Result<T, E = ResourceManagerError> = std::result::Result<T, E>;
