use ash::vk;
use thiserror::Error;

/// Errors raised while bringing up or driving the Vulkan objects in this crate.
#[derive(Error, Debug)]
pub enum GfxHalError {
    #[error("Vulkan API Error: {0}")]
    VulkanError(#[from] vk::Result),

    /// No physical device (GPU) is exposed by the instance.
    #[error("No suitable physical device found: {0}")]
    NoSuitableGpu(String),

    /// A required Vulkan instance or device extension is not supported.
    #[error("Missing required Vulkan extension: {0:?}")]
    MissingExtension(String),

    /// Failed to find a queue family with the required capabilities.
    #[error("Could not find required queue family: {0}")]
    MissingQueueFamily(String),

    /// The surface does not offer the pixel format the swapchain is built for.
    #[error("Surface does not support the preferred format {0:?}")]
    NoSuitableSurfaceFormat(vk::Format),

    #[error("Failed to create Vulkan surface: {0}")]
    SurfaceCreationError(vk::Result),

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Vulkan surface is no longer valid (maybe lost or out of date)")]
    SurfaceLost,

    #[error("Invalid C string: {0}")]
    InvalidCString(#[from] std::ffi::NulError),

    /// The window did not hand out a usable raw handle.
    #[error("Window handle error: {0}")]
    WindowHandleError(#[from] raw_window_handle::HandleError),

    /// The Vulkan loader library could not be found or opened.
    #[error("Error loading the ash entry.")]
    AshEntryError(#[from] ash::LoadingError),

    #[error("Error from poisoned mutex: {0}")]
    MutexPoisoned(String),
}

pub type Result<T, E = GfxHalError> = std::result::Result<T, E>;

impl<T> From<std::sync::PoisonError<T>> for GfxHalError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::MutexPoisoned(e.to_string())
    }
}
