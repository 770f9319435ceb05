use crate::{
    error::{GfxHalError, Result},
    instance::Instance,
};

use ash::{khr::surface::Instance as SurfaceLoader, vk};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Everything the swapchain needs to know about a surface on one physical device.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Represents a Vulkan presentation surface, tied to a window.
///
/// Owns the `vk::SurfaceKHR` handle and the `ash` Surface loader extension.
pub struct Surface {
    instance: Arc<Instance>,
    surface_loader: SurfaceLoader,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Creates a new Vulkan `Surface` for `window`.
    ///
    /// # Safety
    /// `window` must provide valid window and display handles for the lifetime
    /// of the `Surface`.
    pub unsafe fn new(
        instance: Arc<Instance>,
        window: &(impl HasWindowHandle + HasDisplayHandle),
    ) -> Result<Arc<Self>> {
        let surface_loader = SurfaceLoader::new(instance.entry(), instance.ash_instance());
        let surface = ash_window::create_surface(
            instance.entry(),
            instance.ash_instance(),
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            None,
        )
        .map_err(GfxHalError::SurfaceCreationError)?;

        tracing::info!("Vulkan surface created successfully.");

        Ok(Arc::new(Self {
            instance,
            surface_loader,
            surface,
        }))
    }

    /// Gets the raw `vk::SurfaceKHR` handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Queries capabilities, formats and present modes in one go.
    ///
    /// # Safety
    /// The `physical_device` handle must be valid and compatible with this surface.
    pub unsafe fn support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        let capabilities = self
            .surface_loader
            .get_physical_device_surface_capabilities(physical_device, self.surface)?;
        let formats = self
            .surface_loader
            .get_physical_device_surface_formats(physical_device, self.surface)?;
        let present_modes = self
            .surface_loader
            .get_physical_device_surface_present_modes(physical_device, self.surface)?;
        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// # Safety
    /// The `physical_device` handle must be valid and compatible with this surface.
    pub unsafe fn get_physical_device_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool> {
        self.surface_loader
            .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
            .map_err(GfxHalError::VulkanError)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
        tracing::debug!("Vulkan surface destroyed.");
    }
}
