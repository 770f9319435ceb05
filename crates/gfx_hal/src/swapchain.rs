use std::sync::Arc;

use ash::khr::swapchain::Device as SwapchainLoader;
use ash::vk;

use crate::device::Device;
use crate::error::{GfxHalError, Result};
use crate::queue::Queue;
use crate::surface::Surface;
use crate::sync::Semaphore;

/// Configuration for creating or recreating a `Swapchain`.
#[derive(Clone, Debug)]
pub struct SwapchainConfig {
    /// Pixel formats in order of preference; the first one the surface offers wins.
    pub preferred_formats: Vec<vk::Format>,
    pub present_mode: vk::PresentModeKHR,
    pub image_usage: vk::ImageUsageFlags,
    /// Used only when the surface leaves the extent up to the swapchain.
    pub extent: vk::Extent2D,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            preferred_formats: vec![vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM],
            present_mode: vk::PresentModeKHR::FIFO,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
        }
    }
}

/// Represents the Vulkan swapchain, managing presentation images.
///
/// Owns the `vk::SwapchainKHR` and one image view per swapchain image. The images
/// themselves belong to the swapchain and are never destroyed individually.
pub struct Swapchain {
    device: Arc<Device>,
    _surface: Arc<Surface>,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a new `Swapchain`, or replaces `old_swapchain` when recreating.
    ///
    /// The image count requested is the surface's minimum.
    ///
    /// # Safety
    /// - `device` and `surface` must be valid and compatible.
    /// - `old_swapchain`, if provided, must not be in use by the GPU. It stays
    ///   valid until the caller drops it, which must happen after this call.
    pub unsafe fn new(
        device: Arc<Device>,
        surface: Arc<Surface>,
        config: &SwapchainConfig,
        old_swapchain: Option<&Swapchain>,
    ) -> Result<Self> {
        let support = surface.support(device.physical_device_handle())?;
        if support.formats.is_empty() || support.present_modes.is_empty() {
            return Err(GfxHalError::NoSuitableGpu(
                "Surface reports no formats or present modes.".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats, &config.preferred_formats)?;
        let present_mode = choose_present_mode(&support.present_modes, config.present_mode);
        let extent = choose_extent(&support.capabilities, config.extent);
        let image_count = support.capabilities.min_image_count;
        let composite_alpha = choose_composite_alpha(&support.capabilities);

        tracing::info!(
            "Creating swapchain: Format={:?}, PresentMode={:?}, Extent={:?}, MinImageCount={}",
            surface_format.format,
            present_mode,
            extent,
            image_count
        );

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(config.image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true);

        if let Some(old) = old_swapchain {
            create_info = create_info.old_swapchain(old.handle());
        }

        let swapchain_loader = SwapchainLoader::new(device.instance().ash_instance(), device.raw());
        let swapchain = swapchain_loader.create_swapchain(&create_info, None)?;

        let images = swapchain_loader.get_swapchain_images(swapchain)?;
        let image_views = match create_image_views(device.raw(), &images, surface_format.format) {
            Ok(views) => views,
            Err(e) => {
                swapchain_loader.destroy_swapchain(swapchain, None);
                return Err(e);
            }
        };
        tracing::debug!("Swapchain created with {} images.", images.len());

        Ok(Self {
            device,
            _surface: surface,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format,
            extent,
        })
    }

    /// Acquires the next available image, blocking up to `timeout_ns`.
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    /// An out-of-date swapchain is reported as [`GfxHalError::SurfaceLost`].
    ///
    /// # Safety
    /// `signal_semaphore` must not have a pending signal operation.
    pub unsafe fn acquire_next_image(
        &self,
        timeout_ns: u64,
        signal_semaphore: &Semaphore,
    ) -> Result<(u32, bool)> {
        match self.swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            signal_semaphore.handle(),
            vk::Fence::null(),
        ) {
            Ok(result) => Ok(result),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GfxHalError::SurfaceLost),
            Err(e) => Err(GfxHalError::VulkanError(e)),
        }
    }

    /// Presents `image_index` on `queue` without waiting on any semaphore.
    ///
    /// Returns `true` when the swapchain is suboptimal.
    ///
    /// # Safety
    /// All rendering to the image must have completed before this call.
    pub unsafe fn present(&self, queue: &Queue, image_index: u32) -> Result<bool> {
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&indices);
        match self
            .swapchain_loader
            .queue_present(queue.handle(), &present_info)
        {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GfxHalError::SurfaceLost),
            Err(e) => Err(GfxHalError::VulkanError(e)),
        }
    }

    /// Gets the raw `vk::SwapchainKHR` handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Actual number of images, which may exceed the requested minimum.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        tracing::debug!(
            "Destroying swapchain and {} image views...",
            self.image_views.len()
        );
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.raw().destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        tracing::debug!("Swapchain destroyed.")
    }
}

/// Picks the first preferred format the surface offers.
///
/// A single `UNDEFINED` entry means the surface accepts anything, in which case the
/// most preferred format is used.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: &[vk::Format],
) -> Result<vk::SurfaceFormatKHR> {
    let first_preference = preferred
        .first()
        .copied()
        .unwrap_or(vk::Format::R8G8B8A8_UNORM);

    if let [only] = available {
        if only.format == vk::Format::UNDEFINED {
            return Ok(vk::SurfaceFormatKHR {
                format: first_preference,
                color_space: only.color_space,
            });
        }
    }

    preferred
        .iter()
        .find_map(|wanted| available.iter().find(|f| f.format == *wanted).copied())
        .ok_or(GfxHalError::NoSuitableSurfaceFormat(first_preference))
}

/// FIFO is the only mode every implementation must support, so it is the fallback.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    desired: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&desired) {
        desired
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

fn choose_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|mode| capabilities.supported_composite_alpha.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

unsafe fn create_image_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(*image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        match device.create_image_view(&create_info, None) {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    device.destroy_image_view(view, None);
                }
                return Err(GfxHalError::VulkanError(e));
            }
        }
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn surface_format_follows_preference_order() {
        let available = [
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::R8G8B8A8_UNORM),
        ];
        let chosen = choose_surface_format(
            &available,
            &[vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM],
        )
        .unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn surface_format_missing_is_an_error() {
        let available = [format(vk::Format::B8G8R8A8_SRGB)];
        let err = choose_surface_format(&available, &[vk::Format::R8G8B8A8_UNORM]).unwrap_err();
        assert!(matches!(
            err,
            GfxHalError::NoSuitableSurfaceFormat(vk::Format::R8G8B8A8_UNORM)
        ));
    }

    #[test]
    fn undefined_surface_format_accepts_preference() {
        let available = [format(vk::Format::UNDEFINED)];
        let chosen = choose_surface_format(&available, &[vk::Format::R8G8B8A8_UNORM]).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn extent_prefers_current_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1080,
                height: 2340,
            },
            ..Default::default()
        };
        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 10,
                height: 10,
            },
        );
        assert_eq!((extent.width, extent.height), (1080, 2340));
    }

    #[test]
    fn extent_is_clamped_when_undefined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 4000,
                height: 600,
            },
        );
        assert_eq!((extent.width, extent.height), (1920, 600));
    }
}
