use std::sync::Arc;

use ash::vk;
use gfx_hal::{
    Device, Fence, Instance, PhysicalDevice, Queue, Semaphore, Surface, Swapchain,
    SwapchainConfig,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use resource_manager::ResourceManager;
use tracing::{debug, error, info, trace, warn};

use crate::{
    arena::SurfaceArena,
    commands,
    config::RendererConfig,
    error::Result,
    resources,
    state::{TeardownStage, TEARDOWN_ORDER},
    surface::RenderSurface,
};

/// What differs between the swapchain being replaced and its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SwapchainChanges {
    /// The render pass and pipelines must be rebuilt for the new color format.
    pub format: bool,
    /// Command buffers and per-image surface resources must be resized.
    pub image_count: bool,
}

impl SwapchainChanges {
    pub fn between(old: (vk::Format, usize), new: (vk::Format, usize)) -> Self {
        Self {
            format: old.0 != new.0,
            image_count: old.1 != new.1,
        }
    }
}

/// Device-level objects owned by an initialized renderer.
///
/// Raw handles are null until created and reset to null once destroyed.
pub(crate) struct GpuContext {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub command_pool: vk::CommandPool,
    pub render_pass: vk::RenderPass,
    /// Color format the render pass, and every pipeline built against it, expects.
    pub render_pass_format: vk::Format,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub swapchain: Option<Swapchain>,
    /// Image count of the most recent swapchain, kept while the swapchain is absent.
    pub image_count: usize,
    pub image_available: Semaphore,
    pub render_fence: Fence,
    pub resource_manager: ResourceManager,
    pub queue: Arc<Queue>,
    pub surface: Arc<Surface>,
    pub device: Arc<Device>,
    pub instance: Arc<Instance>,
}

impl GpuContext {
    pub fn create<W>(config: &RendererConfig, window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let instance = Instance::new(&config.instance, window)?;
        let surface = unsafe { Surface::new(instance.clone(), window)? };
        let physical_device = PhysicalDevice::select_first(&instance)?;
        let queue_family = physical_device.find_graphics_queue_family(&surface)?;
        let device = Device::new(&physical_device, queue_family)?;
        let queue = device.graphics_queue();
        let resource_manager = ResourceManager::new(device.clone(), queue.clone())?;
        let image_available = Semaphore::new(device.clone())?;
        let render_fence = Fence::new(device.clone(), false)?;

        let swapchain =
            unsafe { Swapchain::new(device.clone(), surface.clone(), &config.swapchain, None)? };
        info!(
            "Swapchain ready: {} image(s), {:?}, {}x{}",
            swapchain.image_count(),
            swapchain.format().format,
            swapchain.extent().width,
            swapchain.extent().height
        );

        let mut context = Self {
            command_buffers: Vec::new(),
            command_pool: vk::CommandPool::null(),
            render_pass: vk::RenderPass::null(),
            render_pass_format: vk::Format::UNDEFINED,
            framebuffers: Vec::new(),
            image_count: swapchain.image_count(),
            swapchain: Some(swapchain),
            image_available,
            render_fence,
            resource_manager,
            queue,
            surface,
            device,
            instance,
        };

        if let Err(e) = context.create_frame_resources() {
            error!("Failed to create frame resources: {}", e);
            context.teardown(&mut SurfaceArena::new());
            return Err(e);
        }
        Ok(context)
    }

    /// Render pass, framebuffers, command pool and one command buffer per image.
    fn create_frame_resources(&mut self) -> Result<()> {
        let device = self.device.raw();
        let Some(swapchain) = &self.swapchain else {
            return Ok(());
        };

        self.render_pass_format = swapchain.format().format;
        self.render_pass = commands::create_render_pass(device, self.render_pass_format)?;
        self.framebuffers = commands::create_framebuffers(
            device,
            self.render_pass,
            swapchain.image_views(),
            swapchain.extent(),
        )?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.queue.family_index());
        self.command_pool = unsafe { device.create_command_pool(&pool_info, None)? };
        self.command_buffers =
            commands::allocate_command_buffers(device, self.command_pool, swapchain.image_count())?;
        Ok(())
    }

    /// Replaces the swapchain for `extent`, rebuilding everything sized by its images.
    pub fn recreate_swapchain(
        &mut self,
        config: &SwapchainConfig,
        extent: vk::Extent2D,
        surfaces: &mut SurfaceArena<RenderSurface>,
    ) -> Result<()> {
        info!("Recreating swapchain ({}x{})...", extent.width, extent.height);
        self.device.wait_idle()?;
        commands::destroy_framebuffers(self.device.raw(), &mut self.framebuffers);

        let old_swapchain = self.swapchain.take();
        let config = SwapchainConfig {
            extent,
            ..config.clone()
        };
        let swapchain = unsafe {
            Swapchain::new(
                self.device.clone(),
                self.surface.clone(),
                &config,
                old_swapchain.as_ref(),
            )?
        };
        drop(old_swapchain);

        if let Some(format) = config.preferred_formats.first() {
            if swapchain.format().format != *format {
                warn!(
                    "Swapchain format is {:?}, not the preferred {:?}.",
                    swapchain.format().format,
                    format
                );
            }
        }

        let changes = SwapchainChanges::between(
            (self.render_pass_format, self.image_count),
            (swapchain.format().format, swapchain.image_count()),
        );
        let image_count = swapchain.image_count();
        let swapchain = self.swapchain.insert(swapchain);

        if changes.format {
            let format = swapchain.format().format;
            info!(
                "Swapchain format changed from {:?} to {:?}, rebuilding render pass.",
                self.render_pass_format, format
            );
            let device = self.device.raw();
            let render_pass = commands::create_render_pass(device, format)?;
            unsafe { device.destroy_render_pass(self.render_pass, None) };
            self.render_pass = render_pass;
            self.render_pass_format = format;
            for surface in surfaces.values_mut() {
                resources::rebuild_pipeline(device, render_pass, surface)?;
            }
        }

        self.framebuffers = commands::create_framebuffers(
            self.device.raw(),
            self.render_pass,
            swapchain.image_views(),
            swapchain.extent(),
        )?;

        if changes.image_count {
            info!(
                "Swapchain image count changed from {} to {}.",
                self.image_count, image_count
            );
            self.free_command_buffers();
            self.command_buffers = commands::allocate_command_buffers(
                self.device.raw(),
                self.command_pool,
                image_count,
            )?;
            for surface in surfaces.values_mut() {
                resources::rebuild_per_image(&self.resource_manager, surface, image_count)?;
            }
            self.image_count = image_count;
        }

        debug!("Swapchain recreated.");
        Ok(())
    }

    /// Waits on the acquire semaphore with an empty submission, leaving it unsignaled
    /// for the next acquire when a frame is abandoned after acquiring its image.
    pub fn consume_acquire_semaphore(&self) -> Result<()> {
        let wait_semaphores = [self.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);
        self.render_fence.reset()?;
        unsafe { self.queue.submit(&[submit_info], Some(&self.render_fence))? };
        self.render_fence.wait(None)?;
        Ok(())
    }

    fn free_command_buffers(&mut self) {
        if !self.command_buffers.is_empty() && self.command_pool != vk::CommandPool::null() {
            unsafe {
                self.device
                    .raw()
                    .free_command_buffers(self.command_pool, &self.command_buffers)
            };
        }
        self.command_buffers.clear();
    }

    /// Destroys every object in dependency order, including the surfaces' GPU resources.
    pub fn teardown(mut self, surfaces: &mut SurfaceArena<RenderSurface>) {
        info!("Tearing down renderer...");
        if let Err(e) = self.device.wait_idle() {
            error!("Error waiting for device idle during teardown: {}", e);
        }

        for stage in TEARDOWN_ORDER {
            trace!("Teardown stage {:?}", stage);
            let device = self.device.raw();
            match stage {
                TeardownStage::CommandBuffers => self.free_command_buffers(),
                TeardownStage::CommandPool => {
                    if self.command_pool != vk::CommandPool::null() {
                        unsafe { device.destroy_command_pool(self.command_pool, None) };
                        self.command_pool = vk::CommandPool::null();
                    }
                }
                TeardownStage::RenderPass => {
                    if self.render_pass != vk::RenderPass::null() {
                        unsafe { device.destroy_render_pass(self.render_pass, None) };
                        self.render_pass = vk::RenderPass::null();
                    }
                }
                TeardownStage::Swapchain => {
                    commands::destroy_framebuffers(device, &mut self.framebuffers);
                    self.swapchain = None;
                    for surface in surfaces.values_mut() {
                        surface.release_uniform_buffers(&self.resource_manager);
                    }
                }
                TeardownStage::Pipelines => {
                    for surface in surfaces.values_mut() {
                        surface.release_pipeline(device);
                    }
                }
                TeardownStage::GeometryBuffers => {
                    for surface in surfaces.values_mut() {
                        surface.release_geometry(&self.resource_manager);
                    }
                }
                TeardownStage::Textures => {
                    for surface in surfaces.values_mut() {
                        surface.release_textures(&self.resource_manager);
                    }
                }
                TeardownStage::Descriptors => {
                    for surface in surfaces.values_mut() {
                        surface.release_descriptors(device);
                    }
                }
                TeardownStage::Context => {
                    self.release_context();
                    break;
                }
            }
        }
        info!("Renderer torn down.");
    }

    fn release_context(self) {
        let Self {
            image_available,
            render_fence,
            resource_manager,
            queue,
            surface,
            device,
            instance,
            ..
        } = self;
        drop(image_available);
        drop(render_fence);
        drop(resource_manager);
        drop(queue);
        drop(surface);
        drop(device);
        drop(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_swapchain_shape_rebuilds_only_framebuffers() {
        let shape = (vk::Format::B8G8R8A8_SRGB, 3);
        assert_eq!(
            SwapchainChanges::between(shape, shape),
            SwapchainChanges {
                format: false,
                image_count: false
            }
        );
    }

    #[test]
    fn format_and_image_count_changes_are_independent() {
        let changes = SwapchainChanges::between(
            (vk::Format::B8G8R8A8_SRGB, 3),
            (vk::Format::R8G8B8A8_UNORM, 3),
        );
        assert!(changes.format);
        assert!(!changes.image_count);

        let changes = SwapchainChanges::between(
            (vk::Format::B8G8R8A8_SRGB, 2),
            (vk::Format::B8G8R8A8_SRGB, 3),
        );
        assert!(!changes.format);
        assert!(changes.image_count);
    }
}
