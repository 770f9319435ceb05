//! Vulkan renderer drawing a list of independently configured surfaces.
//!
//! A [`VulkanRenderer`] owns the device, a single swapchain and one pre-recorded
//! command buffer per swapchain image. Surfaces are described up front with a
//! [`SurfaceDesc`], populated through explicit creation calls and referenced by
//! [`SurfaceHandle`].

mod arena;
mod commands;
mod config;
mod context;
mod error;
mod pipeline;
mod resources;
mod state;
mod surface;

use ash::vk;
use gfx_hal::GfxHalError;
use glam::Mat4;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use shared::Camera;
use tracing::{debug, error, info};

use crate::{
    commands::{FrameTarget, PassInfo},
    context::GpuContext,
    state::{advance, StateEvent},
};

pub use arena::{SurfaceArena, SurfaceHandle};
pub use config::RendererConfig;
pub use error::{RendererError, Result};
pub use pipeline::{load_spirv, spirv_words, SurfacePipeline};
pub use state::{wait_with_retry, RendererState, TeardownStage, TEARDOWN_ORDER};
pub use surface::{
    check_uniform_slots, descriptor_bindings, write_uniform_slot, DrawCall, RenderSurface,
    ResourceBinding, SurfaceDesc, SurfaceDescBuilder, SurfaceDescBuilderError,
};

pub struct VulkanRenderer {
    config: RendererConfig,
    state: RendererState,
    surfaces: SurfaceArena<RenderSurface>,
    /// Latest window size; zero in either dimension pauses rendering.
    extent: vk::Extent2D,
    needs_recreate: bool,
    gpu: Option<GpuContext>,
}

impl VulkanRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            extent: config.swapchain.extent,
            config,
            state: RendererState::Uninitialized,
            surfaces: SurfaceArena::new(),
            needs_recreate: false,
            gpu: None,
        }
    }

    /// Creates the instance, device, swapchain, render pass and command buffers for `window`.
    pub fn init<W>(&mut self, window: &W) -> Result<()>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        const OPERATION: &str = "init";
        if self.state.next(StateEvent::Init).is_none() {
            return Err(RendererError::InvalidState {
                operation: OPERATION,
                state: self.state,
            });
        }
        info!(
            "Initializing renderer for '{}'...",
            self.config.instance.application_name
        );

        let mut config = self.config.clone();
        config.swapchain.extent = self.extent;
        self.gpu = Some(GpuContext::create(&config, window)?);
        advance(&mut self.state, StateEvent::Init, OPERATION)?;

        info!("Renderer initialized.");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state.has_device() && self.gpu.is_some()
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Registers a surface; its GPU resources are created by the `create_*` calls.
    pub fn create_surface(&mut self, desc: SurfaceDesc) -> Result<SurfaceHandle> {
        const OPERATION: &str = "create_surface";
        if self.state == RendererState::Terminated {
            return Err(RendererError::InvalidState {
                operation: OPERATION,
                state: self.state,
            });
        }
        let name = desc.name.clone();
        let handle = self.surfaces.insert(RenderSurface::new(desc));
        debug!("Registered surface '{}' as {:?}", name, handle);
        self.invalidate(OPERATION)?;
        Ok(handle)
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&RenderSurface> {
        self.surfaces.get(handle)
    }

    /// Mutable access for per-frame transform updates.
    pub fn surface_mut(&mut self, handle: SurfaceHandle) -> Option<&mut RenderSurface> {
        self.surfaces.get_mut(handle)
    }

    pub fn surfaces(&self) -> &SurfaceArena<RenderSurface> {
        &self.surfaces
    }

    pub fn camera(&self) -> &Camera {
        &self.config.camera
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.config.camera.view = view;
    }

    pub fn swapchain_image_count(&self) -> Option<usize> {
        self.gpu.as_ref().map(|gpu| gpu.image_count)
    }

    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.gpu
            .as_ref()
            .and_then(|gpu| gpu.swapchain.as_ref())
            .map(|swapchain| swapchain.extent())
    }

    /// Records the whole frame once per swapchain image, drawing surfaces in creation order.
    pub fn construct_render_pass(&mut self) -> Result<()> {
        const OPERATION: &str = "construct_render_pass";
        self.require_device(OPERATION)?;
        let Some(gpu) = self.gpu.as_ref() else {
            return Err(self.invalid_state(OPERATION));
        };
        let Some(swapchain) = gpu.swapchain.as_ref() else {
            debug!("No swapchain to record for, skipping.");
            return Ok(());
        };

        let pass = PassInfo {
            render_pass: gpu.render_pass,
            extent: swapchain.extent(),
            clear_color: self.config.clear_color,
        };
        let targets = gpu
            .command_buffers
            .iter()
            .zip(&gpu.framebuffers)
            .zip(swapchain.images());
        for (image_index, ((&command_buffer, &framebuffer), &image)) in targets.enumerate() {
            let target = FrameTarget {
                image_index,
                command_buffer,
                framebuffer,
                image,
            };
            commands::record_frame(
                gpu.device.raw(),
                &pass,
                &target,
                self.surfaces.iter().map(|(_, surface)| surface),
            )?;
        }
        debug!(
            "Recorded {} command buffer(s) for {} surface(s).",
            gpu.command_buffers.len(),
            self.surfaces.len()
        );
        advance(&mut self.state, StateEvent::Record, OPERATION)
    }

    /// Acquires an image, updates its uniform slots, submits its commands, waits for
    /// them and presents.
    ///
    /// An out-of-date swapchain is recreated and the frame skipped.
    pub fn render_frame(&mut self) -> Result<()> {
        const OPERATION: &str = "render_frame";
        self.require_device(OPERATION)?;

        if self.needs_recreate {
            if self.extent.width == 0 || self.extent.height == 0 {
                return Ok(());
            }
            self.recreate_swapchain()?;
        }
        if self.state == RendererState::Initialized {
            self.construct_render_pass()?;
        }

        let Some(gpu) = self.gpu.as_mut() else {
            return Err(RendererError::InvalidState {
                operation: OPERATION,
                state: self.state,
            });
        };
        let Some(swapchain) = gpu.swapchain.as_ref() else {
            self.needs_recreate = true;
            return Ok(());
        };
        for (_, surface) in self.surfaces.iter() {
            surface.check_uniform_slots(gpu.image_count)?;
        }

        let (image_index, suboptimal) =
            match unsafe { swapchain.acquire_next_image(u64::MAX, &gpu.image_available) } {
                Ok(acquired) => acquired,
                Err(GfxHalError::SurfaceLost) => {
                    debug!("Swapchain out of date on acquire.");
                    self.needs_recreate = true;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
        if suboptimal {
            self.needs_recreate = true;
        }

        let extent = swapchain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let projection = self.config.camera.projection(aspect);
        let view = self.config.camera.view;
        let state = self.state;
        let prepared = gpu
            .command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or(RendererError::InvalidState {
                operation: OPERATION,
                state,
            })
            .and_then(|command_buffer| {
                for surface in self.surfaces.values_mut() {
                    surface.update_uniform(image_index as usize, projection, view)?;
                }
                Ok(command_buffer)
            });
        let command_buffer = match prepared {
            Ok(command_buffer) => command_buffer,
            Err(e) => {
                error!("Dropping frame for image {}: {}", image_index, e);
                gpu.consume_acquire_semaphore()?;
                return Err(e);
            }
        };
        let wait_semaphores = [gpu.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers);

        gpu.render_fence.reset()?;
        unsafe { gpu.queue.submit(&[submit_info], Some(&gpu.render_fence))? };

        let fence = &gpu.render_fence;
        wait_with_retry(
            self.config.fence_timeout,
            self.config.fence_retry_limit,
            |timeout| Ok(fence.wait(Some(timeout))?),
        )?;

        match unsafe { swapchain.present(&gpu.queue, image_index) } {
            Ok(false) => {}
            Ok(true) | Err(GfxHalError::SurfaceLost) => {
                debug!("Swapchain suboptimal or out of date on present.");
                self.needs_recreate = true;
            }
            Err(e) => return Err(e.into()),
        }

        advance(&mut self.state, StateEvent::Frame, OPERATION)
    }

    /// Records the new window size; the swapchain follows on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.extent.width == width && self.extent.height == height {
            return;
        }
        debug!("Resize requested: {}x{}", width, height);
        self.extent = vk::Extent2D { width, height };
        self.needs_recreate = true;
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        gpu.recreate_swapchain(&self.config.swapchain, self.extent, &mut self.surfaces)?;
        self.needs_recreate = false;
        self.invalidate("recreate_swapchain")
    }

    /// Destroys every GPU object in dependency order. Safe to call more than once.
    pub fn terminate(&mut self) {
        if self.state == RendererState::Terminated {
            return;
        }
        if let Some(gpu) = self.gpu.take() {
            gpu.teardown(&mut self.surfaces);
        }
        if let Err(e) = advance(&mut self.state, StateEvent::Terminate, "terminate") {
            error!("{}", e);
        }
    }

    /// Marks recorded command buffers stale.
    fn invalidate(&mut self, operation: &'static str) -> Result<()> {
        advance(&mut self.state, StateEvent::Invalidate, operation)
    }

    fn invalid_state(&self, operation: &'static str) -> RendererError {
        RendererError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn require_device(&self, operation: &'static str) -> Result<()> {
        if self.state.has_device() && self.gpu.is_some() {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn context_and_surface(
        &mut self,
        handle: SurfaceHandle,
        operation: &'static str,
    ) -> Result<(&mut GpuContext, &mut RenderSurface)> {
        self.require_device(operation)?;
        let state = self.state;
        let gpu = self
            .gpu
            .as_mut()
            .ok_or(RendererError::InvalidState { operation, state })?;
        let surface = self
            .surfaces
            .get_mut(handle)
            .ok_or(RendererError::UnknownSurface(handle))?;
        Ok((gpu, surface))
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{mesh, Component, Material, Object};

    fn triangle_desc() -> SurfaceDesc {
        SurfaceDescBuilder::default()
            .name("triangle")
            .mesh(mesh::triangle())
            .build()
            .unwrap()
    }

    #[test]
    fn surfaces_can_be_declared_before_init() {
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        let first = renderer.create_surface(triangle_desc()).unwrap();
        let second = renderer.create_surface(triangle_desc()).unwrap();

        assert_ne!(first, second);
        assert_eq!(renderer.surfaces().handles(), &[first, second]);
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert!(!renderer.is_ready());
        assert_eq!(renderer.swapchain_image_count(), None);
    }

    #[test]
    fn device_operations_need_init() {
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        let handle = renderer.create_surface(triangle_desc()).unwrap();

        assert!(matches!(
            renderer.create_vertex_buffer(handle),
            Err(RendererError::InvalidState {
                operation: "create_vertex_buffer",
                state: RendererState::Uninitialized
            })
        ));
        assert!(matches!(
            renderer.render_frame(),
            Err(RendererError::InvalidState { .. })
        ));
        assert!(matches!(
            renderer.construct_render_pass(),
            Err(RendererError::InvalidState { .. })
        ));
    }

    #[test]
    fn terminate_is_idempotent_and_final() {
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        renderer.terminate();
        renderer.terminate();
        assert_eq!(renderer.state(), RendererState::Terminated);
        assert!(matches!(
            renderer.create_surface(triangle_desc()),
            Err(RendererError::InvalidState {
                operation: "create_surface",
                ..
            })
        ));
    }

    #[test]
    fn spawn_object_requires_material() {
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        let object =
            Object::new("cube").with_component(Component::Geometry(mesh::indexed_cube()));
        assert!(matches!(
            renderer.spawn_object(&object),
            Err(RendererError::MissingResource {
                resource: "material component",
                ..
            })
        ));

        let object = Object::new("empty")
            .with_component(Component::Material(Material::new("a.spv", "b.spv")));
        assert!(matches!(
            renderer.spawn_object(&object),
            Err(RendererError::MissingResource {
                resource: "geometry component",
                ..
            })
        ));
        assert!(renderer.surfaces().is_empty());
    }

    #[test]
    fn failed_spawn_leaves_no_surface_behind() {
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        let object = Object::new("cube")
            .with_component(Component::Geometry(mesh::indexed_cube()))
            .with_component(Component::Material(Material::new("a.spv", "b.spv")));

        assert!(matches!(
            renderer.spawn_object(&object),
            Err(RendererError::InvalidState {
                operation: "create_vertex_buffer",
                ..
            })
        ));
        assert_eq!(renderer.surfaces().len(), 0);
        assert_eq!(renderer.state(), RendererState::Uninitialized);

        let handle = renderer.create_surface(triangle_desc()).unwrap();
        assert_eq!(renderer.surfaces().handles(), &[handle]);
    }

    #[test]
    fn view_is_shared_by_all_surfaces() {
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        let view = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -5.0));
        renderer.set_view(view);
        assert_eq!(renderer.camera().view, view);
    }

    #[test]
    fn resize_to_zero_is_recorded() {
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        renderer.resize(0, 0);
        assert!(renderer.needs_recreate);
        assert_eq!(renderer.extent.width, 0);
    }
}
