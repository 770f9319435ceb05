use std::path::{Path, PathBuf};

use ash::vk;
use gpu_allocator::MemoryLocation;
use resource_manager::{ResourceManager, SamplerDesc, TextureData};
use shared::{Material, Object};
use tracing::{debug, info, warn};

use crate::{
    arena::SurfaceHandle,
    error::{RendererError, Result},
    pipeline::{self, PipelineDesc},
    surface::{RenderSurface, ResourceBinding, SurfaceDescBuilder, SurfaceResource},
    VulkanRenderer,
};

/// One host-visible uniform buffer per swapchain image.
pub(crate) fn create_uniform_buffers(
    resource_manager: &ResourceManager,
    surface: &mut RenderSurface,
    image_count: usize,
) -> Result<()> {
    let size = surface
        .uniform_size()
        .ok_or_else(|| surface.missing("uniform binding"))?;

    let mut buffers = Vec::with_capacity(image_count);
    for image_index in 0..image_count {
        let name = format!("{} uniform #{}", surface.name(), image_index);
        match resource_manager.create_buffer(
            &name,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        ) {
            Ok(buffer) => buffers.push(buffer),
            Err(e) => {
                for buffer in buffers {
                    resource_manager.destroy_buffer(buffer);
                }
                return Err(e.into());
            }
        }
    }
    surface.uniform_buffers = buffers;
    Ok(())
}

/// Creates the descriptor pool and one set per swapchain image, then points every set
/// at its image's uniform buffer and at all textures.
pub(crate) fn create_descriptor_sets(
    device: &ash::Device,
    surface: &mut RenderSurface,
    image_count: usize,
) -> Result<()> {
    let layout = surface
        .descriptor_set_layout
        .ok_or_else(|| surface.missing("descriptor set layout"))?;
    if surface.has_uniform() && surface.uniform_buffers.len() != image_count {
        return Err(surface.missing("uniform buffers"));
    }
    if surface.textures.len() != surface.declared_textures() {
        return Err(surface.missing("textures"));
    }

    let pool_sizes: Vec<vk::DescriptorPoolSize> = surface
        .layout_bindings()
        .iter()
        .map(|binding| vk::DescriptorPoolSize {
            ty: binding.descriptor_type,
            descriptor_count: binding.descriptor_count * image_count as u32,
        })
        .collect();
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .pool_sizes(&pool_sizes)
        .max_sets(image_count as u32);
    let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };

    let set_layouts = vec![layout; image_count];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&set_layouts);
    let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
        Ok(sets) => sets,
        Err(e) => {
            unsafe { device.destroy_descriptor_pool(pool, None) };
            return Err(e.into());
        }
    };

    let image_infos: Vec<vk::DescriptorImageInfo> = surface
        .textures
        .iter()
        .map(|texture| texture.descriptor_info())
        .collect();
    let texture_binding = u32::from(surface.has_uniform());

    for (image_index, &set) in sets.iter().enumerate() {
        let buffer_info = surface.uniform_buffers.get(image_index).map(|buffer| {
            vk::DescriptorBufferInfo::default()
                .buffer(buffer.handle())
                .offset(0)
                .range(buffer.size())
        });

        let mut writes = Vec::with_capacity(2);
        if let Some(buffer_info) = &buffer_info {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(buffer_info)),
            );
        }
        if !image_infos.is_empty() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(texture_binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos),
            );
        }
        unsafe { device.update_descriptor_sets(&writes, &[]) };
    }

    surface.descriptor_pool = Some(pool);
    surface.descriptor_sets = sets;
    Ok(())
}

/// Resizes a surface's per-image uniform buffers and descriptor sets to `image_count`.
///
/// Only what the surface already had is rebuilt.
pub(crate) fn rebuild_per_image(
    resource_manager: &ResourceManager,
    surface: &mut RenderSurface,
    image_count: usize,
) -> Result<()> {
    let device = resource_manager.device().raw();
    let had_uniforms = !surface.uniform_buffers.is_empty();
    let had_sets = surface.descriptor_pool.is_some();

    surface.release_descriptor_pool(device);
    if had_uniforms {
        surface.release_uniform_buffers(resource_manager);
        create_uniform_buffers(resource_manager, surface, image_count)?;
    }
    if had_sets {
        create_descriptor_sets(device, surface, image_count)?;
    }
    debug!(
        "Rebuilt per-image resources of '{}' for {} image(s).",
        surface.name(),
        image_count
    );
    Ok(())
}

impl VulkanRenderer {
    pub fn create_vertex_buffer(&mut self, handle: SurfaceHandle) -> Result<()> {
        const OPERATION: &str = "create_vertex_buffer";
        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        surface.check_can_create(SurfaceResource::VertexBuffer)?;
        let buffer = gpu.resource_manager.create_buffer_with_data(
            &format!("{} vertices", surface.name()),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&surface.mesh().vertices),
            surface.desc().upload,
        )?;
        surface.vertex_buffer = Some(buffer);
        self.invalidate(OPERATION)
    }

    pub fn create_index_buffer(&mut self, handle: SurfaceHandle) -> Result<()> {
        const OPERATION: &str = "create_index_buffer";
        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        surface.check_can_create(SurfaceResource::IndexBuffer)?;
        let buffer = gpu.resource_manager.create_buffer_with_data(
            &format!("{} indices", surface.name()),
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&surface.mesh().indices),
            surface.desc().upload,
        )?;
        surface.index_buffer = Some(buffer);
        self.invalidate(OPERATION)
    }

    /// One uniform buffer per swapchain image, sized by the surface's uniform binding.
    pub fn create_uniform_buffer(&mut self, handle: SurfaceHandle) -> Result<()> {
        const OPERATION: &str = "create_uniform_buffer";
        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        surface.check_can_create(SurfaceResource::UniformBuffers)?;
        create_uniform_buffers(&gpu.resource_manager, surface, gpu.image_count)?;
        self.invalidate(OPERATION)
    }

    /// Loads a `.ktx` texture into the next declared texture binding.
    pub fn create_texture_from_file(
        &mut self,
        handle: SurfaceHandle,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        const OPERATION: &str = "create_texture_from_file";
        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        surface.check_can_create(SurfaceResource::Texture)?;
        let texture = gpu
            .resource_manager
            .load_texture(path.as_ref(), &SamplerDesc::default())?;
        surface.textures.push(texture);
        self.invalidate(OPERATION)
    }

    pub fn create_texture_from_data(
        &mut self,
        handle: SurfaceHandle,
        data: &TextureData,
        sampler: &SamplerDesc,
    ) -> Result<()> {
        const OPERATION: &str = "create_texture_from_data";
        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        surface.check_can_create(SurfaceResource::Texture)?;
        let name = format!("{} texture #{}", surface.name(), surface.textures.len());
        let texture = gpu.resource_manager.create_texture(&name, data, sampler)?;
        surface.textures.push(texture);
        self.invalidate(OPERATION)
    }

    /// Builds the layout from the declared bindings once their resources exist.
    ///
    /// Surfaces without bindings need no layout and this is a no-op for them.
    pub fn create_descriptor_set_layout(&mut self, handle: SurfaceHandle) -> Result<()> {
        const OPERATION: &str = "create_descriptor_set_layout";
        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        if surface.desc().bindings.is_empty() {
            debug!("Surface '{}' declares no bindings, no layout needed.", surface.name());
            return Ok(());
        }
        surface.check_can_create(SurfaceResource::DescriptorSetLayout)?;

        let bindings = surface.layout_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            gpu.device
                .raw()
                .create_descriptor_set_layout(&layout_info, None)?
        };
        surface.descriptor_set_layout = Some(layout);
        self.invalidate(OPERATION)
    }

    /// Creates the surface's pipeline from SPIR-V files under the configured shader root.
    pub fn create_graphics_pipeline(
        &mut self,
        handle: SurfaceHandle,
        vertex_shader: impl AsRef<Path>,
        fragment_shader: impl AsRef<Path>,
    ) -> Result<()> {
        const OPERATION: &str = "create_graphics_pipeline";
        let vertex_shader = self.config.shader_root.join(vertex_shader);
        let fragment_shader = self.config.shader_root.join(fragment_shader);

        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        surface.check_can_create(SurfaceResource::Pipeline)?;

        let desc = pipeline_desc(surface, gpu.render_pass, vertex_shader, fragment_shader);
        let created = pipeline::create_graphics_pipeline(gpu.device.raw(), &desc)?;
        surface.pipeline = Some(created);
        self.invalidate(OPERATION)
    }

    /// Allocates and writes one descriptor set per swapchain image.
    pub fn create_descriptor_set(&mut self, handle: SurfaceHandle) -> Result<()> {
        const OPERATION: &str = "create_descriptor_set";
        let (gpu, surface) = self.context_and_surface(handle, OPERATION)?;
        if surface.desc().bindings.is_empty() {
            return Ok(());
        }
        surface.check_can_create(SurfaceResource::DescriptorSets)?;
        create_descriptor_sets(gpu.device.raw(), surface, gpu.image_count)?;
        self.invalidate(OPERATION)
    }

    /// Turns a tagged [`Object`] into a fully created surface.
    ///
    /// The object needs geometry and a material; its transform defaults to identity.
    /// If any step fails the surface and whatever it had created are discarded.
    pub fn spawn_object(&mut self, object: &Object) -> Result<SurfaceHandle> {
        let mesh = object
            .geometry()
            .ok_or_else(|| RendererError::MissingResource {
                surface: object.name().to_string(),
                resource: "geometry component",
            })?;
        let material = object
            .material()
            .ok_or_else(|| RendererError::MissingResource {
                surface: object.name().to_string(),
                resource: "material component",
            })?;

        let desc = SurfaceDescBuilder::default()
            .name(object.name())
            .mesh(mesh.clone())
            .transform(object.transform())
            .bindings(vec![ResourceBinding::mvp()])
            .build()?;
        let state = self.state;
        let handle = self.create_surface(desc)?;

        if let Err(e) = self.populate_object(handle, mesh.is_indexed(), material) {
            warn!("Spawning object '{}' failed, discarding its surface: {}", object.name(), e);
            self.discard_surface(handle);
            self.state = state;
            return Err(e);
        }

        info!("Spawned object '{}' as surface {:?}.", object.name(), handle);
        Ok(handle)
    }

    fn populate_object(
        &mut self,
        handle: SurfaceHandle,
        indexed: bool,
        material: &Material,
    ) -> Result<()> {
        self.create_vertex_buffer(handle)?;
        if indexed {
            self.create_index_buffer(handle)?;
        }
        self.create_uniform_buffer(handle)?;
        self.create_descriptor_set_layout(handle)?;
        self.create_graphics_pipeline(handle, &material.vertex_shader, &material.fragment_shader)?;
        self.create_descriptor_set(handle)
    }

    /// Unregisters a surface and destroys whatever GPU objects it holds.
    fn discard_surface(&mut self, handle: SurfaceHandle) {
        let Some(mut surface) = self.surfaces.remove(handle) else {
            return;
        };
        if let Some(gpu) = &self.gpu {
            let device = gpu.device.raw();
            surface.release_pipeline(device);
            surface.release_descriptors(device);
            surface.release_textures(&gpu.resource_manager);
            surface.release_uniform_buffers(&gpu.resource_manager);
            surface.release_geometry(&gpu.resource_manager);
        }
        debug!("Discarded surface '{}' ({:?}).", surface.name(), handle);
    }
}

fn pipeline_desc(
    surface: &RenderSurface,
    render_pass: vk::RenderPass,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
) -> PipelineDesc<'_> {
    PipelineDesc {
        name: surface.name(),
        vertex_shader,
        fragment_shader,
        vertex_layout: &surface.mesh().layout,
        set_layout: surface.descriptor_set_layout,
        render_pass,
        cull_mode: surface.desc().cull_mode,
        front_face: surface.desc().front_face,
    }
}

/// Recreates a surface's existing pipeline against `render_pass` from the same shaders.
pub(crate) fn rebuild_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    surface: &mut RenderSurface,
) -> Result<()> {
    let Some(old) = surface.pipeline.take() else {
        return Ok(());
    };
    let desc = pipeline_desc(
        surface,
        render_pass,
        old.vertex_shader.clone(),
        old.fragment_shader.clone(),
    );
    let rebuilt = pipeline::create_graphics_pipeline(device, &desc);
    old.destroy(device);
    surface.pipeline = Some(rebuilt?);
    debug!("Rebuilt pipeline of '{}'.", surface.name());
    Ok(())
}
