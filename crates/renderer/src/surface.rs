use std::mem::size_of;

use ash::vk;
use derive_builder::Builder;
use glam::{Mat4, Vec3};
use resource_manager::{GpuBuffer, MappedMemory, ResourceManager, Texture, UploadStrategy};
use shared::{MeshData, UniformBufferObject};
use tracing::trace;

use crate::{
    error::{RendererError, Result},
    pipeline::SurfacePipeline,
};

/// A resource a surface's shaders read through its descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBinding {
    /// One uniform buffer per swapchain image, read by the vertex stage.
    Uniform { size: vk::DeviceSize },
    /// One sampled texture, read by the fragment stage.
    Texture,
}

impl ResourceBinding {
    /// A uniform sized for [`UniformBufferObject`].
    pub fn mvp() -> Self {
        ResourceBinding::Uniform {
            size: size_of::<UniformBufferObject>() as vk::DeviceSize,
        }
    }
}

/// Descriptor set layout bindings for `bindings`.
///
/// The uniform buffer, if any, is binding 0. Textures share the next binding as a
/// combined image sampler array; [`SurfaceDesc`] allows at most one, matching the
/// single `sampler2D` the shaders declare.
pub fn descriptor_bindings(
    bindings: &[ResourceBinding],
) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let mut layout_bindings = Vec::with_capacity(2);
    if bindings
        .iter()
        .any(|b| matches!(b, ResourceBinding::Uniform { .. }))
    {
        layout_bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX),
        );
    }
    let textures = texture_count(bindings);
    if textures > 0 {
        layout_bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(layout_bindings.len() as u32)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(textures as u32)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        );
    }
    layout_bindings
}

fn texture_count(bindings: &[ResourceBinding]) -> usize {
    bindings
        .iter()
        .filter(|b| matches!(b, ResourceBinding::Texture))
        .count()
}

/// Declarative description of a drawable, fixed when the surface is created.
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SurfaceDesc {
    #[builder(setter(into))]
    pub name: String,
    pub mesh: MeshData,
    #[builder(default)]
    pub bindings: Vec<ResourceBinding>,
    #[builder(default = "Mat4::IDENTITY")]
    pub transform: Mat4,
    #[builder(default = "1")]
    pub instance_count: u32,
    #[builder(default)]
    pub first_vertex: u32,
    #[builder(default)]
    pub first_instance: u32,
    #[builder(default)]
    pub upload: UploadStrategy,
    #[builder(default = "vk::CullModeFlags::BACK")]
    pub cull_mode: vk::CullModeFlags,
    #[builder(default = "vk::FrontFace::COUNTER_CLOCKWISE")]
    pub front_face: vk::FrontFace,
}

impl SurfaceDescBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(mesh) = &self.mesh {
            let per_vertex = mesh.layout.floats_per_vertex();
            if per_vertex == 0 {
                return Err("vertex layout has a zero stride".to_string());
            }
            if mesh.vertices.is_empty() {
                return Err("mesh has no vertices".to_string());
            }
            if mesh.vertices.len() % per_vertex != 0 {
                return Err(format!(
                    "{} floats do not make whole vertices of {} floats",
                    mesh.vertices.len(),
                    per_vertex
                ));
            }
            let vertex_count = mesh.vertex_count();
            if let Some(&index) = mesh.indices.iter().find(|&&i| u32::from(i) >= vertex_count) {
                return Err(format!("index {index} out of range for {vertex_count} vertices"));
            }
        }
        if let Some(bindings) = &self.bindings {
            let uniforms = bindings
                .iter()
                .filter(|b| matches!(b, ResourceBinding::Uniform { .. }))
                .count();
            if uniforms > 1 {
                return Err("at most one uniform binding is supported".to_string());
            }
            if bindings
                .iter()
                .any(|b| matches!(b, ResourceBinding::Uniform { size: 0 }))
            {
                return Err("uniform binding has zero size".to_string());
            }
            if texture_count(bindings) > 1 {
                return Err("at most one texture binding is supported".to_string());
            }
        }
        Ok(())
    }
}

/// A single draw command for one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    Indexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Direct {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
}

/// Fails unless `slot_count` uniform slots cover all `image_count` swapchain images.
///
/// Zero slots means the surface has no uniform and is always fine.
pub fn check_uniform_slots(slot_count: usize, image_count: usize) -> Result<()> {
    if slot_count == 0 || slot_count >= image_count {
        return Ok(());
    }
    Err(RendererError::UniformSlotOutOfRange {
        index: image_count - 1,
        count: slot_count,
    })
}

/// A per-surface GPU object made by one of the renderer's `create_*` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SurfaceResource {
    VertexBuffer,
    IndexBuffer,
    UniformBuffers,
    Texture,
    DescriptorSetLayout,
    Pipeline,
    DescriptorSets,
}

/// Which of a surface's GPU objects exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CreatedResources {
    pub vertex_buffer: bool,
    pub index_buffer: bool,
    pub uniform_buffers: bool,
    pub textures: usize,
    pub descriptor_set_layout: bool,
    pub pipeline: bool,
    pub descriptor_sets: bool,
}

/// Writes `ubo` into the uniform slot of `image_index`, leaving every other slot untouched.
pub fn write_uniform_slot<M: MappedMemory>(
    slots: &mut [M],
    image_index: usize,
    ubo: &UniformBufferObject,
) -> Result<()> {
    let count = slots.len();
    let slot = slots
        .get_mut(image_index)
        .ok_or(RendererError::UniformSlotOutOfRange {
            index: image_index,
            count,
        })?;
    slot.write_bytes(0, ubo.as_bytes())?;
    Ok(())
}

/// One drawable mesh instance and the GPU objects created for it.
///
/// Host vertex and index data stay alive for the surface's lifetime so buffers can be
/// rebuilt from them.
#[derive(Debug)]
pub struct RenderSurface {
    desc: SurfaceDesc,
    transform: Mat4,
    pub(crate) vertex_buffer: Option<GpuBuffer>,
    pub(crate) index_buffer: Option<GpuBuffer>,
    pub(crate) uniform_buffers: Vec<GpuBuffer>,
    pub(crate) textures: Vec<Texture>,
    pub(crate) descriptor_set_layout: Option<vk::DescriptorSetLayout>,
    pub(crate) descriptor_pool: Option<vk::DescriptorPool>,
    pub(crate) descriptor_sets: Vec<vk::DescriptorSet>,
    pub(crate) pipeline: Option<SurfacePipeline>,
}

impl RenderSurface {
    pub fn new(desc: SurfaceDesc) -> Self {
        Self {
            transform: desc.transform,
            desc,
            vertex_buffer: None,
            index_buffer: None,
            uniform_buffers: Vec::new(),
            textures: Vec::new(),
            descriptor_set_layout: None,
            descriptor_pool: None,
            descriptor_sets: Vec::new(),
            pipeline: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    pub fn mesh(&self) -> &MeshData {
        &self.desc.mesh
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Post-multiplies a translation, moving the surface in its own frame.
    pub fn translate(&mut self, offset: Vec3) {
        self.transform *= Mat4::from_translation(offset);
    }

    pub fn rotate_y(&mut self, degrees: f32) {
        self.transform *= Mat4::from_rotation_y(degrees.to_radians());
    }

    pub fn has_uniform(&self) -> bool {
        self.uniform_size().is_some()
    }

    pub fn uniform_size(&self) -> Option<vk::DeviceSize> {
        self.desc.bindings.iter().find_map(|b| match b {
            ResourceBinding::Uniform { size } => Some(*size),
            ResourceBinding::Texture => None,
        })
    }

    /// Number of textures the bindings declare.
    pub fn declared_textures(&self) -> usize {
        texture_count(&self.desc.bindings)
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        descriptor_bindings(&self.desc.bindings)
    }

    pub fn draw_call(&self) -> DrawCall {
        let mesh = &self.desc.mesh;
        if mesh.is_indexed() {
            DrawCall::Indexed {
                index_count: mesh.indices.len() as u32,
                instance_count: 1,
                first_index: 0,
                vertex_offset: 0,
                first_instance: 0,
            }
        } else {
            DrawCall::Direct {
                vertex_count: mesh.vertex_count(),
                instance_count: self.desc.instance_count,
                first_vertex: self.desc.first_vertex,
                first_instance: self.desc.first_instance,
            }
        }
    }

    /// Whether everything the recorded commands bind for this surface exists.
    pub fn is_drawable(&self) -> bool {
        self.pipeline.is_some()
            && self.vertex_buffer.is_some()
            && (!self.mesh().is_indexed() || self.index_buffer.is_some())
            && (self.desc.bindings.is_empty() || !self.descriptor_sets.is_empty())
    }

    /// Writes `projection * view * transform` into the slot of `image_index`.
    pub fn update_uniform(
        &mut self,
        image_index: usize,
        projection: Mat4,
        view: Mat4,
    ) -> Result<()> {
        if self.uniform_buffers.is_empty() {
            return Ok(());
        }
        let ubo = UniformBufferObject::new(projection, view, self.transform);
        write_uniform_slot(&mut self.uniform_buffers, image_index, &ubo)
    }

    pub(crate) fn check_uniform_slots(&self, image_count: usize) -> Result<()> {
        check_uniform_slots(self.uniform_buffers.len(), image_count)
    }

    pub(crate) fn created(&self) -> CreatedResources {
        CreatedResources {
            vertex_buffer: self.vertex_buffer.is_some(),
            index_buffer: self.index_buffer.is_some(),
            uniform_buffers: !self.uniform_buffers.is_empty(),
            textures: self.textures.len(),
            descriptor_set_layout: self.descriptor_set_layout.is_some(),
            pipeline: self.pipeline.is_some(),
            descriptor_sets: self.descriptor_pool.is_some(),
        }
    }

    /// Fails if `resource` already exists or something it is built from does not.
    pub(crate) fn check_can_create(&self, resource: SurfaceResource) -> Result<()> {
        self.check_create_against(&self.created(), resource)
    }

    fn check_create_against(
        &self,
        created: &CreatedResources,
        resource: SurfaceResource,
    ) -> Result<()> {
        let has_bindings = !self.desc.bindings.is_empty();
        let textures_missing = created.textures < self.declared_textures();
        let uniforms_missing = self.has_uniform() && !created.uniform_buffers;
        match resource {
            SurfaceResource::VertexBuffer if created.vertex_buffer => {
                Err(self.already_created("vertex buffer"))
            }
            SurfaceResource::IndexBuffer if created.index_buffer => {
                Err(self.already_created("index buffer"))
            }
            SurfaceResource::IndexBuffer if !self.mesh().is_indexed() => {
                Err(self.missing("index data"))
            }
            SurfaceResource::UniformBuffers if created.uniform_buffers => {
                Err(self.already_created("uniform buffers"))
            }
            SurfaceResource::UniformBuffers if !self.has_uniform() => {
                Err(self.missing("uniform binding"))
            }
            SurfaceResource::Texture if self.declared_textures() == 0 => {
                Err(self.missing("texture binding"))
            }
            SurfaceResource::Texture if !textures_missing => Err(self.already_created("texture")),
            SurfaceResource::DescriptorSetLayout if created.descriptor_set_layout => {
                Err(self.already_created("descriptor set layout"))
            }
            SurfaceResource::Pipeline if created.pipeline => Err(self.already_created("pipeline")),
            SurfaceResource::Pipeline if !created.vertex_buffer => {
                Err(self.missing("vertex buffer"))
            }
            SurfaceResource::Pipeline if has_bindings && !created.descriptor_set_layout => {
                Err(self.missing("descriptor set layout"))
            }
            SurfaceResource::DescriptorSets if created.descriptor_sets => {
                Err(self.already_created("descriptor sets"))
            }
            SurfaceResource::DescriptorSets if !created.descriptor_set_layout => {
                Err(self.missing("descriptor set layout"))
            }
            SurfaceResource::DescriptorSetLayout | SurfaceResource::DescriptorSets
                if uniforms_missing =>
            {
                Err(self.missing("uniform buffers"))
            }
            SurfaceResource::DescriptorSetLayout | SurfaceResource::DescriptorSets
                if textures_missing =>
            {
                Err(self.missing("textures"))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn descriptor_set(&self, image_index: usize) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(image_index).copied()
    }

    pub(crate) fn already_created(&self, resource: &'static str) -> RendererError {
        RendererError::AlreadyCreated {
            surface: self.desc.name.clone(),
            resource,
        }
    }

    pub(crate) fn missing(&self, resource: &'static str) -> RendererError {
        RendererError::MissingResource {
            surface: self.desc.name.clone(),
            resource,
        }
    }

    pub(crate) fn release_uniform_buffers(&mut self, resource_manager: &ResourceManager) {
        for buffer in self.uniform_buffers.drain(..) {
            resource_manager.destroy_buffer(buffer);
        }
    }

    pub(crate) fn release_pipeline(&mut self, device: &ash::Device) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(device);
        }
    }

    pub(crate) fn release_geometry(&mut self, resource_manager: &ResourceManager) {
        if let Some(buffer) = self.vertex_buffer.take() {
            resource_manager.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            resource_manager.destroy_buffer(buffer);
        }
    }

    pub(crate) fn release_textures(&mut self, resource_manager: &ResourceManager) {
        for texture in self.textures.drain(..) {
            resource_manager.destroy_texture(texture);
        }
    }

    /// Destroys the pool, which frees its sets with it.
    pub(crate) fn release_descriptor_pool(&mut self, device: &ash::Device) {
        self.descriptor_sets.clear();
        if let Some(pool) = self.descriptor_pool.take() {
            trace!("Destroying descriptor pool {:?} of '{}'", pool, self.desc.name);
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }

    pub(crate) fn release_descriptors(&mut self, device: &ash::Device) {
        self.release_descriptor_pool(device);
        if let Some(layout) = self.descriptor_set_layout.take() {
            unsafe { device.destroy_descriptor_set_layout(layout, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{mesh, Camera};

    fn cube_desc() -> SurfaceDesc {
        SurfaceDescBuilder::default()
            .name("cube")
            .mesh(mesh::indexed_cube())
            .bindings(vec![ResourceBinding::mvp()])
            .instance_count(12)
            .build()
            .unwrap()
    }

    #[test]
    fn bindings_follow_declared_resources() {
        assert!(descriptor_bindings(&[]).is_empty());

        let uniform_only = descriptor_bindings(&[ResourceBinding::mvp()]);
        assert_eq!(uniform_only.len(), 1);
        assert_eq!(uniform_only[0].binding, 0);
        assert_eq!(uniform_only[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);

        let texture_only = descriptor_bindings(&[ResourceBinding::Texture]);
        assert_eq!(texture_only.len(), 1);
        assert_eq!(texture_only[0].binding, 0);
        assert_eq!(
            texture_only[0].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn uniform_is_binding_zero_regardless_of_declaration_order() {
        let both = descriptor_bindings(&[ResourceBinding::Texture, ResourceBinding::mvp()]);
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].binding, 0);
        assert_eq!(both[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(both[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(both[1].binding, 1);
        assert_eq!(both[1].descriptor_count, 1);
        assert_eq!(both[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn builder_allows_a_single_texture() {
        let build = |bindings| {
            SurfaceDescBuilder::default()
                .name("textured")
                .mesh(mesh::textured_cube())
                .bindings(bindings)
                .build()
        };
        assert!(build(vec![ResourceBinding::mvp(), ResourceBinding::Texture]).is_ok());
        assert!(build(vec![ResourceBinding::Texture, ResourceBinding::Texture]).is_err());
    }

    #[test]
    fn non_indexed_surface_draws_directly() {
        let surface = RenderSurface::new(
            SurfaceDescBuilder::default()
                .name("triangle")
                .mesh(mesh::triangle())
                .instance_count(2)
                .first_vertex(1)
                .first_instance(3)
                .build()
                .unwrap(),
        );
        assert_eq!(
            surface.draw_call(),
            DrawCall::Direct {
                vertex_count: 3,
                instance_count: 2,
                first_vertex: 1,
                first_instance: 3,
            }
        );
    }

    #[test]
    fn builder_defaults() {
        let desc = SurfaceDescBuilder::default()
            .name("triangle")
            .mesh(mesh::triangle())
            .build()
            .unwrap();
        assert!(desc.bindings.is_empty());
        assert_eq!(desc.instance_count, 1);
        assert_eq!(desc.transform, Mat4::IDENTITY);
        assert_eq!(desc.upload, UploadStrategy::Staged);
        assert_eq!(desc.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(desc.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
    }

    #[test]
    fn builder_rejects_bad_geometry() {
        assert!(SurfaceDescBuilder::default().name("no mesh").build().is_err());

        let mut ragged = mesh::triangle();
        ragged.vertices.pop();
        assert!(SurfaceDescBuilder::default()
            .name("ragged")
            .mesh(ragged)
            .build()
            .is_err());

        let mut bad_index = mesh::indexed_cube();
        bad_index.indices[0] = 8;
        assert!(SurfaceDescBuilder::default()
            .name("bad index")
            .mesh(bad_index)
            .build()
            .is_err());

        assert!(SurfaceDescBuilder::default()
            .name("two uniforms")
            .mesh(mesh::triangle())
            .bindings(vec![ResourceBinding::mvp(), ResourceBinding::mvp()])
            .build()
            .is_err());
    }

    #[test]
    fn uniform_slots_are_written_independently() {
        let mut slots = vec![vec![0u8; 64]; 3];
        let ubo = UniformBufferObject::new(
            Mat4::from_scale(Vec3::splat(2.0)),
            Mat4::IDENTITY,
            Mat4::IDENTITY,
        );

        write_uniform_slot(&mut slots, 1, &ubo).unwrap();

        assert_eq!(slots[1].as_slice(), ubo.as_bytes());
        assert!(slots[0].iter().all(|&b| b == 0));
        assert!(slots[2].iter().all(|&b| b == 0));

        let err = write_uniform_slot(&mut slots, 3, &ubo).unwrap_err();
        assert!(matches!(
            err,
            RendererError::UniformSlotOutOfRange { index: 3, count: 3 }
        ));
    }

    #[test]
    fn undersized_slot_is_an_error() {
        let mut slots = vec![vec![0u8; 16]];
        let ubo = UniformBufferObject::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY);
        assert!(matches!(
            write_uniform_slot(&mut slots, 0, &ubo),
            Err(RendererError::ResourceManager(_))
        ));
    }

    #[test]
    fn cube_scenario() {
        let surface = RenderSurface::new(cube_desc());
        assert_eq!(surface.mesh().vertex_count(), 8);
        assert_eq!(
            surface.draw_call(),
            DrawCall::Indexed {
                index_count: 36,
                instance_count: 1,
                first_index: 0,
                vertex_offset: 0,
                first_instance: 0,
            }
        );
        assert_eq!(surface.layout_bindings().len(), 1);

        let camera = Camera::default();
        let projection = camera.projection(800.0 / 600.0);
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0));
        let image_index = 2;

        let mut slots = vec![vec![0u8; 64]; 3];
        let ubo = UniformBufferObject::new(projection, view, surface.transform());
        write_uniform_slot(&mut slots, image_index, &ubo).unwrap();

        let written: UniformBufferObject = bytemuck::pod_read_unaligned(&slots[image_index]);
        assert!(written.mvp.abs_diff_eq(projection * view * Mat4::IDENTITY, 1e-6));
        assert!(slots[0].iter().chain(&slots[1]).all(|&b| b == 0));
    }

    #[test]
    fn transform_helpers_compose_in_local_space() {
        let mut surface = RenderSurface::new(cube_desc());
        surface.translate(Vec3::new(0.0, 0.0, -10.0));
        surface.rotate_y(90.0);

        let origin = surface.transform().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -10.0), 1e-5));

        let x = surface.transform().transform_vector3(Vec3::X);
        assert!(x.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn fresh_surface_is_not_drawable() {
        let surface = RenderSurface::new(cube_desc());
        assert!(!surface.is_drawable());
        assert!(surface.has_uniform());
        assert_eq!(surface.uniform_size(), Some(64));
        assert_eq!(surface.declared_textures(), 0);
    }

    fn textured_cube_desc() -> SurfaceDesc {
        SurfaceDescBuilder::default()
            .name("crate")
            .mesh(mesh::textured_cube())
            .bindings(vec![ResourceBinding::mvp(), ResourceBinding::Texture])
            .build()
            .unwrap()
    }

    fn already(result: Result<()>) -> &'static str {
        match result {
            Err(RendererError::AlreadyCreated { resource, .. }) => resource,
            other => panic!("expected AlreadyCreated, got {other:?}"),
        }
    }

    fn missing(result: Result<()>) -> &'static str {
        match result {
            Err(RendererError::MissingResource { resource, .. }) => resource,
            other => panic!("expected MissingResource, got {other:?}"),
        }
    }

    #[test]
    fn second_create_is_rejected() {
        let surface = RenderSurface::new(textured_cube_desc());
        let all = CreatedResources {
            vertex_buffer: true,
            index_buffer: true,
            uniform_buffers: true,
            textures: 1,
            descriptor_set_layout: true,
            pipeline: true,
            descriptor_sets: true,
        };
        let check = |resource| surface.check_create_against(&all, resource);

        assert_eq!(already(check(SurfaceResource::VertexBuffer)), "vertex buffer");
        assert_eq!(already(check(SurfaceResource::IndexBuffer)), "index buffer");
        assert_eq!(already(check(SurfaceResource::UniformBuffers)), "uniform buffers");
        assert_eq!(already(check(SurfaceResource::Texture)), "texture");
        assert_eq!(
            already(check(SurfaceResource::DescriptorSetLayout)),
            "descriptor set layout"
        );
        assert_eq!(already(check(SurfaceResource::Pipeline)), "pipeline");
        assert_eq!(already(check(SurfaceResource::DescriptorSets)), "descriptor sets");
    }

    #[test]
    fn fresh_surface_allows_only_leaf_resources() {
        let surface = RenderSurface::new(textured_cube_desc());
        assert_eq!(surface.created(), CreatedResources::default());

        assert!(surface.check_can_create(SurfaceResource::VertexBuffer).is_ok());
        assert!(surface.check_can_create(SurfaceResource::IndexBuffer).is_ok());
        assert!(surface.check_can_create(SurfaceResource::UniformBuffers).is_ok());
        assert!(surface.check_can_create(SurfaceResource::Texture).is_ok());
        assert_eq!(
            missing(surface.check_can_create(SurfaceResource::Pipeline)),
            "vertex buffer"
        );
        assert_eq!(
            missing(surface.check_can_create(SurfaceResource::DescriptorSets)),
            "descriptor set layout"
        );
    }

    #[test]
    fn descriptor_layout_waits_for_uniforms_and_textures() {
        let surface = RenderSurface::new(textured_cube_desc());
        let check = |created: CreatedResources| {
            surface.check_create_against(&created, SurfaceResource::DescriptorSetLayout)
        };

        assert_eq!(missing(check(CreatedResources::default())), "uniform buffers");
        let uniforms = CreatedResources {
            uniform_buffers: true,
            ..Default::default()
        };
        assert_eq!(missing(check(uniforms)), "textures");
        assert!(check(CreatedResources { textures: 1, ..uniforms }).is_ok());
    }

    #[test]
    fn descriptor_sets_need_layout_uniforms_and_textures() {
        let surface = RenderSurface::new(textured_cube_desc());
        let check = |created: CreatedResources| {
            surface.check_create_against(&created, SurfaceResource::DescriptorSets)
        };

        let layout_only = CreatedResources {
            descriptor_set_layout: true,
            ..Default::default()
        };
        assert_eq!(missing(check(layout_only)), "uniform buffers");
        let with_uniforms = CreatedResources {
            uniform_buffers: true,
            ..layout_only
        };
        assert_eq!(missing(check(with_uniforms)), "textures");
        assert!(check(CreatedResources {
            textures: 1,
            ..with_uniforms
        })
        .is_ok());
    }

    #[test]
    fn pipeline_waits_for_vertex_buffer_and_layout() {
        let surface = RenderSurface::new(cube_desc());
        let check = |created: CreatedResources| {
            surface.check_create_against(&created, SurfaceResource::Pipeline)
        };

        let vertices = CreatedResources {
            vertex_buffer: true,
            ..Default::default()
        };
        assert_eq!(missing(check(vertices)), "descriptor set layout");
        assert!(check(CreatedResources {
            descriptor_set_layout: true,
            ..vertices
        })
        .is_ok());

        // no bindings, so no layout to wait for
        let plain = RenderSurface::new(
            SurfaceDescBuilder::default()
                .name("triangle")
                .mesh(mesh::triangle())
                .build()
                .unwrap(),
        );
        assert!(plain.check_create_against(&vertices, SurfaceResource::Pipeline).is_ok());
    }

    #[test]
    fn undeclared_resources_are_missing() {
        let plain = RenderSurface::new(
            SurfaceDescBuilder::default()
                .name("triangle")
                .mesh(mesh::triangle())
                .build()
                .unwrap(),
        );
        assert_eq!(
            missing(plain.check_can_create(SurfaceResource::IndexBuffer)),
            "index data"
        );
        assert_eq!(
            missing(plain.check_can_create(SurfaceResource::UniformBuffers)),
            "uniform binding"
        );
        assert_eq!(
            missing(plain.check_can_create(SurfaceResource::Texture)),
            "texture binding"
        );
    }

    #[test]
    fn uniform_slots_must_cover_every_image() {
        assert!(check_uniform_slots(0, 3).is_ok());
        assert!(check_uniform_slots(3, 3).is_ok());
        assert!(matches!(
            check_uniform_slots(2, 3),
            Err(RendererError::UniformSlotOutOfRange { index: 2, count: 2 })
        ));
        assert!(RenderSurface::new(cube_desc()).check_uniform_slots(3).is_ok());
    }
}
