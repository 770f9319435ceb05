use std::path::Path;

use ash::vk;
use clap::ValueEnum;
use glam::{Mat4, Vec3};
use renderer::{ResourceBinding, SurfaceDescBuilder, SurfaceHandle, VulkanRenderer};
use resource_manager::{TextureData, UploadStrategy};
use shared::{mesh, Component, Material, Object};
use tracing::{info, warn};

use crate::{app::AppError, Args};

const ROTATION_DEGREES_PER_FRAME: f32 = 3.0;
const CRATE_TEXTURE: &str = "textures/crate01_color_height_rgba.ktx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Sample {
    /// A single red triangle, no bound resources
    Triangle,
    /// An indexed cube with a per-image MVP uniform
    Cube,
    /// A spinning cube spawned from tagged components
    Projection,
    /// A spinning cube sampling a KTX texture
    Texture,
    /// A glTF model with its first embedded image
    Gltf,
}

impl Sample {
    pub fn title(self) -> &'static str {
        match self {
            Sample::Triangle => "Triangle",
            Sample::Cube => "Indexed Cube",
            Sample::Projection => "Projection",
            Sample::Texture => "Texture Mapping",
            Sample::Gltf => "glTF Model",
        }
    }

    /// Declares the sample's surfaces and creates all of their GPU resources.
    pub fn setup(
        self,
        renderer: &mut VulkanRenderer,
        args: &Args,
    ) -> Result<SampleScene, AppError> {
        let spinning = match self {
            Sample::Triangle => {
                triangle(renderer)?;
                Vec::new()
            }
            Sample::Cube => {
                cube(renderer)?;
                Vec::new()
            }
            Sample::Projection => vec![projection(renderer)?],
            Sample::Texture => vec![textured_cube(renderer, &args.assets)?],
            Sample::Gltf => gltf_model(renderer, &args.assets.join(&args.model))?,
        };
        Ok(SampleScene {
            sample: self,
            spinning,
        })
    }
}

/// Per-frame state of a running sample.
pub struct SampleScene {
    sample: Sample,
    spinning: Vec<SurfaceHandle>,
}

impl SampleScene {
    pub fn sample(&self) -> Sample {
        self.sample
    }

    pub fn update(&self, renderer: &mut VulkanRenderer) {
        for &handle in &self.spinning {
            if let Some(surface) = renderer.surface_mut(handle) {
                surface.rotate_y(ROTATION_DEGREES_PER_FRAME);
            }
        }
    }
}

fn triangle(renderer: &mut VulkanRenderer) -> Result<SurfaceHandle, AppError> {
    let desc = SurfaceDescBuilder::default()
        .name("triangle")
        .mesh(mesh::triangle())
        .upload(UploadStrategy::HostVisible)
        .cull_mode(vk::CullModeFlags::NONE)
        .build()?;
    let handle = renderer.create_surface(desc)?;

    renderer.create_vertex_buffer(handle)?;
    renderer.create_descriptor_set_layout(handle)?;
    renderer.create_graphics_pipeline(handle, "shaders/tri.vert.spv", "shaders/tri.frag.spv")?;
    Ok(handle)
}

fn cube(renderer: &mut VulkanRenderer) -> Result<SurfaceHandle, AppError> {
    let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -6.0))
        * Mat4::from_rotation_x(25f32.to_radians())
        * Mat4::from_rotation_y(35f32.to_radians());
    let desc = SurfaceDescBuilder::default()
        .name("indexed cube")
        .mesh(mesh::indexed_cube())
        .bindings(vec![ResourceBinding::mvp()])
        .transform(transform)
        .instance_count(12)
        .build()?;
    let handle = renderer.create_surface(desc)?;

    renderer.create_vertex_buffer(handle)?;
    renderer.create_index_buffer(handle)?;
    renderer.create_uniform_buffer(handle)?;
    renderer.create_descriptor_set_layout(handle)?;
    renderer.create_graphics_pipeline(
        handle,
        "shaders/uniform.vert.spv",
        "shaders/uniform.frag.spv",
    )?;
    renderer.create_descriptor_set(handle)?;
    Ok(handle)
}

fn projection(renderer: &mut VulkanRenderer) -> Result<SurfaceHandle, AppError> {
    let object = Object::new("projected cube")
        .with_component(Component::Geometry(mesh::indexed_cube()))
        .with_component(Component::Transform(Mat4::from_translation(Vec3::new(
            0.0, 0.0, -10.0,
        ))))
        .with_component(Component::Material(Material::new(
            "shaders/uniform.vert.spv",
            "shaders/uniform.frag.spv",
        )));
    Ok(renderer.spawn_object(&object)?)
}

fn textured_cube(
    renderer: &mut VulkanRenderer,
    assets: &Path,
) -> Result<SurfaceHandle, AppError> {
    let desc = SurfaceDescBuilder::default()
        .name("textured cube")
        .mesh(mesh::textured_cube())
        .bindings(vec![ResourceBinding::mvp(), ResourceBinding::Texture])
        .transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -15.0)))
        .build()?;
    let handle = renderer.create_surface(desc)?;

    renderer.create_vertex_buffer(handle)?;
    renderer.create_index_buffer(handle)?;
    renderer.create_uniform_buffer(handle)?;
    renderer.create_texture_from_file(handle, assets.join(CRATE_TEXTURE))?;
    renderer.create_descriptor_set_layout(handle)?;
    renderer.create_graphics_pipeline(
        handle,
        "shaders/texture.vert.spv",
        "shaders/texture.frag.spv",
    )?;
    renderer.create_descriptor_set(handle)?;
    Ok(handle)
}

/// One surface per mesh primitive, all sampling the model's first image.
fn gltf_model(
    renderer: &mut VulkanRenderer,
    path: &Path,
) -> Result<Vec<SurfaceHandle>, AppError> {
    let model = scene::load_model(path)?;
    let image = match &model.image {
        Some(image) => image.clone(),
        None => {
            warn!("Model '{}' has no images, using a white texture.", model.name);
            TextureData::from_rgba8(1, 1, vec![u8::MAX; 4])?
        }
    };
    let placement = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));

    let mut handles = Vec::with_capacity(model.meshes.len());
    for model_mesh in &model.meshes {
        let desc = SurfaceDescBuilder::default()
            .name(model_mesh.name.as_str())
            .mesh(model_mesh.mesh.clone())
            .bindings(vec![ResourceBinding::mvp(), ResourceBinding::Texture])
            .transform(placement * model_mesh.transform)
            .instance_count(model_mesh.triangle_count())
            .build()?;
        let handle = renderer.create_surface(desc)?;

        renderer.create_vertex_buffer(handle)?;
        if model_mesh.mesh.is_indexed() {
            renderer.create_index_buffer(handle)?;
        }
        renderer.create_uniform_buffer(handle)?;
        renderer.create_texture_from_data(handle, &image, &model.sampler)?;
        renderer.create_descriptor_set_layout(handle)?;
        renderer.create_graphics_pipeline(
            handle,
            "shaders/model.vert.spv",
            "shaders/model.frag.spv",
        )?;
        renderer.create_descriptor_set(handle)?;
        handles.push(handle);
    }

    info!("Model '{}' loaded as {} surface(s).", model.name, handles.len());
    Ok(handles)
}
