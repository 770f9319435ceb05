use std::path::{Path, PathBuf};

use ash::vk;
use shared::VertexLayout;
use tracing::{debug, error, trace};

use crate::error::{RendererError, Result};

/// A surface's graphics pipeline with the layout and cache it was built from.
#[derive(Debug)]
pub struct SurfacePipeline {
    pub layout: vk::PipelineLayout,
    pub cache: vk::PipelineCache,
    pub pipeline: vk::Pipeline,
    /// Shader files the pipeline was built from, reused when it is rebuilt.
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl SurfacePipeline {
    pub(crate) fn destroy(self, device: &ash::Device) {
        trace!("Destroying pipeline {:?}", self.pipeline);
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_cache(self.cache, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Inputs for [`create_graphics_pipeline`].
pub(crate) struct PipelineDesc<'a> {
    pub name: &'a str,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub vertex_layout: &'a VertexLayout,
    pub set_layout: Option<vk::DescriptorSetLayout>,
    pub render_pass: vk::RenderPass,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

/// Reinterprets SPIR-V bytes as words, rejecting empty or truncated code.
pub fn spirv_words(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        error!(
            "Shader code size ({}) of '{}' is not a non-zero multiple of 4 bytes!",
            bytes.len(),
            path.display()
        );
        return Err(RendererError::InvalidShader {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }
    let mut words = vec![0u32; bytes.len() / 4];
    bytemuck::cast_slice_mut::<u32, u8>(&mut words).copy_from_slice(bytes);
    Ok(words)
}

pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| RendererError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    spirv_words(path, &bytes)
}

fn create_shader_module(device: &ash::Device, path: &Path) -> Result<vk::ShaderModule> {
    let code = load_spirv(path)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe {
        device.create_shader_module(&create_info, None).map_err(|e| {
            error!("Failed to create shader module from '{}': {:?}", path.display(), e);
            RendererError::ShaderCreation(e)
        })
    }
}

/// Builds a pipeline for one surface: triangle lists, dynamic viewport and scissor,
/// no blending, one descriptor set at most.
pub(crate) fn create_graphics_pipeline(
    device: &ash::Device,
    desc: &PipelineDesc<'_>,
) -> Result<SurfacePipeline> {
    let vert_module = create_shader_module(device, &desc.vertex_shader)?;
    let frag_module = match create_shader_module(device, &desc.fragment_shader) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vert_module, None) };
            return Err(e);
        }
    };

    let result = build_pipeline(device, desc, vert_module, frag_module);

    unsafe {
        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);
    }
    result
}

fn build_pipeline(
    device: &ash::Device,
    desc: &PipelineDesc<'_>,
    vert_module: vk::ShaderModule,
    frag_module: vk::ShaderModule,
) -> Result<SurfacePipeline> {
    let main_function_name = c"main";

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(main_function_name),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(main_function_name),
    ];

    let binding_description = desc.vertex_layout.binding_description();
    let attribute_descriptions = desc.vertex_layout.attribute_descriptions();

    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(std::slice::from_ref(&binding_description))
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(desc.cull_mode)
        .front_face(desc.front_face)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false);

    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(std::slice::from_ref(&color_blend_attachment));

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let set_layouts: Vec<vk::DescriptorSetLayout> = desc.set_layout.into_iter().collect();
    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    let layout = unsafe {
        device
            .create_pipeline_layout(&layout_info, None)
            .map_err(RendererError::PipelineLayoutCreation)?
    };

    let cache = match unsafe {
        device.create_pipeline_cache(&vk::PipelineCacheCreateInfo::default(), None)
    } {
        Ok(cache) => cache,
        Err(e) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(e.into());
        }
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(desc.render_pass)
        .subpass(0);

    let pipeline = match unsafe { device.create_graphics_pipelines(cache, &[pipeline_info], None) }
    {
        Ok(pipelines) => pipelines[0],
        Err((_, e)) => {
            unsafe {
                device.destroy_pipeline_cache(cache, None);
                device.destroy_pipeline_layout(layout, None);
            }
            return Err(RendererError::PipelineCreation(e));
        }
    };

    debug!(
        "Created pipeline for '{}' (stride {}, {} attribute(s), descriptor set: {}).",
        desc.name,
        desc.vertex_layout.stride(),
        attribute_descriptions.len(),
        desc.set_layout.is_some()
    );
    Ok(SurfacePipeline {
        layout,
        cache,
        pipeline,
        vertex_shader: desc.vertex_shader.clone(),
        fragment_shader: desc.fragment_shader.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spirv_words_keep_byte_order() {
        let magic = 0x0723_0203u32.to_ne_bytes();
        let mut bytes = magic.to_vec();
        bytes.extend_from_slice(&1u32.to_ne_bytes());
        let words = spirv_words(Path::new("tri.vert.spv"), &bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 1]);
    }

    #[test]
    fn truncated_or_empty_spirv_is_rejected() {
        for len in [0usize, 3, 6] {
            let err = spirv_words(Path::new("bad.spv"), &vec![0; len]).unwrap_err();
            assert!(
                matches!(err, RendererError::InvalidShader { len: l, .. } if l == len),
                "length {len}"
            );
        }
    }

    #[test]
    fn missing_shader_file_reports_path() {
        let path = Path::new("definitely/not/here.spv");
        match load_spirv(path).unwrap_err() {
            RendererError::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
