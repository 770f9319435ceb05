use ash::vk;
use tracing::{debug, trace, warn};

use crate::{
    error::{RendererError, Result},
    pipeline::SurfacePipeline,
    surface::{DrawCall, RenderSurface},
};

/// One color attachment, cleared on load and left ready for presentation.
///
/// The attachment enters in `COLOR_ATTACHMENT_OPTIMAL`; recorded commands move the
/// swapchain image there with an explicit barrier first.
pub(crate) fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_reference = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_reference));

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(std::slice::from_ref(&color_attachment))
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    let render_pass = unsafe { device.create_render_pass(&create_info, None)? };
    debug!("Created render pass {:?} for format {:?}", render_pass, format);
    Ok(render_pass)
}

/// One framebuffer per swapchain image view.
pub(crate) fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for view in image_views {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(std::slice::from_ref(view))
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        match unsafe { device.create_framebuffer(&create_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                destroy_framebuffers(device, &mut framebuffers);
                return Err(e.into());
            }
        }
    }
    trace!(
        "Created {} framebuffers ({}x{})",
        framebuffers.len(),
        extent.width,
        extent.height
    );
    Ok(framebuffers)
}

pub(crate) fn destroy_framebuffers(
    device: &ash::Device,
    framebuffers: &mut Vec<vk::Framebuffer>,
) {
    for framebuffer in framebuffers.drain(..) {
        unsafe { device.destroy_framebuffer(framebuffer, None) };
    }
}

pub(crate) fn allocate_command_buffers(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    count: usize,
) -> Result<Vec<vk::CommandBuffer>> {
    let allocate_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);
    unsafe {
        device
            .allocate_command_buffers(&allocate_info)
            .map_err(RendererError::CommandBufferAllocation)
    }
}

/// Render-pass-wide parameters shared by every recorded image.
pub(crate) struct PassInfo {
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// What one swapchain image's command buffer renders into.
pub(crate) struct FrameTarget {
    pub image_index: usize,
    pub command_buffer: vk::CommandBuffer,
    pub framebuffer: vk::Framebuffer,
    pub image: vk::Image,
}

/// Records the whole frame for one swapchain image, drawing `surfaces` in order.
///
/// Surfaces missing a pipeline or buffers are skipped with a warning.
pub(crate) fn record_frame<'a>(
    device: &ash::Device,
    pass: &PassInfo,
    target: &FrameTarget,
    surfaces: impl IntoIterator<Item = &'a RenderSurface>,
) -> Result<()> {
    let cmd = target.command_buffer;
    unsafe {
        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())?;

        // Contents are cleared anyway, so the previous layout can be discarded.
        let to_attachment = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(target.image)
            .subresource_range(resource_manager::layout::color_range(1))
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_attachment],
        );

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: pass.clear_color,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: pass.extent,
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(pass.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: pass.extent.width as f32,
            height: pass.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[render_area]);

        for surface in surfaces {
            record_surface(device, cmd, target.image_index, surface);
        }

        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd)?;
    }
    Ok(())
}

/// One command recorded for a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SurfaceCommand {
    BindPipeline(vk::Pipeline),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer, vk::IndexType),
    BindDescriptorSet {
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    },
    Draw(DrawCall),
}

/// The bind and draw sequence for a surface whose resources exist.
pub(crate) fn plan_surface(
    pipeline: &SurfacePipeline,
    vertex_buffer: vk::Buffer,
    index_buffer: Option<vk::Buffer>,
    descriptor_set: Option<vk::DescriptorSet>,
    draw: DrawCall,
) -> Vec<SurfaceCommand> {
    let mut commands = vec![
        SurfaceCommand::BindPipeline(pipeline.pipeline),
        SurfaceCommand::BindVertexBuffer(vertex_buffer),
    ];
    if let Some(buffer) = index_buffer {
        commands.push(SurfaceCommand::BindIndexBuffer(buffer, vk::IndexType::UINT16));
    }
    if let Some(set) = descriptor_set {
        commands.push(SurfaceCommand::BindDescriptorSet {
            layout: pipeline.layout,
            set,
        });
    }
    commands.push(SurfaceCommand::Draw(draw));
    commands
}

unsafe fn record_surface(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image_index: usize,
    surface: &RenderSurface,
) {
    let (Some(pipeline), Some(vertex_buffer)) = (&surface.pipeline, &surface.vertex_buffer)
    else {
        warn!("Surface '{}' has no pipeline or vertex buffer, skipped.", surface.name());
        return;
    };
    if !surface.is_drawable() {
        warn!("Surface '{}' is missing resources, skipped.", surface.name());
        return;
    }

    let commands = plan_surface(
        pipeline,
        vertex_buffer.handle(),
        surface.index_buffer.as_ref().map(|buffer| buffer.handle()),
        surface.descriptor_set(image_index),
        surface.draw_call(),
    );
    for command in commands {
        match command {
            SurfaceCommand::BindPipeline(pipeline) => {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
            }
            SurfaceCommand::BindVertexBuffer(buffer) => {
                device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0])
            }
            SurfaceCommand::BindIndexBuffer(buffer, index_type) => {
                device.cmd_bind_index_buffer(cmd, buffer, 0, index_type)
            }
            SurfaceCommand::BindDescriptorSet { layout, set } => device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            ),
            SurfaceCommand::Draw(DrawCall::Indexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            }) => device.cmd_draw_indexed(
                cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            ),
            SurfaceCommand::Draw(DrawCall::Direct {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            }) => device.cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::path::PathBuf;

    fn pipeline() -> SurfacePipeline {
        SurfacePipeline {
            layout: vk::PipelineLayout::from_raw(2),
            cache: vk::PipelineCache::from_raw(3),
            pipeline: vk::Pipeline::from_raw(1),
            vertex_shader: PathBuf::from("cube.vert.spv"),
            fragment_shader: PathBuf::from("cube.frag.spv"),
        }
    }

    #[test]
    fn vertex_only_surface_binds_pipeline_and_vertices() {
        let draw = DrawCall::Direct {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        };
        let vertices = vk::Buffer::from_raw(10);
        assert_eq!(
            plan_surface(&pipeline(), vertices, None, None, draw),
            vec![
                SurfaceCommand::BindPipeline(vk::Pipeline::from_raw(1)),
                SurfaceCommand::BindVertexBuffer(vertices),
                SurfaceCommand::Draw(draw),
            ]
        );
    }

    #[test]
    fn indexed_surface_binds_u16_indices_then_its_set() {
        let draw = DrawCall::Indexed {
            index_count: 36,
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        };
        let vertices = vk::Buffer::from_raw(10);
        let indices = vk::Buffer::from_raw(11);
        let set = vk::DescriptorSet::from_raw(20);

        let commands = plan_surface(&pipeline(), vertices, Some(indices), Some(set), draw);
        assert_eq!(
            commands,
            vec![
                SurfaceCommand::BindPipeline(vk::Pipeline::from_raw(1)),
                SurfaceCommand::BindVertexBuffer(vertices),
                SurfaceCommand::BindIndexBuffer(indices, vk::IndexType::UINT16),
                SurfaceCommand::BindDescriptorSet {
                    layout: vk::PipelineLayout::from_raw(2),
                    set,
                },
                SurfaceCommand::Draw(draw),
            ]
        );
    }

    #[test]
    fn descriptor_set_is_bound_only_when_present() {
        let draw = DrawCall::Direct {
            vertex_count: 6,
            instance_count: 2,
            first_vertex: 0,
            first_instance: 0,
        };
        let with_set = plan_surface(
            &pipeline(),
            vk::Buffer::from_raw(10),
            None,
            Some(vk::DescriptorSet::from_raw(20)),
            draw,
        );
        assert_eq!(with_set.len(), 4);
        assert!(matches!(with_set[2], SurfaceCommand::BindDescriptorSet { .. }));
        assert_eq!(with_set.last(), Some(&SurfaceCommand::Draw(draw)));

        let without = plan_surface(&pipeline(), vk::Buffer::from_raw(10), None, None, draw);
        assert!(!without
            .iter()
            .any(|c| matches!(c, SurfaceCommand::BindDescriptorSet { .. })));
    }
}
