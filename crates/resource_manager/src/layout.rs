use ash::vk;

/// Access mask and pipeline stage on one side of an image layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutAccess {
    pub access: vk::AccessFlags,
    pub stage: vk::PipelineStageFlags,
}

/// What has to be finished before an image can leave `layout`.
pub fn source_access(layout: vk::ImageLayout) -> LayoutAccess {
    let (access, stage) = match layout {
        vk::ImageLayout::UNDEFINED => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
        vk::ImageLayout::PREINITIALIZED => {
            (vk::AccessFlags::HOST_WRITE, vk::PipelineStageFlags::HOST)
        }
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
        other => {
            tracing::warn!("No source access mapping for layout {:?}", other);
            (
                vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
            )
        }
    };
    LayoutAccess { access, stage }
}

/// What has to wait before an image in `layout` can be used.
pub fn destination_access(layout: vk::ImageLayout) -> LayoutAccess {
    let (access, stage) = match layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (
            vk::AccessFlags::MEMORY_READ,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
        other => {
            tracing::warn!("No destination access mapping for layout {:?}", other);
            (
                vk::AccessFlags::MEMORY_READ,
                vk::PipelineStageFlags::ALL_COMMANDS,
            )
        }
    };
    LayoutAccess { access, stage }
}

/// Records a pipeline barrier moving `range` of `image` from `old_layout` to `new_layout`.
///
/// # Safety
/// `command_buffer` must be in the recording state and belong to `device`.
pub unsafe fn record_layout_transition(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
) {
    let src = source_access(old_layout);
    let dst = destination_access(new_layout);
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src.access)
        .dst_access_mask(dst.access);

    device.cmd_pipeline_barrier(
        command_buffer,
        src.stage,
        dst.stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

/// Color subresource range covering `mip_levels` levels of a single layer.
pub fn color_range(mip_levels: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: mip_levels,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transitions() {
        let pre_copy_src = source_access(vk::ImageLayout::UNDEFINED);
        let pre_copy_dst = destination_access(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(pre_copy_src.access, vk::AccessFlags::empty());
        assert_eq!(pre_copy_dst.access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(pre_copy_dst.stage, vk::PipelineStageFlags::TRANSFER);

        let post_copy_src = source_access(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let post_copy_dst = destination_access(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(post_copy_src.access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(post_copy_dst.access, vk::AccessFlags::SHADER_READ);
        assert_eq!(post_copy_dst.stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn present_round_trip() {
        let to_color = destination_access(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(to_color.access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(
            to_color.stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );

        let to_present = destination_access(vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(to_present.access, vk::AccessFlags::MEMORY_READ);
    }
}
