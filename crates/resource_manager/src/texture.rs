use ash::vk;
use gpu_allocator::vulkan::Allocation;

use crate::error::{ResourceManagerError, Result};

/// Location of one mip level inside [`TextureData::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    pub offset: usize,
    pub size: usize,
    pub width: u32,
    pub height: u32,
}

/// A decoded 2D image (all mip levels) waiting to be uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub mip_levels: Vec<MipLevel>,
    pub data: Vec<u8>,
}

impl TextureData {
    /// Wraps a tightly packed single-level RGBA8 image.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(ResourceManagerError::EmptyData(format!(
                "RGBA8 image {}x{} with {} bytes",
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format: vk::Format::R8G8B8A8_UNORM,
            mip_levels: vec![MipLevel {
                offset: 0,
                size: expected,
                width,
                height,
            }],
            data: pixels,
        })
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mip_levels.len() as u32
    }

    /// One buffer-to-image copy region per mip level, reading from the level's
    /// offset inside the staging buffer.
    pub fn copy_regions(&self) -> Vec<vk::BufferImageCopy> {
        self.mip_levels
            .iter()
            .enumerate()
            .map(|(level, mip)| {
                vk::BufferImageCopy::default()
                    .buffer_offset(mip.offset as vk::DeviceSize)
                    .buffer_row_length(0)
                    .buffer_image_height(0)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: level as u32,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_offset(vk::Offset3D::default())
                    .image_extent(vk::Extent3D {
                        width: mip.width,
                        height: mip.height,
                        depth: 1,
                    })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
        }
    }
}

/// A sampled image: image, memory, view and sampler.
///
/// Released with [`crate::ResourceManager::destroy_texture`], which consumes it.
#[derive(Debug)]
pub struct Texture {
    pub(crate) image: vk::Image,
    pub(crate) allocation: Allocation,
    pub(crate) view: vk::ImageView,
    pub(crate) sampler: vk::Sampler,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) mip_levels: u32,
    pub(crate) format: vk::Format,
}

impl Texture {
    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Descriptor info for a combined image sampler in shader-read layout.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(self.view)
            .sampler(self.sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_regions_follow_mip_offsets() {
        let texture = TextureData {
            width: 4,
            height: 4,
            format: vk::Format::R8G8B8A8_UNORM,
            mip_levels: vec![
                MipLevel {
                    offset: 0,
                    size: 64,
                    width: 4,
                    height: 4,
                },
                MipLevel {
                    offset: 64,
                    size: 16,
                    width: 2,
                    height: 2,
                },
                MipLevel {
                    offset: 80,
                    size: 4,
                    width: 1,
                    height: 1,
                },
            ],
            data: vec![0; 84],
        };

        let regions = texture.copy_regions();
        assert_eq!(regions.len(), 3);
        assert_eq!(
            regions.iter().map(|r| r.buffer_offset).collect::<Vec<_>>(),
            vec![0, 64, 80]
        );
        assert_eq!(
            regions
                .iter()
                .map(|r| r.image_subresource.mip_level)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(regions[1].image_extent.width, 2);
        assert_eq!(regions[2].image_extent.height, 1);
    }

    #[test]
    fn rgba8_requires_exact_size() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(TextureData::from_rgba8(2, 2, vec![0; 12]).is_err());
        assert!(TextureData::from_rgba8(0, 0, Vec::new()).is_err());
    }
}
