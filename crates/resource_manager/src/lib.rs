mod buffer;
mod error;
pub mod ktx;
pub mod layout;
mod texture;

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use ash::vk;
use gfx_hal::{device::Device, queue::Queue, Fence};
use tracing::{debug, error, trace};

pub use buffer::{GpuBuffer, MappedMemory, UploadStrategy};
pub use error::{ResourceManagerError, Result};
pub use texture::{MipLevel, SamplerDesc, Texture, TextureData};

use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc},
    MemoryLocation,
};

/// Command pool and fence used for blocking one-shot uploads.
struct TransferSetup {
    command_pool: vk::CommandPool,
    fence: Fence,
}

/// Creates and destroys GPU buffers and textures.
///
/// Uploads go through the graphics queue and block until the copy has finished.
pub struct ResourceManager {
    allocator: Mutex<Allocator>,
    transfer_setup: Mutex<TransferSetup>,
    queue: Arc<Queue>,
    device: Arc<Device>,
}

impl ResourceManager {
    /// Creates a new ResourceManager submitting its transfers to `queue`.
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Result<Self> {
        debug!("Initializing ResourceManager...");
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: device.instance().ash_instance().clone(),
            device: device.raw().clone(),
            physical_device: device.physical_device_handle(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        debug!("GPU Allocator created.");

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue.family_index());
        let command_pool = unsafe { device.raw().create_command_pool(&pool_info, None)? };
        let fence = Fence::new(device.clone(), false)?;

        Ok(Self {
            allocator: Mutex::new(allocator),
            transfer_setup: Mutex::new(TransferSetup {
                command_pool,
                fence,
            }),
            queue,
            device,
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Records commands with `record_fn` into a temporary command buffer, submits it
    /// and waits for completion.
    pub fn submit_one_shot<F>(&self, record_fn: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let setup = self.transfer_setup.lock()?;
        let device_raw = self.device.raw();

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(setup.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device_raw.allocate_command_buffers(&alloc_info)?[0] };
        trace!("Allocated temporary command buffer for transfer.");

        let result = (|| -> Result<()> {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { device_raw.begin_command_buffer(command_buffer, &begin_info)? };

            let record_result = record_fn(device_raw, command_buffer);
            // End the buffer even if recording failed so it can be freed.
            unsafe { device_raw.end_command_buffer(command_buffer)? };
            record_result?;

            let submits =
                [vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&command_buffer))];
            unsafe { self.queue.submit(&submits, Some(&setup.fence))? };
            setup.fence.wait(None)?;
            setup.fence.reset()?;
            trace!("Transfer command buffer finished.");
            Ok(())
        })();

        unsafe { device_raw.free_command_buffers(setup.command_pool, &[command_buffer]) };
        result
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let allocation = self.allocator.lock()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    fn free(&self, allocation: Allocation) {
        match self.allocator.lock() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free allocation: {}", e);
                }
            }
            Err(e) => error!("Allocator mutex poisoned while freeing: {}", e),
        }
    }

    /// Creates a buffer and binds freshly allocated memory to it.
    ///
    /// `MemoryLocation::CpuToGpu` buffers come back persistently mapped.
    pub fn create_buffer(
        &self,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<GpuBuffer> {
        if size == 0 {
            return Err(ResourceManagerError::EmptyData(name.to_string()));
        }
        trace!(
            "Creating buffer '{}': size={}, usage={:?}, location={:?}",
            name,
            size,
            usage,
            location
        );
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.raw().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.raw().get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.raw().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .raw()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            self.free(allocation);
            unsafe { self.device.raw().destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        debug!("Buffer '{}' created ({} bytes).", name, size);
        Ok(GpuBuffer {
            buffer,
            allocation,
            size,
            usage,
        })
    }

    /// Creates a buffer holding `data`.
    ///
    /// With [`UploadStrategy::Staged`] the bytes go through a temporary staging buffer into
    /// device-local memory; with [`UploadStrategy::HostVisible`] they are written straight
    /// into a mapped buffer which stays mapped.
    pub fn create_buffer_with_data(
        &self,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[u8],
        strategy: UploadStrategy,
    ) -> Result<GpuBuffer> {
        if data.is_empty() {
            return Err(ResourceManagerError::EmptyData(name.to_string()));
        }
        let size = data.len() as vk::DeviceSize;

        match strategy {
            UploadStrategy::HostVisible => {
                let mut buffer = self.create_buffer(name, size, usage, MemoryLocation::CpuToGpu)?;
                if let Err(e) = buffer.write_bytes(0, data) {
                    self.destroy_buffer(buffer);
                    return Err(e);
                }
                Ok(buffer)
            }
            UploadStrategy::Staged => {
                let mut staging = self.create_buffer(
                    &format!("{name} (staging)"),
                    size,
                    vk::BufferUsageFlags::TRANSFER_SRC,
                    MemoryLocation::CpuToGpu,
                )?;
                if let Err(e) = staging.write_bytes(0, data) {
                    self.destroy_buffer(staging);
                    return Err(e);
                }

                let destination = match self.create_buffer(
                    name,
                    size,
                    usage | vk::BufferUsageFlags::TRANSFER_DST,
                    MemoryLocation::GpuOnly,
                ) {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        self.destroy_buffer(staging);
                        return Err(e);
                    }
                };

                let copied = self.submit_one_shot(|device, cmd| {
                    let region = vk::BufferCopy::default().size(size);
                    let (src, dst) = (staging.handle(), destination.handle());
                    unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
                    Ok(())
                });
                self.destroy_buffer(staging);

                match copied {
                    Ok(()) => {
                        debug!("Uploaded {} bytes into '{}' via staging.", size, name);
                        Ok(destination)
                    }
                    Err(e) => {
                        self.destroy_buffer(destination);
                        Err(e)
                    }
                }
            }
        }
    }

    pub fn destroy_buffer(&self, buffer: GpuBuffer) {
        trace!("Destroying buffer {:?}", buffer.buffer);
        unsafe { self.device.raw().destroy_buffer(buffer.buffer, None) };
        self.free(buffer.allocation);
    }

    /// Loads a `.ktx` file from disk and uploads it with [`Self::create_texture`].
    pub fn load_texture(&self, path: &Path, sampler: &SamplerDesc) -> Result<Texture> {
        let data = ktx::load_texture_file(path)?;
        self.create_texture(&path.display().to_string(), &data, sampler)
    }

    /// Uploads all mip levels of `data` into an optimal-tiling image and leaves it in
    /// `SHADER_READ_ONLY_OPTIMAL`, then creates a view and a sampler for it.
    pub fn create_texture(
        &self,
        name: &str,
        data: &TextureData,
        sampler_desc: &SamplerDesc,
    ) -> Result<Texture> {
        if data.data.is_empty() || data.mip_levels.is_empty() {
            return Err(ResourceManagerError::EmptyData(name.to_string()));
        }
        let mip_levels = data.mip_level_count();
        let device = self.device.raw();

        let mut staging = self.create_buffer(
            &format!("{name} (staging)"),
            data.data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        if let Err(e) = staging.write_bytes(0, &data.data) {
            self.destroy_buffer(staging);
            return Err(e);
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(data.format)
            .extent(vk::Extent3D {
                width: data.width,
                height: data.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = match unsafe { device.create_image(&image_info, None) } {
            Ok(image) => image,
            Err(e) => {
                self.destroy_buffer(staging);
                return Err(e.into());
            }
        };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let uploaded = self
            .allocate(name, requirements, MemoryLocation::GpuOnly, false)
            .and_then(|allocation| {
                let bound = unsafe {
                    device.bind_image_memory(image, allocation.memory(), allocation.offset())
                };
                match bound {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        self.free(allocation);
                        Err(e.into())
                    }
                }
            })
            .and_then(|allocation| {
                let regions = data.copy_regions();
                let range = layout::color_range(mip_levels);
                let copied = self.submit_one_shot(|device, cmd| {
                    unsafe {
                        layout::record_layout_transition(
                            device,
                            cmd,
                            image,
                            vk::ImageLayout::UNDEFINED,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            range,
                        );
                        device.cmd_copy_buffer_to_image(
                            cmd,
                            staging.handle(),
                            image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &regions,
                        );
                        layout::record_layout_transition(
                            device,
                            cmd,
                            image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                            range,
                        );
                    }
                    Ok(())
                });
                match copied {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        self.free(allocation);
                        Err(e)
                    }
                }
            });
        self.destroy_buffer(staging);

        let allocation = match uploaded {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(data.format)
            .subresource_range(layout::color_range(mip_levels));
        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                self.free(allocation);
                return Err(e.into());
            }
        };

        let sampler = match self.create_sampler(sampler_desc, mip_levels) {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe {
                    device.destroy_image_view(view, None);
                    device.destroy_image(image, None);
                }
                self.free(allocation);
                return Err(e);
            }
        };

        debug!(
            "Texture '{}' created: {}x{} {:?}, {} mip level(s).",
            name, data.width, data.height, data.format, mip_levels
        );
        Ok(Texture {
            image,
            allocation,
            view,
            sampler,
            width: data.width,
            height: data.height,
            mip_levels,
            format: data.format,
        })
    }

    fn create_sampler(&self, desc: &SamplerDesc, mip_levels: u32) -> Result<vk::Sampler> {
        let anisotropy = self.device.sampler_anisotropy();
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .mip_lod_bias(0.0)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(mip_levels as f32)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false);
        let sampler = unsafe { self.device.raw().create_sampler(&sampler_info, None)? };
        trace!("Created sampler {:?} (anisotropy {:?}).", sampler, anisotropy);
        Ok(sampler)
    }

    pub fn destroy_texture(&self, texture: Texture) {
        trace!("Destroying texture image {:?}", texture.image);
        unsafe {
            let device = self.device.raw();
            device.destroy_sampler(texture.sampler, None);
            device.destroy_image_view(texture.view, None);
            device.destroy_image(texture.image, None);
        }
        self.free(texture.allocation);
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        debug!("Destroying ResourceManager...");
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during ResourceManager drop: {}", e);
        }
        match self.transfer_setup.lock() {
            Ok(setup) => unsafe {
                self.device
                    .raw()
                    .destroy_command_pool(setup.command_pool, None);
            },
            Err(e) => error!("Transfer setup mutex poisoned during drop: {}", e),
        }
        debug!("ResourceManager destroyed.");
    }
}
