use ash::vk;
use std::ffi::c_char;
use std::sync::Arc;

use crate::error::Result;
use crate::instance::Instance;
use crate::physical_device::PhysicalDevice;
use crate::queue::Queue;

/// Represents the logical Vulkan device, created from a `PhysicalDevice`.
///
/// Owns the `ash::Device`. A single queue is created from the graphics family,
/// which is also used for presentation and transfers.
pub struct Device {
    // Keeps the instance alive for as long as the device exists.
    instance: Arc<Instance>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    graphics_queue_family_index: u32,
    sampler_anisotropy: bool,
    max_sampler_anisotropy: f32,
}

impl Device {
    /// Creates a logical device with the swapchain extension and one graphics queue.
    ///
    /// Sampler anisotropy is enabled when the physical device supports it.
    pub fn new(
        physical_device: &PhysicalDevice,
        graphics_queue_family_index: u32,
    ) -> Result<Arc<Self>> {
        let instance = Arc::clone(physical_device.instance());

        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_queue_family_index)
            .queue_priorities(&queue_priorities)];

        let extension_names: [*const c_char; 1] = [ash::khr::swapchain::NAME.as_ptr()];

        let supported = physical_device.features();
        let sampler_anisotropy = supported.sampler_anisotropy == vk::TRUE;
        let enabled_features =
            vk::PhysicalDeviceFeatures::default().sampler_anisotropy(sampler_anisotropy);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance
                .ash_instance()
                .create_device(physical_device.handle(), &device_create_info, None)?
        };
        tracing::info!(
            "Logical device created (graphics family {}, anisotropy {}).",
            graphics_queue_family_index,
            sampler_anisotropy
        );

        Ok(Arc::new(Self {
            instance,
            physical_device: physical_device.handle(),
            device,
            graphics_queue_family_index,
            sampler_anisotropy,
            max_sampler_anisotropy: physical_device.properties().limits.max_sampler_anisotropy,
        }))
    }

    /// Provides raw access to the underlying `ash::Device`.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Gets the handle of the physical device this logical device was created from.
    pub fn physical_device_handle(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Maximum anisotropy to request from samplers, or `None` if the feature is off.
    pub fn sampler_anisotropy(&self) -> Option<f32> {
        self.sampler_anisotropy.then_some(self.max_sampler_anisotropy)
    }

    /// Wraps queue 0 of the graphics family.
    pub fn graphics_queue(self: &Arc<Self>) -> Arc<Queue> {
        let queue = unsafe { self.device.get_device_queue(self.graphics_queue_family_index, 0) };
        Arc::new(Queue::new(Arc::clone(self), queue, self.graphics_queue_family_index))
    }

    /// Waits until the logical device becomes idle.
    pub fn wait_idle(&self) -> Result<()> {
        tracing::debug!("Waiting for device idle...");
        unsafe { self.device.device_wait_idle()? };
        tracing::debug!("Device idle.");
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::debug!("Destroying logical device...");
        if let Err(e) = self.wait_idle() {
            tracing::error!("Error waiting for device idle during drop: {}", e);
        }
        unsafe {
            self.device.destroy_device(None);
        }
        tracing::debug!("Logical device destroyed.");
    }
}
