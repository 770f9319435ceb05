use ash::vk;

use crate::{
    error::{GfxHalError, Result},
    instance::Instance,
    surface::Surface,
};

use std::sync::Arc;

/// Represents a physical Vulkan device (GPU).
///
/// Holds the raw handle and a reference back to the `Instance` it came from.
/// Physical devices are owned by the instance, so there is nothing to destroy.
#[derive(Clone)]
pub struct PhysicalDevice {
    instance: Arc<Instance>,
    handle: vk::PhysicalDevice,
}

impl PhysicalDevice {
    /// Picks the first physical device the instance reports.
    ///
    /// No ranking is performed; the target hardware is expected to have exactly one GPU.
    pub fn select_first(instance: &Arc<Instance>) -> Result<Self> {
        let handles = unsafe { instance.ash_instance().enumerate_physical_devices()? };
        let handle = handles.first().copied().ok_or_else(|| {
            GfxHalError::NoSuitableGpu("No Vulkan-compatible GPUs found.".to_string())
        })?;

        let device = Self {
            instance: Arc::clone(instance),
            handle,
        };
        tracing::info!(
            "Selected physical device: {} ({} available)",
            device.name(),
            handles.len()
        );
        Ok(device)
    }

    /// Gets the raw `vk::PhysicalDevice` handle.
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Gets a reference to the `Instance` this device belongs to.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn properties(&self) -> vk::PhysicalDeviceProperties {
        unsafe {
            self.instance
                .ash_instance()
                .get_physical_device_properties(self.handle)
        }
    }

    pub fn features(&self) -> vk::PhysicalDeviceFeatures {
        unsafe {
            self.instance
                .ash_instance()
                .get_physical_device_features(self.handle)
        }
    }

    /// Human readable device name, for logging.
    pub fn name(&self) -> String {
        self.properties()
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed device>".to_string())
    }

    pub fn queue_family_properties(&self) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .ash_instance()
                .get_physical_device_queue_family_properties(self.handle)
        }
    }

    /// Finds the first queue family advertising graphics support and checks that it
    /// can also present to `surface`.
    pub fn find_graphics_queue_family(&self, surface: &Surface) -> Result<u32> {
        let families = self.queue_family_properties();
        let index = first_graphics_family(&families).ok_or_else(|| {
            GfxHalError::MissingQueueFamily("No queue family supports graphics".to_string())
        })?;

        let can_present =
            unsafe { surface.get_physical_device_surface_support(self.handle, index)? };
        if !can_present {
            return Err(GfxHalError::MissingQueueFamily(format!(
                "Graphics queue family {} cannot present to the surface",
                index
            )));
        }
        tracing::debug!("Using graphics queue family {}", index);
        Ok(index)
    }
}

/// Index of the first family whose flags contain `GRAPHICS`.
pub fn first_graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|index| index as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_graphics_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 4),
        ];
        assert_eq!(first_graphics_family(&families), Some(1));
    }

    #[test]
    fn skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(first_graphics_family(&families), Some(1));
    }

    #[test]
    fn no_graphics_family() {
        let families = [family(vk::QueueFlags::COMPUTE, 1)];
        assert_eq!(first_graphics_family(&families), None);
    }
}
