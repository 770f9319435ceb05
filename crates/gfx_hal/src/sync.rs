use std::{sync::Arc, time::Duration};

use ash::vk;

use crate::{
    device::Device,
    error::{GfxHalError, Result},
};

/// Outcome of a bounded fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceWait {
    Signaled,
    TimedOut,
}

/// Host-side wait object, destroyed on drop.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(device: Arc<Device>, signaled: bool) -> Result<Self> {
        let mut flags = vk::FenceCreateFlags::empty();
        if signaled {
            flags |= vk::FenceCreateFlags::SIGNALED;
        }
        let fence = unsafe {
            device
                .raw()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        tracing::trace!("Created fence {:?} (signaled: {})", fence, signaled);
        Ok(Self { device, fence })
    }

    /// Blocks for at most `timeout` (forever when `None`).
    ///
    /// Running out of time is reported as [`FenceWait::TimedOut`], not as an error.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<FenceWait> {
        let timeout_ns = timeout.map_or(u64::MAX, |d| d.as_nanos().min(u64::MAX as u128) as u64);
        match unsafe {
            self.device
                .raw()
                .wait_for_fences(&[self.fence], true, timeout_ns)
        } {
            Ok(()) => Ok(FenceWait::Signaled),
            Err(vk::Result::TIMEOUT) => {
                tracing::trace!("Fence wait timed out after {:?}.", timeout);
                Ok(FenceWait::TimedOut)
            }
            Err(e) => Err(GfxHalError::VulkanError(e)),
        }
    }

    /// Must not be called while a submission that signals this fence is pending.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.raw().reset_fences(&[self.fence])? };
        Ok(())
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        tracing::trace!("Destroying fence {:?}", self.fence);
        unsafe { self.device.raw().destroy_fence(self.fence, None) };
    }
}

/// Binary semaphore ordering image acquisition before rendering.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let semaphore = unsafe {
            device
                .raw()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        tracing::trace!("Created semaphore {:?}", semaphore);
        Ok(Self { device, semaphore })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        tracing::trace!("Destroying semaphore {:?}", self.semaphore);
        unsafe { self.device.raw().destroy_semaphore(self.semaphore, None) };
    }
}
