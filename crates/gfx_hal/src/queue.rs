use std::sync::{Arc, Mutex};

use ash::vk;

use crate::device::Device;
use crate::error::Result;
use crate::sync::Fence;

/// The graphics/present queue, shared by the renderer and the resource uploader.
pub struct Queue {
    device: Arc<Device>,
    queue: vk::Queue,
    family_index: u32,
    // vkQueueSubmit requires external synchronization of the queue.
    submit_lock: Mutex<()>,
}

impl Queue {
    pub(crate) fn new(device: Arc<Device>, queue: vk::Queue, family_index: u32) -> Self {
        Self {
            device,
            queue,
            family_index,
            submit_lock: Mutex::new(()),
        }
    }

    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// # Safety
    /// Everything referenced by `submits` must be fully recorded and belong to this
    /// queue's device, and `fence` must be unsignaled.
    pub unsafe fn submit(&self, submits: &[vk::SubmitInfo], fence: Option<&Fence>) -> Result<()> {
        let fence = fence.map_or(vk::Fence::null(), Fence::handle);
        let _guard = self.submit_lock.lock()?;
        tracing::trace!("Queue family {}: {} submit(s)", self.family_index, submits.len());
        self.device.raw().queue_submit(self.queue, submits, fence)?;
        Ok(())
    }
}
