use ash::vk;
use gpu_allocator::vulkan::Allocation;

use crate::error::{ResourceManagerError, Result};

/// How initial data reaches a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStrategy {
    /// Host-visible, host-coherent memory written directly through its mapping.
    HostVisible,
    /// Written into a temporary staging buffer and copied into device-local memory.
    #[default]
    Staged,
}

/// Host-writable memory a payload can be copied into.
pub trait MappedMemory {
    fn mapped_bytes_mut(&mut self) -> Result<&mut [u8]>;

    /// Copies `data` into the mapping at `offset`, failing instead of writing past the end.
    fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let dst = self.mapped_bytes_mut()?;
        let capacity = dst.len();
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= capacity)
            .ok_or(ResourceManagerError::OutOfBounds {
                offset,
                len: data.len(),
                capacity,
            })?;
        dst[offset..end].copy_from_slice(data);
        Ok(())
    }
}

impl MappedMemory for Vec<u8> {
    fn mapped_bytes_mut(&mut self) -> Result<&mut [u8]> {
        Ok(self.as_mut_slice())
    }
}

/// A `vk::Buffer` together with the memory bound to it.
///
/// Released with [`crate::ResourceManager::destroy_buffer`], which consumes it.
#[derive(Debug)]
pub struct GpuBuffer {
    pub(crate) buffer: vk::Buffer,
    pub(crate) allocation: Allocation,
    pub(crate) size: vk::DeviceSize,
    pub(crate) usage: vk::BufferUsageFlags,
}

impl GpuBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes (the allocation may be larger).
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn is_mapped(&self) -> bool {
        self.allocation.mapped_ptr().is_some()
    }
}

impl MappedMemory for GpuBuffer {
    fn mapped_bytes_mut(&mut self) -> Result<&mut [u8]> {
        let size = self.size as usize;
        let slice = self
            .allocation
            .mapped_slice_mut()
            .ok_or(ResourceManagerError::NotMapped)?;
        let len = size.min(slice.len());
        Ok(&mut slice[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_payload_round_trips_byte_for_byte() {
        let vertices: Vec<f32> = vec![-0.5, -0.5, -0.5, 0.5, -0.5, -0.5, 0.5, 0.5, -0.5];
        let indices: Vec<u16> = vec![0, 1, 2, 0, 2, 3];
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&indices);

        let mut staging = vec![0u8; vertex_bytes.len() + index_bytes.len()];
        staging.write_bytes(0, vertex_bytes).unwrap();
        staging.write_bytes(vertex_bytes.len(), index_bytes).unwrap();

        assert_eq!(&staging[..vertex_bytes.len()], vertex_bytes);
        assert_eq!(&staging[vertex_bytes.len()..], index_bytes);
        let read_back: &[f32] = bytemuck::cast_slice(&staging[..vertex_bytes.len()]);
        assert_eq!(read_back, vertices.as_slice());
    }

    #[test]
    fn write_past_end_is_rejected() {
        let mut memory = vec![0u8; 8];
        let err = memory.write_bytes(4, &[1, 2, 3, 4, 5]).unwrap_err();
        assert!(matches!(
            err,
            ResourceManagerError::OutOfBounds {
                offset: 4,
                len: 5,
                capacity: 8
            }
        ));
        assert_eq!(memory, vec![0u8; 8]);
    }

    #[test]
    fn offset_overflow_is_rejected() {
        let mut memory = vec![0u8; 8];
        assert!(memory.write_bytes(usize::MAX, &[1]).is_err());
    }
}
