//! Buffer management for geometry and uniforms
//!
//! Memory management following RAII patterns: a [`Buffer`] owns its memory and
//! releases both when dropped.

use ash::{vk, Device};
use bytemuck::Pod;
use std::marker::PhantomData;
use std::mem;

use crate::render::backends::vulkan::resources::memory::{allocation_size, find_memory_type};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    memory_offset: vk::DeviceSize,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it at `memory_offset`
    ///
    /// The allocation is grown by `memory_offset` bytes; pass 0 for a tight fit.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        memory_offset: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("zero-sized buffer requested for {:?}", usage),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let placement = allocation_size(&mem_requirements, memory_offset).and_then(|total| {
            find_memory_type(memory_properties, mem_requirements.memory_type_bits, properties).map(|index| (total, index))
        });
        let (total_size, memory_type_index) = match placement {
            Ok(placement) => placement,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(total_size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let buffer = Self {
            device,
            buffer,
            memory,
            memory_offset,
            size,
        };

        unsafe {
            buffer
                .device
                .bind_buffer_memory(buffer.buffer, buffer.memory, buffer.memory_offset)
                .map_err(VulkanError::Api)?;
        }

        Ok(buffer)
    }

    /// Host-visible, coherent staging buffer filled with `bytes`
    pub fn staging(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        bytes: &[u8],
    ) -> VulkanResult<Self> {
        let buffer = Self::new(
            device,
            memory_properties,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            0,
        )?;
        buffer.write_bytes(bytes)?;
        Ok(buffer)
    }

    /// Map memory for writing
    pub fn map_memory(&self) -> VulkanResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .map_memory(self.memory, self.memory_offset, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    /// Unmap memory
    pub fn unmap_memory(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Copy `bytes` to the start of a host-visible buffer
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes into buffer of {}", bytes.len(), self.size),
            });
        }

        let data_ptr = self.map_memory()?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data_ptr.cast::<u8>(), bytes.len());
        }
        self.unmap_memory();
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Uniform buffer that stays mapped for its whole lifetime
///
/// One exists per frame slot and uniform block, so the CPU only ever writes
/// into a buffer whose slot fence has signaled.
pub struct MappedUniformBuffer<T: Pod> {
    buffer: Buffer,
    mapped: *mut std::ffi::c_void,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedUniformBuffer<T> {
    /// Create and map a uniform buffer sized for one `T`
    pub fn new(device: Device, memory_properties: &vk::PhysicalDeviceMemoryProperties) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            memory_properties,
            mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            0,
        )?;
        let mapped = buffer.map_memory()?;

        Ok(Self {
            buffer,
            mapped,
            _marker: PhantomData,
        })
    }

    /// Overwrite the uniform contents
    pub fn write(&mut self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped.cast::<u8>(), bytes.len());
        }
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Descriptor range covering the whole block
    pub fn range() -> vk::DeviceSize {
        mem::size_of::<T>() as vk::DeviceSize
    }
}

impl<T: Pod> Drop for MappedUniformBuffer<T> {
    fn drop(&mut self) {
        self.buffer.unmap_memory();
    }
}
