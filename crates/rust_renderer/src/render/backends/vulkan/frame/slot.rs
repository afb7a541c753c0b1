//! Per-frame-in-flight resource bundle

use ash::{vk, Device};

use crate::render::backends::vulkan::frame::MAX_FRAMES_IN_FLIGHT;
use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::resources::buffer::MappedUniformBuffer;
use crate::render::backends::vulkan::resources::descriptor_set::DescriptorSetWriter;
use crate::render::backends::vulkan::state::sync::FrameSync;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::lighting::{FragmentUbo, VertexUbo};

/// Everything one in-flight frame owns
///
/// Slot `i` is reused only after its in-flight fence has signaled, which is what
/// makes rewriting its command buffer and uniform buffers safe.
pub struct FrameSlot {
    /// Semaphores and fence
    pub sync: FrameSync,
    /// The slot's primary command buffer
    pub recorder: CommandRecorder,
    /// Persistently mapped vertex-stage uniforms
    pub vertex_ubo: MappedUniformBuffer<VertexUbo>,
    /// Persistently mapped fragment-stage uniforms
    pub fragment_ubo: MappedUniformBuffer<FragmentUbo>,
    /// Set 0 of the main pipeline
    pub uniform_set: vk::DescriptorSet,
    /// Set 1 of the main pipeline
    pub bindless_set: vk::DescriptorSet,
}

impl FrameSlot {
    /// Create one slot and point its uniform set at its buffers
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_buffer: vk::CommandBuffer,
        uniform_set: vk::DescriptorSet,
        bindless_set: vk::DescriptorSet,
    ) -> VulkanResult<Self> {
        let vertex_ubo = MappedUniformBuffer::new(device.clone(), memory_properties)?;
        let fragment_ubo = MappedUniformBuffer::new(device.clone(), memory_properties)?;

        DescriptorSetWriter::new()
            .write_buffer(
                uniform_set,
                0,
                vertex_ubo.handle(),
                MappedUniformBuffer::<VertexUbo>::range(),
            )
            .write_buffer(
                uniform_set,
                1,
                fragment_ubo.handle(),
                MappedUniformBuffer::<FragmentUbo>::range(),
            )
            .update(device);

        Ok(Self {
            sync: FrameSync::new(device.clone())?,
            recorder: CommandRecorder::new(command_buffer, device.clone()),
            vertex_ubo,
            fragment_ubo,
            uniform_set,
            bindless_set,
        })
    }

    /// Build the fixed ring of slots
    pub fn create_ring(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_pool: &CommandPool,
        uniform_sets: &[vk::DescriptorSet],
        bindless_sets: &[vk::DescriptorSet],
    ) -> VulkanResult<[Self; MAX_FRAMES_IN_FLIGHT]> {
        let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        let slots = command_buffers
            .iter()
            .zip(uniform_sets)
            .zip(bindless_sets)
            .map(|((&cmd, &uniform_set), &bindless_set)| {
                Self::new(device, memory_properties, cmd, uniform_set, bindless_set)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let count = slots.len();
        slots.try_into().map_err(|_| VulkanError::InitializationFailed(format!(
            "Expected {} frame slots, built {}",
            MAX_FRAMES_IN_FLIGHT, count
        )))
    }
}
