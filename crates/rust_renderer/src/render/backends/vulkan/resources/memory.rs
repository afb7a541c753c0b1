//! Memory type selection

use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Lowest memory type index allowed by `type_filter` with every flag in `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}

/// Size of an allocation that holds a resource bound `offset` bytes in
///
/// `offset` must respect the resource's alignment requirement.
pub fn allocation_size(requirements: &vk::MemoryRequirements, offset: vk::DeviceSize) -> VulkanResult<vk::DeviceSize> {
    let alignment = requirements.alignment.max(1);
    if offset % alignment != 0 {
        return Err(VulkanError::InvalidOperation {
            reason: format!("memory offset {} is not a multiple of alignment {}", offset, alignment),
        });
    }

    offset
        .checked_add(requirements.size)
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("memory offset {} overflows allocation of {}", offset, requirements.size),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    #[test]
    fn picks_lowest_matching_index() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        let index = find_memory_type(
            &props,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );

        assert_eq!(index.ok(), Some(1));
    }

    #[test]
    fn respects_type_filter() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        let index = find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL);

        assert_eq!(index.ok(), Some(1));
    }

    #[test]
    fn missing_type_is_an_error() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);

        assert!(matches!(
            result,
            Err(VulkanError::NoSuitableMemoryType { type_filter: 0b1, .. })
        ));
    }

    fn requirements(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: 0b1,
        }
    }

    #[test]
    fn default_offset_allocates_exact_size() {
        assert_eq!(allocation_size(&requirements(256, 64), 0).ok(), Some(256));
    }

    #[test]
    fn aligned_offset_grows_allocation() {
        assert_eq!(allocation_size(&requirements(256, 64), 128).ok(), Some(384));
    }

    #[test]
    fn misaligned_offset_is_rejected() {
        let result = allocation_size(&requirements(256, 64), 100);

        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn zero_alignment_accepts_any_offset() {
        assert_eq!(allocation_size(&requirements(16, 0), 3).ok(), Some(19));
    }
}
